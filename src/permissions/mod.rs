//! Origin validation and capability mapping
//!
//! The two synchronous leaves of the mediation flow:
//! - **Origin Validator**: `OriginValidator` trait with the rule-based `OriginPolicy`
//! - **Capability Mapper**: `CapabilityMapper` from content capabilities to `HostPermission`s
//!
//! ## Rule Types
//!
//! - `Exact`: one origin, e.g. `https://trusted.example`
//! - `HostSuffix`: a domain and all of its subdomains
//! - `Pattern`: a regex over the normalised origin
//!
//! ## Example
//!
//! ```rust,ignore
//! use permission_broker::permissions::{CapabilityMapper, OriginPolicy, OriginRule, OriginValidator};
//!
//! let policy = OriginPolicy::with_rules(vec![OriginRule::host_suffix("trusted.example")])?;
//! assert!(policy.validate("https://live.trusted.example").is_trusted());
//!
//! let mapper = CapabilityMapper::default();
//! let mapped = mapper.map_all(&request_capabilities);
//! ```

mod mapper;
mod origin;

pub use mapper::{
    default_capability_table, CapabilityMapper, HostPermission, MappedCapabilities, Mapping, CAMERA,
    RECORD_AUDIO,
};
pub use origin::{Origin, OriginPolicy, OriginRule, OriginValidator, OriginVerdict};
