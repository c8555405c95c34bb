//! Authorization oracle adapters
//!
//! The controller only ever talks to an `AuthorizationOracle`:
//! - `AuthorizationOracle` - async "prompt for these permissions" trait
//! - `HostPromptBridge` - adapter for hosts that answer through a callback
//! - `ContextLookup` / `ForegroundTracker` - who can present the prompt

mod bridge;
mod context;
mod provider;

pub use bridge::{HostPromptBridge, PromptReceiver, PromptRequest};
pub use context::{ContextLookup, ForegroundTracker, PromptContext};
pub use provider::{AuthorizationOracle, HostGrant};
