//! Capability mapping
//!
//! Translates content-level capability identifiers into host permission ids.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::{BrokerError, BrokerResult};

/// Host camera permission
pub const CAMERA: &str = "android.permission.CAMERA";
/// Host microphone permission
pub const RECORD_AUDIO: &str = "android.permission.RECORD_AUDIO";

/// Identifier of a host OS permission
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostPermission(String);

impl HostPermission {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostPermission {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Result of mapping a single capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    Supported(HostPermission),
    Unsupported,
}

/// A request's capabilities split by whether the host can grant them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedCapabilities {
    /// Content capability -> host permission
    pub supported: BTreeMap<String, HostPermission>,
    /// Capabilities with no host permission; always denied
    pub unsupported: BTreeSet<String>,
}

impl MappedCapabilities {
    /// Distinct host permissions needed by the supported capabilities
    pub fn host_permissions(&self) -> BTreeSet<HostPermission> {
        self.supported.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.supported.is_empty()
    }

    /// Whether `capability` is granted given a set of held host permissions
    pub fn is_granted(&self, capability: &str, held: &BTreeSet<HostPermission>) -> bool {
        self.supported
            .get(capability)
            .map(|permission| held.contains(permission))
            .unwrap_or(false)
    }
}

/// Table-driven capability mapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityMapper {
    table: BTreeMap<String, HostPermission>,
}

impl CapabilityMapper {
    /// Create an empty mapper; every capability is unsupported
    pub fn new() -> Self {
        Self {
            table: BTreeMap::new(),
        }
    }

    /// Create from a content capability -> host permission table
    pub fn with_table<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            table: entries
                .into_iter()
                .map(|(k, v)| (k.into(), HostPermission::new(v)))
                .collect(),
        }
    }

    /// Builder-style insert
    pub fn with_mapping(mut self, capability: impl Into<String>, permission: impl Into<String>) -> Self {
        self.table
            .insert(capability.into(), HostPermission::new(permission));
        self
    }

    pub fn map(&self, capability: &str) -> Mapping {
        match self.permission_for(capability) {
            Ok(permission) => Mapping::Supported(permission),
            Err(_) => Mapping::Unsupported,
        }
    }

    /// Host permission for `capability`, or `UnsupportedCapability`
    pub fn permission_for(&self, capability: &str) -> BrokerResult<HostPermission> {
        self.table
            .get(capability.trim())
            .cloned()
            .ok_or_else(|| BrokerError::UnsupportedCapability(capability.to_string()))
    }

    /// Map every capability of a request
    pub fn map_all<'a, I>(&self, capabilities: I) -> MappedCapabilities
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut mapped = MappedCapabilities::default();
        for capability in capabilities {
            match self.permission_for(capability) {
                Ok(permission) => {
                    mapped.supported.insert(capability.clone(), permission);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Denying capability");
                    mapped.unsupported.insert(capability.clone());
                }
            }
        }
        mapped
    }

    pub fn table(&self) -> &BTreeMap<String, HostPermission> {
        &self.table
    }
}

impl Default for CapabilityMapper {
    /// WebView resource names and their short aliases
    fn default() -> Self {
        Self::with_table(default_capability_table())
    }
}

/// Default content capability -> host permission table
pub fn default_capability_table() -> BTreeMap<String, String> {
    [
        ("camera", CAMERA),
        ("video_capture", CAMERA),
        ("android.webkit.resource.VIDEO_CAPTURE", CAMERA),
        ("microphone", RECORD_AUDIO),
        ("audio_capture", RECORD_AUDIO),
        ("android.webkit.resource.AUDIO_CAPTURE", RECORD_AUDIO),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
