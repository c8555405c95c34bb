//! Broker Configuration
//!
//! Trusted origins, the capability table and prompt behaviour, loaded from JSON:
//!
//! ```json
//! {
//!   "trusted_origins": [
//!     { "type": "exact", "value": "https://trusted.example" },
//!     { "type": "host_suffix", "value": "cdn.example" }
//!   ],
//!   "require_secure": true,
//!   "capabilities": { "camera": "android.permission.CAMERA" },
//!   "prompt_timeout_secs": 60
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use crate::core::{BrokerError, BrokerResult};
use crate::permissions::{default_capability_table, CapabilityMapper, OriginPolicy, OriginRule};

/// Environment variable holding the config file path
pub const CONFIG_ENV: &str = "PERMISSION_BROKER_CONFIG";

/// Broker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Origins allowed to request capabilities
    #[serde(default)]
    pub trusted_origins: Vec<OriginRule>,

    /// Reject non-https origins other than loopback
    #[serde(default = "default_require_secure")]
    pub require_secure: bool,

    /// Content capability -> host permission id
    #[serde(default = "default_capability_table")]
    pub capabilities: BTreeMap<String, String>,

    /// Give up on a prompt after this many seconds (unbounded when unset)
    #[serde(default)]
    pub prompt_timeout_secs: Option<u64>,
}

fn default_require_secure() -> bool {
    true
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            trusted_origins: Vec::new(),
            require_secure: true,
            capabilities: default_capability_table(),
            prompt_timeout_secs: None,
        }
    }
}

impl BrokerConfig {
    /// Create a default configuration (trusts no origin)
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> BrokerResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        tracing::info!(path = %path.display(), origins = config.trusted_origins.len(), "Loaded broker config");
        Ok(config)
    }

    /// Parse and validate a JSON config string
    pub fn parse(json: &str) -> BrokerResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by `PERMISSION_BROKER_CONFIG`, or defaults
    pub fn from_env() -> BrokerResult<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => {
                tracing::debug!("{} not set, using default config", CONFIG_ENV);
                Ok(Self::default())
            }
        }
    }

    /// Add a trusted origin rule
    pub fn with_origin(mut self, rule: OriginRule) -> Self {
        self.trusted_origins.push(rule);
        self
    }

    /// Add or replace a capability mapping
    pub fn with_capability(mut self, capability: impl Into<String>, permission: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into(), permission.into());
        self
    }

    pub fn with_require_secure(mut self, require_secure: bool) -> Self {
        self.require_secure = require_secure;
        self
    }

    pub fn with_prompt_timeout(mut self, secs: u64) -> Self {
        self.prompt_timeout_secs = Some(secs);
        self
    }

    /// Get prompt timeout as Duration
    pub fn prompt_timeout(&self) -> Option<Duration> {
        self.prompt_timeout_secs.map(Duration::from_secs)
    }

    /// Check mappings and compile origin rules
    pub fn validate(&self) -> BrokerResult<()> {
        for (capability, permission) in &self.capabilities {
            if capability.trim().is_empty() || permission.trim().is_empty() {
                return Err(BrokerError::InvalidConfig(format!(
                    "empty capability mapping: {:?} -> {:?}",
                    capability, permission
                )));
            }
        }
        if self.prompt_timeout_secs == Some(0) {
            return Err(BrokerError::InvalidConfig(
                "prompt_timeout_secs must be positive".into(),
            ));
        }
        self.origin_policy().map(|_| ())
    }

    /// Build the origin validator described by this config
    pub fn origin_policy(&self) -> BrokerResult<OriginPolicy> {
        let mut policy = OriginPolicy::with_rules(self.trusted_origins.clone())?;
        policy.set_require_secure(self.require_secure);
        Ok(policy)
    }

    /// Build the capability mapper described by this config
    pub fn capability_mapper(&self) -> CapabilityMapper {
        CapabilityMapper::with_table(self.capabilities.clone())
    }
}
