//! Origin validation
//!
//! Classifies the origin claimed by embedded content as trusted or not.
//! Validation is pure and synchronous; an untrusted verdict short-circuits
//! the whole request before any prompt is shown.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;
use url::Url;

use crate::core::{BrokerError, BrokerResult};

/// Normalised `scheme://host[:port]` origin
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Origin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl Origin {
    /// Parse an origin or URL, dropping any path, query or fragment
    ///
    /// Parsing follows the WHATWG URL rules, so scheme and host are
    /// lowercased and default ports are removed: `HTTPS://Example.com:443/x`
    /// and `https://example.com` compare equal. Opaque origins (`data:`,
    /// `file:`, non-special schemes) and URLs carrying credentials are
    /// rejected.
    pub fn parse(raw: &str) -> BrokerResult<Self> {
        let raw = raw.trim();
        let invalid = |reason: &dyn fmt::Display| BrokerError::InvalidOrigin(format!("{} ({})", raw, reason));

        let url = Url::parse(raw).map_err(|e| invalid(&e))?;
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid(&"credentials in origin"));
        }
        if !url.origin().is_tuple() {
            return Err(invalid(&"opaque origin"));
        }
        let host = url.host_str().ok_or_else(|| invalid(&"missing host"))?;

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_string(),
            port: url.port(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// `https`, or a loopback host over any scheme
    pub fn is_secure(&self) -> bool {
        self.scheme == "https" || self.is_loopback()
    }

    pub fn is_loopback(&self) -> bool {
        matches!(self.host.as_str(), "localhost" | "127.0.0.1" | "[::1]")
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// Result of validating an origin
#[derive(Debug)]
pub enum OriginVerdict {
    /// Origin may ask for capabilities
    Trusted(Origin),
    /// Origin is rejected outright, with `InvalidOrigin` or `UntrustedOrigin`
    Untrusted(BrokerError),
}

impl OriginVerdict {
    pub fn is_trusted(&self) -> bool {
        matches!(self, OriginVerdict::Trusted(_))
    }
}

/// Classifies origins as trusted or untrusted
pub trait OriginValidator: Send + Sync {
    fn validate(&self, origin: &str) -> OriginVerdict;
}

/// A trust rule for origins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OriginRule {
    /// Exactly this origin, after normalisation
    Exact(String),
    /// This host and any of its subdomains
    HostSuffix(String),
    /// Regex matched against the normalised origin string
    Pattern(String),
}

impl OriginRule {
    pub fn exact(origin: impl Into<String>) -> Self {
        OriginRule::Exact(origin.into())
    }

    pub fn host_suffix(domain: impl Into<String>) -> Self {
        OriginRule::HostSuffix(domain.into())
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        OriginRule::Pattern(pattern.into())
    }
}

/// A rule with its pattern compiled
#[derive(Debug)]
struct OriginMatcher {
    rule: OriginRule,
    pattern: Option<Regex>,
}

impl OriginMatcher {
    fn compile(rule: OriginRule) -> BrokerResult<Self> {
        let pattern = match &rule {
            OriginRule::Pattern(p) => Some(Regex::new(p)?),
            _ => None,
        };
        Ok(Self { rule, pattern })
    }

    fn matches(&self, origin: &Origin) -> bool {
        match &self.rule {
            OriginRule::Exact(expected) => Origin::parse(expected)
                .map(|expected| &expected == origin)
                .unwrap_or(false),
            OriginRule::HostSuffix(domain) => {
                let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                origin.host() == domain || origin.host().ends_with(&format!(".{}", domain))
            }
            OriginRule::Pattern(_) => self
                .pattern
                .as_ref()
                .map(|regex| regex.is_match(&origin.to_string()))
                .unwrap_or(false),
        }
    }
}

/// Rule-based origin validator
///
/// An origin is trusted when it parses, passes the secure-scheme check
/// (if enabled) and matches at least one rule. Rules can be added at
/// runtime and are visible to every clone of the `Arc` holding the policy.
#[derive(Debug)]
pub struct OriginPolicy {
    rules: RwLock<Vec<OriginMatcher>>,
    require_secure: bool,
}

impl OriginPolicy {
    /// Create a policy that trusts nothing
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
            require_secure: true,
        }
    }

    /// Create with initial rules
    pub fn with_rules(rules: Vec<OriginRule>) -> BrokerResult<Self> {
        let matchers = rules
            .into_iter()
            .map(OriginMatcher::compile)
            .collect::<BrokerResult<Vec<_>>>()?;
        Ok(Self {
            rules: RwLock::new(matchers),
            require_secure: true,
        })
    }

    /// Allow plain `http` origins that match a rule
    pub fn allow_insecure(mut self) -> Self {
        self.require_secure = false;
        self
    }

    pub fn set_require_secure(&mut self, require_secure: bool) {
        self.require_secure = require_secure;
    }

    /// Add a rule, ignoring duplicates
    pub fn add_rule(&self, rule: OriginRule) -> BrokerResult<()> {
        let matcher = OriginMatcher::compile(rule)?;
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        if !rules.iter().any(|m| m.rule == matcher.rule) {
            tracing::info!(rule = ?matcher.rule, "Adding trusted origin rule");
            rules.push(matcher);
        }
        Ok(())
    }

    /// Get all rules (for persistence)
    pub fn rules(&self) -> Vec<OriginRule> {
        self.rules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|m| m.rule.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.rules.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl OriginValidator for OriginPolicy {
    fn validate(&self, origin: &str) -> OriginVerdict {
        let parsed = match Origin::parse(origin) {
            Ok(parsed) => parsed,
            Err(e) => return OriginVerdict::Untrusted(e),
        };

        if self.require_secure && !parsed.is_secure() {
            return OriginVerdict::Untrusted(BrokerError::UntrustedOrigin(format!("{} is not secure", parsed)));
        }

        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
        if rules.iter().any(|m| m.matches(&parsed)) {
            OriginVerdict::Trusted(parsed)
        } else {
            OriginVerdict::Untrusted(BrokerError::UntrustedOrigin(format!("no rule matches {}", parsed)))
        }
    }
}
