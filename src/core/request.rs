//! Request, outcome and resolution types exchanged with the rendering engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of one inbound capability request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-invocation token correlating an oracle prompt with its pending entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationToken(pub u64);

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A capability request as issued by embedded content
///
/// Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRequest {
    id: RequestId,
    origin: String,
    capabilities: BTreeSet<String>,
}

impl CapabilityRequest {
    /// Create a request with a fresh id
    pub fn new<I, S>(origin: impl Into<String>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: RequestId::new(),
            origin: origin.into(),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The origin claimed by the content
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn capabilities(&self) -> &BTreeSet<String> {
        &self.capabilities
    }
}

/// Final grant/deny split over the capabilities of one request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationOutcome {
    /// Capabilities the content may use
    pub granted: BTreeSet<String>,
    /// Everything else that was requested
    pub denied: BTreeSet<String>,
}

impl AuthorizationOutcome {
    /// Deny every requested capability
    pub fn deny_all(requested: &BTreeSet<String>) -> Self {
        Self {
            granted: BTreeSet::new(),
            denied: requested.clone(),
        }
    }

    /// Split `requested` by `is_granted`
    ///
    /// Only capabilities present in `requested` can end up granted, so a
    /// broader grant from the oracle never leaks into the outcome.
    pub fn intersect<F>(requested: &BTreeSet<String>, is_granted: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let (granted, denied): (BTreeSet<String>, BTreeSet<String>) = requested
            .iter()
            .cloned()
            .partition(|capability| is_granted(capability));
        Self { granted, denied }
    }

    pub fn is_full_denial(&self) -> bool {
        self.granted.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        !self.granted.is_empty() && !self.denied.is_empty()
    }
}

/// What the rendering engine is told about a finished request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub request_id: RequestId,
    pub origin: String,
    pub granted: BTreeSet<String>,
    pub denied: BTreeSet<String>,
    pub resolved_at: DateTime<Utc>,
}

impl Resolution {
    pub fn new(request_id: RequestId, origin: impl Into<String>, outcome: AuthorizationOutcome) -> Self {
        Self {
            request_id,
            origin: origin.into(),
            granted: outcome.granted,
            denied: outcome.denied,
            resolved_at: Utc::now(),
        }
    }

    pub fn is_granted(&self) -> bool {
        !self.granted.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = CapabilityRequest::new("https://trusted.example", ["camera"]);
        let b = CapabilityRequest::new("https://trusted.example", ["camera"]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.capabilities(), b.capabilities());
    }

    #[test]
    fn test_intersect_never_exceeds_request() {
        let requested = set(&["camera"]);
        let outcome = AuthorizationOutcome::intersect(&requested, |_| true);
        assert_eq!(outcome.granted, set(&["camera"]));
        assert!(outcome.denied.is_empty());
    }

    #[test]
    fn test_intersect_partial() {
        let requested = set(&["camera", "microphone", "midi"]);
        let outcome = AuthorizationOutcome::intersect(&requested, |cap| cap == "microphone");
        assert_eq!(outcome.granted, set(&["microphone"]));
        assert_eq!(outcome.denied, set(&["camera", "midi"]));
        assert!(outcome.is_partial());
    }

    #[test]
    fn test_deny_all() {
        let requested = set(&["camera", "microphone"]);
        let outcome = AuthorizationOutcome::deny_all(&requested);
        assert!(outcome.is_full_denial());
        assert_eq!(outcome.denied, requested);
    }

    #[test]
    fn test_resolution_serializes() {
        let id = RequestId::new();
        let resolution = Resolution::new(
            id,
            "https://trusted.example",
            AuthorizationOutcome::intersect(&set(&["camera"]), |_| true),
        );
        let json = serde_json::to_value(&resolution).unwrap();
        assert_eq!(json["origin"], "https://trusted.example");
        assert_eq!(json["granted"][0], "camera");
        assert!(resolution.is_granted());
    }
}
