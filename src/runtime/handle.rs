//! RequestHandle and ResolutionSink - the rendering engine's side
//!
//! The engine gets a `RequestHandle` back for every request it submits and
//! is later called back through its `ResolutionSink` with either a grant
//! or a denial for that handle.

use std::collections::BTreeSet;
use std::fmt;

use crate::core::{MediationState, RequestId, Resolution};

/// Identifies a submitted request to the rendering engine
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestHandle {
    id: RequestId,
    origin: String,
}

impl RequestHandle {
    pub fn new(id: RequestId, origin: impl Into<String>) -> Self {
        Self {
            id,
            origin: origin.into(),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Origin exactly as the content claimed it
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.origin)
    }
}

/// What `on_capability_request` returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intake {
    pub handle: RequestHandle,
    /// State the request was left in when intake returned
    pub state: MediationState,
}

impl Intake {
    /// Answered during intake, without suspending
    pub fn is_immediate(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Receives final decisions for the rendering engine
///
/// Called exactly once per request that was not cancelled, possibly from
/// a different task than the one that submitted it.
pub trait ResolutionSink: Send + Sync {
    /// Grant a non-empty subset of the requested capabilities
    fn grant(&self, handle: &RequestHandle, capabilities: &BTreeSet<String>);

    /// Deny the whole request
    fn deny(&self, handle: &RequestHandle);

    /// Deliver a resolution; dispatches to `grant` or `deny` by default
    fn resolve(&self, handle: &RequestHandle, resolution: &Resolution) {
        if resolution.is_granted() {
            self.grant(handle, &resolution.granted);
        } else {
            self.deny(handle);
        }
    }
}
