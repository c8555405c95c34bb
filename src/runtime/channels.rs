//! Channel plumbing for engines that consume resolutions as a stream
//!
//! `ChannelSink` forwards every `Resolution` over an unbounded mpsc channel.
//! Resolutions are produced from oracle tasks, so the sender must never
//! block; an unbounded channel keeps `ResolutionSink` synchronous.

use std::collections::BTreeSet;
use tokio::sync::mpsc;

use crate::core::{AuthorizationOutcome, Resolution};

use super::handle::{RequestHandle, ResolutionSink};

// ============================================================================
// Channel Type Aliases
// ============================================================================

/// Sender half of the resolution channel (used by `ChannelSink`)
pub type ResolutionSender = mpsc::UnboundedSender<Resolution>;

/// Receiver half of the resolution channel (used by the rendering engine)
pub type ResolutionReceiver = mpsc::UnboundedReceiver<Resolution>;

// ============================================================================
// Channel Creation
// ============================================================================

/// Create a new resolution channel pair
pub fn create_resolution_channel() -> (ResolutionSender, ResolutionReceiver) {
    mpsc::unbounded_channel()
}

/// `ResolutionSink` that forwards resolutions to a channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: ResolutionSender,
}

impl ChannelSink {
    pub fn new(tx: ResolutionSender) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiver the engine reads from
    pub fn channel() -> (Self, ResolutionReceiver) {
        let (tx, rx) = create_resolution_channel();
        (Self::new(tx), rx)
    }

    fn forward(&self, resolution: Resolution) {
        if self.tx.send(resolution).is_err() {
            tracing::warn!("Resolution receiver dropped; engine is gone");
        }
    }
}

impl ResolutionSink for ChannelSink {
    fn grant(&self, handle: &RequestHandle, capabilities: &BTreeSet<String>) {
        self.forward(Resolution::new(
            handle.id(),
            handle.origin(),
            AuthorizationOutcome {
                granted: capabilities.clone(),
                denied: BTreeSet::new(),
            },
        ));
    }

    fn deny(&self, handle: &RequestHandle) {
        self.forward(Resolution::new(handle.id(), handle.origin(), AuthorizationOutcome::default()));
    }

    fn resolve(&self, _handle: &RequestHandle, resolution: &Resolution) {
        self.forward(resolution.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RequestId;

    #[tokio::test]
    async fn test_resolve_forwards_full_resolution() {
        let (sink, mut rx) = ChannelSink::channel();
        let handle = RequestHandle::new(RequestId::new(), "https://trusted.example");
        let requested: BTreeSet<String> = ["camera".to_string(), "midi".to_string()].into();
        let outcome = AuthorizationOutcome::intersect(&requested, |c| c == "camera");

        sink.resolve(&handle, &Resolution::new(handle.id(), handle.origin(), outcome));

        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.request_id, handle.id());
        assert!(resolution.granted.contains("camera"));
        assert!(resolution.denied.contains("midi"));
    }

    #[tokio::test]
    async fn test_deny_forwards_empty_grant() {
        let (sink, mut rx) = ChannelSink::channel();
        let handle = RequestHandle::new(RequestId::new(), "https://evil.example");

        sink.deny(&handle);

        let resolution = rx.recv().await.unwrap();
        assert!(!resolution.is_granted());
        assert_eq!(resolution.origin, "https://evil.example");
    }

    #[test]
    fn test_send_without_receiver_does_not_panic() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        sink.deny(&RequestHandle::new(RequestId::new(), "https://trusted.example"));
    }
}
