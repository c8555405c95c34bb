//! HostPromptBridge - oracle adapter for callback-style hosts
//!
//! Hosts that answer permission prompts through a callback (rather than by
//! returning a value) consume `PromptRequest`s from a channel and report
//! back with `deliver(token, granted)`. Each prompt gets its own
//! correlation token, so concurrent prompts never share a request code.
//!
//! # Example
//!
//! ```ignore
//! let (bridge, mut prompts) = HostPromptBridge::new();
//! let bridge = Arc::new(bridge);
//!
//! // Host side: show the OS dialog, then hand the answer back
//! let host = bridge.clone();
//! tokio::spawn(async move {
//!     while let Some(prompt) = prompts.recv().await {
//!         let granted = show_dialog(&prompt.context, &prompt.permissions).await;
//!         host.deliver(prompt.token, granted);
//!     }
//! });
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};

use crate::core::{BrokerError, BrokerResult, CorrelationToken};
use crate::permissions::HostPermission;

use super::context::PromptContext;
use super::provider::{AuthorizationOracle, HostGrant};

/// A prompt the host should present
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub token: CorrelationToken,
    pub context: PromptContext,
    pub permissions: BTreeSet<HostPermission>,
}

/// Receiver half handed to the host
pub type PromptReceiver = mpsc::UnboundedReceiver<PromptRequest>;

type Continuation = oneshot::Sender<BrokerResult<HostGrant>>;

/// Oracle adapter that routes prompts to the host over a channel
pub struct HostPromptBridge {
    prompts_tx: mpsc::UnboundedSender<PromptRequest>,
    /// Continuations waiting for the host's answer, keyed by token
    pending: Mutex<HashMap<CorrelationToken, Continuation>>,
    /// Permissions the host reports as already held
    held: RwLock<BTreeSet<HostPermission>>,
}

impl HostPromptBridge {
    /// Create a bridge and the receiver the host reads prompts from
    pub fn new() -> (Self, PromptReceiver) {
        let (prompts_tx, prompts_rx) = mpsc::unbounded_channel();
        let bridge = Self {
            prompts_tx,
            pending: Mutex::new(HashMap::new()),
            held: RwLock::new(BTreeSet::new()),
        };
        (bridge, prompts_rx)
    }

    /// Complete the prompt for `token` with the permissions the user granted
    ///
    /// Granted permissions are remembered as held. Returns false when no
    /// prompt is waiting on `token` (already answered or abandoned).
    pub fn deliver<I, P>(&self, token: CorrelationToken, granted: I) -> bool
    where
        I: IntoIterator<Item = P>,
        P: Into<HostPermission>,
    {
        let grant = HostGrant::new(granted);
        let Some(continuation) = self.take(token) else {
            tracing::warn!(token = %token, "Prompt result for unknown token");
            return false;
        };

        self.held
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(grant.granted.iter().cloned());

        tracing::debug!(token = %token, granted = grant.granted.len(), "Prompt answered");
        continuation.send(Ok(grant)).is_ok()
    }

    /// Fail the prompt for `token`, e.g. when the host lost its window
    pub fn abandon(&self, token: CorrelationToken, reason: impl Into<String>) -> bool {
        match self.take(token) {
            Some(continuation) => continuation
                .send(Err(BrokerError::unavailable(reason)))
                .is_ok(),
            None => false,
        }
    }

    /// Replace the set of permissions the host already holds
    pub fn set_held<I, P>(&self, held: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<HostPermission>,
    {
        *self.held.write().unwrap_or_else(|e| e.into_inner()) =
            held.into_iter().map(Into::into).collect();
    }

    /// Forget a held permission (the user revoked it in system settings)
    pub fn revoke(&self, permission: &HostPermission) {
        self.held
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(permission);
    }

    /// Number of prompts awaiting an answer
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn take(&self, token: CorrelationToken) -> Option<Continuation> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&token)
    }
}

/// Drops the continuation if the waiting future goes away first
struct PendingGuard<'a> {
    bridge: &'a HostPromptBridge,
    token: CorrelationToken,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.bridge.take(self.token);
    }
}

#[async_trait::async_trait]
impl AuthorizationOracle for HostPromptBridge {
    fn preflight(&self, permissions: &BTreeSet<HostPermission>) -> BTreeSet<HostPermission> {
        let held = self.held.read().unwrap_or_else(|e| e.into_inner());
        permissions.intersection(&held).cloned().collect()
    }

    async fn request(
        &self,
        context: &PromptContext,
        token: CorrelationToken,
        permissions: &BTreeSet<HostPermission>,
    ) -> BrokerResult<HostGrant> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token, tx);
        let _guard = PendingGuard { bridge: self, token };

        let prompt = PromptRequest {
            token,
            context: context.clone(),
            permissions: permissions.clone(),
        };
        if self.prompts_tx.send(prompt).is_err() {
            return Err(BrokerError::unavailable("host is no longer reading prompts"));
        }

        tracing::debug!(token = %token, context = %context.id, "Prompt sent to host");

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::unavailable("prompt dropped by host")),
        }
    }

    fn name(&self) -> &str {
        "host-bridge"
    }
}
