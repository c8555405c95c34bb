//! MediationController - validation, dedup, oracle, resolution
//!
//! The controller is responsible for:
//! - Rejecting untrusted origins and fully unsupported requests at intake
//! - Granting immediately when the host already holds every permission
//! - Joining requests to pending entries so one prompt serves many
//! - Driving the oracle for the first waiter of an entry on a tokio task
//! - Resolving every waiter with its own three-way intersection
//!
//! Everything except the oracle call runs synchronously inside
//! `on_capability_request`.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::config::BrokerConfig;
use crate::core::{
    AuthorizationOutcome, BrokerError, BrokerResult, CapabilityRequest, CorrelationToken,
    MediationState, RequestId, Resolution,
};
use crate::oracle::{AuthorizationOracle, ContextLookup, HostGrant};
use crate::permissions::{CapabilityMapper, HostPermission, OriginValidator, OriginVerdict};

use super::handle::{Intake, RequestHandle, ResolutionSink};
use super::registry::{PendingKey, PendingRegistry, Waiter};

/// Mediates capability requests between content and the host oracle
///
/// Cheap to clone; all clones share one registry, so deduplication spans
/// every clone.
#[derive(Clone)]
pub struct MediationController {
    validator: Arc<dyn OriginValidator>,
    mapper: Arc<CapabilityMapper>,
    registry: Arc<PendingRegistry>,
    oracle: Arc<dyn AuthorizationOracle>,
    contexts: Arc<dyn ContextLookup>,
    sink: Arc<dyn ResolutionSink>,
    prompt_timeout: Option<Duration>,
}

impl MediationController {
    /// Create a controller from its collaborators
    pub fn new(
        validator: Arc<dyn OriginValidator>,
        mapper: CapabilityMapper,
        oracle: Arc<dyn AuthorizationOracle>,
        contexts: Arc<dyn ContextLookup>,
        sink: Arc<dyn ResolutionSink>,
    ) -> Self {
        Self {
            validator,
            mapper: Arc::new(mapper),
            registry: Arc::new(PendingRegistry::new()),
            oracle,
            contexts,
            sink,
            prompt_timeout: None,
        }
    }

    /// Create a controller whose validator and mapper come from `config`
    pub fn from_config(
        config: &BrokerConfig,
        oracle: Arc<dyn AuthorizationOracle>,
        contexts: Arc<dyn ContextLookup>,
        sink: Arc<dyn ResolutionSink>,
    ) -> BrokerResult<Self> {
        config.validate()?;
        let mut controller = Self::new(
            Arc::new(config.origin_policy()?),
            config.capability_mapper(),
            oracle,
            contexts,
            sink,
        );
        controller.prompt_timeout = config.prompt_timeout();
        Ok(controller)
    }

    /// Fail prompts that take longer than `timeout`
    pub fn with_prompt_timeout(mut self, timeout: Duration) -> Self {
        self.prompt_timeout = Some(timeout);
        self
    }

    /// Entry point for the rendering engine
    ///
    /// The returned handle is answered later through the sink, or already
    /// has been if `Intake::is_immediate` is true.
    pub fn on_capability_request<I, S>(&self, origin: impl Into<String>, capabilities: I) -> Intake
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.submit(CapabilityRequest::new(origin, capabilities))
    }

    /// Mediate an already-built request
    pub fn submit(&self, request: CapabilityRequest) -> Intake {
        let handle = RequestHandle::new(request.id(), request.origin());
        let mut state = MediationState::Received;
        tracing::debug!(request_id = %handle.id(), origin = %handle.origin(), capabilities = ?request.capabilities(), "Capability request received");

        transition(&handle, &mut state, MediationState::Validating);

        let origin = match self.validator.validate(request.origin()) {
            OriginVerdict::Trusted(origin) => origin,
            OriginVerdict::Untrusted(error) => {
                tracing::info!(request_id = %handle.id(), origin = %handle.origin(), error = %error, "Rejected untrusted origin");
                return self.reject(handle, &request, state);
            }
        };

        let mapped = self.mapper.map_all(request.capabilities());
        if mapped.is_empty() {
            tracing::info!(request_id = %handle.id(), "Rejected: no supported capabilities");
            return self.reject(handle, &request, state);
        }

        let permissions = mapped.host_permissions();
        let held = self.oracle.preflight(&permissions);
        if held.is_superset(&permissions) {
            let outcome = AuthorizationOutcome::intersect(request.capabilities(), |capability| {
                mapped.is_granted(capability, &held)
            });
            tracing::info!(request_id = %handle.id(), "All permissions already held");
            transition(&handle, &mut state, MediationState::Resolved);
            self.deliver(&handle, outcome);
            return Intake { handle, state };
        }

        transition(&handle, &mut state, MediationState::Deduplicating);

        let key = PendingKey::new(origin.to_string(), permissions.clone());
        let join = self.registry.join(key.clone(), Waiter::new(request, mapped));

        if !join.is_first_waiter {
            transition(&handle, &mut state, MediationState::Waiting);
            return Intake { handle, state };
        }

        transition(&handle, &mut state, MediationState::DrivingOracle);
        let missing: BTreeSet<HostPermission> = permissions.difference(&held).cloned().collect();
        self.drive(key, join.token, missing, held);

        Intake { handle, state }
    }

    /// Stop waiting on behalf of a torn-down content context
    ///
    /// No resolution is delivered for `id` afterwards. An oracle prompt
    /// already on screen is left to finish; its outcome still reaches the
    /// other waiters of the same entry.
    pub fn cancel(&self, id: RequestId) -> bool {
        let cancelled = self.registry.cancel(id);
        if cancelled {
            tracing::info!(request_id = %id, "Request cancelled");
        }
        cancelled
    }

    /// Number of in-flight oracle entries
    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    /// Shared registry (for diagnostics)
    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.registry
    }

    fn reject(&self, handle: RequestHandle, request: &CapabilityRequest, mut state: MediationState) -> Intake {
        transition(&handle, &mut state, MediationState::Rejected);
        self.deliver(&handle, AuthorizationOutcome::deny_all(request.capabilities()));
        Intake { handle, state }
    }

    fn deliver(&self, handle: &RequestHandle, outcome: AuthorizationOutcome) {
        let resolution = Resolution::new(handle.id(), handle.origin(), outcome);
        tracing::info!(
            request_id = %handle.id(),
            granted = ?resolution.granted,
            denied = ?resolution.denied,
            "Request resolved"
        );
        self.sink.resolve(handle, &resolution);
    }

    /// Run the oracle for an entry and fan its result out
    fn drive(
        &self,
        key: PendingKey,
        token: CorrelationToken,
        missing: BTreeSet<HostPermission>,
        held: BTreeSet<HostPermission>,
    ) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::error!(token = %token, "No tokio runtime to drive the oracle");
                self.resolve_entry(&key, token, Err(BrokerError::unavailable("no async runtime")));
                return;
            }
        };

        let controller = self.clone();
        runtime.spawn(async move {
            if !controller.registry.start(&key, token) {
                tracing::warn!(token = %token, key = %key, "Entry gone before the oracle started");
                return;
            }

            // A panicking oracle must still resolve the entry, or the key stays stuck
            let result = AssertUnwindSafe(controller.invoke_oracle(token, &missing))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(BrokerError::oracle_failed(panic_message(&*panic))))
                .map(|grant| grant.with_held(&held));
            controller.resolve_entry(&key, token, result);
        });
    }

    async fn invoke_oracle(
        &self,
        token: CorrelationToken,
        permissions: &BTreeSet<HostPermission>,
    ) -> BrokerResult<HostGrant> {
        let context = self
            .contexts
            .prompt_context()
            .ok_or_else(|| BrokerError::unavailable("no context can present the prompt"))?;

        tracing::info!(token = %token, oracle = self.oracle.name(), context = %context.id, permissions = ?permissions, "Prompting for host permissions");

        let prompt = self.oracle.request(&context, token, permissions);
        match self.prompt_timeout {
            Some(timeout) => tokio::time::timeout(timeout, prompt)
                .await
                .map_err(|_| BrokerError::PromptTimedOut(timeout))?,
            None => prompt.await,
        }
    }

    fn resolve_entry(&self, key: &PendingKey, token: CorrelationToken, result: BrokerResult<HostGrant>) {
        if let Err(e) = &result {
            tracing::warn!(token = %token, key = %key, error = %e, "Oracle failed; denying all waiters");
        }

        let delivered = self.registry.resolve(key, token, &result, |waiter, outcome| {
            let handle = waiter.handle();
            tracing::debug!(request_id = %handle.id(), to = %MediationState::Resolved, "State transition");
            self.deliver(&handle, outcome);
        });

        tracing::debug!(token = %token, delivered, "Entry resolved");
    }
}

impl std::fmt::Debug for MediationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediationController")
            .field("pending", &self.registry.len())
            .field("prompt_timeout", &self.prompt_timeout)
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("oracle panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("oracle panicked: {}", message)
    } else {
        "oracle panicked".to_string()
    }
}

fn transition(handle: &RequestHandle, state: &mut MediationState, next: MediationState) {
    debug_assert!(state.can_transition_to(next), "illegal transition {} -> {}", state, next);
    tracing::debug!(request_id = %handle.id(), from = %state, to = %next, "State transition");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{ForegroundTracker, HostPromptBridge, PromptContext};
    use crate::permissions::{OriginPolicy, OriginRule};
    use crate::runtime::channels::ChannelSink;
    use crate::runtime::{OracleState, ResolutionReceiver};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    const TRUSTED: &str = "https://trusted.example";
    const EVIL: &str = "https://evil.example";

    /// Oracle double that answers from a script, optionally waiting for a release
    struct ScriptedOracle {
        calls: AtomicUsize,
        asked: Mutex<Vec<BTreeSet<HostPermission>>>,
        replies: Mutex<VecDeque<BrokerResult<HostGrant>>>,
        held: BTreeSet<HostPermission>,
        gate: Option<Notify>,
    }

    impl ScriptedOracle {
        fn new(replies: Vec<BrokerResult<HostGrant>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                asked: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into()),
                held: BTreeSet::new(),
                gate: None,
            }
        }

        fn granting(perms: &[&str]) -> Self {
            Self::new(vec![Ok(HostGrant::new(perms.iter().copied()))])
        }

        fn gated(mut self) -> Self {
            self.gate = Some(Notify::new());
            self
        }

        fn holding(mut self, perms: &[&str]) -> Self {
            self.held = perms.iter().map(|p| HostPermission::from(*p)).collect();
            self
        }

        fn release(&self) {
            if let Some(gate) = &self.gate {
                gate.notify_one();
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl AuthorizationOracle for ScriptedOracle {
        fn preflight(&self, permissions: &BTreeSet<HostPermission>) -> BTreeSet<HostPermission> {
            permissions.intersection(&self.held).cloned().collect()
        }

        async fn request(
            &self,
            _context: &PromptContext,
            _token: CorrelationToken,
            permissions: &BTreeSet<HostPermission>,
        ) -> BrokerResult<HostGrant> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.asked.lock().unwrap().push(permissions.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BrokerError::oracle_failed("script exhausted")))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    /// Oracle double whose first prompt panics; later prompts grant everything asked
    #[derive(Default)]
    struct PanickingOracle {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl AuthorizationOracle for PanickingOracle {
        async fn request(
            &self,
            _context: &PromptContext,
            _token: CorrelationToken,
            permissions: &BTreeSet<HostPermission>,
        ) -> BrokerResult<HostGrant> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("dialog crashed");
            }
            Ok(HostGrant::new(permissions.iter().cloned()))
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    fn perms(items: &[&str]) -> BTreeSet<HostPermission> {
        items.iter().map(|p| HostPermission::from(*p)).collect()
    }

    fn caps(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn setup_with(
        oracle: Arc<dyn AuthorizationOracle>,
        contexts: Arc<dyn ContextLookup>,
    ) -> (MediationController, ResolutionReceiver) {
        let validator = OriginPolicy::with_rules(vec![OriginRule::exact(TRUSTED)]).unwrap();
        // Content ids double as host ids to keep scenarios readable
        let mapper = CapabilityMapper::new()
            .with_mapping("camera", "camera")
            .with_mapping("microphone", "microphone");
        let (sink, rx) = ChannelSink::channel();
        let controller = MediationController::new(Arc::new(validator), mapper, oracle, contexts, Arc::new(sink));
        (controller, rx)
    }

    fn setup(oracle: Arc<ScriptedOracle>) -> (MediationController, ResolutionReceiver) {
        setup_with(oracle, Arc::new(ForegroundTracker::with_context(PromptContext::new("main"))))
    }

    #[tokio::test]
    async fn test_untrusted_origin_denied_without_oracle() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]));
        let (controller, mut rx) = setup(oracle.clone());

        let intake = controller.on_capability_request(EVIL, ["camera"]);
        assert_eq!(intake.state, MediationState::Rejected);

        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.request_id, intake.handle.id());
        assert!(resolution.granted.is_empty());
        assert_eq!(resolution.denied, caps(&["camera"]));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_unsupported_resolves_immediately() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]));
        let (controller, mut rx) = setup(oracle.clone());

        let intake = controller.on_capability_request(TRUSTED, ["midi", "geolocation"]);
        assert!(intake.is_immediate());

        // Already delivered before any await
        let resolution = rx.try_recv().unwrap();
        assert!(resolution.granted.is_empty());
        assert_eq!(resolution.denied, caps(&["midi", "geolocation"]));
        assert_eq!(oracle.calls(), 0);
        assert_eq!(controller.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_request_is_rejected() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]));
        let (controller, mut rx) = setup(oracle.clone());

        let intake = controller.on_capability_request(TRUSTED, Vec::<String>::new());
        assert_eq!(intake.state, MediationState::Rejected);
        assert!(!rx.try_recv().unwrap().is_granted());
    }

    #[tokio::test]
    async fn test_broader_oracle_grant_is_intersected() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera", "microphone"]));
        let (controller, mut rx) = setup(oracle.clone());

        let intake = controller.on_capability_request(TRUSTED, ["camera"]);
        assert_eq!(intake.state, MediationState::DrivingOracle);

        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.granted, caps(&["camera"]));
        assert!(resolution.denied.is_empty());
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_partial_grant_with_unsupported_capability() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]));
        let (controller, mut rx) = setup(oracle.clone());

        controller.on_capability_request(TRUSTED, ["camera", "microphone", "midi"]);

        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.granted, caps(&["camera"]));
        assert_eq!(resolution.denied, caps(&["microphone", "midi"]));
        // Unsupported capabilities never reach the oracle
        assert_eq!(oracle.asked.lock().unwrap()[0], perms(&["camera", "microphone"]));
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_prompt() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]).gated());
        let (controller, mut rx) = setup(oracle.clone());

        let a = controller.on_capability_request(TRUSTED, ["camera"]);
        let b = controller.on_capability_request(TRUSTED, ["camera"]);
        assert_eq!(a.state, MediationState::DrivingOracle);
        assert_eq!(b.state, MediationState::Waiting);
        assert_eq!(controller.pending_count(), 1);

        oracle.release();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let ids: BTreeSet<RequestId> = [first.request_id, second.request_id].into();
        assert_eq!(ids, BTreeSet::from([a.handle.id(), b.handle.id()]));
        assert_eq!(first.granted, caps(&["camera"]));
        assert_eq!(second.granted, caps(&["camera"]));

        assert_eq!(oracle.calls(), 1);
        assert_eq!(controller.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_identical_requests_prompt_once() {
        const REQUESTS: usize = 32;
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]).gated());
        let (controller, mut rx) = setup(oracle.clone());

        let tasks: Vec<_> = (0..REQUESTS)
            .map(|_| {
                let controller = controller.clone();
                tokio::spawn(async move { controller.on_capability_request(TRUSTED, ["camera"]) })
            })
            .collect();
        let intakes: Vec<Intake> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let drivers = intakes
            .iter()
            .filter(|intake| intake.state == MediationState::DrivingOracle)
            .count();
        assert_eq!(drivers, 1);
        assert_eq!(controller.pending_count(), 1);

        oracle.release();

        let mut resolved = BTreeSet::new();
        for _ in 0..REQUESTS {
            let resolution = rx.recv().await.unwrap();
            assert_eq!(resolution.granted, caps(&["camera"]));
            assert!(resolved.insert(resolution.request_id));
        }
        let submitted: BTreeSet<RequestId> = intakes.iter().map(|intake| intake.handle.id()).collect();
        assert_eq!(resolved, submitted);
        assert_eq!(oracle.calls(), 1);
        assert_eq!(controller.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_oracle_denies_and_frees_key() {
        let oracle = Arc::new(PanickingOracle::default());
        let (controller, mut rx) = setup_with(
            oracle.clone(),
            Arc::new(ForegroundTracker::with_context(PromptContext::new("main"))),
        );

        let a = controller.on_capability_request(TRUSTED, ["camera"]);
        let b = controller.on_capability_request(TRUSTED, ["camera"]);
        assert_eq!(b.state, MediationState::Waiting);

        let mut denied = BTreeSet::new();
        for _ in 0..2 {
            let resolution = rx.recv().await.unwrap();
            assert!(!resolution.is_granted());
            assert_eq!(resolution.denied, caps(&["camera"]));
            denied.insert(resolution.request_id);
        }
        assert_eq!(denied, BTreeSet::from([a.handle.id(), b.handle.id()]));
        assert_eq!(controller.pending_count(), 0);

        // The key is free again, so the next request prompts afresh
        let retry = controller.on_capability_request(TRUSTED, ["camera"]);
        assert_eq!(retry.state, MediationState::DrivingOracle);

        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.request_id, retry.handle.id());
        assert_eq!(resolution.granted, caps(&["camera"]));
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_oracle_state_follows_driver_task() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]).gated());
        let (controller, mut rx) = setup(oracle.clone());
        let key = PendingKey::new(TRUSTED, perms(&["camera"]));

        controller.on_capability_request(TRUSTED, ["camera"]);
        // The driver task has not been polled yet on this thread
        assert_eq!(controller.registry().oracle_state(&key), Some(OracleState::NotStarted));

        while oracle.calls() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(controller.registry().oracle_state(&key), Some(OracleState::InFlight));

        oracle.release();
        rx.recv().await.unwrap();
        assert_eq!(controller.registry().oracle_state(&key), None);
    }

    #[tokio::test]
    async fn test_waiters_get_their_own_intersection() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]).gated());
        let (controller, mut rx) = setup(oracle.clone());

        // Same key (only `camera` is supported in both), different requests
        let plain = controller.on_capability_request(TRUSTED, ["camera"]);
        let extra = controller.on_capability_request(TRUSTED, ["camera", "midi"]);
        assert_eq!(extra.state, MediationState::Waiting);

        oracle.release();

        for _ in 0..2 {
            let resolution = rx.recv().await.unwrap();
            assert_eq!(resolution.granted, caps(&["camera"]));
            if resolution.request_id == plain.handle.id() {
                assert!(resolution.denied.is_empty());
            } else {
                assert_eq!(resolution.denied, caps(&["midi"]));
            }
        }
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_different_keys_prompt_separately() {
        let oracle = Arc::new(ScriptedOracle::new(vec![
            Ok(HostGrant::new(["camera"])),
            Ok(HostGrant::new(["microphone"])),
        ]));
        let (controller, mut rx) = setup(oracle.clone());

        let a = controller.on_capability_request(TRUSTED, ["camera"]);
        let b = controller.on_capability_request(TRUSTED, ["microphone"]);
        assert_eq!(a.state, MediationState::DrivingOracle);
        assert_eq!(b.state, MediationState::DrivingOracle);

        rx.recv().await.unwrap();
        rx.recv().await.unwrap();
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn test_oracle_unavailable_denies_all_and_clears_entry() {
        let oracle = Arc::new(
            ScriptedOracle::new(vec![
                Err(BrokerError::unavailable("no foreground activity")),
                Ok(HostGrant::new(["camera"])),
            ])
            .gated(),
        );
        let (controller, mut rx) = setup(oracle.clone());

        controller.on_capability_request(TRUSTED, ["camera"]);
        controller.on_capability_request(TRUSTED, ["camera"]);
        oracle.release();

        for _ in 0..2 {
            let resolution = rx.recv().await.unwrap();
            assert!(resolution.granted.is_empty());
            assert_eq!(resolution.denied, caps(&["camera"]));
        }
        assert_eq!(controller.pending_count(), 0);

        // A fresh request prompts again instead of replaying the failure
        let retry = controller.on_capability_request(TRUSTED, ["camera"]);
        assert_eq!(retry.state, MediationState::DrivingOracle);
        oracle.release();

        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.granted, caps(&["camera"]));
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_prompt_context_is_full_denial() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]));
        let (controller, mut rx) = setup_with(oracle.clone(), Arc::new(ForegroundTracker::new()));

        controller.on_capability_request(TRUSTED, ["camera"]);

        let resolution = rx.recv().await.unwrap();
        assert!(!resolution.is_granted());
        assert_eq!(oracle.calls(), 0);
        assert_eq!(controller.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_held_permissions_grant_without_prompt() {
        let oracle = Arc::new(ScriptedOracle::granting(&[]).holding(&["camera"]));
        let (controller, mut rx) = setup(oracle.clone());

        let intake = controller.on_capability_request(TRUSTED, ["camera", "midi"]);
        assert_eq!(intake.state, MediationState::Resolved);

        let resolution = rx.try_recv().unwrap();
        assert_eq!(resolution.granted, caps(&["camera"]));
        assert_eq!(resolution.denied, caps(&["midi"]));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test]
    async fn test_partially_held_prompts_only_for_missing() {
        let oracle = Arc::new(ScriptedOracle::granting(&["microphone"]).holding(&["camera"]));
        let (controller, mut rx) = setup(oracle.clone());

        controller.on_capability_request(TRUSTED, ["camera", "microphone"]);

        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.granted, caps(&["camera", "microphone"]));
        assert_eq!(oracle.asked.lock().unwrap()[0], perms(&["microphone"]));
    }

    #[tokio::test]
    async fn test_cancelled_waiter_gets_nothing() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]).gated());
        let (controller, mut rx) = setup(oracle.clone());

        let driver = controller.on_capability_request(TRUSTED, ["camera"]);
        let waiter = controller.on_capability_request(TRUSTED, ["camera"]);
        assert!(controller.cancel(waiter.handle.id()));
        assert!(!controller.cancel(waiter.handle.id()));

        oracle.release();

        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.request_id, driver.handle.id());
        // Give the driver task a chance to deliver anything else
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_cancelled_driver_still_serves_waiters() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]).gated());
        let (controller, mut rx) = setup(oracle.clone());

        let driver = controller.on_capability_request(TRUSTED, ["camera"]);
        assert!(controller.cancel(driver.handle.id()));

        // Joins the surviving entry rather than prompting again
        let waiter = controller.on_capability_request(TRUSTED, ["camera"]);
        assert_eq!(waiter.state, MediationState::Waiting);

        oracle.release();

        let resolution = rx.recv().await.unwrap();
        assert_eq!(resolution.request_id, waiter.handle.id());
        assert_eq!(resolution.granted, caps(&["camera"]));
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_prompt_timeout_denies() {
        // Never released
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]).gated());
        let (controller, mut rx) = setup(oracle.clone());
        let controller = controller.with_prompt_timeout(Duration::from_millis(20));

        controller.on_capability_request(TRUSTED, ["camera"]);

        let resolution = rx.recv().await.unwrap();
        assert!(!resolution.is_granted());
        assert_eq!(controller.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_origin_normalised_for_dedup() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]).gated());
        let (controller, mut rx) = setup(oracle.clone());

        controller.on_capability_request("https://trusted.example", ["camera"]);
        let b = controller.on_capability_request("HTTPS://Trusted.Example:443/live", ["camera"]);
        assert_eq!(b.state, MediationState::Waiting);

        oracle.release();
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        // Each resolution keeps the origin its request claimed
        let origins: BTreeSet<String> = [first.origin, second.origin].into();
        assert!(origins.contains("HTTPS://Trusted.Example:443/live"));
        assert_eq!(oracle.calls(), 1);
    }

    #[tokio::test]
    async fn test_end_to_end_with_host_bridge() {
        let (bridge, mut prompts) = HostPromptBridge::new();
        let bridge = Arc::new(bridge);
        let (controller, mut rx) = setup_with(
            bridge.clone(),
            Arc::new(ForegroundTracker::with_context(PromptContext::new("main"))),
        );

        let a = controller.on_capability_request(TRUSTED, ["camera"]);
        let b = controller.on_capability_request(TRUSTED, ["camera"]);

        let prompt = prompts.recv().await.unwrap();
        assert_eq!(prompt.permissions, perms(&["camera"]));
        // The OS grants more than was asked
        assert!(bridge.deliver(prompt.token, ["camera", "microphone"]));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.granted, caps(&["camera"]));
        assert_eq!(second.granted, caps(&["camera"]));
        let ids: BTreeSet<RequestId> = [first.request_id, second.request_id].into();
        assert_eq!(ids, BTreeSet::from([a.handle.id(), b.handle.id()]));
        assert!(prompts.try_recv().is_err());

        // Held now, so the next request skips the prompt entirely
        let c = controller.on_capability_request(TRUSTED, ["camera"]);
        assert_eq!(c.state, MediationState::Resolved);
        assert_eq!(rx.try_recv().unwrap().granted, caps(&["camera"]));
    }

    #[test]
    fn test_without_runtime_denies() {
        let oracle = Arc::new(ScriptedOracle::granting(&["camera"]));
        let (controller, mut rx) = setup(oracle.clone());

        let intake = controller.on_capability_request(TRUSTED, ["camera"]);
        assert_eq!(intake.state, MediationState::DrivingOracle);

        let resolution = rx.try_recv().unwrap();
        assert!(!resolution.is_granted());
        assert_eq!(controller.pending_count(), 0);
        assert_eq!(oracle.calls(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = BrokerConfig::new()
            .with_origin(OriginRule::host_suffix("trusted.example"))
            .with_prompt_timeout(5);
        let (sink, _rx) = ChannelSink::channel();
        let controller = MediationController::from_config(
            &config,
            Arc::new(ScriptedOracle::granting(&[])),
            Arc::new(ForegroundTracker::new()),
            Arc::new(sink),
        )
        .unwrap();
        assert_eq!(controller.prompt_timeout, Some(Duration::from_secs(5)));
    }
}
