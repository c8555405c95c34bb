//! PendingRegistry - in-flight mediation entries
//!
//! One entry per (origin, host permission set). The first request for a key
//! drives the oracle; later requests for the same key join as waiters and
//! share the outcome. Waiter lists are only touched through `join`,
//! `resolve` and `cancel`, all of which run under a single lock.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Mutex;

use crate::core::{AuthorizationOutcome, BrokerResult, CapabilityRequest, CorrelationToken, RequestId};
use crate::oracle::HostGrant;
use crate::permissions::{HostPermission, MappedCapabilities};

use super::handle::RequestHandle;

/// Deduplication key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PendingKey {
    origin: String,
    permissions: BTreeSet<HostPermission>,
}

impl PendingKey {
    pub fn new(origin: impl Into<String>, permissions: BTreeSet<HostPermission>) -> Self {
        Self {
            origin: origin.into(),
            permissions,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn permissions(&self) -> &BTreeSet<HostPermission> {
        &self.permissions
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let permissions: Vec<&str> = self.permissions.iter().map(|p| p.as_str()).collect();
        write!(f, "{} [{}]", self.origin, permissions.join(", "))
    }
}

/// Progress of the oracle invocation behind an entry
///
/// An entry is `NotStarted` from `join` until its driver calls `start`,
/// and `Resolved` only on the way out of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleState {
    NotStarted,
    InFlight,
    Resolved,
}

/// A request waiting on an entry
///
/// Not `Clone`: a waiter is moved out of the registry exactly once, when
/// its entry resolves, so it cannot be answered twice.
#[derive(Debug)]
pub struct Waiter {
    request: CapabilityRequest,
    mapped: MappedCapabilities,
}

impl Waiter {
    pub fn new(request: CapabilityRequest, mapped: MappedCapabilities) -> Self {
        Self { request, mapped }
    }

    pub fn id(&self) -> RequestId {
        self.request.id()
    }

    pub fn handle(&self) -> RequestHandle {
        RequestHandle::new(self.request.id(), self.request.origin())
    }

    pub fn request(&self) -> &CapabilityRequest {
        &self.request
    }

    /// This waiter's share of the oracle result
    ///
    /// A capability is granted only if it was requested, maps to a host
    /// permission, and that permission is in the grant. Any oracle error
    /// denies everything.
    pub fn outcome(&self, result: &BrokerResult<HostGrant>) -> AuthorizationOutcome {
        match result {
            Ok(grant) => AuthorizationOutcome::intersect(self.request.capabilities(), |capability| {
                self.mapped.is_granted(capability, &grant.granted)
            }),
            Err(_) => AuthorizationOutcome::deny_all(self.request.capabilities()),
        }
    }
}

#[derive(Debug)]
struct PendingEntry {
    token: CorrelationToken,
    waiters: Vec<Waiter>,
    oracle_state: OracleState,
}

/// Result of joining an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    /// The caller created the entry and must drive the oracle
    pub is_first_waiter: bool,
    /// Token of the entry that was joined
    pub token: CorrelationToken,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<PendingKey, PendingEntry>,
    /// Which entry each waiting request belongs to
    index: HashMap<RequestId, PendingKey>,
    next_token: u64,
}

/// Registry of in-flight mediation entries
#[derive(Debug, Default)]
pub struct PendingRegistry {
    inner: Mutex<RegistryInner>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `waiter` on the entry for `key`, creating it if absent
    ///
    /// Only the waiter that creates the entry gets `is_first_waiter`. The
    /// entry is visible before the lock is released, so a racing join
    /// always lands on it even if the oracle has not started yet.
    pub fn join(&self, key: PendingKey, waiter: Waiter) -> JoinOutcome {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let RegistryInner {
            entries,
            index,
            next_token,
        } = &mut *inner;

        index.insert(waiter.id(), key.clone());

        if let Some(entry) = entries.get_mut(&key) {
            entry.waiters.push(waiter);
            tracing::debug!(key = %key, token = %entry.token, waiters = entry.waiters.len(), "Joined pending entry");
            return JoinOutcome {
                is_first_waiter: false,
                token: entry.token,
            };
        }

        *next_token += 1;
        let token = CorrelationToken(*next_token);
        let entry = PendingEntry {
            token,
            waiters: vec![waiter],
            oracle_state: OracleState::NotStarted,
        };
        tracing::debug!(key = %key, token = %token, "Created pending entry");
        entries.insert(key, entry);

        JoinOutcome {
            is_first_waiter: true,
            token,
        }
    }

    /// Mark the oracle call for `key` as in flight
    ///
    /// Returns false if `token` no longer names a not-yet-started entry.
    pub fn start(&self, key: &PendingKey, token: CorrelationToken) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match inner.entries.get_mut(key) {
            Some(entry) if entry.token == token && entry.oracle_state == OracleState::NotStarted => {
                entry.oracle_state = OracleState::InFlight;
                true
            }
            _ => false,
        }
    }

    /// Remove the entry for `key` and hand each waiter its outcome
    ///
    /// The entry is removed before `deliver` runs, so a request arriving
    /// during fan-out starts a new entry. Does nothing unless `token`
    /// matches the current entry. Returns the number of waiters delivered.
    pub fn resolve<F>(
        &self,
        key: &PendingKey,
        token: CorrelationToken,
        result: &BrokerResult<HostGrant>,
        mut deliver: F,
    ) -> usize
    where
        F: FnMut(Waiter, AuthorizationOutcome),
    {
        let mut entry = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            match inner.entries.get(key) {
                Some(entry) if entry.token == token => {}
                Some(entry) => {
                    tracing::warn!(key = %key, token = %token, current = %entry.token, "Ignoring stale resolve");
                    return 0;
                }
                None => {
                    tracing::warn!(key = %key, token = %token, "Resolve for missing entry");
                    return 0;
                }
            }
            let Some(entry) = inner.entries.remove(key) else {
                return 0;
            };
            for waiter in &entry.waiters {
                inner.index.remove(&waiter.id());
            }
            entry
        };
        entry.oracle_state = OracleState::Resolved;

        tracing::debug!(key = %key, token = %token, state = ?entry.oracle_state, waiters = entry.waiters.len(), "Fanning out");

        let count = entry.waiters.len();
        for waiter in entry.waiters {
            let outcome = waiter.outcome(result);
            deliver(waiter, outcome);
        }
        count
    }

    /// Drop a request from its entry's waiter list
    ///
    /// The entry itself stays until its oracle call completes, so later
    /// requests for the same key keep joining it instead of prompting again.
    pub fn cancel(&self, id: RequestId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let Some(key) = inner.index.remove(&id) else {
            return false;
        };
        match inner.entries.get_mut(&key) {
            Some(entry) => {
                entry.waiters.retain(|w| w.id() != id);
                tracing::debug!(key = %key, request_id = %id, remaining = entry.waiters.len(), "Waiter cancelled");
                true
            }
            None => false,
        }
    }

    /// Number of in-flight entries
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &PendingKey) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .contains_key(key)
    }

    /// Number of requests waiting on `key` (0 if no entry)
    pub fn waiter_count(&self, key: &PendingKey) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .get(key)
            .map(|e| e.waiters.len())
            .unwrap_or(0)
    }

    pub fn oracle_state(&self, key: &PendingKey) -> Option<OracleState> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .get(key)
            .map(|e| e.oracle_state)
    }

    /// Whether `id` is still waiting on some entry
    pub fn is_waiting(&self, id: RequestId) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .index
            .contains_key(&id)
    }
}
