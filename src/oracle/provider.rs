//! Authorization oracle trait
//!
//! Abstracts the host's permission-prompt flow so the controller can drive
//! any host (a callback-based OS API, a terminal, a test double) the same way.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::{BrokerResult, CorrelationToken};
use crate::permissions::HostPermission;

use super::context::PromptContext;

/// Host permissions granted by one oracle invocation
///
/// May be broader than what was asked for; the controller intersects it
/// with each request before anything reaches the content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostGrant {
    pub granted: BTreeSet<HostPermission>,
}

impl HostGrant {
    pub fn new<I, P>(granted: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<HostPermission>,
    {
        Self {
            granted: granted.into_iter().map(Into::into).collect(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Merge permissions that were already held before prompting
    pub fn with_held(mut self, held: &BTreeSet<HostPermission>) -> Self {
        self.granted.extend(held.iter().cloned());
        self
    }

    pub fn contains(&self, permission: &HostPermission) -> bool {
        self.granted.contains(permission)
    }
}

/// The host's asynchronous permission authority
///
/// `request` suspends for as long as the user takes to answer. It fails
/// with `BrokerError::OracleUnavailable` when the prompt cannot be shown.
#[async_trait::async_trait]
pub trait AuthorizationOracle: Send + Sync {
    /// Host permissions already held, checked without prompting.
    ///
    /// Must not block. The default reports nothing held.
    fn preflight(&self, _permissions: &BTreeSet<HostPermission>) -> BTreeSet<HostPermission> {
        BTreeSet::new()
    }

    /// Prompt for `permissions` in `context`.
    ///
    /// `token` identifies this invocation to the host; callback-style hosts
    /// use it to route their result back to the right continuation.
    async fn request(
        &self,
        context: &PromptContext,
        token: CorrelationToken,
        permissions: &BTreeSet<HostPermission>,
    ) -> BrokerResult<HostGrant>;

    /// Get the oracle name (for logs)
    fn name(&self) -> &str;
}
