//! Context lookup service
//!
//! Decides who can present a permission prompt, independently of who
//! issued the request. The host keeps a `ForegroundTracker` up to date as
//! its UI contexts come and go.

use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// A UI context able to present a permission prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    pub id: String,
    pub label: Option<String>,
}

impl PromptContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Finds the context that should present the next prompt
pub trait ContextLookup: Send + Sync {
    /// `None` when nothing is in the foreground
    fn prompt_context(&self) -> Option<PromptContext>;
}

/// Tracks foreground contexts, most recently resumed on top
#[derive(Debug, Default)]
pub struct ForegroundTracker {
    stack: RwLock<Vec<PromptContext>>,
}

impl ForegroundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a single foreground context
    pub fn with_context(context: PromptContext) -> Self {
        Self {
            stack: RwLock::new(vec![context]),
        }
    }

    /// Bring a context to the foreground
    pub fn resume(&self, context: PromptContext) {
        let mut stack = self.stack.write().unwrap_or_else(|e| e.into_inner());
        stack.retain(|c| c.id != context.id);
        tracing::debug!(context = %context.id, "Prompt context resumed");
        stack.push(context);
    }

    /// Remove a context; returns whether it was tracked
    pub fn pause(&self, id: &str) -> bool {
        let mut stack = self.stack.write().unwrap_or_else(|e| e.into_inner());
        let before = stack.len();
        stack.retain(|c| c.id != id);
        tracing::debug!(context = %id, "Prompt context paused");
        stack.len() != before
    }

    pub fn clear(&self) {
        self.stack.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl ContextLookup for ForegroundTracker {
    fn prompt_context(&self) -> Option<PromptContext> {
        self.stack
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}
