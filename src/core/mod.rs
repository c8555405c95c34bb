//! Core types for the broker
//!
//! This module provides the fundamental types used throughout the crate:
//! - `CapabilityRequest` / `Resolution` - What comes in and what goes back out
//! - `AuthorizationOutcome` - Grant/deny split for one request
//! - `MediationState` - Where a request is in the flow
//! - `BrokerError` - Error types

pub mod error;
pub mod request;
pub mod state;

pub use error::{BrokerError, BrokerResult};
pub use request::{AuthorizationOutcome, CapabilityRequest, CorrelationToken, RequestId, Resolution};
pub use state::MediationState;
