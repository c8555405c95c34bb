//! Mediation runtime
//!
//! This module provides the stateful half of the broker:
//! - `MediationController` - Runs each request through the mediation state machine
//! - `PendingRegistry` - Deduplicates in-flight requests per (origin, permissions)
//! - `RequestHandle` / `ResolutionSink` - The rendering engine's view of a request
//! - Channel helpers for engines that consume resolutions as a stream
//!
//! Oracle calls run as tokio tasks; everything else runs inline in
//! `MediationController::on_capability_request`.

pub mod channels;
pub mod controller;
pub mod handle;
pub mod registry;

pub use channels::{ChannelSink, ResolutionReceiver, ResolutionSender};
pub use controller::MediationController;
pub use handle::{Intake, RequestHandle, ResolutionSink};
pub use registry::{JoinOutcome, OracleState, PendingKey, PendingRegistry, Waiter};
