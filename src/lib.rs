pub mod config;
pub mod core;
pub mod oracle;
pub mod permissions;
pub mod runtime;

// Optional components
pub mod cli;
pub mod logging;

pub use config::BrokerConfig;
pub use core::{BrokerError, BrokerResult, MediationState, Resolution};
pub use runtime::{MediationController, RequestHandle, ResolutionSink};
