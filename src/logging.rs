//! Logging setup
//!
//! Console output filtered by `RUST_LOG` (default `permission_broker=info`),
//! plus a daily-rolling JSON log under `logs/`.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::{BrokerError, BrokerResult};

/// Default directory for log files
const LOG_DIR: &str = "logs";

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "permission_broker=info";

/// Initialise logging with the default log directory
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init_logging() -> BrokerResult<WorkerGuard> {
    init_logging_in(LOG_DIR)
}

/// Initialise logging, writing log files to `dir`
pub fn init_logging_in(dir: impl AsRef<std::path::Path>) -> BrokerResult<WorkerGuard> {
    std::fs::create_dir_all(dir.as_ref())?;

    let file_appender = tracing_appender::rolling::daily(dir.as_ref(), "permission-broker.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(fmt::layer().json().with_writer(file_writer))
        .try_init()
        .map_err(|e| BrokerError::InvalidConfig(format!("logging already initialised: {}", e)))?;

    Ok(guard)
}
