//! Logging subsystem built on `tracing-subscriber`.

pub mod manager;
pub mod types;

#[cfg(test)]
mod tests;

pub use manager::{LoggingError, build_filter, init, init_test_logging};
pub use types::{FileLoggingConfig, LoggerConfig, StdoutConfig};

// Re-export tracing-appender types for convenience
pub use tracing_appender::rolling::Rotation;
