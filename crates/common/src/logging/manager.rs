//! Logging initialization.

use thiserror::Error;
use tracing::*;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{
    EnvFilter, Layer, filter::ParseError, fmt::layer, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use super::types::LoggerConfig;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid filter directive {directive:?}: {source}")]
    InvalidDirective {
        directive: String,
        #[source]
        source: ParseError,
    },

    #[error("a global subscriber is already installed")]
    AlreadyInitialized,
}

/// Builds the filter: `INFO` by default, then `RUST_LOG`, then `directives`.
pub fn build_filter(directives: &[String]) -> Result<EnvFilter, LoggingError> {
    let mut filt = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    for directive in directives {
        let parsed = directive
            .parse()
            .map_err(|source| LoggingError::InvalidDirective {
                directive: directive.clone(),
                source,
            })?;
        filt = filt.add_directive(parsed);
    }

    Ok(filt)
}

/// Initializes the logging subsystem with the provided config.
pub fn init(config: LoggerConfig) -> Result<(), LoggingError> {
    let filt = build_filter(&config.directives)?;

    // Configure stdout logging with JSON or compact format
    let stdout_sub = if config.stdout_config.json_format {
        layer()
            .json()
            .with_span_events(config.stdout_config.fmt_span.clone())
            .with_filter(filt.clone())
            .boxed()
    } else {
        layer()
            .compact()
            .with_span_events(config.stdout_config.fmt_span.clone())
            .with_filter(filt.clone())
            .boxed()
    };

    // Build optional file logging layer
    let file_layer = config.file_logging_config.as_ref().map(|file_config| {
        let file_appender = RollingFileAppender::new(
            file_config.rotation.clone(),
            &file_config.directory,
            &file_config.file_name_prefix,
        );

        if file_config.json_format {
            layer()
                .json()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(filt.clone())
                .boxed()
        } else {
            layer()
                .compact()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_filter(filt.clone())
                .boxed()
        }
    });

    tracing_subscriber::registry()
        .with(stdout_sub)
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    info!(service_name = %config.service_name, "logging initialized");
    Ok(())
}

/// Installs a subscriber writing through the test harness capture.
///
/// Safe to call from every test, only the first call takes effect.
pub fn init_test_logging() {
    let filt = EnvFilter::builder()
        .with_default_directive(Level::DEBUG.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filt)
        .with_test_writer()
        .try_init();
}
