//! Unit tests for the logging subsystem.

use std::path::PathBuf;

use tracing::info;

use super::*;

#[test]
fn test_logger_config_builder_pattern() {
    let config = LoggerConfig::new("peg-node".to_string())
        .with_json_logging(true)
        .with_directive("strata_peg_bridge=debug")
        .with_file_logging(
            FileLoggingConfig::new(PathBuf::from("/tmp/logs"), "peg".to_string())
                .with_rotation(Rotation::HOURLY)
                .with_json_format(true),
        );

    assert_eq!(config.service_name, "peg-node");
    assert!(config.stdout_config.json_format);
    assert_eq!(config.directives, vec!["strata_peg_bridge=debug".to_string()]);
    let file = config.file_logging_config.unwrap();
    assert_eq!(file.file_name_prefix, "peg");
    assert!(file.json_format);
}

#[test]
fn test_default_config() {
    let config = LoggerConfig::default();
    assert!(!config.stdout_config.json_format);
    assert!(config.file_logging_config.is_none());
    assert!(config.directives.is_empty());
}

#[test]
fn test_build_filter_with_directives() {
    let filt = build_filter(&[
        "strata_peg_bridge=trace".to_string(),
        "strata_peg_btc_verification=warn".to_string(),
    ])
    .unwrap();
    assert!(filt.to_string().contains("strata_peg_bridge=trace"));
}

#[test]
fn test_init_test_logging_is_reentrant() {
    init_test_logging();
    init_test_logging();
    info!("still alive");

    // A real subscriber can no longer be installed.
    let err = init(LoggerConfig::default()).unwrap_err();
    assert!(matches!(err, LoggingError::AlreadyInitialized));
}
