//! Configuration Tests

use crate::common::*;
use std::io::Write;

#[test]
fn open_from_config_file() {
    init_tracing();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[transactions]
max_idle_time = 30
transactions_per_tick = 3

[event_loop]
wake_period_ms = 50

[connections]
max_connections = 2
content_type = "application/x-protobuf"
"#
    )
    .unwrap();

    let courier: Courier<u32> = Courier::from_config_file(file.path()).unwrap();
    let config = courier.config();
    assert_eq!(config.transactions.max_idle_time, 30);
    assert_eq!(config.event_loop.wake_period_ms, 50);
    assert_eq!(config.event_loop.request_timeout_ms, 30_000);
    assert_eq!(config.connections.max_connections, 2);

    // Rounded up to a power of two
    assert_eq!(courier.transactions().slots_per_tick(), 4);
    assert_eq!(courier.transactions().max_idle_time(), 30);
}

#[test]
fn missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Courier::<u32>::from_config_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(err.is_config());
    assert!(matches!(err, courier::Error::Config(courier::ConfigError::Io(_))));
}

#[test]
fn invalid_values_are_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[connections]\nmax_pending_per_address = 0").unwrap();
    let err = Courier::<u32>::from_config_file(file.path()).unwrap_err();
    assert!(matches!(
        err,
        courier::Error::Config(courier::ConfigError::Validation(_))
    ));
}

#[test]
fn unknown_value_type_is_parse_error() {
    let err = CourierConfig::load_str("[event_loop]\nwake_period_ms = -1\n").unwrap_err();
    assert!(matches!(err, courier::ConfigError::Parse(_)));
}

#[test]
fn config_serializes_back_to_toml() {
    let config = CourierConfig::default();
    let text = toml::to_string(&config).unwrap();
    assert_eq!(CourierConfig::load_str(&text).unwrap(), config);
}
