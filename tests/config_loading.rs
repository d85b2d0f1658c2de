/// Integration tests for loading the configuration file from disk
///
/// Tests verify:
/// 1. A complete file loads, validates and feeds a host
/// 2. Unreadable and malformed files are reported as such
/// 3. Validation errors name the offending section and field
///
/// Run with: cargo test --test config_loading

use std::io::Write;

use forecast_service::config::{ConfigError, load_config};
use forecast_service::host::{Host, LocalHost};
use forecast_service::model::DeviceKind;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn write_config(text: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const VALID: &str = r#"
    [prefs]
    api_key = "abc123"
    download_interval = 600
    dump_json = true
    logs_dir = "/tmp/forecast-logs"

    [[devices]]
    id = 1
    name = "Peoria"
    kind = "weather"
    latitude = "40.69"
    longitude = "-89.59"

    [[devices]]
    id = 2
    name = "Peoria Daily"
    kind = "daily"
    latitude = "40.69"
    longitude = "-89.59"
    weather_summary_email = true
    weather_summary_email_time = "06:00"

    [[devices]]
    id = 3
    name = "Radar"
    kind = "satellite_image"
    image_source = "https://example.com/radar.gif"
    image_destination = "/tmp/radar.gif"

    [[triggers]]
    id = 10
    name = "Peoria offline"
    kind = "weather_site_offline"
    device = 1
    offline_timer = "90"
"#;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_valid_file_loads() {
    let file = write_config(VALID);
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.prefs.download_interval, 600);
    assert!(config.prefs.dump_json);
    assert_eq!(config.devices.len(), 3);
    assert_eq!(config.devices[2].kind, DeviceKind::SatelliteImage);
    assert_eq!(config.devices[1].weather_summary_email_time, "06:00");
    assert_eq!(config.triggers[0].offline_minutes(), Some(90));

    let host = LocalHost::new(config);
    assert_eq!(host.devices().len(), 3);
    assert_eq!(host.triggers().len(), 1);
    assert_eq!(host.prefs().next_poll, "1970-01-01 00:00:00", "a fresh config has never polled");
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_malformed_toml_is_a_parse_error() {
    let file = write_config("[prefs\napi_key = ");
    assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn test_unknown_device_kind_is_a_parse_error() {
    let file = write_config(
        r#"
        [[devices]]
        id = 1
        name = "Mystery"
        kind = "barometer"
        "#,
    );
    assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn test_validation_errors_are_reported_per_field() {
    let file = write_config(
        r#"
        [prefs]
        api_key = "abc123"
        call_counter = "many"

        [[devices]]
        id = 1
        name = "Nowhere"
        kind = "weather"
        latitude = "95"
        longitude = "-89.59"

        [[triggers]]
        id = 10
        name = "Ghost offline"
        kind = "weather_site_offline"
        device = 7
        "#,
    );

    let Err(ConfigError::Invalid(errors)) = load_config(file.path()) else {
        panic!("expected validation errors");
    };
    assert_eq!(
        errors.get("prefs.call_counter"),
        Some("The call counter can only contain integers.")
    );
    assert_eq!(
        errors.get("devices[0].latitude"),
        Some("The latitude value must be between -90 and 90.")
    );
    assert_eq!(errors.get("triggers[0].device"), Some("The selected device does not exist."));
    assert_eq!(errors.len(), 3);
}
