//! Configuration system tests
//!
//! Tests configuration loading, validation, and conversion into the
//! connection manager configuration

mod common;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use realtime_client::config::{self, ClientConfig};
use realtime_client::Error;

/// Test fixture for configuration testing
struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("client.toml");
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_valid_fixture() {
    let config = ClientConfig::load(common::valid_config_fixture().to_str()).unwrap();

    assert_eq!(config.connection.url, "wss://media.example.com/ws");
    assert_eq!(config.connection.max_reconnect_attempts, 10);
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json_format);
    assert_eq!(config.media.sample_rate, 24000);
    assert_eq!(config.media.chunk_size, 2048);
}

#[test]
fn test_fixture_to_connection_config() {
    let config = ClientConfig::load(common::valid_config_fixture().to_str()).unwrap();
    let connection = config.connection.to_connection_config();

    assert_eq!(connection.url, "wss://media.example.com/ws");
    assert_eq!(connection.reconnect.base_delay, Duration::from_millis(500));
    assert_eq!(connection.reconnect.max_delay, Duration::from_millis(8000));
    assert_eq!(connection.reconnect.max_attempts, 10);
    assert_eq!(connection.connect_timeout, Duration::from_millis(5000));
}

#[test]
fn test_empty_file_uses_defaults() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    let config = ClientConfig::load(Some(fixture.path())).unwrap();
    assert_eq!(config.connection.url, "ws://localhost:8000/ws");
    assert_eq!(config.connection.reconnect_base_delay_ms, 1000);
    assert_eq!(config.connection.reconnect_max_delay_ms, 30000);
    assert_eq!(config.connection.max_reconnect_attempts, 5);
}

#[test]
fn test_media_paths_expanded() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[media]
frame_dir = "~/frames"
audio_capture_file = "~/captures/received.pcm"
"#,
    );

    let config = ClientConfig::load(Some(fixture.path())).unwrap();
    let frame_dir = config.frame_dir().unwrap();
    let capture = config.audio_capture_file().unwrap();
    assert!(!frame_dir.to_string_lossy().starts_with('~'));
    assert!(capture.ends_with("captures/received.pcm"));
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_fixture() {
    let err = ClientConfig::load(common::invalid_config_fixture().to_str()).unwrap_err();
    assert!(matches!(err, Error::ConfigValidation { .. }));
}

#[test]
fn test_missing_file() {
    let err = ClientConfig::load(Some("/nonexistent/path/client.toml")).unwrap_err();
    assert!(matches!(err, Error::ConfigNotFound { .. }));
    assert!(err.suggestion().is_some());
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[connection\nurl = ");

    let err = ClientConfig::load(Some(fixture.path())).unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }));
}

#[test]
fn test_wrong_value_type() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[connection]
max_reconnect_attempts = "many"
"#,
    );

    assert!(ClientConfig::load(Some(fixture.path())).is_err());
}

#[test]
fn test_zero_chunk_size_rejected() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[media]
chunk_size = 0
"#,
    );

    let err = ClientConfig::load(Some(fixture.path())).unwrap_err();
    match err {
        Error::ConfigValidation { field, .. } => assert_eq!(field.as_deref(), Some("media.chunk_size")),
        other => panic!("unexpected error {:?}", other),
    }
}

// ─────────────────────────────────────────────────────────────────
// Init Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_init_writes_loadable_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("a").join("b").join("client.toml");

    let written = config::init_config(path.to_str(), false).unwrap();
    assert_eq!(written, path);

    let config = ClientConfig::load(path.to_str()).unwrap();
    assert_eq!(config.connection.url, "ws://localhost:8000/ws");
}

#[test]
fn test_init_respects_force() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("client.toml");
    fs::write(&path, "# mine").unwrap();

    assert!(config::init_config(path.to_str(), false).is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), "# mine");

    config::init_config(path.to_str(), true).unwrap();
    assert!(fs::read_to_string(&path).unwrap().contains("[connection]"));
}
