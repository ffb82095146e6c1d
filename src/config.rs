//! Configuration system for the realtime client
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (RTC_CLIENT_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::connection::{ConnectionConfig, ReconnectPolicy};
use crate::error::{Error, Result};

/// File name looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "realtime-client.toml";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Media server connection
    pub connection: ConnectionSettings,

    /// Logging configuration
    pub logging: LoggingSettings,

    /// Local handling of media streams
    pub media: MediaSettings,
}

/// Media server connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Server WebSocket URL
    pub url: String,

    /// First reconnect delay in milliseconds
    pub reconnect_base_delay_ms: u64,

    /// Reconnect delay ceiling in milliseconds
    pub reconnect_max_delay_ms: u64,

    /// Maximum consecutive reconnection attempts (0 = unlimited)
    pub max_reconnect_attempts: u32,

    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

/// Media stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    /// Directory where the latest received video frame is written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_dir: Option<String>,

    /// File that received PCM audio is appended to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_capture_file: Option<String>,

    /// Sample rate of generated outbound audio
    pub sample_rate: u32,

    /// Samples per outbound audio frame
    pub chunk_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 30000,
            max_reconnect_attempts: 5,
            connect_timeout_ms: 10000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            frame_dir: None,
            audio_capture_file: None,
            sample_rate: 16000,
            chunk_size: 4096,
        }
    }
}

impl ConnectionSettings {
    /// Build the connection manager configuration
    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.url.clone(),
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
                max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
                max_attempts: self.max_reconnect_attempts,
            },
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

impl ClientConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = match Self::find_config_file(config_path)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Parse one TOML file without overrides or validation
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading configuration file");
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = toml::from_str(&content).map_err(|e| {
            Error::config_parse(format!("{}: {}", path.display(), e), Some(e))
        })?;
        info!(path = %path.display(), "Configuration loaded from file");
        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // An explicit path must exist
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            Some(PathBuf::from(LOCAL_CONFIG_FILE)),
            dirs::config_dir().map(|p| p.join("realtime-client").join("client.toml")),
            dirs::home_dir().map(|p| p.join(".realtime-client").join("client.toml")),
        ];

        for path in search_paths.into_iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Connection settings
        if let Ok(val) = std::env::var("RTC_CLIENT_URL") {
            self.connection.url = val;
        }
        if let Some(n) = env_parse("RTC_CLIENT_RECONNECT_BASE_DELAY_MS") {
            self.connection.reconnect_base_delay_ms = n;
        }
        if let Some(n) = env_parse("RTC_CLIENT_RECONNECT_MAX_DELAY_MS") {
            self.connection.reconnect_max_delay_ms = n;
        }
        if let Some(n) = env_parse("RTC_CLIENT_MAX_RECONNECT_ATTEMPTS") {
            self.connection.max_reconnect_attempts = n;
        }
        if let Some(n) = env_parse("RTC_CLIENT_CONNECT_TIMEOUT_MS") {
            self.connection.connect_timeout_ms = n;
        }

        // Logging settings
        if let Ok(val) = std::env::var("RTC_CLIENT_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("RTC_CLIENT_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("RTC_CLIENT_LOG_JSON") {
            self.logging.json_format = env_flag(&val);
        }

        // Media settings
        if let Ok(val) = std::env::var("RTC_CLIENT_FRAME_DIR") {
            self.media.frame_dir = Some(val);
        }
        if let Ok(val) = std::env::var("RTC_CLIENT_AUDIO_CAPTURE_FILE") {
            self.media.audio_capture_file = Some(val);
        }
        if let Some(n) = env_parse("RTC_CLIENT_SAMPLE_RATE") {
            self.media.sample_rate = n;
        }
        if let Some(n) = env_parse("RTC_CLIENT_CHUNK_SIZE") {
            self.media.chunk_size = n;
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        for path in [
            &mut self.logging.file,
            &mut self.media.frame_dir,
            &mut self.media.audio_capture_file,
        ]
        .into_iter()
        .flatten()
        {
            *path = expand_path(path);
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let url = &self.connection.url;
        if url.is_empty() {
            return Err(Error::config_field_invalid(
                "connection.url",
                "Server URL cannot be empty",
            ));
        }
        if !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(Error::config_field_invalid(
                "connection.url",
                format!("Server URL must start with ws:// or wss:// (got '{}')", url),
            ));
        }

        if self.connection.reconnect_base_delay_ms == 0 {
            return Err(Error::config_field_invalid(
                "connection.reconnect_base_delay_ms",
                "reconnect_base_delay_ms must be greater than 0",
            ));
        }
        if self.connection.reconnect_max_delay_ms < self.connection.reconnect_base_delay_ms {
            return Err(Error::config_field_invalid(
                "connection.reconnect_max_delay_ms",
                "reconnect_max_delay_ms must be at least reconnect_base_delay_ms",
            ));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "connection.connect_timeout_ms",
                "connect_timeout_ms must be greater than 0",
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        if self.media.sample_rate == 0 {
            return Err(Error::config_field_invalid(
                "media.sample_rate",
                "sample_rate must be greater than 0",
            ));
        }
        if self.media.chunk_size == 0 {
            return Err(Error::config_field_invalid(
                "media.chunk_size",
                "chunk_size must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Directory for saved video frames, if enabled
    pub fn frame_dir(&self) -> Option<PathBuf> {
        self.media.frame_dir.as_ref().map(PathBuf::from)
    }

    /// Capture file for received audio, if enabled
    pub fn audio_capture_file(&self) -> Option<PathBuf> {
        self.media.audio_capture_file.as_ref().map(PathBuf::from)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.parse().ok())
}

fn env_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}

/// Expand ~ and environment variables in paths
pub fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location for `config init`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".realtime-client")
        .join("client.toml")
}

/// Initialize a new configuration file, returning where it was written
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Default configuration content with comments
pub fn generate_default_config() -> &'static str {
    r#"# Realtime client configuration

[connection]
# Media server WebSocket URL
url = "ws://localhost:8000/ws"

# First reconnect delay in milliseconds (doubles on each failure)
reconnect_base_delay_ms = 1000

# Reconnect delay ceiling in milliseconds
reconnect_max_delay_ms = 30000

# Maximum consecutive reconnection attempts (0 = unlimited)
max_reconnect_attempts = 5

# Connection timeout in milliseconds
connect_timeout_ms = 10000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.realtime-client/logs/client.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false

[media]
# Save the latest received video frame here
# frame_dir = "~/.realtime-client/frames"

# Append received PCM audio to this file
# audio_capture_file = "~/.realtime-client/received.pcm"

# Sample rate for the generated test tone
sample_rate = 16000

# Samples per outbound audio frame
chunk_size = 4096
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.connection.url, "ws://localhost:8000/ws");
        assert_eq!(config.connection.max_reconnect_attempts, 5);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.media.chunk_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generated_config_matches_defaults() {
        let parsed: ClientConfig = toml::from_str(generate_default_config()).unwrap();
        let defaults = ClientConfig::default();
        assert_eq!(parsed.connection.url, defaults.connection.url);
        assert_eq!(
            parsed.connection.reconnect_max_delay_ms,
            defaults.connection.reconnect_max_delay_ms
        );
        assert_eq!(parsed.media.sample_rate, defaults.media.sample_rate);
        assert!(parsed.media.frame_dir.is_none());
    }

    #[test]
    fn test_to_connection_config() {
        let settings = ConnectionSettings {
            url: "wss://media.example.com/ws".to_string(),
            reconnect_base_delay_ms: 250,
            reconnect_max_delay_ms: 4000,
            max_reconnect_attempts: 0,
            connect_timeout_ms: 1500,
        };
        let config = settings.to_connection_config();
        assert_eq!(config.url, "wss://media.example.com/ws");
        assert_eq!(config.reconnect.base_delay, Duration::from_millis(250));
        assert_eq!(config.reconnect.max_delay, Duration::from_millis(4000));
        assert_eq!(config.reconnect.max_attempts, 0);
        assert_eq!(config.connect_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut config = ClientConfig::default();
        config.connection.url = "http://invalid.com".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigValidation { field: Some(ref f), .. } if f == "connection.url"
        ));
    }

    #[test]
    fn test_validation_delays() {
        let mut config = ClientConfig::default();
        config.connection.reconnect_base_delay_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.connection.reconnect_base_delay_ms = 5000;
        config.connection.reconnect_max_delay_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_zero_connect_timeout() {
        let mut config = ClientConfig::default();
        config.connection.connect_timeout_ms = 0;
        match config.validate() {
            Err(Error::ConfigValidation { field, .. }) => {
                assert_eq!(field.as_deref(), Some("connection.connect_timeout_ms"))
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = ClientConfig::default();
        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_media() {
        let mut config = ClientConfig::default();
        config.media.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.media.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_path_expansion() {
        let mut config = ClientConfig::default();
        config.media.frame_dir = Some("~/frames".to_string());
        config.expand_paths();
        assert!(!config.frame_dir().unwrap().to_string_lossy().contains('~'));
    }

    #[test]
    fn test_parse_partial_file() {
        let config: ClientConfig = toml::from_str(
            r#"
[connection]
url = "wss://custom.example.com/ws"
max_reconnect_attempts = 10

[media]
frame_dir = "/tmp/frames"
"#,
        )
        .unwrap();

        assert_eq!(config.connection.url, "wss://custom.example.com/ws");
        assert_eq!(config.connection.max_reconnect_attempts, 10);
        // Unset fields keep their defaults
        assert_eq!(config.connection.reconnect_base_delay_ms, 1000);
        assert_eq!(config.frame_dir(), Some(PathBuf::from("/tmp/frames")));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = ClientConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: ClientConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.connection.url, parsed.connection.url);
        assert_eq!(config.media.chunk_size, parsed.media.chunk_size);
    }

    #[test]
    fn test_env_flag() {
        assert!(env_flag("true"));
        assert!(env_flag("TRUE"));
        assert!(env_flag("1"));
        assert!(!env_flag("no"));
    }
}
