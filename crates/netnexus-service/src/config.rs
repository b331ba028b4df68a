//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use netnexus_core::{ConnectionConfig, CoordinatorConfig};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Bluetooth timing settings.
    pub bluetooth: BluetoothConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Storage path is not empty
    /// - Scan windows are at least one second and the default fits the maximum
    ///
    /// # Example
    ///
    /// ```
    /// use netnexus_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.bluetooth.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:3000").
    pub bind: String,
    /// Directory with the portal's static files, served at `/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new("server.bind", "bind address cannot be empty"));
        } else {
            match self.bind.rsplit_once(':') {
                None => errors.push(ValidationError::new(
                    "server.bind",
                    format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                )),
                Some((_, port)) => match port.parse::<u16>() {
                    Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                    Err(_) => errors.push(ValidationError::new(
                        "server.bind",
                        format!("invalid port '{}': must be a number 1-65535", port),
                    )),
                    Ok(_) => {}
                },
            }
        }

        if let Some(dir) = &self.static_dir
            && dir.as_os_str().is_empty()
        {
            errors.push(ValidationError::new(
                "server.static_dir",
                "static directory cannot be empty (omit it instead)",
            ));
        }

        errors
    }
}

/// Device store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Saved-devices JSON file. A leading `~/` expands to the home directory.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: netnexus_store::default_store_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new("storage.path", "store path cannot be empty"));
        }
        errors
    }

    /// The store path with `~/` expanded.
    pub fn resolved_path(&self) -> PathBuf {
        match (self.path.strip_prefix("~"), dirs::home_dir()) {
            (Ok(rest), Some(home)) => home.join(rest),
            _ => self.path.clone(),
        }
    }
}

/// Bluetooth timing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// General scan window in seconds.
    pub scan_duration_secs: u64,
    /// Targeted scan window for connect requests in seconds.
    pub connect_scan_timeout_secs: u64,
    /// Upper bound for caller-supplied scan windows in seconds.
    pub max_scan_duration_secs: u64,
    /// Limit on a single driver-level connect in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            scan_duration_secs: 5,
            connect_scan_timeout_secs: 7,
            max_scan_duration_secs: 30,
            connect_timeout_secs: netnexus_core::DEFAULT_CONNECT_TIMEOUT.as_secs(),
        }
    }
}

impl BluetoothConfig {
    /// Validate Bluetooth configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("bluetooth.scan_duration_secs", self.scan_duration_secs),
            ("bluetooth.connect_scan_timeout_secs", self.connect_scan_timeout_secs),
            ("bluetooth.max_scan_duration_secs", self.max_scan_duration_secs),
            ("bluetooth.connect_timeout_secs", self.connect_timeout_secs),
        ] {
            if value == 0 {
                errors.push(ValidationError::new(field, "must be at least 1 second"));
            }
        }

        if self.scan_duration_secs > self.max_scan_duration_secs {
            errors.push(ValidationError::new(
                "bluetooth.scan_duration_secs",
                format!(
                    "scan duration {} exceeds max_scan_duration_secs {}",
                    self.scan_duration_secs, self.max_scan_duration_secs
                ),
            ));
        }

        errors
    }

    /// Coordinator timing derived from this section.
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            scan_duration: Duration::from_secs(self.scan_duration_secs),
            connect_scan_timeout: Duration::from_secs(self.connect_scan_timeout_secs),
            max_scan_duration: Duration::from_secs(self.max_scan_duration_secs),
        }
    }

    /// Driver connection settings derived from this section.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new().connection_timeout(Duration::from_secs(self.connect_timeout_secs))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("netnexus")
        .join("server.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert!(config.server.static_dir.is_none());
        assert_eq!(config.storage.path, netnexus_store::default_store_path());
        assert_eq!(config.bluetooth.scan_duration_secs, 5);
        assert_eq!(config.bluetooth.connect_scan_timeout_secs, 7);
    }

    #[test]
    fn test_default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:8080"
            static_dir = "./public"

            [storage]
            path = "/var/lib/netnexus/previous_devices.json"

            [bluetooth]
            scan_duration_secs = 10
            connect_scan_timeout_secs = 3
            connect_timeout_secs = 20
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.server.static_dir, Some(PathBuf::from("./public")));
        assert_eq!(
            config.storage.path,
            PathBuf::from("/var/lib/netnexus/previous_devices.json")
        );
        assert_eq!(config.bluetooth.scan_duration_secs, 10);
        assert_eq!(config.bluetooth.connect_scan_timeout_secs, 3);
        assert_eq!(config.bluetooth.connect_timeout_secs, 20);
        // Missing keys keep their defaults
        assert_eq!(config.bluetooth.max_scan_duration_secs, 30);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_partial_toml() {
        let config: Config = toml::from_str("[server]\nbind = \"127.0.0.1:9000\"\n").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.bluetooth, BluetoothConfig::default());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("server.toml");

        let config = Config {
            server: ServerConfig {
                bind: "0.0.0.0:9090".to_string(),
                static_dir: Some(PathBuf::from("/srv/portal")),
            },
            storage: StorageConfig {
                path: PathBuf::from("/tmp/devices.json"),
            },
            bluetooth: BluetoothConfig {
                scan_duration_secs: 8,
                ..Default::default()
            },
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load(&config_path).unwrap();

        assert_eq!(loaded.server.bind, "0.0.0.0:9090");
        assert_eq!(loaded.server.static_dir, Some(PathBuf::from("/srv/portal")));
        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/devices.json"));
        assert_eq!(loaded.bluetooth.scan_duration_secs, 8);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/server.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nbind = ").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("netnexus/server.toml"));
    }

    #[test]
    fn test_server_bind_validation() {
        let cases = [
            ("127.0.0.1:3000", true),
            ("[::1]:3000", true),
            ("", false),
            ("localhost", false),
            ("127.0.0.1:0", false),
            ("127.0.0.1:http", false),
            ("127.0.0.1:70000", false),
        ];
        for (bind, valid) in cases {
            let config = ServerConfig {
                bind: bind.to_string(),
                static_dir: None,
            };
            assert_eq!(config.validate().is_empty(), valid, "bind = {:?}", bind);
        }
    }

    #[test]
    fn test_storage_path_validation() {
        let config = StorageConfig {
            path: PathBuf::new(),
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "storage.path");
    }

    #[test]
    fn test_storage_path_expands_home() {
        let config = StorageConfig {
            path: PathBuf::from("~/netnexus/devices.json"),
        };
        let resolved = config.resolved_path();
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolved, home.join("netnexus/devices.json"));
        }

        let config = StorageConfig {
            path: PathBuf::from("/abs/devices.json"),
        };
        assert_eq!(config.resolved_path(), PathBuf::from("/abs/devices.json"));
    }

    #[test]
    fn test_bluetooth_validation() {
        let config = BluetoothConfig {
            scan_duration_secs: 0,
            connect_scan_timeout_secs: 0,
            connect_timeout_secs: 0,
            ..Default::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[2].field, "bluetooth.connect_timeout_secs");

        let config = BluetoothConfig {
            scan_duration_secs: 60,
            max_scan_duration_secs: 30,
            ..Default::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("exceeds"));
    }

    #[test]
    fn test_coordinator_config_conversion() {
        let config = BluetoothConfig::default().coordinator_config();
        assert_eq!(config, CoordinatorConfig::default());
    }

    #[test]
    fn test_connection_config_conversion() {
        let config = BluetoothConfig::default();
        assert_eq!(config.connect_timeout_secs, 15);
        assert_eq!(config.connection_config(), ConnectionConfig::default());

        let config = BluetoothConfig {
            connect_timeout_secs: 4,
            ..Default::default()
        };
        assert_eq!(
            config.connection_config().connection_timeout,
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_config_validation_error_display() {
        let config = Config {
            server: ServerConfig {
                bind: "nope".to_string(),
                static_dir: None,
            },
            storage: StorageConfig {
                path: PathBuf::new(),
            },
            bluetooth: BluetoothConfig::default(),
        };
        let err = config.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("server.bind"));
        assert!(message.contains("storage.path"));
        assert!(message.starts_with("Configuration validation failed:"));
    }
}
