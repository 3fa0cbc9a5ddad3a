use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use openlims_core::LabSettings;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    /// Initial lab branding, applied at startup when storage has none.
    #[serde(default)]
    pub lab: Option<LabSettings>,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_body_limit() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Intake behavior toggles.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IntakeConfig {
    /// When true, attaching a test whose declared specimen types do not
    /// include the sample's specimen type is rejected server-side. Off by
    /// default: the catalog's compatibility list is advisory and the UI is
    /// expected to filter.
    #[serde(default)]
    pub enforce_specimen_compatibility: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file.
///
/// A missing file at the default path falls back to defaults; an explicitly
/// requested file must exist.
pub fn load_config(path: &str, explicit: bool) -> Result<AppConfig, ConfigError> {
    let cfg = if Path::new(path).exists() {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)?
    } else if explicit {
        return Err(ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("config file not found: {path}"),
        )));
    } else {
        AppConfig::default()
    };
    cfg.validate().map_err(ConfigError::Invalid)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, 8000);
        assert!(!cfg.intake.enforce_specimen_compatibility);
        assert!(cfg.lab.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9000

            [logging]
            level = "debug"

            [intake]
            enforce_specimen_compatibility = true

            [lab]
            name = "City Lab"
            address = "12 Main St"
            phone = "555-0100"
            email = "lab@example.com"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.intake.enforce_specimen_compatibility);
        assert_eq!(cfg.addr().to_string(), "127.0.0.1:9000");
        assert_eq!(cfg.lab.unwrap().name, "City Lab");
    }

    #[test]
    fn test_validate_rejects_bad_level() {
        let mut cfg = AppConfig::default();
        cfg.logging.level = "verbose".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut cfg = AppConfig::default();
        cfg.server.port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_missing_default_path_falls_back() {
        let cfg = load_config("definitely-not-here.toml", false).unwrap();
        assert_eq!(cfg.server.port, 8000);
    }

    #[test]
    fn test_missing_explicit_path_errors() {
        assert!(load_config("definitely-not-here.toml", true).is_err());
    }
}
