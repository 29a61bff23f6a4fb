//! TOML-based configuration for the matrix server.
//!
//! Example file:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 54000
//! max_connections = 1024
//! # max_payload_bytes = 67108864
//! ack_config = false
//!
//! [compute]
//! threads = 8
//!
//! [logging]
//! level = "info"
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section, or
//! a missing key all fall back to the values below.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` and `port` do not form a socket address.
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub compute: ComputeSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Listener and per-connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of connections served at the same time.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Optional upper bound on a single frame's payload.  Unset means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_payload_bytes: Option<u32>,
    /// Answer an accepted CONFIG with `STATUS_RESP(NotStarted)`.
    #[serde(default)]
    pub ack_config: bool,
}

/// Compute pool settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComputeSection {
    /// Threads in the shared pool that runs every job's workers.
    #[serde(default = "default_compute_threads")]
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    54000
}
fn default_max_connections() -> usize {
    1024
}
fn default_compute_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_connections: default_max_connections(),
            max_payload_bytes: None,
            ack_config: false,
        }
    }
}

impl Default for ComputeSection {
    fn default() -> Self {
        Self {
            threads: default_compute_threads(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Combines `bind_address` and `port` into a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigFileError::InvalidAddress`] if `bind_address` is not
    /// an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigFileError> {
        let raw = format!("{}:{}", self.server.bind_address, self.server.port);
        raw.parse().map_err(|_| ConfigFileError::InvalidAddress(raw))
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigFileError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigFileError> {
    Ok(toml::from_str(content)?)
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigFileError::Io`] for file-system errors other than "not
/// found", and [`ConfigFileError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigFileError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigFileError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.server.port, 54000);
        assert_eq!(cfg.server.max_payload_bytes, None);
        assert!(!cfg.server.ack_config);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let cfg = parse_config("[server]\nport = 6000\n").unwrap();
        assert_eq!(cfg.server.port, 6000);
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_full_file_is_parsed() {
        let cfg = parse_config(
            r#"
            [server]
            bind_address = "127.0.0.1"
            port = 7000
            max_connections = 8
            max_payload_bytes = 4096
            ack_config = true

            [compute]
            threads = 2

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.max_connections, 8);
        assert_eq!(cfg.server.max_payload_bytes, Some(4096));
        assert!(cfg.server.ack_config);
        assert_eq!(cfg.compute.threads, 2);
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.listen_addr().unwrap().to_string(), "127.0.0.1:7000");
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = parse_config("[server\nport = ");
        assert!(matches!(result, Err(ConfigFileError::Parse(_))));
    }

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.server.bind_address = "not.an.ip".to_string();
        assert!(matches!(
            cfg.listen_addr(),
            Err(ConfigFileError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_missing_file_returns_defaults() {
        let path = std::env::temp_dir().join("matrix-server-test-does-not-exist.toml");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_default_compute_threads_is_positive() {
        assert!(AppConfig::default().compute.threads >= 1);
    }
}
