//! Client configuration, consumed once at construction.
//!
//! Loading is tolerant: a missing or malformed file falls back to defaults
//! with a warning rather than failing the process. Environment variables
//! override nothing; `from_env` is an alternative source, not a layer.

use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// How the orchestrating client picks its transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    /// Use the binary transport; connection failures propagate.
    Binary,
    /// Use the text transport; connection failures propagate.
    Text,
    /// Try binary first, fall back to text on any connect failure.
    #[default]
    Auto,
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binary" => Ok(TransportMode::Binary),
            "text" => Ok(TransportMode::Text),
            "auto" => Ok(TransportMode::Auto),
            other => Err(format!("unknown transport mode: {other}")),
        }
    }
}

/// Connection settings for the Engram store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Whether the storage client is enabled at all.
    pub enabled: bool,
    /// Host of the remote service.
    pub host: String,
    /// Port of the binary (framed RPC) endpoint.
    pub binary_port: u16,
    /// Port of the text (REST) endpoint.
    pub text_port: u16,
    /// Pre-issued auth token; validated remotely.
    pub auth_token: Option<String>,
    /// Default run scope injected into scoped operations.
    pub run_id: Option<String>,
    /// Transport selection mode.
    pub mode: TransportMode,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            binary_port: 9090,
            text_port: 8080,
            auth_token: None,
            run_id: None,
            mode: TransportMode::Auto,
        }
    }
}

impl ClientConfig {
    /// Build a configuration from `ENGRAM_*` environment variables, with
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("ENGRAM_ENABLED") {
            config.enabled = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        if let Ok(v) = std::env::var("ENGRAM_HOST") {
            config.host = v;
        }
        if let Ok(v) = std::env::var("ENGRAM_BINARY_PORT") {
            match v.parse() {
                Ok(port) => config.binary_port = port,
                Err(_) => warn!(value = %v, "invalid ENGRAM_BINARY_PORT, using default"),
            }
        }
        if let Ok(v) = std::env::var("ENGRAM_TEXT_PORT") {
            match v.parse() {
                Ok(port) => config.text_port = port,
                Err(_) => warn!(value = %v, "invalid ENGRAM_TEXT_PORT, using default"),
            }
        }
        if let Ok(v) = std::env::var("ENGRAM_AUTH_TOKEN") {
            config.auth_token = Some(v);
        }
        if let Ok(v) = std::env::var("ENGRAM_RUN_ID") {
            config.run_id = Some(v);
        }
        if let Ok(v) = std::env::var("ENGRAM_TRANSPORT") {
            match v.parse() {
                Ok(mode) => config.mode = mode,
                Err(e) => warn!(error = %e, "invalid ENGRAM_TRANSPORT, using auto"),
            }
        }
        config
    }

    /// Load from a TOML file, with defaults when the file is missing or
    /// malformed.
    pub fn from_toml_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!(path = %path.display(), "loaded storage client configuration");
                    config
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        path = %path.display(),
                        "failed to parse config, using defaults"
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!(
                    error = %e,
                    path = %path.display(),
                    "failed to read config file, using defaults"
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert!(config.enabled);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.binary_port, 9090);
        assert_eq!(config.text_port, 8080);
        assert_eq!(config.mode, TransportMode::Auto);
        assert!(config.run_id.is_none());
    }

    #[test]
    fn test_transport_mode_from_str() {
        assert_eq!("binary".parse::<TransportMode>().unwrap(), TransportMode::Binary);
        assert_eq!("TEXT".parse::<TransportMode>().unwrap(), TransportMode::Text);
        assert_eq!("Auto".parse::<TransportMode>().unwrap(), TransportMode::Auto);
        assert!("carrier-pigeon".parse::<TransportMode>().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "host = \"store.internal\"\nbinary_port = 7700\nmode = \"text\"\nrun_id = \"nightly\""
        )
        .unwrap();
        let config = ClientConfig::from_toml_file(file.path());
        assert_eq!(config.host, "store.internal");
        assert_eq!(config.binary_port, 7700);
        // Unset fields keep their defaults.
        assert_eq!(config.text_port, 8080);
        assert_eq!(config.mode, TransportMode::Text);
        assert_eq!(config.run_id.as_deref(), Some("nightly"));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ClientConfig::from_toml_file(Path::new("/nonexistent/engram.toml"));
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml {{").unwrap();
        let config = ClientConfig::from_toml_file(file.path());
        assert_eq!(config.binary_port, 9090);
    }
}
