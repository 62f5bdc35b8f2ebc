use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which document engine the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Google Sheets API v4, authorized through the stored OAuth token.
    #[default]
    Google,
    /// In-process engine, optionally persisted to `snapshot_path`.
    Memory,
}

/// Server settings. Every field has a default, so a config file only needs
/// the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    /// OAuth client credentials downloaded from the Google console.
    pub credentials_path: PathBuf,
    /// Where the OAuth token is stored after `/redirect`.
    pub token_path: PathBuf,
    /// JSON file backing the memory engine.
    pub snapshot_path: Option<PathBuf>,
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            backend: BackendKind::Google,
            credentials_path: PathBuf::from("credentials.json"),
            token_path: PathBuf::from("token.json"),
            snapshot_path: None,
            debug: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// `host:port`, as given to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let config = ServerConfig::from_yaml_str("port: 9000\nbackend: memory\n").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.token_path, PathBuf::from("token.json"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(ServerConfig::from_yaml_str("prot: 1\n").is_err());
    }

    #[test]
    fn yaml_roundtrip() {
        let config = ServerConfig {
            snapshot_path: Some("data/rows.json".into()),
            ..ServerConfig::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(ServerConfig::from_yaml_str(&yaml).unwrap(), config);
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }
}
