//! Server configuration.
use serde::Deserialize;
use std::{io, net::SocketAddr, path::PathBuf};
use thiserror::Error;

use super::body::DEFAULT_BODY_LENGTH_LIMIT;

/// An error encountered while loading a [ServerConfig].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {}", .path.display(), .source)]
    Read { path: PathBuf, source: io::Error },
    #[error("malformed config: {}", .0)]
    Parse(#[from] toml::de::Error),
}

/// Settings of a running server.
///
/// ```
/// use arbor::config::ServerConfig;
///
/// let config = ServerConfig::from_toml_str(
///     r#"
///     address = "0.0.0.0:3000"
///     body_length_limit = 1048576
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.address.port(), 3000);
/// assert!(config.http1_keep_alive);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Where to listen.
    pub address: SocketAddr,
    pub http1_keep_alive: bool,
    /// Only speak prior-knowledge HTTP/2.
    pub http2_only: bool,
    /// The body limit of declarations that accept a body without declaring one.
    pub body_length_limit: u64,
    /// Size of the runtime's worker pool. Defaults to the number of CPUs.
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8080).into(),
            http1_keep_alive: true,
            http2_only: false,
            body_length_limit: DEFAULT_BODY_LENGTH_LIMIT,
            worker_threads: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read a TOML config file.
    pub fn load<P: Into<PathBuf>>(path: P) -> Result<Self, ConfigError> {
        let path = path.into();
        match std::fs::read_to_string(&path) {
            Ok(s) => Self::from_toml_str(&s),
            Err(source) => Err(ConfigError::Read { path, source }),
        }
    }
}
