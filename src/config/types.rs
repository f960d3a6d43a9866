//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::stream::{SshConnector, DEFAULT_MAX_LINE_BYTES};

use super::ConfigError;

/// Default SSH port of a Gerrit server.
pub const DEFAULT_PORT: u16 = 29418;

/// SSH client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// ssh client binary.
    pub binary: String,
    /// Login user; the client's default when unset.
    pub user: Option<String>,
    /// Private key to authenticate with.
    pub identity_file: Option<PathBuf>,
    /// Extra client arguments, placed before the host.
    pub extra_args: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: "ssh".to_string(),
            user: None,
            identity_file: None,
            extra_args: Vec::new(),
        }
    }
}

impl SshConfig {
    /// Build the connector these settings describe.
    #[must_use]
    pub fn connector(&self) -> SshConnector {
        let mut connector = SshConnector::new()
            .binary(self.binary.clone())
            .extra_args(self.extra_args.clone());
        if let Some(user) = &self.user {
            connector = connector.user(user.clone());
        }
        if let Some(identity) = &self.identity_file {
            connector = connector.identity_file(identity.clone());
        }
        connector
    }
}

/// Configuration for watching one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Gerrit host name.
    pub host: String,
    /// Gerrit SSH port.
    pub port: u16,
    /// Reconnect as soon as the stream closes.
    pub auto_restart: bool,
    /// Upper bound on a single stream line.
    pub max_line_bytes: usize,
    /// SSH client settings.
    pub ssh: SshConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            auto_restart: false,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            ssh: SshConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Check that the configuration can be used to open a stream.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for an empty host, a zero port or a
    /// zero line limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be positive".to_string()));
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_line_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
