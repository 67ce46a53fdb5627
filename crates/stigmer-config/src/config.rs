//! Environment-variable driven configuration.

use std::path::PathBuf;

use crate::error::{ConfigError, ConfigResult};

/// Default gRPC TCP port.
pub const DEFAULT_GRPC_PORT: u16 = 7234;

/// Default Temporal frontend address.
pub const DEFAULT_TEMPORAL_ADDRESS: &str = "localhost:7233";

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the gRPC server binds.
    pub grpc_port: u16,
    /// Store location (`STIGMER_DATA_DIR`, default `~/.stigmer/data`).
    pub data_dir: PathBuf,
    /// Log and pid file location (`STIGMER_LOG_DIR`, default `~/.stigmer/logs`).
    pub log_dir: PathBuf,
    /// Temporal connection settings.
    pub temporal: TemporalSettings,
    /// Base64-encoded 32-byte secret key, when provided.
    pub encryption_key: Option<String>,
    /// Log level filter seed.
    pub log_level: String,
    /// Dev overrides for supervised binary locations.
    pub supervisor: SupervisorOverrides,
}

/// Temporal frontend settings. The service runs degraded when the
/// frontend is unreachable.
#[derive(Debug, Clone)]
pub struct TemporalSettings {
    /// Frontend address, host:port.
    pub address: String,
    /// Namespace.
    pub namespace: String,
}

/// Dev overrides for binaries managed by the supervisor.
#[derive(Debug, Clone, Default)]
pub struct SupervisorOverrides {
    /// `STIGMER_SERVER_BIN`.
    pub server_bin: Option<PathBuf>,
    /// `STIGMER_WORKFLOW_RUNNER_BIN`.
    pub workflow_runner_bin: Option<PathBuf>,
    /// `STIGMER_AGENT_RUNNER_SCRIPT`.
    pub agent_runner_script: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let home = home_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            grpc_port: DEFAULT_GRPC_PORT,
            data_dir: home.join(".stigmer").join("data"),
            log_dir: home.join(".stigmer").join("logs"),
            temporal: TemporalSettings {
                address: DEFAULT_TEMPORAL_ADDRESS.to_string(),
                namespace: "default".to_string(),
            },
            encryption_key: None,
            log_level: "info".to_string(),
            supervisor: SupervisorOverrides::default(),
        }
    }
}

fn home_dir() -> ConfigResult<PathBuf> {
    std::env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| ConfigError::NoHome("HOME is not set".to_string()))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from the process environment, falling back to
    /// defaults per variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparseable values; a
    /// fatal condition at startup (exit code 1).
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Config::default();

        if let Some(port) = env_var("STIGMER_GRPC_PORT") {
            config.grpc_port = port.parse().map_err(|_| ConfigError::InvalidValue {
                var: "STIGMER_GRPC_PORT".to_string(),
                message: format!("{port:?} is not a port number"),
            })?;
        }
        if let Some(dir) = env_var("STIGMER_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_var("STIGMER_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(address) = env_var("TEMPORAL_SERVICE_ADDRESS") {
            config.temporal.address = address;
        }
        if let Some(namespace) = env_var("TEMPORAL_NAMESPACE") {
            config.temporal.namespace = namespace;
        }
        config.encryption_key = env_var("STIGMER_ENCRYPTION_KEY");
        if let Some(level) = env_var("LOG_LEVEL") {
            config.log_level = level;
        }
        config.supervisor = SupervisorOverrides {
            server_bin: env_var("STIGMER_SERVER_BIN").map(PathBuf::from),
            workflow_runner_bin: env_var("STIGMER_WORKFLOW_RUNNER_BIN").map(PathBuf::from),
            agent_runner_script: env_var("STIGMER_AGENT_RUNNER_SCRIPT").map(PathBuf::from),
        };

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = Config::default();
        assert_eq!(config.grpc_port, 7234);
        assert_eq!(config.temporal.address, "localhost:7233");
        assert_eq!(config.temporal.namespace, "default");
        assert_eq!(config.log_level, "info");
        assert!(config.encryption_key.is_none());
        assert!(config.data_dir.ends_with(".stigmer/data"));
        assert!(config.log_dir.ends_with(".stigmer/logs"));
    }
}
