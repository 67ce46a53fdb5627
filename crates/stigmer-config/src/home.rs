//! Directory scaffolding and per-component state file paths.
//!
//! Layout:
//!
//! ```text
//! ~/.stigmer/
//! ├── encryption.key            (AES key, 0600)
//! ├── data/                     (embedded store + pid/lock files)
//! │   ├── store.db/
//! │   ├── <component>.pid       ({pid, cmd_name, started_at} JSON)
//! │   └── <component>.lock      (flock'd exclusive lock)
//! └── logs/
//!     └── <component>.log       (merged stdout+stderr)
//! ```

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{ConfigError, ConfigResult};

/// Resolved data/log directory pair with scaffolding.
#[derive(Debug, Clone)]
pub struct StigmerHome {
    data_dir: PathBuf,
    log_dir: PathBuf,
}

impl StigmerHome {
    /// Build from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            log_dir: config.log_dir.clone(),
        }
    }

    /// Create both directories with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Scaffolding`] when creation fails.
    pub fn ensure(&self) -> ConfigResult<()> {
        for dir in [&self.data_dir, &self.log_dir] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Scaffolding {
                path: dir.display().to_string(),
                source,
            })?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).map_err(
                    |source| ConfigError::Scaffolding {
                        path: dir.display().to_string(),
                        source,
                    },
                )?;
            }
        }
        Ok(())
    }

    /// Store database directory.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("store.db")
    }

    /// Encryption key file, sibling of the data directory.
    #[must_use]
    pub fn encryption_key_path(&self) -> PathBuf {
        self.data_dir
            .parent()
            .map_or_else(|| self.data_dir.clone(), Path::to_path_buf)
            .join("encryption.key")
    }

    /// Data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Log directory.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// State file paths for a supervised component.
    #[must_use]
    pub fn component(&self, name: &str) -> ComponentPaths {
        ComponentPaths {
            pid_file: self.data_dir.join(format!("{name}.pid")),
            lock_file: self.data_dir.join(format!("{name}.lock")),
            log_file: self.log_dir.join(format!("{name}.log")),
        }
    }
}

/// PID, lock, and log file paths for one supervised component.
#[derive(Debug, Clone)]
pub struct ComponentPaths {
    /// `{DATA_DIR}/{component}.pid`.
    pub pid_file: PathBuf,
    /// `{DATA_DIR}/{component}.lock`.
    pub lock_file: PathBuf,
    /// `{LOG_DIR}/{component}.log`.
    pub log_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn home_in(dir: &Path) -> StigmerHome {
        let config = Config {
            data_dir: dir.join("data"),
            log_dir: dir.join("logs"),
            ..Config::default()
        };
        StigmerHome::from_config(&config)
    }

    #[test]
    fn ensure_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let home = home_in(dir.path());
        home.ensure().unwrap();
        assert!(home.data_dir().is_dir());
        assert!(home.log_dir().is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(home.data_dir()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn component_paths_follow_layout() {
        let dir = tempfile::tempdir().unwrap();
        let home = home_in(dir.path());
        let paths = home.component("workflow-runner");
        assert!(paths.pid_file.ends_with("data/workflow-runner.pid"));
        assert!(paths.lock_file.ends_with("data/workflow-runner.lock"));
        assert!(paths.log_file.ends_with("logs/workflow-runner.log"));
    }

    #[test]
    fn key_path_is_sibling_of_data() {
        let dir = tempfile::tempdir().unwrap();
        let home = home_in(dir.path());
        assert_eq!(home.encryption_key_path(), dir.path().join("encryption.key"));
    }
}
