//! Child process launching: process groups, pid files, lock files.
//!
//! Every child runs in its own process group so shutdown can signal the
//! whole tree. The pid file records `{pid, cmd_name, started_at}`; the
//! flock'd lock file makes `start` idempotent, and the OS releases the
//! lock on process death so stale locks cannot occur.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::{Child, Stdio};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use fs2::FileExt;
use nix::sys::signal::{Signal, kill, killpg};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use stigmer_config::ComponentPaths;
use tracing::{debug, info, warn};

use crate::error::{SupervisorError, SupervisorResult};

/// Grace period between SIGTERM and SIGKILL at shutdown.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// Contents of a component's pid file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidFilePayload {
    /// Child process id (also its process group id).
    pub pid: i32,
    /// Command name, for diagnostics.
    pub cmd_name: String,
    /// RFC 3339 start timestamp.
    pub started_at: String,
}

/// Result of a start call.
#[derive(Debug)]
pub enum StartOutcome {
    /// A fresh child was spawned with this pid.
    Started(i32),
    /// A live instance already holds the lock; reusing it.
    Reused(i32),
}

/// Spawns and signals one component's child process.
pub struct Launcher {
    component: String,
    program: String,
    args: Vec<String>,
    paths: ComponentPaths,
    // Held for the daemon's lifetime once acquired; the flock dies with
    // the process.
    lock: Option<File>,
    // Our spawned child, kept so exits are reaped. Absent when reusing
    // another process's instance.
    child: Option<Child>,
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher")
            .field("component", &self.component)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}

impl Launcher {
    /// Create a launcher for one component.
    #[must_use]
    pub fn new(
        component: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        paths: ComponentPaths,
    ) -> Self {
        Self {
            component: component.into(),
            program: program.into(),
            args,
            paths,
            lock: None,
            child: None,
        }
    }

    fn state_file_error(path: &Path) -> impl Fn(std::io::Error) -> SupervisorError + '_ {
        move |source| SupervisorError::StateFile {
            path: path.display().to_string(),
            source,
        }
    }

    /// Start the component, or reuse a live instance when the lock is
    /// already held by one.
    pub fn start(&mut self) -> SupervisorResult<StartOutcome> {
        if self.lock.is_none() {
            let lock_file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(&self.paths.lock_file)
                .map_err(Self::state_file_error(&self.paths.lock_file))?;

            match lock_file.try_lock_exclusive() {
                Ok(()) => {
                    self.lock = Some(lock_file);
                }
                Err(_) => {
                    // Another live process holds the lock (the OS frees
                    // it on death); reuse its instance.
                    let payload = self.read_pid_file()?.ok_or_else(|| {
                        SupervisorError::ForeignLock {
                            component: self.component.clone(),
                        }
                    })?;
                    info!(
                        component = self.component,
                        pid = payload.pid,
                        "lock already held; reusing running instance"
                    );
                    return Ok(StartOutcome::Reused(payload.pid));
                }
            }
        }

        self.spawn().map(StartOutcome::Started)
    }

    /// Spawn a fresh child (the lock must already be held). Used by the
    /// watchdog's restart path.
    pub fn spawn(&mut self) -> SupervisorResult<i32> {
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.log_file)
            .map_err(Self::state_file_error(&self.paths.log_file))?;
        let log_err = log
            .try_clone()
            .map_err(Self::state_file_error(&self.paths.log_file))?;

        let mut command = std::process::Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group: shutdown signals the whole tree.
            command.process_group(0);
        }

        let child = command.spawn().map_err(|source| SupervisorError::Spawn {
            command: self.program.clone(),
            source,
        })?;
        let pid = i32::try_from(child.id()).unwrap_or(i32::MAX);
        self.child = Some(child);

        self.write_pid_file(pid)?;
        info!(component = self.component, pid, program = self.program, "spawned");
        Ok(pid)
    }

    /// The pid of the running instance, reaping an exited child in
    /// passing. `None` once the process is gone.
    pub fn current_pid(&mut self) -> Option<i32> {
        match self.child.as_mut() {
            Some(child) => {
                let pid = i32::try_from(child.id()).unwrap_or(i32::MAX);
                match child.try_wait() {
                    Ok(None) => Some(pid),
                    Ok(Some(status)) => {
                        debug!(component = self.component, pid, %status, "child exited");
                        self.child = None;
                        None
                    }
                    Err(_) => None,
                }
            }
            // Reused instance: probe by signal.
            None => {
                let payload = self.read_pid_file().ok().flatten()?;
                kill(Pid::from_raw(payload.pid), None)
                    .ok()
                    .map(|()| payload.pid)
            }
        }
    }

    fn write_pid_file(&self, pid: i32) -> SupervisorResult<()> {
        let payload = PidFilePayload {
            pid,
            cmd_name: self.program.clone(),
            started_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        let bytes = serde_json::to_vec(&payload).map_err(|e| SupervisorError::StateFile {
            path: self.paths.pid_file.display().to_string(),
            source: std::io::Error::other(e),
        })?;
        std::fs::write(&self.paths.pid_file, bytes)
            .map_err(Self::state_file_error(&self.paths.pid_file))
    }

    /// Read the pid file, if present and parseable.
    pub fn read_pid_file(&self) -> SupervisorResult<Option<PidFilePayload>> {
        match std::fs::read(&self.paths.pid_file) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SupervisorError::StateFile {
                path: self.paths.pid_file.display().to_string(),
                source,
            }),
        }
    }

    /// Stop the child's whole process group: SIGTERM, a grace period,
    /// then SIGKILL. Reaps the child and removes the pid file.
    pub async fn stop(&mut self) -> SupervisorResult<()> {
        let Some(pid) = self.current_pid() else {
            let _ = std::fs::remove_file(&self.paths.pid_file);
            return Ok(());
        };

        let pgid = Pid::from_raw(pid);
        match killpg(pgid, Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(source) => return Err(SupervisorError::Signal { pgid: pid, source }),
        }

        let deadline = tokio::time::Instant::now() + TERM_GRACE;
        loop {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if self.current_pid().is_none() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    component = self.component,
                    pid, "SIGTERM grace expired; killing group"
                );
                match killpg(pgid, Signal::SIGKILL) {
                    Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
                    Err(source) => {
                        return Err(SupervisorError::Signal { pgid: pid, source });
                    }
                }
                // One more pass to reap after SIGKILL.
                tokio::time::sleep(Duration::from_millis(100)).await;
                let _ = self.current_pid();
                break;
            }
        }

        let _ = std::fs::remove_file(&self.paths.pid_file);
        Ok(())
    }

    /// The component name.
    #[must_use]
    pub fn component(&self) -> &str {
        &self.component
    }
}
