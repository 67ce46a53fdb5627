//! The watchdog: registry, probe loop, and restart orchestration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use stigmer_config::ComponentPaths;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::backoff::RestartPolicy;
use crate::error::{SupervisorError, SupervisorResult};
use crate::launcher::{Launcher, StartOutcome};
use crate::probe::{Probe, ProbeOutcome};

/// Watchdog iteration interval.
const WATCHDOG_INTERVAL: Duration = Duration::from_secs(10);

/// One managed component's definition.
#[derive(Debug, Clone)]
pub struct ComponentSpec {
    /// Component name (also names its pid/lock/log files).
    pub name: String,
    /// Program to run.
    pub program: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Passing once ends the startup grace period; failures before that
    /// never count against the component.
    pub startup: Probe,
    /// Failing past its threshold triggers a restart.
    pub liveness: Probe,
    /// Informational readiness, surfaced in status output.
    pub readiness: Option<Probe>,
}

/// Component health as surfaced by the status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentHealth {
    /// Inside the startup grace period.
    Starting,
    /// Liveness passing.
    Healthy,
    /// Liveness failing past its threshold.
    Unhealthy,
    /// Waiting out the restart backoff.
    BackingOff,
    /// Restart budget exhausted; operator attention required.
    Degraded,
}

/// Status snapshot for one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    /// Component name.
    pub name: String,
    /// Current health.
    pub health: ComponentHealth,
    /// Pid of the running instance, when alive.
    pub pid: Option<i32>,
    /// Restarts within the budget window.
    pub restarts_in_window: usize,
    /// Restarts since registration.
    pub total_restarts: u32,
    /// Seconds since the current instance started.
    pub uptime_secs: u64,
    /// Readiness probe verdict, when configured.
    pub ready: Option<bool>,
}

struct ComponentEntry {
    spec: ComponentSpec,
    launcher: Launcher,
    health: ComponentHealth,
    started_at: Instant,
    startup_passed: bool,
    consecutive_failures: u32,
    policy: RestartPolicy,
    backoff_until: Option<Instant>,
    total_restarts: u32,
    ready: Option<bool>,
}

struct Inner {
    components: Mutex<HashMap<String, ComponentEntry>>,
}

/// Health supervisor for managed subprocesses.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    /// Create an empty supervisor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                components: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register and start a component.
    ///
    /// # Errors
    ///
    /// Returns an error when the component cannot be spawned or its
    /// state files are unusable. A held lock is not an error: the live
    /// instance is reused.
    pub async fn register(
        &self,
        spec: ComponentSpec,
        paths: ComponentPaths,
    ) -> SupervisorResult<()> {
        let mut launcher = Launcher::new(
            spec.name.clone(),
            spec.program.clone(),
            spec.args.clone(),
            paths,
        );
        match launcher.start()? {
            StartOutcome::Started(pid) => {
                info!(component = spec.name, pid, "component started");
            }
            StartOutcome::Reused(pid) => {
                info!(component = spec.name, pid, "component reused");
            }
        }

        let entry = ComponentEntry {
            launcher,
            health: ComponentHealth::Starting,
            started_at: Instant::now(),
            startup_passed: false,
            consecutive_failures: 0,
            policy: RestartPolicy::new(),
            backoff_until: None,
            total_restarts: 0,
            ready: None,
            spec,
        };
        self.inner
            .components
            .lock()
            .await
            .insert(entry.spec.name.clone(), entry);
        Ok(())
    }

    /// Run the watchdog until the task is aborted.
    #[must_use]
    pub fn spawn_watchdog(&self) -> tokio::task::JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(WATCHDOG_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                supervisor.tick().await;
            }
        })
    }

    /// One watchdog iteration: probe every component, then restart the
    /// unhealthy ones whose backoff has elapsed. Probes run with the
    /// registry lock released; restarts are dispatched afterwards.
    pub async fn tick(&self) {
        // Snapshot probe work under the lock.
        let mut work = Vec::new();
        {
            let mut components = self.inner.components.lock().await;
            for (name, entry) in components.iter_mut() {
                if entry.health == ComponentHealth::Degraded {
                    continue;
                }
                let pid = entry.launcher.current_pid();
                let probe = if entry.startup_passed {
                    entry.spec.liveness.clone()
                } else {
                    entry.spec.startup.clone()
                };
                let readiness = entry.spec.readiness.clone();
                work.push((name.clone(), pid, probe, readiness, entry.startup_passed));
            }
        }

        // Probe with the lock released.
        let mut outcomes = Vec::with_capacity(work.len());
        for (name, pid, probe, readiness, startup_passed) in work {
            let outcome = match pid {
                Some(pid) => probe.check(Some(pid)).await,
                None => ProbeOutcome::Unhealthy("process not running".to_string()),
            };
            let ready = match &readiness {
                Some(probe) => Some(probe.check(pid).await == ProbeOutcome::Healthy),
                None => None,
            };
            outcomes.push((name, pid, outcome, ready, startup_passed));
        }

        // Apply outcomes and collect restart candidates.
        let now = Instant::now();
        let mut to_restart = Vec::new();
        {
            let mut components = self.inner.components.lock().await;
            for (name, pid, outcome, ready, was_startup) in outcomes {
                let Some(entry) = components.get_mut(&name) else {
                    continue;
                };
                entry.ready = ready;

                match outcome {
                    ProbeOutcome::Healthy => {
                        if !was_startup {
                            entry.policy.note_healthy(now.duration_since(entry.started_at));
                        }
                        entry.startup_passed = true;
                        entry.consecutive_failures = 0;
                        entry.health = ComponentHealth::Healthy;
                        entry.backoff_until = None;
                    }
                    ProbeOutcome::Unhealthy(reason) => {
                        if !entry.startup_passed && pid.is_some() {
                            // Startup grace: failures do not count yet.
                            continue;
                        }
                        entry.consecutive_failures =
                            entry.consecutive_failures.saturating_add(1);
                        let threshold = entry.spec.liveness.failure_threshold.max(1);
                        if entry.consecutive_failures < threshold && pid.is_some() {
                            continue;
                        }
                        if entry.health == ComponentHealth::Healthy
                            || entry.health == ComponentHealth::Starting
                        {
                            warn!(component = name, reason, "component unhealthy");
                            entry.health = ComponentHealth::Unhealthy;
                        }

                        match entry.backoff_until {
                            None => match entry.policy.next_delay(now) {
                                Some(delay) => {
                                    entry.backoff_until = Some(now + delay);
                                    entry.health = ComponentHealth::BackingOff;
                                }
                                None => {
                                    error!(
                                        component = name,
                                        max_restarts = RestartPolicy::max_restarts(),
                                        "restart budget exhausted; component degraded"
                                    );
                                    entry.health = ComponentHealth::Degraded;
                                }
                            },
                            Some(until) if now >= until => {
                                to_restart.push(name.clone());
                            }
                            Some(_) => {}
                        }
                    }
                }
            }
        }

        // Restart outside the probing pass; each component independently.
        for name in to_restart {
            self.restart(&name).await;
        }
    }

    async fn restart(&self, name: &str) {
        let mut components = self.inner.components.lock().await;
        let Some(entry) = components.get_mut(name) else {
            return;
        };
        if let Err(err) = entry.launcher.stop().await {
            warn!(component = name, error = %err, "stopping dead instance failed");
        }
        match entry.launcher.spawn() {
            Ok(pid) => {
                info!(component = name, pid, "component restarted");
                entry.total_restarts = entry.total_restarts.saturating_add(1);
                entry.started_at = Instant::now();
                entry.startup_passed = false;
                entry.consecutive_failures = 0;
                entry.backoff_until = None;
                entry.health = ComponentHealth::Starting;
            }
            Err(err) => {
                error!(component = name, error = %err, "restart failed");
                entry.backoff_until = None;
            }
        }
    }

    /// Status snapshot for every registered component.
    pub async fn status(&self) -> Vec<ComponentStatus> {
        let mut components = self.inner.components.lock().await;
        let mut statuses: Vec<ComponentStatus> = components
            .iter_mut()
            .map(|(name, entry)| ComponentStatus {
                name: name.clone(),
                health: entry.health,
                pid: entry.launcher.current_pid(),
                restarts_in_window: entry.policy.restarts_in_window(),
                total_restarts: entry.total_restarts,
                uptime_secs: entry.started_at.elapsed().as_secs(),
                ready: entry.ready,
            })
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// True when any component exhausted its restart budget.
    pub async fn is_degraded(&self) -> bool {
        self.inner
            .components
            .lock()
            .await
            .values()
            .any(|entry| entry.health == ComponentHealth::Degraded)
    }

    /// Stop every component's process group.
    pub async fn shutdown(&self) {
        let mut components = self.inner.components.lock().await;
        for (name, entry) in components.iter_mut() {
            if let Err(err) = entry.launcher.stop().await {
                warn!(component = name, error = %err, "shutdown stop failed");
            }
        }
    }

    /// Stop and deregister one component.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownComponent`] when not registered.
    pub async fn deregister(&self, name: &str) -> SupervisorResult<()> {
        let mut components = self.inner.components.lock().await;
        let mut entry = components
            .remove(name)
            .ok_or_else(|| SupervisorError::UnknownComponent(name.to_string()))?;
        entry.launcher.stop().await
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeTarget;

    fn probe() -> Probe {
        Probe {
            target: ProbeTarget::Process,
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(2),
            failure_threshold: 1,
        }
    }

    fn spec(name: &str, program: &str, args: &[&str]) -> ComponentSpec {
        ComponentSpec {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
            startup: probe(),
            liveness: probe(),
            readiness: None,
        }
    }

    fn paths(dir: &std::path::Path, name: &str) -> ComponentPaths {
        ComponentPaths {
            pid_file: dir.join(format!("{name}.pid")),
            lock_file: dir.join(format!("{name}.lock")),
            log_file: dir.join(format!("{name}.log")),
        }
    }

    #[tokio::test]
    async fn healthy_component_reports_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new();
        supervisor
            .register(spec("runner", "sleep", &["30"]), paths(dir.path(), "runner"))
            .await
            .unwrap();

        supervisor.tick().await;

        let status = supervisor.status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].health, ComponentHealth::Healthy);
        assert!(status[0].pid.is_some());
        assert!(!supervisor.is_degraded().await);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn killed_component_is_restarted() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new();
        supervisor
            .register(spec("runner", "sleep", &["30"]), paths(dir.path(), "runner"))
            .await
            .unwrap();

        supervisor.tick().await;
        let pid = supervisor.status().await[0].pid.unwrap();

        // Crash it.
        nix::sys::signal::killpg(nix::unistd::Pid::from_raw(pid), nix::sys::signal::Signal::SIGKILL)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        // First tick: detects death, schedules backoff (1s).
        supervisor.tick().await;
        assert_eq!(supervisor.status().await[0].health, ComponentHealth::BackingOff);

        // After the backoff elapses, the next tick restarts.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        supervisor.tick().await;
        let status = &supervisor.status().await[0];
        assert_eq!(status.total_restarts, 1);
        let new_pid = status.pid.unwrap();
        assert_ne!(new_pid, pid);

        supervisor.shutdown().await;
    }
}
