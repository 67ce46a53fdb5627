//! Health probes.
//!
//! A probe is a target plus scheduling parameters. Targets are
//! per-component: process-alive via a zero signal, a gRPC dial for
//! stigmer-server itself, a `docker inspect` for the containerized
//! agent runner.

use std::time::Duration;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::debug;

/// What a probe checks.
#[derive(Debug, Clone)]
pub enum ProbeTarget {
    /// The supervised process answers a zero signal.
    Process,
    /// A gRPC endpoint accepts a connection.
    GrpcDial {
        /// `host:port` to dial.
        address: String,
    },
    /// A docker container reports `State.Running = true`.
    DockerInspect {
        /// Container name or id.
        container: String,
    },
}

/// A scheduled health check.
#[derive(Debug, Clone)]
pub struct Probe {
    /// What to check.
    pub target: ProbeTarget,
    /// How often to check.
    pub interval: Duration,
    /// Per-check timeout.
    pub timeout: Duration,
    /// Consecutive failures before the component counts as unhealthy.
    pub failure_threshold: u32,
}

impl Probe {
    /// A probe with the standard 10s timeout.
    #[must_use]
    pub fn new(target: ProbeTarget, interval: Duration, failure_threshold: u32) -> Self {
        Self {
            target,
            interval,
            timeout: Duration::from_secs(10),
            failure_threshold,
        }
    }

    /// Run one check against the current pid (ignored by non-process
    /// targets).
    pub async fn check(&self, pid: Option<i32>) -> ProbeOutcome {
        let result = tokio::time::timeout(self.timeout, self.run(pid)).await;
        match result {
            Ok(Ok(())) => ProbeOutcome::Healthy,
            Ok(Err(reason)) => ProbeOutcome::Unhealthy(reason),
            Err(_) => ProbeOutcome::Unhealthy(format!(
                "probe timed out after {:?}",
                self.timeout
            )),
        }
    }

    async fn run(&self, pid: Option<i32>) -> Result<(), String> {
        match &self.target {
            ProbeTarget::Process => {
                let pid = pid.ok_or_else(|| "process not running".to_string())?;
                kill(Pid::from_raw(pid), None)
                    .map_err(|errno| format!("pid {pid} not alive: {errno}"))
            }
            ProbeTarget::GrpcDial { address } => {
                let endpoint =
                    tonic::transport::Endpoint::try_from(format!("http://{address}"))
                        .map_err(|e| format!("bad probe address {address:?}: {e}"))?
                        .connect_timeout(self.timeout);
                endpoint
                    .connect()
                    .await
                    .map(|_| ())
                    .map_err(|e| format!("dial {address} failed: {e}"))
            }
            ProbeTarget::DockerInspect { container } => {
                let output = tokio::process::Command::new("docker")
                    .args(["inspect", "-f", "{{.State.Running}}", container])
                    .output()
                    .await
                    .map_err(|e| format!("docker inspect failed to run: {e}"))?;
                let running = String::from_utf8_lossy(&output.stdout);
                if output.status.success() && running.trim() == "true" {
                    Ok(())
                } else {
                    debug!(container, output = %running.trim(), "docker inspect");
                    Err(format!("container {container} is not running"))
                }
            }
        }
    }
}

/// Result of one probe check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The check passed.
    Healthy,
    /// The check failed with this reason.
    Unhealthy(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(target: ProbeTarget) -> Probe {
        Probe {
            target,
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(2),
            failure_threshold: 1,
        }
    }

    #[tokio::test]
    async fn own_process_is_alive() {
        let pid = i32::try_from(std::process::id()).unwrap();
        let outcome = probe(ProbeTarget::Process).check(Some(pid)).await;
        assert_eq!(outcome, ProbeOutcome::Healthy);
    }

    #[tokio::test]
    async fn missing_process_is_unhealthy() {
        let outcome = probe(ProbeTarget::Process).check(None).await;
        assert!(matches!(outcome, ProbeOutcome::Unhealthy(_)));
    }

    #[tokio::test]
    async fn dead_pid_is_unhealthy() {
        // Spawn and reap a child so its pid is gone.
        let mut child = tokio::process::Command::new("true")
            .spawn()
            .expect("spawn true");
        let pid = i32::try_from(child.id().unwrap()).unwrap();
        let _ = child.wait().await;

        let outcome = probe(ProbeTarget::Process).check(Some(pid)).await;
        assert!(matches!(outcome, ProbeOutcome::Unhealthy(_)));
    }

    #[tokio::test]
    async fn closed_port_fails_grpc_dial() {
        // Port 1 is essentially never listening.
        let outcome = probe(ProbeTarget::GrpcDial {
            address: "127.0.0.1:1".to_string(),
        })
        .check(None)
        .await;
        assert!(matches!(outcome, ProbeOutcome::Unhealthy(_)));
    }
}
