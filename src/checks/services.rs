//! Service liveness via the process supervisor
//!
//! The supervisor is a trait so the coordinator and remediation engine can
//! be exercised without systemd. `SystemdSupervisor` shells out to
//! `systemctl` / `journalctl` with argument vectors and hard timeouts.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::remediation::RestartAction;
use crate::types::ServiceStatus;

/// Errors from the process supervisor
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {secs}s")]
    Timeout { program: &'static str, secs: u64 },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: &'static str,
        status: String,
        stderr: String,
    },
}

/// Queries and restarts supervised units.
#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Raw liveness word for a unit (`active`, `inactive`, `failed`, ...)
    async fn is_active(&self, unit: &str) -> Result<String, SupervisorError>;

    /// Execute a vetted restart
    async fn restart(&self, action: &RestartAction) -> Result<(), SupervisorError>;

    /// Last `lines` journal lines for a unit
    async fn journal_tail(&self, unit: &str, lines: usize) -> Result<String, SupervisorError>;
}

/// `systemctl`-backed supervisor.
#[derive(Debug, Clone)]
pub struct SystemdSupervisor {
    status_timeout: Duration,
    restart_timeout: Duration,
}

impl SystemdSupervisor {
    pub const fn new(status_timeout: Duration, restart_timeout: Duration) -> Self {
        Self {
            status_timeout,
            restart_timeout,
        }
    }

    async fn run(
        program: &'static str,
        args: &[&str],
        limit: Duration,
    ) -> Result<std::process::Output, SupervisorError> {
        let output = timeout(
            limit,
            Command::new(program).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| SupervisorError::Timeout {
            program,
            secs: limit.as_secs(),
        })?
        .map_err(|source| SupervisorError::Spawn { program, source })?;
        Ok(output)
    }
}

#[async_trait]
impl ProcessSupervisor for SystemdSupervisor {
    async fn is_active(&self, unit: &str) -> Result<String, SupervisorError> {
        // Non-zero exit is normal for inactive units; stdout carries the state
        let output = Self::run("systemctl", &["is-active", unit], self.status_timeout).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn restart(&self, action: &RestartAction) -> Result<(), SupervisorError> {
        let output = Self::run(
            "systemctl",
            &["restart", action.service()],
            self.restart_timeout,
        )
        .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SupervisorError::Failed {
                program: "systemctl",
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn journal_tail(&self, unit: &str, lines: usize) -> Result<String, SupervisorError> {
        let n = lines.to_string();
        let output = Self::run(
            "journalctl",
            &["-u", unit, "-n", &n, "--no-pager", "-o", "cat"],
            self.status_timeout,
        )
        .await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}

/// Query every unit in order. Failures become `active = false`.
pub async fn check_services(
    supervisor: &dyn ProcessSupervisor,
    units: &[String],
) -> Vec<ServiceStatus> {
    let mut statuses = Vec::with_capacity(units.len());
    for unit in units {
        let status = match supervisor.is_active(unit).await {
            Ok(raw) => ServiceStatus {
                name: unit.clone(),
                active: raw == "active",
                raw_status: raw,
            },
            Err(e) => ServiceStatus {
                name: unit.clone(),
                active: false,
                raw_status: e.to_string(),
            },
        };
        debug!(service = %status.name, active = status.active, raw = %status.raw_status, "Service checked");
        statuses.push(status);
    }
    statuses
}
