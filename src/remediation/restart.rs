//! Bounded, allow-listed service restarts
//!
//! A restart is a structured `RestartAction`, never a free-form string. It
//! renders to exactly one command line, and that line must appear verbatim
//! in the allow-list before the supervisor is asked to do anything.
//! Attempts (including rejected and failed ones) are counted per service in
//! a sliding window; once the budget is spent the service is left alone
//! until the window rolls over.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::checks::ProcessSupervisor;
use crate::config::{defaults, RemediationConfig};
use crate::storage::StateStore;
use crate::types::{RestartRecord, ServiceState};

// ============================================================================
// Restart Action
// ============================================================================

/// Restart of one supervised unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartAction {
    service: String,
}

impl RestartAction {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Command line matched against the allow-list.
    pub fn command_line(&self) -> String {
        format!("systemctl restart {}", self.service)
    }
}

// ============================================================================
// Restart History
// ============================================================================

/// Per-service restart records, oldest first, capped.
#[derive(Debug, Clone)]
pub struct RestartHistory {
    records: HashMap<String, VecDeque<RestartRecord>>,
    cap: usize,
}

impl Default for RestartHistory {
    fn default() -> Self {
        Self::with_cap(defaults::RESTART_HISTORY_CAP)
    }
}

impl RestartHistory {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            records: HashMap::new(),
            cap: cap.max(1),
        }
    }

    /// Append a record, evicting the oldest beyond the cap.
    pub fn record(&mut self, service: &str, record: RestartRecord) {
        let entries = self.records.entry(service.to_string()).or_default();
        entries.push_back(record);
        while entries.len() > self.cap {
            entries.pop_front();
        }
    }

    /// Attempts strictly newer than `now - window`.
    /// A window reaching past the start of time counts every record.
    pub fn recent_attempts(&self, service: &str, now: DateTime<Utc>, window: TimeDelta) -> usize {
        let cutoff = now.checked_sub_signed(window);
        self.records.get(service).map_or(0, |r| {
            r.iter()
                .filter(|rec| cutoff.map_or(true, |c| rec.timestamp > c))
                .count()
        })
    }

    pub fn records(&self, service: &str) -> Vec<RestartRecord> {
        self.records
            .get(service)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }

    fn restore(&mut self, service: String, mut records: Vec<RestartRecord>) {
        records.sort_by_key(|r| r.timestamp);
        let skip = records.len().saturating_sub(self.cap);
        self.records.insert(service, records.into_iter().skip(skip).collect());
    }
}

// ============================================================================
// Remediation Engine
// ============================================================================

/// Result of one remediation attempt for an inactive service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationOutcome {
    /// Restarted and confirmed active
    Recovered { attempts: usize },
    /// Restart ran (or errored) but the unit is not active
    RestartFailed { reason: String },
    /// Command not on the allow-list; nothing executed
    Rejected { command: String },
    /// Budget spent within the window; nothing executed
    BudgetExhausted { attempts: usize },
    /// Automatic restarts switched off
    Disabled,
}

pub struct RemediationEngine {
    supervisor: Arc<dyn ProcessSupervisor>,
    store: Arc<dyn StateStore>,
    allow_list: HashSet<String>,
    restart_on_failure: bool,
    max_restarts: usize,
    window: TimeDelta,
    window_minutes: u64,
    verify_delay: std::time::Duration,
    history: RestartHistory,
    states: BTreeMap<String, ServiceState>,
    restarts_executed: u64,
}

impl RemediationEngine {
    pub fn new(
        supervisor: Arc<dyn ProcessSupervisor>,
        store: Arc<dyn StateStore>,
        config: &RemediationConfig,
    ) -> Self {
        // History must hold at least a full budget or the window count saturates
        let cap = defaults::RESTART_HISTORY_CAP.max(config.max_restarts);
        let mut history = RestartHistory::with_cap(cap);
        match store.load_restart_history() {
            Ok(saved) => {
                for (service, records) in saved {
                    history.restore(service, records);
                }
            }
            Err(e) => warn!(error = %e, "Could not load restart history, starting empty"),
        }

        Self {
            supervisor,
            store,
            allow_list: config.allowed_commands.iter().cloned().collect(),
            restart_on_failure: config.restart_on_failure,
            max_restarts: config.max_restarts,
            window: TimeDelta::from_std(config.window()).unwrap_or(TimeDelta::MAX),
            window_minutes: config.cooldown_minutes,
            verify_delay: config.verify_delay(),
            history,
            states: BTreeMap::new(),
            restarts_executed: 0,
        }
    }

    pub fn is_allowed(&self, action: &RestartAction) -> bool {
        self.allow_list.contains(&action.command_line())
    }

    /// Record that a service was observed active.
    pub fn mark_healthy(&mut self, service: &str) {
        self.states.insert(service.to_string(), ServiceState::Healthy);
    }

    /// Handle an inactive service: budget check, allow-list, restart, verify.
    pub async fn remediate(&mut self, service: &str, now: DateTime<Utc>) -> RemediationOutcome {
        self.set_state(service, ServiceState::Unhealthy);

        if !self.restart_on_failure {
            return RemediationOutcome::Disabled;
        }

        let recent = self.history.recent_attempts(service, now, self.window);
        if recent >= self.max_restarts {
            warn!(service, attempts = recent, "Restart budget exhausted");
            self.set_state(service, ServiceState::PersistentlyUnhealthy);
            return RemediationOutcome::BudgetExhausted { attempts: recent };
        }

        let action = RestartAction::new(service);
        if !self.is_allowed(&action) {
            let command = action.command_line();
            error!(service, command = %command, "Restart rejected: command not allow-listed");
            self.record(service, now, false);
            return RemediationOutcome::Rejected { command };
        }

        self.set_state(service, ServiceState::RestartAttempted);
        self.restarts_executed += 1;
        info!(service, attempt = recent + 1, "Restarting service");

        if let Err(e) = self.supervisor.restart(&action).await {
            error!(service, error = %e, "Restart command failed");
            self.record(service, now, false);
            self.set_state(service, ServiceState::Unhealthy);
            return RemediationOutcome::RestartFailed {
                reason: e.to_string(),
            };
        }

        if !self.verify_delay.is_zero() {
            tokio::time::sleep(self.verify_delay).await;
        }

        let verified = self.supervisor.is_active(service).await;
        match verified {
            Ok(raw) if raw == "active" => {
                self.record(service, now, true);
                self.set_state(service, ServiceState::Healthy);
                info!(service, "Service recovered after restart");
                RemediationOutcome::Recovered {
                    attempts: recent + 1,
                }
            }
            Ok(raw) => {
                self.record(service, now, false);
                self.set_state(service, ServiceState::Unhealthy);
                warn!(service, status = %raw, "Service still not active after restart");
                RemediationOutcome::RestartFailed {
                    reason: format!("still {raw} after restart"),
                }
            }
            Err(e) => {
                self.record(service, now, false);
                self.set_state(service, ServiceState::Unhealthy);
                RemediationOutcome::RestartFailed {
                    reason: format!("verification failed: {e}"),
                }
            }
        }
    }

    fn record(&mut self, service: &str, at: DateTime<Utc>, success: bool) {
        self.history.record(service, RestartRecord { timestamp: at, success });
        if let Err(e) = self
            .store
            .save_restart_history(service, &self.history.records(service))
        {
            warn!(service, error = %e, "Restart history not persisted");
        }
    }

    fn set_state(&mut self, service: &str, state: ServiceState) {
        self.states.insert(service.to_string(), state);
    }

    pub fn state(&self, service: &str) -> ServiceState {
        self.states.get(service).copied().unwrap_or_default()
    }

    pub const fn states(&self) -> &BTreeMap<String, ServiceState> {
        &self.states
    }

    pub const fn history(&self) -> &RestartHistory {
        &self.history
    }

    /// Restarts actually handed to the supervisor.
    pub const fn restarts_executed(&self) -> u64 {
        self.restarts_executed
    }

    pub const fn window_minutes(&self) -> u64 {
        self.window_minutes
    }
}
