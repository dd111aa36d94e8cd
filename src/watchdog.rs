//! The watchdog loop
//!
//! One cooperative task owns every piece of mutable state: the check
//! schedule, alert history, restart history and run statistics. Each tick
//! runs the due checks strictly in order, reacts to their results, then
//! publishes a `StatusReport` snapshot for the HTTP endpoint.
//!
//! A check that errors or panics is logged and the rest of the tick still
//! runs. Cancellation is only observed between ticks.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alerts::{
    format, keys, AlertChannel, AlertDispatcher, AlertError, AlertOutcome, EscalationTracker, TelegramChannel,
};
use crate::checks::billing::{check_billing, sources_from_config};
use crate::checks::health::check_health;
use crate::checks::resources::{sample_disk, sample_resources};
use crate::checks::services::check_services;
use crate::checks::{
    BillingError, BillingSource, EndpointProbe, HostSampler, HttpProbe, ProbeError, ProcessSupervisor,
    ResourceSampler, SystemdSupervisor,
};
use crate::config::WatchdogConfig;
use crate::remediation::{run_cleanup, CleanupReport, RemediationEngine, RemediationOutcome};
use crate::scheduler::{CheckSchedule, Clock, SystemClock};
use crate::storage::StateStore;
use crate::types::{
    BillingStatus, CheckKind, ResourceSnapshot, RunStatistics, ServiceState, Severity, StatusReport,
};

/// Snapshot shared with the status endpoint. Only the loop writes it.
pub type SharedStatus = Arc<RwLock<StatusReport>>;

#[derive(Debug, thiserror::Error)]
pub enum WatchdogError {
    #[error("Alert channel: {0}")]
    Alert(#[from] AlertError),
    #[error("Health probe: {0}")]
    Probe(#[from] ProbeError),
    #[error("Billing source: {0}")]
    Billing(#[from] BillingError),
    #[error("Disk usage of {0} could not be measured")]
    DiskUnavailable(String),
    #[error("Cleanup task failed: {0}")]
    Cleanup(#[from] tokio::task::JoinError),
}

/// External seams the watchdog is built from.
pub struct WatchdogParts {
    pub supervisor: Arc<dyn ProcessSupervisor>,
    pub probe: Arc<dyn EndpointProbe>,
    pub sampler: Arc<dyn ResourceSampler>,
    pub billing: Vec<Box<dyn BillingSource>>,
    pub channel: Arc<dyn AlertChannel>,
    pub store: Arc<dyn StateStore>,
    pub clock: Arc<dyn Clock>,
}

impl WatchdogParts {
    /// Production adapters: systemd, reqwest, `/proc`, Telegram.
    pub fn from_config(config: &WatchdogConfig, store: Arc<dyn StateStore>) -> Result<Self, WatchdogError> {
        let supervisor = SystemdSupervisor::new(
            std::time::Duration::from_secs(config.services.status_timeout_secs),
            std::time::Duration::from_secs(config.remediation.restart_timeout_secs),
        );
        let probe = HttpProbe::new(std::time::Duration::from_secs(config.health.timeout_secs))?;
        let billing = sources_from_config(
            &config.billing.providers,
            std::time::Duration::from_secs(config.billing.timeout_secs),
        )?;
        let channel = TelegramChannel::from_config(&config.alerts)?;

        Ok(Self {
            supervisor: Arc::new(supervisor),
            probe: Arc::new(probe),
            sampler: Arc::new(HostSampler),
            billing,
            channel: Arc::new(channel),
            store,
            clock: Arc::new(SystemClock),
        })
    }
}

pub struct Watchdog {
    config: WatchdogConfig,
    supervisor: Arc<dyn ProcessSupervisor>,
    probe: Arc<dyn EndpointProbe>,
    sampler: Arc<dyn ResourceSampler>,
    billing: Vec<Box<dyn BillingSource>>,
    clock: Arc<dyn Clock>,
    dispatcher: AlertDispatcher,
    remediation: RemediationEngine,
    escalation: EscalationTracker,
    schedule: CheckSchedule,
    stats: RunStatistics,
    last_resources: Option<ResourceSnapshot>,
    status: SharedStatus,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig, parts: WatchdogParts) -> Self {
        let started_at = parts.clock.now();
        let dispatcher = AlertDispatcher::new(parts.channel, Arc::clone(&parts.store), config.alerts.cooldown());
        let remediation = RemediationEngine::new(Arc::clone(&parts.supervisor), parts.store, &config.remediation);

        let mut initial = StatusReport::empty(started_at);
        initial.services = config
            .services
            .units
            .iter()
            .map(|u| (u.clone(), ServiceState::default()))
            .collect();

        Self {
            config,
            supervisor: parts.supervisor,
            probe: parts.probe,
            sampler: parts.sampler,
            billing: parts.billing,
            clock: parts.clock,
            dispatcher,
            remediation,
            escalation: EscalationTracker::new(),
            schedule: CheckSchedule::new(),
            stats: RunStatistics::new(started_at),
            last_resources: None,
            status: Arc::new(RwLock::new(initial)),
        }
    }

    // ========================================================================
    // Loop
    // ========================================================================

    /// Send the startup notice, then tick until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            services = self.config.services.units.len(),
            endpoints = self.config.health.endpoints.len(),
            tick_secs = self.config.intervals.tick_secs,
            "Watchdog loop starting"
        );
        self.notify_startup().await;

        loop {
            self.tick().await;
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Shutdown requested, leaving watchdog loop");
                    break;
                }
                () = tokio::time::sleep(self.config.intervals.tick()) => {}
            }
        }
    }

    /// Run whatever is due now. Returns the kinds that ran.
    pub async fn tick(&mut self) -> Vec<CheckKind> {
        let due = self.schedule.due_kinds(self.clock.now(), &self.config.intervals);
        for kind in &due {
            self.run_isolated(*kind).await;
        }
        self.publish().await;
        due
    }

    /// Run every kind once regardless of schedule.
    pub async fn run_once(&mut self) -> StatusReport {
        for kind in CheckKind::ALL {
            self.run_isolated(kind).await;
        }
        self.publish().await;
        self.status_report()
    }

    async fn run_isolated(&mut self, kind: CheckKind) {
        let started = self.clock.now();
        let outcome = AssertUnwindSafe(self.run_check(kind, started))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => debug!(kind = %kind, "Check complete"),
            Ok(Err(e)) => error!(kind = %kind, error = %e, "Check failed"),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(kind = %kind, panic = %msg, "Check panicked");
            }
        }

        self.schedule.mark_run(kind, self.clock.now());
        self.stats.total_checks += 1;
    }

    async fn run_check(&mut self, kind: CheckKind, now: DateTime<Utc>) -> Result<(), WatchdogError> {
        match kind {
            CheckKind::Services => {
                self.check_services(now).await;
                Ok(())
            }
            CheckKind::Health => {
                self.check_health(now).await;
                Ok(())
            }
            CheckKind::Resources => {
                self.check_resources(now).await;
                Ok(())
            }
            CheckKind::Disk => self.check_disk(now).await,
            CheckKind::Billing => {
                self.check_billing(now).await;
                Ok(())
            }
        }
    }

    // ========================================================================
    // Reactions
    // ========================================================================

    async fn check_services(&mut self, now: DateTime<Utc>) {
        let statuses = check_services(self.supervisor.as_ref(), &self.config.services.units).await;

        for status in statuses {
            if status.active {
                self.remediation.mark_healthy(&status.name);
                continue;
            }
            warn!(service = %status.name, status = %status.raw_status, "Service inactive");

            let outcome = self.remediation.remediate(&status.name, now).await;
            self.stats.restarts_attempted = self.remediation.restarts_executed();

            let (message, key) = match outcome {
                RemediationOutcome::Recovered { attempts } => {
                    (format::recovery(&status.name, attempts, now), keys::recovery(&status.name))
                }
                RemediationOutcome::RestartFailed { reason } => {
                    let journal = self.journal_tail(&status.name).await;
                    (
                        format::restart_failed(&status.name, &status.raw_status, &reason, journal.as_deref(), now),
                        keys::service(&status.name),
                    )
                }
                RemediationOutcome::Rejected { command } => (
                    format::restart_rejected(&status.name, &command, now),
                    keys::service(&status.name),
                ),
                RemediationOutcome::BudgetExhausted { attempts } => (
                    format::budget_exhausted(&status.name, attempts, self.remediation.window_minutes(), now),
                    keys::service_exhausted(&status.name),
                ),
                RemediationOutcome::Disabled => (
                    format::service_alert(
                        &status.name,
                        &status.raw_status,
                        Some("automatic restart disabled"),
                        now,
                    ),
                    keys::service(&status.name),
                ),
            };
            self.alert(&message, &key, now).await;
        }
    }

    async fn journal_tail(&self, service: &str) -> Option<String> {
        let lines = self.config.alerts.journal_lines;
        if lines == 0 {
            return None;
        }
        match self.supervisor.journal_tail(service, lines).await {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(service, error = %e, "Journal unavailable");
                None
            }
        }
    }

    async fn check_health(&mut self, now: DateTime<Utc>) {
        let results = check_health(
            self.probe.as_ref(),
            &self.config.health.endpoints,
            self.config.health.body_preview_chars,
        )
        .await;

        for result in results.iter().filter(|r| !r.healthy) {
            warn!(endpoint = %result.name, status = result.status_code, "Health check failed");
            self.alert(&format::health_alert(result, now), &keys::health(&result.name), now)
                .await;
        }
    }

    async fn check_resources(&mut self, now: DateTime<Utc>) {
        let mut snapshot = sample_resources(self.sampler.as_ref(), &self.config.resources.databases);
        snapshot.disk_percent = self.last_resources.as_ref().map_or(0.0, |s| s.disk_percent);
        info!(
            ram = format!("{:.1}", snapshot.ram_percent),
            cpu = format!("{:.1}", snapshot.cpu_percent),
            "Resources sampled"
        );

        let thresholds = self.config.thresholds.clone();
        for (metric, label, value, threshold) in [
            ("ram", "RAM", snapshot.ram_percent, thresholds.ram()),
            ("cpu", "CPU", snapshot.cpu_percent, thresholds.cpu()),
        ] {
            if let Some(severity) = self.escalation.observe(metric, threshold.classify(value)) {
                let message = format::resource_alert(label, value, threshold.bound(severity), severity, now);
                self.alert(&message, &keys::resource(metric, severity), now).await;
            }
        }

        for (path, size_mb) in &snapshot.db_sizes_mb {
            if *size_mb > thresholds.db_max_mb {
                warn!(path = %path, size_mb, "Database over size limit");
                let message = format::db_oversize(path, *size_mb, thresholds.db_max_mb, now);
                self.alert(&message, &keys::db_oversize(path), now).await;
            }
        }

        self.last_resources = Some(snapshot);
    }

    async fn check_disk(&mut self, now: DateTime<Utc>) -> Result<(), WatchdogError> {
        let path = self.config.resources.disk_path.clone();
        let percent = sample_disk(self.sampler.as_ref(), &path)
            .ok_or_else(|| WatchdogError::DiskUnavailable(path.clone()))?;
        self.last_resources.get_or_insert_with(ResourceSnapshot::default).disk_percent = percent;
        info!(path = %path, disk = format!("{percent:.1}"), "Disk sampled");

        let threshold = self.config.thresholds.disk();
        let level = threshold.classify(percent);

        let cleanup = if level == Some(Severity::Critical) && self.config.cleanup.on_disk_critical {
            Some(self.cleanup().await?)
        } else {
            None
        };

        if let Some(severity) = self.escalation.observe("disk", level) {
            let message = format::disk_alert(percent, threshold.bound(severity), severity, cleanup.as_ref(), now);
            self.alert(&message, &keys::resource("disk", severity), now).await;
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<CleanupReport, WatchdogError> {
        warn!("Disk critical, running cleanup");
        let config = self.config.cleanup.clone();
        let report = tokio::task::spawn_blocking(move || run_cleanup(&config, false)).await?;
        Ok(report)
    }

    async fn check_billing(&mut self, now: DateTime<Utc>) {
        let results = check_billing(&self.billing).await;

        for result in results {
            match result.status {
                BillingStatus::Ok => {
                    let Some(balance) = result.balance else { continue };
                    let classified = self
                        .config
                        .billing
                        .providers
                        .iter()
                        .find(|p| p.name == result.provider)
                        .map(|p| (p.classify(balance), p.clone()));
                    let Some((level, provider)) = classified else {
                        debug!(provider = %result.provider, "No thresholds for provider");
                        continue;
                    };
                    info!(provider = %result.provider, balance, currency = %result.currency, "Balance checked");

                    let metric = format!("billing:{}", result.provider);
                    if let Some(severity) = self.escalation.observe(&metric, level) {
                        let message = format::billing_alert(&result, provider.bound(severity), severity, now);
                        self.alert(&message, &keys::billing(&result.provider, severity), now).await;
                    }
                }
                BillingStatus::QueryFailed => {
                    warn!(provider = %result.provider, message = %result.message, "Balance query failed");
                    let message = format::billing_unavailable(&result, now);
                    self.alert(&message, &keys::billing_unavailable(&result.provider), now).await;
                }
                BillingStatus::NotConfigured | BillingStatus::ManualCheck => {
                    debug!(provider = %result.provider, message = %result.message, "Balance not queried");
                }
            }
        }
    }

    // ========================================================================
    // Alerts & reporting
    // ========================================================================

    async fn alert(&mut self, message: &str, key: &str, now: DateTime<Utc>) -> AlertOutcome {
        let outcome = self.dispatcher.send_alert(message, key, now).await;
        if outcome == AlertOutcome::Sent {
            self.stats.alerts_sent += 1;
        }
        outcome
    }

    async fn notify_startup(&mut self) {
        let credentials: Vec<(String, bool)> = self
            .config
            .billing
            .providers
            .iter()
            .map(|p| (p.name.clone(), p.token().is_some()))
            .collect();
        let message = format::startup(
            &self.config.services.units,
            self.config.health.endpoints.len(),
            &credentials,
            self.clock.now(),
        );
        match self.dispatcher.send_direct(&message).await {
            Ok(()) => self.stats.alerts_sent += 1,
            Err(e) => warn!(error = %e, "Startup notification not delivered"),
        }
    }

    /// Probe everything once and send the status digest directly.
    pub async fn send_report(&mut self) -> Result<(), AlertError> {
        let now = self.clock.now();
        let services = check_services(self.supervisor.as_ref(), &self.config.services.units).await;
        let mut resources = sample_resources(self.sampler.as_ref(), &self.config.resources.databases);
        resources.disk_percent = sample_disk(self.sampler.as_ref(), &self.config.resources.disk_path).unwrap_or(0.0);
        let billing = check_billing(&self.billing).await;

        let message = format::status_report(&services, &resources, &billing, now);
        self.dispatcher.send_direct(&message).await?;
        self.stats.alerts_sent += 1;
        Ok(())
    }

    pub fn status_report(&self) -> StatusReport {
        let now = self.clock.now();
        let mut services = self.remediation.states().clone();
        for unit in &self.config.services.units {
            services.entry(unit.clone()).or_default();
        }
        StatusReport {
            generated_at: now,
            started_at: self.stats.started_at,
            uptime_seconds: now.signed_duration_since(self.stats.started_at).num_seconds(),
            total_checks: self.stats.total_checks,
            alerts_sent: self.stats.alerts_sent,
            restarts_attempted: self.stats.restarts_attempted,
            last_checks: self.schedule.snapshot(),
            services,
            resources: self.last_resources.clone(),
        }
    }

    async fn publish(&self) {
        let report = self.status_report();
        *self.status.write().await = report;
    }

    pub fn status_handle(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    pub const fn stats(&self) -> &RunStatistics {
        &self.stats
    }

    pub const fn schedule(&self) -> &CheckSchedule {
        &self.schedule
    }

    pub const fn dispatcher(&self) -> &AlertDispatcher {
        &self.dispatcher
    }

    pub const fn config(&self) -> &WatchdogConfig {
        &self.config
    }
}
