//! End-to-end scenarios for the watchdog loop
//!
//! Every external seam is replaced by a scripted fake and time is driven by
//! a manual clock, so each tick is deterministic.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use watchkeeper::alerts::{AlertChannel, AlertError};
use watchkeeper::checks::{
    BillingSource, EndpointProbe, ProbeError, ProbeResponse, ProcessSupervisor, ResourceSampler,
    SampleError, SupervisorError,
};
use watchkeeper::config::{BillingProviderConfig, ProviderKind};
use watchkeeper::remediation::RestartAction;
use watchkeeper::{
    BillingResult, CheckKind, Clock, InMemoryStore, ServiceState, Watchdog, WatchdogConfig,
    WatchdogParts,
};

// ============================================================================
// Fakes
// ============================================================================

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn new() -> Self {
        Self(Mutex::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()))
    }

    fn advance(&self, secs: i64) {
        *self.0.lock().unwrap() += TimeDelta::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[derive(Default)]
struct FakeSupervisor {
    states: Mutex<HashMap<String, String>>,
    restarts: AtomicUsize,
    recover_on_restart: bool,
}

impl FakeSupervisor {
    fn with(states: &[(&str, &str)], recover_on_restart: bool) -> Self {
        Self {
            states: Mutex::new(states.iter().map(|(u, s)| ((*u).to_string(), (*s).to_string())).collect()),
            restarts: AtomicUsize::new(0),
            recover_on_restart,
        }
    }
}

#[async_trait]
impl ProcessSupervisor for FakeSupervisor {
    async fn is_active(&self, unit: &str) -> Result<String, SupervisorError> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(unit)
            .cloned()
            .unwrap_or_else(|| "active".to_string()))
    }

    async fn restart(&self, action: &RestartAction) -> Result<(), SupervisorError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        if self.recover_on_restart {
            self.states
                .lock()
                .unwrap()
                .insert(action.service().to_string(), "active".to_string());
        }
        Ok(())
    }

    async fn journal_tail(&self, _unit: &str, _lines: usize) -> Result<String, SupervisorError> {
        Ok("Main process exited, code=exited, status=1/FAILURE".to_string())
    }
}

/// Replies with queued status codes, then 200 forever.
#[derive(Default)]
struct ScriptedProbe(Mutex<VecDeque<u16>>);

impl ScriptedProbe {
    fn queue(codes: impl IntoIterator<Item = u16>) -> Self {
        Self(Mutex::new(codes.into_iter().collect()))
    }
}

#[async_trait]
impl EndpointProbe for ScriptedProbe {
    async fn get(&self, _url: &str) -> Result<ProbeResponse, ProbeError> {
        let status = self.0.lock().unwrap().pop_front().unwrap_or(200);
        Ok(ProbeResponse {
            status,
            body: if status == 200 { "ok".into() } else { "Internal Server Error".into() },
        })
    }
}

struct FakeSampler {
    ram: Mutex<f64>,
    disk: Mutex<f64>,
    panic_on_memory: bool,
}

impl Default for FakeSampler {
    fn default() -> Self {
        Self {
            ram: Mutex::new(40.0),
            disk: Mutex::new(50.0),
            panic_on_memory: false,
        }
    }
}

impl ResourceSampler for FakeSampler {
    fn memory_percent(&self) -> Result<f64, SampleError> {
        assert!(!self.panic_on_memory, "meminfo exploded");
        Ok(*self.ram.lock().unwrap())
    }

    fn cpu_percent(&self) -> Result<f64, SampleError> {
        Ok(10.0)
    }

    fn disk_percent(&self, _path: &str) -> Result<f64, SampleError> {
        Ok(*self.disk.lock().unwrap())
    }

    fn file_size_mb(&self, _path: &str) -> f64 {
        0.0
    }
}

struct FixedBilling(BillingResult);

#[async_trait]
impl BillingSource for FixedBilling {
    fn name(&self) -> &str {
        &self.0.provider
    }

    async fn fetch(&self) -> BillingResult {
        self.0.clone()
    }
}

#[derive(Default)]
struct RecordingChannel(Mutex<Vec<String>>);

impl RecordingChannel {
    fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, needle: &str) -> usize {
        self.messages().iter().filter(|m| m.contains(needle)).count()
    }
}

#[async_trait]
impl AlertChannel for RecordingChannel {
    async fn send(&self, text: &str) -> Result<(), AlertError> {
        self.0.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    watchdog: Watchdog,
    clock: Arc<ManualClock>,
    supervisor: Arc<FakeSupervisor>,
    sampler: Arc<FakeSampler>,
    channel: Arc<RecordingChannel>,
}

impl Harness {
    async fn tick_every(&mut self, secs: i64, ticks: usize) {
        for _ in 0..ticks {
            self.watchdog.tick().await;
            self.clock.advance(secs);
        }
    }
}

fn test_config() -> WatchdogConfig {
    let mut config = WatchdogConfig::default();
    config.services.units = vec!["api".to_string()];
    config.health.endpoints = BTreeMap::from([("prod".to_string(), "http://prod.local/health".to_string())]);
    config.resources.databases = Vec::new();
    config.billing.providers = Vec::new();
    config.remediation.verify_delay_secs = 0;
    config.remediation.allowed_commands = vec!["systemctl restart api".to_string()];
    config.alerts.journal_lines = 0;
    config.cleanup.on_disk_critical = false;
    config
}

fn harness_with(
    config: WatchdogConfig,
    supervisor: FakeSupervisor,
    probe: ScriptedProbe,
    sampler: FakeSampler,
    billing: Vec<Box<dyn BillingSource>>,
) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let supervisor = Arc::new(supervisor);
    let sampler = Arc::new(sampler);
    let channel = Arc::new(RecordingChannel::default());

    let parts = WatchdogParts {
        supervisor: supervisor.clone(),
        probe: Arc::new(probe),
        sampler: sampler.clone(),
        billing,
        channel: channel.clone(),
        store: Arc::new(InMemoryStore::new()),
        clock: clock.clone(),
    };
    Harness {
        watchdog: Watchdog::new(config, parts),
        clock,
        supervisor,
        sampler,
        channel,
    }
}

fn harness(supervisor: FakeSupervisor, probe: ScriptedProbe) -> Harness {
    harness_with(test_config(), supervisor, probe, FakeSampler::default(), Vec::new())
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn failing_service_is_restarted_three_times_then_left_alone() {
    let mut h = harness(FakeSupervisor::with(&[("api", "failed")], false), ScriptedProbe::default());

    // Four service checks inside five minutes
    h.tick_every(60, 4).await;

    assert_eq!(h.supervisor.restarts.load(Ordering::SeqCst), 3);
    assert_eq!(h.watchdog.stats().restarts_attempted, 3);
    assert_eq!(h.channel.count("RESTART BUDGET EXHAUSTED"), 1);
    // The failure alert itself is only sent once inside the cooldown
    assert_eq!(h.channel.count("WATCHDOG ALERT"), 1);
    assert_eq!(
        h.watchdog.status_report().services["api"],
        ServiceState::PersistentlyUnhealthy
    );
}

#[tokio::test]
async fn ram_escalation_alerts_once_per_level() {
    let mut h = harness(FakeSupervisor::default(), ScriptedProbe::default());
    let t0 = h.clock.now();

    for ram in [70.0, 82.0, 91.0, 83.0] {
        *h.sampler.ram.lock().unwrap() = ram;
        h.tick_every(300, 1).await;
    }

    assert_eq!(h.channel.count("RESOURCE WARNING"), 1);
    assert_eq!(h.channel.count("RESOURCE CRITICAL"), 1);
    let history = h.watchdog.dispatcher().history();
    assert_eq!(history.last_sent("ram:warning"), Some(t0 + TimeDelta::seconds(300)));
    assert_eq!(history.last_sent("ram:critical"), Some(t0 + TimeDelta::seconds(600)));
}

#[tokio::test]
async fn single_health_failure_alerts_once_without_recovery_wording() {
    let codes = std::iter::repeat(200).take(10).chain([500]);
    let mut h = harness(FakeSupervisor::default(), ScriptedProbe::queue(codes));

    h.tick_every(60, 12).await;

    let messages = h.channel.messages();
    assert_eq!(h.channel.count("HEALTH CHECK FAILED"), 1);
    assert!(messages.iter().all(|m| !m.to_lowercase().contains("recover")));
    assert!(messages.iter().any(|m| m.contains("Status: 500")));
}

#[tokio::test]
async fn billing_not_configured_and_query_failed_are_handled_differently() {
    let not_configured = BillingResult::not_configured("openai", "USD");
    let failed = BillingResult::query_failed("timeweb", "RUB", "Server returned status 503");
    assert!(!not_configured.success && !failed.success);
    assert_ne!(not_configured.status, failed.status);
    assert_ne!(not_configured.message, failed.message);

    let billing: Vec<Box<dyn BillingSource>> = vec![
        Box::new(FixedBilling(not_configured)),
        Box::new(FixedBilling(failed)),
    ];
    let mut h = harness_with(
        test_config(),
        FakeSupervisor::default(),
        ScriptedProbe::default(),
        FakeSampler::default(),
        billing,
    );
    h.watchdog.tick().await;

    assert_eq!(h.channel.count("BILLING CHECK FAILED"), 1);
    assert_eq!(h.channel.count("timeweb"), 1);
    assert_eq!(h.channel.count("openai"), 0);
}

#[tokio::test]
async fn low_balance_alerts_with_severity_key() {
    let mut config = test_config();
    config.billing.providers = vec![BillingProviderConfig {
        name: "timeweb".to_string(),
        kind: ProviderKind::Timeweb,
        currency: "RUB".to_string(),
        token_env: "UNUSED".to_string(),
        api_url: None,
        warning: 500.0,
        critical: 100.0,
    }];
    let billing: Vec<Box<dyn BillingSource>> =
        vec![Box::new(FixedBilling(BillingResult::ok("timeweb", 250.0, "RUB")))];
    let mut h = harness_with(config, FakeSupervisor::default(), ScriptedProbe::default(), FakeSampler::default(), billing);

    h.watchdog.tick().await;

    assert_eq!(h.channel.count("BILLING WARNING"), 1);
    assert!(h.watchdog.dispatcher().history().last_sent("billing:timeweb:warning").is_some());
}

#[tokio::test]
async fn persistent_failure_realerts_after_cooldown() {
    let mut h = harness(FakeSupervisor::default(), ScriptedProbe::queue(std::iter::repeat(503).take(40)));

    // 0s .. 1860s: sent at 0 and again at exactly 30 minutes
    h.tick_every(60, 32).await;

    assert_eq!(h.channel.count("HEALTH CHECK FAILED"), 2);
}

#[tokio::test]
async fn unlisted_service_is_never_restarted() {
    let mut config = test_config();
    config.services.units = vec!["api".to_string(), "worker".to_string()];
    let mut h = harness_with(
        config,
        FakeSupervisor::with(&[("worker", "failed")], true),
        ScriptedProbe::default(),
        FakeSampler::default(),
        Vec::new(),
    );

    h.watchdog.tick().await;

    assert_eq!(h.supervisor.restarts.load(Ordering::SeqCst), 0);
    assert_eq!(h.channel.count("not allow-listed"), 1);
    assert_eq!(h.watchdog.stats().restarts_attempted, 0);
}

#[tokio::test]
async fn restarted_service_recovers() {
    let mut h = harness(FakeSupervisor::with(&[("api", "inactive")], true), ScriptedProbe::default());

    h.watchdog.tick().await;

    assert_eq!(h.channel.count("SERVICE RECOVERED"), 1);
    assert_eq!(h.watchdog.stats().restarts_attempted, 1);
    assert_eq!(h.watchdog.status_report().services["api"], ServiceState::Healthy);
}

#[tokio::test]
async fn panicking_check_does_not_stop_the_tick() {
    let sampler = FakeSampler {
        panic_on_memory: true,
        ..FakeSampler::default()
    };
    let mut h = harness_with(test_config(), FakeSupervisor::default(), ScriptedProbe::default(), sampler, Vec::new());

    let ran = h.watchdog.tick().await;

    assert_eq!(ran, CheckKind::ALL.to_vec());
    assert_eq!(h.watchdog.stats().total_checks, 5);
    assert!(h.watchdog.schedule().last_run(CheckKind::Disk).is_some());
    assert!(h.watchdog.schedule().last_run(CheckKind::Billing).is_some());
}

#[tokio::test]
async fn only_due_kinds_run_and_snapshot_is_published() {
    let mut h = harness(FakeSupervisor::default(), ScriptedProbe::default());

    assert_eq!(h.watchdog.tick().await.len(), 5);
    h.clock.advance(10);
    assert!(h.watchdog.tick().await.is_empty());
    h.clock.advance(50);
    assert_eq!(h.watchdog.tick().await, vec![CheckKind::Services, CheckKind::Health]);

    let status = h.watchdog.status_handle();
    let snapshot = status.read().await;
    assert_eq!(snapshot.total_checks, 7);
    assert_eq!(snapshot.uptime_seconds, 60);
    assert!(snapshot.last_checks.values().all(Option::is_some));
}

#[tokio::test]
async fn critical_disk_runs_cleanup_before_alerting() {
    let dir = tempfile::tempdir().unwrap();
    let cache = dir.path().join("cache");
    std::fs::create_dir_all(&cache).unwrap();
    std::fs::write(cache.join("blob.bin"), vec![0u8; 2048]).unwrap();

    let mut config = test_config();
    config.cleanup.on_disk_critical = true;
    config.cleanup.sweep_paths = vec![cache.clone()];
    config.cleanup.cache_roots = Vec::new();
    config.cleanup.aged = Vec::new();
    let sampler = FakeSampler::default();
    *sampler.disk.lock().unwrap() = 95.0;

    let mut h = harness_with(config, FakeSupervisor::default(), ScriptedProbe::default(), sampler, Vec::new());
    h.watchdog.tick().await;

    assert!(!cache.join("blob.bin").exists());
    assert_eq!(h.channel.count("RESOURCE CRITICAL"), 1);
    assert_eq!(h.channel.count("Cleanup: 1 items"), 1);
}

#[tokio::test]
async fn run_sends_startup_notice_and_stops_on_cancel() {
    let mut h = harness(FakeSupervisor::default(), ScriptedProbe::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    h.watchdog.run(cancel).await;

    let messages = h.channel.messages();
    assert!(messages[0].contains("WATCHDOG STARTED"));
    assert_eq!(h.watchdog.stats().alerts_sent, 1);
    // The in-flight tick still completed
    assert_eq!(h.watchdog.stats().total_checks, 5);
}
