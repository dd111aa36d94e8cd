//! Watchdog Configuration - every interval, threshold and remediation limit as TOML
//!
//! Each struct implements `Default` with the values of the stock deployment,
//! so running without a config file reproduces the production behavior.
//! Secrets are never stored here: only the names of the environment
//! variables that carry them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::types::{CheckKind, Severity};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "WATCHKEEPER_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "watchkeeper.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `WatchdogConfig::load()` which searches:
/// 1. `$WATCHKEEPER_CONFIG` env var
/// 2. `./watchkeeper.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Outbound alert channel and deduplication
    #[serde(default)]
    pub alerts: AlertsConfig,

    /// Per-kind check intervals
    #[serde(default)]
    pub intervals: IntervalsConfig,

    /// Supervised units
    #[serde(default)]
    pub services: ServicesConfig,

    /// HTTP health endpoints
    #[serde(default)]
    pub health: HealthConfig,

    /// Resource warning / critical levels
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// What the resource sampler looks at
    #[serde(default)]
    pub resources: ResourcesConfig,

    /// Account balance providers
    #[serde(default)]
    pub billing: BillingConfig,

    /// Restart budget and allow-list
    #[serde(default)]
    pub remediation: RemediationConfig,

    /// Disk-critical cleanup targets
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Optional durable history
    #[serde(default)]
    pub storage: StorageConfig,

    /// Optional status endpoint
    #[serde(default)]
    pub server: ServerConfig,
}

impl WatchdogConfig {
    /// Load configuration using the standard search order:
    /// 1. `$WATCHKEEPER_CONFIG` environment variable
    /// 2. `./watchkeeper.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), services = config.services.units.len(), "Loaded config from {CONFIG_ENV}");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {CONFIG_ENV}, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV} points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(services = config.services.units.len(), "Loaded config from ./{LOCAL_CONFIG_FILE}");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        info!("No {LOCAL_CONFIG_FILE} found, using built-in defaults");
        Self::default()
    }

    /// The file `load()` would read, if any.
    pub fn search_path() -> Option<PathBuf> {
        std::env::var(CONFIG_ENV)
            .ok()
            .map(PathBuf::from)
            .filter(|p| p.exists())
            .or_else(|| Some(PathBuf::from(LOCAL_CONFIG_FILE)).filter(|p| p.exists()))
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document. Unknown keys only warn.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;

        let (_, range_warnings) = super::validation::validate_ranges(&config);
        for w in range_warnings {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Write the config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Validate for internal consistency, collecting every problem.
    ///
    /// Rules:
    /// - Utilization critical levels must be >= warning levels
    /// - Billing critical balances must be <= warning balances
    /// - Every interval and the tick must be > 0
    /// - The restart budget and its window must be > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let t = &self.thresholds;

        Self::check_escalation(t.ram_warning, t.ram_critical, "thresholds.ram", &mut errors);
        Self::check_escalation(t.cpu_warning, t.cpu_critical, "thresholds.cpu", &mut errors);
        Self::check_escalation(t.disk_warning, t.disk_critical, "thresholds.disk", &mut errors);
        if !t.db_max_mb.is_finite() || t.db_max_mb <= 0.0 {
            errors.push(format!("thresholds.db_max_mb ({}) must be > 0", t.db_max_mb));
        }

        let iv = &self.intervals;
        if iv.tick_secs == 0 {
            errors.push("intervals.tick_secs must be > 0".to_string());
        }
        for kind in CheckKind::ALL {
            if iv.for_kind(kind).is_zero() {
                errors.push(format!("intervals.{}_secs must be > 0", kind.as_str()));
            }
        }

        let r = &self.remediation;
        if r.max_restarts == 0 {
            errors.push("remediation.max_restarts must be > 0".to_string());
        }
        if r.cooldown_minutes == 0 {
            errors.push("remediation.cooldown_minutes must be > 0".to_string());
        }

        for p in &self.billing.providers {
            if !p.warning.is_finite() || !p.critical.is_finite() {
                errors.push(format!(
                    "billing.{}: values must be finite (got warning={}, critical={})",
                    p.name, p.warning, p.critical
                ));
            } else if p.critical > p.warning {
                errors.push(format!(
                    "billing.{}: critical ({:.2}) must be <= warning ({:.2})",
                    p.name, p.critical, p.warning
                ));
            }
        }

        let (range_errors, _) = super::validation::validate_ranges(self);
        errors.extend(range_errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_escalation(warning: f64, critical: f64, name: &str, errors: &mut Vec<String>) {
        // NaN comparisons are always false
        if !warning.is_finite() || !critical.is_finite() {
            errors.push(format!(
                "{name}: values must be finite (got warning={warning}, critical={critical})"
            ));
            return;
        }
        if critical < warning {
            errors.push(format!(
                "{name}: critical ({critical:.1}) must be >= warning ({warning:.1})"
            ));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation failed:\n{}", format_validation(.0))]
    Validation(Vec<String>),
}

fn format_validation(errors: &[String]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read a non-empty secret from the named environment variable.
fn env_secret(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Recipient chat
    #[serde(default = "default_chat_id")]
    pub chat_id: i64,

    /// Environment variable holding the bot token
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    /// Minimum minutes between two alerts with the same key
    #[serde(default = "default_alert_cooldown")]
    pub cooldown_minutes: u64,

    /// Bot API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,

    /// Journal lines attached to failed-restart alerts (0 disables)
    #[serde(default = "default_journal_lines")]
    pub journal_lines: usize,
}

fn default_chat_id() -> i64 {
    defaults::ALERT_CHAT_ID
}

fn default_bot_token_env() -> String {
    defaults::BOT_TOKEN_ENV.to_string()
}

fn default_alert_cooldown() -> u64 {
    defaults::ALERT_COOLDOWN_MINUTES
}

fn default_api_base() -> String {
    defaults::TELEGRAM_API_BASE.to_string()
}

fn default_send_timeout() -> u64 {
    defaults::ALERT_SEND_TIMEOUT_SECS
}

fn default_journal_lines() -> usize {
    defaults::JOURNAL_LINES
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            chat_id: default_chat_id(),
            bot_token_env: default_bot_token_env(),
            cooldown_minutes: default_alert_cooldown(),
            api_base: default_api_base(),
            send_timeout_secs: default_send_timeout(),
            journal_lines: default_journal_lines(),
        }
    }
}

impl AlertsConfig {
    pub fn bot_token(&self) -> Option<String> {
        env_secret(&self.bot_token_env)
    }

    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_minutes.saturating_mul(60))
    }
}

// ============================================================================
// Intervals
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalsConfig {
    /// Coordinator cadence
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
    #[serde(default = "default_services_interval")]
    pub services_secs: u64,
    #[serde(default = "default_health_interval")]
    pub health_secs: u64,
    #[serde(default = "default_resources_interval")]
    pub resources_secs: u64,
    #[serde(default = "default_disk_interval")]
    pub disk_secs: u64,
    #[serde(default = "default_billing_interval")]
    pub billing_secs: u64,
}

fn default_tick() -> u64 {
    defaults::TICK_SECS
}

fn default_services_interval() -> u64 {
    defaults::SERVICES_INTERVAL_SECS
}

fn default_health_interval() -> u64 {
    defaults::HEALTH_INTERVAL_SECS
}

fn default_resources_interval() -> u64 {
    defaults::RESOURCES_INTERVAL_SECS
}

fn default_disk_interval() -> u64 {
    defaults::DISK_INTERVAL_SECS
}

fn default_billing_interval() -> u64 {
    defaults::BILLING_INTERVAL_SECS
}

impl Default for IntervalsConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick(),
            services_secs: default_services_interval(),
            health_secs: default_health_interval(),
            resources_secs: default_resources_interval(),
            disk_secs: default_disk_interval(),
            billing_secs: default_billing_interval(),
        }
    }
}

impl IntervalsConfig {
    pub const fn for_kind(&self, kind: CheckKind) -> Duration {
        let secs = match kind {
            CheckKind::Services => self.services_secs,
            CheckKind::Health => self.health_secs,
            CheckKind::Resources => self.resources_secs,
            CheckKind::Disk => self.disk_secs,
            CheckKind::Billing => self.billing_secs,
        };
        Duration::from_secs(secs)
    }

    pub const fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

// ============================================================================
// Services
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Unit names passed to the process supervisor
    #[serde(default = "default_units")]
    pub units: Vec<String>,

    /// Timeout for one liveness query
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,
}

fn default_units() -> Vec<String> {
    defaults::SERVICES.iter().map(ToString::to_string).collect()
}

fn default_status_timeout() -> u64 {
    defaults::STATUS_TIMEOUT_SECS
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            units: default_units(),
            status_timeout_secs: default_status_timeout(),
        }
    }
}

// ============================================================================
// Health Endpoints
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Endpoint name -> URL
    #[serde(default = "default_endpoints")]
    pub endpoints: BTreeMap<String, String>,

    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,

    /// Body characters kept in the result
    #[serde(default = "default_preview_chars")]
    pub body_preview_chars: usize,
}

fn default_endpoints() -> BTreeMap<String, String> {
    defaults::HEALTH_ENDPOINTS
        .iter()
        .map(|(name, url)| ((*name).to_string(), (*url).to_string()))
        .collect()
}

fn default_health_timeout() -> u64 {
    defaults::HEALTH_TIMEOUT_SECS
}

fn default_preview_chars() -> usize {
    defaults::HEALTH_BODY_PREVIEW_CHARS
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            timeout_secs: default_health_timeout(),
            body_preview_chars: default_preview_chars(),
        }
    }
}

// ============================================================================
// Thresholds
// ============================================================================

/// Utilization levels in percent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_ram_warning")]
    pub ram_warning: f64,
    #[serde(default = "default_ram_critical")]
    pub ram_critical: f64,
    #[serde(default = "default_cpu_warning")]
    pub cpu_warning: f64,
    #[serde(default = "default_cpu_critical")]
    pub cpu_critical: f64,
    #[serde(default = "default_disk_warning")]
    pub disk_warning: f64,
    #[serde(default = "default_disk_critical")]
    pub disk_critical: f64,
    /// Database file size limit in MB
    #[serde(default = "default_db_max_mb")]
    pub db_max_mb: f64,
}

fn default_ram_warning() -> f64 {
    defaults::RAM_WARNING
}

fn default_ram_critical() -> f64 {
    defaults::RAM_CRITICAL
}

fn default_cpu_warning() -> f64 {
    defaults::CPU_WARNING
}

fn default_cpu_critical() -> f64 {
    defaults::CPU_CRITICAL
}

fn default_disk_warning() -> f64 {
    defaults::DISK_WARNING
}

fn default_disk_critical() -> f64 {
    defaults::DISK_CRITICAL
}

fn default_db_max_mb() -> f64 {
    defaults::DB_MAX_MB
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            ram_warning: default_ram_warning(),
            ram_critical: default_ram_critical(),
            cpu_warning: default_cpu_warning(),
            cpu_critical: default_cpu_critical(),
            disk_warning: default_disk_warning(),
            disk_critical: default_disk_critical(),
            db_max_mb: default_db_max_mb(),
        }
    }
}

/// A warning / critical pair for a metric where higher is worse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub warning: f64,
    pub critical: f64,
}

impl Threshold {
    /// Severity band of `value`; `None` below warning.
    pub fn classify(&self, value: f64) -> Option<Severity> {
        if value >= self.critical {
            Some(Severity::Critical)
        } else if value >= self.warning {
            Some(Severity::Warning)
        } else {
            None
        }
    }

    /// The boundary that `severity` was crossed at.
    pub const fn bound(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Warning => self.warning,
            Severity::Critical => self.critical,
        }
    }
}

impl ThresholdConfig {
    pub const fn ram(&self) -> Threshold {
        Threshold { warning: self.ram_warning, critical: self.ram_critical }
    }

    pub const fn cpu(&self) -> Threshold {
        Threshold { warning: self.cpu_warning, critical: self.cpu_critical }
    }

    pub const fn disk(&self) -> Threshold {
        Threshold { warning: self.disk_warning, critical: self.disk_critical }
    }
}

// ============================================================================
// Resources
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Database files whose size is sampled
    #[serde(default = "default_databases")]
    pub databases: Vec<String>,

    /// Mount point measured for disk usage
    #[serde(default = "default_disk_path")]
    pub disk_path: String,
}

fn default_databases() -> Vec<String> {
    defaults::DATABASES.iter().map(ToString::to_string).collect()
}

fn default_disk_path() -> String {
    "/".to_string()
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            databases: default_databases(),
            disk_path: default_disk_path(),
        }
    }
}

// ============================================================================
// Billing
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Cloud hosting account with a finances API
    Timeweb,
    /// Prepaid account without a balance API
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub currency: String,
    /// Environment variable holding the API token
    pub token_env: String,
    /// Overrides the provider's default endpoint
    #[serde(default)]
    pub api_url: Option<String>,
    /// Balance at or below which a warning is raised
    pub warning: f64,
    /// Balance at or below which a critical alert is raised
    pub critical: f64,
}

impl BillingProviderConfig {
    pub fn token(&self) -> Option<String> {
        env_secret(&self.token_env)
    }

    /// Severity band of a balance; lower balances are worse.
    pub fn classify(&self, balance: f64) -> Option<Severity> {
        if balance <= self.critical {
            Some(Severity::Critical)
        } else if balance <= self.warning {
            Some(Severity::Warning)
        } else {
            None
        }
    }

    pub const fn bound(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Warning => self.warning,
            Severity::Critical => self.critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_billing_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_providers")]
    pub providers: Vec<BillingProviderConfig>,
}

fn default_billing_timeout() -> u64 {
    defaults::BILLING_TIMEOUT_SECS
}

fn default_providers() -> Vec<BillingProviderConfig> {
    vec![
        BillingProviderConfig {
            name: "openai".to_string(),
            kind: ProviderKind::Openai,
            currency: "USD".to_string(),
            token_env: defaults::OPENAI_TOKEN_ENV.to_string(),
            api_url: None,
            warning: 10.0,
            critical: 3.0,
        },
        BillingProviderConfig {
            name: "timeweb".to_string(),
            kind: ProviderKind::Timeweb,
            currency: "RUB".to_string(),
            token_env: defaults::TIMEWEB_TOKEN_ENV.to_string(),
            api_url: None,
            warning: 500.0,
            critical: 100.0,
        },
    ]
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_billing_timeout(),
            providers: default_providers(),
        }
    }
}

// ============================================================================
// Remediation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationConfig {
    /// Attempt restarts for inactive units
    #[serde(default = "default_true")]
    pub restart_on_failure: bool,

    /// Attempts allowed within the window
    #[serde(default = "default_max_restarts")]
    pub max_restarts: usize,

    /// Window length in minutes
    #[serde(default = "default_restart_window")]
    pub cooldown_minutes: u64,

    /// Pause before re-checking liveness after a restart
    #[serde(default = "default_verify_delay")]
    pub verify_delay_secs: u64,

    #[serde(default = "default_restart_timeout")]
    pub restart_timeout_secs: u64,

    /// Exact commands a restart may render to
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_restarts() -> usize {
    defaults::MAX_RESTARTS
}

fn default_restart_window() -> u64 {
    defaults::RESTART_WINDOW_MINUTES
}

fn default_verify_delay() -> u64 {
    defaults::VERIFY_DELAY_SECS
}

fn default_restart_timeout() -> u64 {
    defaults::RESTART_TIMEOUT_SECS
}

fn default_allowed_commands() -> Vec<String> {
    defaults::SERVICES
        .iter()
        .map(|s| format!("systemctl restart {s}"))
        .collect()
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            restart_on_failure: true,
            max_restarts: default_max_restarts(),
            cooldown_minutes: default_restart_window(),
            verify_delay_secs: default_verify_delay(),
            restart_timeout_secs: default_restart_timeout(),
            allowed_commands: default_allowed_commands(),
        }
    }
}

impl RemediationConfig {
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.cooldown_minutes.saturating_mul(60))
    }

    pub const fn verify_delay(&self) -> Duration {
        Duration::from_secs(self.verify_delay_secs)
    }
}

// ============================================================================
// Cleanup
// ============================================================================

/// Directory where only files older than `max_age_days` are removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgedPath {
    pub path: PathBuf,
    pub max_age_days: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Run cleanup when disk usage crosses the critical level
    #[serde(default = "default_true")]
    pub on_disk_critical: bool,

    /// Directories whose direct children are removed
    #[serde(default = "default_sweep_paths")]
    pub sweep_paths: Vec<PathBuf>,

    /// Roots searched recursively for cache directories
    #[serde(default = "default_cache_roots")]
    pub cache_roots: Vec<PathBuf>,

    #[serde(default = "default_cache_dir_names")]
    pub cache_dir_names: Vec<String>,

    #[serde(default = "default_aged")]
    pub aged: Vec<AgedPath>,
}

fn default_sweep_paths() -> Vec<PathBuf> {
    defaults::SWEEP_PATHS.iter().map(PathBuf::from).collect()
}

fn default_cache_roots() -> Vec<PathBuf> {
    defaults::CACHE_ROOTS.iter().map(PathBuf::from).collect()
}

fn default_cache_dir_names() -> Vec<String> {
    defaults::CACHE_DIR_NAMES.iter().map(ToString::to_string).collect()
}

fn default_aged() -> Vec<AgedPath> {
    defaults::AGED_PATHS
        .iter()
        .map(|(path, days)| AgedPath { path: PathBuf::from(path), max_age_days: *days })
        .collect()
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            on_disk_critical: true,
            sweep_paths: default_sweep_paths(),
            cache_roots: default_cache_roots(),
            cache_dir_names: default_cache_dir_names(),
            aged: default_aged(),
        }
    }
}

// ============================================================================
// Storage / Server
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled directory for alert and restart history. In-memory when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for `/status`. Disabled when unset.
    ///
    /// Can be overridden by the `--status-addr` CLI flag.
    #[serde(default)]
    pub addr: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_deployment() {
        let c = WatchdogConfig::default();
        assert_eq!(c.services.units.len(), 5);
        assert_eq!(c.alerts.cooldown_minutes, 30);
        assert_eq!(c.remediation.max_restarts, 3);
        assert_eq!(c.remediation.cooldown_minutes, 5);
        assert_eq!(c.intervals.for_kind(CheckKind::Billing), Duration::from_secs(21_600));
        assert_eq!(
            c.remediation.allowed_commands[0],
            "systemctl restart rizalta-bot"
        );
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = WatchdogConfig::from_toml_str(
            r#"
[thresholds]
ram_warning = 70.0

[services]
units = ["api"]
"#,
        )
        .unwrap();
        assert!((c.thresholds.ram_warning - 70.0).abs() < f64::EPSILON);
        assert!((c.thresholds.ram_critical - 90.0).abs() < f64::EPSILON);
        assert_eq!(c.services.units, vec!["api".to_string()]);
        assert_eq!(c.intervals.tick_secs, 10);
    }

    #[test]
    fn inverted_escalation_is_rejected() {
        let mut c = WatchdogConfig::default();
        c.thresholds.cpu_warning = 96.0;
        c.thresholds.cpu_critical = 95.0;
        match c.validate() {
            Err(ConfigError::Validation(errs)) => {
                assert!(errs.iter().any(|e| e.contains("thresholds.cpu")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn billing_critical_above_warning_is_rejected() {
        let mut c = WatchdogConfig::default();
        c.billing.providers[1].critical = 600.0;
        assert!(matches!(c.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn zero_interval_and_budget_collect_multiple_errors() {
        let mut c = WatchdogConfig::default();
        c.intervals.disk_secs = 0;
        c.remediation.max_restarts = 0;
        match c.validate() {
            Err(ConfigError::Validation(errs)) => {
                assert!(errs.iter().any(|e| e.contains("intervals.disk_secs")));
                assert!(errs.iter().any(|e| e.contains("max_restarts")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn threshold_classification_is_inclusive() {
        let t = ThresholdConfig::default().ram();
        assert_eq!(t.classify(79.9), None);
        assert_eq!(t.classify(80.0), Some(Severity::Warning));
        assert_eq!(t.classify(90.0), Some(Severity::Critical));
    }

    #[test]
    fn billing_classification_lower_is_worse() {
        let p = &BillingConfig::default().providers[1];
        assert_eq!(p.classify(1_000.0), None);
        assert_eq!(p.classify(500.0), Some(Severity::Warning));
        assert_eq!(p.classify(50.0), Some(Severity::Critical));
    }

    #[test]
    fn toml_round_trip_preserves_providers() {
        let c = WatchdogConfig::default();
        let s = c.to_toml().unwrap();
        let back = WatchdogConfig::from_toml_str(&s).unwrap();
        assert_eq!(back.billing.providers.len(), 2);
        assert_eq!(back.billing.providers[0].kind, ProviderKind::Openai);
    }

    #[test]
    fn save_and_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchkeeper.toml");
        WatchdogConfig::default().save_to_file(&path).unwrap();
        let loaded = WatchdogConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.alerts.chat_id, defaults::ALERT_CHAT_ID);
    }

    #[test]
    fn huge_minute_counts_saturate() {
        let c = WatchdogConfig::from_toml_str(
            "[alerts]\ncooldown_minutes = 9223372036854775807\n\n[remediation]\ncooldown_minutes = 9223372036854775807\n",
        )
        .unwrap();
        assert_eq!(c.alerts.cooldown(), Duration::from_secs(u64::MAX));
        assert_eq!(c.remediation.window(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn parse_error_carries_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[alerts\nchat_id = ").unwrap();
        match WatchdogConfig::load_from_file(&path) {
            Err(ConfigError::Parse(p, _)) => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
