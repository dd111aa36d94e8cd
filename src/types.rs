//! Shared data structures for the watchdog
//!
//! Check adapters produce these results; the coordinator, alert dispatcher
//! and remediation engine consume them:
//! - `CheckKind`: the five independently scheduled probe families
//! - `ServiceStatus`, `HealthResult`, `ResourceSnapshot`, `BillingResult`:
//!   structured probe outcomes (errors are folded in, never raised)
//! - `RunStatistics`, `StatusReport`: operational counters and snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Check Kinds
// ============================================================================

/// A probe family with its own interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Services,
    Health,
    Resources,
    Disk,
    Billing,
}

impl CheckKind {
    /// Fixed execution order within a tick.
    pub const ALL: [Self; 5] = [
        Self::Services,
        Self::Health,
        Self::Resources,
        Self::Disk,
        Self::Billing,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Services => "services",
            Self::Health => "health",
            Self::Resources => "resources",
            Self::Disk => "disk",
            Self::Billing => "billing",
        }
    }
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Probe Results
// ============================================================================

/// Liveness of one supervised unit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    /// True only when the supervisor reported exactly `active`
    pub active: bool,
    /// Raw supervisor output, or the error text when the query failed
    pub raw_status: String,
}

/// Outcome of a single HTTP health probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResult {
    pub name: String,
    pub url: String,
    pub healthy: bool,
    /// HTTP status, or 0 when no response was received
    pub status_code: u16,
    /// Truncated response body or transport error
    pub message: String,
}

/// Point-in-time host resource usage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceSnapshot {
    pub ram_percent: f64,
    pub cpu_percent: f64,
    pub disk_percent: f64,
    /// Database file path -> size in MB (0 when missing)
    pub db_sizes_mb: BTreeMap<String, f64>,
}

/// Why a billing probe did or did not produce a balance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Ok,
    /// No credentials available, nothing was queried
    NotConfigured,
    /// Credentials present but the provider call failed
    QueryFailed,
    /// Provider has no balance API
    ManualCheck,
}

/// Account balance for one provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillingResult {
    pub provider: String,
    pub success: bool,
    pub balance: Option<f64>,
    pub currency: String,
    pub message: String,
    pub status: BillingStatus,
}

impl BillingResult {
    pub fn ok(provider: &str, balance: f64, currency: &str) -> Self {
        Self {
            provider: provider.to_string(),
            success: true,
            balance: Some(balance),
            currency: currency.to_string(),
            message: String::new(),
            status: BillingStatus::Ok,
        }
    }

    pub fn not_configured(provider: &str, currency: &str) -> Self {
        Self {
            provider: provider.to_string(),
            success: false,
            balance: None,
            currency: currency.to_string(),
            message: "not configured".to_string(),
            status: BillingStatus::NotConfigured,
        }
    }

    pub fn query_failed(provider: &str, currency: &str, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            success: false,
            balance: None,
            currency: currency.to_string(),
            message: message.into(),
            status: BillingStatus::QueryFailed,
        }
    }

    pub fn manual_check(provider: &str, currency: &str, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            success: false,
            balance: None,
            currency: currency.to_string(),
            message: message.into(),
            status: BillingStatus::ManualCheck,
        }
    }
}

// ============================================================================
// Severity
// ============================================================================

/// Alert severity. Part of the alert key, so each level deduplicates separately.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }

    pub const fn emoji(self) -> &'static str {
        match self {
            Self::Warning => "🟡",
            Self::Critical => "🔴",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Remediation State
// ============================================================================

/// Per-service remediation lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    #[default]
    Healthy,
    Unhealthy,
    RestartAttempted,
    /// Restart budget exhausted; waits for the window to roll over
    PersistentlyUnhealthy,
}

/// One restart attempt, successful or not.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestartRecord {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

// ============================================================================
// Statistics & Report
// ============================================================================

/// Process-lifetime counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunStatistics {
    pub started_at: DateTime<Utc>,
    pub total_checks: u64,
    pub alerts_sent: u64,
    pub restarts_attempted: u64,
}

impl RunStatistics {
    pub const fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            total_checks: 0,
            alerts_sent: 0,
            restarts_attempted: 0,
        }
    }
}

/// Operational snapshot published by the loop and served over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub total_checks: u64,
    pub alerts_sent: u64,
    pub restarts_attempted: u64,
    /// Last completion time per kind; `None` until the kind first runs
    pub last_checks: BTreeMap<CheckKind, Option<DateTime<Utc>>>,
    pub services: BTreeMap<String, ServiceState>,
    /// Most recent resource sample, if any
    pub resources: Option<ResourceSnapshot>,
}

impl StatusReport {
    /// Empty report for a watchdog that has not completed a tick yet.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            generated_at: now,
            started_at: now,
            uptime_seconds: 0,
            total_checks: 0,
            alerts_sent: 0,
            restarts_attempted: 0,
            last_checks: CheckKind::ALL.iter().map(|k| (*k, None)).collect(),
            services: BTreeMap::new(),
            resources: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_kinds_run_in_fixed_order() {
        let names: Vec<&str> = CheckKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, ["services", "health", "resources", "disk", "billing"]);
    }

    #[test]
    fn not_configured_and_query_failed_are_distinguishable() {
        let a = BillingResult::not_configured("timeweb", "RUB");
        let b = BillingResult::query_failed("timeweb", "RUB", "HTTP 503");
        assert!(!a.success && !b.success);
        assert_ne!(a.status, b.status);
        assert_ne!(a.message, b.message);
    }

    #[test]
    fn status_report_serializes_kinds_as_snake_case_keys() {
        let report = StatusReport::empty(Utc::now());
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["last_checks"]["services"].is_null());
        assert!(json["last_checks"].get("billing").is_some());
    }
}
