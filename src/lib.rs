//! watchkeeper: self-healing infrastructure watchdog
//!
//! Periodically checks supervised services, HTTP health endpoints, host
//! resources and third-party balances, then reacts with deduplicated alerts
//! and bounded remediation.
//!
//! ## Architecture
//!
//! - **Check adapters** (`checks`): side-effect-free probes behind traits
//! - **Scheduler** (`scheduler`): per-kind intervals on a fixed tick
//! - **Alert dispatcher** (`alerts`): cooldown keyed by alert identity
//! - **Remediation** (`remediation`): allow-listed, budgeted restarts and
//!   disk cleanup
//! - **Watchdog** (`watchdog`): the single loop that owns all state

pub mod alerts;
pub mod api;
pub mod checks;
pub mod config;
pub mod remediation;
pub mod scheduler;
pub mod storage;
pub mod types;
pub mod watchdog;

// Re-export configuration
pub use config::WatchdogConfig;

// Re-export commonly used types
pub use types::{
    BillingResult, BillingStatus, CheckKind, HealthResult, ResourceSnapshot, RunStatistics,
    ServiceState, ServiceStatus, Severity, StatusReport,
};

pub use alerts::{AlertChannel, AlertDispatcher, AlertOutcome};
pub use remediation::{CleanupReport, RemediationEngine, RemediationOutcome, RestartAction};
pub use scheduler::{CheckSchedule, Clock, SystemClock};
pub use storage::{InMemoryStore, SledStore, StateStore, StorageError};
pub use watchdog::{SharedStatus, Watchdog, WatchdogError, WatchdogParts};
