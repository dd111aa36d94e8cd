//! Built-in default values.
//!
//! These reproduce the production deployment so that running without a
//! config file behaves exactly like the stock install. Grouped by subsystem.

// ============================================================================
// Scheduling
// ============================================================================

/// Coordinator tick cadence (seconds). Bounds how late a due check can start.
pub const TICK_SECS: u64 = 10;

/// Service liveness interval (seconds).
pub const SERVICES_INTERVAL_SECS: u64 = 60;

/// HTTP health probe interval (seconds).
pub const HEALTH_INTERVAL_SECS: u64 = 60;

/// RAM / CPU / database size interval (seconds).
pub const RESOURCES_INTERVAL_SECS: u64 = 300;

/// Disk usage interval (seconds).
pub const DISK_INTERVAL_SECS: u64 = 3_600;

/// Billing balance interval (seconds). 21 600 = 6 hours.
pub const BILLING_INTERVAL_SECS: u64 = 21_600;

// ============================================================================
// Managed Services
// ============================================================================

/// Units supervised by default.
pub const SERVICES: &[&str] = &[
    "rizalta-bot",
    "rizalta-bot-dev",
    "rizalta-dev-api",
    "cloudflare-rizalta",
    "rizalta-dev-tunnel",
];

/// Default health endpoints as (name, url).
pub const HEALTH_ENDPOINTS: &[(&str, &str)] = &[
    ("prod", "http://localhost:8000/"),
    ("dev", "http://localhost:8002/"),
];

/// Timeout for `systemctl is-active` (seconds).
pub const STATUS_TIMEOUT_SECS: u64 = 10;

/// Timeout for `systemctl restart` (seconds).
pub const RESTART_TIMEOUT_SECS: u64 = 30;

/// Timeout for a single HTTP health GET (seconds).
pub const HEALTH_TIMEOUT_SECS: u64 = 10;

/// Characters of response body captured in a health result.
pub const HEALTH_BODY_PREVIEW_CHARS: usize = 200;

// ============================================================================
// Thresholds (percent)
// ============================================================================

pub const RAM_WARNING: f64 = 80.0;
pub const RAM_CRITICAL: f64 = 90.0;
pub const CPU_WARNING: f64 = 80.0;
pub const CPU_CRITICAL: f64 = 95.0;
pub const DISK_WARNING: f64 = 80.0;
pub const DISK_CRITICAL: f64 = 90.0;

/// Database file size above which an oversize alert is raised (MB).
pub const DB_MAX_MB: f64 = 500.0;

/// Embedded databases whose size is sampled.
pub const DATABASES: &[&str] = &[
    "/opt/bot/properties.db",
    "/opt/bot/secretary.db",
    "/opt/bot/monitoring.db",
    "/opt/bot-dev/properties.db",
    "/opt/bot-dev/secretary.db",
];

// ============================================================================
// Alerts
// ============================================================================

/// Minimum gap between two alerts with the same key (minutes).
pub const ALERT_COOLDOWN_MINUTES: u64 = 30;

/// Default alert recipient.
pub const ALERT_CHAT_ID: i64 = 512_319_063;

/// Environment variable holding the bot token.
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Timeout for one outbound alert POST (seconds).
pub const ALERT_SEND_TIMEOUT_SECS: u64 = 10;

/// Journal lines attached to a failed-restart alert.
pub const JOURNAL_LINES: usize = 10;

// ============================================================================
// Remediation
// ============================================================================

/// Restart attempts allowed per window.
pub const MAX_RESTARTS: usize = 3;

/// Restart-budget window (minutes).
pub const RESTART_WINDOW_MINUTES: u64 = 5;

/// Pause between a restart and the liveness re-check (seconds).
pub const VERIFY_DELAY_SECS: u64 = 2;

/// Restart records retained per service.
pub const RESTART_HISTORY_CAP: usize = 10;

// ============================================================================
// Cleanup
// ============================================================================

/// Directories whose direct children are removed on disk-critical.
pub const SWEEP_PATHS: &[&str] = &[
    "/opt/bot/services/__pycache__",
    "/opt/bot-dev/services/__pycache__",
];

/// Roots searched recursively for cache directories.
pub const CACHE_ROOTS: &[&str] = &["/opt/bot", "/opt/bot-dev"];

pub const CACHE_DIR_NAMES: &[&str] = &["__pycache__"];

/// Paths where only files older than the given age (days) are removed.
pub const AGED_PATHS: &[(&str, u64)] = &[("/tmp", 1)];

// ============================================================================
// Billing
// ============================================================================

pub const TIMEWEB_API_URL: &str = "https://api.timeweb.cloud/api/v1/account/finances";
pub const TIMEWEB_TOKEN_ENV: &str = "TIMEWEB_API_TOKEN";
pub const OPENAI_TOKEN_ENV: &str = "OPENAI_API_KEY";

/// Timeout for a billing API call (seconds).
pub const BILLING_TIMEOUT_SECS: u64 = 15;

// ============================================================================
// Storage / Server
// ============================================================================

/// Sled directory used when `[storage] path` is set without a value.
pub const STATE_DB_PATH: &str = "./data/watchkeeper_state.db";
