//! HTML alert bodies for the chat channel
//!
//! Every dynamic value goes through `escape` because the channel parses
//! the text as HTML and rejects malformed markup.

use chrono::{DateTime, Utc};

use crate::remediation::CleanupReport;
use crate::types::{BillingResult, HealthResult, ResourceSnapshot, ServiceStatus, Severity};

/// Characters of a health response shown in an alert.
const HEALTH_ALERT_PREVIEW: usize = 100;

/// Escape `<`, `>` and `&` for HTML parse mode.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

fn clock(now: DateTime<Utc>) -> String {
    now.format("%H:%M:%S UTC").to_string()
}

fn header(emoji: &str, title: &str, now: DateTime<Utc>) -> String {
    format!("{emoji} <b>{title}</b>\n\n⏰ {}\n", clock(now))
}

// ============================================================================
// Services
// ============================================================================

/// Service down, with what the watchdog did about it.
pub fn service_alert(service: &str, status: &str, action: Option<&str>, now: DateTime<Utc>) -> String {
    let mut msg = header("🚨", "WATCHDOG ALERT", now);
    msg.push_str(&format!("🔧 Service: <code>{}</code>\n", escape(service)));
    msg.push_str(&format!("❌ Status: {}\n", escape(status)));
    if let Some(action) = action {
        msg.push_str(&format!("⚡ Action: {}\n", escape(action)));
    }
    msg
}

/// Failed restart, optionally with the unit's recent journal.
pub fn restart_failed(
    service: &str,
    status: &str,
    reason: &str,
    journal: Option<&str>,
    now: DateTime<Utc>,
) -> String {
    let mut msg = service_alert(service, status, Some(format!("restart failed: {reason}").as_str()), now);
    if let Some(journal) = journal.filter(|j| !j.trim().is_empty()) {
        msg.push_str(&format!("\n📜 Journal:\n<pre>{}</pre>\n", escape(journal)));
    }
    msg
}

pub fn restart_rejected(service: &str, command: &str, now: DateTime<Utc>) -> String {
    service_alert(
        service,
        "inactive",
        Some(format!("restart rejected, '{command}' is not allow-listed").as_str()),
        now,
    )
}

pub fn budget_exhausted(service: &str, attempts: usize, window_minutes: u64, now: DateTime<Utc>) -> String {
    let mut msg = header("🛑", "RESTART BUDGET EXHAUSTED", now);
    msg.push_str(&format!("🔧 Service: <code>{}</code>\n", escape(service)));
    msg.push_str(&format!(
        "🔄 {attempts} restarts in the last {window_minutes} min, manual intervention required\n"
    ));
    msg
}

pub fn recovery(service: &str, attempts: usize, now: DateTime<Utc>) -> String {
    let mut msg = header("✅", "SERVICE RECOVERED", now);
    msg.push_str(&format!("🔧 Service: <code>{}</code>\n", escape(service)));
    msg.push_str(&format!("🔄 Attempts: {attempts}\n"));
    msg
}

// ============================================================================
// Health / Resources / Billing
// ============================================================================

pub fn health_alert(result: &HealthResult, now: DateTime<Utc>) -> String {
    let preview: String = result.message.chars().take(HEALTH_ALERT_PREVIEW).collect();
    let mut msg = header("🚨", "HEALTH CHECK FAILED", now);
    msg.push_str(&format!("🌐 Endpoint: <code>{}</code>\n", escape(&result.name)));
    msg.push_str(&format!("🔗 URL: {}\n", escape(&result.url)));
    msg.push_str(&format!("📊 Status: {}\n", result.status_code));
    msg.push_str(&format!("💬 {}\n", escape(&preview)));
    msg
}

pub fn resource_alert(
    resource: &str,
    value: f64,
    threshold: f64,
    severity: Severity,
    now: DateTime<Utc>,
) -> String {
    let title = format!("RESOURCE {}", severity.as_str().to_uppercase());
    let mut msg = header(severity.emoji(), &title, now);
    msg.push_str(&format!("📊 {resource}: <b>{value:.1}%</b>\n"));
    msg.push_str(&format!("🎯 Threshold: {threshold}%\n"));
    msg
}

/// Disk alert; includes what the automatic cleanup freed, if it ran.
pub fn disk_alert(
    value: f64,
    threshold: f64,
    severity: Severity,
    cleanup: Option<&CleanupReport>,
    now: DateTime<Utc>,
) -> String {
    let mut msg = resource_alert("Disk", value, threshold, severity, now);
    if let Some(report) = cleanup {
        msg.push_str(&format!(
            "🧹 Cleanup: {} items, {:.2} MB freed\n",
            report.items_deleted,
            report.mb_freed()
        ));
    }
    msg
}

pub fn db_oversize(path: &str, size_mb: f64, max_mb: f64, now: DateTime<Utc>) -> String {
    let mut msg = header("⚠️", "DATABASE OVERSIZE", now);
    msg.push_str(&format!("🗄 <code>{}</code>: <b>{size_mb:.1} MB</b>\n", escape(path)));
    msg.push_str(&format!("🎯 Limit: {max_mb} MB\n"));
    msg
}

pub fn billing_alert(result: &BillingResult, threshold: f64, severity: Severity, now: DateTime<Utc>) -> String {
    let title = format!("BILLING {}", severity.as_str().to_uppercase());
    let mut msg = header(severity.emoji(), &title, now);
    msg.push_str(&format!(
        "💳 {}: <b>{:.2} {}</b>\n",
        escape(&result.provider),
        result.balance.unwrap_or_default(),
        escape(&result.currency)
    ));
    msg.push_str(&format!("🎯 Threshold: {threshold} {}\n", escape(&result.currency)));
    msg
}

pub fn billing_unavailable(result: &BillingResult, now: DateTime<Utc>) -> String {
    let mut msg = header("⚠️", "BILLING CHECK FAILED", now);
    msg.push_str(&format!("💳 {}\n", escape(&result.provider)));
    msg.push_str(&format!("💬 {}\n", escape(&result.message)));
    msg
}

// ============================================================================
// Reports
// ============================================================================

/// Full status digest sent by the `report` command.
pub fn status_report(
    services: &[ServiceStatus],
    resources: &ResourceSnapshot,
    billing: &[BillingResult],
    now: DateTime<Utc>,
) -> String {
    let mut msg = format!("📊 <b>WATCHDOG STATUS</b>\n⏰ {}\n\n", now.format("%d.%m.%Y %H:%M UTC"));

    msg.push_str("<b>Services:</b>\n");
    for s in services {
        let emoji = if s.active { "✅" } else { "❌" };
        msg.push_str(&format!("  {emoji} {}\n", escape(&s.name)));
    }

    msg.push_str("\n<b>Resources:</b>\n");
    msg.push_str(&format!("  💾 RAM: {:.0}%\n", resources.ram_percent));
    msg.push_str(&format!("  ⚡ CPU: {:.0}%\n", resources.cpu_percent));
    msg.push_str(&format!("  💿 Disk: {:.0}%\n", resources.disk_percent));

    msg.push_str("\n<b>Billing:</b>\n");
    for b in billing {
        match b.balance {
            Some(balance) if b.success => msg.push_str(&format!(
                "  💳 {}: {balance:.0} {}\n",
                escape(&b.provider),
                escape(&b.currency)
            )),
            _ => msg.push_str(&format!("  💳 {}: {}\n", escape(&b.provider), escape(&b.message))),
        }
    }
    msg
}

/// Sent once when the loop starts. `credentials` pairs a provider with
/// whether its token was found.
pub fn startup(
    services: &[String],
    endpoints: usize,
    credentials: &[(String, bool)],
    now: DateTime<Utc>,
) -> String {
    let mut msg = header("🟢", "WATCHDOG STARTED", now);
    msg.push_str(&format!("🔧 Services ({}):\n", services.len()));
    for s in services {
        msg.push_str(&format!("  • <code>{}</code>\n", escape(s)));
    }
    msg.push_str(&format!("🌐 Health endpoints: {endpoints}\n"));
    for (provider, configured) in credentials {
        let mark = if *configured { "✅" } else { "❌" };
        msg.push_str(&format!("🔑 {}: {mark}\n", escape(provider)));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_in_dynamic_values() {
        let msg = service_alert("a<b>", "x & y", None, Utc::now());
        assert!(msg.contains("a&lt;b&gt;"));
        assert!(msg.contains("x &amp; y"));
    }

    #[test]
    fn health_alert_truncates_body_and_never_mentions_recovery() {
        let result = HealthResult {
            name: "prod".to_string(),
            url: "http://localhost:8000/".to_string(),
            healthy: false,
            status_code: 500,
            message: "e".repeat(300),
        };
        let msg = health_alert(&result, Utc::now());
        assert!(msg.contains("Status: 500"));
        assert!(!msg.contains(&"e".repeat(101)));
        assert!(!msg.to_lowercase().contains("recover"));
    }

    #[test]
    fn resource_alert_names_severity() {
        let msg = resource_alert("RAM", 91.2, 90.0, Severity::Critical, Utc::now());
        assert!(msg.contains("RESOURCE CRITICAL"));
        assert!(msg.contains("91.2%"));
    }

    #[test]
    fn restart_failed_attaches_journal_only_when_present() {
        let now = Utc::now();
        assert!(restart_failed("api", "failed", "exit 1", Some("boom"), now).contains("<pre>boom</pre>"));
        assert!(!restart_failed("api", "failed", "exit 1", Some("  "), now).contains("<pre>"));
    }
}
