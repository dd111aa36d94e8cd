//! Alerting: outbound channel, cooldown dispatcher, message formats and
//! threshold escalation tracking.

pub mod channel;
pub mod dispatcher;
pub mod escalation;
pub mod format;

pub use channel::{AlertChannel, AlertError, TelegramChannel};
pub use dispatcher::{AlertDispatcher, AlertHistory, AlertOutcome};
pub use escalation::EscalationTracker;

/// Alert key builders. Severity is part of the key.
pub mod keys {
    use crate::types::Severity;

    pub fn service(name: &str) -> String {
        format!("service:{name}")
    }

    pub fn service_exhausted(name: &str) -> String {
        format!("service:{name}:exhausted")
    }

    pub fn recovery(name: &str) -> String {
        format!("recovery:{name}")
    }

    pub fn health(name: &str) -> String {
        format!("health:{name}")
    }

    pub fn resource(metric: &str, severity: Severity) -> String {
        format!("{metric}:{}", severity.as_str())
    }

    pub fn db_oversize(path: &str) -> String {
        format!("db:{path}:oversize")
    }

    pub fn billing(provider: &str, severity: Severity) -> String {
        format!("billing:{provider}:{}", severity.as_str())
    }

    pub fn billing_unavailable(provider: &str) -> String {
        format!("billing:{provider}:unavailable")
    }
}
