//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::WatchdogConfig;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `WatchdogConfig`.
///
/// Maintained by hand to match the struct hierarchy in `watchdog_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [alerts]
        "alerts",
        "alerts.chat_id",
        "alerts.bot_token_env",
        "alerts.cooldown_minutes",
        "alerts.api_base",
        "alerts.send_timeout_secs",
        "alerts.journal_lines",
        // [intervals]
        "intervals",
        "intervals.tick_secs",
        "intervals.services_secs",
        "intervals.health_secs",
        "intervals.resources_secs",
        "intervals.disk_secs",
        "intervals.billing_secs",
        // [services]
        "services",
        "services.units",
        "services.status_timeout_secs",
        // [health]
        "health",
        "health.endpoints",
        "health.timeout_secs",
        "health.body_preview_chars",
        // [thresholds]
        "thresholds",
        "thresholds.ram_warning",
        "thresholds.ram_critical",
        "thresholds.cpu_warning",
        "thresholds.cpu_critical",
        "thresholds.disk_warning",
        "thresholds.disk_critical",
        "thresholds.db_max_mb",
        // [resources]
        "resources",
        "resources.databases",
        "resources.disk_path",
        // [billing]
        "billing",
        "billing.timeout_secs",
        "billing.providers",
        "billing.providers.name",
        "billing.providers.kind",
        "billing.providers.currency",
        "billing.providers.token_env",
        "billing.providers.api_url",
        "billing.providers.warning",
        "billing.providers.critical",
        // [remediation]
        "remediation",
        "remediation.restart_on_failure",
        "remediation.max_restarts",
        "remediation.cooldown_minutes",
        "remediation.verify_delay_secs",
        "remediation.restart_timeout_secs",
        "remediation.allowed_commands",
        // [cleanup]
        "cleanup",
        "cleanup.on_disk_critical",
        "cleanup.sweep_paths",
        "cleanup.cache_roots",
        "cleanup.cache_dir_names",
        "cleanup.aged",
        "cleanup.aged.path",
        "cleanup.aged.max_age_days",
        // [storage]
        "storage",
        "storage.path",
        // [server]
        "server",
        "server.addr",
    ];
    keys.iter().copied().collect()
}

/// Tables whose children are user-chosen names rather than fields.
const FREE_FORM_TABLES: &[&str] = &["health.endpoints"];

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
///
/// Tables inside arrays (`[[a.b]]`) are walked under the array's own path,
/// so each element's fields appear as `a.b.<field>` (deduplicated).
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if FREE_FORM_TABLES.contains(&path.as_str()) {
                continue;
            }
            match v {
                toml::Value::Table(_) => keys.extend(walk_toml_keys(v, &path)),
                toml::Value::Array(items) => {
                    for item in items.iter().filter(|i| i.is_table()) {
                        for key in walk_toml_keys(item, &path) {
                            if !keys.contains(&key) {
                                keys.push(key);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        // Ties resolve alphabetically so the suggestion is stable
        let better = match best {
            None => true,
            Some((bk, bd)) => dist < bd || (dist == bd && k < bk),
        };
        if better {
            best = Some((k, dist));
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This never fails on unknown keys. Parse errors are left to serde.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate value ranges on a parsed config.
///
/// Returns (errors, warnings). Errors are impossible values that must
/// prevent startup; warnings are suspicious but not fatal.
pub fn validate_ranges(config: &WatchdogConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let t = &config.thresholds;
    for (name, value) in [
        ("ram_warning", t.ram_warning),
        ("ram_critical", t.ram_critical),
        ("cpu_warning", t.cpu_warning),
        ("cpu_critical", t.cpu_critical),
        ("disk_warning", t.disk_warning),
        ("disk_critical", t.disk_critical),
    ] {
        if !(0.0..=100.0).contains(&value) {
            errors.push(format!(
                "thresholds.{name} = {value:.1} is outside the percentage range (0-100)"
            ));
        }
    }

    for (name, url) in &config.health.endpoints {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(format!(
                "health.endpoints.{name} = '{url}' must be an http:// or https:// URL"
            ));
        }
    }

    for aged in &config.cleanup.aged {
        if aged.max_age_days == 0 {
            errors.push(format!(
                "cleanup.aged '{}': max_age_days must be > 0",
                aged.path.display()
            ));
        }
    }

    let r = &config.remediation;
    if r.restart_on_failure {
        for unit in &config.services.units {
            let cmd = format!("systemctl restart {unit}");
            if !r.allowed_commands.contains(&cmd) {
                warnings.push(ValidationWarning {
                    field: "remediation.allowed_commands".to_string(),
                    message: format!(
                        "Service '{unit}' is monitored but '{cmd}' is not allow-listed; restarts will be rejected"
                    ),
                    suggestion: None,
                });
            }
        }
    }

    if config.alerts.cooldown_minutes == 0 {
        warnings.push(ValidationWarning {
            field: "alerts.cooldown_minutes".to_string(),
            message: "alerts.cooldown_minutes = 0 disables alert deduplication".to_string(),
            suggestion: None,
        });
    }

    (errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn endpoint_names_are_not_flagged() {
        let warnings = validate_unknown_keys(
            r#"
[health.endpoints]
prod = "http://localhost:8000/"
staging = "http://localhost:8001/"
"#,
        );
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn typo_suggests_known_key() {
        let warnings = validate_unknown_keys("[alerts]\ncooldown_minuts = 10\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("alerts.cooldown_minutes")
        );
    }

    #[test]
    fn typo_inside_array_of_tables_is_flagged() {
        let warnings = validate_unknown_keys(
            r#"
[[billing.providers]]
name = "timeweb"
kind = "timeweb"
currency = "RUB"
token_env = "TIMEWEB_TOKEN"
warnign = 500.0
critical = 100.0

[[billing.providers]]
name = "openai"
kind = "openai"
currency = "USD"
token_env = "OPENAI_API_KEY"
warning = 10.0
critical = 5.0

[[cleanup.aged]]
path = "/tmp"
max_age_dayz = 2
"#,
        );
        assert_eq!(warnings.len(), 2, "{warnings:?}");
        assert_eq!(
            warnings[0].suggestion.as_deref(),
            Some("billing.providers.warning")
        );
        assert_eq!(
            warnings[1].suggestion.as_deref(),
            Some("cleanup.aged.max_age_days")
        );
    }

    #[test]
    fn unlisted_unit_warns() {
        let mut config = WatchdogConfig::default();
        config.services.units.push("extra".to_string());
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.message.contains("extra")));
    }

    #[test]
    fn non_http_endpoint_is_an_error() {
        let mut config = WatchdogConfig::default();
        config
            .health
            .endpoints
            .insert("bad".to_string(), "localhost:9000".to_string());
        let (errors, _) = validate_ranges(&config);
        assert_eq!(errors.len(), 1);
    }
}
