//! Third-party account balances
//!
//! Each provider is a `BillingSource`. A provider without credentials is
//! reported as not configured, without any network call, so it can be told
//! apart from a provider whose API failed.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::{defaults, BillingProviderConfig, ProviderKind};
use crate::types::BillingResult;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Server returned status {0}")]
    ServerError(reqwest::StatusCode),
}

/// One provider's balance query.
#[async_trait]
pub trait BillingSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self) -> BillingResult;
}

// ============================================================================
// Timeweb
// ============================================================================

#[derive(Debug, Deserialize)]
struct FinancesResponse {
    finances: Finances,
}

#[derive(Debug, Deserialize)]
struct Finances {
    balance: f64,
}

/// Cloud hosting account queried with a bearer token.
pub struct TimewebBilling {
    name: String,
    currency: String,
    api_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl TimewebBilling {
    pub fn new(
        name: &str,
        currency: &str,
        api_url: Option<&str>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BillingError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            name: name.to_string(),
            currency: currency.to_string(),
            api_url: api_url.unwrap_or(defaults::TIMEWEB_API_URL).to_string(),
            token,
            client,
        })
    }

    async fn query(&self, token: &str) -> Result<f64, BillingError> {
        let resp = self
            .client
            .get(&self.api_url)
            .bearer_auth(token)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BillingError::ServerError(resp.status()));
        }
        let body: FinancesResponse = resp.json().await?;
        Ok(body.finances.balance)
    }
}

#[async_trait]
impl BillingSource for TimewebBilling {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> BillingResult {
        let Some(token) = self.token.as_deref() else {
            return BillingResult::not_configured(&self.name, &self.currency);
        };
        match self.query(token).await {
            Ok(balance) => {
                debug!(provider = %self.name, balance, "Balance fetched");
                BillingResult::ok(&self.name, balance, &self.currency)
            }
            Err(e) => BillingResult::query_failed(&self.name, &self.currency, e.to_string()),
        }
    }
}

// ============================================================================
// OpenAI
// ============================================================================

/// Prepaid account. There is no balance API, so a configured account is
/// reported as needing a manual check.
pub struct OpenAiBilling {
    name: String,
    currency: String,
    token: Option<String>,
}

impl OpenAiBilling {
    pub fn new(name: &str, currency: &str, token: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            currency: currency.to_string(),
            token,
        }
    }
}

#[async_trait]
impl BillingSource for OpenAiBilling {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> BillingResult {
        if self.token.is_none() {
            return BillingResult::not_configured(&self.name, &self.currency);
        }
        BillingResult::manual_check(
            &self.name,
            &self.currency,
            "Prepaid account - check dashboard manually",
        )
    }
}

/// Build a source for each configured provider, reading tokens from the environment.
pub fn sources_from_config(
    providers: &[BillingProviderConfig],
    timeout: Duration,
) -> Result<Vec<Box<dyn BillingSource>>, BillingError> {
    providers
        .iter()
        .map(|p| -> Result<Box<dyn BillingSource>, BillingError> {
            Ok(match p.kind {
                ProviderKind::Timeweb => Box::new(TimewebBilling::new(
                    &p.name,
                    &p.currency,
                    p.api_url.as_deref(),
                    p.token(),
                    timeout,
                )?),
                ProviderKind::Openai => Box::new(OpenAiBilling::new(&p.name, &p.currency, p.token())),
            })
        })
        .collect()
}

/// Query every source in order.
pub async fn check_billing(sources: &[Box<dyn BillingSource>]) -> Vec<BillingResult> {
    let mut results = Vec::with_capacity(sources.len());
    for source in sources {
        results.push(source.fetch().await);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BillingStatus;

    #[tokio::test]
    async fn missing_token_is_not_configured_without_network() {
        let src = TimewebBilling::new("timeweb", "RUB", None, None, Duration::from_secs(1)).unwrap();
        let r = src.fetch().await;
        assert!(!r.success);
        assert_eq!(r.status, BillingStatus::NotConfigured);
        assert_eq!(r.message, "not configured");
    }

    #[tokio::test]
    async fn unreachable_api_is_query_failed() {
        // Port 9 (discard) on localhost is closed in test environments
        let src = TimewebBilling::new(
            "timeweb",
            "RUB",
            Some("http://127.0.0.1:9/finances"),
            Some("token".to_string()),
            Duration::from_secs(2),
        )
        .unwrap();
        let r = src.fetch().await;
        assert!(!r.success);
        assert_eq!(r.status, BillingStatus::QueryFailed);
        assert_ne!(r.message, "not configured");
    }

    #[tokio::test]
    async fn openai_with_key_needs_manual_check() {
        let r = OpenAiBilling::new("openai", "USD", Some("sk".to_string())).fetch().await;
        assert_eq!(r.status, BillingStatus::ManualCheck);
        assert!(r.balance.is_none());
    }

    #[test]
    fn finances_payload_parses() {
        let body: FinancesResponse =
            serde_json::from_str(r#"{"finances":{"balance":742.5,"currency":"RUB"}}"#).unwrap();
        assert!((body.finances.balance - 742.5).abs() < f64::EPSILON);
    }
}
