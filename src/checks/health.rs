//! HTTP health endpoint probes

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::types::HealthResult;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Timeout")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Status and body of a GET.
#[derive(Debug, Clone)]
pub struct ProbeResponse {
    pub status: u16,
    pub body: String,
}

/// Issues unauthenticated GETs.
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError>;
}

/// reqwest-backed probe with a per-request timeout.
#[derive(Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EndpointProbe for HttpProbe {
    async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(ProbeResponse { status, body })
    }
}

/// First `max_chars` characters of `text`.
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Probe every endpoint in name order. Healthy means exactly HTTP 200.
pub async fn check_health(
    probe: &dyn EndpointProbe,
    endpoints: &BTreeMap<String, String>,
    preview_chars: usize,
) -> Vec<HealthResult> {
    let mut results = Vec::with_capacity(endpoints.len());
    for (name, url) in endpoints {
        let result = match probe.get(url).await {
            Ok(resp) => HealthResult {
                name: name.clone(),
                url: url.clone(),
                healthy: resp.status == 200,
                status_code: resp.status,
                message: preview(&resp.body, preview_chars),
            },
            Err(e) => HealthResult {
                name: name.clone(),
                url: url.clone(),
                healthy: false,
                status_code: 0,
                message: preview(&e.to_string(), preview_chars),
            },
        };
        debug!(endpoint = %name, status = result.status_code, healthy = result.healthy, "Health probed");
        results.push(result);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned;

    #[async_trait]
    impl EndpointProbe for Canned {
        async fn get(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
            match url {
                "http://ok" => Ok(ProbeResponse { status: 200, body: "x".repeat(500) }),
                "http://redirect" => Ok(ProbeResponse { status: 204, body: String::new() }),
                _ => Err(ProbeError::Connect("refused".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn healthy_only_on_exact_200_and_body_is_truncated() {
        let endpoints = BTreeMap::from([
            ("a".to_string(), "http://ok".to_string()),
            ("b".to_string(), "http://redirect".to_string()),
            ("c".to_string(), "http://down".to_string()),
        ]);
        let results = check_health(&Canned, &endpoints, 200).await;

        assert!(results[0].healthy);
        assert_eq!(results[0].message.chars().count(), 200);
        assert!(!results[1].healthy);
        assert_eq!(results[1].status_code, 204);
        assert!(!results[2].healthy);
        assert_eq!(results[2].status_code, 0);
        assert!(results[2].message.starts_with("Connection failed"));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("привет", 3), "при");
    }
}
