//! HTTPS uptime probe

use super::{HealthChecker, ProviderError};
use crate::types::{HealthProbe, HealthStatus};
use async_trait::async_trait;
use std::time::{Duration, Instant};

pub struct HttpHealthChecker {
    client: reqwest::Client,
}

impl HttpHealthChecker {
    pub fn new() -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client })
    }
}

/// 2xx/3xx healthy, 4xx degraded, anything else down
pub fn status_from_code(code: u16) -> HealthStatus {
    match code {
        200..=399 => HealthStatus::Healthy,
        400..=499 => HealthStatus::Degraded,
        _ => HealthStatus::Down,
    }
}

#[async_trait]
impl HealthChecker for HttpHealthChecker {
    fn name(&self) -> &'static str {
        "Health"
    }

    async fn check(&self, domain: &str) -> Result<HealthProbe, ProviderError> {
        if domain.is_empty() {
            return Err(ProviderError::InvalidInput("domain is empty".to_string()));
        }

        let url = format!("https://{}", domain);
        let start = Instant::now();
        let result = self.client.get(&url).send().await;
        let latency_ms = start.elapsed().as_millis() as i64;

        match result {
            Ok(response) => Ok(HealthProbe {
                status: status_from_code(response.status().as_u16()),
                latency_ms,
            }),
            Err(e) => {
                log::debug!("Health probe for {} failed, reporting down: {}", domain, e);
                Ok(HealthProbe {
                    status: HealthStatus::Down,
                    latency_ms,
                })
            }
        }
    }
}
