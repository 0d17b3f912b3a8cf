//! Provider collaborators: analytics, billing and uptime
//!
//! The fetch pipeline only sees the traits below. Concrete clients live in
//! the submodules; their wire formats and auth stay private to them.

pub mod health;
pub mod posthog;
pub mod stripe;

use crate::types::{HealthProbe, Revenue, Traffic};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use health::HttpHealthChecker;
pub use posthog::PostHogClient;
pub use stripe::StripeClient;

#[derive(Debug)]
pub enum ProviderError {
    /// Missing credential or empty argument
    InvalidInput(String),
    /// Transport failure (DNS, TLS, timeout)
    Http(reqwest::Error),
    /// Non-success HTTP status
    Status { code: u16, body: String },
    /// Response body did not match the expected shape
    Decode(String),
    /// Paginated listing ended in an inconsistent state
    Pagination(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Http(err)
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderError::InvalidInput(msg) => write!(f, "{}", msg),
            ProviderError::Http(e) => write!(f, "request failed: {}", e),
            ProviderError::Status { code, body } => write!(f, "status {}: {}", code, body),
            ProviderError::Decode(msg) => write!(f, "decode response: {}", msg),
            ProviderError::Pagination(msg) => write!(f, "pagination: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Pageviews/visitors for a host filter over a time window
#[async_trait]
pub trait TrafficProvider: Send + Sync {
    /// Tag used in partial-failure notes
    fn name(&self) -> &'static str;

    async fn traffic(
        &self,
        host_filter: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Traffic, ProviderError>;
}

/// Monthly recurring revenue for a billing product
#[async_trait]
pub trait RevenueProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recurring_revenue(&self, billing_product_id: &str) -> Result<Revenue, ProviderError>;
}

/// Uptime probe for a domain
///
/// Network-level failures are a valid `Down` result, not an error.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    fn name(&self) -> &'static str;

    async fn check(&self, domain: &str) -> Result<HealthProbe, ProviderError>;
}

/// Read at most 1 MiB of an error body for diagnostics
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(text) => {
            let trimmed = text.trim();
            let mut end = trimmed.len().min(1 << 20);
            while !trimmed.is_char_boundary(end) {
                end -= 1;
            }
            trimmed[..end].to_string()
        }
        Err(_) => String::new(),
    }
}
