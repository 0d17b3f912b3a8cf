//! Core data types shared by the fetch pipeline, the store and the table view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured product
///
/// `name` is the unique key used for metrics lookup. Optional fields are
/// empty strings when not configured; an empty field disables the matching probe.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Product {
    pub name: String,
    pub domain: String,
    /// Billing product id (Stripe `prod_...`)
    pub billing_product_id: String,
    /// Analytics host filter (matched against `$host`)
    pub analytics_host: String,
}

impl Product {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            ..Self::default()
        }
    }

    pub fn with_billing_product(mut self, id: impl Into<String>) -> Self {
        self.billing_product_id = id.into();
        self
    }

    pub fn with_analytics_host(mut self, host: impl Into<String>) -> Self {
        self.analytics_host = host.into();
        self
    }
}

/// Coarse uptime classification of a product's domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
            HealthStatus::Unknown => "",
        }
    }

    /// Parse the stored representation. Anything unrecognised is `Unknown`.
    pub fn from_str(s: &str) -> Self {
        match s {
            "healthy" => HealthStatus::Healthy,
            "degraded" => HealthStatus::Degraded,
            "down" => HealthStatus::Down,
            _ => HealthStatus::Unknown,
        }
    }

    /// Sort rank, worst first: down < degraded < healthy < unknown
    pub fn rank(&self) -> u8 {
        match self {
            HealthStatus::Down => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Healthy => 2,
            HealthStatus::Unknown => 3,
        }
    }
}

/// One product's measured signals at one instant
///
/// Built once per refresh cycle per product and never mutated afterwards;
/// the next refresh supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub product_name: String,
    pub timestamp: DateTime<Utc>,

    // Traffic
    pub visits: i64,
    pub uniques: i64,
    /// Reserved; no provider populates it.
    pub bounce_rate: f64,
    /// Daily visit counts, oldest first
    pub trend: Vec<i64>,

    // Revenue
    /// Monthly recurring revenue in cents
    pub mrr: i64,
    pub subscribers: i64,

    // Health
    pub health: HealthStatus,
    pub latency_ms: i64,

    /// Partial-failure notes, `"<provider>: <message>"`
    pub notes: Vec<String>,
}

impl MetricsSnapshot {
    /// Zero-valued snapshot for a product
    pub fn empty(product_name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            product_name: product_name.into(),
            timestamp,
            visits: 0,
            uniques: 0,
            bounce_rate: 0.0,
            trend: Vec::new(),
            mrr: 0,
            subscribers: 0,
            health: HealthStatus::Unknown,
            latency_ms: 0,
            notes: Vec::new(),
        }
    }
}

/// Pageviews and unique visitors over a time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Traffic {
    pub pageviews: i64,
    pub visitors: i64,
}

/// Recurring revenue for one billing product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Revenue {
    /// Monthly amount in minor currency units
    pub mrr: i64,
    pub subscribers: i64,
}

/// Result of one health probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthProbe {
    pub status: HealthStatus,
    pub latency_ms: i64,
}
