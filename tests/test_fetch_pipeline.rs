//! Integration tests for the fetch pipeline
//!
//! Providers are in-process fakes; the cache is a real SQLite file in a
//! temp directory.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use overmind::{
    providers::{HealthChecker, ProviderError, RevenueProvider, TrafficProvider},
    store::{MetricsStore, SqliteMetricsStore, StoreError},
    types::{HealthProbe, HealthStatus, MetricsSnapshot, Product, Revenue, Traffic},
    FetchError, MetricsFetcher,
};
use std::{sync::Arc, time::Duration};
use tempfile::tempdir;

struct FakeTraffic {
    pageviews: i64,
    delay_for: Option<(&'static str, Duration)>,
}

#[async_trait]
impl TrafficProvider for FakeTraffic {
    fn name(&self) -> &'static str {
        "PostHog"
    }

    async fn traffic(
        &self,
        host_filter: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Traffic, ProviderError> {
        if let Some((host, delay)) = self.delay_for {
            if host == host_filter {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(Traffic {
            pageviews: self.pageviews,
            visitors: self.pageviews / 2,
        })
    }
}

struct FailingTraffic;

#[async_trait]
impl TrafficProvider for FailingTraffic {
    fn name(&self) -> &'static str {
        "PostHog"
    }

    async fn traffic(
        &self,
        _host_filter: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Traffic, ProviderError> {
        Err(ProviderError::Status {
            code: 401,
            body: "invalid api key".to_string(),
        })
    }
}

struct FailingRevenue;

#[async_trait]
impl RevenueProvider for FailingRevenue {
    fn name(&self) -> &'static str {
        "Stripe"
    }

    async fn recurring_revenue(&self, _product_id: &str) -> Result<Revenue, ProviderError> {
        Err(ProviderError::InvalidInput("stripe secret key is empty".to_string()))
    }
}

struct FixedRevenue(i64);

#[async_trait]
impl RevenueProvider for FixedRevenue {
    fn name(&self) -> &'static str {
        "Stripe"
    }

    async fn recurring_revenue(&self, _product_id: &str) -> Result<Revenue, ProviderError> {
        Ok(Revenue {
            mrr: self.0,
            subscribers: 3,
        })
    }
}

struct FailingHealth;

#[async_trait]
impl HealthChecker for FailingHealth {
    fn name(&self) -> &'static str {
        "Health"
    }

    async fn check(&self, _domain: &str) -> Result<HealthProbe, ProviderError> {
        Err(ProviderError::InvalidInput("domain is empty".to_string()))
    }
}

struct UpHealth;

#[async_trait]
impl HealthChecker for UpHealth {
    fn name(&self) -> &'static str {
        "Health"
    }

    async fn check(&self, _domain: &str) -> Result<HealthProbe, ProviderError> {
        Ok(HealthProbe {
            status: HealthStatus::Healthy,
            latency_ms: 42,
        })
    }
}

/// Store whose every call fails
struct BrokenStore;

#[async_trait]
impl MetricsStore for BrokenStore {
    async fn save_snapshot(&self, _snapshot: &MetricsSnapshot) -> Result<(), StoreError> {
        Err(StoreError::Task("disk full".to_string()))
    }

    async fn latest_snapshot(&self, _product_name: &str) -> Result<Option<MetricsSnapshot>, StoreError> {
        Err(StoreError::Task("disk full".to_string()))
    }

    async fn snapshots_in_range(
        &self,
        _product_name: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> Result<Vec<MetricsSnapshot>, StoreError> {
        Err(StoreError::Task("disk full".to_string()))
    }
}

fn full_product(name: &str) -> Product {
    Product::new(name, format!("{}.app", name))
        .with_billing_product(format!("prod_{}", name))
        .with_analytics_host(format!("{}.app", name))
}

#[tokio::test]
async fn test_all_providers_failing_still_yields_every_product() {
    let fetcher = MetricsFetcher::new()
        .with_traffic(Arc::new(FailingTraffic))
        .with_revenue(Arc::new(FailingRevenue))
        .with_health(Arc::new(FailingHealth));
    let products = vec![full_product("alpha"), full_product("beta")];

    let batch = fetcher
        .fetch_all(&products, Duration::from_secs(5))
        .await
        .expect("partial failures never fail the refresh");

    assert_eq!(batch.len(), 2);
    for product in &products {
        let s = &batch[&product.name];
        assert_eq!(s.visits, 0);
        assert_eq!(s.mrr, 0);
        assert_eq!(s.health, HealthStatus::Unknown);
        assert_eq!(s.notes.len(), 3);
        assert!(s.notes.iter().any(|n| n == "PostHog: status 401: invalid api key"));
        assert!(s.notes.iter().any(|n| n.starts_with("Stripe: ")));
        assert!(s.notes.iter().any(|n| n.starts_with("Health: ")));
    }
}

#[tokio::test]
async fn test_unconfigured_capabilities_are_skipped_without_notes() {
    let fetcher = MetricsFetcher::new()
        .with_traffic(Arc::new(FailingTraffic))
        .with_revenue(Arc::new(FailingRevenue));
    // no analytics host, no billing id
    let products = vec![Product::new("bare", "bare.app")];

    let batch = fetcher.fetch_all(&products, Duration::from_secs(5)).await.unwrap();
    assert!(batch["bare"].notes.is_empty());
}

#[tokio::test]
async fn test_successful_probes_fill_snapshot() {
    let fetcher = MetricsFetcher::new()
        .with_traffic(Arc::new(FakeTraffic {
            pageviews: 250,
            delay_for: None,
        }))
        .with_revenue(Arc::new(FixedRevenue(4900)))
        .with_health(Arc::new(UpHealth));

    let batch = fetcher
        .fetch_all(&[full_product("alpha")], Duration::from_secs(5))
        .await
        .unwrap();
    let s = &batch["alpha"];
    assert_eq!((s.visits, s.uniques), (250, 125));
    assert_eq!((s.mrr, s.subscribers), (4900, 3));
    assert_eq!((s.health, s.latency_ms), (HealthStatus::Healthy, 42));
    assert!(s.notes.is_empty());
    assert!(s.trend.is_empty(), "no store means no trend");
}

#[tokio::test]
async fn test_cancellation_keeps_finished_products() {
    let fetcher = MetricsFetcher::new().with_traffic(Arc::new(FakeTraffic {
        pageviews: 10,
        delay_for: Some(("slow.app", Duration::from_secs(30))),
    }));
    let products = vec![full_product("fast"), full_product("slow")];

    let batch = fetcher
        .fetch_all(&products, Duration::from_millis(300))
        .await
        .unwrap();

    assert!(batch.contains_key("fast"));
    assert!(!batch.contains_key("slow"));
}

#[tokio::test]
async fn test_timeout_before_any_product_is_an_error() {
    let fetcher = MetricsFetcher::new().with_traffic(Arc::new(FakeTraffic {
        pageviews: 10,
        delay_for: Some(("slow.app", Duration::from_secs(30))),
    }));

    let err = fetcher
        .fetch_all(&[full_product("slow")], Duration::from_millis(100))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::TimedOut { pending: 1 });
}

#[tokio::test]
async fn test_broken_store_is_swallowed() {
    let fetcher = MetricsFetcher::new()
        .with_revenue(Arc::new(FixedRevenue(100)))
        .with_store(Arc::new(BrokenStore));

    let batch = fetcher
        .fetch_all(&[full_product("alpha")], Duration::from_secs(5))
        .await
        .unwrap();
    let s = &batch["alpha"];
    assert_eq!(s.mrr, 100);
    assert!(s.notes.is_empty(), "cache failures leave no notes");
    assert!(s.trend.is_empty());

    assert!(fetcher.load_cached(&[full_product("alpha")]).await.is_empty());
}

#[tokio::test]
async fn test_store_history_populates_trend_and_cache_warm() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteMetricsStore::open(dir.path().join("metrics.db")).unwrap());

    let mut yesterday = MetricsSnapshot::empty("alpha", Utc::now() - ChronoDuration::days(1));
    yesterday.visits = 33;
    store.save_snapshot(&yesterday).await.unwrap();

    let fetcher = MetricsFetcher::new()
        .with_traffic(Arc::new(FakeTraffic {
            pageviews: 77,
            delay_for: None,
        }))
        .with_store(store.clone())
        .with_trend_days(7);

    let products = vec![full_product("alpha"), full_product("beta")];
    let batch = fetcher.fetch_all(&products, Duration::from_secs(5)).await.unwrap();

    let trend = &batch["alpha"].trend;
    assert_eq!(trend.len(), 7);
    assert_eq!(trend[6], 77, "today's bucket is the snapshot just written");
    assert_eq!(trend[5], 33);

    assert_eq!(batch["beta"].trend.len(), 7);
    assert_eq!(batch["beta"].trend[6], 77);

    let cached = fetcher.load_cached(&products).await;
    assert_eq!(cached.len(), 2);
    assert_eq!(cached["alpha"].visits, 77);
    assert!(cached["alpha"].trend.is_empty());
}

#[tokio::test]
async fn test_oversized_trend_window_is_bounded() {
    let dir = tempdir().unwrap();
    let store = Arc::new(SqliteMetricsStore::open(dir.path().join("metrics.db")).unwrap());
    let fetcher = MetricsFetcher::new()
        .with_traffic(Arc::new(FakeTraffic {
            pageviews: 5,
            delay_for: None,
        }))
        .with_store(store)
        .with_trend_days(200_000_000);

    let refresh = tokio::spawn(async move {
        fetcher
            .fetch_all(&[full_product("alpha")], Duration::from_secs(5))
            .await
    });
    let batch = refresh.await.expect("refresh task panicked").unwrap();

    let trend = &batch["alpha"].trend;
    assert_eq!(trend.len(), overmind::trend::MAX_TREND_DAYS as usize);
    assert_eq!(trend.last(), Some(&5));
}
