//! Metrics fetch engine - concurrent per-product fan-out
//!
//! ## Architecture
//!
//! ```text
//! fetch_all(products)
//!     ↓ one task per product (JoinSet)
//! fetch_product: analytics ∥ revenue ∥ health probes
//!     ↓ best-effort cache write + trailing history read
//! (name, MetricsSnapshot) over mpsc
//!     ↓ single collector
//! HashMap<name, MetricsSnapshot>
//! ```
//!
//! Workers never share the result map; the collector is its only writer.
//! A provider failure zeroes the affected fields and leaves a note on the
//! snapshot. Cache failures are logged and otherwise ignored.

use crate::providers::{HealthChecker, ProviderError, RevenueProvider, TrafficProvider};
use crate::store::MetricsStore;
use crate::trend::{build_trend, clamp_trend_days, trend_window_start, DEFAULT_TREND_DAYS};
use crate::types::{MetricsSnapshot, Product};
use chrono::{DateTime, Local, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Trailing window queried for visits/uniques
pub const TRAFFIC_WINDOW_DAYS: i64 = 7;

/// Completed refresh: product name → snapshot
pub type MetricsBatch = HashMap<String, MetricsSnapshot>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The deadline fired before any product finished
    TimedOut { pending: usize },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::TimedOut { pending } => {
                write!(f, "refresh timed out before any of {} products completed", pending)
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Time bounds shared by every product in one refresh
#[derive(Debug, Clone, Copy)]
struct FetchWindow {
    now: DateTime<Utc>,
    local_now: DateTime<Local>,
    traffic_from: DateTime<Utc>,
    trend_from: DateTime<Utc>,
}

/// Fans out provider probes for a list of products
///
/// Every collaborator is optional: a missing provider skips its probe
/// exactly as if no product had the matching id configured.
#[derive(Clone)]
pub struct MetricsFetcher {
    traffic: Option<Arc<dyn TrafficProvider>>,
    revenue: Option<Arc<dyn RevenueProvider>>,
    health: Option<Arc<dyn HealthChecker>>,
    store: Option<Arc<dyn MetricsStore>>,
    trend_days: i64,
}

impl Default for MetricsFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsFetcher {
    pub fn new() -> Self {
        Self {
            traffic: None,
            revenue: None,
            health: None,
            store: None,
            trend_days: DEFAULT_TREND_DAYS,
        }
    }

    pub fn with_traffic(mut self, provider: Arc<dyn TrafficProvider>) -> Self {
        self.traffic = Some(provider);
        self
    }

    pub fn with_revenue(mut self, provider: Arc<dyn RevenueProvider>) -> Self {
        self.revenue = Some(provider);
        self
    }

    pub fn with_health(mut self, checker: Arc<dyn HealthChecker>) -> Self {
        self.health = Some(checker);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Trend window in days, clamped to `1..=MAX_TREND_DAYS`
    pub fn with_trend_days(mut self, days: i64) -> Self {
        self.trend_days = clamp_trend_days(days);
        self
    }

    pub fn store(&self) -> Option<&Arc<dyn MetricsStore>> {
        self.store.as_ref()
    }

    /// Last cached snapshot per product, for painting before the first refresh
    ///
    /// Cached rows carry no trend or notes. Products with no row (or a failed
    /// read) are simply absent.
    pub async fn load_cached(&self, products: &[Product]) -> MetricsBatch {
        let mut cached = MetricsBatch::new();
        let Some(store) = &self.store else {
            return cached;
        };

        for product in products {
            match store.latest_snapshot(&product.name).await {
                Ok(Some(snapshot)) => {
                    cached.insert(product.name.clone(), snapshot);
                }
                Ok(None) => {}
                Err(e) => log::warn!("Cache read failed for {}: {}", product.name, e),
            }
        }

        log::info!("📊 Loaded {}/{} cached snapshots", cached.len(), products.len());
        cached
    }

    /// Fetch every product, giving up on stragglers after `timeout`
    pub async fn fetch_all(
        &self,
        products: &[Product],
        timeout: Duration,
    ) -> Result<MetricsBatch, FetchError> {
        self.fetch_all_until(products, tokio::time::sleep(timeout)).await
    }

    /// Fetch every product until all finish or `cancel` resolves
    ///
    /// On cancellation, products that already finished are returned and the
    /// rest are aborted (absent from the map). Only when nothing finished is
    /// the refresh reported as `FetchError::TimedOut`.
    pub async fn fetch_all_until<F>(
        &self,
        products: &[Product],
        cancel: F,
    ) -> Result<MetricsBatch, FetchError>
    where
        F: Future<Output = ()> + Send,
    {
        let window = self.window_at(Utc::now());
        let (tx, mut rx) = mpsc::channel::<(String, MetricsSnapshot)>(products.len().max(1));
        let mut tasks = JoinSet::new();

        for product in products.iter().cloned() {
            let fetcher = self.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let snapshot = fetcher.fetch_product(&product, &window).await;
                if tx.send((product.name, snapshot)).await.is_err() {
                    log::debug!("Collector gone, dropping result");
                }
            });
        }
        drop(tx);

        let mut collected = MetricsBatch::with_capacity(products.len());
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    Some((name, snapshot)) => {
                        collected.insert(name, snapshot);
                    }
                    None => break,
                },
                _ = &mut cancel => {
                    tasks.abort_all();
                    while let Ok((name, snapshot)) = rx.try_recv() {
                        collected.insert(name, snapshot);
                    }
                    log::warn!(
                        "⏳ Refresh cancelled with {}/{} products complete",
                        collected.len(),
                        products.len()
                    );
                    if collected.is_empty() && !products.is_empty() {
                        return Err(FetchError::TimedOut { pending: products.len() });
                    }
                    break;
                }
            }
        }

        log::debug!("✅ Refresh collected {} snapshots", collected.len());
        Ok(collected)
    }

    fn window_at(&self, now: DateTime<Utc>) -> FetchWindow {
        let local_now = now.with_timezone(&Local);
        FetchWindow {
            now,
            local_now,
            traffic_from: now - chrono::Duration::days(TRAFFIC_WINDOW_DAYS),
            trend_from: trend_window_start(&local_now, self.trend_days),
        }
    }

    async fn fetch_product(&self, product: &Product, window: &FetchWindow) -> MetricsSnapshot {
        let traffic = async {
            match &self.traffic {
                Some(p) if !product.analytics_host.is_empty() => Some((
                    p.name(),
                    p.traffic(&product.analytics_host, window.traffic_from, window.now)
                        .await,
                )),
                _ => None,
            }
        };
        let revenue = async {
            match &self.revenue {
                Some(p) if !product.billing_product_id.is_empty() => {
                    Some((p.name(), p.recurring_revenue(&product.billing_product_id).await))
                }
                _ => None,
            }
        };
        let health = async {
            match &self.health {
                Some(c) if !product.domain.is_empty() => {
                    Some((c.name(), c.check(&product.domain).await))
                }
                _ => None,
            }
        };

        let (traffic, revenue, health) = tokio::join!(traffic, revenue, health);

        let mut snapshot = MetricsSnapshot::empty(&product.name, window.now);

        if let Some(t) = take_or_note(&mut snapshot.notes, traffic) {
            snapshot.visits = t.pageviews;
            snapshot.uniques = t.visitors;
        }
        if let Some(r) = take_or_note(&mut snapshot.notes, revenue) {
            snapshot.mrr = r.mrr;
            snapshot.subscribers = r.subscribers;
        }
        if let Some(h) = take_or_note(&mut snapshot.notes, health) {
            snapshot.health = h.status;
            snapshot.latency_ms = h.latency_ms;
        }

        for note in &snapshot.notes {
            log::warn!("⚠️  {}: {}", product.name, note);
        }

        if let Some(store) = &self.store {
            if let Err(e) = store.save_snapshot(&snapshot).await {
                log::warn!("Cache write failed for {}: {}", product.name, e);
            }
            match store
                .snapshots_in_range(&product.name, window.trend_from, window.now)
                .await
            {
                Ok(history) => {
                    let points: Vec<(DateTime<Utc>, i64)> =
                        history.iter().map(|s| (s.timestamp, s.visits)).collect();
                    snapshot.trend = build_trend(&points, &window.local_now, self.trend_days);
                }
                Err(e) => {
                    log::debug!("Trend history unavailable for {}: {}", product.name, e);
                }
            }
        }

        snapshot
    }
}

/// Unwrap a probe result, turning failures into a tagged note
fn take_or_note<T>(
    notes: &mut Vec<String>,
    probe: Option<(&'static str, Result<T, ProviderError>)>,
) -> Option<T> {
    match probe? {
        (_, Ok(value)) => Some(value),
        (tag, Err(e)) => {
            notes.push(format!("{}: {}", tag, e));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_bounds() {
        let fetcher = MetricsFetcher::new().with_trend_days(7);
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        let window = fetcher.window_at(now);

        assert_eq!(window.now, now);
        assert_eq!(window.traffic_from, now - chrono::Duration::days(7));
        assert!(window.trend_from < now);
        assert!(window.trend_from >= now - chrono::Duration::days(8));
    }

    #[test]
    fn test_take_or_note() {
        let mut notes = Vec::new();
        let ok: Option<(&'static str, Result<i32, ProviderError>)> = Some(("X", Ok(3)));
        assert_eq!(take_or_note(&mut notes, ok), Some(3));
        assert!(notes.is_empty());

        let skipped: Option<(&'static str, Result<i32, ProviderError>)> = None;
        assert_eq!(take_or_note(&mut notes, skipped), None);
        assert!(notes.is_empty());

        let failed: Option<(&'static str, Result<i32, ProviderError>)> =
            Some(("Stripe", Err(ProviderError::InvalidInput("boom".to_string()))));
        assert_eq!(take_or_note(&mut notes, failed), None);
        assert_eq!(notes, vec!["Stripe: boom".to_string()]);
    }

    #[test]
    fn test_oversized_trend_window_is_clamped() {
        let fetcher = MetricsFetcher::new().with_trend_days(200_000_000);
        assert_eq!(fetcher.trend_days, crate::trend::MAX_TREND_DAYS);

        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        let window = fetcher.window_at(now);
        assert!(window.trend_from >= now - chrono::Duration::days(366));
    }

    #[tokio::test]
    async fn test_oversized_trend_window_refresh_completes_in_spawned_task() {
        let fetcher = MetricsFetcher::new().with_trend_days(200_000_000);
        let handle = tokio::spawn(async move {
            fetcher
                .fetch_all(&[Product::new("a", "")], Duration::from_secs(2))
                .await
        });
        let batch = handle.await.expect("refresh task must not panic").unwrap();
        assert!(batch.contains_key("a"));
    }

    #[tokio::test]
    async fn test_no_products_is_empty_batch() {
        let fetcher = MetricsFetcher::new();
        let batch = fetcher.fetch_all(&[], Duration::from_secs(1)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_load_cached_without_store_is_empty() {
        let fetcher = MetricsFetcher::new();
        let cached = fetcher.load_cached(&[Product::new("a", "a.app")]).await;
        assert!(cached.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_product_has_unknown_health_and_no_notes() {
        let fetcher = MetricsFetcher::new();
        let products = vec![Product::new("bare", "")];
        let batch = fetcher.fetch_all(&products, Duration::from_secs(1)).await.unwrap();
        let snapshot = &batch["bare"];
        assert_eq!(snapshot.health, crate::types::HealthStatus::Unknown);
        assert!(snapshot.notes.is_empty());
        assert!(snapshot.trend.is_empty());
    }
}
