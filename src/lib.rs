
pub mod config;
pub mod pipeline;
pub mod providers;
pub mod signals;
pub mod store;
pub mod trend;
pub mod types;
pub mod ui;

pub use pipeline::{FetchError, MetricsBatch, MetricsFetcher};
pub use signals::{classify, Signal};
pub use types::{HealthStatus, MetricsSnapshot, Product};
