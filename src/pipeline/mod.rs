//! # Aggregation pipeline
//!
//! One refresh = one call to [`MetricsFetcher::fetch_all`]. Each product is
//! fetched on its own task; results are collected into a fresh map that the
//! caller swaps in wholesale.
//!
//! ## Module Organization
//!
//! - `engine` - fan-out, partial-failure isolation, cache write and trend read-back

pub mod engine;

pub use engine::{FetchError, MetricsBatch, MetricsFetcher, TRAFFIC_WINDOW_DAYS};
