//! Overmind - terminal dashboard for per-product traffic, revenue and uptime
//!
//! Loads the product list from YAML, wires the analytics/billing/health
//! providers and the SQLite cache into a `MetricsFetcher`, then either runs
//! the interactive table or prints one refresh as JSON.
//!
//! Usage:
//!   overmind [--config <path>] [--snapshot]
//!
//! Environment variables:
//!   OVERMIND_CONFIG - config path (default: ~/.overmind/config.yaml)
//!   OVERMIND_DB_PATH - metrics cache (default: ~/.overmind/cache/metrics.db)
//!   OVERMIND_REFRESH_TIMEOUT_SECS - per-refresh deadline (default: 30)
//!   OVERMIND_TREND_DAYS - sparkline window (default: 7)
//!   OVERMIND_AUTO_REFRESH_SECS - periodic refresh, 0 disables (default: 300)
//!   OVERMIND_LOG_PATH - log file while the dashboard runs (default: ~/.overmind/overmind.log)

use dotenv::dotenv;
use log::{info, warn};
use overmind::{
    config::{default_config_path, FileConfig, RuntimeConfig},
    providers::{HttpHealthChecker, PostHogClient, StripeClient},
    signals::Signal,
    store::SqliteMetricsStore,
    types::{MetricsSnapshot, Product},
    ui::{run_ui, UiOptions, ViewState},
    MetricsBatch, MetricsFetcher,
};
use serde::Serialize;
use std::{path::PathBuf, sync::Arc};

const USAGE: &str = "usage: overmind [--config <path>] [--snapshot]";

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    config: Option<PathBuf>,
    snapshot: bool,
    help: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or("--config requires a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--snapshot" => parsed.snapshot = true,
            "--help" | "-h" => parsed.help = true,
            other => return Err(format!("unknown argument: {}", other)),
        }
    }
    Ok(parsed)
}

/// Log to stderr for one-shot runs, to a file while the TUI owns the terminal
fn init_logging(to_stderr: bool, log_path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    // Keep HTTP client internals quiet unless asked for
    let log_level = std::env::var("RUST_LOG").unwrap_or_default();
    for module in ["hyper_util", "reqwest", "rustls"] {
        if !log_level.contains(module) {
            builder.filter_module(module, log::LevelFilter::Warn);
        }
    }

    if to_stderr {
        builder.target(env_logger::Target::Stderr);
    } else {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

/// Wire providers with non-empty credentials plus the cache
fn build_fetcher(config: &FileConfig, runtime: &RuntimeConfig) -> MetricsFetcher {
    let mut fetcher = MetricsFetcher::new().with_trend_days(runtime.trend_days);
    let creds = &config.credentials;

    if !creds.posthog.api_key.is_empty() {
        match PostHogClient::new(
            &creds.posthog.api_key,
            &creds.posthog.project_id,
            &creds.posthog.host,
        ) {
            Ok(client) => fetcher = fetcher.with_traffic(Arc::new(client)),
            Err(e) => warn!("⚠️  PostHog disabled: {}", e),
        }
    }

    if !creds.stripe.secret_key.is_empty() {
        match StripeClient::new(&creds.stripe.secret_key) {
            Ok(client) => fetcher = fetcher.with_revenue(Arc::new(client)),
            Err(e) => warn!("⚠️  Stripe disabled: {}", e),
        }
    }

    match HttpHealthChecker::new() {
        Ok(checker) => fetcher = fetcher.with_health(Arc::new(checker)),
        Err(e) => warn!("⚠️  Health checks disabled: {}", e),
    }

    // Live data still renders without a cache
    match SqliteMetricsStore::open(&runtime.db_path) {
        Ok(store) => fetcher = fetcher.with_store(Arc::new(store)),
        Err(e) => warn!("⚠️  Metrics cache unavailable ({}): {}", runtime.db_path.display(), e),
    }

    fetcher
}

#[derive(Debug, Serialize)]
struct ProductReport<'a> {
    name: &'a str,
    domain: &'a str,
    signal: Option<Signal>,
    metrics: Option<&'a MetricsSnapshot>,
}

/// One entry per product, sorted by name
fn build_report<'a>(products: &'a [Product], batch: &'a MetricsBatch) -> Vec<ProductReport<'a>> {
    let mut report: Vec<ProductReport> = products
        .iter()
        .map(|p| {
            let metrics = batch.get(&p.name);
            ProductReport {
                name: &p.name,
                domain: &p.domain,
                signal: metrics.map(|m| m.signal()),
                metrics,
            }
        })
        .collect();
    report.sort_by(|a, b| a.name.cmp(b.name));
    report
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let runtime = RuntimeConfig::from_env()?;
    init_logging(args.snapshot, &runtime.log_path)?;

    info!("🚀 Overmind starting");
    info!("   ├─ Cache: {}", runtime.db_path.display());
    info!("   ├─ Refresh timeout: {:?}", runtime.refresh_timeout);
    info!("   ├─ Trend days: {}", runtime.trend_days);
    match runtime.auto_refresh {
        Some(interval) => info!("   └─ Auto refresh: every {:?}", interval),
        None => info!("   └─ Auto refresh: disabled"),
    }

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let file_config = FileConfig::load(&config_path)?;
    let products = file_config.to_products();
    let fetcher = build_fetcher(&file_config, &runtime);

    if args.snapshot {
        let batch = fetcher.fetch_all(&products, runtime.refresh_timeout).await?;
        let report = build_report(&products, &batch);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut state = ViewState::new(products.clone());
    state.seed(fetcher.load_cached(&products).await);

    run_ui(
        state,
        fetcher,
        UiOptions {
            refresh_timeout: runtime.refresh_timeout,
            auto_refresh: runtime.auto_refresh,
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn args(list: &[&str]) -> Result<CliArgs, String> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(args(&[]).unwrap(), CliArgs::default());

        let parsed = args(&["--config", "/tmp/x.yaml", "--snapshot"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("/tmp/x.yaml")));
        assert!(parsed.snapshot);

        assert!(args(&["--config"]).is_err());
        assert!(args(&["--bogus"]).is_err());
        assert!(args(&["-h"]).unwrap().help);
    }

    #[test]
    fn test_report_sorted_with_signals() {
        let products = vec![Product::new("zeta", "z.app"), Product::new("alpha", "a.app")];
        let mut snapshot = MetricsSnapshot::empty("zeta", Utc::now());
        snapshot.visits = 500;
        let batch: MetricsBatch = [("zeta".to_string(), snapshot)].into_iter().collect();

        let report = build_report(&products, &batch);
        assert_eq!(report[0].name, "alpha");
        assert!(report[0].metrics.is_none());
        assert_eq!(report[1].signal, Some(Signal::Traction));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json[1]["signal"], "traction");
        assert_eq!(json[1]["metrics"]["visits"], 500);
    }
}
