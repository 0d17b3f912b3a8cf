//! Configuration: product list + credentials from YAML, runtime knobs from env
//!
//! The YAML file defaults to `~/.overmind/config.yaml` and can be moved with
//! `--config <path>` or `OVERMIND_CONFIG`. Values written exactly as `${VAR}`
//! are replaced with the environment variable (empty when unset).

use crate::types::Product;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    /// Home directory could not be resolved for a default path
    MissingHome,
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_yaml::Error },
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingHome => write!(f, "config: cannot resolve home directory"),
            ConfigError::Read { path, source } => {
                write!(f, "config: read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "config: parse {}: {}", path.display(), source)
            }
            ConfigError::Invalid(msg) => write!(f, "config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub products: Vec<ProductConfig>,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub stripe: StripeProductConfig,
    #[serde(default)]
    pub posthog: PostHogProductConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeProductConfig {
    #[serde(default)]
    pub product_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostHogProductConfig {
    /// e.g. "chrondle.app"
    #[serde(default)]
    pub host_filter: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub stripe: StripeCredentials,
    #[serde(default)]
    pub posthog: PostHogCredentials,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeCredentials {
    #[serde(default)]
    pub secret_key: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostHogCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub host: String,
}

impl FileConfig {
    /// Load, expand and validate the YAML config at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&data).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        log::info!("Loaded {} products from {}", config.products.len(), path.display());
        Ok(config)
    }

    /// Parse YAML text, expand `${VAR}` credentials and validate
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: FileConfig =
            serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?;

        let creds = &mut config.credentials;
        creds.stripe.secret_key = expand_env_value(&creds.stripe.secret_key);
        creds.posthog.api_key = expand_env_value(&creds.posthog.api_key);
        creds.posthog.project_id = expand_env_value(&creds.posthog.project_id);
        creds.posthog.host = expand_env_value(&creds.posthog.host);

        config.validate()?;
        config.warn_if_empty_credentials();
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.products.is_empty() {
            return Err(ConfigError::Invalid("no products defined".to_string()));
        }

        let mut seen = HashSet::new();
        for (i, product) in self.products.iter().enumerate() {
            if product.name.is_empty() {
                return Err(ConfigError::Invalid(format!("products[{}] missing name", i)));
            }
            if product.domain.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "product {:?} missing domain",
                    product.name
                )));
            }
            if !seen.insert(product.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate product name {:?}",
                    product.name
                )));
            }
        }

        Ok(())
    }

    fn warn_if_empty_credentials(&self) {
        if self.credentials.stripe.secret_key.is_empty() {
            log::warn!("config: stripe secret_key is empty, revenue disabled");
        }
        if self.credentials.posthog.api_key.is_empty() {
            log::warn!("config: posthog api_key is empty, analytics disabled");
        }
    }

    pub fn to_products(&self) -> Vec<Product> {
        self.products
            .iter()
            .map(|p| {
                Product::new(&p.name, &p.domain)
                    .with_billing_product(&p.stripe.product_id)
                    .with_analytics_host(&p.posthog.host_filter)
            })
            .collect()
    }
}

/// Replace a value of the exact form `${VAR}` with the variable's value
pub fn expand_env_value(value: &str) -> String {
    match value.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(key) if !key.is_empty() => env::var(key).unwrap_or_default(),
        _ => value.to_string(),
    }
}

fn overmind_home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(".overmind"))
        .ok_or(ConfigError::MissingHome)
}

/// `OVERMIND_CONFIG` or `~/.overmind/config.yaml`
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = env::var("OVERMIND_CONFIG") {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(overmind_home()?.join("config.yaml"))
}

/// Trend window from its raw env value, clamped to `1..=MAX_TREND_DAYS`
fn parse_trend_days(raw: Option<&str>) -> i64 {
    let Some(days) = raw.and_then(|s| s.trim().parse::<i64>().ok()) else {
        return crate::trend::DEFAULT_TREND_DAYS;
    };
    let clamped = crate::trend::clamp_trend_days(days);
    if clamped != days {
        log::warn!("OVERMIND_TREND_DAYS={} out of range, using {}", days, clamped);
    }
    clamped
}

/// Runtime knobs loaded from environment variables with defaults
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// SQLite metrics cache
    pub db_path: PathBuf,
    /// Deadline for one refresh
    pub refresh_timeout: Duration,
    /// Days in the visit trend
    pub trend_days: i64,
    /// Periodic refresh, `None` when disabled
    pub auto_refresh: Option<Duration>,
    /// Log file used while the dashboard owns the terminal
    pub log_path: PathBuf,
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `OVERMIND_DB_PATH` (default: ~/.overmind/cache/metrics.db)
    /// - `OVERMIND_REFRESH_TIMEOUT_SECS` (default: 30)
    /// - `OVERMIND_TREND_DAYS` (default: 7, clamped to 1..=365)
    /// - `OVERMIND_AUTO_REFRESH_SECS` (default: 300, 0 disables)
    /// - `OVERMIND_LOG_PATH` (default: ~/.overmind/overmind.log)
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = match env::var("OVERMIND_DB_PATH") {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => overmind_home()?.join("cache").join("metrics.db"),
        };

        let log_path = match env::var("OVERMIND_LOG_PATH") {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => overmind_home()?.join("overmind.log"),
        };

        let refresh_timeout_secs: u64 = env::var("OVERMIND_REFRESH_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let trend_days = parse_trend_days(env::var("OVERMIND_TREND_DAYS").ok().as_deref());

        let auto_refresh_secs: u64 = env::var("OVERMIND_AUTO_REFRESH_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);

        Ok(Self {
            db_path,
            refresh_timeout: Duration::from_secs(refresh_timeout_secs.max(1)),
            trend_days,
            auto_refresh: (auto_refresh_secs > 0).then(|| Duration::from_secs(auto_refresh_secs)),
            log_path,
        })
    }
}
