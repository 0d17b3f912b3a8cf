//! PostHog analytics provider
//!
//! Counts `$pageview` events and distinct visitors for a host filter via HogQL.
//!
//! ## API Reference
//!
//! Endpoint: `{host}/api/projects/{project_id}/query/` (POST)
//! Auth: `Authorization: Bearer <personal api key>`
//! Returns: `{"results": [[pageviews, visitors]]}`

use super::{error_body, ProviderError, TrafficProvider};
use crate::types::Traffic;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_POSTHOG_HOST: &str = "https://us.i.posthog.com";

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<Vec<serde_json::Value>>,
}

pub struct PostHogClient {
    api_key: String,
    project_id: String,
    host: String,
    client: reqwest::Client,
}

impl PostHogClient {
    pub fn new(
        api_key: impl Into<String>,
        project_id: impl Into<String>,
        host: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let mut host = host.into();
        if host.is_empty() {
            host = DEFAULT_POSTHOG_HOST.to_string();
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            host: host.trim_end_matches('/').to_string(),
            client,
        })
    }
}

/// Escape a value for a ClickHouse LIKE pattern inside a quoted literal
///
/// Backslash first, then the quote and the wildcards.
pub fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub fn build_query(host_filter: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> String {
    const FMT: &str = "%Y-%m-%d %H:%M:%S";
    format!(
        "SELECT count() AS pageviews, count(DISTINCT distinct_id) AS visitors \
         FROM events \
         WHERE event = '$pageview' \
         AND properties.$host LIKE '%{}%' \
         AND timestamp >= toDateTime('{}') \
         AND timestamp <= toDateTime('{}')",
        escape_like(host_filter),
        from.format(FMT),
        to.format(FMT),
    )
}

/// Pull `[pageviews, visitors]` out of the first result row; short rows read as zero
pub fn parse_traffic(response: &QueryResponse) -> Traffic {
    let Some(row) = response.results.first() else {
        return Traffic::default();
    };
    if row.len() < 2 {
        return Traffic::default();
    }
    let as_count = |v: &serde_json::Value| v.as_f64().map(|f| f as i64).unwrap_or(0);
    Traffic {
        pageviews: as_count(&row[0]),
        visitors: as_count(&row[1]),
    }
}

#[async_trait]
impl TrafficProvider for PostHogClient {
    fn name(&self) -> &'static str {
        "PostHog"
    }

    async fn traffic(
        &self,
        host_filter: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Traffic, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::InvalidInput("api key is empty".to_string()));
        }

        let body = json!({
            "query": {
                "kind": "HogQLQuery",
                "query": build_query(host_filter, from, to),
            }
        });

        let url = format!("{}/api/projects/{}/query/", self.host, self.project_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let code = response.status().as_u16();
            return Err(ProviderError::Status {
                code,
                body: error_body(response).await,
            });
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(parse_traffic(&parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("example.com"), "example.com");
        assert_eq!(escape_like("my_site"), "my\\_site");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
        // Backslash escaped before wildcards, so no double escaping
        assert_eq!(escape_like("\\%"), "\\\\\\%");
    }

    #[test]
    fn test_query_formats_utc_bounds() {
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 8, 12, 30, 5).unwrap();
        let query = build_query("my_site.app", from, to);
        assert!(query.contains("LIKE '%my\\_site.app%'"));
        assert!(query.contains("toDateTime('2024-01-01 00:00:00')"));
        assert!(query.contains("toDateTime('2024-01-08 12:30:05')"));
    }

    #[test]
    fn test_quote_in_host_stays_inside_literal() {
        assert_eq!(escape_like("it's"), "it\\'s");

        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        let query = build_query("x' OR 1=1 --", from, to);
        assert!(query.contains("LIKE '%x\\' OR 1=1 --%'"), "{}", query);
        assert!(!query.contains("LIKE '%x' OR"));
    }

    #[test]
    fn test_parse_traffic() {
        let full: QueryResponse = serde_json::from_str(r#"{"results": [[1234, 56]]}"#).unwrap();
        assert_eq!(parse_traffic(&full), Traffic { pageviews: 1234, visitors: 56 });

        let short: QueryResponse = serde_json::from_str(r#"{"results": [[7]]}"#).unwrap();
        assert_eq!(parse_traffic(&short), Traffic::default());

        let empty: QueryResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(parse_traffic(&empty), Traffic::default());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = PostHogClient::new("", "1", "").unwrap();
        let now = Utc::now();
        let err = client.traffic("a.app", now, now).await.unwrap_err();
        assert!(err.to_string().contains("api key is empty"));
    }
}
