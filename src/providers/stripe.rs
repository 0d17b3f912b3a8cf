//! Stripe revenue provider
//!
//! Sums active subscription items for one product, normalised to a monthly amount.
//!
//! ## API Reference
//!
//! Endpoint: https://api.stripe.com/v1/subscriptions?status=active&limit=100
//! Auth: basic, secret key as the username
//! Pagination: `starting_after=<last subscription id>` while `has_more`

use super::{error_body, ProviderError, RevenueProvider};
use crate::types::Revenue;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

const STRIPE_BASE_URL: &str = "https://api.stripe.com/v1";

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionList {
    pub data: Vec<Subscription>,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub items: SubscriptionItems,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItems {
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    pub price: Price,
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    pub product: String,
    pub unit_amount: Option<i64>,
    pub recurring: Option<Recurring>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Recurring {
    /// day, week, month, quarter or year
    pub interval: String,
}

pub struct StripeClient {
    secret_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl StripeClient {
    pub fn new(secret_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            secret_key: secret_key.into(),
            base_url: STRIPE_BASE_URL.to_string(),
            client,
        })
    }

    /// Point the client at a different API root (mock servers)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_page(&self, starting_after: Option<&str>) -> Result<SubscriptionList, ProviderError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("status", "active"),
            ("limit", "100"),
            ("expand[]", "data.items.data.price"),
        ];
        if let Some(id) = starting_after {
            query.push(("starting_after", id));
        }

        let response = self
            .client
            .get(format!("{}/subscriptions", self.base_url))
            .basic_auth(&self.secret_key, Some(""))
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            let code = response.status().as_u16();
            return Err(ProviderError::Status {
                code,
                body: error_body(response).await,
            });
        }

        response
            .json::<SubscriptionList>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

/// Normalise one line item to a monthly amount
///
/// Integer division, matching how the billing dashboard rounds.
pub fn monthly_amount(unit_amount: i64, quantity: i64, interval: Option<&str>) -> i64 {
    let amount = unit_amount * quantity;
    match interval {
        Some("year") => amount / 12,
        Some("quarter") => amount / 3,
        Some("week") => amount * 52 / 12,
        Some("day") => amount * 365 / 12,
        _ => amount,
    }
}

/// Fold one page into the running MRR and subscriber set
pub fn accumulate_page(
    page: &SubscriptionList,
    product_id: &str,
    mrr: &mut i64,
    subscribers: &mut HashSet<String>,
) {
    for sub in &page.data {
        let mut matched = false;
        for item in &sub.items.data {
            if item.price.product != product_id {
                continue;
            }
            let Some(unit_amount) = item.price.unit_amount else {
                continue;
            };
            let interval = item.price.recurring.as_ref().map(|r| r.interval.as_str());
            *mrr += monthly_amount(unit_amount, item.quantity.unwrap_or(1), interval);
            matched = true;
        }
        if matched {
            subscribers.insert(sub.id.clone());
        }
    }
}

#[async_trait]
impl RevenueProvider for StripeClient {
    fn name(&self) -> &'static str {
        "Stripe"
    }

    async fn recurring_revenue(&self, billing_product_id: &str) -> Result<Revenue, ProviderError> {
        if billing_product_id.is_empty() {
            return Err(ProviderError::InvalidInput("product id is empty".to_string()));
        }

        let mut mrr = 0i64;
        let mut subscribers = HashSet::new();
        let mut starting_after: Option<String> = None;

        loop {
            let page = self.fetch_page(starting_after.as_deref()).await?;
            accumulate_page(&page, billing_product_id, &mut mrr, &mut subscribers);

            if !page.has_more {
                break;
            }
            let last_id = match page.data.last() {
                Some(sub) => sub.id.clone(),
                None => {
                    return Err(ProviderError::Pagination("empty page with has_more".to_string()))
                }
            };
            if last_id.is_empty() {
                return Err(ProviderError::Pagination("missing last id".to_string()));
            }
            log::debug!("Stripe: fetching next page after {}", last_id);
            starting_after = Some(last_id);
        }

        Ok(Revenue {
            mrr,
            subscribers: subscribers.len() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(json: &str) -> SubscriptionList {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_monthly_normalisation() {
        assert_eq!(monthly_amount(1200, 1, Some("year")), 100);
        assert_eq!(monthly_amount(900, 1, Some("quarter")), 300);
        assert_eq!(monthly_amount(100, 1, Some("week")), 433);
        assert_eq!(monthly_amount(10, 1, Some("day")), 304);
        assert_eq!(monthly_amount(500, 2, Some("month")), 1000);
        assert_eq!(monthly_amount(500, 1, None), 500);
    }

    #[test]
    fn test_accumulate_filters_by_product() {
        let list = page(
            r#"{
                "has_more": false,
                "data": [
                    {"id": "sub_1", "items": {"data": [
                        {"price": {"product": "prod_a", "unit_amount": 1000, "recurring": {"interval": "month"}}, "quantity": 2},
                        {"price": {"product": "prod_b", "unit_amount": 5000, "recurring": {"interval": "month"}}, "quantity": 1}
                    ]}},
                    {"id": "sub_2", "items": {"data": [
                        {"price": {"product": "prod_a", "unit_amount": 12000, "recurring": {"interval": "year"}}, "quantity": null}
                    ]}},
                    {"id": "sub_3", "items": {"data": [
                        {"price": {"product": "prod_a", "unit_amount": null, "recurring": null}, "quantity": 1}
                    ]}}
                ]
            }"#,
        );

        let mut mrr = 0;
        let mut subs = HashSet::new();
        accumulate_page(&list, "prod_a", &mut mrr, &mut subs);

        assert_eq!(mrr, 2000 + 1000);
        assert_eq!(subs.len(), 2);
        assert!(!subs.contains("sub_3"));
    }

    #[tokio::test]
    async fn test_empty_product_id_rejected() {
        let client = StripeClient::new("sk_test").unwrap();
        let err = client.recurring_revenue("").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidInput(_)));
    }
}
