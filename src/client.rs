use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::Value;

use crate::error::FetchError;
use crate::types::Resource;

/// Cap on upstream error bodies carried into log lines.
const ERROR_BODY_MAX: usize = 200;

/// Read access to the upstream game API. One call fetches one batch of raw
/// JSON payloads; the mapper turns them into entities. Stateless, no retries
/// — retry policy belongs to the pollers.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Fetch one batch of `resource` payloads, bounded to records strictly
    /// newer than `since` when the resource supports a cursor. An empty
    /// batch means no further records.
    async fn fetch_batch(
        &self,
        resource: Resource,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, FetchError>;
}

pub struct HttpApiClient {
    client: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl HttpApiClient {
    pub fn new(
        base_url: impl Into<String>,
        page_size: usize,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_size,
        })
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn fetch_batch(
        &self,
        resource: Resource,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Value>, FetchError> {
        let url = batch_url(&self.base_url, resource, since, self.page_size);

        // Transport-level failures (timeout, DNS, reset) surface here.
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message: String = body.chars().take(ERROR_BODY_MAX).collect();
            return Err(FetchError::Upstream { status: status.as_u16(), message });
        }

        let body: Value = resp.json().await.map_err(|e| FetchError::Upstream {
            status: status.as_u16(),
            message: format!("undecodable JSON body: {e}"),
        })?;

        match resource {
            Resource::Matches => body.as_array().cloned().ok_or(FetchError::Upstream {
                status: status.as_u16(),
                message: "/matches response was not an array".to_string(),
            }),
            Resource::MarketItems => body
                .get("items")
                .and_then(|i| i.as_array())
                .cloned()
                .ok_or(FetchError::Upstream {
                    status: status.as_u16(),
                    message: "/market/items response had no `items` array".to_string(),
                }),
        }
    }
}

/// Build the request URL for one batch. Matches are paged by an `after`
/// cursor in epoch millis; the market catalog is always a full snapshot.
fn batch_url(
    base: &str,
    resource: Resource,
    since: Option<DateTime<Utc>>,
    page_size: usize,
) -> String {
    match resource {
        Resource::Matches => {
            let mut url = format!("{base}/matches?limit={page_size}");
            if let Some(cursor) = since {
                url.push_str(&format!("&after={}", cursor.timestamp_millis()));
            }
            url
        }
        Resource::MarketItems => format!("{base}/market/items"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn match_url_without_cursor() {
        let url = batch_url("https://api.test/v1", Resource::Matches, None, 100);
        assert_eq!(url, "https://api.test/v1/matches?limit=100");
    }

    #[test]
    fn match_url_with_cursor_in_millis() {
        let since = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap();
        let url = batch_url("https://api.test/v1", Resource::Matches, Some(since), 50);
        assert_eq!(
            url,
            format!(
                "https://api.test/v1/matches?limit=50&after={}",
                since.timestamp_millis()
            )
        );
    }

    #[test]
    fn market_url_ignores_cursor() {
        let since = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap();
        let url = batch_url("https://api.test/v1", Resource::MarketItems, Some(since), 100);
        assert_eq!(url, "https://api.test/v1/market/items");
    }
}
