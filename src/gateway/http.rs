//! REST client for a HubSpot-style CRM API.
//!
//! Uses reqwest with Bearer token auth. Requests answered with 429 are
//! retried after the server's `Retry-After` delay (or an exponential backoff
//! when the header is missing), up to `max_retries` times.

use super::CrmGateway;
use crate::config::CrmConfig;
use crate::entities::{Entity, FilterGroup, SearchPage, SearchQuery};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const ASSOCIATION_PAGE_LIMIT: usize = 500;
/// Upper bound on association pages read for one record.
const MAX_ASSOCIATION_PAGES: usize = 20;

#[derive(Debug, Deserialize)]
struct NextPage {
    after: String,
}

#[derive(Debug, Default, Deserialize)]
struct Paging {
    next: Option<NextPage>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    results: Vec<Entity>,
    #[serde(default)]
    paging: Option<Paging>,
}

impl From<SearchResponse> for SearchPage {
    fn from(value: SearchResponse) -> Self {
        Self {
            results: value.results,
            total: value.total,
            next_cursor: value.paging.and_then(|p| p.next).map(|n| n.after),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    results: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssociationRow {
    to_object_id: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AssociationResponse {
    #[serde(default)]
    results: Vec<AssociationRow>,
    #[serde(default)]
    paging: Option<Paging>,
}

/// CRM gateway backed by the CRM's REST API.
pub struct HttpCrmGateway {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    max_retries: u32,
}

impl HttpCrmGateway {
    /// Builds a gateway from connection settings.
    ///
    /// # Errors
    /// Returns `Error::Transport` if the HTTP client cannot be built.
    pub fn new(config: &CrmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            max_retries: config.max_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request built by `build`, retrying on 429.
    ///
    /// Returns `Ok(None)` on 404 so callers decide whether absence is an error.
    async fn send<T, F>(&self, build: F) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let resp = build().bearer_auth(&self.access_token).send().await?;
            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt > self.max_retries {
                    return Err(Error::RateLimited { attempts: attempt });
                }
                let wait = parse_retry_after(resp.headers()).unwrap_or_else(|| backoff_delay(attempt));
                warn!(
                    "CRM rate limit hit (attempt {}), retrying in {:?}",
                    attempt, wait
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                let text = resp.text().await.unwrap_or_default();
                return Err(Error::Authorization {
                    message: format!("{status}: {text}"),
                });
            }

            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(Error::Transport {
                    message: format!("CRM API error {status}: {text}"),
                });
            }

            return Ok(Some(resp.json::<T>().await?));
        }
    }

    async fn send_required<T, F>(&self, what: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        self.send(build).await?.ok_or_else(|| Error::Transport {
            message: format!("{what}: endpoint not found"),
        })
    }
}

/// Reads a `Retry-After` header given in seconds.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// 500 ms, 1 s, 2 s, ... capped at 8 s.
fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(4);
    Duration::from_millis(500 * (1_u64 << exponent))
}

fn search_body(query: &SearchQuery) -> serde_json::Value {
    let mut body = serde_json::json!({
        "filterGroups": query.filter_groups,
        "properties": query.properties,
        "limit": query.limit,
    });
    if let (Some(after), Some(map)) = (&query.after, body.as_object_mut()) {
        map.insert("after".to_string(), serde_json::Value::String(after.clone()));
    }
    body
}

fn association_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[async_trait]
impl CrmGateway for HttpCrmGateway {
    async fn search(&self, query: &SearchQuery) -> Result<SearchPage> {
        let url = self.url(&format!("/crm/v3/objects/{}/search", query.object_type));
        let body = search_body(query);
        debug!("CRM search {} after {:?}", query.object_type, query.after);
        let resp: SearchResponse = self
            .send_required("search", || self.client.post(&url).json(&body))
            .await?;
        Ok(resp.into())
    }

    async fn count(&self, object_type: &str, filters: &[FilterGroup]) -> Result<u64> {
        let mut query = SearchQuery::new(object_type, 1);
        query.filter_groups = filters.to_vec();
        Ok(self.search(&query).await?.total)
    }

    async fn batch_get_by_ids(
        &self,
        object_type: &str,
        ids: &[String],
        properties: &[String],
    ) -> Result<Vec<Entity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url(&format!("/crm/v3/objects/{object_type}/batch/read"));
        let inputs: Vec<serde_json::Value> = ids
            .iter()
            .map(|id| serde_json::json!({ "id": id }))
            .collect();
        let body = serde_json::json!({ "properties": properties, "inputs": inputs });
        let resp: BatchResponse = self
            .send_required("batch read", || self.client.post(&url).json(&body))
            .await?;
        Ok(resp.results)
    }

    async fn get_by_id(
        &self,
        object_type: &str,
        id: &str,
        properties: &[String],
    ) -> Result<Option<Entity>> {
        let url = self.url(&format!("/crm/v3/objects/{object_type}/{id}"));
        let props = properties.join(",");
        self.send(|| self.client.get(&url).query(&[("properties", props.as_str())]))
            .await
    }

    async fn associated_ids(&self, from_type: &str, id: &str, to_type: &str) -> Result<Vec<String>> {
        let url = self.url(&format!(
            "/crm/v4/objects/{from_type}/{id}/associations/{to_type}"
        ));
        let limit = ASSOCIATION_PAGE_LIMIT.to_string();
        collect_association_pages(|after| {
            let mut params = vec![("limit", limit.clone())];
            if let Some(cursor) = after {
                params.push(("after", cursor));
            }
            let url = &url;
            async move { self.send(|| self.client.get(url).query(&params)).await }
        })
        .await
    }
}

/// Follows association cursors until the last page, a 404, or the page cap.
async fn collect_association_pages<F, Fut>(mut fetch: F) -> Result<Vec<String>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Option<AssociationResponse>>>,
{
    let mut ids = Vec::new();
    let mut after: Option<String> = None;
    for _ in 0..MAX_ASSOCIATION_PAGES {
        let Some(page) = fetch(after.take()).await? else {
            return Ok(ids);
        };
        ids.extend(page.results.iter().filter_map(|row| association_id(&row.to_object_id)));
        after = page.paging.and_then(|p| p.next).map(|n| n.after);
        if after.is_none() {
            return Ok(ids);
        }
    }
    warn!(
        pages = MAX_ASSOCIATION_PAGES,
        collected = ids.len(),
        "Association listing stopped at the page cap"
    );
    Ok(ids)
}
