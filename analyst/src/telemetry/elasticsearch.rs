//! Elasticsearch over HTTP.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{
    AggregationRequest, ColumnarResponse, Document, GroupBucket, SearchRequest, StoreError,
    TelemetryStore, TermCount,
};
use crate::config::TelemetryConfig;

pub struct ElasticsearchStore {
    client: Client,
    base_url: Url,
    auth: Option<(String, String)>,
}

impl ElasticsearchStore {
    pub fn new(config: &TelemetryConfig) -> Result<Self, StoreError> {
        let mut base_url = Url::parse(&config.url)
            .map_err(|e| StoreError::Http(format!("invalid Elasticsearch URL {}: {}", config.url, e)))?;
        // Url::join drops the last path segment unless the base ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| StoreError::Http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            auth: config
                .basic_auth()
                .map(|(u, p)| (u.to_string(), p.to_string())),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn post(&self, path: &str) -> Result<RequestBuilder, StoreError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| StoreError::Http(format!("invalid request path {}: {}", path, e)))?;
        let builder = self.client.post(url);
        Ok(match &self.auth {
            Some((user, pass)) => builder.basic_auth(user, Some(pass)),
            None => builder,
        })
    }

    async fn send_json(&self, path: &str, body: &Value) -> Result<Value, StoreError> {
        debug!(path, "elasticsearch request");
        let response = self
            .post(path)?
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// Overloaded or shard-less clusters (5xx, 429) count as unreachable.
fn status_error(status: StatusCode, body: String) -> StoreError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Unavailable(format!("status {}: {}", status.as_u16(), body))
    } else {
        StoreError::Query {
            status: status.as_u16(),
            body,
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> StoreError {
    if e.is_connect() || e.is_timeout() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Http(e.to_string())
    }
}

fn parse_buckets(resp: &Value) -> Vec<GroupBucket> {
    let buckets = resp
        .pointer("/aggregations/by_group/buckets")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    buckets
        .iter()
        .map(|b| GroupBucket {
            key: key_string(b.get("key")),
            doc_count: b.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
            avg: b.pointer("/avg_value/value").and_then(Value::as_f64),
            nested: b
                .pointer("/by_nested/buckets")
                .and_then(Value::as_array)
                .map(|inner| {
                    inner
                        .iter()
                        .map(|r| TermCount {
                            key: key_string(r.get("key")),
                            doc_count: r.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
        .collect()
}

fn key_string(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl TelemetryStore for ElasticsearchStore {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn esql(&self, query: &str) -> Result<ColumnarResponse, StoreError> {
        let resp = self.send_json("_query", &json!({ "query": query })).await?;
        serde_json::from_value(resp).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Document>, StoreError> {
        let path = format!("{}/_search", request.index);
        let resp = self.send_json(&path, &request.body()).await?;
        let hits = resp
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .ok_or_else(|| StoreError::Decode("search response has no hits.hits".to_string()))?;
        Ok(hits
            .iter()
            .filter_map(|h| h.get("_source").and_then(Value::as_object).cloned())
            .collect())
    }

    async fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<GroupBucket>, StoreError> {
        let path = format!("{}/_search", request.index);
        let resp = self.send_json(&path, &request.body()).await?;
        Ok(parse_buckets(&resp))
    }

    async fn index(&self, index: &str, document: &Value) -> Result<(), StoreError> {
        let path = format!("{}/_doc", index);
        self.send_json(&path, document).await.map(|_| ())
    }
}
