//! Telemetry store abstraction.
//!
//! Responsibilities:
//! - Define the storage-agnostic API the tool adapters run against: ES|QL
//!   queries, structured searches, URL aggregations, document indexing.
//! - Describe requests as plain data ([`SearchRequest`], [`AggregationRequest`])
//!   so HTTP and in-memory backends evaluate the same clauses.
//!
//! `StoreError::Unavailable` means the backend could not be reached, is
//! overloaded (5xx, 429) or is disabled. Callers treat it as "no data".
//! Every other error means the backend answered and something was wrong with
//! the request or the reply.

pub mod elasticsearch;
pub mod memory;

pub use elasticsearch::ElasticsearchStore;
pub use memory::InMemoryTelemetryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// One stored record, as returned in a search hit's `_source`.
pub type Document = Map<String, Value>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Telemetry store unavailable: {0}")]
    Unavailable(String),

    #[error("Telemetry store rejected request (status {status}): {body}")]
    Query { status: u16, body: String },

    #[error("Unexpected telemetry store response: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
        }
    }
}

/// ES|QL reply: column descriptors plus positional value rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnarResponse {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl ColumnarResponse {
    pub fn new(columns: &[&str], values: Vec<Vec<Value>>) -> Self {
        Self {
            columns: columns.iter().map(|c| Column::new(*c)).collect(),
            values,
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Zip column names with each value row. Short rows pad with null.
    pub fn rows(&self) -> Vec<Document> {
        self.values
            .iter()
            .map(|vals| {
                self.columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| (col.name.clone(), vals.get(i).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect()
    }
}

/// A must-clause of a boolean query.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Term { field: String, value: Value },
    Terms { field: String, values: Vec<Value> },
    /// `*` is the only wildcard.
    Wildcard { field: String, pattern: String },
    /// Bounds are ISO timestamps or date math such as `now-7d`.
    Range {
        field: String,
        gte: Option<String>,
        lt: Option<String>,
    },
}

impl Clause {
    pub fn term(field: &str, value: impl Into<Value>) -> Self {
        Clause::Term {
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn terms(field: &str, values: Vec<Value>) -> Self {
        Clause::Terms {
            field: field.to_string(),
            values,
        }
    }

    pub fn contains(field: &str, needle: &str) -> Self {
        Clause::Wildcard {
            field: field.to_string(),
            pattern: format!("*{}*", needle),
        }
    }

    pub fn to_query_dsl(&self) -> Value {
        match self {
            Clause::Term { field, value } => json!({"term": {field: value}}),
            Clause::Terms { field, values } => json!({"terms": {field: values}}),
            Clause::Wildcard { field, pattern } => json!({"wildcard": {field: pattern}}),
            Clause::Range { field, gte, lt } => {
                let mut bounds = Map::new();
                if let Some(g) = gte {
                    bounds.insert("gte".to_string(), Value::String(g.clone()));
                }
                if let Some(l) = lt {
                    bounds.insert("lt".to_string(), Value::String(l.clone()));
                }
                json!({"range": {field: bounds}})
            }
        }
    }
}

/// `bool.must` over the clauses, or `match_all` when there are none.
pub fn bool_query(must: &[Clause]) -> Value {
    if must.is_empty() {
        json!({"match_all": {}})
    } else {
        let clauses: Vec<Value> = must.iter().map(Clause::to_query_dsl).collect();
        json!({"bool": {"must": clauses}})
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

impl SortKey {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            order: SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    pub must: Vec<Clause>,
    pub sort: Vec<SortKey>,
    pub size: u32,
}

impl SearchRequest {
    pub fn body(&self) -> Value {
        let sort: Vec<Value> = self
            .sort
            .iter()
            .map(|k| json!({ k.field.as_str(): k.order.as_str() }))
            .collect();
        json!({
            "size": self.size,
            "query": bool_query(&self.must),
            "sort": sort,
            "_source": true,
        })
    }
}

/// Group matching documents by one field, with a nested breakdown by a second
/// field and the average of a numeric field per group.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRequest {
    pub index: String,
    pub must: Vec<Clause>,
    pub group_field: String,
    pub size: u32,
    pub nested_field: String,
    pub nested_size: u32,
    pub avg_field: String,
}

impl AggregationRequest {
    pub fn body(&self) -> Value {
        json!({
            "size": 0,
            "query": bool_query(&self.must),
            "aggs": {
                "by_group": {
                    "terms": {
                        "field": self.group_field,
                        "size": self.size,
                        "order": {"_count": "desc"}
                    },
                    "aggs": {
                        "by_nested": {"terms": {"field": self.nested_field, "size": self.nested_size}},
                        "avg_value": {"avg": {"field": self.avg_field}}
                    }
                }
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermCount {
    pub key: String,
    pub doc_count: u64,
}

/// One group of an [`AggregationRequest`] reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBucket {
    pub key: String,
    pub doc_count: u64,
    pub avg: Option<f64>,
    pub nested: Vec<TermCount>,
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    async fn esql(&self, query: &str) -> Result<ColumnarResponse, StoreError>;

    /// Hit sources in the requested order.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<Document>, StoreError>;

    async fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<GroupBucket>, StoreError>;

    async fn index(&self, index: &str, document: &Value) -> Result<(), StoreError>;
}

/// Backend used when telemetry is switched off: reads are unavailable and
/// writes are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledTelemetryStore;

#[async_trait]
impl TelemetryStore for DisabledTelemetryStore {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn esql(&self, _query: &str) -> Result<ColumnarResponse, StoreError> {
        Err(StoreError::Unavailable("telemetry disabled".to_string()))
    }

    async fn search(&self, _request: &SearchRequest) -> Result<Vec<Document>, StoreError> {
        Err(StoreError::Unavailable("telemetry disabled".to_string()))
    }

    async fn aggregate(&self, _request: &AggregationRequest) -> Result<Vec<GroupBucket>, StoreError> {
        Err(StoreError::Unavailable("telemetry disabled".to_string()))
    }

    async fn index(&self, _index: &str, _document: &Value) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rows_zip_and_pad_with_null() {
        let resp = ColumnarResponse::new(
            &["day", "task", "fails"],
            vec![
                vec![json!("2024-01-01"), json!("refund"), json!(4)],
                vec![json!("2024-01-02")],
            ],
        );
        let rows = resp.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["fails"], json!(4));
        assert_eq!(rows[1]["task"], Value::Null);
        assert_eq!(rows[1]["fails"], Value::Null);
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_search_body() {
        let req = SearchRequest {
            index: "agent_steps-*".to_string(),
            must: vec![Clause::term("status", "fail"), Clause::contains("url", "refund")],
            sort: vec![SortKey::asc("run_id"), SortKey::asc("step_num")],
            size: 50,
        };
        assert_eq!(
            req.body(),
            json!({
                "size": 50,
                "query": {"bool": {"must": [
                    {"term": {"status": "fail"}},
                    {"wildcard": {"url": "*refund*"}}
                ]}},
                "sort": [{"run_id": "asc"}, {"step_num": "asc"}],
                "_source": true
            })
        );
    }

    #[test]
    fn test_empty_must_is_match_all() {
        assert_eq!(bool_query(&[]), json!({"match_all": {}}));
    }

    #[test]
    fn test_range_clause_skips_missing_bounds() {
        let clause = Clause::Range {
            field: "ts".to_string(),
            gte: Some("now-7d".to_string()),
            lt: None,
        };
        assert_eq!(clause.to_query_dsl(), json!({"range": {"ts": {"gte": "now-7d"}}}));
    }

    #[tokio::test]
    async fn test_disabled_store() {
        let store = DisabledTelemetryStore;
        assert!(store.esql("FROM x").await.unwrap_err().is_unavailable());
        assert!(store.index("agent_audit-2024.01.01", &json!({})).await.is_ok());
    }
}
