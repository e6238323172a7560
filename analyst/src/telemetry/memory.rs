//! In-memory telemetry store.
//!
//! Searches and aggregations are evaluated locally over a vector of step
//! documents. ES|QL is not interpreted: queries are answered from canned
//! responses keyed by a substring of the query text, and any other query is
//! reported as unavailable. Indexed documents are kept for inspection.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use std::cmp::Ordering;
use std::path::Path;
use std::sync::RwLock;

use super::{
    AggregationRequest, Clause, ColumnarResponse, Document, GroupBucket, SearchRequest,
    SortOrder, StoreError, TelemetryStore, TermCount,
};
use crate::queries::RelativeWindow;

#[derive(Default)]
pub struct InMemoryTelemetryStore {
    documents: Vec<Document>,
    canned: Vec<(String, ColumnarResponse)>,
    offline: bool,
    indexed: RwLock<Vec<(String, Value)>>,
    queries: RwLock<Vec<String>>,
}

impl InMemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(mut self, documents: Vec<Document>) -> Self {
        self.documents = documents;
        self
    }

    /// Answer any ES|QL query whose text contains `needle`.
    pub fn with_esql_response(mut self, needle: impl Into<String>, response: ColumnarResponse) -> Self {
        self.canned.push((needle.into(), response));
        self
    }

    /// Every call fails with `StoreError::Unavailable`.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// One JSON object per line; blank lines are skipped.
    pub fn from_jsonl_str(content: &str) -> Result<Self, StoreError> {
        let mut documents = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line)
                .map_err(|e| StoreError::Decode(format!("line {}: {}", lineno + 1, e)))?;
            match value {
                Value::Object(doc) => documents.push(doc),
                _ => {
                    return Err(StoreError::Decode(format!(
                        "line {}: expected a JSON object",
                        lineno + 1
                    )))
                }
            }
        }
        Ok(Self::new().with_documents(documents))
    }

    pub fn from_jsonl_path<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Self::from_jsonl_str(&content)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// `(index, document)` pairs written through [`TelemetryStore::index`].
    pub fn indexed_documents(&self) -> Vec<(String, Value)> {
        self.indexed.read().map(|g| g.clone()).unwrap_or_default()
    }

    /// ES|QL texts received, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.queries.read().map(|g| g.clone()).unwrap_or_default()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Unavailable("in-memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn matching<'a>(&'a self, must: &'a [Clause]) -> impl Iterator<Item = &'a Document> + 'a {
        let now = Utc::now();
        self.documents
            .iter()
            .filter(move |doc| must.iter().all(|c| clause_matches(c, doc, now)))
    }
}

fn field_name(field: &str) -> &str {
    field.strip_suffix(".keyword").unwrap_or(field)
}

fn clause_matches(clause: &Clause, doc: &Document, now: DateTime<Utc>) -> bool {
    match clause {
        Clause::Term { field, value } => doc.get(field_name(field)) == Some(value),
        Clause::Terms { field, values } => doc
            .get(field_name(field))
            .map_or(false, |v| values.contains(v)),
        Clause::Wildcard { field, pattern } => doc
            .get(field_name(field))
            .and_then(Value::as_str)
            .map_or(false, |s| wildcard_match(pattern, s)),
        Clause::Range { field, gte, lt } => {
            let Some(ts) = doc
                .get(field_name(field))
                .and_then(Value::as_str)
                .and_then(parse_instant)
            else {
                return false;
            };
            let lower_ok = gte
                .as_deref()
                .and_then(|b| resolve_bound(b, now))
                .map_or(true, |b| ts >= b);
            let upper_ok = lt
                .as_deref()
                .and_then(|b| resolve_bound(b, now))
                .map_or(true, |b| ts < b);
            lower_ok && upper_ok
        }
    }
}

fn wildcard_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == text;
    }
    let (first, last) = (parts[0], parts[parts.len() - 1]);
    if !text.starts_with(first) || !text[first.len()..].ends_with(last) {
        return false;
    }
    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// `now-7d` style date math or an absolute timestamp.
fn resolve_bound(bound: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match bound.strip_prefix("now-") {
        Some(rel) => RelativeWindow::parse(rel).map(|w| now - w.unit.as_duration(w.amount)),
        None if bound == "now" => Some(now),
        None => parse_instant(bound),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) | (Some(Value::Null), Some(Value::Null)) => Ordering::Equal,
        (None, _) | (Some(Value::Null), _) => Ordering::Greater,
        (_, None) | (_, Some(Value::Null)) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn group_key(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Count desc, then key asc.
fn rank_terms(counts: IndexMap<String, u64>, size: u32) -> Vec<TermCount> {
    let mut terms: Vec<TermCount> = counts
        .into_iter()
        .map(|(key, doc_count)| TermCount { key, doc_count })
        .collect();
    terms.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
    terms.truncate(size as usize);
    terms
}

#[async_trait]
impl TelemetryStore for InMemoryTelemetryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn esql(&self, query: &str) -> Result<ColumnarResponse, StoreError> {
        self.check_online()?;
        if let Ok(mut q) = self.queries.write() {
            q.push(query.to_string());
        }
        self.canned
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, resp)| resp.clone())
            .ok_or_else(|| StoreError::Unavailable("ES|QL is not available in memory".to_string()))
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<Document>, StoreError> {
        self.check_online()?;
        let mut hits: Vec<Document> = self.matching(&request.must).cloned().collect();
        hits.sort_by(|a, b| {
            request.sort.iter().fold(Ordering::Equal, |acc, key| {
                acc.then_with(|| {
                    let field = field_name(&key.field);
                    let ord = compare_values(a.get(field), b.get(field));
                    match key.order {
                        SortOrder::Asc => ord,
                        SortOrder::Desc => ord.reverse(),
                    }
                })
            })
        });
        hits.truncate(request.size as usize);
        Ok(hits)
    }

    async fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<GroupBucket>, StoreError> {
        self.check_online()?;
        let group_field = field_name(&request.group_field);
        let nested_field = field_name(&request.nested_field);
        let avg_field = field_name(&request.avg_field);

        struct Acc {
            count: u64,
            sum: f64,
            samples: u64,
            nested: IndexMap<String, u64>,
        }

        let mut groups: IndexMap<String, Acc> = IndexMap::new();
        for doc in self.matching(&request.must) {
            let Some(key) = doc.get(group_field).and_then(group_key) else {
                continue;
            };
            let acc = groups.entry(key).or_insert_with(|| Acc {
                count: 0,
                sum: 0.0,
                samples: 0,
                nested: IndexMap::new(),
            });
            acc.count += 1;
            if let Some(v) = doc.get(avg_field).and_then(Value::as_f64) {
                acc.sum += v;
                acc.samples += 1;
            }
            if let Some(reason) = doc.get(nested_field).and_then(group_key) {
                *acc.nested.entry(reason).or_insert(0) += 1;
            }
        }

        let mut buckets: Vec<GroupBucket> = groups
            .into_iter()
            .map(|(key, acc)| GroupBucket {
                key,
                doc_count: acc.count,
                avg: (acc.samples > 0).then(|| acc.sum / acc.samples as f64),
                nested: rank_terms(acc.nested, request.nested_size),
            })
            .collect();
        buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
        buckets.truncate(request.size as usize);
        Ok(buckets)
    }

    async fn index(&self, index: &str, document: &Value) -> Result<(), StoreError> {
        self.check_online()?;
        self.indexed
            .write()
            .map_err(|_| StoreError::Unavailable("index lock poisoned".to_string()))?
            .push((index.to_string(), document.clone()));
        Ok(())
    }
}
