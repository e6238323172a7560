use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diagnosis::Recommendation;
use crate::telemetry::{Clause, Document};

/// Upper bound on `step.evidence` in projected traces, in characters.
pub const EVIDENCE_MAX_CHARS: usize = 300;

/// Uniform envelope returned by every tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult<T> {
    name: String,
    params: Value,
    data: T,
}

impl<T> ToolResult<T> {
    pub fn new(name: impl Into<String>, params: Value, data: T) -> Self {
        Self {
            name: name.into(),
            params,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasonCount {
    pub fail_reason: String,
    pub fails: u64,
}

/// One failing URL. Rows from the ES|QL path carry `task` and `fail_reason`;
/// rows from the aggregation fallback leave them null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotspotRow {
    pub task: Option<String>,
    pub url: String,
    pub fail_reason: Option<String>,
    pub fails: u64,
    pub avg_latency: i64,
    pub top_reasons: Vec<ReasonCount>,
}

/// Rows of a templated query, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryRows {
    pub query_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Document>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceStep {
    pub step_num: Option<i64>,
    pub ts: Option<String>,
    pub task: Option<String>,
    pub url: Option<String>,
    pub status: Option<String>,
    pub fail_reason: Option<String>,
    pub latency_ms: Option<i64>,
    pub http_status: Option<i64>,
    pub page_title: String,
    pub evidence: String,
}

impl TraceStep {
    pub fn from_document(doc: &Document) -> Self {
        let text = |k: &str| doc.get(k).and_then(Value::as_str).map(str::to_string);
        let int = |k: &str| doc.get(k).and_then(Value::as_i64);
        Self {
            step_num: int("step_num"),
            ts: text("ts"),
            task: text("task"),
            url: text("url"),
            status: text("status"),
            fail_reason: text("fail_reason"),
            latency_ms: int("latency_ms"),
            http_status: int("http_status"),
            page_title: text("page_title").unwrap_or_default(),
            evidence: text("evidence")
                .map(|e| e.chars().take(EVIDENCE_MAX_CHARS).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleTrace {
    pub run_id: String,
    pub trace: Vec<TraceStep>,
}

/// Filters for `search_records`. Every set field becomes a must-clause.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub run_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

impl SearchFilters {
    pub fn for_run(run_id: &str, limit: i64) -> Self {
        Self {
            run_id: Some(run_id.to_string()),
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn clauses(&self) -> Vec<Clause> {
        let mut must = Vec::new();
        push_term(&mut must, "run_id", &self.run_id);
        if !self.run_ids.is_empty() {
            must.push(Clause::terms(
                "run_id",
                self.run_ids.iter().map(|r| Value::String(r.clone())).collect(),
            ));
        }
        push_term(&mut must, "task", &self.task);
        push_term(&mut must, "domain", &self.domain);
        push_term(&mut must, "site", &self.site);
        push_term(&mut must, "status", &self.status);
        push_term(&mut must, "fail_reason", &self.fail_reason);
        if let Some(needle) = self.url_contains.as_deref().filter(|v| !v.is_empty()) {
            must.push(Clause::contains("url", needle));
        }
        must
    }
}

fn push_term(must: &mut Vec<Clause>, field: &str, value: &Option<String>) {
    if let Some(v) = value.as_deref().filter(|v| !v.is_empty()) {
        must.push(Clause::term(field, v));
    }
}

/// Scope of a hotspot lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotspotParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}

/// Output of one executed plan step, stored under the step's label.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepOutput {
    Query(QueryRows),
    Hotspots(Vec<HotspotRow>),
    Records(Vec<Document>),
    Traces(Vec<ExampleTrace>),
    Recommendations(Vec<Recommendation>),
}

impl StepOutput {
    pub fn as_query(&self) -> Option<&QueryRows> {
        match self {
            StepOutput::Query(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_hotspots(&self) -> Option<&[HotspotRow]> {
        match self {
            StepOutput::Hotspots(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_records(&self) -> Option<&[Document]> {
        match self {
            StepOutput::Records(docs) => Some(docs),
            _ => None,
        }
    }

    pub fn as_traces(&self) -> Option<&[ExampleTrace]> {
        match self {
            StepOutput::Traces(traces) => Some(traces),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StepOutput::Query(q) => q.rows.len(),
            StepOutput::Hotspots(rows) => rows.len(),
            StepOutput::Records(docs) => docs.len(),
            StepOutput::Traces(traces) => traces.len(),
            StepOutput::Recommendations(recs) => recs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
