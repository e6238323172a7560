//! Typed tool adapters over the telemetry store.
//!
//! Every tool returns a [`ToolResult`] envelope. Searches, traces and the
//! hotspot aggregation report any backend failure as empty data. Templated
//! queries only do so for an unreachable backend: a query the backend
//! rejects fails the call (inside `get_hotspots` it triggers the aggregation
//! fallback instead).

pub mod types;

pub use types::{
    ExampleTrace, HotspotParams, HotspotRow, QueryRows, ReasonCount, SearchFilters, StepOutput,
    ToolResult, TraceStep, EVIDENCE_MAX_CHARS,
};

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::DEFAULT_STEPS_INDEX;
use crate::diagnosis::{recommend, FailureProfile, Recommendation};
use crate::error::AnalystResult;
use crate::fix_rules::FixRuleTable;
use crate::queries::{
    bool_filter, clamp_limit, time_filter, RelativeWindow, TemplateParams, TemplateRenderer,
    FAIL_HOTSPOTS_BY_TASK,
};
use crate::telemetry::{
    AggregationRequest, Clause, Document, GroupBucket, SearchRequest, SortKey, StoreError,
    TelemetryStore,
};

pub const SEARCH_DEFAULT_LIMIT: u32 = 50;
pub const SEARCH_MAX_LIMIT: u32 = 500;
pub const TRACE_STEP_LIMIT: i64 = 500;
pub const HOTSPOT_DEFAULT_LIMIT: u32 = 20;
pub const HOTSPOT_MAX_LIMIT: u32 = 200;
/// Nested failure reasons kept per URL on the aggregation path.
pub const FALLBACK_TOP_REASONS: u32 = 5;
pub const QUERY_DEFAULT_LIMIT: u32 = 500;
pub const QUERY_MAX_LIMIT: u32 = 10_000;

/// Scope shared by templated queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryScope<'a> {
    pub domain: Option<&'a str>,
    pub task: Option<&'a str>,
    pub start: Option<&'a str>,
    pub end: Option<&'a str>,
    pub relative: Option<&'a str>,
    pub limit: Option<i64>,
}

#[derive(Clone)]
pub struct AnalystTools {
    store: Arc<dyn TelemetryStore>,
    renderer: TemplateRenderer,
    rules: Arc<FixRuleTable>,
    steps_index: String,
}

impl AnalystTools {
    pub fn new(store: Arc<dyn TelemetryStore>, renderer: TemplateRenderer, rules: Arc<FixRuleTable>) -> Self {
        Self {
            store,
            renderer,
            rules,
            steps_index: DEFAULT_STEPS_INDEX.to_string(),
        }
    }

    pub fn with_steps_index(mut self, index: impl Into<String>) -> Self {
        self.steps_index = index.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn TelemetryStore> {
        &self.store
    }

    pub fn rules(&self) -> &FixRuleTable {
        &self.rules
    }

    /// Template parameters for the standard query shape.
    pub fn query_params(&self, scope: &QueryScope<'_>, default_limit: u32, max_limit: u32) -> TemplateParams {
        let mut params = TemplateParams::new();
        params.insert("steps_index".to_string(), self.steps_index.clone());
        params.insert("domain_filter".to_string(), bool_filter("domain", scope.domain));
        params.insert("task_filter".to_string(), bool_filter("task", scope.task));
        params.insert(
            "time_filter".to_string(),
            time_filter("ts", scope.start, scope.end, scope.relative),
        );
        params.insert(
            "limit".to_string(),
            clamp_limit(scope.limit, default_limit, max_limit).to_string(),
        );
        params
    }

    pub fn scoped_query_params(&self, scope: &QueryScope<'_>) -> TemplateParams {
        self.query_params(scope, QUERY_DEFAULT_LIMIT, QUERY_MAX_LIMIT)
    }

    async fn execute_query(&self, name: &str, params: &TemplateParams) -> AnalystResult<QueryRows> {
        let rendered = self.renderer.render(name, params)?;
        debug!(query = %rendered.name, "running templated query");
        let resp = self.store.esql(&rendered.text).await?;
        Ok(QueryRows {
            query_name: name.to_string(),
            columns: resp.column_names(),
            rows: resp.rows(),
        })
    }

    /// Render and run a named template. Unreachable backends give no rows.
    pub async fn run_query(&self, name: &str, params: &TemplateParams) -> AnalystResult<ToolResult<QueryRows>> {
        let data = match self.execute_query(name, params).await {
            Ok(rows) => rows,
            Err(crate::error::AnalystError::Store(StoreError::Unavailable(reason))) => {
                warn!(query = name, %reason, "telemetry unavailable, returning no rows");
                QueryRows {
                    query_name: name.to_string(),
                    ..QueryRows::default()
                }
            }
            Err(e) => return Err(e),
        };
        Ok(ToolResult::new(format!("run_query:{}", name), json!(params), data))
    }

    pub async fn search_records(&self, filters: &SearchFilters) -> AnalystResult<ToolResult<Vec<Document>>> {
        let request = SearchRequest {
            index: self.steps_index.clone(),
            must: filters.clauses(),
            sort: vec![SortKey::asc("run_id"), SortKey::asc("step_num")],
            size: clamp_limit(filters.limit, SEARCH_DEFAULT_LIMIT, SEARCH_MAX_LIMIT),
        };
        let hits = failure_as_empty(self.store.search(&request).await, "search_records");
        Ok(ToolResult::new("search_records", json!(filters), hits))
    }

    /// All steps of one run, ordered by step number.
    pub async fn get_trace(&self, run_id: &str) -> AnalystResult<ToolResult<Vec<TraceStep>>> {
        let hits = self
            .search_records(&SearchFilters::for_run(run_id, TRACE_STEP_LIMIT))
            .await?
            .into_data();
        let mut trace: Vec<TraceStep> = hits.iter().map(TraceStep::from_document).collect();
        trace.sort_by_key(|s| s.step_num.unwrap_or(0));
        Ok(ToolResult::new("get_trace", json!({ "run_id": run_id }), trace))
    }

    pub async fn get_hotspots(&self, params: &HotspotParams) -> AnalystResult<ToolResult<Vec<HotspotRow>>> {
        let scope = QueryScope {
            domain: params.domain.as_deref(),
            task: params.task.as_deref(),
            start: params.start.as_deref(),
            end: params.end.as_deref(),
            relative: params.relative.as_deref(),
            limit: params.limit,
        };
        let limit = clamp_limit(params.limit, HOTSPOT_DEFAULT_LIMIT, HOTSPOT_MAX_LIMIT);
        let template_params = self.query_params(&scope, HOTSPOT_DEFAULT_LIMIT, HOTSPOT_MAX_LIMIT);

        let rows = match self.execute_query(FAIL_HOTSPOTS_BY_TASK, &template_params).await {
            Ok(result) => result.rows.iter().map(hotspot_from_row).collect(),
            Err(e) => {
                debug!(error = %e, "hotspot query failed, falling back to aggregation");
                let request = self.fallback_request(params, limit);
                failure_as_empty(self.store.aggregate(&request).await, "get_hotspots")
                    .into_iter()
                    .map(hotspot_from_bucket)
                    .collect()
            }
        };
        Ok(ToolResult::new("get_hotspots", json!(params), rows))
    }

    fn fallback_request(&self, params: &HotspotParams, limit: u32) -> AggregationRequest {
        let mut must = vec![Clause::term("status", "fail")];
        if let Some(domain) = params.domain.as_deref().filter(|d| !d.is_empty()) {
            must.push(Clause::term("domain", domain));
        }
        if let Some(task) = params.task.as_deref().filter(|t| !t.is_empty()) {
            must.push(Clause::term("task", task));
        }
        if let Some(range) = time_range_clause(params) {
            must.push(range);
        }
        AggregationRequest {
            index: self.steps_index.clone(),
            must,
            group_field: "url.keyword".to_string(),
            size: limit,
            nested_field: "fail_reason.keyword".to_string(),
            nested_size: FALLBACK_TOP_REASONS,
            avg_field: "latency_ms".to_string(),
        }
    }

    /// Pure: rank fixes for a profile.
    pub fn recommend_fixes(&self, profile: &FailureProfile) -> ToolResult<Vec<Recommendation>> {
        let data = recommend(profile, &self.rules);
        ToolResult::new(
            "recommend_fixes",
            json!({ "profile_keys": profile.keys() }),
            data,
        )
    }
}

fn failure_as_empty<T: Default>(result: Result<T, StoreError>, tool: &str) -> T {
    result.unwrap_or_else(|e| {
        warn!(tool, error = %e, "telemetry request failed, returning empty result");
        T::default()
    })
}

/// Same window semantics as the ES|QL time filter. Relative expressions that
/// do not parse are dropped rather than sent as invalid date math.
fn time_range_clause(params: &HotspotParams) -> Option<Clause> {
    let present = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);
    if let Some(rel) = present(&params.relative) {
        return RelativeWindow::parse(&rel).map(|w| Clause::Range {
            field: "ts".to_string(),
            gte: Some(w.date_math()),
            lt: None,
        });
    }
    let (gte, lt) = (present(&params.start), present(&params.end));
    if gte.is_none() && lt.is_none() {
        return None;
    }
    Some(Clause::Range {
        field: "ts".to_string(),
        gte,
        lt,
    })
}

fn hotspot_from_row(row: &Document) -> HotspotRow {
    let text = |k: &str| row.get(k).and_then(Value::as_str).map(str::to_string);
    let fails = row.get("fails").and_then(Value::as_u64).unwrap_or(0);
    let fail_reason = text("fail_reason");
    HotspotRow {
        task: text("task"),
        url: text("url").unwrap_or_default(),
        top_reasons: fail_reason
            .iter()
            .map(|r| ReasonCount {
                fail_reason: r.clone(),
                fails,
            })
            .collect(),
        fail_reason,
        fails,
        avg_latency: row
            .get("avg_latency")
            .and_then(Value::as_f64)
            .map(|v| v as i64)
            .unwrap_or(0),
    }
}

fn hotspot_from_bucket(bucket: GroupBucket) -> HotspotRow {
    HotspotRow {
        task: None,
        url: bucket.key,
        fail_reason: None,
        fails: bucket.doc_count,
        avg_latency: bucket.avg.map(|v| v as i64).unwrap_or(0),
        top_reasons: bucket
            .nested
            .into_iter()
            .map(|r| ReasonCount {
                fail_reason: r.key,
                fails: r.doc_count,
            })
            .collect(),
    }
}
