//! Sequential plan execution.
//!
//! Steps run one after another. Each step's output is fully materialized and
//! stored under its label before the next step starts, and reference
//! directives are resolved against those stored outputs immediately before
//! the dependent step runs. One audit record is emitted per step.

use chrono::Utc;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::audit::{summarize_output, AuditRecord, AuditSink};
use crate::diagnosis::{FailureProfile, Recommendation};
use crate::error::{AnalystError, AnalystResult};
use crate::planner::{Plan, PlanStep, ReferenceDirective, ToolKind, PICK_FROM_SEARCH};
use crate::telemetry::Document;
use crate::tools::{
    AnalystTools, ExampleTrace, HotspotParams, HotspotRow, QueryScope, SearchFilters, StepOutput,
};
use crate::utils::BestEffort;

/// Per-question execution state. Never shared between questions.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    plan: Plan,
    results: IndexMap<String, StepOutput>,
    last_search: Vec<Document>,
}

impl ExecutionContext {
    pub fn new(plan: Plan) -> Self {
        Self {
            plan,
            ..Self::default()
        }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Outputs by label, in execution order.
    pub fn results(&self) -> &IndexMap<String, StepOutput> {
        &self.results
    }

    pub fn get(&self, label: &str) -> Option<&StepOutput> {
        self.results.get(label)
    }

    pub fn last_search(&self) -> &[Document] {
        &self.last_search
    }

    pub fn hotspots(&self) -> &[HotspotRow] {
        self.get(ToolKind::GetHotspots.default_label())
            .and_then(StepOutput::as_hotspots)
            .unwrap_or(&[])
    }

    pub fn example_traces(&self) -> &[ExampleTrace] {
        self.get(ToolKind::GetTrace.default_label())
            .and_then(StepOutput::as_traces)
            .unwrap_or(&[])
    }

    /// First `count` distinct run ids of the most recent search, in order.
    pub fn pick_run_ids(&self, count: usize) -> Vec<String> {
        let mut run_ids: Vec<String> = Vec::with_capacity(count);
        for hit in &self.last_search {
            if run_ids.len() >= count {
                break;
            }
            if let Some(run_id) = hit.get("run_id").and_then(Value::as_str) {
                if !run_id.is_empty() && !run_ids.iter().any(|r| r == run_id) {
                    run_ids.push(run_id.to_string());
                }
            }
        }
        run_ids
    }

    fn store(&mut self, label: String, output: StepOutput) {
        if let StepOutput::Records(hits) = &output {
            self.last_search = hits.clone();
        }
        self.results.insert(label, output);
    }
}

pub struct PlanExecutor {
    tools: AnalystTools,
    audit: BestEffort<dyn AuditSink>,
}

impl PlanExecutor {
    pub fn new(tools: AnalystTools, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            tools,
            audit: BestEffort::new("audit", audit),
        }
    }

    pub fn audit_sink(&self) -> &Arc<dyn AuditSink> {
        self.audit.inner()
    }

    pub fn tools(&self) -> &AnalystTools {
        &self.tools
    }

    /// Run every step in order. The first failing step aborts the run.
    pub async fn execute(&self, run_id: &str, question: &str, plan: &Plan) -> AnalystResult<ExecutionContext> {
        let mut ctx = ExecutionContext::new(plan.clone());

        for (index, step) in plan.iter().enumerate() {
            let started = Instant::now();
            let (label, output) = self.run_step(step, &ctx).await?;
            let duration_ms = started.elapsed().as_millis() as u64;

            info!(
                analyst_run_id = run_id,
                step = index + 1,
                tool = %step.tool,
                label = %label,
                items = output.len(),
                duration_ms,
                "plan step completed"
            );

            self.audit(run_id, question, &step.tool, step.literal_params(), &output, duration_ms)
                .await;
            ctx.store(label, output);
        }

        Ok(ctx)
    }

    /// Rank fixes for a profile built outside the plan. Audited like a step.
    pub async fn recommend(&self, run_id: &str, question: &str, profile: &FailureProfile) -> Vec<Recommendation> {
        let started = Instant::now();
        let result = self.tools.recommend_fixes(profile);
        let duration_ms = started.elapsed().as_millis() as u64;
        let params = result.params().clone();
        let recs = result.into_data();
        let output = StepOutput::Recommendations(recs.clone());
        self.audit(run_id, question, ToolKind::RecommendFixes.as_str(), params, &output, duration_ms)
            .await;
        recs
    }

    async fn audit(
        &self,
        run_id: &str,
        question: &str,
        tool: &str,
        params: Value,
        output: &StepOutput,
        duration_ms: u64,
    ) {
        let record = AuditRecord {
            analyst_run_id: run_id.to_string(),
            ts: Utc::now(),
            question: question.to_string(),
            tool_name: tool.to_string(),
            tool_params: params,
            tool_result_summary: summarize_output(output),
            duration_ms,
        };
        self.audit.call("record", |sink| sink.record(&record)).await;
    }

    async fn run_step(&self, step: &PlanStep, ctx: &ExecutionContext) -> AnalystResult<(String, StepOutput)> {
        let kind = step
            .kind()
            .ok_or_else(|| AnalystError::UnknownTool(step.tool.clone()))?;

        let output = match kind {
            ToolKind::RunQuery => {
                let name = step.str_param("query_name").ok_or_else(|| AnalystError::InvalidParameters {
                    tool: step.tool.clone(),
                    message: "missing query_name".to_string(),
                })?;
                let scope = QueryScope {
                    domain: step.str_param("domain"),
                    task: step.str_param("task"),
                    start: step.str_param("start"),
                    end: step.str_param("end"),
                    relative: step.str_param("relative"),
                    limit: step.i64_param("limit"),
                };
                let params = self.tools.scoped_query_params(&scope);
                StepOutput::Query(self.tools.run_query(name, &params).await?.into_data())
            }
            ToolKind::GetHotspots => {
                let params: HotspotParams = decode_params(step)?;
                StepOutput::Hotspots(self.tools.get_hotspots(&params).await?.into_data())
            }
            ToolKind::SearchRecords => {
                let filters: SearchFilters = decode_params(step)?;
                StepOutput::Records(self.tools.search_records(&filters).await?.into_data())
            }
            ToolKind::GetTrace => {
                let run_ids = match step.reference(PICK_FROM_SEARCH) {
                    Some(ReferenceDirective::PickFromSearch { count }) => ctx.pick_run_ids(*count),
                    None => match step.str_param("run_id") {
                        Some(run_id) => vec![run_id.to_string()],
                        None => {
                            return Err(AnalystError::InvalidParameters {
                                tool: step.tool.clone(),
                                message: format!("expected run_id or {}", PICK_FROM_SEARCH),
                            })
                        }
                    },
                };
                debug!(?run_ids, "fetching traces");
                let mut traces = Vec::with_capacity(run_ids.len());
                for run_id in run_ids {
                    let trace = self.tools.get_trace(&run_id).await?.into_data();
                    traces.push(ExampleTrace { run_id, trace });
                }
                StepOutput::Traces(traces)
            }
            ToolKind::RecommendFixes => {
                let profile = FailureProfile::build(ctx.hotspots().to_vec(), ctx.example_traces().to_vec());
                StepOutput::Recommendations(self.tools.recommend_fixes(&profile).into_data())
            }
        };

        let label = match (&step.label, kind) {
            (Some(label), _) => label.clone(),
            (None, ToolKind::RunQuery) => step
                .str_param("query_name")
                .unwrap_or(kind.default_label())
                .to_string(),
            (None, _) => kind.default_label().to_string(),
        };
        Ok((label, output))
    }
}

fn decode_params<T: DeserializeOwned>(step: &PlanStep) -> AnalystResult<T> {
    serde_json::from_value(step.params_json()).map_err(|e| AnalystError::InvalidParameters {
        tool: step.tool.clone(),
        message: e.to_string(),
    })
}
