//! The diagnostic agent: route, plan, execute, diagnose, render.
//!
//! Every answer is produced deterministically from telemetry. The optional
//! synthesizer only ever replaces the final markdown and falls back to the
//! deterministic report on any failure.

use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditSink, TelemetryAuditSink, TracingAuditSink};
use crate::config::AnalystConfig;
use crate::diagnosis::{FailureProfile, Recommendation};
use crate::error::AnalystResult;
use crate::fix_rules::FixRuleTable;
use crate::orchestrator::PlanExecutor;
use crate::planner::{resolve_task, route, Plan, PlanRequest, Planner};
use crate::queries::{LayeredTemplateStore, TemplateRenderer};
use crate::report::{render_markdown, ReportContext};
use crate::synthesis::{synthesizer_from_config, DeterministicSynthesizer, Synthesizer};
use crate::telemetry::{DisabledTelemetryStore, ElasticsearchStore, TelemetryStore};
use crate::tools::{AnalystTools, ExampleTrace, ReasonCount, StepOutput, TraceStep};
use crate::types::{AskInput, Intent};
use crate::utils::BestEffort;

pub const DIAGNOSIS_SUMMARY: &str =
    "Deterministic diagnosis based on hotspots + traces. See evidence and metrics below.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub summary: String,
    pub top_fail_reasons: Vec<ReasonCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub example_traces: Vec<ExampleTrace>,
}

/// Full answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskResponse {
    pub analyst_run_id: String,
    pub intent: Intent,
    pub plan: Plan,
    pub diagnosis: Diagnosis,
    /// Raw step outputs keyed by label, in execution order.
    pub metrics: IndexMap<String, StepOutput>,
    pub evidence: Evidence,
    pub recommended_fixes: Vec<Recommendation>,
    pub markdown: String,
}

pub struct AnalystAgent {
    planner: Planner,
    executor: PlanExecutor,
    synthesizer: BestEffort<dyn Synthesizer>,
}

impl AnalystAgent {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        renderer: TemplateRenderer,
        rules: Arc<FixRuleTable>,
        audit: Arc<dyn AuditSink>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self::from_tools(AnalystTools::new(store, renderer, rules), audit, synthesizer)
    }

    pub fn from_tools(tools: AnalystTools, audit: Arc<dyn AuditSink>, synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self {
            planner: Planner::new(),
            executor: PlanExecutor::new(tools, audit),
            synthesizer: BestEffort::new("synthesis", synthesizer),
        }
    }

    /// Deterministic agent over `store` with built-in templates and rules,
    /// auditing into the same store.
    pub fn with_store(store: Arc<dyn TelemetryStore>) -> Self {
        let audit = Arc::new(TelemetryAuditSink::new(store.clone()));
        Self::new(
            store,
            TemplateRenderer::builtin(),
            Arc::new(FixRuleTable::default()),
            audit,
            Arc::new(DeterministicSynthesizer),
        )
    }

    /// With telemetry disabled, audit records go to the log instead.
    pub fn from_config(config: &AnalystConfig) -> AnalystResult<Self> {
        if !config.telemetry.enabled {
            warn!("telemetry disabled, every tool will return empty results");
            return Self::configured(config, Arc::new(DisabledTelemetryStore), Arc::new(TracingAuditSink));
        }
        let store: Arc<dyn TelemetryStore> = Arc::new(ElasticsearchStore::new(&config.telemetry)?);
        Self::from_config_with_store(config, store)
    }

    /// Everything from `config` except the telemetry backend.
    pub fn from_config_with_store(config: &AnalystConfig, store: Arc<dyn TelemetryStore>) -> AnalystResult<Self> {
        let audit = Arc::new(
            TelemetryAuditSink::new(store.clone()).with_index_prefix(config.telemetry.audit_index_prefix.clone()),
        );
        Self::configured(config, store, audit)
    }

    fn configured(
        config: &AnalystConfig,
        store: Arc<dyn TelemetryStore>,
        audit: Arc<dyn AuditSink>,
    ) -> AnalystResult<Self> {
        let renderer = match &config.templates.dir {
            Some(dir) => TemplateRenderer::new(Arc::new(LayeredTemplateStore::with_override_dir(dir))),
            None => TemplateRenderer::builtin(),
        };
        let rules = match &config.rules.fix_rules {
            Some(path) => FixRuleTable::from_file(path)?,
            None => FixRuleTable::default(),
        };
        let synthesizer = synthesizer_from_config(&config.synthesis)?;
        info!(
            store = store.name(),
            audit = audit.name(),
            synthesis = synthesizer.name(),
            "analyst agent configured"
        );
        let tools = AnalystTools::new(store, renderer, Arc::new(rules))
            .with_steps_index(config.telemetry.steps_index.clone());
        Ok(Self::from_tools(tools, audit, synthesizer))
    }

    pub fn tools(&self) -> &AnalystTools {
        self.executor.tools()
    }

    pub fn audit_sink(&self) -> &Arc<dyn AuditSink> {
        self.executor.audit_sink()
    }

    /// Route and plan without touching the backend.
    pub fn plan_only(&self, input: &AskInput) -> (Intent, Plan) {
        let intent = route(&input.question);
        let plan = self.planner.plan(intent, &plan_request(input));
        (intent, plan)
    }

    pub async fn ask(&self, input: AskInput) -> AnalystResult<AskResponse> {
        let run_id = Uuid::new_v4().simple().to_string();
        self.ask_with_run_id(&run_id, input).await
    }

    /// Same as [`ask`](Self::ask) with a caller-chosen run id.
    pub async fn ask_with_run_id(&self, run_id: &str, input: AskInput) -> AnalystResult<AskResponse> {
        let mut input = input;
        input.task = resolve_task(input.task, &input.question);
        let (intent, plan) = self.plan_only(&input);
        info!(analyst_run_id = run_id, %intent, steps = plan.len(), "answering question");

        let ctx = self.executor.execute(run_id, &input.question, &plan).await?;

        let profile = FailureProfile::build(ctx.hotspots().to_vec(), ctx.example_traces().to_vec());
        let recommended_fixes = self.executor.recommend(run_id, &input.question, &profile).await;

        let markdown = render_markdown(&ReportContext {
            run_id,
            intent,
            question: &input.question,
            domain: input.domain.as_deref(),
            task: input.task.map(|t| t.as_str()),
            plan: &plan,
            results: ctx.results(),
            example_traces: &profile.example_traces,
            fixes: &recommended_fixes,
        });
        let synthesized = self
            .synthesizer
            .call("synthesize", |s| s.synthesize(&markdown, &markdown))
            .await;
        let markdown = synthesized.unwrap_or(markdown);

        Ok(AskResponse {
            analyst_run_id: run_id.to_string(),
            intent,
            plan,
            diagnosis: Diagnosis {
                summary: DIAGNOSIS_SUMMARY.to_string(),
                top_fail_reasons: profile.top_fail_reasons,
            },
            metrics: ctx.results().clone(),
            evidence: Evidence {
                example_traces: profile.example_traces,
            },
            recommended_fixes,
            markdown,
        })
    }

    /// Every step of one run, ordered by step number.
    pub async fn trace(&self, run_id: &str) -> AnalystResult<Vec<TraceStep>> {
        Ok(self.tools().get_trace(run_id).await?.into_data())
    }
}

fn plan_request(input: &AskInput) -> PlanRequest {
    PlanRequest {
        domain: input.domain.clone().filter(|d| !d.trim().is_empty()),
        task: resolve_task(input.task, &input.question),
        time_range: input.time_range.clone(),
    }
}
