use awoa_analyst::audit::MemoryAuditSink;
use awoa_analyst::fix_rules::FixRuleTable;
use awoa_analyst::queries::TemplateRenderer;
use awoa_analyst::synthesis::DeterministicSynthesizer;
use awoa_analyst::telemetry::{ColumnarResponse, Document, InMemoryTelemetryStore};
use awoa_analyst::tools::StepOutput;
use awoa_analyst::{AnalystAgent, AskInput, Intent, TimeRange, TimeWindow};
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn doc(v: Value) -> Document {
    v.as_object().cloned().unwrap()
}

fn days_ago(n: i64) -> String {
    (Utc::now() - Duration::days(n)).to_rfc3339()
}

fn agent(store: Arc<InMemoryTelemetryStore>) -> (AnalystAgent, Arc<MemoryAuditSink>) {
    let audit = Arc::new(MemoryAuditSink::new());
    let agent = AnalystAgent::new(
        store,
        TemplateRenderer::builtin(),
        Arc::new(FixRuleTable::default()),
        audit.clone(),
        Arc::new(DeterministicSynthesizer),
    );
    (agent, audit)
}

fn hotspot_response() -> ColumnarResponse {
    ColumnarResponse::new(
        &["fails", "avg_latency", "task", "url", "fail_reason"],
        vec![
            vec![json!(10), json!(812.6), json!("refund"), json!("https://shop.example/help"), json!("not_found")],
            vec![json!(3), json!(15000.0), json!("refund"), json!("https://shop.example/refunds"), json!("timeout")],
        ],
    )
}

fn failing_steps() -> Vec<Document> {
    vec![
        doc(json!({"run_id": "run-b", "step_num": 2, "ts": days_ago(1), "task": "refund", "status": "fail",
                   "fail_reason": "timeout", "url": "https://shop.example/refunds", "latency_ms": 15000})),
        doc(json!({"run_id": "run-a", "step_num": 1, "ts": days_ago(2), "task": "refund", "status": "ok",
                   "url": "https://shop.example/", "latency_ms": 300})),
        doc(json!({"run_id": "run-a", "step_num": 3, "ts": days_ago(2), "task": "refund", "status": "fail",
                   "fail_reason": "not_found", "url": "https://shop.example/help", "latency_ms": 900,
                   "evidence": "no refund link"})),
        doc(json!({"run_id": "run-a", "step_num": 2, "ts": days_ago(2), "task": "refund", "status": "fail",
                   "fail_reason": "not_found", "url": "https://shop.example/help", "latency_ms": 700})),
        doc(json!({"run_id": "run-c", "step_num": 1, "ts": days_ago(20), "task": "pricing", "status": "fail",
                   "fail_reason": "blocked", "url": "https://other.example/", "latency_ms": 100})),
    ]
}

#[tokio::test]
async fn refund_hotspots_use_default_window() {
    let store = Arc::new(
        InMemoryTelemetryStore::new().with_esql_response("BY task, url, fail_reason", hotspot_response()),
    );
    let (agent, audit) = agent(store.clone());

    let resp = agent
        .ask(AskInput::new("Show the top 5 failure hotspots for refund"))
        .await
        .unwrap();

    assert_eq!(resp.intent, Intent::ListHotspots);
    assert_eq!(resp.plan.len(), 1);
    assert_eq!(
        serde_json::to_value(&resp.plan).unwrap(),
        json!([{"tool": "get_hotspots", "params": {"limit": 20, "relative": "7d", "task": "refund"}}])
    );

    let queries = store.executed_queries();
    assert_eq!(queries.len(), 1);
    assert!(queries[0].contains("task == \"refund\""));
    assert!(queries[0].contains("ts >= NOW() - 7 day"));
    assert!(queries[0].contains("LIMIT 20"));

    let rows = resp.metrics["hotspots"].as_hotspots().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].avg_latency, 812);
    assert_eq!(resp.diagnosis.top_fail_reasons[0].fail_reason, "not_found");
    assert_eq!(resp.recommended_fixes[0].fix_id, "nf_nav_links");

    let records = audit.records();
    assert_eq!(records[0].tool_name, "get_hotspots");
    assert_eq!(records[0].tool_params["relative"], json!("7d"));
    assert!(resp.markdown.contains("| refund | https://shop.example/help | not_found | 10 | 812 |"));
}

#[tokio::test]
async fn trend_question_runs_daily_query() {
    let trend = ColumnarResponse::new(
        &["day", "task", "fail_reason", "fails"],
        vec![
            vec![json!("2024-05-01T00:00:00.000Z"), json!("pricing"), json!("timeout"), json!(2)],
            vec![json!("2024-05-02T00:00:00.000Z"), json!("pricing"), json!("timeout"), json!(5)],
        ],
    );
    let store = Arc::new(InMemoryTelemetryStore::new().with_esql_response("DATE_TRUNC", trend));
    let (agent, _) = agent(store.clone());

    let resp = agent
        .ask(AskInput::new("Which fail reason is increasing over time?"))
        .await
        .unwrap();

    assert_eq!(resp.intent, Intent::TrendFailReasons);
    assert_eq!(resp.plan.steps[0].str_param("query_name"), Some("fail_reason_trends_daily"));
    assert_eq!(resp.plan.steps[0].i64_param("limit"), Some(500));
    assert!(store.executed_queries()[0].contains("LIMIT 500"));

    let query = resp.metrics["fail_reason_trends_daily"].as_query().unwrap();
    assert_eq!(query.columns, vec!["day", "task", "fail_reason", "fails"]);
    assert_eq!(query.rows.len(), 2);
    assert!(resp.diagnosis.top_fail_reasons.is_empty());
    assert!(resp.markdown.contains("| 2024-05-02T00:00:00.000Z | pricing | timeout | 5 |"));
}

#[tokio::test]
async fn compare_runs_before_and_after_windows() {
    let store = Arc::new(InMemoryTelemetryStore::new());
    let (agent, audit) = agent(store);

    let input = AskInput::new("Compare refund failures before and after the release").with_time_range(
        TimeRange::compare(
            TimeWindow::between("2024-04-01T00:00:00Z", "2024-04-15T00:00:00Z"),
            TimeWindow::relative("3d"),
        ),
    );
    let resp = agent.ask_with_run_id("cmp", input).await.unwrap();

    assert_eq!(resp.intent, Intent::CompareBeforeAfter);
    let labels: Vec<&str> = resp.metrics.keys().map(String::as_str).collect();
    assert_eq!(labels, vec!["before", "after"]);

    let records = audit.records();
    assert_eq!(records[0].tool_params["start"], json!("2024-04-01T00:00:00Z"));
    assert_eq!(records[0].tool_params["_label"], json!("before"));
    assert_eq!(records[1].tool_params["relative"], json!("3d"));
    assert!(resp.markdown.contains("### Query `before` (fail_reason_trends_daily)"));
}

#[tokio::test]
async fn diagnosis_falls_back_to_aggregation_and_picks_traces() {
    let store = Arc::new(InMemoryTelemetryStore::new().with_documents(failing_steps()));
    let (agent, audit) = agent(store);

    let resp = agent
        .ask_with_run_id("diag", AskInput::new("Why does the refund task fail?"))
        .await
        .unwrap();

    assert_eq!(resp.intent, Intent::DiagnoseTaskFailure);

    // ES|QL is not served, so the aggregation path answers with URL buckets
    let hotspots = resp.metrics["hotspots"].as_hotspots().unwrap();
    assert_eq!(hotspots.len(), 2);
    assert_eq!(hotspots[0].url, "https://shop.example/help");
    assert_eq!(hotspots[0].fails, 2);
    assert_eq!(hotspots[0].avg_latency, 800);
    assert_eq!(hotspots[0].task, None);
    assert_eq!(hotspots[0].top_reasons[0].fail_reason, "not_found");

    let traces = &resp.evidence.example_traces;
    let ids: Vec<&str> = traces.iter().map(|t| t.run_id.as_str()).collect();
    assert_eq!(ids, vec!["run-a", "run-b"]);
    let steps: Vec<Option<i64>> = traces[0].trace.iter().map(|s| s.step_num).collect();
    assert_eq!(steps, vec![Some(1), Some(2), Some(3)]);
    assert_eq!(traces[0].trace[2].evidence, "no refund link");

    // fallback rows carry no fail_reason of their own
    assert_eq!(resp.diagnosis.top_fail_reasons[0].fail_reason, "unknown");
    assert_eq!(resp.recommended_fixes[0].mapped_fail_reason, "unknown");

    let tools: Vec<String> = audit.records().into_iter().map(|r| r.tool_name).collect();
    assert_eq!(
        tools,
        vec!["get_hotspots", "search_records", "get_trace", "recommend_fixes"]
    );
}

#[tokio::test]
async fn hotspot_paths_expose_the_same_fields() {
    let primary = Arc::new(
        InMemoryTelemetryStore::new()
            .with_documents(failing_steps())
            .with_esql_response("BY task, url, fail_reason", hotspot_response()),
    );
    let fallback = Arc::new(InMemoryTelemetryStore::new().with_documents(failing_steps()));

    let keys = |v: &Value| -> Vec<String> {
        let mut k: Vec<String> = v.as_object().unwrap().keys().cloned().collect();
        k.sort();
        k
    };

    let mut shapes = Vec::new();
    for store in [primary, fallback] {
        let (agent, _) = agent(store);
        let resp = agent
            .ask_with_run_id("eq", AskInput::new("refund hotspots"))
            .await
            .unwrap();
        let row = serde_json::to_value(&resp.metrics["hotspots"].as_hotspots().unwrap()[0]).unwrap();
        shapes.push(keys(&row));
    }
    assert_eq!(shapes[0], shapes[1]);
    for field in ["url", "fails", "avg_latency", "top_reasons"] {
        assert!(shapes[0].iter().any(|k| k == field), "missing {field}");
    }
}

#[tokio::test]
async fn omitted_time_range_defaults_to_seven_days() {
    for question in [
        "refund hotspots",
        "why do pricing runs fail",
        "trend of failures",
    ] {
        let (agent, audit) = agent(Arc::new(InMemoryTelemetryStore::new()));
        agent.ask(AskInput::new(question)).await.unwrap();
        let first = &audit.records()[0];
        assert_eq!(first.tool_params["relative"], json!("7d"), "question: {question}");
    }
}

#[tokio::test]
async fn markdown_is_reproducible_for_a_pinned_run_id() {
    let render = || async {
        let store = Arc::new(InMemoryTelemetryStore::new().with_documents(failing_steps()));
        let (agent, _) = agent(store);
        agent
            .ask_with_run_id("pinned", AskInput::new("show example traces for refund"))
            .await
            .unwrap()
    };
    let a = render().await;
    let b = render().await;
    assert_eq!(a.markdown, b.markdown);
    assert_eq!(a.intent, Intent::ShowExampleTraces);
    assert!(a.markdown.contains("**analyst_run_id:** `pinned`"));
    assert!(matches!(a.metrics.get("search_steps"), Some(StepOutput::Records(_))));
}

#[tokio::test]
async fn unavailable_backend_still_answers() {
    let (agent, _) = agent(Arc::new(InMemoryTelemetryStore::new().offline()));
    let resp = agent
        .ask(AskInput::new("Which fail reason is increasing over time?"))
        .await
        .unwrap();
    assert!(resp.metrics["fail_reason_trends_daily"].is_empty());
    assert!(resp.markdown.contains("_(no rows)_"));
    assert_eq!(resp.analyst_run_id.len(), 32);
}
