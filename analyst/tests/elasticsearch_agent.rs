use awoa_analyst::config::{AnalystConfig, SynthesisMode};
use awoa_analyst::{AnalystAgent, AskInput, Intent};
use serde_json::json;
use std::io::Write;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> AnalystConfig {
    let mut config = AnalystConfig::default();
    config.telemetry.url = server.uri();
    config.telemetry.timeout_seconds = 5;
    config
}

#[tokio::test]
async fn hotspots_over_http_with_audit_records() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "columns": [
                {"name": "fails", "type": "long"},
                {"name": "avg_latency", "type": "double"},
                {"name": "task", "type": "keyword"},
                {"name": "url", "type": "keyword"},
                {"name": "fail_reason", "type": "keyword"}
            ],
            "values": [[7, 420.0, "contact", "https://a.example/contact", "js_only"]]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/agent_audit-\d{4}\.\d{2}\.\d{2}/_doc$"))
        .and(body_partial_json(json!({"analyst_run_id": "http-run"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"result": "created"})))
        .expect(2)
        .mount(&server)
        .await;

    let agent = AnalystAgent::from_config(&config_for(&server)).unwrap();
    let resp = agent
        .ask_with_run_id("http-run", AskInput::new("top failing pages for contact"))
        .await
        .unwrap();

    assert_eq!(resp.intent, Intent::ListHotspots);
    assert_eq!(resp.diagnosis.top_fail_reasons[0].fail_reason, "js_only");
    assert_eq!(resp.recommended_fixes[0].fix_id, "js_ssr");
}

#[tokio::test]
async fn rejected_query_fails_templated_steps() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_query"))
        .respond_with(ResponseTemplate::new(400).set_body_string("parsing_exception"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/_doc$"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let agent = AnalystAgent::from_config(&config_for(&server)).unwrap();
    let err = agent
        .ask(AskInput::new("daily fail reasons"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("status 400"), "{err}");
}

#[tokio::test]
async fn audit_failures_do_not_fail_the_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"columns": [], "values": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/_doc$"))
        .respond_with(ResponseTemplate::new(503).set_body_string("cluster_block_exception"))
        .mount(&server)
        .await;

    let agent = AnalystAgent::from_config(&config_for(&server)).unwrap();
    let resp = agent.ask(AskInput::new("show hotspots")).await.unwrap();
    assert!(resp.metrics["hotspots"].is_empty());
    assert!(resp.markdown.contains("_(no rows)_"));
}

#[tokio::test]
async fn shard_failures_degrade_to_empty_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"/_search$"))
        .respond_with(ResponseTemplate::new(503).set_body_string("no_shard_available_action_exception"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_query"))
        .respond_with(ResponseTemplate::new(503).set_body_string("no_shard_available_action_exception"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/_doc$"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let agent = AnalystAgent::from_config(&config_for(&server)).unwrap();

    let resp = agent.ask(AskInput::new("show me example traces")).await.unwrap();
    assert_eq!(resp.intent, Intent::ShowExampleTraces);
    assert!(resp.evidence.example_traces.is_empty());

    let resp = agent.ask(AskInput::new("why do refund runs fail")).await.unwrap();
    assert_eq!(resp.intent, Intent::DiagnoseTaskFailure);
    assert!(resp.metrics["hotspots"].is_empty());
    assert!(resp.markdown.contains("_(no traces found)_"));
}

#[tokio::test]
async fn malformed_search_replies_degrade_to_empty_results() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"/_search$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"took": 3})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_query"))
        .respond_with(ResponseTemplate::new(429).set_body_string("es_rejected_execution_exception"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/_doc$"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let agent = AnalystAgent::from_config(&config_for(&server)).unwrap();
    let resp = agent.ask(AskInput::new("why do refund runs fail")).await.unwrap();
    assert!(resp.metrics["hotspots"].is_empty());
    assert!(resp.evidence.example_traces.is_empty());
    assert!(agent.trace("run-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_cluster_degrades_to_empty_results() {
    let mut config = AnalystConfig::default();
    config.telemetry.url = "http://127.0.0.1:9".to_string();
    config.telemetry.timeout_seconds = 2;
    let agent = AnalystAgent::from_config(&config).unwrap();

    let resp = agent.ask(AskInput::new("why do refund runs fail")).await.unwrap();
    assert_eq!(resp.intent, Intent::DiagnoseTaskFailure);
    assert!(resp.evidence.example_traces.is_empty());
    assert!(resp.markdown.contains("_(no traces found)_"));
}

#[tokio::test]
async fn fix_rule_override_file_is_used() {
    let mut rules = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        rules,
        r#"
[[unknown]]
id = "custom_logging"
title = "Log the crawler decision path"
why = "Unknown failures need more context."
confidence = "high"
"#
    )
    .unwrap();

    let mut config = AnalystConfig::default();
    config.telemetry.enabled = false;
    config.synthesis.mode = SynthesisMode::OpenAi;
    config.rules.fix_rules = Some(rules.path().to_path_buf());

    let agent = AnalystAgent::from_config(&config).unwrap();
    let fixes = agent.tools().rules().fixes_for("unknown");
    assert_eq!(fixes.len(), 1);
    assert_eq!(fixes[0].id, "custom_logging");
}
