//! Deterministic markdown rendering of a diagnosis.
//!
//! Same inputs always render the same document: results are visited in
//! execution order, parameters are serialized from sorted maps, and every
//! table or list is truncated at a fixed size with a "showing X of Y" note.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt::Write;

use crate::diagnosis::Recommendation;
use crate::planner::Plan;
use crate::tools::{ExampleTrace, HotspotRow, StepOutput};
use crate::types::Intent;

pub const HOTSPOT_ROWS: usize = 10;
pub const QUERY_ROWS: usize = 20;
pub const TRACE_COUNT: usize = 3;
pub const TRACE_STEPS: usize = 12;
pub const FIX_COUNT: usize = 5;

const HOTSPOT_COLUMNS: [&str; 5] = ["task", "url", "fail_reason", "fails", "avg_latency"];

/// Everything the report shows.
#[derive(Debug, Clone, Copy)]
pub struct ReportContext<'a> {
    pub run_id: &'a str,
    pub intent: Intent,
    pub question: &'a str,
    pub domain: Option<&'a str>,
    pub task: Option<&'a str>,
    pub plan: &'a Plan,
    pub results: &'a IndexMap<String, StepOutput>,
    pub example_traces: &'a [ExampleTrace],
    pub fixes: &'a [Recommendation],
}

pub fn render_markdown(ctx: &ReportContext<'_>) -> String {
    let mut md = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(md, "# AWOA Analyst Report\n");
    let _ = writeln!(md, "**analyst_run_id:** `{}`  ", ctx.run_id);
    let _ = writeln!(md, "**intent:** `{}`  ", ctx.intent);
    if let Some(domain) = ctx.domain {
        let _ = writeln!(md, "**domain:** `{}`  ", domain);
    }
    if let Some(task) = ctx.task {
        let _ = writeln!(md, "**task:** `{}`  ", task);
    }

    let _ = writeln!(md, "\n## Question\n\n{}\n", ctx.question);

    let _ = writeln!(md, "## Plan\n");
    for (i, step) in ctx.plan.iter().enumerate() {
        let params = serde_json::to_string(&step.literal_params()).unwrap_or_default();
        let _ = writeln!(md, "{}. `{}` `{}`", i + 1, step.tool, params);
    }

    let _ = writeln!(md, "\n## Metrics\n");
    let mut any_metric = false;
    for (label, output) in ctx.results {
        match output {
            StepOutput::Hotspots(rows) => {
                any_metric = true;
                let _ = writeln!(md, "### Top failure hotspots\n");
                md.push_str(&hotspot_table(rows));
            }
            StepOutput::Query(q) => {
                any_metric = true;
                let _ = writeln!(md, "### Query `{}` ({})\n", label, q.query_name);
                let columns: Vec<&str> = q.columns.iter().map(String::as_str).collect();
                let rows: Vec<Vec<String>> = q
                    .rows
                    .iter()
                    .map(|row| columns.iter().map(|c| cell(row.get(*c))).collect())
                    .collect();
                md.push_str(&table(&columns, &rows, QUERY_ROWS));
            }
            _ => {}
        }
    }
    if !any_metric {
        md.push_str("_(no rows)_\n");
    }

    let _ = writeln!(md, "\n## Evidence (example traces)\n");
    if ctx.example_traces.is_empty() {
        md.push_str("_(no traces found)_\n");
    } else {
        for trace in ctx.example_traces.iter().take(TRACE_COUNT) {
            md.push_str(&trace_section(trace));
        }
        md.push_str(&showing(TRACE_COUNT, ctx.example_traces.len()));
    }

    let _ = writeln!(md, "\n## Recommended fixes (ranked)\n");
    if ctx.fixes.is_empty() {
        md.push_str("_(no fixes generated)_\n");
    } else {
        for (i, fix) in ctx.fixes.iter().take(FIX_COUNT).enumerate() {
            let _ = writeln!(md, "### {}) {}\n", i + 1, fix.title);
            let _ = writeln!(md, "- **fix_id:** `{}`", fix.fix_id);
            let _ = writeln!(md, "- **confidence:** `{}`", fix.confidence);
            let _ = writeln!(md, "- **mapped_fail_reason:** `{}`", fix.mapped_fail_reason);
            let _ = writeln!(md, "- **why:** {}", fix.why);
            let _ = writeln!(
                md,
                "- **evidence:** fails={}, traces=[{}], hotspots=[{}]\n",
                fix.support.fails,
                fix.support.trace_run_ids.join(", "),
                fix.support.hotspot_urls.join(", ")
            );
        }
    }

    format!("{}\n", md.trim_end())
}

fn hotspot_table(rows: &[HotspotRow]) -> String {
    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            vec![
                escape(r.task.as_deref().unwrap_or("")),
                escape(&r.url),
                escape(r.fail_reason.as_deref().unwrap_or("")),
                r.fails.to_string(),
                r.avg_latency.to_string(),
            ]
        })
        .collect();
    table(&HOTSPOT_COLUMNS, &body, HOTSPOT_ROWS)
}

fn table(columns: &[&str], rows: &[Vec<String>], max_rows: usize) -> String {
    if rows.is_empty() {
        return "_(no rows)_\n\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "| {} |", columns.join(" | "));
    let _ = writeln!(out, "|{}", " --- |".repeat(columns.len()));
    for row in rows.iter().take(max_rows) {
        let _ = writeln!(out, "| {} |", row.join(" | "));
    }
    out.push_str(&showing(max_rows, rows.len()));
    out.push('\n');
    out
}

fn trace_section(trace: &ExampleTrace) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "### run_id: `{}`\n", trace.run_id);
    if trace.trace.is_empty() {
        out.push_str("_(no steps)_\n");
    }
    for step in trace.trace.iter().take(TRACE_STEPS) {
        let _ = writeln!(
            out,
            "- step {}: {} ({}) {} [{}ms] evidence: `{}`",
            step.step_num.map(|n| n.to_string()).unwrap_or_else(|| "?".to_string()),
            step.status.as_deref().unwrap_or("unknown"),
            step.fail_reason.as_deref().unwrap_or("none"),
            step.url.as_deref().unwrap_or(""),
            step.latency_ms.unwrap_or(0),
            step.evidence.replace('`', "'"),
        );
    }
    out.push_str(&showing(TRACE_STEPS, trace.trace.len()));
    out.push('\n');
    out
}

fn showing(shown: usize, total: usize) -> String {
    if total > shown {
        format!("\n_(showing {} of {})_\n", shown, total)
    } else {
        String::new()
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => escape(s),
        Some(other) => escape(&other.to_string()),
    }
}

fn escape(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}
