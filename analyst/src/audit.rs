//! Per-step audit trail.
//!
//! One [`AuditRecord`] per executed plan step. Sinks are append-only and
//! best-effort: the executor wraps them so a failing sink never fails a
//! question.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::info;

use crate::config::DEFAULT_AUDIT_INDEX_PREFIX;
use crate::telemetry::{StoreError, TelemetryStore};
use crate::tools::StepOutput;

/// Upper bound on `tool_result_summary`, in characters.
pub const SUMMARY_MAX_CHARS: usize = 320;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Audit store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to serialize audit record: {0}")]
    Serialize(String),

    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

fn serialize_ts<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub analyst_run_id: String,
    #[serde(serialize_with = "serialize_ts")]
    pub ts: DateTime<Utc>,
    pub question: String,
    pub tool_name: String,
    /// Parameters exactly as they appear in the plan step.
    pub tool_params: Value,
    pub tool_result_summary: String,
    pub duration_ms: u64,
}

impl AuditRecord {
    /// Daily index name: `<prefix>-YYYY.MM.DD` of the record timestamp.
    pub fn index_name(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.ts.format("%Y.%m.%d"))
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    fn name(&self) -> &str;

    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Indexes records into the telemetry store.
pub struct TelemetryAuditSink {
    store: Arc<dyn TelemetryStore>,
    index_prefix: String,
}

impl TelemetryAuditSink {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self {
            store,
            index_prefix: DEFAULT_AUDIT_INDEX_PREFIX.to_string(),
        }
    }

    pub fn with_index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = prefix.into();
        self
    }
}

#[async_trait]
impl AuditSink for TelemetryAuditSink {
    fn name(&self) -> &str {
        "telemetry"
    }

    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let doc = serde_json::to_value(record).map_err(|e| AuditError::Serialize(e.to_string()))?;
        self.store
            .index(&record.index_name(&self.index_prefix), &doc)
            .await?;
        Ok(())
    }
}

/// Keeps records in memory.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records
            .write()
            .map_err(|_| AuditError::Unavailable("memory audit lock poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

/// Emits records as structured log events only. Used when telemetry is
/// disabled and there is no index to write to.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        info!(
            target: "awoa_analyst::audit",
            analyst_run_id = %record.analyst_run_id,
            tool = %record.tool_name,
            duration_ms = record.duration_ms,
            summary = %record.tool_result_summary,
            "tool call"
        );
        Ok(())
    }
}

/// Compact, deterministic description of a step output.
pub fn summarize_output(output: &StepOutput) -> String {
    let summary = match output {
        StepOutput::Query(q) => format!("rows(len={}, columns=[{}])", q.rows.len(), q.columns.join(", ")),
        other => match serde_json::to_value(other) {
            Ok(v) => summarize_value(&v),
            Err(_) => "summary_error".to_string(),
        },
    };
    truncate_chars(&summary, SUMMARY_MAX_CHARS)
}

/// Summary of an arbitrary JSON value; never dumps contents.
pub fn summarize_value(value: &Value) -> String {
    let summary = match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => match items.first() {
            None => "list(len=0)".to_string(),
            Some(Value::Object(head)) => {
                let mut keys: Vec<&str> = head.keys().map(String::as_str).collect();
                keys.sort_unstable();
                format!("list(len={}), head_keys=[{}]", items.len(), keys.join(", "))
            }
            Some(head) => format!("list(len={}), head_type={}", items.len(), type_name(head)),
        },
        Value::Object(map) => {
            let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
            keys.sort_unstable();
            keys.truncate(20);
            format!("dict(keys=[{}])", keys.join(", "))
        }
    };
    truncate_chars(&summary, SUMMARY_MAX_CHARS)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
