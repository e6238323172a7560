//! Plan data model: tools, parameter values, steps.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{TaskScope, TimeRange};

/// Parameter key carrying the "pick run ids from the last search" directive.
pub const PICK_FROM_SEARCH: &str = "_pick_from_search";

/// Tools the executor knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    RunQuery,
    SearchRecords,
    GetTrace,
    GetHotspots,
    RecommendFixes,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::RunQuery => "run_query",
            ToolKind::SearchRecords => "search_records",
            ToolKind::GetTrace => "get_trace",
            ToolKind::GetHotspots => "get_hotspots",
            ToolKind::RecommendFixes => "recommend_fixes",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "run_query" => Some(ToolKind::RunQuery),
            "search_records" => Some(ToolKind::SearchRecords),
            "get_trace" => Some(ToolKind::GetTrace),
            "get_hotspots" => Some(ToolKind::GetHotspots),
            "recommend_fixes" => Some(ToolKind::RecommendFixes),
            _ => None,
        }
    }

    /// Result bucket used when a step carries no explicit label.
    /// `run_query` buckets by query name instead.
    pub fn default_label(&self) -> &'static str {
        match self {
            ToolKind::RunQuery => "run_query",
            ToolKind::SearchRecords => "search_steps",
            ToolKind::GetTrace => "example_traces",
            ToolKind::GetHotspots => "hotspots",
            ToolKind::RecommendFixes => "recommended_fixes",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Late-bound reference to an earlier step's output.
///
/// On the wire a reference is the bare count under its parameter key:
/// `{"_pick_from_search": 3}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceDirective {
    /// First `count` distinct run ids of the most recent search output.
    PickFromSearch { count: usize },
}

impl ReferenceDirective {
    /// Directive carried by `value` under parameter `key`, if any.
    pub fn from_param(key: &str, value: &JsonValue) -> Option<Self> {
        match key {
            PICK_FROM_SEARCH => value
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(|count| ReferenceDirective::PickFromSearch { count }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Reference(ReferenceDirective),
    Literal(JsonValue),
}

impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ParamValue::Reference(ReferenceDirective::PickFromSearch { count }) => {
                serializer.serialize_u64(*count as u64)
            }
            ParamValue::Literal(v) => v.serialize(serializer),
        }
    }
}

/// Without its key a value is always a literal; see [`PlanStep`] for references.
impl<'de> Deserialize<'de> for ParamValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(ParamValue::Literal)
    }
}

fn deserialize_params<'de, D>(deserializer: D) -> Result<BTreeMap<String, ParamValue>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, JsonValue>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let param = match ReferenceDirective::from_param(&key, &value) {
                Some(directive) => ParamValue::Reference(directive),
                None => ParamValue::Literal(value),
            };
            (key, param)
        })
        .collect())
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Literal(JsonValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Literal(v) => v.as_i64(),
            ParamValue::Reference(_) => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceDirective> {
        match self {
            ParamValue::Reference(r) => Some(r),
            ParamValue::Literal(_) => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Literal(JsonValue::String(s.to_string()))
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Literal(JsonValue::String(s))
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Literal(JsonValue::from(n))
    }
}

impl From<ReferenceDirective> for ParamValue {
    fn from(r: ReferenceDirective) -> Self {
        ParamValue::Reference(r)
    }
}

/// One tool invocation. The tool is kept as a plain name so a step built by
/// hand (or deserialized) can name a tool the executor does not know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub tool: String,
    #[serde(deserialize_with = "deserialize_params")]
    pub params: BTreeMap<String, ParamValue>,
    #[serde(rename = "_label", default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl PlanStep {
    pub fn new(tool: ToolKind) -> Self {
        Self {
            tool: tool.as_str().to_string(),
            params: BTreeMap::new(),
            label: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Inserts the value only when present.
    pub fn with_optional(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.with_param(key, v),
            None => self,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn kind(&self) -> Option<ToolKind> {
        ToolKind::from_name(&self.tool)
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(ParamValue::as_str)
    }

    pub fn i64_param(&self, key: &str) -> Option<i64> {
        self.params.get(key).and_then(ParamValue::as_i64)
    }

    pub fn reference(&self, key: &str) -> Option<&ReferenceDirective> {
        self.params.get(key).and_then(ParamValue::as_reference)
    }

    /// Parameters as a JSON object (references rendered as their count).
    pub fn params_json(&self) -> JsonValue {
        serde_json::to_value(&self.params).unwrap_or(JsonValue::Null)
    }

    /// Parameters as written in the plan, `_label` included.
    pub fn literal_params(&self) -> JsonValue {
        let mut params = self.params_json();
        if let (Some(label), JsonValue::Object(map)) = (&self.label, &mut params) {
            map.insert("_label".to_string(), JsonValue::String(label.clone()));
        }
        params
    }
}

/// Ordered tool invocations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanStep> {
        self.steps.iter()
    }
}

/// Normalized planner input. The task scope is already resolved (explicit
/// scope, else inferred from the question).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanRequest {
    pub domain: Option<String>,
    pub task: Option<TaskScope>,
    pub time_range: Option<TimeRange>,
}
