//! Question-side domain types: intents, task scopes, time windows and the
//! question input itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The analytic category a question is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    #[default]
    DiagnoseTaskFailure,
    ListHotspots,
    ShowExampleTraces,
    TrendFailReasons,
    CompareBeforeAfter,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::DiagnoseTaskFailure,
        Intent::ListHotspots,
        Intent::ShowExampleTraces,
        Intent::TrendFailReasons,
        Intent::CompareBeforeAfter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::DiagnoseTaskFailure => "diagnose_task_failure",
            Intent::ListHotspots => "list_hotspots",
            Intent::ShowExampleTraces => "show_example_traces",
            Intent::TrendFailReasons => "trend_fail_reasons",
            Intent::CompareBeforeAfter => "compare_before_after",
        }
    }

    /// Unrecognized names coerce to the default intent instead of failing.
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|i| i.as_str() == name)
            .unwrap_or_default()
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which piece of information the crawler was asked to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskScope {
    Pricing,
    Refund,
    Contact,
}

impl TaskScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskScope::Pricing => "pricing",
            TaskScope::Refund => "refund",
            TaskScope::Contact => "contact",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pricing" => Some(TaskScope::Pricing),
            "refund" => Some(TaskScope::Refund),
            "contact" => Some(TaskScope::Contact),
            _ => None,
        }
    }
}

impl fmt::Display for TaskScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Either a relative duration (`7d`, `24h`, `30m`) or explicit ISO bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl TimeWindow {
    pub fn relative(duration: impl Into<String>) -> Self {
        Self {
            relative: Some(duration.into()),
            ..Self::default()
        }
    }

    pub fn between(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            relative: None,
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }

    /// True when no field carries a usable value.
    pub fn is_empty(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.relative) && blank(&self.start) && blank(&self.end)
    }
}

/// Time scope of a question. `before`/`after` are only read by the
/// comparison plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(flatten)]
    pub window: TimeWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<TimeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<TimeWindow>,
}

impl TimeRange {
    pub fn relative(duration: impl Into<String>) -> Self {
        Self {
            window: TimeWindow::relative(duration),
            ..Self::default()
        }
    }

    pub fn between(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            window: TimeWindow::between(start, end),
            ..Self::default()
        }
    }

    pub fn compare(before: TimeWindow, after: TimeWindow) -> Self {
        Self {
            window: TimeWindow::default(),
            before: Some(before),
            after: Some(after),
        }
    }
}

/// A question plus its optional scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskInput {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
}

impl AskInput {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_task(mut self, task: TaskScope) -> Self {
        self.task = Some(task);
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }
}
