//! Keyword routing: question text to intent, plus the advisory task-scope
//! classifier.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Intent, TaskScope};

/// One routing rule: any keyword (case-insensitive substring) selects `intent`.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub keywords: &'static [&'static str],
    pub intent: Intent,
}

/// Evaluated top to bottom, first match wins.
pub static INTENT_RULES: &[KeywordRule] = &[
    KeywordRule {
        keywords: &["trend", "over time", "increasing", "decreasing", "per day", "daily"],
        intent: Intent::TrendFailReasons,
    },
    KeywordRule {
        keywords: &["before and after", "compare", "before", "after"],
        intent: Intent::CompareBeforeAfter,
    },
    KeywordRule {
        keywords: &["trace", "example trace", "show traces", "run_id", "examples"],
        intent: Intent::ShowExampleTraces,
    },
    KeywordRule {
        keywords: &["hotspot", "hotspots", "top failing", "worst pages", "failure hotspot"],
        intent: Intent::ListHotspots,
    },
];

// Word-start anchored so "explain" does not read as "plan".
static TASK_RULES: Lazy<Vec<(Regex, TaskScope)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(?i)\b(?:pricing|price|plan)").unwrap(),
            TaskScope::Pricing,
        ),
        (
            Regex::new(r"(?i)\b(?:refund|return|cancellation)").unwrap(),
            TaskScope::Refund,
        ),
        (
            Regex::new(r"(?i)\b(?:contact|email|support)").unwrap(),
            TaskScope::Contact,
        ),
    ]
});

/// Classify a question. Never fails; no match yields the default intent.
pub fn route(question: &str) -> Intent {
    let q = question.to_lowercase();
    INTENT_RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| q.contains(k)))
        .map(|rule| rule.intent)
        .unwrap_or_default()
}

/// Guess the task scope from the question text.
pub fn infer_task(question: &str) -> Option<TaskScope> {
    TASK_RULES
        .iter()
        .find(|(re, _)| re.is_match(question))
        .map(|(_, task)| *task)
}

/// An explicit scope always wins over inference.
pub fn resolve_task(explicit: Option<TaskScope>, question: &str) -> Option<TaskScope> {
    explicit.or_else(|| infer_task(question))
}
