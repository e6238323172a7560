use indexmap::IndexMap;
use serde::Serialize;

use crate::fix_rules::UNKNOWN_REASON;
use crate::tools::{ExampleTrace, HotspotRow, ReasonCount};

/// Number of reasons kept in a profile.
pub const TOP_REASONS: usize = 5;

/// Dominant failure reasons plus the evidence they were derived from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureProfile {
    pub top_fail_reasons: Vec<ReasonCount>,
    pub hotspots: Vec<HotspotRow>,
    pub example_traces: Vec<ExampleTrace>,
}

impl FailureProfile {
    /// Sum `fails` per row reason (missing reason counts as `unknown`), rank
    /// descending and keep the top five. Ties keep first-appearance order.
    pub fn build(hotspots: Vec<HotspotRow>, example_traces: Vec<ExampleTrace>) -> Self {
        let mut totals: IndexMap<String, u64> = IndexMap::new();
        for row in &hotspots {
            let reason = row
                .fail_reason
                .as_deref()
                .filter(|r| !r.is_empty())
                .unwrap_or(UNKNOWN_REASON);
            *totals.entry(reason.to_string()).or_insert(0) += row.fails;
        }

        let mut top_fail_reasons: Vec<ReasonCount> = totals
            .into_iter()
            .map(|(fail_reason, fails)| ReasonCount { fail_reason, fails })
            .collect();
        // sort_by is stable
        top_fail_reasons.sort_by(|a, b| b.fails.cmp(&a.fails));
        top_fail_reasons.truncate(TOP_REASONS);

        Self {
            top_fail_reasons,
            hotspots,
            example_traces,
        }
    }

    /// Profile from reasons supplied directly, without hotspot rows.
    pub fn from_reasons(top_fail_reasons: Vec<ReasonCount>) -> Self {
        Self {
            top_fail_reasons,
            ..Self::default()
        }
    }

    /// Field names, sorted; recorded as the recommendation tool's parameters.
    pub fn keys(&self) -> Vec<&'static str> {
        vec!["example_traces", "hotspots", "top_fail_reasons"]
    }
}
