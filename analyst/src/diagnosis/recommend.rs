use serde::Serialize;
use std::collections::HashSet;

use super::profile::FailureProfile;
use crate::fix_rules::{Confidence, FixRuleTable};

/// Evidence items attached to each recommendation.
pub const SUPPORT_ITEMS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendationSupport {
    pub fails: u64,
    pub hotspot_urls: Vec<String>,
    pub trace_run_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub fix_id: String,
    pub title: String,
    pub why: String,
    pub confidence: Confidence,
    pub mapped_fail_reason: String,
    pub support: RecommendationSupport,
}

/// Map a profile to ranked, deduplicated recommendations.
///
/// Reasons are visited by descending fail count; a fix id reached through
/// several reasons is kept once, under the reason visited first.
pub fn recommend(profile: &FailureProfile, rules: &FixRuleTable) -> Vec<Recommendation> {
    let hotspot_urls: Vec<String> = profile
        .hotspots
        .iter()
        .take(SUPPORT_ITEMS)
        .map(|h| h.url.clone())
        .collect();
    let trace_run_ids: Vec<String> = profile
        .example_traces
        .iter()
        .take(SUPPORT_ITEMS)
        .map(|t| t.run_id.clone())
        .collect();

    let mut ranked: Vec<_> = profile.top_fail_reasons.iter().collect();
    ranked.sort_by(|a, b| b.fails.cmp(&a.fails));

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for reason in ranked {
        for fix in rules.fixes_for(&reason.fail_reason) {
            if !seen.insert(fix.id.clone()) {
                continue;
            }
            out.push(Recommendation {
                fix_id: fix.id.clone(),
                title: fix.title.clone(),
                why: fix.why.clone(),
                confidence: fix.confidence,
                mapped_fail_reason: reason.fail_reason.clone(),
                support: RecommendationSupport {
                    fails: reason.fails,
                    hotspot_urls: hotspot_urls.clone(),
                    trace_run_ids: trace_run_ids.clone(),
                },
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix_rules::FixRuleTable;
    use crate::tools::{ExampleTrace, HotspotRow, ReasonCount};

    fn reason(name: &str, fails: u64) -> ReasonCount {
        ReasonCount {
            fail_reason: name.to_string(),
            fails,
        }
    }

    #[test]
    fn test_higher_fail_count_first_with_empty_evidence() {
        let profile = FailureProfile::from_reasons(vec![reason("not_found", 10), reason("timeout", 3)]);
        let recs = recommend(&profile, FixRuleTable::builtin());
        let mapped: Vec<&str> = recs.iter().map(|r| r.mapped_fail_reason.as_str()).collect();
        assert_eq!(
            mapped,
            vec!["not_found", "not_found", "not_found", "timeout", "timeout"]
        );
        for r in &recs {
            assert!(r.support.hotspot_urls.is_empty());
            assert!(r.support.trace_run_ids.is_empty());
        }
        assert_eq!(recs[0].support.fails, 10);
        assert_eq!(recs[3].support.fails, 3);
    }

    #[test]
    fn test_unsorted_input_is_ranked() {
        let profile = FailureProfile::from_reasons(vec![reason("timeout", 1), reason("blocked", 9)]);
        let recs = recommend(&profile, FixRuleTable::builtin());
        assert_eq!(recs[0].mapped_fail_reason, "blocked");
    }

    #[test]
    fn test_overlapping_fix_ids_keep_higher_reason() {
        // Two uncatalogued reasons both land in the unknown bucket.
        let profile = FailureProfile::from_reasons(vec![reason("captcha", 2), reason("geo_block", 7)]);
        let recs = recommend(&profile, FixRuleTable::builtin());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].fix_id, "unk_instrument");
        assert_eq!(recs[0].mapped_fail_reason, "geo_block");
        assert_eq!(recs[0].support.fails, 7);
    }

    #[test]
    fn test_support_is_capped_at_three() {
        let hotspots = (0..5)
            .map(|i| HotspotRow {
                task: None,
                url: format!("https://a.com/{i}"),
                fail_reason: Some("js_only".to_string()),
                fails: 1,
                avg_latency: 0,
                top_reasons: vec![],
            })
            .collect();
        let traces = (0..4)
            .map(|i| ExampleTrace {
                run_id: format!("run{i}"),
                trace: vec![],
            })
            .collect();
        let profile = FailureProfile::build(hotspots, traces);
        let recs = recommend(&profile, FixRuleTable::builtin());
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].support.hotspot_urls.len(), 3);
        assert_eq!(recs[0].support.trace_run_ids, vec!["run0", "run1", "run2"]);
        assert_eq!(recs[0].support.fails, 5);
    }

    #[test]
    fn test_empty_reason_yields_nothing() {
        let profile = FailureProfile::from_reasons(vec![reason("", 4)]);
        assert!(recommend(&profile, FixRuleTable::builtin()).is_empty());
    }
}
