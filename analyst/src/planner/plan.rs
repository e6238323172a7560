//! Table-driven plan compilation.
//!
//! A plan is a pure function of `(intent, request)`: the same inputs always
//! give a structurally identical plan, and parameters live in sorted maps so
//! the serialized form is byte-identical as well.

use crate::queries::FAIL_REASON_TRENDS_DAILY;
use crate::types::{Intent, TimeWindow};

use super::types::{Plan, PlanRequest, PlanStep, ReferenceDirective, ToolKind, PICK_FROM_SEARCH};

pub const HOTSPOT_LIMIT: i64 = 20;
pub const EXAMPLE_SEARCH_LIMIT: i64 = 200;
pub const DIAGNOSE_SEARCH_LIMIT: i64 = 300;
pub const TREND_LIMIT: i64 = 500;
pub const TRACE_PICK: usize = 3;

pub const DEFAULT_RELATIVE: &str = "7d";
pub const DEFAULT_BEFORE: &str = "14d";
pub const DEFAULT_AFTER: &str = "7d";

/// Relative wins; otherwise explicit bounds; otherwise `fallback`.
pub fn normalize_window(window: Option<&TimeWindow>, fallback: &str) -> TimeWindow {
    let present = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    match window {
        Some(w) if present(&w.relative).is_some() => TimeWindow {
            relative: present(&w.relative),
            start: None,
            end: None,
        },
        Some(w) if !w.is_empty() => TimeWindow {
            relative: None,
            start: present(&w.start),
            end: present(&w.end),
        },
        _ => TimeWindow::relative(fallback),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    pub fn plan(&self, intent: Intent, request: &PlanRequest) -> Plan {
        let time = normalize_window(
            request.time_range.as_ref().map(|tr| &tr.window),
            DEFAULT_RELATIVE,
        );

        let steps = match intent {
            Intent::ListHotspots => vec![self.hotspots_step(request, &time)],
            Intent::ShowExampleTraces => vec![
                self.search_step(request, EXAMPLE_SEARCH_LIMIT),
                self.trace_step(),
            ],
            Intent::TrendFailReasons => vec![self.trend_step(request, &time)],
            Intent::CompareBeforeAfter => {
                let before = normalize_window(
                    request.time_range.as_ref().and_then(|tr| tr.before.as_ref()),
                    DEFAULT_BEFORE,
                );
                let after = normalize_window(
                    request.time_range.as_ref().and_then(|tr| tr.after.as_ref()),
                    DEFAULT_AFTER,
                );
                vec![
                    self.trend_step(request, &before).with_label("before"),
                    self.trend_step(request, &after).with_label("after"),
                ]
            }
            Intent::DiagnoseTaskFailure => vec![
                self.hotspots_step(request, &time),
                self.search_step(request, DIAGNOSE_SEARCH_LIMIT),
                self.trace_step(),
            ],
        };
        Plan::new(steps)
    }

    fn scoped(&self, step: PlanStep, request: &PlanRequest) -> PlanStep {
        step.with_optional("domain", request.domain.as_deref())
            .with_optional("task", request.task.map(|t| t.as_str()))
    }

    fn hotspots_step(&self, request: &PlanRequest, time: &TimeWindow) -> PlanStep {
        with_window(self.scoped(PlanStep::new(ToolKind::GetHotspots), request), time)
            .with_param("limit", HOTSPOT_LIMIT)
    }

    fn search_step(&self, request: &PlanRequest, limit: i64) -> PlanStep {
        self.scoped(PlanStep::new(ToolKind::SearchRecords), request)
            .with_param("status", "fail")
            .with_param("limit", limit)
    }

    fn trace_step(&self) -> PlanStep {
        PlanStep::new(ToolKind::GetTrace).with_param(
            PICK_FROM_SEARCH,
            ReferenceDirective::PickFromSearch { count: TRACE_PICK },
        )
    }

    fn trend_step(&self, request: &PlanRequest, time: &TimeWindow) -> PlanStep {
        let step = PlanStep::new(ToolKind::RunQuery).with_param("query_name", FAIL_REASON_TRENDS_DAILY);
        with_window(self.scoped(step, request), time).with_param("limit", TREND_LIMIT)
    }
}

fn with_window(step: PlanStep, time: &TimeWindow) -> PlanStep {
    step.with_optional("relative", time.relative.as_deref())
        .with_optional("start", time.start.as_deref())
        .with_optional("end", time.end.as_deref())
}

/// Convenience wrapper over [`Planner::plan`].
pub fn plan(intent: Intent, request: &PlanRequest) -> Plan {
    Planner::new().plan(intent, request)
}
