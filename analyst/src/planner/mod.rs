//! Intent routing and plan compilation.

pub mod plan;
pub mod router;
pub mod types;

pub use plan::{normalize_window, plan, Planner};
pub use router::{infer_task, resolve_task, route, KeywordRule, INTENT_RULES};
pub use types::{
    ParamValue, Plan, PlanRequest, PlanStep, ReferenceDirective, ToolKind, PICK_FROM_SEARCH,
};
