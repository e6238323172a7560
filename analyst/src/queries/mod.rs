//! Query templating: named ES|QL templates, placeholder rendering, and the
//! clause builders callers use to prepare template parameters.

pub mod filters;
pub mod render;

pub use filters::{bool_filter, clamp_limit, quote_literal, time_filter, RelativeWindow, TimeUnit};
pub use render::{
    substitute, BuiltinTemplateStore, FileTemplateStore, LayeredTemplateStore,
    QueryTemplateStore, RenderedQuery, TemplateError, TemplateParams, TemplateRenderer,
};

/// Daily failure-reason trend.
pub const FAIL_REASON_TRENDS_DAILY: &str = "fail_reason_trends_daily";
/// Per-URL failure counts.
pub const FAIL_HOTSPOTS_BY_TASK: &str = "fail_hotspots_by_task";
