//! Failure profiling and rule-driven recommendations.

pub mod profile;
pub mod recommend;

pub use profile::{FailureProfile, TOP_REASONS};
pub use recommend::{recommend, Recommendation, RecommendationSupport};
