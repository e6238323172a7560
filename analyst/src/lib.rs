// AWOA Analyst
// Deterministic diagnostic agent over crawler step telemetry

pub mod agent;
pub mod audit;
pub mod config;
pub mod diagnosis;
pub mod error;
pub mod fix_rules;
pub mod orchestrator;
pub mod planner;
pub mod queries;
pub mod report;
pub mod synthesis;
pub mod telemetry;
pub mod tools;
pub mod types;
pub mod utils;

pub use agent::{AnalystAgent, AskResponse, Diagnosis, Evidence};
pub use config::AnalystConfig;
pub use error::{AnalystError, AnalystResult};
pub use planner::{plan, route, Plan, PlanStep};
pub use types::{AskInput, Intent, TaskScope, TimeRange, TimeWindow};
