//! Crate-level error type.
//!
//! Only defects surface here: template problems, a plan step naming a tool the
//! executor does not know (or carrying unusable parameters), or a telemetry
//! query the backend rejected. Backend unavailability never reaches this type
//! because the tool adapters turn it into empty results.

use thiserror::Error;

use crate::config::ConfigError;
use crate::fix_rules::FixRuleError;
use crate::queries::TemplateError;
use crate::synthesis::SynthesisError;
use crate::telemetry::StoreError;

#[derive(Debug, Error)]
pub enum AnalystError {
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Unknown tool in plan step: {0}")]
    UnknownTool(String),

    #[error("Invalid parameters for {tool}: {message}")]
    InvalidParameters { tool: String, message: String },

    #[error("Telemetry store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fix rule error: {0}")]
    FixRules(#[from] FixRuleError),

    #[error("Synthesis setup error: {0}")]
    Synthesis(#[from] SynthesisError),
}

pub type AnalystResult<T> = Result<T, AnalystError>;
