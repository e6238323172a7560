use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_ES_URL: &str = "http://localhost:9200";
pub const DEFAULT_STEPS_INDEX: &str = "agent_steps-*";
pub const DEFAULT_AUDIT_INDEX_PREFIX: &str = "agent_audit";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3.1";

/// Top-level analyst configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystConfig {
    pub telemetry: TelemetryConfig,
    pub synthesis: SynthesisConfig,
    pub templates: TemplatesConfig,
    pub rules: RulesConfig,
}

/// Elasticsearch connection and index names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// When false the analyst runs without a backend and every tool returns
    /// empty results.
    pub enabled: bool,
    pub steps_index: String,
    /// Audit records go to `<prefix>-YYYY.MM.DD`.
    pub audit_index_prefix: String,
    pub timeout_seconds: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_ES_URL.to_string(),
            user: None,
            password: None,
            enabled: true,
            steps_index: DEFAULT_STEPS_INDEX.to_string(),
            audit_index_prefix: DEFAULT_AUDIT_INDEX_PREFIX.to_string(),
            timeout_seconds: 30,
        }
    }
}

impl TelemetryConfig {
    /// Basic auth applies only when both halves are set.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (self.user.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.is_empty() && !p.is_empty() => Some((u, p)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisMode {
    #[default]
    None,
    Ollama,
    /// Accepted for compatibility; renders deterministically.
    #[serde(rename = "openai")]
    OpenAi,
}

impl SynthesisMode {
    /// Unknown modes fall back to `None`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "ollama" => SynthesisMode::Ollama,
            "openai" => SynthesisMode::OpenAi,
            _ => SynthesisMode::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SynthesisMode::None => "none",
            SynthesisMode::Ollama => "ollama",
            SynthesisMode::OpenAi => "openai",
        }
    }
}

impl fmt::Display for SynthesisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub mode: SynthesisMode,
    pub ollama_url: String,
    pub ollama_model: String,
    pub timeout_seconds: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            mode: SynthesisMode::None,
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            ollama_model: DEFAULT_OLLAMA_MODEL.to_string(),
            timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Directory of `.esql` files layered over the built-in templates.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// TOML file replacing entries of the built-in fix catalogue.
    pub fix_rules: Option<PathBuf>,
}
