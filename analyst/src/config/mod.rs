//! Analyst configuration: TOML file first, environment variables on top.

pub mod types;

pub use types::*;

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

impl AnalystConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Optional file, then process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(url) = get("ES_URL") {
            self.telemetry.url = url;
        }
        if let Some(user) = get("ES_USER") {
            self.telemetry.user = Some(user);
        }
        if let Some(pass) = get("ES_PASS") {
            self.telemetry.password = Some(pass);
        }
        if let Some(enabled) = get("ES_ENABLED") {
            self.telemetry.enabled = parse_flag("ES_ENABLED", &enabled)?;
        }
        if let Some(mode) = get("LLM_MODE") {
            self.synthesis.mode = SynthesisMode::parse(&mode);
        }
        if let Some(url) = get("OLLAMA_URL") {
            self.synthesis.ollama_url = url;
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            self.synthesis.ollama_model = model;
        }
        if let Some(dir) = get("ANALYST_TEMPLATE_DIR") {
            self.templates.dir = Some(dir.into());
        }
        if let Some(file) = get("ANALYST_FIX_RULES") {
            self.rules.fix_rules = Some(file.into());
        }
        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
