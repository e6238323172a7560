//! Named ES|QL templates and `{{key}}` substitution.
//!
//! Templates come from a [`QueryTemplateStore`]. The renderer performs a single
//! left-to-right pass over the template; inserted values are never scanned
//! again for placeholders. After the pass the output is checked for any
//! leftover `{{...}}` syntax so half-specified templates never reach the
//! backend.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([a-zA-Z0-9_]+)\s*\}\}").unwrap());

// Any brace pair, so malformed keys such as `{{ bad-key }}` are caught too.
static LEFTOVER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{[^{}]*\}\}").unwrap());

const TEMPLATE_EXTENSION: &str = "esql";

static BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "fail_hotspots_by_task",
        include_str!("esql/fail_hotspots_by_task.esql"),
    ),
    (
        "fail_reason_trends_daily",
        include_str!("esql/fail_reason_trends_daily.esql"),
    ),
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Query template not found: {0}")]
    NotFound(String),

    #[error("Missing template parameter '{key}' for {template}")]
    MissingParameter { template: String, key: String },

    #[error("Unresolved placeholders in {template}: {placeholders:?}")]
    UnresolvedPlaceholder {
        template: String,
        placeholders: Vec<String>,
    },

    #[error("Failed to read template {name}: {message}")]
    Io { name: String, message: String },
}

/// Parameters are string-coerced by the caller; a sorted map keeps rendering
/// independent of insertion order.
pub type TemplateParams = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    pub name: String,
    pub text: String,
}

pub trait QueryTemplateStore: Send + Sync {
    fn load(&self, name: &str) -> Result<String, TemplateError>;

    /// Names this store can serve, sorted.
    fn names(&self) -> Vec<String>;
}

/// Templates compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinTemplateStore;

impl QueryTemplateStore for BuiltinTemplateStore {
    fn load(&self, name: &str) -> Result<String, TemplateError> {
        BUILTIN_TEMPLATES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, body)| body.to_string())
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_TEMPLATES.iter().map(|(n, _)| n.to_string()).collect();
        names.sort();
        names
    }
}

/// Reads `<base_dir>/<name>.esql`.
#[derive(Debug, Clone)]
pub struct FileTemplateStore {
    base_dir: PathBuf,
}

impl FileTemplateStore {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        valid.then(|| {
            self.base_dir
                .join(format!("{}.{}", name, TEMPLATE_EXTENSION))
        })
    }
}

impl QueryTemplateStore for FileTemplateStore {
    fn load(&self, name: &str) -> Result<String, TemplateError> {
        let path = self
            .path_for(name)
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        if !path.exists() {
            return Err(TemplateError::NotFound(name.to_string()));
        }
        fs::read_to_string(&path).map_err(|e| TemplateError::Io {
            name: name.to_string(),
            message: format!("{}: {}", path.display(), e),
        })
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.base_dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(TEMPLATE_EXTENSION))
                    .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Asks each layer in turn; the first layer that knows the name wins.
pub struct LayeredTemplateStore {
    layers: Vec<Box<dyn QueryTemplateStore>>,
}

impl LayeredTemplateStore {
    pub fn new(layers: Vec<Box<dyn QueryTemplateStore>>) -> Self {
        Self { layers }
    }

    /// Directory overrides on top of the built-in templates.
    pub fn with_override_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self::new(vec![
            Box::new(FileTemplateStore::new(dir)),
            Box::new(BuiltinTemplateStore),
        ])
    }
}

impl QueryTemplateStore for LayeredTemplateStore {
    fn load(&self, name: &str) -> Result<String, TemplateError> {
        for layer in &self.layers {
            match layer.load(name) {
                Err(TemplateError::NotFound(_)) => continue,
                other => return other,
            }
        }
        Err(TemplateError::NotFound(name.to_string()))
    }

    fn names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self.layers.iter().flat_map(|l| l.names()).collect();
        names.into_iter().collect()
    }
}

#[derive(Clone)]
pub struct TemplateRenderer {
    store: Arc<dyn QueryTemplateStore>,
}

impl TemplateRenderer {
    pub fn new(store: Arc<dyn QueryTemplateStore>) -> Self {
        Self { store }
    }

    pub fn builtin() -> Self {
        Self::new(Arc::new(BuiltinTemplateStore))
    }

    pub fn store(&self) -> &dyn QueryTemplateStore {
        self.store.as_ref()
    }

    pub fn render(&self, name: &str, params: &TemplateParams) -> Result<RenderedQuery, TemplateError> {
        let template = self.store.load(name)?;
        let text = substitute(name, &template, params)?;
        Ok(RenderedQuery {
            name: name.to_string(),
            text,
        })
    }
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer")
            .field("templates", &self.store.names())
            .finish()
    }
}

/// Single-pass placeholder substitution followed by the leftover check.
pub fn substitute(
    template_name: &str,
    template: &str,
    params: &TemplateParams,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = params
            .get(key.as_str())
            .ok_or_else(|| TemplateError::MissingParameter {
                template: template_name.to_string(),
                key: key.as_str().to_string(),
            })?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&template[last..]);

    let leftovers: BTreeSet<String> = LEFTOVER
        .find_iter(&out)
        .map(|m| m.as_str().to_string())
        .collect();
    if !leftovers.is_empty() {
        return Err(TemplateError::UnresolvedPlaceholder {
            template: template_name.to_string(),
            placeholders: leftovers.into_iter().collect(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn params(pairs: &[(&str, &str)]) -> TemplateParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitutes_all_placeholders() {
        let out = substitute(
            "t",
            "FROM {{index}} | LIMIT {{ limit }}",
            &params(&[("index", "agent_steps-*"), ("limit", "20")]),
        )
        .unwrap();
        assert_eq!(out, "FROM agent_steps-* | LIMIT 20");
    }

    #[test]
    fn test_missing_parameter_fails() {
        let err = substitute("t", "LIMIT {{limit}}", &params(&[])).unwrap_err();
        assert_eq!(
            err,
            TemplateError::MissingParameter {
                template: "t".to_string(),
                key: "limit".to_string()
            }
        );
    }

    #[test]
    fn test_template_without_placeholders_is_unchanged() {
        let text = "FROM agent_steps-* | LIMIT 5";
        let out = substitute("t", text, &params(&[("unused", "x")])).unwrap();
        assert_eq!(out, text);
    }

    #[test]
    fn test_inserted_values_are_not_resubstituted() {
        // The inserted value looks like a placeholder; a second pass would expand it.
        let err = substitute(
            "t",
            "WHERE {{filter}}",
            &params(&[("filter", "{{limit}}"), ("limit", "5")]),
        )
        .unwrap_err();
        assert!(matches!(err, TemplateError::UnresolvedPlaceholder { .. }));
    }

    #[test]
    fn test_malformed_placeholder_is_reported() {
        let err = substitute("t", "WHERE {{ bad-key }}", &params(&[])).unwrap_err();
        match err {
            TemplateError::UnresolvedPlaceholder { placeholders, .. } => {
                assert_eq!(placeholders, vec!["{{ bad-key }}".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_rendering_is_insertion_order_independent() {
        let mut a = TemplateParams::new();
        a.insert("x".into(), "1".into());
        a.insert("y".into(), "2".into());
        let mut b = TemplateParams::new();
        b.insert("y".into(), "2".into());
        b.insert("x".into(), "1".into());
        let tpl = "{{x}}-{{y}}";
        assert_eq!(substitute("t", tpl, &a).unwrap(), substitute("t", tpl, &b).unwrap());
    }

    #[test]
    fn test_builtin_store_serves_known_templates() {
        let store = BuiltinTemplateStore;
        assert!(store.load("fail_reason_trends_daily").unwrap().contains("{{limit}}"));
        assert_eq!(
            store.load("nope").unwrap_err(),
            TemplateError::NotFound("nope".to_string())
        );
    }

    #[test]
    fn test_layered_store_prefers_directory_override() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fail_hotspots_by_task.esql"), "FROM custom").unwrap();
        let store = LayeredTemplateStore::with_override_dir(dir.path());
        assert_eq!(store.load("fail_hotspots_by_task").unwrap(), "FROM custom");
        assert!(store.load("fail_reason_trends_daily").unwrap().starts_with("FROM"));
        assert_eq!(
            store.names(),
            vec![
                "fail_hotspots_by_task".to_string(),
                "fail_reason_trends_daily".to_string()
            ]
        );
    }

    #[test]
    fn test_file_store_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTemplateStore::new(dir.path());
        assert!(matches!(
            store.load("../secret"),
            Err(TemplateError::NotFound(_))
        ));
    }

    #[test]
    fn test_renderer_is_idempotent() {
        let renderer = TemplateRenderer::builtin();
        let p = params(&[
            ("steps_index", "agent_steps-*"),
            ("domain_filter", "TRUE"),
            ("task_filter", "task == \"refund\""),
            ("time_filter", "ts >= NOW() - 7 day"),
            ("limit", "500"),
        ]);
        let first = renderer.render("fail_reason_trends_daily", &p).unwrap();
        let second = renderer.render("fail_reason_trends_daily", &p).unwrap();
        assert_eq!(first, second);
        assert!(first.text.contains("LIMIT 500"));
        assert!(first.text.contains("task == \"refund\""));
    }
}
