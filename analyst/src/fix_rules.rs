//! Failure taxonomy to remediation catalogue.
//!
//! The built-in catalogue is created once and shared. A TOML file can replace
//! the fix list of individual reasons (or add new reasons); the merged table
//! is immutable afterwards.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Bucket used for reasons the catalogue does not know.
pub const UNKNOWN_REASON: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Med,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Med => "med",
            Confidence::High => "high",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixDescriptor {
    pub id: String,
    pub title: String,
    #[serde(alias = "rationale")]
    pub why: String,
    pub confidence: Confidence,
}

#[derive(Debug, Error)]
pub enum FixRuleError {
    #[error("Failed to read fix rules {path}: {message}")]
    Io { path: String, message: String },

    #[error("Invalid fix rules: {0}")]
    Parse(String),

    #[error("Reason '{reason}' lists fix '{id}' more than once")]
    DuplicateFix { reason: String, id: String },
}

type Entry = (&'static str, &'static str, &'static str, Confidence);

const BUILTIN: &[(&str, &[Entry])] = &[
    (
        "not_found",
        &[
            (
                "nf_nav_links",
                "Add clear top-nav and footer links to the target page",
                "The agent cannot locate the information; obvious Pricing/Refund/Contact links shrink the search space.",
                Confidence::High,
            ),
            (
                "nf_sitemap",
                "Publish a sitemap and keep URL structure consistent",
                "Discoverability improves and breadth-first crawls miss fewer pages.",
                Confidence::Med,
            ),
            (
                "nf_onpage_keywords",
                "Put explicit keywords ('Pricing', 'Refund Policy') in visible page text",
                "Heuristic extractors and human readers both rely on visible keywords.",
                Confidence::High,
            ),
        ],
    ),
    (
        "hard_to_find",
        &[
            (
                "htf_above_fold",
                "Move key information above the fold and cut click depth",
                "The signals exist but are weak or deep; restructuring reduces max-step failures.",
                Confidence::High,
            ),
            (
                "htf_anchor_text",
                "Use unambiguous anchor text for critical links",
                "Generic labels like 'Learn more' hide critical pages; label them 'Pricing', 'Refund Policy', 'Contact'.",
                Confidence::High,
            ),
        ],
    ),
    (
        "js_only",
        &[
            (
                "js_ssr",
                "Server-render critical content instead of late client-side rendering",
                "Text that appears only after heavy scripts runs is classified as JS-only and extraction fails.",
                Confidence::High,
            ),
            (
                "js_noscript",
                "Provide a <noscript> or minimal HTML fallback",
                "Essential information stays available when scripts are blocked or time out.",
                Confidence::Med,
            ),
            (
                "js_reduce_payload",
                "Shrink initial HTML and script payload to speed up first paint",
                "A large payload with little visible text triggers JS-only heuristics and timeouts.",
                Confidence::Med,
            ),
        ],
    ),
    (
        "non_text",
        &[
            (
                "nt_html_version",
                "Offer an HTML version of the policy, not only a PDF or image",
                "Non-text pages resist deterministic extraction; HTML is searchable and accessible.",
                Confidence::High,
            ),
            (
                "nt_link_label",
                "Label downloads clearly, e.g. 'Refund Policy (PDF)'",
                "Link text without the key terms gets skipped even when the document exists.",
                Confidence::Med,
            ),
        ],
    ),
    (
        "ambiguous",
        &[
            (
                "amb_disambiguate",
                "Disambiguate similar links and headings",
                "Ambiguity sends the agent down wrong paths; clearer information architecture avoids it.",
                Confidence::Med,
            ),
            (
                "amb_single_source",
                "Consolidate one canonical page each for Pricing, Refund and Contact",
                "Scattered references produce inconsistent extraction.",
                Confidence::Med,
            ),
        ],
    ),
    (
        "blocked",
        &[
            (
                "blk_allowlist",
                "Allowlist the test environment for permitted QA runs",
                "Crawlers must not bypass bot protection; test against a controlled environment instead.",
                Confidence::High,
            ),
            (
                "blk_robots_test",
                "Expose a QA-friendly staging domain for agent testing",
                "Production protections stay intact while tests remain deterministic.",
                Confidence::High,
            ),
        ],
    ),
    (
        "timeout",
        &[
            (
                "to_perf",
                "Improve page performance (fewer scripts, lighter images, fewer third parties)",
                "Timeouts track slow rendering, slow networks and heavy client work.",
                Confidence::High,
            ),
            (
                "to_critical_content_fast",
                "Render key information early and avoid late hydration of essential text",
                "Content that eventually appears still times out and leaves no evidence.",
                Confidence::High,
            ),
        ],
    ),
    (
        "requires_login",
        &[(
            "rl_public_info",
            "Publish Pricing, Refund and Contact information without a login wall",
            "The agent never authenticates, so gated basics are invisible to it.",
            Confidence::High,
        )],
    ),
    (
        "unknown",
        &[(
            "unk_instrument",
            "Improve observability: clearer failure notes and page hints",
            "Unknown buckets mean too little evidence; better instrumentation sharpens diagnosis.",
            Confidence::Low,
        )],
    ),
];

static BUILTIN_TABLE: Lazy<FixRuleTable> = Lazy::new(|| {
    let rules = BUILTIN
        .iter()
        .map(|(reason, fixes)| {
            let fixes = fixes
                .iter()
                .map(|(id, title, why, confidence)| FixDescriptor {
                    id: id.to_string(),
                    title: title.to_string(),
                    why: why.to_string(),
                    confidence: *confidence,
                })
                .collect();
            (reason.to_string(), fixes)
        })
        .collect();
    FixRuleTable { rules }
});

/// Reason → ordered fixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixRuleTable {
    rules: IndexMap<String, Vec<FixDescriptor>>,
}

impl FixRuleTable {
    pub fn builtin() -> &'static FixRuleTable {
        &BUILTIN_TABLE
    }

    /// Built-in catalogue with the reasons listed in `content` replaced.
    ///
    /// ```toml
    /// [[timeout]]
    /// id = "to_cdn"
    /// title = "Serve static assets from a CDN"
    /// why = "..."
    /// confidence = "med"
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self, FixRuleError> {
        let overrides: IndexMap<String, Vec<FixDescriptor>> =
            toml::from_str(content).map_err(|e| FixRuleError::Parse(e.to_string()))?;
        let mut table = Self::builtin().clone();
        for (reason, fixes) in overrides {
            let mut seen = std::collections::HashSet::new();
            if let Some(dup) = fixes.iter().find(|f| !seen.insert(f.id.clone())) {
                return Err(FixRuleError::DuplicateFix {
                    reason,
                    id: dup.id.clone(),
                });
            }
            table.rules.insert(reason, fixes);
        }
        Ok(table)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FixRuleError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| FixRuleError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Fixes for a reason. Empty reasons map to nothing; uncatalogued reasons
    /// map to the `unknown` bucket.
    pub fn fixes_for(&self, reason: &str) -> &[FixDescriptor] {
        if reason.is_empty() {
            return &[];
        }
        self.rules
            .get(reason)
            .or_else(|| self.rules.get(UNKNOWN_REASON))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn reasons(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

impl Default for FixRuleTable {
    fn default() -> Self {
        Self::builtin().clone()
    }
}
