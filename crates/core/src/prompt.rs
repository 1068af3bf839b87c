//! Prompt templates, use-case framing and generation parameters.
//!
//! Templates use `{{variable}}` placeholders. Unknown placeholders are left
//! in place so a missing variable is visible in the generated prompt rather
//! than silently erased.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Directive prepended to prompts whose use case demands a pure image result.
pub const IMAGE_ONLY_DIRECTIVE: &str = "Return only an image; no text.";

/// Use cases that must suppress explanatory text in the model response.
pub const IMAGE_ONLY_USE_CASES: &[&str] = &[
    "Color Restoration",
    "Modern Remake",
    "Creative Reimagining",
    "Restoration",
    "Creative Remake",
];

/// Execution priority assumed when a prompt does not carry one.
pub const DEFAULT_EXECUTION_PRIORITY: i64 = 99;

/// Upper bound applied to the sampling temperature of restoration calls.
pub const MAX_GENERATION_TEMPERATURE: f32 = 0.8;

/// Regex pattern matching `{{ name }}` placeholders.
pub const TEMPLATE_VARIABLE_PATTERN: &str = r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}";

static TEMPLATE_VARIABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TEMPLATE_VARIABLE_PATTERN).expect("valid regex"));

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Substitute `{{name}}` placeholders from `vars`.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> String {
    TEMPLATE_VARIABLE_RE
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match vars.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Names of all placeholders in `template`, de-duplicated, in first-seen order.
pub fn template_variables(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in TEMPLATE_VARIABLE_RE.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

// ---------------------------------------------------------------------------
// Use-case framing
// ---------------------------------------------------------------------------

/// Whether prompts tagged with `use_case` must request an image-only answer.
pub fn requires_image_only(use_case: &str) -> bool {
    let use_case = use_case.trim();
    IMAGE_ONLY_USE_CASES
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(use_case))
}

/// Prefix `prompt` with [`IMAGE_ONLY_DIRECTIVE`] unless it already starts with it.
pub fn frame_image_only(prompt: &str) -> String {
    if prompt.starts_with(IMAGE_ONLY_DIRECTIVE) {
        prompt.to_string()
    } else {
        format!("{IMAGE_ONLY_DIRECTIVE}\n\n{prompt}")
    }
}

// ---------------------------------------------------------------------------
// Workflow type
// ---------------------------------------------------------------------------

/// Controls whether a failing chain step aborts the remaining steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowType {
    /// Steps are independent: a failure is recorded and the chain moves on.
    #[default]
    Standalone,
    /// Steps depend on each other: the first failure stops the chain.
    Sequential,
}

impl WorkflowType {
    /// Parse a label case-insensitively. Anything unrecognised is `Standalone`.
    pub fn parse(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("sequential") {
            WorkflowType::Sequential
        } else {
            WorkflowType::Standalone
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowType::Standalone => "Standalone",
            WorkflowType::Sequential => "Sequential",
        }
    }

    pub fn stops_on_failure(self) -> bool {
        matches!(self, WorkflowType::Sequential)
    }
}

impl fmt::Display for WorkflowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable ascending sort by execution priority; ties keep their input order.
pub fn sort_by_priority<T>(items: &mut [T], priority: impl Fn(&T) -> i64) {
    items.sort_by_key(|item| priority(item));
}

// ---------------------------------------------------------------------------
// Generation parameters
// ---------------------------------------------------------------------------

/// Optional per-call overrides of the generation model configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl GenerationParams {
    /// Read `model`, `temperature` and `top_p` from a JSON object. Keys with
    /// the wrong type are ignored; non-objects yield the defaults.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };
        Self {
            model: map
                .get("model")
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
            temperature: map.get("temperature").and_then(|v| v.as_f64()).map(|t| t as f32),
            top_p: map.get("top_p").and_then(|v| v.as_f64()).map(|p| p as f32),
        }
    }

    /// Parse a JSON object held in a string field. Malformed JSON yields the
    /// defaults.
    pub fn from_json_str(raw: &str) -> Self {
        serde_json::from_str::<serde_json::Value>(raw)
            .map(|value| Self::from_json(&value))
            .unwrap_or_default()
    }

    /// Clamp temperature to [`MAX_GENERATION_TEMPERATURE`].
    pub fn capped(mut self) -> Self {
        if let Some(t) = self.temperature {
            self.temperature = Some(t.min(MAX_GENERATION_TEMPERATURE));
        }
        self
    }

    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: &GenerationParams) -> Self {
        Self {
            model: self.model.or_else(|| fallback.model.clone()),
            temperature: self.temperature.or(fallback.temperature),
            top_p: self.top_p.or(fallback.top_p),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
