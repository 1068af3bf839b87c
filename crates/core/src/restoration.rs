//! Restoration directives.
//!
//! Single-image jobs carry a `restoration_type` which selects a fixed
//! directive. Chain steps without their own template fall back to a
//! category prompt chosen by step number.

use serde::{Deserialize, Serialize};

/// Directive used when nothing more specific is available.
pub const DEFAULT_DIRECTIVE: &str = "Restore and enhance this vintage photograph. Improve clarity, \
remove damage, and preserve historical authenticity.";

/// Known single-image restoration types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorationType {
    Standard,
    Colorize,
    Enhance,
    DamageRepair,
    Creative,
}

impl RestorationType {
    pub const ALL: [RestorationType; 5] = [
        RestorationType::Standard,
        RestorationType::Colorize,
        RestorationType::Enhance,
        RestorationType::DamageRepair,
        RestorationType::Creative,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RestorationType::Standard => "standard",
            RestorationType::Colorize => "colorize",
            RestorationType::Enhance => "enhance",
            RestorationType::DamageRepair => "damage_repair",
            RestorationType::Creative => "creative",
        }
    }

    /// Case-insensitive lookup; spaces and dashes count as underscores.
    pub fn parse(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|t| t.as_str() == normalized)
    }

    pub fn directive(self) -> &'static str {
        match self {
            RestorationType::Standard => DEFAULT_DIRECTIVE,
            RestorationType::Colorize => {
                "Restore this vintage photograph and colorize it. Remove damage, dust and \
                 fading, then add natural, historically accurate colors to skin tones, \
                 clothing and background. Preserve the original people and composition."
            }
            RestorationType::Enhance => {
                "Enhance this photograph. Improve overall quality, sharpness and clarity, and \
                 balance contrast and brightness. Keep all original elements intact."
            }
            RestorationType::DamageRepair => {
                "Repair the physical damage in this vintage photograph. Remove tears, creases, \
                 scratches, stains and missing corners. Reconstruct damaged areas faithfully \
                 without altering faces or composition."
            }
            RestorationType::Creative => {
                "Create an artistic interpretation of this vintage photograph. Maintain the \
                 original composition and people but add creative elements and modern styling."
            }
        }
    }
}

/// Prompt text for a `restoration_type` string.
///
/// Unknown types fall back to the standard directive with the type appended
/// as a hint so the request is never rejected for an unfamiliar label.
pub fn directive_for(restoration_type: &str) -> String {
    match RestorationType::parse(restoration_type) {
        Some(kind) => kind.directive().to_string(),
        None if restoration_type.trim().is_empty() => DEFAULT_DIRECTIVE.to_string(),
        None => format!(
            "{DEFAULT_DIRECTIVE} Restoration focus: {}.",
            restoration_type.trim()
        ),
    }
}

// ---------------------------------------------------------------------------
// Category step prompts
// ---------------------------------------------------------------------------

/// Prompt categories with built-in three-step progressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptCategory {
    Restoration,
    Enhancement,
    CreativeRemake,
}

impl PromptCategory {
    /// Exact label match; everything else is treated as `Restoration`.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Enhancement" => PromptCategory::Enhancement,
            "Creative Remake" => PromptCategory::CreativeRemake,
            _ => PromptCategory::Restoration,
        }
    }

    /// Built-in prompt for `step` (1-based). Steps past the third reuse the
    /// final prompt; step 0 is treated as step 1.
    pub fn step_prompt(self, step: usize) -> &'static str {
        match (step.clamp(1, 3), self) {
            (1, PromptCategory::Restoration) => {
                "Generate a professionally restored version of this vintage photograph. Remove \
                 all damage, dust, scratches, and fading. Enhance clarity and sharpness. Preserve \
                 the original people, composition, and vintage aesthetic. Output a clean, \
                 restored vintage photograph."
            }
            (1, PromptCategory::Enhancement) => {
                "Generate an enhanced version of this photograph. Improve overall quality, \
                 sharpness, and clarity. Adjust contrast and brightness for optimal viewing. \
                 Keep all original elements intact."
            }
            (1, PromptCategory::CreativeRemake) => {
                "Create an artistic interpretation of this vintage photograph. Maintain the \
                 original composition and people but add creative elements and modern styling."
            }
            (2, PromptCategory::Restoration) => {
                "Based on the previous restoration, generate a colorized version. Add natural, \
                 historically accurate colors. Enhance skin tones, clothing colors, and \
                 background. Make it look like it was originally shot in color."
            }
            (2, PromptCategory::Enhancement) => {
                "Generate a further enhanced version with improved lighting and detail. Add \
                 subtle color correction, enhance facial features, improve background clarity."
            }
            (2, PromptCategory::CreativeRemake) => {
                "Transform the previous version with dramatic artistic effects. Add cinematic \
                 lighting, enhanced colors, and professional photography aesthetics."
            }
            (_, PromptCategory::Restoration) => {
                "Generate the final museum-quality restoration. Apply professional color \
                 grading, maximize detail and sharpness. Create a pristine restoration that \
                 looks freshly photographed with period-appropriate equipment."
            }
            (_, PromptCategory::Enhancement) => {
                "Generate the final ultra-high-quality version. Apply professional finishing \
                 touches, ensure perfect color balance, maximum sharpness, and gallery-ready \
                 presentation."
            }
            (_, PromptCategory::CreativeRemake) => {
                "Create the final artistic masterpiece. Apply cinematic color grading, dramatic \
                 lighting effects, and create a stunning modern interpretation while preserving \
                 the original subjects."
            }
        }
    }
}
