//! Pure mapping between generation types and the `generateContent` JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use heirloom_core::prompt::frame_image_only;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::GenerationError;
use crate::types::{GeneratedImage, GenerationOutput, GenerationRequest};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Build the `generateContent` request body.
pub fn request_body(request: &GenerationRequest) -> Value {
    let prompt = if request.image_only {
        frame_image_only(&request.prompt)
    } else {
        request.prompt.clone()
    };

    let modalities = if request.image_only {
        json!(["IMAGE"])
    } else {
        json!(["TEXT", "IMAGE"])
    };

    let mut generation_config = json!({ "responseModalities": modalities });
    if let Some(temperature) = request.params.temperature {
        generation_config["temperature"] = json!(temperature);
    }
    if let Some(top_p) = request.params.top_p {
        generation_config["topP"] = json!(top_p);
    }

    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {
                    "inline_data": {
                        "mime_type": request.image.mime_type,
                        "data": STANDARD.encode(&request.image.bytes),
                    }
                },
                { "text": prompt },
            ]
        }],
        "generationConfig": generation_config,
    })
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    #[serde(alias = "inline_data")]
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(alias = "mime_type", default)]
    pub mime_type: Option<String>,
    pub data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

/// Collect images and text from every candidate.
///
/// A response without image parts (including a blocked prompt) yields an
/// empty `images` list rather than an error.
pub fn decode_response(
    response: GenerateContentResponse,
    model: &str,
) -> Result<GenerationOutput, GenerationError> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        tracing::warn!(model, block_reason = reason, "Prompt was blocked by the model");
    }

    let mut images = Vec::new();
    let mut texts: Vec<String> = Vec::new();

    for candidate in response.candidates {
        let Some(content) = candidate.content else {
            if let Some(reason) = candidate.finish_reason {
                tracing::debug!(model, finish_reason = %reason, "Candidate without content");
            }
            continue;
        };
        for part in content.parts {
            if let Some(inline) = part.inline_data {
                let bytes = STANDARD
                    .decode(inline.data.as_bytes())
                    .map_err(|e| GenerationError::Decode(format!("inline image data: {e}")))?;
                images.push(GeneratedImage {
                    bytes,
                    mime_type: inline.mime_type.unwrap_or_else(|| "image/png".into()),
                });
            }
            if let Some(text) = part.text.filter(|t| !t.trim().is_empty()) {
                texts.push(text);
            }
        }
    }

    Ok(GenerationOutput {
        images,
        text: if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        },
        model: model.to_string(),
    })
}
