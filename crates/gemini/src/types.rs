//! Request and result types for image generation.

use heirloom_core::prompt::GenerationParams;

/// Source image sent alongside the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct InputImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl InputImage {
    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            mime_type: "image/png".into(),
        }
    }
}

/// One generation call: an image, an instruction and optional overrides.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image: InputImage,
    pub prompt: String,
    pub params: GenerationParams,
    /// Ask for a pure image answer: the prompt is framed with the
    /// image-only directive and text output is not requested.
    pub image_only: bool,
}

impl GenerationRequest {
    pub fn new(image: InputImage, prompt: impl Into<String>) -> Self {
        Self {
            image,
            prompt: prompt.into(),
            params: GenerationParams::default(),
            image_only: false,
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn image_only(mut self, image_only: bool) -> Self {
        self.image_only = image_only;
        self
    }
}

/// An image returned by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    /// File extension for the MIME type, without the dot. Unknown types are
    /// saved as PNG.
    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime_type)
    }
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}

/// Everything a generation call produced.
///
/// Zero images is a valid outcome, distinct from a transport or API error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOutput {
    pub images: Vec<GeneratedImage>,
    pub text: Option<String>,
    /// Model that served the request.
    pub model: String,
}

impl GenerationOutput {
    pub fn first_image(&self) -> Option<&GeneratedImage> {
        self.images.first()
    }
}
