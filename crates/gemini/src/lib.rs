//! Image generation client for the Gemini `generateContent` REST API.
//!
//! [`ImageGenerator`] is the seam the pipeline depends on. [`GeminiClient`]
//! implements it over HTTP; [`codec`] holds the pure request/response
//! mapping so it can be tested without a network.

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod types;

pub use client::{GeminiClient, ImageGenerator};
pub use config::GeminiConfig;
pub use error::GenerationError;
pub use types::{GeneratedImage, GenerationOutput, GenerationRequest, InputImage};
