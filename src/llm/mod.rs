pub mod gemini;

use crate::models::{AspectRatio, DesignPreferences, SlideData};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CarouselRequest {
    pub topic: String,
    pub niche: String,
    pub slide_count: u8,
    pub preferences: DesignPreferences,
}

/// Text fields of one slide as returned by content generation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GeneratedSlide {
    pub headline: String,
    pub body: String,
    #[serde(default)]
    pub visual_prompt: String,
}

impl From<GeneratedSlide> for SlideData {
    fn from(slide: GeneratedSlide) -> Self {
        SlideData::new(slide.headline, slide.body, slide.visual_prompt)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Headline,
    Body,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FieldRequest {
    pub topic: String,
    pub niche: String,
    pub field: TextField,
    pub headline: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EditImageRequest {
    /// `data:image/...;base64,` URL of the image being edited.
    pub image_url: String,
    pub instruction: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VideoRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    /// Optional still used as the first frame.
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CaptionRequest {
    pub topic: String,
    pub niche: String,
    pub slides: Vec<GeneratedSlide>,
}

/// The generative-AI collaborator. Image and video results are returned as
/// `data:` URLs.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate_slides(
        &self,
        api_key: &str,
        request: &CarouselRequest,
    ) -> Result<Vec<GeneratedSlide>, LlmError>;

    async fn rewrite_field(&self, api_key: &str, request: &FieldRequest) -> Result<String, LlmError>;

    async fn generate_image(&self, api_key: &str, request: &ImageRequest) -> Result<String, LlmError>;

    async fn edit_image(&self, api_key: &str, request: &EditImageRequest) -> Result<String, LlmError>;

    async fn generate_video(&self, api_key: &str, request: &VideoRequest) -> Result<String, LlmError>;

    async fn generate_caption(&self, api_key: &str, request: &CaptionRequest) -> Result<String, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No usable output: {0}")]
    NoOutput(String),
    #[error("API key not configured")]
    NotConfigured,
}

impl LlmError {
    /// The message an error classifier should look at: the raw response body
    /// for API errors, the display string otherwise.
    pub fn raw_message(&self) -> String {
        match self {
            LlmError::Api { message, .. } if !message.trim().is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}

impl Serialize for LlmError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
