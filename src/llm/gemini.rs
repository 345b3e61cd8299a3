use super::{
    CaptionRequest, CarouselRequest, EditImageRequest, FieldRequest, GeneratedSlide, GenerationBackend,
    ImageRequest, LlmError, TextField, VideoRequest,
};
use crate::config::Config;
use crate::data_url;
use crate::models::AspectRatio;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub video_model: String,
    pub poll_interval: Duration,
    /// Give up on a video operation after this many polls.
    pub max_polls: u32,
}

impl From<&Config> for GeminiConfig {
    fn from(config: &Config) -> Self {
        Self {
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            video_model: config.video_model.clone(),
            poll_interval: Duration::from_secs(config.video_poll_interval_secs),
            max_polls: 60,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<Value>,
    response: Option<Value>,
}

impl GenerateContentResponse {
    fn parts(self) -> impl Iterator<Item = Part> {
        self.candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
    }

    fn text(self) -> String {
        self.parts().filter_map(|p| p.text).collect::<Vec<_>>().join("")
    }

    fn image(self) -> Option<InlineData> {
        self.parts().find_map(|p| p.inline_data)
    }
}

fn user_text(text: String) -> Content {
    Content {
        role: Some("user".to_string()),
        parts: vec![Part {
            text: Some(text),
            inline_data: None,
        }],
    }
}

/// Models sometimes wrap JSON in a markdown fence despite the mime type.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn slides_schema() -> Value {
    json!({
        "type": "ARRAY",
        "items": {
            "type": "OBJECT",
            "properties": {
                "headline": { "type": "STRING" },
                "body": { "type": "STRING" },
                "visual_prompt": { "type": "STRING" }
            },
            "required": ["headline", "body", "visual_prompt"]
        }
    })
}

fn video_aspect_ratio(ratio: AspectRatio) -> &'static str {
    match ratio {
        AspectRatio::Story | AspectRatio::Portrait => "9:16",
        AspectRatio::Square => "16:9",
    }
}

pub struct GeminiBackend {
    config: GeminiConfig,
    client: Client,
}

impl GeminiBackend {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.config.base_url, model);
        tracing::debug!(model, "generateContent");
        let resp = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status,
                message: text,
            });
        }

        Ok(resp.json().await?)
    }

    async fn text_completion(&self, api_key: &str, prompt: String) -> Result<String, LlmError> {
        let body = GenerateContentRequest {
            contents: vec![user_text(prompt)],
            generation_config: None,
        };
        let text = self
            .generate_content(api_key, &self.config.text_model, &body)
            .await?
            .text();
        let text = text.trim().trim_matches('"').trim().to_string();
        if text.is_empty() {
            return Err(LlmError::NoOutput("empty text response".into()));
        }
        Ok(text)
    }

    async fn image_completion(&self, api_key: &str, body: GenerateContentRequest) -> Result<String, LlmError> {
        let image = self
            .generate_content(api_key, &self.config.image_model, &body)
            .await?
            .image()
            .ok_or_else(|| LlmError::NoOutput("response contained no image".into()))?;
        Ok(format!("data:{};base64,{}", image.mime_type, image.data))
    }

    async fn poll_operation(&self, api_key: &str, mut op: Operation) -> Result<Value, LlmError> {
        let mut polls = 0;
        while !op.done {
            if polls >= self.config.max_polls {
                return Err(LlmError::NoOutput(format!("video operation {} timed out", op.name)));
            }
            polls += 1;
            tokio::time::sleep(self.config.poll_interval).await;
            let resp = self
                .client
                .get(format!("{}/{}", self.config.base_url, op.name))
                .header("x-goog-api-key", api_key)
                .send()
                .await?;
            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let text = resp.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status,
                    message: text,
                });
            }
            op = resp.json().await?;
            tracing::debug!(operation = %op.name, done = op.done, polls, "Polled video operation");
        }

        if let Some(error) = op.error {
            return Err(LlmError::Api {
                status: 500,
                message: json!({ "error": error }).to_string(),
            });
        }
        op.response
            .ok_or_else(|| LlmError::NoOutput("video operation finished without a response".into()))
    }

    async fn download(&self, api_key: &str, uri: &str) -> Result<Vec<u8>, LlmError> {
        let resp = self
            .client
            .get(uri)
            .header("x-goog-api-key", api_key)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status,
                message: text,
            });
        }
        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        Ok(bytes)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate_slides(
        &self,
        api_key: &str,
        request: &CarouselRequest,
    ) -> Result<Vec<GeneratedSlide>, LlmError> {
        let prompt = format!(
            "Create an engaging social media carousel about \"{topic}\" for the {niche} niche.\n\
             Write exactly {count} slides. The first slide is a hook, the last slide is a call to action.\n\
             Each slide has a short punchy headline (max 8 words), a body of one or two sentences, \
             and a visual_prompt describing a background image without any text in it.",
            topic = request.topic,
            niche = request.niche,
            count = request.slide_count,
        );
        let body = GenerateContentRequest {
            contents: vec![user_text(prompt)],
            generation_config: Some(json!({
                "responseMimeType": "application/json",
                "responseSchema": slides_schema(),
            })),
        };
        let text = self
            .generate_content(api_key, &self.config.text_model, &body)
            .await?
            .text();
        let slides: Vec<GeneratedSlide> =
            serde_json::from_str(strip_code_fence(&text)).map_err(|e| LlmError::Parse(e.to_string()))?;
        if slides.is_empty() {
            return Err(LlmError::NoOutput("model returned no slides".into()));
        }
        Ok(slides)
    }

    async fn rewrite_field(&self, api_key: &str, request: &FieldRequest) -> Result<String, LlmError> {
        let prompt = match request.field {
            TextField::Headline => format!(
                "Rewrite this carousel slide headline about \"{}\" ({} niche) so it is more engaging. \
                 Max 8 words. Reply with the headline only.\nHeadline: {}\nBody: {}",
                request.topic, request.niche, request.headline, request.body
            ),
            TextField::Body => format!(
                "Rewrite this carousel slide body text about \"{}\" ({} niche) in one or two clear sentences. \
                 Reply with the body text only.\nHeadline: {}\nBody: {}",
                request.topic, request.niche, request.headline, request.body
            ),
        };
        self.text_completion(api_key, prompt).await
    }

    async fn generate_image(&self, api_key: &str, request: &ImageRequest) -> Result<String, LlmError> {
        let body = GenerateContentRequest {
            contents: vec![user_text(format!(
                "{}. No text, letters or watermarks in the image.",
                request.prompt
            ))],
            generation_config: Some(json!({
                "responseModalities": ["IMAGE"],
                "imageConfig": { "aspectRatio": request.aspect_ratio.as_ratio() },
            })),
        };
        self.image_completion(api_key, body).await
    }

    async fn edit_image(&self, api_key: &str, request: &EditImageRequest) -> Result<String, LlmError> {
        let (mime_type, data) = data_url::split(&request.image_url)
            .ok_or_else(|| LlmError::Parse("image to edit is not an inline data URL".into()))?;
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: mime_type.to_string(),
                            data: data.to_string(),
                        }),
                    },
                    Part {
                        text: Some(request.instruction.clone()),
                        inline_data: None,
                    },
                ],
            }],
            generation_config: Some(json!({ "responseModalities": ["IMAGE"] })),
        };
        self.image_completion(api_key, body).await
    }

    async fn generate_video(&self, api_key: &str, request: &VideoRequest) -> Result<String, LlmError> {
        let mut instance = json!({ "prompt": request.prompt });
        if let Some((mime_type, data)) = request.image_url.as_deref().and_then(data_url::split) {
            instance["image"] = json!({ "bytesBase64Encoded": data, "mimeType": mime_type });
        }
        let body = json!({
            "instances": [instance],
            "parameters": { "aspectRatio": video_aspect_ratio(request.aspect_ratio) },
        });

        let resp = self
            .client
            .post(format!(
                "{}/models/{}:predictLongRunning",
                self.config.base_url, self.config.video_model
            ))
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status,
                message: text,
            });
        }
        let op: Operation = resp.json().await?;
        tracing::info!(operation = %op.name, "Video generation started");

        let response = self.poll_operation(api_key, op).await?;
        let uri = response
            .pointer("/generateVideoResponse/generatedSamples/0/video/uri")
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::NoOutput("video response contained no sample".into()))?;
        let bytes = self.download(api_key, uri).await?;
        Ok(data_url::encode("video/mp4", &bytes))
    }

    async fn generate_caption(&self, api_key: &str, request: &CaptionRequest) -> Result<String, LlmError> {
        let outline = request
            .slides
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {} - {}", i + 1, s.headline, s.body))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Write a social media caption for a carousel about \"{}\" ({} niche). \
             Start with a hook, summarise the slides, end with a call to action and 3-5 hashtags.\n\
             Slides:\n{}",
            request.topic, request.niche, outline
        );
        self.text_completion(api_key, prompt).await
    }
}
