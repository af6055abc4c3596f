//! Chat-completions client that writes a one-line roast of a captured photo.
//!
//! The image travels inline as a base64 `data:` URL in an OpenAI-style
//! multimodal message.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{MlClientError, MlClientResult};
use crate::traits::CommentaryGenerator;

const DEFAULT_SYSTEM_PROMPT: &str = "You are a sharp-tongued, absurdist AI reporter. \
Given a photo of a person, write one short, ridiculous, teasing review that ends with a \
price appraisal. Never exceed 30 words.";

const DEFAULT_USER_PROMPT: &str =
    "Write one snarky review of the person in this image, funny, under 30 words, and it must include a price.";

/// Commentary service configuration.
#[derive(Debug, Clone)]
pub struct CommentaryConfig {
    /// Chat-completions endpoint
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
    pub user_prompt: String,
}

impl Default for CommentaryConfig {
    fn default() -> Self {
        Self {
            api_url: "https://qianfan.baidubce.com/v2/chat/completions".to_string(),
            api_key: String::new(),
            model: "deepseek-vl2".to_string(),
            timeout_secs: 30,
            temperature: 0.9,
            max_tokens: 100,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            user_prompt: DEFAULT_USER_PROMPT.to_string(),
        }
    }
}

impl CommentaryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("COMMENTARY_API_URL").unwrap_or(defaults.api_url),
            api_key: std::env::var("COMMENTARY_API_KEY").unwrap_or_default(),
            model: std::env::var("COMMENTARY_MODEL").unwrap_or(defaults.model),
            timeout_secs: std::env::var("COMMENTARY_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            ..defaults
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: MessageContent<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Parts(Vec<ContentPart<'a>>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// HTTP commentary client.
#[derive(Debug, Clone)]
pub struct CommentaryClient {
    config: CommentaryConfig,
    client: Client,
}

impl CommentaryClient {
    pub fn new(config: CommentaryConfig) -> MlClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> MlClientResult<Self> {
        Self::new(CommentaryConfig::from_env())
    }

    /// Request commentary for raw JPEG bytes.
    pub async fn comment_on(&self, jpeg: &[u8]) -> MlClientResult<Option<String>> {
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg));
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(&self.config.system_prompt),
                },
                ChatMessage {
                    role: "user",
                    content: MessageContent::Parts(vec![
                        ContentPart::Text {
                            text: &self.config.user_prompt,
                        },
                        ContentPart::ImageUrl {
                            image_url: ImageUrl { url: data_url },
                        },
                    ]),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut builder = self.client.post(&self.config.api_url).json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MlClientError::status(status, body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| MlClientError::invalid_response(format!("commentary response: {}", e)))?;

        let comment = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());

        match &comment {
            Some(text) => debug!(chars = text.chars().count(), "Commentary received"),
            None => warn!("Commentary service returned no content"),
        }
        Ok(comment)
    }
}

#[async_trait]
impl CommentaryGenerator for CommentaryClient {
    async fn generate(&self, image_path: &Path) -> MlClientResult<Option<String>> {
        let jpeg = tokio::fs::read(image_path).await?;
        info!(path = %image_path.display(), bytes = jpeg.len(), "Requesting commentary");
        self.comment_on(&jpeg).await
    }
}
