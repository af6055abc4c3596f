//! Text-to-speech client. The service streams audio back; chunks are written
//! straight to `<output_dir>/voice_<filename>`.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{MlClientError, MlClientResult};
use crate::traits::SpeechSynthesizer;

/// Prefix of every synthesized audio file.
pub const VOICE_PREFIX: &str = "voice_";

/// Speech service configuration.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub output_dir: PathBuf,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/synthesize".to_string(),
            timeout_secs: 30,
            output_dir: PathBuf::from("output_voice"),
        }
    }
}

impl SpeechConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("SPEECH_API_URL").unwrap_or(defaults.api_url),
            timeout_secs: std::env::var("SPEECH_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            output_dir: std::env::var("AUDIO_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
        }
    }

    /// Where audio for `filename` lands.
    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.output_dir.join(format!("{}{}", VOICE_PREFIX, filename))
    }
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    filename: &'a str,
}

/// HTTP speech client.
#[derive(Debug, Clone)]
pub struct SpeechClient {
    config: SpeechConfig,
    client: Client,
}

impl SpeechClient {
    pub fn new(config: SpeechConfig) -> MlClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }
}

#[async_trait]
impl SpeechSynthesizer for SpeechClient {
    async fn synthesize(&self, text: &str, filename: &str) -> MlClientResult<PathBuf> {
        let output = self.config.output_path(filename);
        let remote_name = output.to_string_lossy().into_owned();

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&SynthesizeRequest {
                text,
                filename: &remote_name,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MlClientError::status(status, body));
        }

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let mut file = tokio::fs::File::create(&output).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len();
        }
        file.flush().await?;

        if written == 0 {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(MlClientError::invalid_response("speech service returned no audio"));
        }

        info!(path = %output.display(), bytes = written, "Speech synthesized");
        Ok(output)
    }
}
