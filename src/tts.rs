use crate::error::SynthesisError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use tracing::{error, info};

pub const ELEVEN_VOICE_ID: &str = "EXAVITQu4vr4xnSDxMaL";
pub const ELEVEN_MODEL_ID: &str = "eleven_multilingual_v1";

pub type AudioStream = BoxStream<'static, Result<Bytes, SynthesisError>>;

#[derive(Debug, Serialize)]
pub struct SpeechRequest<'a> {
    pub voice: &'a str,
    pub model: &'a str,
    pub text: &'a str,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Starts synthesis and hands back the audio body as it arrives.
    /// Any status other than 200 is `SynthesisError::Status`.
    async fn synthesize(&self, request: SpeechRequest<'_>) -> Result<AudioStream, SynthesisError>;
}

pub struct ElevenLabsClient {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl ElevenLabsClient {
    pub fn new(url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, request: SpeechRequest<'_>) -> Result<AudioStream, SynthesisError> {
        info!(
            "Requesting speech ({} chars, voice {}, model {})",
            request.text.len(),
            request.voice,
            request.model
        );
        let res = self
            .client
            .post(&self.url)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if res.status() != reqwest::StatusCode::OK {
            error!("Speech service returned status {}", res.status());
            return Err(SynthesisError::Status(res.status().as_u16()));
        }

        Ok(res.bytes_stream().map(|chunk| chunk.map_err(SynthesisError::from)).boxed())
    }
}
