use crate::error::CaptionError;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

#[async_trait]
pub trait CaptionGenerator: Send + Sync {
    async fn generate_description(
        &self,
        device_uri: &str,
        objects: &[String],
        emotions: &[Value],
    ) -> Result<String, CaptionError>;
}

pub struct GeminiCaptioner {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiCaptioner {
    pub fn new(base_url: &str, model: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }
}

/// Short human-readable summary of a face entry, e.g. `happy` or `sad (age 34)`.
fn describe_emotion(entry: &Value) -> String {
    let emotion = entry
        .get("dominant_emotion")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| entry.to_string());
    match entry.get("age").and_then(Value::as_u64) {
        Some(age) => format!("{} (age {})", emotion, age),
        None => emotion,
    }
}

pub fn build_prompt(device_uri: &str, objects: &[String], emotions: &[Value]) -> String {
    let objects = if objects.is_empty() {
        "none detected".to_string()
    } else {
        objects.join(", ")
    };
    let emotions = if emotions.is_empty() {
        "no faces detected".to_string()
    } else {
        emotions.iter().map(describe_emotion).collect::<Vec<_>>().join(", ")
    };
    format!(
        "Write a warm, vivid two to three sentence narration of a personal photo ({}) \
         to be read aloud. Objects in the photo: {}. Facial expressions: {}. \
         Only mention what is listed; do not use markdown.",
        device_uri, objects, emotions
    )
}

#[async_trait]
impl CaptionGenerator for GeminiCaptioner {
    async fn generate_description(
        &self,
        device_uri: &str,
        objects: &[String],
        emotions: &[Value],
    ) -> Result<String, CaptionError> {
        let prompt = build_prompt(device_uri, objects, emotions);
        debug!("Caption prompt: {}", prompt);
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let res = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(CaptionError::Status { status: status.as_u16(), body });
        }

        let parsed: GenerateContentResponse = res.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(CaptionError::Empty);
        }
        info!("Generated description for {} ({} chars)", device_uri, text.len());
        Ok(text)
    }
}
