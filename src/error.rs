use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::path::PathBuf;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("column {column} is not valid JSON: {source}")]
    Decode {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("caption request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("caption service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("caption service returned no text")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("speech request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("speech service returned status {0}")]
    Status(u16),
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to write audio artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("audio stream interrupted while writing {path}: {source}")]
    Stream {
        path: PathBuf,
        #[source]
        source: SynthesisError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum NarrationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("Photo not found")]
    PhotoNotFound,
    #[error("ElevenLabs TTS failed")]
    SynthesisFailed(#[source] SynthesisError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Caption(#[from] CaptionError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl NarrationError {
    /// Not-found and speech failures carry 404 and 502 here; older clients that
    /// expected a 200 with an `error` body must check the status as well.
    pub fn status(&self) -> StatusCode {
        match self {
            NarrationError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            NarrationError::PhotoNotFound => StatusCode::NOT_FOUND,
            NarrationError::SynthesisFailed(_) => StatusCode::BAD_GATEWAY,
            NarrationError::Store(_) | NarrationError::Caption(_) | NarrationError::Artifact(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for NarrationError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Narration failed: {:?}", self);
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
