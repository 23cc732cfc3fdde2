use crate::audio::NARRATION_URL_PREFIX;
use crate::error::NarrationError;
use crate::narration::{NarrationResult, Narrator};
use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::signal;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct NarrateForm {
    pub device_uri: String,
    pub user_id: String,
}

pub fn router(narrator: Narrator) -> Router {
    let uploads = ServeDir::new(&narrator.upload_dir);
    Router::new()
        .route("/narrate/", post(narrate_photo))
        .route("/health", get(health))
        .nest_service(NARRATION_URL_PREFIX, uploads)
        .layer(TraceLayer::new_for_http())
        .with_state(narrator)
}

async fn narrate_photo(
    State(narrator): State<Narrator>,
    form: Result<Form<NarrateForm>, FormRejection>,
) -> Result<Json<NarrationResult>, NarrationError> {
    let Form(form) = form.map_err(|rejection| NarrationError::InvalidInput(rejection.body_text()))?;
    let result = narrator.narrate(&form.device_uri, &form.user_id).await?;
    info!("Narration ready at {}", result.audio_url);
    Ok(Json(result))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
