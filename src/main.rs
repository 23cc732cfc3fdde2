mod args;
mod audio;
mod caption;
mod error;
mod faces;
mod narration;
mod server;
mod store;
mod tts;

use anyhow::Context;
use args::{Cli, Commands, EmotionsArgs, ServeArgs};
use caption::GeminiCaptioner;
use clap::Parser;
use faces::EmotionExtractor;
use narration::Narrator;
use std::fs;
use std::sync::Arc;
use store::SqlitePhotoStore;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tts::ElevenLabsClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Commands::Serve(args) => serve(args).await,
        Commands::Emotions(args) => emotions(args).await,
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    fs::create_dir_all(&args.upload_dir)
        .with_context(|| format!("creating upload dir {}", args.upload_dir.display()))?;
    info!("Storing narrations in {}", args.upload_dir.display());

    let store = SqlitePhotoStore::open(&args.database)
        .with_context(|| format!("opening photo database {}", args.database))?;
    info!("Photo database opened: {}", args.database);

    let narrator = Narrator {
        store: Arc::new(store),
        captioner: Arc::new(GeminiCaptioner::new(
            &args.gemini_url,
            &args.gemini_model,
            &args.gemini_api_key,
        )),
        synthesizer: Arc::new(ElevenLabsClient::new(&args.elevenlabs_url, &args.elevenlabs_api_key)),
        upload_dir: args.upload_dir,
    };

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, server::router(narrator))
        .with_graceful_shutdown(server::shutdown_signal())
        .await?;

    info!("Server stopped.");
    Ok(())
}

async fn emotions(args: EmotionsArgs) -> anyhow::Result<()> {
    let extractor = EmotionExtractor::deepface(&args.deepface_url);
    let outcome = extractor.extract_emotions(&args.image).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
