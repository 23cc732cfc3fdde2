use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "photonarrator", about = "Narrates tagged photos with generated captions and speech")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the narration HTTP API
    Serve(ServeArgs),
    /// Print the emotion analysis for a local image as JSON
    Emotions(EmotionsArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[clap(long, env = "NARRATOR_LISTEN", default_value = "127.0.0.1:8000")]
    pub listen: String,

    #[clap(long, env = "NARRATOR_DATABASE", default_value = "./photos.db")]
    pub database: String,

    #[clap(long, env = "NARRATOR_UPLOAD_DIR", default_value = "uploads/narrations")]
    pub upload_dir: PathBuf,

    #[clap(long, env = "ELEVENLABS_API_KEY", hide_env_values = true)]
    pub elevenlabs_api_key: String,

    #[clap(long, env = "ELEVENLABS_URL", default_value = "https://api.elevenlabs.io/v1/text-to-speech")]
    pub elevenlabs_url: String,

    #[clap(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: String,

    #[clap(long, env = "GEMINI_MODEL", default_value = "gemini-2.0-flash")]
    pub gemini_model: String,

    #[clap(long, env = "GEMINI_URL", default_value = "https://generativelanguage.googleapis.com/v1beta")]
    pub gemini_url: String,
}

#[derive(Args, Debug)]
pub struct EmotionsArgs {
    /// Image on local storage
    pub image: PathBuf,

    #[clap(long, env = "DEEPFACE_URL", default_value = "http://127.0.0.1:5005")]
    pub deepface_url: String,
}
