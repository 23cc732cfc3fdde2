use crate::audio::{artifact_path, artifact_url, basename, write_audio_stream};
use crate::caption::CaptionGenerator;
use crate::error::NarrationError;
use crate::store::PhotoStore;
use crate::tts::{ELEVEN_MODEL_ID, ELEVEN_VOICE_ID, SpeechRequest, SpeechSynthesizer};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrationResult {
    pub description: String,
    pub audio_url: String,
}

/// Everything a narration request needs. Cheap to clone; shared by all requests.
#[derive(Clone)]
pub struct Narrator {
    pub store: Arc<dyn PhotoStore>,
    pub captioner: Arc<dyn CaptionGenerator>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub upload_dir: PathBuf,
}

fn validate(device_uri: &str, user_id: &str) -> Result<(), NarrationError> {
    if device_uri.trim().is_empty() {
        return Err(NarrationError::InvalidInput("device_uri is required".into()));
    }
    if user_id.trim().is_empty() {
        return Err(NarrationError::InvalidInput("user_id is required".into()));
    }
    if user_id.contains(['/', '\\']) || user_id.contains("..") {
        return Err(NarrationError::InvalidInput("user_id contains path characters".into()));
    }
    match basename(device_uri) {
        "" | "." | ".." => Err(NarrationError::InvalidInput(
            "device_uri has no file name".into(),
        )),
        _ => Ok(()),
    }
}

impl Narrator {
    pub async fn narrate(&self, device_uri: &str, user_id: &str) -> Result<NarrationResult, NarrationError> {
        validate(device_uri, user_id)?;
        info!("Narrating {} for user {}", device_uri, user_id);

        let Some(record) = self.store.fetch_photo(device_uri).await? else {
            warn!("Photo not found: {}", device_uri);
            return Err(NarrationError::PhotoNotFound);
        };
        let objects = record.object_labels();
        let emotions = record.emotions();
        debug!(
            "{} objects, {} face entries, metadata present: {}",
            objects.len(),
            emotions.len(),
            record.metadata.is_some()
        );

        let description = self
            .captioner
            .generate_description(device_uri, &objects, &emotions)
            .await?;
        debug!("Description preview: {:.200}", description);

        let audio_path = artifact_path(&self.upload_dir, user_id, device_uri);
        let audio = self
            .synthesizer
            .synthesize(SpeechRequest {
                voice: ELEVEN_VOICE_ID,
                model: ELEVEN_MODEL_ID,
                text: &description,
            })
            .await
            .map_err(NarrationError::SynthesisFailed)?;

        write_audio_stream(&audio_path, audio).await?;

        Ok(NarrationResult {
            audio_url: artifact_url(&audio_path),
            description,
        })
    }
}
