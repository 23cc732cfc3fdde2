use crate::error::ArtifactError;
use crate::tts::AudioStream;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub const NARRATION_URL_PREFIX: &str = "/uploads/narrations";

/// Final path component of a device URI, treating both `/` and `\` as separators.
pub fn basename(device_uri: &str) -> &str {
    device_uri
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(device_uri)
}

pub fn artifact_file_name(user_id: &str, device_uri: &str) -> String {
    format!("{}_{}.mp3", user_id, basename(device_uri))
}

pub fn artifact_path(upload_dir: &Path, user_id: &str, device_uri: &str) -> PathBuf {
    upload_dir.join(artifact_file_name(user_id, device_uri))
}

pub fn artifact_url(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    format!("{}/{}", NARRATION_URL_PREFIX, name)
}

/// Streams `audio` into `dest`, replacing any existing file only once the
/// whole body has been written. Each call writes its own temporary file in the
/// destination directory, so concurrent writers never share partial data.
pub async fn write_audio_stream(dest: &Path, mut audio: AudioStream) -> Result<u64, ArtifactError> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let io_err = |source| ArtifactError::Io { path: dest.to_path_buf(), source };

    let (std_file, tmp) = tempfile::Builder::new()
        .prefix(".narration-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(io_err)?
        .into_parts();
    // `tmp` deletes the file on drop, so every early return below cleans up.
    let mut file = File::from_std(std_file);

    let mut written = 0u64;
    while let Some(chunk) = audio.next().await {
        let chunk = chunk.map_err(|source| ArtifactError::Stream { path: dest.to_path_buf(), source })?;
        if chunk.is_empty() {
            continue;
        }
        file.write_all(&chunk).await.map_err(io_err)?;
        written += chunk.len() as u64;
        debug!("Wrote {} bytes to {}", written, tmp.display());
    }
    file.flush().await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    drop(file);

    tmp.persist(dest).map_err(|e| io_err(e.error))?;
    info!("Audio written to {} ({} bytes)", dest.display(), written);
    Ok(written)
}
