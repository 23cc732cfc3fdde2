use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use serde::Serialize;
use serde_json::{Value, json};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub const DETECTOR_BACKEND: &str = "retinaface";
pub const EXPAND_PERCENTAGE: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    #[error("failed to load image: {0}")]
    Image(#[from] image::ImageError),
    #[error("face analysis backend unavailable: {0}")]
    Init(String),
    #[error("face analysis request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("face analysis returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("image task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Either the analysis result or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EmotionOutcome {
    Faces(Value),
    Error { error: String },
}

#[derive(Debug)]
pub struct AnalyzeOptions {
    pub actions: Vec<&'static str>,
    pub detector_backend: &'static str,
    pub align: bool,
    pub expand_percentage: u32,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self {
            actions: vec!["emotion"],
            detector_backend: DETECTOR_BACKEND,
            align: true,
            expand_percentage: EXPAND_PERCENTAGE,
        }
    }
}

#[async_trait]
pub trait FaceAnalyzer: Send + Sync {
    async fn analyze(&self, image: &RgbImage, options: &AnalyzeOptions) -> Result<Value, FaceError>;
}

/// Client for a DeepFace REST server (`POST /analyze`).
pub struct DeepFaceClient {
    client: reqwest::Client,
    url: String,
}

impl DeepFaceClient {
    pub fn new(base_url: &str) -> Result<Self, FaceError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url: format!("{}/analyze", base_url.trim_end_matches('/')),
        })
    }
}

fn png_data_uri(image: &RgbImage) -> Result<String, FaceError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image.clone()).write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(buf)))
}

#[async_trait]
impl FaceAnalyzer for DeepFaceClient {
    async fn analyze(&self, image: &RgbImage, options: &AnalyzeOptions) -> Result<Value, FaceError> {
        let body = json!({
            "img": png_data_uri(image)?,
            "actions": options.actions,
            "detector_backend": options.detector_backend,
            "align": options.align,
            "expand_percentage": options.expand_percentage,
        });

        let res = self.client.post(&self.url).json(&body).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(FaceError::Status { status: status.as_u16(), body });
        }
        let mut parsed: Value = res.json().await?;
        Ok(match parsed.get_mut("results") {
            Some(results) => results.take(),
            None => parsed,
        })
    }
}

type AnalyzerFactory = Box<dyn Fn() -> Result<Arc<dyn FaceAnalyzer>, FaceError> + Send + Sync>;

/// Runs emotion analysis on local images. The analyzer is built on first use,
/// so a broken backend never stops the process from starting.
pub struct EmotionExtractor {
    analyzer: OnceCell<Arc<dyn FaceAnalyzer>>,
    factory: AnalyzerFactory,
}

impl EmotionExtractor {
    pub fn new(factory: AnalyzerFactory) -> Self {
        Self { analyzer: OnceCell::new(), factory }
    }

    pub fn deepface(base_url: &str) -> Self {
        let base_url = base_url.to_string();
        Self::new(Box::new(move || {
            DeepFaceClient::new(&base_url)
                .map(|client| Arc::new(client) as Arc<dyn FaceAnalyzer>)
                .map_err(|e| FaceError::Init(e.to_string()))
        }))
    }

    async fn analyzer(&self) -> Result<&Arc<dyn FaceAnalyzer>, FaceError> {
        self.analyzer
            .get_or_try_init(|| async {
                info!("Initializing face analysis backend");
                (self.factory)()
            })
            .await
    }

    async fn try_extract(&self, image_path: &Path) -> Result<Value, FaceError> {
        let analyzer = self.analyzer().await?;
        let path: PathBuf = image_path.to_path_buf();
        let rgb = tokio::task::spawn_blocking(move || image::open(path).map(|img| img.to_rgb8())).await??;
        debug!("Loaded {} ({}x{})", image_path.display(), rgb.width(), rgb.height());
        analyzer.analyze(&rgb, &AnalyzeOptions::default()).await
    }

    /// Never fails: every fault comes back as `EmotionOutcome::Error`.
    pub async fn extract_emotions(&self, image_path: &Path) -> EmotionOutcome {
        match self.try_extract(image_path).await {
            Ok(faces) => EmotionOutcome::Faces(faces),
            Err(e) => {
                warn!("Emotion extraction failed for {}: {}", image_path.display(), e);
                EmotionOutcome::Error { error: e.to_string() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Recording {
        sizes: std::sync::Mutex<Vec<(u32, u32)>>,
    }

    #[async_trait]
    impl FaceAnalyzer for Recording {
        async fn analyze(&self, image: &RgbImage, options: &AnalyzeOptions) -> Result<Value, FaceError> {
            assert_eq!(options.actions, vec!["emotion"]);
            assert_eq!(options.detector_backend, "retinaface");
            assert!(options.align);
            assert_eq!(options.expand_percentage, 10);
            self.sizes.lock().unwrap().push(image.dimensions());
            Ok(json!([{ "dominant_emotion": "happy" }]))
        }
    }

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(4, 3, image::Rgb([200, 10, 10])).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn returns_analyzer_result() {
        let dir = tempfile::tempdir().unwrap();
        let img = write_png(dir.path(), "face.png");
        let analyzer = Arc::new(Recording { sizes: Default::default() });
        let shared = analyzer.clone();
        let extractor = EmotionExtractor::new(Box::new(move || Ok::<_, FaceError>(shared.clone() as Arc<dyn FaceAnalyzer>)));

        let outcome = extractor.extract_emotions(&img).await;
        assert_eq!(outcome, EmotionOutcome::Faces(json!([{ "dominant_emotion": "happy" }])));
        assert_eq!(analyzer.sizes.lock().unwrap().as_slice(), &[(4, 3)]);
    }

    #[tokio::test]
    async fn corrupt_image_is_an_error_value() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("broken.jpg");
        std::fs::write(&img, b"definitely not a jpeg").unwrap();
        let extractor = EmotionExtractor::new(Box::new(|| {
            Ok::<_, FaceError>(Arc::new(Recording { sizes: Default::default() }) as Arc<dyn FaceAnalyzer>)
        }));

        match extractor.extract_emotions(&img).await {
            EmotionOutcome::Error { error } => assert!(!error.is_empty()),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_file_is_an_error_value() {
        let extractor = EmotionExtractor::new(Box::new(|| {
            Ok::<_, FaceError>(Arc::new(Recording { sizes: Default::default() }) as Arc<dyn FaceAnalyzer>)
        }));
        let outcome = extractor.extract_emotions(Path::new("/no/such/photo.png")).await;
        assert!(matches!(outcome, EmotionOutcome::Error { .. }));
    }

    #[tokio::test]
    async fn init_failure_is_an_error_value_and_retried() {
        let dir = tempfile::tempdir().unwrap();
        let img = write_png(dir.path(), "face.png");
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let extractor = EmotionExtractor::new(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<Arc<dyn FaceAnalyzer>, _>(FaceError::Init("model weights missing".into()))
        }));

        for _ in 0..2 {
            match extractor.extract_emotions(&img).await {
                EmotionOutcome::Error { error } => assert!(error.contains("model weights missing")),
                other => panic!("expected error, got {:?}", other),
            }
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn error_outcome_serializes_as_error_object() {
        let outcome = EmotionOutcome::Error { error: "boom".into() };
        assert_eq!(serde_json::to_value(&outcome).unwrap(), json!({ "error": "boom" }));
    }

    #[tokio::test]
    async fn deepface_client_posts_options_and_unwraps_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/analyze"))
            .and(body_partial_json(json!({
                "actions": ["emotion"],
                "detector_backend": "retinaface",
                "align": true,
                "expand_percentage": 10
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{ "dominant_emotion": "neutral", "emotion": { "neutral": 97.1 } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let img = write_png(dir.path(), "face.png");
        let extractor = EmotionExtractor::deepface(&server.uri());

        match extractor.extract_emotions(&img).await {
            EmotionOutcome::Faces(faces) => assert_eq!(faces[0]["dominant_emotion"], "neutral"),
            other => panic!("expected faces, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn deepface_error_status_is_an_error_value() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Face could not be detected"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let img = write_png(dir.path(), "face.png");
        let extractor = EmotionExtractor::deepface(&server.uri());

        match extractor.extract_emotions(&img).await {
            EmotionOutcome::Error { error } => assert!(error.contains("Face could not be detected")),
            other => panic!("expected error, got {:?}", other),
        }
    }
}
