pub mod audio;
pub mod kokoro;
pub mod phonemize;
pub mod voices;

use std::path::Path;
use std::sync::Arc;

use crate::error::AppError;

pub use kokoro::KokoroEngine;

const NOT_LOADED: &str = "Kokoro model not loaded. See server logs for setup instructions.";

const MODEL_URL: &str =
    "https://github.com/nazdridoy/kokoro-tts/releases/download/v1.0.0/kokoro-v1.0.onnx";
const VOICES_URL: &str =
    "https://github.com/nazdridoy/kokoro-tts/releases/download/v1.0.0/voices-v1.0.bin";

/// Failure reported by a speech engine.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Voice {0} not found in available voices")]
    UnknownVoice(String),

    #[error("Language {0} is not supported")]
    UnsupportedLanguage(String),

    #[error("Speed should be between 0.5 and 2.0, got {0}")]
    InvalidSpeed(f32),

    #[error("Phonemization failed: {0}")]
    Phonemize(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Failed to load model: {0}")]
    Load(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio produced by a single synthesis call.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// The contract between the HTTP layer and an inference backend.
///
/// Implementations must be callable from several blocking threads at once;
/// a backend that cannot run concurrently serializes internally.
pub trait SpeechEngine: Send + Sync {
    fn voices(&self) -> Vec<String>;

    fn languages(&self) -> Vec<String>;

    fn create(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        lang: &str,
    ) -> Result<Synthesis, EngineError>;
}

/// Process-wide model handle. Either holds a fully constructed engine or
/// nothing; it never changes after startup.
#[derive(Clone)]
pub struct TtsService {
    engine: Option<Arc<dyn SpeechEngine>>,
}

impl TtsService {
    pub fn unloaded() -> Self {
        Self { engine: None }
    }

    pub fn with_engine(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    /// Startup sequence: load the Kokoro model and voice bank if both exist.
    pub fn load(model_path: &Path, voices_path: &Path) -> Self {
        Self::load_with(model_path, voices_path, KokoroEngine::new)
    }

    pub fn load_with<E, F>(model_path: &Path, voices_path: &Path, build: F) -> Self
    where
        E: SpeechEngine + 'static,
        F: FnOnce(&Path, &Path) -> Result<E, EngineError>,
    {
        let missing: Vec<&Path> = [model_path, voices_path]
            .into_iter()
            .filter(|p| !p.exists())
            .collect();

        if !missing.is_empty() {
            for path in &missing {
                tracing::error!("Missing model file: {}", path.display());
            }
            tracing::warn!("Download them with:");
            tracing::warn!("  curl -L -o {} {}", model_path.display(), MODEL_URL);
            tracing::warn!("  curl -L -o {} {}", voices_path.display(), VOICES_URL);
            return Self::unloaded();
        }

        match build(model_path, voices_path) {
            Ok(engine) => {
                tracing::info!(
                    "Kokoro model loaded - {} voices available",
                    engine.voices().len()
                );
                Self::with_engine(Arc::new(engine))
            }
            Err(e) => {
                tracing::error!("Failed to load Kokoro model: {}", e);
                Self::unloaded()
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> Result<Arc<dyn SpeechEngine>, AppError> {
        self.engine
            .clone()
            .ok_or_else(|| AppError::ModelNotLoaded(NOT_LOADED.to_string()))
    }

    pub fn list_voices(&self) -> Result<Vec<String>, AppError> {
        let mut voices = self.engine()?.voices();
        voices.sort();
        Ok(voices)
    }

    pub fn list_languages(&self) -> Result<Vec<String>, AppError> {
        let mut languages = self.engine()?.languages();
        languages.sort();
        Ok(languages)
    }
}

/// Run the engine and wrap its output in a WAV container. Blocks for the
/// whole inference.
pub fn speak(
    engine: &dyn SpeechEngine,
    text: &str,
    voice: &str,
    speed: f32,
    lang: &str,
) -> Result<Vec<u8>, AppError> {
    let synthesis = engine.create(text, voice, speed, lang)?;

    tracing::debug!(
        voice,
        lang,
        samples = synthesis.samples.len(),
        sample_rate = synthesis.sample_rate,
        "Synthesized speech"
    );

    audio::samples_to_wav(&synthesis.samples, synthesis.sample_rate)
}
