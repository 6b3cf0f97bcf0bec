use std::path::Path;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::audio::{trim_silence, TRIM_FRAME_LENGTH, TRIM_HOP_LENGTH, TRIM_TOP_DB};
use super::phonemize::{self, MAX_PHONEME_LENGTH, SUPPORTED_LANGUAGES};
use super::voices::VoiceBank;
use super::{EngineError, SpeechEngine, Synthesis};

pub const SAMPLE_RATE: u32 = 24000;
pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// Kokoro v1.0 ONNX model plus its voice bank.
///
/// ONNX Runtime sessions need exclusive access to run, so concurrent
/// requests take turns on the session mutex.
pub struct KokoroEngine {
    session: Mutex<Session>,
    voices: VoiceBank,
}

impl KokoroEngine {
    pub fn new(model_path: &Path, voices_path: &Path) -> Result<Self, EngineError> {
        let session = Session::builder()
            .map_err(|e| EngineError::Load(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EngineError::Load(format!("Failed to set optimization level: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| EngineError::Load(format!("Failed to load model: {}", e)))?;

        let voices = VoiceBank::load(voices_path)?;

        tracing::debug!(
            model = %model_path.display(),
            voices = voices.len(),
            "Kokoro session ready"
        );

        Ok(Self {
            session: Mutex::new(session),
            voices,
        })
    }

    /// Run one phoneme batch through the model.
    fn infer(&self, phonemes: &str, voice: &str, speed: f32) -> Result<Vec<f32>, EngineError> {
        let tokens = phonemize::tokenize(phonemes);
        if tokens.len() > MAX_PHONEME_LENGTH {
            return Err(EngineError::Inference(format!(
                "Phoneme batch too long: {} > {}",
                tokens.len(),
                MAX_PHONEME_LENGTH
            )));
        }

        let style = self
            .voices
            .style(voice, tokens.len())
            .ok_or_else(|| EngineError::UnknownVoice(voice.to_string()))?;

        // [0, tokens..., 0]
        let mut ids = Vec::with_capacity(tokens.len() + 2);
        ids.push(0);
        ids.extend_from_slice(&tokens);
        ids.push(0);
        let seq_len = ids.len();

        // Inputs are positional:
        //   tokens [1, seq_len] i64
        //   style  [1, 256]     f32
        //   speed  [1]          f32
        let tokens_value = Tensor::<i64>::from_array(([1usize, seq_len], ids))
            .map_err(|e| EngineError::Inference(format!("Failed to create tokens tensor: {}", e)))?;

        let style_value = Tensor::<f32>::from_array(([1usize, style.len()], style.to_vec()))
            .map_err(|e| EngineError::Inference(format!("Failed to create style tensor: {}", e)))?;

        let speed_value = Tensor::<f32>::from_array(([1usize], vec![speed]))
            .map_err(|e| EngineError::Inference(format!("Failed to create speed tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EngineError::Inference("Session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![tokens_value, style_value, speed_value])
            .map_err(|e| EngineError::Inference(e.to_string()))?;

        let output = outputs
            .get("audio")
            .or_else(|| outputs.get("waveform"))
            .ok_or_else(|| EngineError::Inference("Missing output tensor".to_string()))?;

        let (_shape, audio) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| EngineError::Inference(format!("Failed to extract output tensor: {}", e)))?;

        Ok(audio.to_vec())
    }
}

impl SpeechEngine for KokoroEngine {
    fn voices(&self) -> Vec<String> {
        self.voices.names()
    }

    fn languages(&self) -> Vec<String> {
        SUPPORTED_LANGUAGES.iter().map(|l| l.to_string()).collect()
    }

    fn create(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
        lang: &str,
    ) -> Result<Synthesis, EngineError> {
        validate_speed(speed)?;
        if !self.voices.contains(voice) {
            return Err(EngineError::UnknownVoice(voice.to_string()));
        }

        let phonemes = phonemize::phonemize(text, lang)?;

        let batches = phonemize::split_phonemes(&phonemes);
        let samples = render_batches(&batches, |batch| self.infer(batch, voice, speed))?;

        Ok(Synthesis {
            samples,
            sample_rate: SAMPLE_RATE,
        })
    }
}

/// Run every phoneme batch, trim each one and join the audio.
fn render_batches<F>(batches: &[String], mut infer: F) -> Result<Vec<f32>, EngineError>
where
    F: FnMut(&str) -> Result<Vec<f32>, EngineError>,
{
    if batches.is_empty() {
        return Err(EngineError::Inference("no phonemes to synthesize".to_string()));
    }

    let mut samples = Vec::new();
    for batch in batches {
        let audio = infer(batch.as_str())?;
        samples.extend_from_slice(trim_silence(
            &audio,
            TRIM_TOP_DB,
            TRIM_FRAME_LENGTH,
            TRIM_HOP_LENGTH,
        ));
    }
    Ok(samples)
}

fn validate_speed(speed: f32) -> Result<(), EngineError> {
    if (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(())
    } else {
        Err(EngineError::InvalidSpeed(speed))
    }
}
