//! The live backend: microphone capture, VAD, and whisper wired into the
//! coordinator's source seams.
//!
//! One capture feeds both collaborators. The detector worker labels frames
//! and forwards them; the recognizer worker windows the forwarded audio and
//! decodes it. The backend stages the forwarding channel between the two
//! start calls, which the coordinator always makes in detector-first order.

mod detector;
mod recognizer;

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::audio::capture::MicCapture;
use crate::config::{CoordinatorConfig, LivePipelineConfig};
use crate::error::SessionError;
use crate::events::{DetectorEvent, RecognizerEvent};
use crate::sources::{SessionBackend, SpeechDetector, SpeechRecognizer};
use crate::stt::{primary_language_subtag, Transcriber};

/// Production [`SessionBackend`] over cpal and whisper.
pub struct LiveBackend {
    pipeline: LivePipelineConfig,
    language: String,
    transcriber: Option<Arc<Transcriber>>,
    staged_audio: Option<Receiver<Vec<f32>>>,
}

impl LiveBackend {
    pub fn new(config: &CoordinatorConfig, pipeline: LivePipelineConfig) -> Self {
        Self {
            language: primary_language_subtag(&config.recognition_language),
            pipeline,
            transcriber: None,
            staged_audio: None,
        }
    }

    /// Load the whisper model ahead of the first session, so starting a
    /// session stays fast.
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` when the model cannot be loaded.
    pub fn preload_model(&mut self) -> Result<(), SessionError> {
        self.ensure_transcriber().map(|_| ())
    }

    fn ensure_transcriber(&mut self) -> Result<Arc<Transcriber>, SessionError> {
        if let Some(transcriber) = &self.transcriber {
            return Ok(Arc::clone(transcriber));
        }
        tracing::info!(model = %self.pipeline.model_path.display(), "loading whisper model");
        let transcriber = Transcriber::new(&self.pipeline.model_path)
            .map_err(|err| SessionError::Unsupported(format!("whisper model load failed: {err:#}")))?;
        let transcriber = Arc::new(transcriber);
        self.transcriber = Some(Arc::clone(&transcriber));
        Ok(transcriber)
    }
}

impl SessionBackend for LiveBackend {
    fn start_detector(
        &mut self,
        events: Sender<DetectorEvent>,
    ) -> Result<Box<dyn SpeechDetector>, SessionError> {
        let (capture, capture_frames) = MicCapture::start(&self.pipeline)?;
        let (stt_tx, stt_rx) = bounded(self.pipeline.channel_capacity);
        let detector = detector::spawn(&self.pipeline, capture, capture_frames, events, stt_tx);
        self.staged_audio = Some(stt_rx);
        Ok(Box::new(detector))
    }

    fn start_recognizer(
        &mut self,
        events: Sender<RecognizerEvent>,
    ) -> Result<Box<dyn SpeechRecognizer>, SessionError> {
        let frames = self.staged_audio.take().ok_or_else(|| {
            SessionError::Unsupported(
                "audio pipeline is not primed; the detector starts first".to_string(),
            )
        })?;
        let transcriber = self.ensure_transcriber()?;
        Ok(Box::new(recognizer::spawn(
            transcriber,
            self.language.clone(),
            frames,
            events,
            &self.pipeline,
        )))
    }
}
