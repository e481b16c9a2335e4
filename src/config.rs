//! Tunables for the session coordinator and the live audio pipeline.

use std::path::PathBuf;

/// Quiet time after speech before a spoken turn is considered complete.
pub const DEFAULT_PAUSE_THRESHOLD_MS: u64 = 1500;
/// BCP-47 tag requested from the recognizer.
pub const DEFAULT_RECOGNITION_LANGUAGE: &str = "en-US";
/// Delay before transparently restarting a naturally-ended recognition
/// stream.
pub const DEFAULT_RESTART_DELAY_MS: u64 = 150;
/// VAD sensitivity in `[0.0, 1.0]`; higher opens on softer speech.
pub const DEFAULT_VAD_SENSITIVITY: f32 = 0.6;

/// Behavior knobs for one [`SessionCoordinator`](crate::SessionCoordinator).
///
/// These shape conversational feel, not correctness: a coordinator honors
/// whatever values it is given, and tests run with much shorter intervals
/// than the shipped defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// Milliseconds of silence that end the current turn.
    pub pause_threshold_ms: u64,
    /// BCP-47 language tag (for example `en-US`).
    pub recognition_language: String,
    /// Milliseconds to wait before restarting a naturally-ended stream.
    pub restart_delay_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            pause_threshold_ms: DEFAULT_PAUSE_THRESHOLD_MS,
            recognition_language: DEFAULT_RECOGNITION_LANGUAGE.to_string(),
            restart_delay_ms: DEFAULT_RESTART_DELAY_MS,
        }
    }
}

/// Tuning for the live capture/VAD/recognition pipeline.
///
/// Capture always lands on mono 16 kHz internally; `sample_rate` is the
/// target, not a promise about the device.
#[derive(Debug, Clone, PartialEq)]
pub struct LivePipelineConfig {
    /// Input device name (substring match). `None` selects the system
    /// default input.
    pub input_device: Option<String>,
    /// Target sample rate for the pipeline, in Hz.
    pub sample_rate: u32,
    /// Audio frame length handed to the VAD, in milliseconds.
    pub frame_ms: u64,
    /// VAD sensitivity in `[0.0, 1.0]`.
    pub vad_sensitivity: f32,
    /// Consecutive agreeing frames required before the smoothed VAD label
    /// flips.
    pub vad_smoothing_frames: usize,
    /// Voiced frames required before a speech-start is trusted; shorter
    /// bursts are retracted as misfires.
    pub min_speech_frames: usize,
    /// Unvoiced frames tolerated inside speech before a speech-end fires.
    pub hangover_frames: usize,
    /// Trailing quiet that finalizes the current phrase, in milliseconds.
    pub endpoint_quiet_ms: u64,
    /// How often a provisional transcript is decoded while speech is live,
    /// in milliseconds.
    pub interim_cadence_ms: u64,
    /// Maximum audio window per recognition stream before it ends naturally,
    /// in milliseconds.
    pub stream_window_ms: u64,
    /// Bounded capacity of the audio frame channels.
    pub channel_capacity: usize,
    /// Path to the whisper GGML model file.
    pub model_path: PathBuf,
}

impl Default for LivePipelineConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            sample_rate: 16_000,
            frame_ms: 20,
            vad_sensitivity: DEFAULT_VAD_SENSITIVITY,
            vad_smoothing_frames: 3,
            min_speech_frames: 5,
            hangover_frames: 12,
            endpoint_quiet_ms: 600,
            interim_cadence_ms: 900,
            stream_window_ms: 23_000,
            channel_capacity: 64,
            model_path: PathBuf::from("models/ggml-tiny.en.bin"),
        }
    }
}

impl LivePipelineConfig {
    /// Samples per VAD frame at the target rate.
    pub fn frame_samples(&self) -> usize {
        let samples = (self.sample_rate as u64).saturating_mul(self.frame_ms) / 1000;
        (samples as usize).max(1)
    }
}
