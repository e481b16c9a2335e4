//! Earshot adapter so VAD engine selection stays behind one stable interface.

use earshot::{VoiceActivityDetector, VoiceActivityProfile};

use crate::audio::vad::{VadDecision, VadEngine};
use crate::config::LivePipelineConfig;

/// Thin wrapper that adapts `earshot` to the crate's `VadEngine` trait.
pub struct EarshotVad {
    detector: VoiceActivityDetector,
    frame_samples: usize,
    scratch: Vec<i16>,
}

fn float_sample_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped >= 0.0 {
        (clamped * i16::MAX as f32).round() as i16
    } else {
        (clamped * 32_768.0).round() as i16
    }
}

impl EarshotVad {
    /// Build an Earshot-backed VAD sized from the pipeline config.
    ///
    /// Sensitivity maps onto Earshot's fixed profiles: the higher the
    /// sensitivity, the more aggressively frames are labeled speech.
    #[must_use]
    pub fn from_config(config: &LivePipelineConfig) -> Self {
        let profile = match config.vad_sensitivity.clamp(0.0, 1.0) {
            s if s >= 0.75 => VoiceActivityProfile::VERY_AGGRESSIVE,
            s if s >= 0.5 => VoiceActivityProfile::AGGRESSIVE,
            s if s >= 0.25 => VoiceActivityProfile::LBR,
            _ => VoiceActivityProfile::QUALITY,
        };
        let frame_ms = config.frame_ms.clamp(10, 30) as usize;
        let frame_samples = ((config.sample_rate as usize) * frame_ms) / 1000;
        Self {
            detector: VoiceActivityDetector::new(profile),
            frame_samples: frame_samples.max(160),
            scratch: Vec::new(),
        }
    }
}

impl VadEngine for EarshotVad {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision {
        if samples.is_empty() {
            return VadDecision::Uncertain;
        }
        self.scratch.clear();
        self.scratch.reserve(self.frame_samples);
        for sample in samples.iter().copied() {
            self.scratch.push(float_sample_to_i16(sample));
        }
        // Earshot insists on exact frame lengths; pad short frames with
        // silence and trim long ones.
        if self.scratch.len() < self.frame_samples {
            self.scratch.resize(self.frame_samples, 0);
        } else if self.scratch.len() > self.frame_samples {
            self.scratch.truncate(self.frame_samples);
        }
        match self.detector.predict_16khz(&self.scratch) {
            Ok(true) => VadDecision::Speech,
            Ok(false) => VadDecision::Silence,
            Err(_) => VadDecision::Uncertain,
        }
    }

    fn reset(&mut self) {
        self.detector.reset();
    }

    fn name(&self) -> &'static str {
        "earshot_vad"
    }
}
