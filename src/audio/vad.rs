//! Frame-level voice-activity primitives shared by the live pipeline.
//!
//! A [`VadEngine`] classifies one fixed-length frame at a time. Raw engine
//! output flaps on breaths and plosives, so the detector runs every decision
//! through a [`VadSmoother`] before acting on it.

use crate::config::LivePipelineConfig;

/// Raw engine decision for one audio frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadDecision {
    Speech,
    Silence,
    /// The engine could not classify the frame (too short, internal error).
    Uncertain,
}

/// Pluggable frame classifier so the live detector can swap engines.
pub trait VadEngine: Send {
    /// Classify one mono frame at the pipeline sample rate.
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision;

    /// Clear internal state between sessions.
    fn reset(&mut self);

    /// Engine name for logs.
    fn name(&self) -> &'static str;
}

/// Hysteresis smoother over raw VAD decisions.
///
/// The reported label only flips after `required` consecutive frames agree
/// on the opposite label. `Uncertain` frames neither flip nor reset the
/// streak; the smoother just keeps reporting the current label.
pub struct VadSmoother {
    required: usize,
    current: VadDecision,
    candidate: VadDecision,
    streak: usize,
}

impl VadSmoother {
    pub fn new(required: usize) -> Self {
        Self {
            required: required.max(1),
            current: VadDecision::Silence,
            candidate: VadDecision::Silence,
            streak: 0,
        }
    }

    pub fn smooth(&mut self, raw: VadDecision) -> VadDecision {
        if raw == VadDecision::Uncertain {
            return self.current;
        }
        if raw == self.current {
            self.streak = 0;
            return self.current;
        }
        if raw == self.candidate {
            self.streak += 1;
        } else {
            self.candidate = raw;
            self.streak = 1;
        }
        if self.streak >= self.required {
            self.current = raw;
            self.streak = 0;
        }
        self.current
    }

    pub fn reset(&mut self) {
        self.current = VadDecision::Silence;
        self.candidate = VadDecision::Silence;
        self.streak = 0;
    }
}

/// RMS-threshold engine used when the neural VAD feature is disabled.
///
/// Open/close thresholds are split so a frame hovering at the boundary does
/// not toggle every 20 ms.
pub struct EnergyVad {
    open_rms: f32,
    close_rms: f32,
    active: bool,
}

impl EnergyVad {
    pub fn from_config(config: &LivePipelineConfig) -> Self {
        // Sensitivity 0.0 demands roughly -20 dBFS to open; 1.0 opens near
        // -50 dBFS. Close sits 6 dB below open.
        let sensitivity = config.vad_sensitivity.clamp(0.0, 1.0);
        let open_db = -20.0 - 30.0 * sensitivity;
        let open_rms = db_to_amplitude(open_db);
        let close_rms = db_to_amplitude(open_db - 6.0);
        Self {
            open_rms,
            close_rms,
            active: false,
        }
    }
}

impl VadEngine for EnergyVad {
    fn process_frame(&mut self, samples: &[f32]) -> VadDecision {
        if samples.is_empty() {
            return VadDecision::Uncertain;
        }
        let energy: f32 = samples.iter().map(|s| s * s).sum();
        let rms = (energy / samples.len() as f32).sqrt();
        self.active = if self.active {
            rms >= self.close_rms
        } else {
            rms >= self.open_rms
        };
        if self.active {
            VadDecision::Speech
        } else {
            VadDecision::Silence
        }
    }

    fn reset(&mut self) {
        self.active = false;
    }

    fn name(&self) -> &'static str {
        "energy_vad"
    }
}

fn db_to_amplitude(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Build the configured VAD engine.
pub fn create_vad_engine(config: &LivePipelineConfig) -> Box<dyn VadEngine> {
    #[cfg(feature = "vad_earshot")]
    {
        return Box::new(crate::vad_earshot::EarshotVad::from_config(config));
    }
    #[cfg(not(feature = "vad_earshot"))]
    {
        Box::new(EnergyVad::from_config(config))
    }
}
