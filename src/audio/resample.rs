//! Streaming sample-rate conversion between the device rate and the
//! pipeline rate.
//!
//! With the `high-quality-audio` feature a windowed-sinc resampler does the
//! work; without it a streaming linear interpolator keeps the pipeline
//! usable. Equal rates pass through untouched either way.

#[cfg(feature = "high-quality-audio")]
use rubato::{
    InterpolationParameters, InterpolationType, Resampler, SincFixedIn, WindowFunction,
};

/// Input block size fed to the sinc resampler. Smaller blocks cut latency,
/// larger ones cut per-call overhead; 1024 samples is 64 ms at 16 kHz.
#[cfg(feature = "high-quality-audio")]
const SINC_CHUNK: usize = 1024;

#[cfg(feature = "high-quality-audio")]
struct SincState {
    resampler: SincFixedIn<f32>,
    pending: Vec<f32>,
}

/// Streaming converter from the capture device rate to the pipeline rate.
pub(crate) struct RateConverter {
    from: u32,
    to: u32,
    #[cfg(feature = "high-quality-audio")]
    sinc: Option<SincState>,
    phase: f64,
    prev: f32,
}

impl RateConverter {
    pub(crate) fn new(from: u32, to: u32) -> Self {
        #[cfg(feature = "high-quality-audio")]
        let sinc = if from == to {
            None
        } else {
            let params = InterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                interpolation: InterpolationType::Linear,
                oversampling_factor: 128,
                window: WindowFunction::BlackmanHarris2,
            };
            Some(SincState {
                resampler: SincFixedIn::<f32>::new(to as f64 / from as f64, params, SINC_CHUNK, 1),
                pending: Vec::with_capacity(SINC_CHUNK * 2),
            })
        };
        Self {
            from,
            to,
            #[cfg(feature = "high-quality-audio")]
            sinc,
            phase: 0.0,
            prev: 0.0,
        }
    }

    /// Linear-only converter, bypassing the sinc path.
    #[cfg(any(test, feature = "mutants"))]
    #[allow(dead_code)]
    pub(crate) fn linear(from: u32, to: u32) -> Self {
        Self {
            from,
            to,
            #[cfg(feature = "high-quality-audio")]
            sinc: None,
            phase: 0.0,
            prev: 0.0,
        }
    }

    /// Convert `input` and append the converted samples to `out`.
    ///
    /// Conversion is streaming: fractional positions carry across calls, and
    /// the sinc path buffers until it has a full block.
    pub(crate) fn push(&mut self, input: &[f32], out: &mut Vec<f32>) {
        if self.from == self.to {
            out.extend_from_slice(input);
            return;
        }
        #[cfg(feature = "high-quality-audio")]
        if self.sinc.is_some() {
            self.push_sinc(input, out);
            return;
        }
        self.push_linear(input, out);
    }

    #[cfg(feature = "high-quality-audio")]
    fn push_sinc(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let Some(state) = self.sinc.as_mut() else {
            return;
        };
        state.pending.extend_from_slice(input);
        while state.pending.len() >= SINC_CHUNK {
            let block: Vec<f32> = state.pending.drain(..SINC_CHUNK).collect();
            match state.resampler.process(&[block]) {
                Ok(mut converted) => {
                    if let Some(channel) = converted.pop() {
                        out.extend_from_slice(&channel);
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "sinc resampler failed; dropping block");
                }
            }
        }
    }

    fn push_linear(&mut self, input: &[f32], out: &mut Vec<f32>) {
        let step = self.from as f64 / self.to as f64;
        for &sample in input {
            while self.phase < 1.0 {
                let value =
                    self.prev as f64 + (sample as f64 - self.prev as f64) * self.phase;
                out.push(value as f32);
                self.phase += step;
            }
            self.phase -= 1.0;
            self.prev = sample;
        }
    }
}

/// Regroups arbitrarily sized capture callbacks into fixed-length frames.
pub(crate) struct FrameChunker {
    frame_len: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    pub(crate) fn new(frame_len: usize) -> Self {
        Self {
            frame_len: frame_len.max(1),
            pending: Vec::with_capacity(frame_len.max(1) * 2),
        }
    }

    /// Absorb `samples` and hand every completed frame to `emit`.
    pub(crate) fn push(&mut self, samples: &[f32], mut emit: impl FnMut(&[f32])) {
        self.pending.extend_from_slice(samples);
        let mut consumed = 0;
        while self.pending.len() - consumed >= self.frame_len {
            emit(&self.pending[consumed..consumed + self.frame_len]);
            consumed += self.frame_len;
        }
        if consumed > 0 {
            self.pending.drain(..consumed);
        }
    }
}
