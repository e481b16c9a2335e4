//! Live voice-activity detection over captured microphone frames.
//!
//! The worker drains capture frames, runs each one through the VAD engine
//! and smoother, and turns labeled runs into speech-start/speech-end events.
//! Bursts shorter than the configured minimum are retracted as misfires.
//! Every frame is also forwarded to the recognizer, which does its own
//! windowing.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::audio::capture::MicCapture;
use crate::audio::vad::{create_vad_engine, VadDecision, VadEngine, VadSmoother};
use crate::config::LivePipelineConfig;
use crate::events::DetectorEvent;
use crate::sources::SpeechDetector;

/// Turns per-frame labels into burst-level detector events.
struct BurstTracker {
    min_speech_frames: usize,
    hangover_frames: usize,
    in_speech: bool,
    speech_frames: usize,
    silence_run: usize,
}

impl BurstTracker {
    fn new(config: &LivePipelineConfig) -> Self {
        Self {
            min_speech_frames: config.min_speech_frames.max(1),
            hangover_frames: config.hangover_frames.max(1),
            in_speech: false,
            speech_frames: 0,
            silence_run: 0,
        }
    }

    fn on_label(&mut self, label: VadDecision) -> Option<DetectorEvent> {
        match label {
            VadDecision::Speech => {
                self.silence_run = 0;
                if !self.in_speech {
                    self.in_speech = true;
                    self.speech_frames = 1;
                    return Some(DetectorEvent::SpeechStart);
                }
                self.speech_frames += 1;
                None
            }
            VadDecision::Silence => {
                if !self.in_speech {
                    return None;
                }
                self.silence_run += 1;
                if self.silence_run < self.hangover_frames {
                    return None;
                }
                self.in_speech = false;
                self.silence_run = 0;
                let event = if self.speech_frames >= self.min_speech_frames {
                    DetectorEvent::SpeechEnd
                } else {
                    DetectorEvent::Misfire
                };
                self.speech_frames = 0;
                Some(event)
            }
            VadDecision::Uncertain => None,
        }
    }
}

/// Running live detector: the capture handle plus the labeling worker.
pub(crate) struct LiveDetector {
    capture: MicCapture,
    worker: Option<JoinHandle<()>>,
}

impl SpeechDetector for LiveDetector {
    fn stop(&mut self) {
        // Stopping capture drops the frame sender, which ends the worker.
        self.capture.stop();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("detector worker panicked during stop");
            }
        }
    }
}

impl Drop for LiveDetector {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the labeling worker over an already-running capture.
pub(super) fn spawn(
    config: &LivePipelineConfig,
    capture: MicCapture,
    frames: Receiver<Vec<f32>>,
    events: Sender<DetectorEvent>,
    stt_frames: Sender<Vec<f32>>,
) -> LiveDetector {
    let engine = create_vad_engine(config);
    let smoother = VadSmoother::new(config.vad_smoothing_frames);
    let tracker = BurstTracker::new(config);
    let worker = thread::spawn(move || {
        run_detector(frames, events, stt_frames, engine, smoother, tracker);
    });
    LiveDetector {
        capture,
        worker: Some(worker),
    }
}

fn run_detector(
    frames: Receiver<Vec<f32>>,
    events: Sender<DetectorEvent>,
    stt_frames: Sender<Vec<f32>>,
    mut engine: Box<dyn VadEngine>,
    mut smoother: VadSmoother,
    mut tracker: BurstTracker,
) {
    tracing::debug!(engine = engine.name(), "voice activity detector running");
    let mut forwarded_drops: u64 = 0;
    for frame in frames.iter() {
        let raw = engine.process_frame(&frame);
        let label = smoother.smooth(raw);
        if let Some(event) = tracker.on_label(label) {
            tracing::debug!(event = ?event, "detector event");
            if events.send(event).is_err() {
                break;
            }
        }
        match stt_frames.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                forwarded_drops += 1;
                if forwarded_drops % 100 == 1 {
                    tracing::warn!(
                        dropped = forwarded_drops,
                        "recognizer lagging; audio frames dropped"
                    );
                }
            }
            // The recognizer is gone; keep labeling for the session loop.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
    tracing::debug!("voice activity detector stopped");
}
