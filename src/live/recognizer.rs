//! Streaming recognition over forwarded capture frames.
//!
//! Whisper has no true streaming mode, so the worker accumulates a rolling
//! window and decodes it at two moments: on an interim cadence while speech
//! is live, and once the trailing quiet says the phrase is over. A window
//! that reaches the configured cap is finalized and the stream ends
//! naturally; the coordinator restarts it without the user noticing.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::audio::vad::{EnergyVad, VadDecision, VadEngine};
use crate::config::LivePipelineConfig;
use crate::events::{RecognizerEvent, RecognizerFault};
use crate::sources::SpeechRecognizer;
use crate::stt::Transcriber;

/// Shortest window handed to whisper; shorter audio is padded with silence.
const MIN_DECODE_MS: u64 = 1_100;
/// How much trailing audio an interim decode looks at.
const INTERIM_SPAN_MS: u64 = 5_000;
/// Pre-roll kept when a silent window is trimmed, so a speech onset right at
/// the trim point is not clipped.
const QUIET_PRE_ROLL_MS: u64 = 200;

/// Decoding seam between the worker and whisper.
pub(crate) trait DecodeEngine: Send + Sync {
    fn decode(&self, samples: &[f32], language: &str) -> anyhow::Result<String>;
}

impl DecodeEngine for Transcriber {
    fn decode(&self, samples: &[f32], language: &str) -> anyhow::Result<String> {
        self.transcribe_window(samples, language)
    }
}

pub(crate) enum RecognizerCtrl {
    Restart,
    Stop,
}

/// Running live recognizer handle.
pub(crate) struct LiveRecognizer {
    ctrl: Sender<RecognizerCtrl>,
    worker: Option<JoinHandle<()>>,
}

impl SpeechRecognizer for LiveRecognizer {
    fn restart(&mut self) -> Result<(), RecognizerFault> {
        self.ctrl
            .send(RecognizerCtrl::Restart)
            .map_err(|_| RecognizerFault::Other("recognizer worker is gone".to_string()))
    }

    fn stop(&mut self) {
        let _ = self.ctrl.send(RecognizerCtrl::Stop);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("recognizer worker panicked during stop");
            }
        }
    }
}

impl Drop for LiveRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the recognition worker over the forwarded frame stream.
pub(super) fn spawn(
    engine: Arc<dyn DecodeEngine>,
    language: String,
    frames: Receiver<Vec<f32>>,
    events: Sender<RecognizerEvent>,
    config: &LivePipelineConfig,
) -> LiveRecognizer {
    let (ctrl_tx, ctrl_rx) = crossbeam_channel::unbounded();
    let worker = RecognizerWorker {
        engine,
        language,
        frames,
        ctrl: ctrl_rx,
        events,
        gate: EnergyVad::from_config(config),
        sample_rate: config.sample_rate,
        frame_ms: config.frame_ms.max(1),
        endpoint_quiet_ms: config.endpoint_quiet_ms,
        interim_cadence_ms: config.interim_cadence_ms,
        stream_window_ms: config.stream_window_ms,
        window: Vec::new(),
        window_ms: 0,
        voiced_in_window: false,
        quiet_ms: 0,
        since_interim_ms: 0,
        last_interim: String::new(),
        suspended: false,
    };
    let worker = thread::spawn(move || worker.run());
    LiveRecognizer {
        ctrl: ctrl_tx,
        worker: Some(worker),
    }
}

struct RecognizerWorker {
    engine: Arc<dyn DecodeEngine>,
    language: String,
    frames: Receiver<Vec<f32>>,
    ctrl: Receiver<RecognizerCtrl>,
    events: Sender<RecognizerEvent>,
    gate: EnergyVad,
    sample_rate: u32,
    frame_ms: u64,
    endpoint_quiet_ms: u64,
    interim_cadence_ms: u64,
    stream_window_ms: u64,
    window: Vec<f32>,
    window_ms: u64,
    voiced_in_window: bool,
    quiet_ms: u64,
    since_interim_ms: u64,
    last_interim: String,
    suspended: bool,
}

impl RecognizerWorker {
    fn run(mut self) {
        tracing::debug!(language = %self.language, "recognizer running");
        let idle_wait = Duration::from_millis(self.frame_ms * 4);
        loop {
            // Control first, so stop and restart never queue behind audio.
            match self.ctrl.try_recv() {
                Ok(RecognizerCtrl::Stop) => break,
                Ok(RecognizerCtrl::Restart) => self.resume(),
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => break,
            }
            match self.frames.recv_timeout(idle_wait) {
                Ok(frame) => {
                    if self.suspended {
                        continue;
                    }
                    self.absorb(&frame);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.suspended {
                        continue;
                    }
                    // No frames flowing counts as quiet time too.
                    self.note_quiet(self.frame_ms * 4);
                    self.maybe_finalize();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = self.events.send(RecognizerEvent::Failed(RecognizerFault::Other(
                        "audio frames stopped flowing".to_string(),
                    )));
                    self.await_stop();
                    break;
                }
            }
        }
        tracing::debug!("recognizer stopped");
    }

    /// Hold position after the frame stream died so `stop` can still join
    /// cleanly.
    fn await_stop(&self) {
        loop {
            match self.ctrl.recv() {
                Ok(RecognizerCtrl::Stop) | Err(_) => return,
                Ok(RecognizerCtrl::Restart) => {}
            }
        }
    }

    fn absorb(&mut self, frame: &[f32]) {
        let voiced = self.gate.process_frame(frame) == VadDecision::Speech;
        self.window.extend_from_slice(frame);
        self.window_ms = self.window_ms.saturating_add(self.frame_ms);
        self.since_interim_ms = self.since_interim_ms.saturating_add(self.frame_ms);
        if voiced {
            self.voiced_in_window = true;
            self.quiet_ms = 0;
        } else {
            self.note_quiet(self.frame_ms);
        }
        self.maybe_emit_interim();
        self.maybe_finalize();
    }

    fn note_quiet(&mut self, elapsed_ms: u64) {
        self.quiet_ms = self.quiet_ms.saturating_add(elapsed_ms);
        if !self.voiced_in_window {
            // A window with no speech yet only needs a short pre-roll; do not
            // let dead air crawl towards the stream cap.
            self.trim_to_pre_roll();
        }
    }

    fn trim_to_pre_roll(&mut self) {
        let keep = self.ms_to_samples(QUIET_PRE_ROLL_MS);
        if self.window.len() > keep {
            let cut = self.window.len() - keep;
            self.window.drain(..cut);
            self.window_ms = QUIET_PRE_ROLL_MS;
        }
    }

    fn maybe_emit_interim(&mut self) {
        if !self.voiced_in_window || self.quiet_ms > 0 {
            return;
        }
        if self.since_interim_ms < self.interim_cadence_ms {
            return;
        }
        self.since_interim_ms = 0;
        let span = self.ms_to_samples(INTERIM_SPAN_MS);
        let start = self.window.len().saturating_sub(span);
        let samples = self.padded(&self.window[start..]);
        match self.engine.decode(&samples, &self.language) {
            Ok(text) if !text.is_empty() && text != self.last_interim => {
                self.last_interim = text.clone();
                let _ = self.events.send(RecognizerEvent::Interim(text));
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(error = %err, "interim decode failed");
            }
        }
    }

    fn maybe_finalize(&mut self) {
        if self.window_ms >= self.stream_window_ms {
            self.finalize_window();
            let _ = self.events.send(RecognizerEvent::StreamEnded);
            self.suspended = true;
            tracing::debug!("stream window cap reached; stream ended");
            return;
        }
        if self.voiced_in_window && self.quiet_ms >= self.endpoint_quiet_ms {
            self.finalize_window();
        }
    }

    /// Decode whatever the window holds and reset it for the next phrase.
    fn finalize_window(&mut self) {
        if !self.voiced_in_window {
            self.reset_window();
            return;
        }
        let samples = self.padded(&self.window);
        match self.engine.decode(&samples, &self.language) {
            Ok(text) if text.is_empty() => {
                let _ = self
                    .events
                    .send(RecognizerEvent::Failed(RecognizerFault::NoSpeech));
            }
            Ok(text) => {
                let _ = self.events.send(RecognizerEvent::Final(text));
            }
            Err(err) => {
                let _ = self.events.send(RecognizerEvent::Failed(RecognizerFault::Other(
                    err.to_string(),
                )));
            }
        }
        self.reset_window();
    }

    fn reset_window(&mut self) {
        self.window.clear();
        self.window_ms = 0;
        self.voiced_in_window = false;
        self.quiet_ms = 0;
        self.since_interim_ms = 0;
        self.last_interim.clear();
        self.gate.reset();
    }

    fn resume(&mut self) {
        if !self.suspended {
            return;
        }
        self.suspended = false;
        self.reset_window();
        // Frames that arrived while suspended belong to the old stream.
        while self.frames.try_recv().is_ok() {}
        tracing::debug!("recognition stream resumed");
    }

    fn ms_to_samples(&self, ms: u64) -> usize {
        ((self.sample_rate as u64).saturating_mul(ms) / 1000) as usize
    }

    /// Pad short windows to the minimum length whisper decodes reliably.
    fn padded(&self, samples: &[f32]) -> Vec<f32> {
        let min = self.ms_to_samples(MIN_DECODE_MS);
        let mut out = samples.to_vec();
        if out.len() < min {
            out.resize(min, 0.0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use std::sync::Mutex;

    struct ScriptedDecoder {
        results: Mutex<Vec<String>>,
    }

    impl ScriptedDecoder {
        fn new(results: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.iter().rev().map(|s| s.to_string()).collect()),
            })
        }
    }

    impl DecodeEngine for ScriptedDecoder {
        fn decode(&self, _samples: &[f32], _language: &str) -> anyhow::Result<String> {
            let mut results = self.results.lock().unwrap_or_else(|err| err.into_inner());
            Ok(results.pop().unwrap_or_default())
        }
    }

    fn test_config() -> LivePipelineConfig {
        LivePipelineConfig {
            frame_ms: 20,
            endpoint_quiet_ms: 100,
            interim_cadence_ms: 10_000,
            stream_window_ms: 2_000,
            ..LivePipelineConfig::default()
        }
    }

    fn start_worker(
        decoder: Arc<dyn DecodeEngine>,
        config: &LivePipelineConfig,
    ) -> (
        LiveRecognizer,
        Sender<Vec<f32>>,
        Receiver<RecognizerEvent>,
    ) {
        let (frames_tx, frames_rx) = crossbeam_channel::bounded(256);
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let language =
            crate::stt::primary_language_subtag(&CoordinatorConfig::default().recognition_language);
        let recognizer = spawn(decoder, language, frames_rx, events_tx, config);
        (recognizer, frames_tx, events_rx)
    }

    fn loud_frame(config: &LivePipelineConfig) -> Vec<f32> {
        vec![0.5; config.frame_samples()]
    }

    fn quiet_frame(config: &LivePipelineConfig) -> Vec<f32> {
        vec![0.0; config.frame_samples()]
    }

    fn wait_for_event(events: &Receiver<RecognizerEvent>) -> RecognizerEvent {
        events
            .recv_timeout(Duration::from_secs(2))
            .expect("recognizer event")
    }

    #[test]
    fn trailing_quiet_finalizes_the_phrase() {
        let config = test_config();
        let decoder = ScriptedDecoder::new(&["stay out of the kitchen"]);
        let (mut recognizer, frames, events) = start_worker(decoder, &config);

        for _ in 0..10 {
            frames.send(loud_frame(&config)).expect("send frame");
        }
        // 100 ms of quiet at 20 ms frames.
        for _ in 0..6 {
            frames.send(quiet_frame(&config)).expect("send frame");
        }

        assert_eq!(
            wait_for_event(&events),
            RecognizerEvent::Final("stay out of the kitchen".to_string())
        );
        recognizer.stop();
    }

    #[test]
    fn empty_decode_reports_no_speech() {
        let config = test_config();
        let decoder = ScriptedDecoder::new(&[""]);
        let (mut recognizer, frames, events) = start_worker(decoder, &config);

        for _ in 0..10 {
            frames.send(loud_frame(&config)).expect("send frame");
        }
        for _ in 0..6 {
            frames.send(quiet_frame(&config)).expect("send frame");
        }

        assert_eq!(
            wait_for_event(&events),
            RecognizerEvent::Failed(RecognizerFault::NoSpeech)
        );
        recognizer.stop();
    }

    #[test]
    fn window_cap_ends_the_stream_and_restart_resumes() {
        let config = test_config();
        let decoder = ScriptedDecoder::new(&["first stream", "second stream"]);
        let (mut recognizer, frames, events) = start_worker(decoder, &config);

        // 2 s cap at 20 ms frames is 100 frames of continuous speech.
        for _ in 0..100 {
            frames.send(loud_frame(&config)).expect("send frame");
        }
        assert_eq!(
            wait_for_event(&events),
            RecognizerEvent::Final("first stream".to_string())
        );
        assert_eq!(wait_for_event(&events), RecognizerEvent::StreamEnded);

        // Frames sent while suspended are discarded.
        for _ in 0..10 {
            frames.send(loud_frame(&config)).expect("send frame");
        }
        recognizer.restart().expect("restart");
        // Restart is asynchronous: give the worker one idle interval to
        // process it and drop the suspended backlog before the new phrase.
        thread::sleep(Duration::from_millis(200));

        for _ in 0..10 {
            frames.send(loud_frame(&config)).expect("send frame");
        }
        for _ in 0..6 {
            frames.send(quiet_frame(&config)).expect("send frame");
        }
        assert_eq!(
            wait_for_event(&events),
            RecognizerEvent::Final("second stream".to_string())
        );
        recognizer.stop();
    }

    #[test]
    fn dead_frame_stream_surfaces_a_fault_and_still_stops() {
        let config = test_config();
        let decoder = ScriptedDecoder::new(&[]);
        let (mut recognizer, frames, events) = start_worker(decoder, &config);

        drop(frames);
        assert_eq!(
            wait_for_event(&events),
            RecognizerEvent::Failed(RecognizerFault::Other(
                "audio frames stopped flowing".to_string()
            ))
        );
        recognizer.stop();
    }

    #[test]
    fn quiet_only_audio_never_decodes() {
        let config = test_config();
        let decoder = ScriptedDecoder::new(&["should never surface"]);
        let (mut recognizer, frames, events) = start_worker(decoder, &config);

        for _ in 0..200 {
            frames.send(quiet_frame(&config)).expect("send frame");
        }
        thread::sleep(Duration::from_millis(120));
        assert!(events.try_recv().is_err());
        recognizer.stop();
    }
}
