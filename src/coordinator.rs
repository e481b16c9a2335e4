//! Turn-taking session coordinator for hands-free coaching conversations.
//!
//! One worker thread owns every piece of mutable session state: the speaking
//! flag, the stitched transcript, the silence countdown, and the recognizer
//! restart schedule. The detector and recognizer feed that thread from their
//! own threads over channels, so their events can interleave in any order
//! without shared flags or locks. Callers observe the session through a
//! single [`SessionEvent`] stream whose ordering matches what the worker saw.
//!
//! Each session gets fresh channels. After a stop, anything a stale source
//! still sends lands in a channel nobody reads, which is what makes late
//! callbacks harmless rather than merely unlikely.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{never, select, unbounded, Receiver, RecvError, Sender};

use crate::config::CoordinatorConfig;
use crate::error::SessionError;
use crate::events::{DetectorEvent, RecognizerEvent, RecognizerFault, SessionEvent};
use crate::sources::{SessionBackend, SpeechDetector, SpeechRecognizer};
use crate::transcript::TranscriptBuffer;

/// Whether a coordinator currently owns a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
}

enum SessionCommand {
    Stop,
}

/// Why the session worker is exiting.
enum StopCause {
    /// `stop_session` asked for an orderly stop.
    Requested,
    /// A fatal fault forced the session down.
    Fatal(SessionError),
}

impl StopCause {
    fn label(&self) -> &'static str {
        match self {
            StopCause::Requested => "requested",
            StopCause::Fatal(_) => "fatal",
        }
    }
}

struct ActiveSession {
    commands: Sender<SessionCommand>,
    worker: JoinHandle<()>,
    /// Set by the worker before it emits the teardown notifications, so the
    /// coordinator reads idle as soon as the caller can know the session is
    /// over, not only once the thread has fully exited.
    done: Arc<AtomicBool>,
}

/// Continuous voice session coordinator.
///
/// Owns the session lifecycle: starting both audio sources atomically,
/// running the turn-taking loop on a worker thread, and tearing everything
/// down on stop or fatal failure. Dropping the coordinator stops any live
/// session first.
pub struct SessionCoordinator {
    config: CoordinatorConfig,
    backend: Box<dyn SessionBackend>,
    events_tx: Sender<SessionEvent>,
    active: Option<ActiveSession>,
}

impl SessionCoordinator {
    /// Build a coordinator around `backend` and return the event stream the
    /// caller drains.
    pub fn new(
        config: CoordinatorConfig,
        backend: impl SessionBackend + 'static,
    ) -> (Self, Receiver<SessionEvent>) {
        let (events_tx, events_rx) = unbounded();
        let coordinator = Self {
            config,
            backend: Box::new(backend),
            events_tx,
            active: None,
        };
        (coordinator, events_rx)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn session_state(&self) -> SessionState {
        match &self.active {
            Some(session)
                if !session.done.load(Ordering::SeqCst) && !session.worker.is_finished() =>
            {
                SessionState::Active
            }
            _ => SessionState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session_state() == SessionState::Active
    }

    /// Start a hands-free session.
    ///
    /// Starting while a session is already active is a quiet no-op; the
    /// running session is untouched and no duplicate sources are created.
    /// On success the caller sees `SessionStateChanged { active: true }`
    /// before any other event from this session.
    ///
    /// # Errors
    ///
    /// Returns the fatal [`SessionError`] when either source fails to start.
    /// The coordinator is left idle with nothing running: a detector that
    /// started before the recognizer failed is stopped again here.
    pub fn start_session(&mut self) -> Result<(), SessionError> {
        self.reap_finished();
        if self.active.is_some() {
            tracing::debug!("start_session ignored; session already active");
            return Ok(());
        }

        let (detector_tx, detector_rx) = unbounded();
        let (recognizer_tx, recognizer_rx) = unbounded();
        let mut detector = self.backend.start_detector(detector_tx)?;
        let recognizer = match self.backend.start_recognizer(recognizer_tx) {
            Ok(recognizer) => recognizer,
            Err(err) => {
                // A partial start must not leave the detector running.
                detector.stop();
                tracing::warn!(error = %err, "session start aborted");
                return Err(err);
            }
        };

        let (commands_tx, commands_rx) = unbounded();
        let done = Arc::new(AtomicBool::new(false));
        let worker = SessionWorker {
            pause_threshold: Duration::from_millis(self.config.pause_threshold_ms),
            restart_delay: Duration::from_millis(self.config.restart_delay_ms),
            commands_rx,
            detector_rx,
            recognizer_rx,
            events_tx: self.events_tx.clone(),
            detector,
            recognizer,
            done: Arc::clone(&done),
            state: TurnState::new(),
        };

        tracing::info!(
            pause_ms = self.config.pause_threshold_ms,
            language = %self.config.recognition_language,
            "voice session started"
        );
        // Queued before the worker spawns: the sources may already have
        // events waiting, and the activation must reach the caller first.
        let _ = self
            .events_tx
            .send(SessionEvent::SessionStateChanged { active: true });
        let worker = thread::spawn(move || worker.run());
        self.active = Some(ActiveSession {
            commands: commands_tx,
            worker,
            done,
        });
        Ok(())
    }

    /// Stop the current session, flushing any pending utterance first.
    ///
    /// A flushed utterance is delivered before the idle notification.
    /// Stopping while idle is a no-op. Blocks until the worker has torn the
    /// sources down, so no source callback can run once this returns.
    pub fn stop_session(&mut self) {
        let Some(session) = self.active.take() else {
            return;
        };
        let _ = session.commands.send(SessionCommand::Stop);
        if session.worker.join().is_err() {
            tracing::warn!("session worker panicked during stop");
        }
    }

    /// Stop when active, start when idle. Returns the resulting state.
    ///
    /// # Errors
    ///
    /// Propagates start failures; the stop direction cannot fail.
    pub fn toggle_session(&mut self) -> Result<SessionState, SessionError> {
        if self.is_active() {
            self.stop_session();
            Ok(SessionState::Idle)
        } else {
            self.start_session()?;
            Ok(SessionState::Active)
        }
    }

    /// Join a worker that stopped on its own after a fatal fault, so the
    /// next start observes an idle coordinator. The done flag covers the
    /// window between the teardown notifications and the thread exit.
    fn reap_finished(&mut self) {
        let finished = self.active.as_ref().is_some_and(|session| {
            session.done.load(Ordering::SeqCst) || session.worker.is_finished()
        });
        if finished {
            if let Some(session) = self.active.take() {
                if session.worker.join().is_err() {
                    tracing::warn!("session worker panicked before reap");
                }
            }
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        self.stop_session();
    }
}

/// Mutable per-session state, owned exclusively by the worker thread.
struct TurnState {
    speaking: bool,
    buffer: TranscriptBuffer,
    /// When the pause countdown ends, if one is armed. Arming overwrites any
    /// previous value; there is at most one countdown per session.
    silence_deadline: Option<Instant>,
    /// When to attempt the next recognizer restart, if one is scheduled.
    restart_at: Option<Instant>,
    recognizer_running: bool,
}

impl TurnState {
    fn new() -> Self {
        Self {
            speaking: false,
            buffer: TranscriptBuffer::new(),
            silence_deadline: None,
            restart_at: None,
            recognizer_running: true,
        }
    }
}

enum Wake {
    Command(Result<SessionCommand, RecvError>),
    Detector(Result<DetectorEvent, RecvError>),
    Recognizer(Result<RecognizerEvent, RecvError>),
    Deadline,
}

/// Fallback wake interval when no countdown or restart is pending.
const IDLE_TICK: Duration = Duration::from_millis(250);

struct SessionWorker {
    pause_threshold: Duration,
    restart_delay: Duration,
    commands_rx: Receiver<SessionCommand>,
    detector_rx: Receiver<DetectorEvent>,
    recognizer_rx: Receiver<RecognizerEvent>,
    events_tx: Sender<SessionEvent>,
    detector: Box<dyn SpeechDetector>,
    recognizer: Box<dyn SpeechRecognizer>,
    done: Arc<AtomicBool>,
    state: TurnState,
}

impl SessionWorker {
    fn run(mut self) {
        loop {
            let timeout = self.next_wake();
            let wake = select! {
                recv(self.commands_rx) -> cmd => Wake::Command(cmd),
                recv(self.detector_rx) -> event => Wake::Detector(event),
                recv(self.recognizer_rx) -> event => Wake::Recognizer(event),
                default(timeout) => Wake::Deadline,
            };
            let stop = match wake {
                // A dropped command sender means the coordinator is gone;
                // treat it like an orderly stop.
                Wake::Command(Ok(SessionCommand::Stop)) | Wake::Command(Err(_)) => {
                    Some(StopCause::Requested)
                }
                Wake::Detector(Ok(event)) => self.on_detector(event),
                Wake::Detector(Err(_)) => {
                    tracing::warn!("detector channel closed while session active");
                    self.detector_rx = never();
                    None
                }
                Wake::Recognizer(Ok(event)) => self.on_recognizer(event),
                Wake::Recognizer(Err(_)) => {
                    tracing::warn!("recognizer channel closed while session active");
                    self.recognizer_rx = never();
                    None
                }
                Wake::Deadline => None,
            };
            if let Some(cause) = stop {
                self.shutdown(cause);
                return;
            }
            self.service_deadlines();
        }
    }

    /// Time until the nearest pending deadline, or a coarse idle tick.
    fn next_wake(&self) -> Duration {
        let now = Instant::now();
        [self.state.silence_deadline, self.state.restart_at]
            .into_iter()
            .flatten()
            .map(|at| at.saturating_duration_since(now))
            .min()
            .unwrap_or(IDLE_TICK)
    }

    fn on_detector(&mut self, event: DetectorEvent) -> Option<StopCause> {
        match event {
            DetectorEvent::SpeechStart => {
                self.state.speaking = true;
                self.emit(SessionEvent::SpeakingStateChanged { speaking: true });
                // New speech extends the current utterance; any pending
                // countdown is void.
                self.state.silence_deadline = None;
                if !self.state.recognizer_running {
                    // Speech must not wait out the restart delay.
                    self.state.restart_at = None;
                    self.try_restart_recognizer();
                }
            }
            DetectorEvent::SpeechEnd => {
                self.state.speaking = false;
                self.emit(SessionEvent::SpeakingStateChanged { speaking: false });
                // The countdown is gated on buffered text. Recognizer finals
                // for this burst may still be in flight; the straggler final
                // arms the countdown itself when it lands.
                if self.state.buffer.has_finals() {
                    self.arm_countdown();
                }
            }
            DetectorEvent::Misfire => {
                // A retracted false start. No speech happened, so nothing to
                // count down towards.
                self.state.speaking = false;
                self.emit(SessionEvent::SpeakingStateChanged { speaking: false });
            }
        }
        None
    }

    fn on_recognizer(&mut self, event: RecognizerEvent) -> Option<StopCause> {
        match event {
            RecognizerEvent::Final(text) => {
                self.state.buffer.push_final(&text);
                // A final that lands after its speech-end would otherwise
                // strand the utterance until the next turn. An already
                // armed countdown keeps its original deadline.
                if !self.state.speaking
                    && self.state.silence_deadline.is_none()
                    && self.state.buffer.has_finals()
                {
                    self.arm_countdown();
                }
                None
            }
            RecognizerEvent::Interim(text) => {
                self.state.buffer.set_interim(&text);
                self.emit(SessionEvent::InterimTranscript { text });
                None
            }
            RecognizerEvent::StreamEnded => {
                self.state.recognizer_running = false;
                if self.state.restart_at.is_none() {
                    self.state.restart_at = Some(Instant::now() + self.restart_delay);
                }
                tracing::debug!("recognition stream ended; restart scheduled");
                None
            }
            RecognizerEvent::Failed(fault) => self.on_recognizer_fault(fault),
        }
    }

    fn on_recognizer_fault(&mut self, fault: RecognizerFault) -> Option<StopCause> {
        match fault {
            RecognizerFault::PermissionLost => {
                tracing::warn!("microphone permission lost; stopping session");
                Some(StopCause::Fatal(SessionError::PermissionDenied))
            }
            RecognizerFault::NoSpeech | RecognizerFault::Aborted => {
                tracing::debug!(fault = fault.label(), "routine recognizer fault ignored");
                None
            }
            RecognizerFault::Other(message) => {
                tracing::warn!(%message, "recognizer fault absorbed; session continues");
                None
            }
        }
    }

    fn arm_countdown(&mut self) {
        self.state.silence_deadline = Some(Instant::now() + self.pause_threshold);
    }

    fn service_deadlines(&mut self) {
        let now = Instant::now();
        if self.state.silence_deadline.is_some_and(|at| now >= at) {
            self.state.silence_deadline = None;
            self.flush_utterance();
        }
        if self.state.restart_at.is_some_and(|at| now >= at) {
            self.state.restart_at = None;
            if !self.state.recognizer_running {
                self.try_restart_recognizer();
            }
        }
    }

    fn try_restart_recognizer(&mut self) {
        match self.recognizer.restart() {
            Ok(()) => {
                self.state.recognizer_running = true;
                tracing::debug!("recognizer restarted");
            }
            Err(fault) => {
                // Restart races with teardown are expected; retry on the
                // normal schedule instead of escalating.
                tracing::debug!(fault = fault.label(), "recognizer restart failed; will retry");
                self.state.restart_at = Some(Instant::now() + self.restart_delay);
            }
        }
    }

    /// Deliver the buffered utterance, if any, and reset for the next turn.
    ///
    /// Emits the interim-clear only when an interim was actually showing, so
    /// quiet flushes stay quiet.
    fn flush_utterance(&mut self) {
        let had_interim = !self.state.buffer.interim().is_empty();
        if let Some(text) = self.state.buffer.flush() {
            tracing::info!(chars = text.len(), "utterance complete");
            self.emit(SessionEvent::UtteranceComplete { text });
        }
        if had_interim {
            self.emit(SessionEvent::InterimTranscript {
                text: String::new(),
            });
        }
    }

    fn shutdown(&mut self, cause: StopCause) {
        // Finals the recognizer already delivered belong to this session;
        // fold them in before the farewell flush. Detector churn and new
        // faults are ignored, the session is coming down regardless.
        while let Ok(event) = self.recognizer_rx.try_recv() {
            if let RecognizerEvent::Final(text) = event {
                self.state.buffer.push_final(&text);
            }
        }
        self.flush_utterance();
        self.state.silence_deadline = None;
        self.state.restart_at = None;
        self.detector.stop();
        self.recognizer.stop();
        self.state.speaking = false;
        // Flipped before the notifications: a caller that has seen any of
        // them can start a new session without waiting for the thread exit.
        self.done.store(true, Ordering::SeqCst);
        self.emit(SessionEvent::SpeakingStateChanged { speaking: false });
        self.emit(SessionEvent::SessionStateChanged { active: false });
        tracing::info!(cause = cause.label(), "voice session stopped");
        if let StopCause::Fatal(error) = cause {
            self.emit(SessionEvent::SessionFailed { error });
        }
    }

    fn emit(&self, event: SessionEvent) {
        // The caller may have dropped the event stream; that is their call.
        let _ = self.events_tx.send(event);
    }
}
