//! Message types flowing between the audio sources, the coordinator, and the
//! embedding application.
//!
//! Detector and recognizer events arrive on separate channels and may
//! interleave in any order; the coordinator worker serializes them. Session
//! events leave on a single stream so callers observe one consistent order.

use serde::Serialize;

use crate::error::SessionError;

/// Events produced by the voice-activity detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorEvent {
    /// The user started vocalizing.
    SpeechStart,
    /// The user stopped vocalizing after genuine speech.
    SpeechEnd,
    /// A burst too short to count as speech; retracts a prior start.
    Misfire,
}

/// Events produced by the streaming recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Provisional hypothesis for the current phrase. Each interim replaces
    /// the previous one wholesale; an empty string clears it.
    Interim(String),
    /// Finalized text fragment to accumulate into the pending utterance.
    Final(String),
    /// The recognition stream ran out naturally and wants a transparent
    /// restart.
    StreamEnded,
    /// The recognizer failed; severity is decided by the fault kind.
    Failed(RecognizerFault),
}

/// Recognizer failure classification.
///
/// Only `PermissionLost` ends the session. `NoSpeech` and `Aborted` are
/// routine during continuous listening and are dropped without ceremony;
/// everything else is logged and the session keeps running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerFault {
    /// Microphone or recognition permission revoked mid-session.
    PermissionLost,
    /// The engine heard nothing it could transcribe.
    NoSpeech,
    /// The stream was deliberately cancelled, usually by our own teardown.
    Aborted,
    /// Any other engine failure, with its message.
    Other(String),
}

impl RecognizerFault {
    /// Compact label used in logs/metrics.
    pub fn label(&self) -> &'static str {
        match self {
            RecognizerFault::PermissionLost => "permission_lost",
            RecognizerFault::NoSpeech => "no_speech",
            RecognizerFault::Aborted => "aborted",
            RecognizerFault::Other(_) => "other",
        }
    }
}

/// Caller-facing session events, delivered in the order they occurred.
///
/// Serializes to one JSON object per event for line-oriented consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// One completed utterance. The text is trimmed and never empty.
    UtteranceComplete { text: String },
    /// The session became active or returned to idle.
    SessionStateChanged { active: bool },
    /// The user started or stopped vocalizing.
    SpeakingStateChanged { speaking: bool },
    /// Latest provisional transcript for display. Empty text clears any
    /// previously shown interim.
    InterimTranscript { text: String },
    /// The session was forced back to idle by a fatal error. Always emitted
    /// after the matching `SessionStateChanged { active: false }`.
    SessionFailed { error: SessionError },
}
