//! Seams over the two external audio collaborators.
//!
//! The coordinator never touches audio hardware. It owns running source
//! handles that feed `DetectorEvent`s and `RecognizerEvent`s over channels,
//! so the live cpal/whisper pipeline and scripted test doubles drive the
//! session through exactly the same surface.

use crossbeam_channel::Sender;

use crate::error::SessionError;
use crate::events::{DetectorEvent, RecognizerEvent, RecognizerFault};

/// A running voice-activity detector. Construction starts it; there is no
/// separate start call.
pub trait SpeechDetector: Send {
    /// Stop the detector and release its audio resources. Events already in
    /// flight may still sit in the channel; the session loop ignores them.
    fn stop(&mut self);
}

/// A running streaming recognizer. Construction starts it.
pub trait SpeechRecognizer: Send {
    /// Resume recognition after a natural end-of-stream.
    ///
    /// # Errors
    ///
    /// Returns the fault that prevented the restart. Failures are expected
    /// when a restart races teardown; the coordinator logs them and retries
    /// on its own schedule.
    fn restart(&mut self) -> Result<(), RecognizerFault>;

    /// Stop the recognizer and release its audio resources.
    fn stop(&mut self);
}

/// Per-session factory for the collaborating sources.
///
/// `start_detector` is always called before `start_recognizer`, once per
/// session, with freshly created channels. When the recognizer fails to
/// start, the coordinator stops the already-running detector before
/// reporting the error, so a half-started session never leaks.
pub trait SessionBackend: Send {
    /// Start the voice-activity detector for a new session.
    ///
    /// # Errors
    ///
    /// Returns the fatal error preventing the session from starting.
    fn start_detector(
        &mut self,
        events: Sender<DetectorEvent>,
    ) -> Result<Box<dyn SpeechDetector>, SessionError>;

    /// Start the streaming recognizer for a new session.
    ///
    /// # Errors
    ///
    /// Returns the fatal error preventing the session from starting.
    fn start_recognizer(
        &mut self,
        events: Sender<RecognizerEvent>,
    ) -> Result<Box<dyn SpeechRecognizer>, SessionError>;
}
