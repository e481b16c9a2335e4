//! Hands-free voice session coordination for the Rally coaching assistant.
//!
//! The crate turns a microphone into a stream of completed utterances: a
//! voice-activity detector and a streaming recognizer feed a single-threaded
//! session loop that segments speech into turns at conversational pauses.
//! [`SessionCoordinator`] is the entry point; [`LiveBackend`] wires it to
//! cpal and whisper, and the [`sources`] traits let tests script both
//! collaborators.

pub mod audio;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod live;
pub mod sources;
pub mod stt;
mod telemetry;
mod transcript;
#[cfg(feature = "vad_earshot")]
pub mod vad_earshot;

pub use config::{CoordinatorConfig, LivePipelineConfig};
pub use coordinator::{SessionCoordinator, SessionState};
pub use error::SessionError;
pub use events::{DetectorEvent, RecognizerEvent, RecognizerFault, SessionEvent};
pub use live::LiveBackend;
pub use sources::{SessionBackend, SpeechDetector, SpeechRecognizer};
pub use telemetry::{init_tracing, tracing_log_path};
