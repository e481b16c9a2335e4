//! Typed session errors that cross the coordinator boundary.
//!
//! Only the fatal microphone/capability failures defined here are ever shown
//! to users. Transient recognizer hiccups (no speech, natural end-of-stream,
//! deliberate aborts) stay inside the coordinator and never become a
//! `SessionError`.

use serde::Serialize;
use std::fmt;

/// Fatal error for a voice session: either the session could not start, or a
/// running session had to be forced back to idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionError {
    /// Microphone access was declined, or revoked while a session was live.
    PermissionDenied,
    /// No usable audio input device is present.
    NoMicrophone,
    /// The host lacks a working speech-recognition capability; carries the
    /// underlying reason for diagnostics.
    Unsupported(String),
}

impl SessionError {
    /// Compact label used in logs/metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SessionError::PermissionDenied => "permission_denied",
            SessionError::NoMicrophone => "no_microphone",
            SessionError::Unsupported(_) => "unsupported",
        }
    }

    /// One-line guidance suitable for direct display.
    ///
    /// The capability hint never mentions permissions; re-granting access
    /// cannot fix a host that has no recognizer.
    pub fn user_hint(&self) -> &'static str {
        match self {
            SessionError::PermissionDenied => "Grant microphone access and start the session again.",
            SessionError::NoMicrophone => "Connect a microphone and start the session again.",
            SessionError::Unsupported(_) => {
                "Speech recognition is not available here. Switch to a setup with a recognition-capable audio stack."
            }
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::PermissionDenied => write!(f, "microphone permission denied"),
            SessionError::NoMicrophone => write!(f, "no audio input device found"),
            SessionError::Unsupported(reason) => {
                write!(f, "speech recognition unavailable: {reason}")
            }
        }
    }
}

impl std::error::Error for SessionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        assert_eq!(SessionError::PermissionDenied.label(), "permission_denied");
        assert_eq!(SessionError::NoMicrophone.label(), "no_microphone");
        assert_eq!(
            SessionError::Unsupported("no model".to_string()).label(),
            "unsupported"
        );
    }

    #[test]
    fn display_carries_the_unsupported_reason() {
        let err = SessionError::Unsupported("model file missing".to_string());
        assert_eq!(
            err.to_string(),
            "speech recognition unavailable: model file missing"
        );
    }

    #[test]
    fn unsupported_hint_does_not_ask_for_permission() {
        let hint = SessionError::Unsupported("x".to_string()).user_hint();
        assert!(!hint.to_lowercase().contains("permission"));
        assert!(SessionError::PermissionDenied
            .user_hint()
            .to_lowercase()
            .contains("microphone access"));
    }
}
