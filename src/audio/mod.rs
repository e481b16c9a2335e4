//! Live audio plumbing: microphone capture, sample-rate conversion, and
//! voice-activity primitives.

pub mod capture;
pub(crate) mod resample;
pub mod vad;

pub use capture::list_input_devices;
