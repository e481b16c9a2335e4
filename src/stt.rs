//! Local whisper transcription behind the live recognizer.
//!
//! Wraps `whisper_rs` so audio windows become text. The model is loaded once
//! per backend and reused across sessions to avoid repeated initialization
//! overhead.

use std::sync::OnceLock;

use regex::Regex;

/// Reduce a BCP-47 tag to the primary subtag whisper understands.
///
/// `en-US` and `en_GB` both become `en`; an unusable tag falls back to
/// `auto` so the engine detects the language itself.
pub(crate) fn primary_language_subtag(tag: &str) -> String {
    let primary = tag
        .trim()
        .split(|c: char| c == '-' || c == '_')
        .next()
        .unwrap_or("")
        .trim();
    if primary.is_empty() {
        return "auto".to_string();
    }
    primary.to_ascii_lowercase()
}

/// Strip whisper's non-speech annotations and tidy the whitespace.
///
/// Quiet windows decode to markers like `[BLANK_AUDIO]`, `[MUSIC]` or
/// `(wind blowing)`; none of those belong in a coaching transcript.
pub(crate) fn clean_decoded_text(text: &str) -> String {
    static ANNOTATIONS: OnceLock<Regex> = OnceLock::new();
    let annotations = ANNOTATIONS
        .get_or_init(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").expect("hardcoded annotation pattern"));
    let stripped = annotations.replace_all(text, " ");
    let mut cleaned = String::with_capacity(stripped.len());
    for word in stripped.split_whitespace() {
        if !cleaned.is_empty() {
            cleaned.push(' ');
        }
        cleaned.push_str(word);
    }
    cleaned
}

#[cfg(unix)]
mod platform {
    use std::io;
    use std::os::raw::{c_char, c_uint, c_void};
    use std::os::unix::io::AsRawFd;
    use std::path::Path;
    use std::sync::Once;

    use anyhow::{anyhow, Context, Result};
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    use crate::transcript::append_fragment;

    /// Whisper model context for speech-to-text transcription.
    ///
    /// Holds the loaded GGML model in memory. Create once and reuse for all
    /// windows to avoid repeated model loading.
    pub struct Transcriber {
        ctx: WhisperContext,
    }

    impl Transcriber {
        /// Loads the whisper model from disk.
        ///
        /// Temporarily redirects stderr to `/dev/null` during loading because
        /// whisper.cpp emits verbose initialization messages.
        ///
        /// Note: this is a process-wide redirect; we keep it brief and expect
        /// model loading to happen before the session's other threads log.
        ///
        /// # Errors
        ///
        /// Returns an error if the model file cannot be loaded or stderr
        /// redirection fails.
        pub fn new(model_path: &Path) -> Result<Self> {
            install_whisper_log_silencer();

            let model_path = model_path
                .to_str()
                .ok_or_else(|| anyhow!("model path is not valid UTF-8"))?;

            let null = std::fs::OpenOptions::new()
                .write(true)
                .open("/dev/null")
                .context("failed to open /dev/null")?;
            let null_fd = null.as_raw_fd();

            // SAFETY: dup(2) duplicates the stderr file descriptor. We restore
            // it after model loading completes and hold the only reference
            // until then.
            let orig_stderr = unsafe { libc::dup(2) };
            if orig_stderr < 0 {
                return Err(anyhow!(
                    "failed to dup stderr: {}",
                    io::Error::last_os_error()
                ));
            }

            // SAFETY: dup2 replaces stderr with /dev/null; both fds are valid.
            let dup_result = unsafe { libc::dup2(null_fd, 2) };
            if dup_result < 0 {
                // SAFETY: orig_stderr is a valid fd from dup(2).
                unsafe {
                    libc::close(orig_stderr);
                }
                return Err(anyhow!(
                    "failed to redirect stderr: {}",
                    io::Error::last_os_error()
                ));
            }

            let ctx_result =
                WhisperContext::new_with_params(model_path, WhisperContextParameters::default());

            // SAFETY: restore stderr using the saved fd from dup(2).
            let restore_result = unsafe { libc::dup2(orig_stderr, 2) };
            // SAFETY: orig_stderr is a valid fd returned by dup(2).
            unsafe {
                libc::close(orig_stderr);
            }
            if restore_result < 0 {
                return Err(anyhow!(
                    "failed to restore stderr: {}",
                    io::Error::last_os_error()
                ));
            }

            let ctx = ctx_result.context("failed to load whisper model")?;
            Ok(Self { ctx })
        }

        /// Decode one audio window into cleaned text.
        ///
        /// `language` is the primary subtag (for example `en`), or `auto` to
        /// let the engine detect it.
        ///
        /// # Errors
        ///
        /// Returns an error if whisper state allocation fails or inference
        /// cannot complete for the provided samples.
        pub fn transcribe_window(&self, samples: &[f32], language: &str) -> Result<String> {
            let mut state = self
                .ctx
                .create_state()
                .context("failed to create whisper state")?;
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            if language.eq_ignore_ascii_case("auto") {
                params.set_language(None);
                params.set_detect_language(true);
            } else {
                params.set_language(Some(language));
                params.set_detect_language(false);
            }
            // Windows are decoded independently; carrying context across them
            // would let one bad window poison its successors.
            params.set_no_context(true);
            // Keep one logical core free and clamp worker fanout to reduce
            // contention spikes.
            let n_threads = std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(1)
                .saturating_sub(1)
                .clamp(1, 4);
            let n_threads = i32::try_from(n_threads).unwrap_or(1);
            params.set_n_threads(n_threads);
            params.set_print_progress(false);
            params.set_print_timestamps(false);
            params.set_print_special(false);
            params.set_print_realtime(false);
            params.set_translate(false);
            params.set_token_timestamps(false);

            state.full(params, samples)?;
            let mut transcript = String::new();
            let num_segments = match state.full_n_segments() {
                Ok(count) => count,
                Err(err) => {
                    tracing::debug!(error = %err, "whisper failed to report segment count");
                    return Ok(transcript);
                }
            };
            if num_segments < 0 {
                tracing::debug!("whisper returned a negative segment count");
                return Ok(transcript);
            }
            // Whisper splits output into small segments; stitch them together.
            for i in 0..num_segments {
                match state.full_get_segment_text_lossy(i) {
                    Ok(text) => append_fragment(&mut transcript, &text),
                    Err(err) => {
                        tracing::debug!(segment = i, error = %err, "failed to read whisper segment")
                    }
                }
            }
            Ok(super::clean_decoded_text(&transcript))
        }
    }

    fn install_whisper_log_silencer() {
        static INSTALL_LOG_CALLBACK: Once = Once::new();
        INSTALL_LOG_CALLBACK.call_once(|| unsafe {
            // SAFETY: whisper_rs expects a valid callback pointer; we pass a
            // function that ignores its inputs and never dereferences raw
            // pointers.
            whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
        });
    }

    #[allow(unused_variables)]
    unsafe extern "C" fn whisper_log_callback(
        _level: c_uint,
        _text: *const c_char,
        _user_data: *mut c_void,
    ) {
        // Silence the default whisper.cpp logger so it cannot interleave with
        // the console output.
        // SAFETY: We do not dereference any incoming pointers.
    }
}

#[cfg(unix)]
pub use platform::Transcriber;

#[cfg(not(unix))]
mod platform {
    use std::path::Path;

    use anyhow::{anyhow, Result};

    /// Stub implementation for targets without whisper support.
    pub struct Transcriber;

    impl Transcriber {
        /// # Errors
        ///
        /// Always returns an error because this target does not support
        /// whisper.
        pub fn new(_: &Path) -> Result<Self> {
            Err(anyhow!(
                "whisper transcription is currently supported only on Unix-like platforms"
            ))
        }

        /// # Errors
        ///
        /// Always returns an error because this target does not support
        /// whisper.
        pub fn transcribe_window(&self, _: &[f32], _: &str) -> Result<String> {
            Err(anyhow!(
                "whisper transcription is currently supported only on Unix-like platforms"
            ))
        }
    }
}

#[cfg(not(unix))]
pub use platform::Transcriber;
