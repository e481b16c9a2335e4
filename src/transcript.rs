//! Utterance accumulation between flushes.
//!
//! Recognizer output arrives as small finalized fragments plus a rolling
//! provisional hypothesis. The buffer stitches finals together with
//! word-boundary spacing, keeps at most one interim for display, and hands
//! the whole utterance over atomically when the pause timer fires.

/// Pending transcript for the current spoken turn.
///
/// Finals and the interim live together so a flush can clear both in one
/// step; a flush can never observe half-cleared state.
#[derive(Debug, Default)]
pub(crate) struct TranscriptBuffer {
    finals: String,
    interim: String,
}

impl TranscriptBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append one finalized fragment.
    ///
    /// Whitespace-only fragments are dropped here, at the entry point, so no
    /// later stage has to re-check. Anything buffered is worth flushing.
    pub(crate) fn push_final(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        if let Some(prev) = self.finals.chars().last() {
            if let Some(next) = fragment.chars().next() {
                if should_insert_boundary_space(prev, next) {
                    self.finals.push(' ');
                }
            }
        }
        self.finals.push_str(fragment);
    }

    /// Replace the provisional hypothesis wholesale. Empty text clears it.
    pub(crate) fn set_interim(&mut self, text: &str) {
        self.interim.clear();
        self.interim.push_str(text);
    }

    pub(crate) fn interim(&self) -> &str {
        &self.interim
    }

    /// True when at least one finalized fragment is buffered. Only finals
    /// make a turn flushable; an interim alone does not.
    pub(crate) fn has_finals(&self) -> bool {
        !self.finals.is_empty()
    }

    /// Take the completed utterance and reset the buffer, interim included.
    ///
    /// Returns `None` when nothing was buffered, so callers can flush
    /// unconditionally without risking an empty utterance downstream.
    pub(crate) fn flush(&mut self) -> Option<String> {
        self.interim.clear();
        if self.finals.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.finals);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.len() == text.len() {
            Some(text)
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Decide whether a space belongs between two stitched fragments.
///
/// No space before closing punctuation, none after opening punctuation, so
/// `"don"` + `"'t"` and `"(aside"` + `")"` read naturally.
fn should_insert_boundary_space(prev: char, next: char) -> bool {
    if prev.is_whitespace() || next.is_whitespace() {
        return false;
    }
    if matches!(next, '.' | ',' | '!' | '?' | ';' | ':' | '%' | ')' | ']' | '}' | '\'') {
        return false;
    }
    if matches!(prev, '(' | '[' | '{' | '"' | '\'' | '/' | '-') {
        return false;
    }
    true
}

/// Append one recognizer segment to an already-stitched transcript.
///
/// Shared with the live recognizer, which stitches per-window segments with
/// the same boundary rules the buffer uses across windows.
pub(crate) fn append_fragment(text: &mut String, fragment: &str) {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return;
    }
    if let (Some(prev), Some(next)) = (text.chars().last(), fragment.chars().next()) {
        if should_insert_boundary_space(prev, next) {
            text.push(' ');
        }
    }
    text.push_str(fragment);
}
