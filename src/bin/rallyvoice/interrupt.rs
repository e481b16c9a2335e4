//! Ctrl-C handling so the console loop can flush and stop cleanly.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Result};

/// Flag set by the SIGINT handler and drained by the console loop.
static INTERRUPT_RECEIVED: AtomicBool = AtomicBool::new(false);

/// Signal handler for Ctrl-C.
///
/// Only uses atomic operations (async-signal-safe).
#[cfg(unix)]
extern "C" fn handle_sigint(_: libc::c_int) {
    INTERRUPT_RECEIVED.store(true, Ordering::SeqCst);
}

#[cfg(unix)]
pub(crate) fn install_interrupt_handler() -> Result<()> {
    unsafe {
        // SAFETY: We install an async-signal-safe handler that only sets an
        // atomic flag. `sigemptyset` and `sigaction` are called with
        // initialized pointers and checked for non-zero error returns.
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_flags = libc::SA_RESTART;
        action.sa_sigaction = handle_sigint as *const () as usize;
        if libc::sigemptyset(&mut action.sa_mask) != 0 {
            return Err(anyhow!("failed to clear the SIGINT mask"));
        }
        if libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut()) != 0 {
            return Err(anyhow!("failed to install the SIGINT handler"));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn install_interrupt_handler() -> Result<()> {
    Ok(())
}

/// True once per received interrupt; clears the flag.
pub(crate) fn take_interrupt() -> bool {
    INTERRUPT_RECEIVED.swap(false, Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn raised_interrupt_sets_the_flag_once() {
        install_interrupt_handler().expect("install handler");
        assert!(!take_interrupt());
        // raise() delivers to the calling thread before returning.
        unsafe {
            libc::raise(libc::SIGINT);
        }
        assert!(take_interrupt());
        assert!(!take_interrupt());
    }
}
