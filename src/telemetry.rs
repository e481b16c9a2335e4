//! Optional local telemetry logging used for debugging session behavior.

use std::env;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Where the JSONL trace lands: the `RALLYVOICE_TRACE_LOG` override, or a
/// fixed file in the system temp directory.
pub fn tracing_log_path() -> PathBuf {
    env::var("RALLYVOICE_TRACE_LOG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| env::temp_dir().join("rallyvoice_trace.jsonl"))
}

fn init_tracing_once(enabled: bool, once: &OnceLock<()>) {
    if !enabled {
        return;
    }

    let _ = once.get_or_init(|| {
        let path = tracing_log_path();
        let file = match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => file,
            Err(_) => return,
        };
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_timer(UtcTime::rfc_3339())
            .with_writer(file)
            .with_current_span(false)
            .with_span_list(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Install the process-wide JSONL subscriber, at most once.
///
/// When `enabled` is false nothing is installed and tracing macros stay
/// no-ops.
pub fn init_tracing(enabled: bool) {
    init_tracing_once(enabled, &TRACING_INIT);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    fn unique_trace_path(suffix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time should be after epoch")
            .as_nanos();
        env::temp_dir().join(format!("rallyvoice-trace-{suffix}-{nanos}.jsonl"))
    }

    #[test]
    fn tracing_log_path_prefers_env_override() {
        let _guard = env_lock().lock().expect("env lock");
        let path = unique_trace_path("env");
        env::set_var("RALLYVOICE_TRACE_LOG", &path);
        assert_eq!(tracing_log_path(), path);
        env::remove_var("RALLYVOICE_TRACE_LOG");
    }

    #[test]
    fn tracing_log_path_defaults_to_temp_dir_when_env_missing() {
        let _guard = env_lock().lock().expect("env lock");
        env::remove_var("RALLYVOICE_TRACE_LOG");
        let expected = env::temp_dir().join("rallyvoice_trace.jsonl");
        assert_eq!(tracing_log_path(), expected);
    }

    #[test]
    fn init_tracing_once_respects_enabled_flag_and_creates_file() {
        let _guard = env_lock().lock().expect("env lock");

        let enabled_path = unique_trace_path("enabled");
        let _ = fs::remove_file(&enabled_path);
        env::set_var("RALLYVOICE_TRACE_LOG", &enabled_path);
        let enabled_once = OnceLock::new();
        init_tracing_once(true, &enabled_once);
        assert!(
            enabled_path.exists(),
            "enabled telemetry should create the trace file"
        );

        let disabled_path = unique_trace_path("disabled");
        let _ = fs::remove_file(&disabled_path);
        env::set_var("RALLYVOICE_TRACE_LOG", &disabled_path);
        let disabled_once = OnceLock::new();
        init_tracing_once(false, &disabled_once);
        assert!(
            !disabled_path.exists(),
            "disabled telemetry should not create the trace file"
        );

        env::remove_var("RALLYVOICE_TRACE_LOG");
        let _ = fs::remove_file(enabled_path);
        let _ = fs::remove_file(disabled_path);
    }
}
