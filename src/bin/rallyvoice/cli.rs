//! CLI flag schema for the rallyvoice console.

use std::path::PathBuf;

use clap::Parser;
use rallyvoice::config::{
    DEFAULT_PAUSE_THRESHOLD_MS, DEFAULT_RECOGNITION_LANGUAGE, DEFAULT_RESTART_DELAY_MS,
    DEFAULT_VAD_SENSITIVITY,
};
use rallyvoice::{CoordinatorConfig, LivePipelineConfig};

pub(crate) const MIN_PAUSE_THRESHOLD_MS: u64 = 200;
pub(crate) const MAX_PAUSE_THRESHOLD_MS: u64 = 10_000;
pub(crate) const MAX_RESTART_DELAY_MS: u64 = 5_000;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "rallyvoice",
    about = "Hands-free voice console for the Rally coaching assistant",
    author,
    version
)]
pub(crate) struct ConsoleArgs {
    /// Quiet time before a spoken turn completes, in milliseconds
    #[arg(
        long = "pause-threshold-ms",
        env = "RALLYVOICE_PAUSE_THRESHOLD_MS",
        default_value_t = DEFAULT_PAUSE_THRESHOLD_MS,
        value_parser = parse_pause_threshold_ms
    )]
    pub(crate) pause_threshold_ms: u64,

    /// Recognition language as a BCP-47 tag, for example en-US
    #[arg(
        long = "language",
        env = "RALLYVOICE_LANGUAGE",
        default_value = DEFAULT_RECOGNITION_LANGUAGE
    )]
    pub(crate) language: String,

    /// Delay before a naturally-ended recognition stream restarts, in milliseconds
    #[arg(
        long = "restart-delay-ms",
        default_value_t = DEFAULT_RESTART_DELAY_MS,
        value_parser = parse_restart_delay_ms
    )]
    pub(crate) restart_delay_ms: u64,

    /// Whisper GGML model path
    #[arg(
        long = "model",
        env = "RALLYVOICE_MODEL",
        default_value = "models/ggml-tiny.en.bin"
    )]
    pub(crate) model: PathBuf,

    /// Input device name (substring match); defaults to the system input
    #[arg(long = "input-device")]
    pub(crate) input_device: Option<String>,

    /// Voice-activity sensitivity between 0.0 and 1.0; higher opens on softer speech
    #[arg(
        long = "vad-sensitivity",
        default_value_t = DEFAULT_VAD_SENSITIVITY,
        value_parser = parse_vad_sensitivity
    )]
    pub(crate) vad_sensitivity: f32,

    /// Print session events as JSON lines instead of console text
    #[arg(long = "json-events", default_value_t = false)]
    pub(crate) json_events: bool,

    /// Start listening immediately instead of waiting for the start command
    #[arg(long = "auto-start", default_value_t = false)]
    pub(crate) auto_start: bool,

    /// Write a JSONL trace log for debugging
    #[arg(long = "logs", default_value_t = false)]
    pub(crate) logs: bool,

    /// Disable the trace log even when other flags request it
    #[arg(long = "no-logs", default_value_t = false)]
    pub(crate) no_logs: bool,

    /// List audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub(crate) list_input_devices: bool,
}

impl ConsoleArgs {
    pub(crate) fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            pause_threshold_ms: self.pause_threshold_ms,
            recognition_language: self.language.clone(),
            restart_delay_ms: self.restart_delay_ms,
        }
    }

    pub(crate) fn pipeline_config(&self) -> LivePipelineConfig {
        LivePipelineConfig {
            input_device: self.input_device.clone(),
            vad_sensitivity: self.vad_sensitivity,
            model_path: self.model.clone(),
            ..LivePipelineConfig::default()
        }
    }
}

/// The trace log is opt-in, and `--no-logs` wins over everything.
pub(crate) fn telemetry_enabled(args: &ConsoleArgs) -> bool {
    args.logs && !args.no_logs
}

fn parse_pause_threshold_ms(value: &str) -> Result<u64, String> {
    let parsed: u64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a whole number of milliseconds"))?;
    if (MIN_PAUSE_THRESHOLD_MS..=MAX_PAUSE_THRESHOLD_MS).contains(&parsed) {
        Ok(parsed)
    } else {
        Err(format!(
            "pause threshold must be between {MIN_PAUSE_THRESHOLD_MS} and {MAX_PAUSE_THRESHOLD_MS} ms"
        ))
    }
}

fn parse_restart_delay_ms(value: &str) -> Result<u64, String> {
    let parsed: u64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a whole number of milliseconds"))?;
    if parsed <= MAX_RESTART_DELAY_MS {
        Ok(parsed)
    } else {
        Err(format!(
            "restart delay must be at most {MAX_RESTART_DELAY_MS} ms"
        ))
    }
}

fn parse_vad_sensitivity(value: &str) -> Result<f32, String> {
    let parsed: f32 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if parsed.is_finite() && (0.0..=1.0).contains(&parsed) {
        Ok(parsed)
    } else {
        Err("sensitivity must be between 0.0 and 1.0".to_string())
    }
}
