//! rallyvoice console: hands-free voice sessions from a terminal.
//!
//! Type `start` to begin listening, speak naturally, and pause to finish a
//! turn. Completed utterances print as they flush; `--json-events` switches
//! the output to one JSON object per line for scripting.

mod cli;
mod interrupt;

use std::io::{self, BufRead};
use std::process;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::{select, unbounded, Receiver};
use rallyvoice::{audio, LiveBackend, SessionCoordinator, SessionEvent};

use crate::cli::ConsoleArgs;

const COMMAND_HELP: &str = "commands: start | stop | toggle | quit";
const INTERIM_PREVIEW_CHARS: usize = 80;
const INTERRUPT_POLL: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    let args = ConsoleArgs::parse();

    if args.list_input_devices {
        list_devices();
        return Ok(());
    }

    let telemetry = cli::telemetry_enabled(&args);
    rallyvoice::init_tracing(telemetry);
    if telemetry {
        println!("trace log: {}", rallyvoice::tracing_log_path().display());
    }
    interrupt::install_interrupt_handler()?;

    let coordinator_config = args.coordinator_config();
    let mut backend = LiveBackend::new(&coordinator_config, args.pipeline_config());
    println!("loading whisper model from {}", args.model.display());
    if let Err(err) = backend.preload_model() {
        eprintln!("error: {err}");
        eprintln!("{}", err.user_hint());
        process::exit(1);
    }

    let (mut coordinator, events) = SessionCoordinator::new(coordinator_config, backend);
    let commands = spawn_stdin_reader();

    println!("{COMMAND_HELP}");
    if args.auto_start {
        start_session(&mut coordinator);
    }

    loop {
        if interrupt::take_interrupt() {
            println!("interrupted");
            break;
        }
        select! {
            recv(events) -> event => match event {
                Ok(event) => render_event(&event, args.json_events),
                Err(_) => break,
            },
            recv(commands) -> line => match line {
                Ok(line) => {
                    if !dispatch_command(line.trim(), &mut coordinator) {
                        break;
                    }
                }
                // Stdin closed; treat it like quit.
                Err(_) => break,
            },
            default(INTERRUPT_POLL) => {}
        }
    }

    coordinator.stop_session();
    for event in events.try_iter() {
        render_event(&event, args.json_events);
    }
    Ok(())
}

/// Returns false when the console should exit.
fn dispatch_command(command: &str, coordinator: &mut SessionCoordinator) -> bool {
    match command {
        "" => {}
        "start" => start_session(coordinator),
        "stop" => coordinator.stop_session(),
        "toggle" => {
            if let Err(err) = coordinator.toggle_session() {
                report_session_error(&err);
            }
        }
        "quit" | "exit" => return false,
        "help" => println!("{COMMAND_HELP}"),
        other => println!("unknown command: {other} ({COMMAND_HELP})"),
    }
    true
}

fn start_session(coordinator: &mut SessionCoordinator) {
    if let Err(err) = coordinator.start_session() {
        report_session_error(&err);
    }
}

fn report_session_error(err: &rallyvoice::SessionError) {
    eprintln!("error: {err}");
    eprintln!("{}", err.user_hint());
}

fn render_event(event: &SessionEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => eprintln!("error: failed to encode event: {err}"),
        }
        return;
    }
    match event {
        SessionEvent::SessionStateChanged { active: true } => {
            println!("session started; pause to finish a turn");
        }
        SessionEvent::SessionStateChanged { active: false } => println!("session stopped"),
        SessionEvent::SpeakingStateChanged { speaking: true } => println!("(speaking)"),
        SessionEvent::SpeakingStateChanged { speaking: false } => println!("(quiet)"),
        SessionEvent::InterimTranscript { text } if text.is_empty() => {}
        SessionEvent::InterimTranscript { text } => {
            println!("  ~ {}", interim_preview(text, INTERIM_PREVIEW_CHARS));
        }
        SessionEvent::UtteranceComplete { text } => println!("you said: {text}"),
        SessionEvent::SessionFailed { error } => report_session_error(error),
    }
}

fn list_devices() {
    match audio::list_input_devices() {
        Ok(devices) if devices.is_empty() => println!("no audio input devices found"),
        Ok(devices) => {
            println!("audio input devices:");
            for name in devices {
                println!("  {name}");
            }
        }
        Err(err) => println!("failed to list audio input devices: {err:#}"),
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (lines_tx, lines_rx) = unbounded();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if lines_tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    lines_rx
}

/// Single-line preview of an in-progress transcript: whitespace collapsed,
/// control characters dropped, truncated to at most `max_chars`.
fn interim_preview(text: &str, max_chars: usize) -> String {
    let mut compact = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !compact.is_empty() {
            compact.push(' ');
        }
        compact.extend(word.chars().filter(|ch| !ch.is_control()));
    }
    if compact.chars().count() <= max_chars {
        return compact;
    }
    let keep = max_chars.saturating_sub(3);
    let mut truncated: String = compact.chars().take(keep).collect();
    truncated.push_str("...");
    truncated
}
