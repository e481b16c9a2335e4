//! Integration tests that lock rallyvoice CLI flag and output behavior.

use std::process::Command;

fn combined_output(output: &std::process::Output) -> String {
    let mut combined = String::new();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

fn rallyvoice_bin() -> &'static str {
    option_env!("CARGO_BIN_EXE_rallyvoice").expect("rallyvoice test binary not built")
}

#[test]
fn help_mentions_the_session_flags() {
    let output = Command::new(rallyvoice_bin())
        .arg("--help")
        .output()
        .expect("run rallyvoice --help");
    assert!(output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("rallyvoice"));
    assert!(combined.contains("--pause-threshold-ms"));
    assert!(combined.contains("--language"));
    assert!(combined.contains("--json-events"));
    assert!(combined.contains("--list-input-devices"));
}

#[test]
fn out_of_range_pause_threshold_is_rejected() {
    let output = Command::new(rallyvoice_bin())
        .args(["--pause-threshold-ms", "50", "--list-input-devices"])
        .output()
        .expect("run rallyvoice with a bad threshold");
    assert!(!output.status.success());
    let combined = combined_output(&output);
    assert!(combined.contains("pause threshold must be between"));
}

#[test]
fn lists_scripted_input_devices() {
    let output = Command::new(rallyvoice_bin())
        .arg("--list-input-devices")
        .env("RALLYVOICE_TEST_DEVICES", "Court Mic,Headset")
        .output()
        .expect("run rallyvoice --list-input-devices");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("audio input devices:"));
    assert!(stdout.contains("Court Mic"));
    assert!(stdout.contains("Headset"));
}

#[test]
fn reports_when_no_input_devices_exist() {
    let output = Command::new(rallyvoice_bin())
        .arg("--list-input-devices")
        .env("RALLYVOICE_TEST_DEVICES", "")
        .output()
        .expect("run rallyvoice --list-input-devices");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("no audio input devices found"));
}
