//! Microphone capture for the live pipeline.
//!
//! cpal streams are not `Send`, so each capture runs on a dedicated thread
//! that builds the stream, reports readiness back to the starter, and holds
//! the stream alive until asked to stop. Device samples are downmixed to
//! mono, converted to the pipeline rate, and regrouped into fixed VAD-sized
//! frames before they leave on a bounded channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
    SupportedStreamConfig,
};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use super::resample::{FrameChunker, RateConverter};
use crate::config::LivePipelineConfig;
use crate::error::SessionError;

/// How long the starter waits for the capture thread to report readiness.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to a running microphone capture.
///
/// Dropping the handle stops capture; `stop` does the same but lets callers
/// sequence the teardown explicitly.
pub(crate) struct MicCapture {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MicCapture {
    /// Open the configured input device and start streaming frames.
    ///
    /// # Errors
    ///
    /// Returns `NoMicrophone` when no usable device exists,
    /// `PermissionDenied` when the backend refuses access, and
    /// `Unsupported` for everything else the audio stack reports.
    pub(crate) fn start(
        config: &LivePipelineConfig,
    ) -> Result<(Self, Receiver<Vec<f32>>), SessionError> {
        let (frames_tx, frames_rx) = bounded(config.channel_capacity);
        let (ready_tx, ready_rx) = bounded(1);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_config = config.clone();

        let thread = thread::spawn(move || {
            let failed = Arc::new(AtomicBool::new(false));
            let stream = match open_stream(&thread_config, frames_tx, Arc::clone(&failed)) {
                Ok((stream, device_name)) => {
                    let _ = ready_tx.send(Ok(device_name));
                    stream
                }
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            while !thread_stop.load(Ordering::Relaxed) {
                // A dead stream delivers no more frames; dropping it here
                // disconnects the frame channel so the consumers notice.
                if failed.load(Ordering::Relaxed) {
                    tracing::warn!("input stream failed; capture shutting down");
                    break;
                }
                thread::sleep(Duration::from_millis(25));
            }
            drop(stream);
        });

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(device_name)) => {
                tracing::info!(device = %device_name, "microphone capture started");
                Ok((
                    Self {
                        stop,
                        thread: Some(thread),
                    },
                    frames_rx,
                ))
            }
            Ok(Err(err)) => {
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                stop.store(true, Ordering::Relaxed);
                let _ = thread.join();
                Err(SessionError::Unsupported(
                    "audio backend did not come up in time".to_string(),
                ))
            }
        }
    }

    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("capture thread panicked during stop");
            }
        }
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Names of the available audio input devices, for `--list-input-devices`.
///
/// `RALLYVOICE_TEST_DEVICES` (comma separated, empty for none) overrides the
/// real host so smoke tests do not depend on audio hardware.
///
/// # Errors
///
/// Returns an error when the host cannot enumerate devices at all.
pub fn list_input_devices() -> anyhow::Result<Vec<String>> {
    if let Ok(scripted) = std::env::var("RALLYVOICE_TEST_DEVICES") {
        return Ok(scripted
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect());
    }
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .context("enumerate audio input devices")?;
    let mut names = Vec::new();
    for device in devices {
        names.push(
            device
                .name()
                .unwrap_or_else(|_| "<unnamed input>".to_string()),
        );
    }
    Ok(names)
}

fn open_stream(
    config: &LivePipelineConfig,
    frames_tx: Sender<Vec<f32>>,
    failed: Arc<AtomicBool>,
) -> Result<(Stream, String), SessionError> {
    let host = cpal::default_host();
    let device = select_device(&host, config.input_device.as_deref())?;
    let device_name = device
        .name()
        .unwrap_or_else(|_| "unknown input".to_string());
    let (stream_config, sample_format) = negotiate_config(&device, config.sample_rate)?;

    let channels = stream_config.channels;
    let device_rate = stream_config.sample_rate.0;
    tracing::debug!(
        device = %device_name,
        device_rate,
        channels,
        format = ?sample_format,
        "input stream negotiated"
    );

    let mut converter = RateConverter::new(device_rate, config.sample_rate);
    let mut chunker = FrameChunker::new(config.frame_samples());
    let mut mono: Vec<f32> = Vec::new();
    let mut converted: Vec<f32> = Vec::new();
    let mut dropped: u64 = 0;
    let on_samples = move |samples: &[f32]| {
        mono.clear();
        downmix_into(samples, channels, &mut mono);
        converted.clear();
        converter.push(&mono, &mut converted);
        chunker.push(&converted, |frame| match frames_tx.try_send(frame.to_vec()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                if dropped % 50 == 1 {
                    tracing::warn!(dropped, "audio frames dropped; consumer lagging");
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        });
    };

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, on_samples, failed),
        SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, on_samples, failed),
        SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, on_samples, failed),
        other => {
            return Err(SessionError::Unsupported(format!(
                "unsupported input sample format {other:?}"
            )))
        }
    }
    .map_err(|err| classify_stream_failure(&err.to_string()))?;

    stream
        .play()
        .map_err(|err| classify_stream_failure(&err.to_string()))?;
    Ok((stream, device_name))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut on_samples: impl FnMut(&[f32]) + Send + 'static,
    failed: Arc<AtomicBool>,
) -> Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let mut scratch: Vec<f32> = Vec::new();
    device.build_input_stream::<T, _, _>(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            scratch.clear();
            scratch.extend(data.iter().map(|&sample| f32::from_sample(sample)));
            on_samples(&scratch);
        },
        move |err| {
            tracing::warn!(error = %err, "input stream error");
            failed.store(true, Ordering::Relaxed);
        },
        None,
    )
}

fn select_device(host: &cpal::Host, requested: Option<&str>) -> Result<Device, SessionError> {
    let Some(needle) = requested else {
        return host.default_input_device().ok_or(SessionError::NoMicrophone);
    };
    let needle = needle.to_lowercase();
    let devices = host
        .input_devices()
        .map_err(|err| classify_stream_failure(&err.to_string()))?;
    for device in devices {
        let matches = device
            .name()
            .map(|name| name.to_lowercase().contains(&needle))
            .unwrap_or(false);
        if matches {
            return Ok(device);
        }
    }
    Err(SessionError::NoMicrophone)
}

/// Prefer a native config at the target rate with the fewest channels, then
/// fall back to the device default plus conversion.
fn negotiate_config(
    device: &Device,
    target_rate: u32,
) -> Result<(StreamConfig, SampleFormat), SessionError> {
    if let Ok(ranges) = device.supported_input_configs() {
        let mut best: Option<SupportedStreamConfig> = None;
        for range in ranges {
            if let Some(supported) = range.try_with_sample_rate(cpal::SampleRate(target_rate)) {
                let better = match &best {
                    None => true,
                    Some(current) => supported.channels() < current.channels(),
                };
                if better {
                    best = Some(supported);
                }
            }
        }
        if let Some(supported) = best {
            return Ok((supported.config(), supported.sample_format()));
        }
    }
    let default = device
        .default_input_config()
        .map_err(|err| classify_stream_failure(&err.to_string()))?;
    Ok((default.config(), default.sample_format()))
}

/// Average interleaved channels down to mono.
fn downmix_into(interleaved: &[f32], channels: u16, out: &mut Vec<f32>) {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    for group in interleaved.chunks_exact(channels) {
        let sum: f32 = group.iter().sum();
        out.push(sum / channels as f32);
    }
}

/// Map an audio-stack failure onto the session error taxonomy.
///
/// cpal wraps most platform errors in backend-specific strings, so this
/// matches on the message rather than the error type.
fn classify_stream_failure(message: &str) -> SessionError {
    let lower = message.to_lowercase();
    if lower.contains("permission")
        || lower.contains("denied")
        || lower.contains("not authorized")
    {
        SessionError::PermissionDenied
    } else if lower.contains("no device")
        || lower.contains("not available")
        || lower.contains("disconnected")
    {
        SessionError::NoMicrophone
    } else {
        SessionError::Unsupported(message.to_string())
    }
}
