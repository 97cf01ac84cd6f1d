//! Microphone capture over cpal.
//!
//! cpal streams are not `Send`, so each capture runs on its own OS
//! thread. The thread builds the stream, reports readiness over a
//! oneshot, then parks until told to stop.

use super::{AcquireError, AudioSource, CaptureMode, SampleQueue};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use log::{debug, error, info, warn};
use std::sync::mpsc as std_mpsc;
use tokio::sync::{oneshot, watch};

/// Which cpal device the capture thread should open.
pub(crate) enum DevicePick {
    /// Input device by name, or the host default.
    Input(Option<String>),
    /// Default output device opened as a loopback input (WASAPI).
    OutputLoopback,
}

pub struct MicrophoneSource {
    samples: SampleQueue,
    ended_rx: watch::Receiver<bool>,
    stop_tx: Option<std_mpsc::Sender<()>>,
}

impl MicrophoneSource {
    pub async fn open(device_name: Option<String>) -> Result<Self, AcquireError> {
        let (samples, ended_rx, stop_tx) =
            spawn_capture_thread(DevicePick::Input(device_name)).await?;
        Ok(Self {
            samples,
            ended_rx,
            stop_tx: Some(stop_tx),
        })
    }

    pub(crate) fn from_capture(
        samples: SampleQueue,
        ended_rx: watch::Receiver<bool>,
        stop_tx: std_mpsc::Sender<()>,
    ) -> Self {
        Self {
            samples,
            ended_rx,
            stop_tx: Some(stop_tx),
        }
    }
}

impl AudioSource for MicrophoneSource {
    fn mode(&self) -> CaptureMode {
        CaptureMode::Microphone
    }

    fn samples(&self) -> SampleQueue {
        self.samples.clone()
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.ended_rx.clone()
    }

    fn stop(&mut self) {
        // Dropping the sender unblocks the capture thread too; sending
        // first makes the shutdown immediate.
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build a cpal stream on a dedicated thread. Resolves once the stream
/// is playing (or failed to build).
pub(crate) async fn spawn_capture_thread(
    pick: DevicePick,
) -> Result<(SampleQueue, watch::Receiver<bool>, std_mpsc::Sender<()>), AcquireError> {
    let samples = SampleQueue::new();
    let (ended_tx, ended_rx) = watch::channel(false);
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), AcquireError>>();

    let thread_samples = samples.clone();
    std::thread::Builder::new()
        .name("audio-capture".to_string())
        .spawn(move || {
            run_capture(pick, thread_samples, ended_tx, stop_rx, ready_tx);
        })
        .map_err(|e| AcquireError::Capability(format!("capture thread: {}", e)))?;

    match ready_rx.await {
        Ok(Ok(())) => Ok((samples, ended_rx, stop_tx)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(AcquireError::Capability(
            "capture thread exited before starting".to_string(),
        )),
    }
}

fn run_capture(
    pick: DevicePick,
    samples: SampleQueue,
    ended_tx: watch::Sender<bool>,
    stop_rx: std_mpsc::Receiver<()>,
    ready_tx: oneshot::Sender<Result<(), AcquireError>>,
) {
    let stream = match build_stream(pick, samples, ended_tx.clone()) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AcquireError::Capability(format!(
            "failed to start stream: {}",
            e
        ))));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Block until stop() sends or the source handle is dropped.
    let _ = stop_rx.recv();
    drop(stream);
    let _ = ended_tx.send(true);
    debug!("capture thread finished");
}

fn build_stream(
    pick: DevicePick,
    samples: SampleQueue,
    ended_tx: watch::Sender<bool>,
) -> Result<cpal::Stream, AcquireError> {
    let host = cpal::default_host();

    let device = match &pick {
        DevicePick::Input(Some(name)) => host
            .input_devices()
            .map_err(|e| AcquireError::Capability(format!("device enumeration: {}", e)))?
            .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
            .ok_or_else(|| AcquireError::Capability(format!("input device not found: {}", name)))?,
        DevicePick::Input(None) => host
            .default_input_device()
            .ok_or_else(|| AcquireError::Capability("no default input device".to_string()))?,
        DevicePick::OutputLoopback => host
            .default_output_device()
            .ok_or_else(|| AcquireError::Capability("no default output device".to_string()))?,
    };

    let config = match &pick {
        DevicePick::OutputLoopback => device.default_output_config(),
        _ => device.default_input_config(),
    }
    .map_err(|e| AcquireError::Capability(format!("no usable audio config: {}", e)))?;

    info!(
        "capturing from {} ({} ch @ {} Hz, {:?})",
        device.name().unwrap_or_else(|_| "<unnamed>".to_string()),
        config.channels(),
        config.sample_rate().0,
        config.sample_format()
    );

    let channels = config.channels() as usize;
    let err_ended = ended_tx;
    let err_fn = move |e: cpal::StreamError| {
        error!("audio stream error: {}", e);
        let _ = err_ended.send(true);
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device
            .build_input_stream(
                &config.into(),
                move |data: &[f32], _| samples.push_frames(data, channels),
                err_fn,
                None,
            )
            .map_err(|e| AcquireError::Capability(format!("stream build: {}", e)))?,
        cpal::SampleFormat::I16 => device
            .build_input_stream(
                &config.into(),
                move |data: &[i16], _| {
                    let floats: Vec<f32> =
                        data.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
                    samples.push_frames(&floats, channels);
                },
                err_fn,
                None,
            )
            .map_err(|e| AcquireError::Capability(format!("stream build: {}", e)))?,
        cpal::SampleFormat::U16 => device
            .build_input_stream(
                &config.into(),
                move |data: &[u16], _| {
                    let floats: Vec<f32> = data
                        .iter()
                        .map(|&s| (s as f32 - 32768.0) / 32768.0)
                        .collect();
                    samples.push_frames(&floats, channels);
                },
                err_fn,
                None,
            )
            .map_err(|e| AcquireError::Capability(format!("stream build: {}", e)))?,
        other => {
            warn!("unsupported sample format: {:?}", other);
            return Err(AcquireError::Capability(format!(
                "unsupported sample format: {:?}",
                other
            )));
        }
    };

    Ok(stream)
}
