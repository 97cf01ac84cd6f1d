//! System-audio loopback capture (the tab-audio analogue).
//!
//! On Windows, WASAPI lets an output device be opened as a loopback
//! input, which captures whatever the system is playing. Other hosts
//! have no equivalent through cpal, so the mode reports unsupported.

use super::{AcquireError, AudioSource, CaptureMode, SampleQueue};
use tokio::sync::watch;

pub struct LoopbackSource {
    inner: super::microphone::MicrophoneSource,
}

impl LoopbackSource {
    #[cfg(target_os = "windows")]
    pub async fn open() -> Result<Self, AcquireError> {
        use super::microphone::{spawn_capture_thread, DevicePick, MicrophoneSource};
        let (samples, ended_rx, stop_tx) =
            spawn_capture_thread(DevicePick::OutputLoopback).await?;
        Ok(Self {
            inner: MicrophoneSource::from_capture(samples, ended_rx, stop_tx),
        })
    }

    #[cfg(not(target_os = "windows"))]
    pub async fn open() -> Result<Self, AcquireError> {
        Err(AcquireError::Unsupported(
            "system-audio loopback requires WASAPI".to_string(),
        ))
    }
}

impl AudioSource for LoopbackSource {
    fn mode(&self) -> CaptureMode {
        CaptureMode::TabAudio
    }

    fn samples(&self) -> SampleQueue {
        self.inner.samples()
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.inner.ended()
    }

    fn stop(&mut self) {
        self.inner.stop();
    }
}
