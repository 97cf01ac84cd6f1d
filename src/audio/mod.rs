//! Audio capture sources and chunk emission.

pub mod chunker;
pub mod file;
pub mod loopback;
pub mod microphone;

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;

/// Which capture source a session streams from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    None,
    Microphone,
    TabAudio,
    File,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureMode::None => "none",
            CaptureMode::Microphone => "microphone",
            CaptureMode::TabAudio => "tab-audio",
            CaptureMode::File => "file",
        };
        f.write_str(name)
    }
}

/// Why a capture source could not be acquired.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Device missing, permission denied, or no usable audio track.
    #[error("capture unavailable: {0}")]
    Capability(String),
    /// The platform or source cannot provide this mode at all.
    #[error("unsupported capture mode: {0}")]
    Unsupported(String),
    /// The media file could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Mono f32 samples shared between a capture callback and the chunker.
#[derive(Clone, Default)]
pub struct SampleQueue {
    inner: Arc<Mutex<Vec<f32>>>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, samples: &[f32]) {
        let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        queue.extend_from_slice(samples);
    }

    /// Downmix interleaved frames to mono and append.
    pub fn push_frames(&self, interleaved: &[f32], channels: usize) {
        if channels <= 1 {
            self.push(interleaved);
            return;
        }
        let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for frame in interleaved.chunks_exact(channels) {
            queue.push(frame.iter().sum::<f32>() / channels as f32);
        }
    }

    /// Take everything accumulated since the last drain.
    pub fn drain(&self) -> Vec<f32> {
        let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *queue)
    }

    /// RMS level of the samples currently queued, without consuming them.
    pub fn peek_level(&self) -> f32 {
        let queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if queue.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = queue.iter().map(|s| s * s).sum();
        (sum_sq / queue.len() as f32).sqrt()
    }
}

/// A running capture source. Samples arrive in `samples()`; `ended()`
/// flips to true when the source exhausts itself (file EOF, device
/// error).
pub trait AudioSource: Send {
    fn mode(&self) -> CaptureMode;

    fn samples(&self) -> SampleQueue;

    fn ended(&self) -> watch::Receiver<bool>;

    /// Stop capturing. Resumable sources keep their position.
    fn stop(&mut self);

    /// Continue a stopped source from its current position.
    fn resume(&mut self) -> Result<(), AcquireError> {
        Err(AcquireError::Unsupported(
            "source cannot be resumed".to_string(),
        ))
    }

    /// Reset a resumable source to the beginning.
    fn rewind(&mut self) {}

    /// Whether the source survives a stop and can be resumed.
    fn is_resumable(&self) -> bool {
        false
    }
}

/// Acquires capture sources for a mode. Swapped for a mock in tests.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn acquire(&self, mode: CaptureMode) -> Result<Box<dyn AudioSource>, AcquireError>;
}

/// Production factory over cpal devices and decoded files.
pub struct DefaultSourceFactory {
    /// Preferred input device name; `None` picks the default.
    pub microphone: Option<String>,
    /// Media file for `CaptureMode::File`.
    pub file: Option<PathBuf>,
}

#[async_trait]
impl SourceFactory for DefaultSourceFactory {
    async fn acquire(&self, mode: CaptureMode) -> Result<Box<dyn AudioSource>, AcquireError> {
        match mode {
            CaptureMode::Microphone => {
                let source = microphone::MicrophoneSource::open(self.microphone.clone()).await?;
                Ok(Box::new(source))
            }
            CaptureMode::TabAudio => {
                let source = loopback::LoopbackSource::open().await?;
                Ok(Box::new(source))
            }
            CaptureMode::File => {
                let path = self.file.clone().ok_or_else(|| {
                    AcquireError::Capability("no media file configured".to_string())
                })?;
                let source = file::FileSource::open(path).await?;
                Ok(Box::new(source))
            }
            CaptureMode::None => {
                Err(AcquireError::Unsupported("nothing to capture".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_queue_drain_takes_all() {
        let queue = SampleQueue::new();
        queue.push(&[0.1, 0.2]);
        queue.push(&[0.3]);
        assert_eq!(queue.drain(), vec![0.1, 0.2, 0.3]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_push_frames_downmixes_stereo() {
        let queue = SampleQueue::new();
        queue.push_frames(&[1.0, 0.0, 0.5, 0.5], 2);
        assert_eq!(queue.drain(), vec![0.5, 0.5]);
    }

    #[test]
    fn test_peek_level_is_rms() {
        let queue = SampleQueue::new();
        assert_eq!(queue.peek_level(), 0.0);
        queue.push(&[0.5, -0.5, 0.5, -0.5]);
        assert!((queue.peek_level() - 0.5).abs() < 1e-6);
        // Peeking does not consume.
        assert_eq!(queue.drain().len(), 4);
    }
}
