//! File playback source.
//!
//! Decodes a WAV file to mono f32 up front, then feeds samples into the
//! queue at real-time pace so the server sees the same cadence as live
//! capture. The decoded buffer outlives stop(): replaying a file after
//! a stop resumes (or rewinds) without re-decoding.

use super::{AcquireError, AudioSource, CaptureMode, SampleQueue};
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Pacing granularity. A tenth of a second of samples per tick keeps
/// the queue close to real time without a tight loop.
const PACE_INTERVAL: Duration = Duration::from_millis(100);

pub struct FileSource {
    path: PathBuf,
    decoded: Arc<Vec<f32>>,
    sample_rate: u32,
    position: Arc<AtomicUsize>,
    samples: SampleQueue,
    ended_tx: watch::Sender<bool>,
    ended_rx: watch::Receiver<bool>,
    pacer: Option<JoinHandle<()>>,
}

impl FileSource {
    pub async fn open(path: PathBuf) -> Result<Self, AcquireError> {
        let decode_path = path.clone();
        let (decoded, sample_rate) =
            tokio::task::spawn_blocking(move || decode_wav(&decode_path))
                .await
                .map_err(|e| AcquireError::Decode(format!("decode task failed: {}", e)))??;

        info!(
            "decoded {}: {} samples @ {} Hz ({:.1}s)",
            path.display(),
            decoded.len(),
            sample_rate,
            decoded.len() as f64 / sample_rate as f64
        );

        let (ended_tx, ended_rx) = watch::channel(false);
        let mut source = Self {
            path,
            decoded: Arc::new(decoded),
            sample_rate,
            position: Arc::new(AtomicUsize::new(0)),
            samples: SampleQueue::new(),
            ended_tx,
            ended_rx,
            pacer: None,
        };
        source.spawn_pacer();
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn spawn_pacer(&mut self) {
        let decoded = self.decoded.clone();
        let position = self.position.clone();
        let samples = self.samples.clone();
        let ended_tx = self.ended_tx.clone();
        let per_tick = (self.sample_rate as usize / 10).max(1);

        self.pacer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PACE_INTERVAL);
            loop {
                ticker.tick().await;
                let pos = position.load(Ordering::Acquire);
                if pos >= decoded.len() {
                    debug!("file source reached end of data");
                    let _ = ended_tx.send(true);
                    return;
                }
                let end = (pos + per_tick).min(decoded.len());
                samples.push(&decoded[pos..end]);
                position.store(end, Ordering::Release);
            }
        }));
    }
}

impl AudioSource for FileSource {
    fn mode(&self) -> CaptureMode {
        CaptureMode::File
    }

    fn samples(&self) -> SampleQueue {
        self.samples.clone()
    }

    fn ended(&self) -> watch::Receiver<bool> {
        self.ended_rx.clone()
    }

    fn stop(&mut self) {
        if let Some(pacer) = self.pacer.take() {
            pacer.abort();
        }
    }

    fn resume(&mut self) -> Result<(), AcquireError> {
        if self.pacer.is_none() {
            self.spawn_pacer();
        }
        Ok(())
    }

    fn rewind(&mut self) {
        self.position.store(0, Ordering::Release);
        let _ = self.ended_tx.send(false);
        // Discard anything the pacer queued before the rewind.
        let _ = self.samples.drain();
    }

    fn is_resumable(&self) -> bool {
        true
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn decode_wav(path: &Path) -> Result<(Vec<f32>, u32), AcquireError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| AcquireError::Decode(format!("{}: {}", path.display(), e)))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| AcquireError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let scale = (1u32 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| AcquireError::Decode(e.to_string()))?
        }
    };

    if interleaved.is_empty() {
        return Err(AcquireError::Decode(format!(
            "{}: no audio samples",
            path.display()
        )));
    }

    let mono = if channels > 1 {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        interleaved
    };

    Ok((mono, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_wav(sample_rate: u32, samples: &[f32]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        {
            let mut writer = hound::WavWriter::new(&mut file, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_file_source_plays_to_end() {
        // 0.2s of audio at a tiny sample rate keeps the test fast.
        let samples: Vec<f32> = (0..200).map(|i| (i as f32 / 200.0) - 0.5).collect();
        let file = write_test_wav(1000, &samples);

        let source = FileSource::open(file.path().to_path_buf()).await.unwrap();
        let queue = source.samples();
        let mut ended = source.ended();

        tokio::time::timeout(Duration::from_secs(5), async {
            while !*ended.borrow() {
                ended.changed().await.unwrap();
            }
        })
        .await
        .expect("file source never ended");

        assert_eq!(queue.drain().len(), samples.len());
    }

    #[tokio::test]
    async fn test_rewind_restarts_from_zero() {
        let samples = vec![0.25f32; 150];
        let file = write_test_wav(1000, &samples);

        let mut source = FileSource::open(file.path().to_path_buf()).await.unwrap();
        let mut ended = source.ended();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !*ended.borrow() {
                ended.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        source.stop();
        source.rewind();
        assert!(!*source.ended().borrow());
        source.resume().unwrap();

        let mut ended = source.ended();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !*ended.borrow() {
                ended.changed().await.unwrap();
            }
        })
        .await
        .expect("replay never ended");
        assert_eq!(source.samples().drain().len(), samples.len());
    }

    #[tokio::test]
    async fn test_missing_file_is_decode_error() {
        let err = FileSource::open(PathBuf::from("/nonexistent/audio.wav"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AcquireError::Decode(_)));
    }

    #[test]
    fn test_decode_int_wav_scales_and_downmixes() {
        let mut file = tempfile::Builder::new().suffix(".wav").tempfile().unwrap();
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        {
            let mut writer = hound::WavWriter::new(&mut file, spec).unwrap();
            // One stereo frame: full-scale left, silent right.
            writer.write_sample(i16::MIN as i32).unwrap();
            writer.write_sample(0i32).unwrap();
            writer.finalize().unwrap();
        }
        file.flush().unwrap();

        let (mono, rate) = decode_wav(file.path()).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(mono.len(), 1);
        assert!((mono[0] - (-0.5)).abs() < 1e-6);
    }
}
