//! Fixed-interval audio chunk emission.

use super::SampleQueue;
use crate::transport::TransportHandle;
use log::debug;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Interval between outbound audio chunks.
pub const TIMESLICE: Duration = Duration::from_millis(500);

/// Drains the sample queue on a fixed cadence and ships each non-empty
/// batch as one binary frame. Frames are dropped while the channel is
/// closed, never buffered.
pub struct Chunker {
    task: JoinHandle<()>,
}

impl Chunker {
    pub fn spawn(queue: SampleQueue, transport: TransportHandle, timeslice: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timeslice);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let samples = queue.drain();
                if samples.is_empty() {
                    continue;
                }
                if !transport.send_chunk(encode_s16le(&samples)) {
                    debug!("chunk dropped: channel not open ({} samples)", samples.len());
                }
            }
        });
        Self { task }
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for Chunker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// f32 samples to little-endian signed 16-bit PCM, clamped.
pub fn encode_s16le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportHandle, TransportState};
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn test_encode_clamps_and_scales() {
        let bytes = encode_s16le(&[0.0, 1.0, -1.0, 2.0]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 32767);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -32767);
        // Out-of-range input clamps instead of wrapping.
        assert_eq!(i16::from_le_bytes([bytes[6], bytes[7]]), 32767);
    }

    #[tokio::test]
    async fn test_chunker_skips_empty_and_sends_batches() {
        let (transport, mut rx) = TransportHandle::detached(TransportState::Open);
        let queue = SampleQueue::new();
        let chunker = Chunker::spawn(queue.clone(), transport, Duration::from_millis(10));

        // Empty queue: a few ticks pass, nothing is sent.
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());

        queue.push(&[0.5, -0.5]);
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("chunker never sent")
            .unwrap();
        match frame {
            Message::Binary(bytes) => assert_eq!(bytes.len(), 4),
            other => panic!("unexpected frame: {:?}", other),
        }
        chunker.abort();
    }

    #[tokio::test]
    async fn test_chunks_dropped_while_closed() {
        let (transport, mut rx) = TransportHandle::detached(TransportState::ClosedClean);
        let queue = SampleQueue::new();
        let chunker = Chunker::spawn(queue.clone(), transport, Duration::from_millis(10));

        queue.push(&[0.5; 100]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        // Dropped means consumed, not queued for later.
        assert!(queue.drain().is_empty());
        chunker.abort();
    }
}
