//! Capture session state machine.
//!
//! Owns the active audio source and the tasks around it (chunker, level
//! meter, ended watcher). All transitions funnel through `start` and
//! `stop`; the transport and render layers observe them through
//! `SessionEvent`s.

use crate::audio::chunker::{Chunker, TIMESLICE};
use crate::audio::{AudioSource, CaptureMode, SourceFactory};
use crate::protocol::ClientMessage;
use crate::transport::TransportHandle;
use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const LEVEL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Acquiring(CaptureMode),
    Streaming(CaptureMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    UserStop,
    /// Stopped to make way for a new start.
    Restart,
    SourceEnded,
    Disconnected,
    Rejected,
}

#[derive(Debug)]
pub enum SessionEvent {
    /// A capture session began streaming. The render layer resets its
    /// interim row on this event.
    Started { mode: CaptureMode },
    Stopped { mode: CaptureMode, reason: StopReason },
    /// The source exhausted itself (file EOF, device failure). The
    /// owner should stop the session with `StopReason::SourceEnded`.
    SourceEnded,
    /// RMS level of queued samples, for a UI level meter.
    Level(f32),
}

struct ActiveSession {
    mode: CaptureMode,
    source: Box<dyn AudioSource>,
    chunker: Chunker,
    level_task: JoinHandle<()>,
    ended_task: JoinHandle<()>,
}

pub struct SessionController {
    state: SessionState,
    transport: TransportHandle,
    factory: Arc<dyn SourceFactory>,
    events: mpsc::UnboundedSender<SessionEvent>,
    active: Option<ActiveSession>,
    /// Decoded file source kept across stops so replay skips re-decoding.
    parked_file: Option<Box<dyn AudioSource>>,
    /// Set once the transport was rejected; every later start is refused.
    rejected: bool,
    timeslice: Duration,
}

impl SessionController {
    pub fn new(
        transport: TransportHandle,
        factory: Arc<dyn SourceFactory>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: SessionState::Idle,
                transport,
                factory,
                events: event_tx,
                active: None,
                parked_file: None,
                rejected: false,
                timeslice: TIMESLICE,
            },
            event_rx,
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn set_timeslice(&mut self, timeslice: Duration) {
        self.timeslice = timeslice;
    }

    /// Begin streaming from `mode`. An active session is stopped first;
    /// acquisition failure lands back in `Idle` and is not retried.
    pub async fn start(&mut self, mode: CaptureMode) -> Result<()> {
        if self.rejected {
            return Err(anyhow!("stream is controlled elsewhere; controls disabled"));
        }
        if mode == CaptureMode::None {
            return Err(anyhow!("no capture mode selected"));
        }
        if self.active.is_some() {
            self.stop(StopReason::Restart);
        }

        self.state = SessionState::Acquiring(mode);

        let mut source = match self.take_parked(mode) {
            Some(mut parked) => {
                // Replay starts from the beginning of the file.
                parked.rewind();
                if let Err(e) = parked.resume() {
                    self.state = SessionState::Idle;
                    return Err(anyhow!("failed to resume source: {}", e));
                }
                parked
            }
            None => match self.factory.acquire(mode).await {
                Ok(source) => source,
                Err(e) => {
                    self.state = SessionState::Idle;
                    return Err(anyhow!(e).context(format!("could not acquire {}", mode)));
                }
            },
        };

        // Boundary marker so the server resets its decoding pipeline.
        // Best effort: a closed channel drops it.
        if !self.transport.send_control(&ClientMessage::StreamStart) {
            debug!("stream_start dropped: channel not open");
        }

        let queue = source.samples();
        let chunker = Chunker::spawn(queue.clone(), self.transport.clone(), self.timeslice);

        let level_events = self.events.clone();
        let level_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LEVEL_INTERVAL);
            loop {
                ticker.tick().await;
                let _ = level_events.send(SessionEvent::Level(queue.peek_level()));
            }
        });

        let mut ended_rx = source.ended();
        let ended_events = self.events.clone();
        let ended_task = tokio::spawn(async move {
            loop {
                if *ended_rx.borrow() {
                    let _ = ended_events.send(SessionEvent::SourceEnded);
                    return;
                }
                if ended_rx.changed().await.is_err() {
                    return;
                }
            }
        });

        self.state = SessionState::Streaming(mode);
        self.active = Some(ActiveSession {
            mode,
            source,
            chunker,
            level_task,
            ended_task,
        });
        info!("streaming from {}", mode);
        let _ = self.events.send(SessionEvent::Started { mode });
        Ok(())
    }

    /// Tear down the active session and return to `Idle`.
    pub fn stop(&mut self, reason: StopReason) {
        let Some(mut session) = self.active.take() else {
            self.state = SessionState::Idle;
            return;
        };

        session.chunker.abort();
        session.level_task.abort();
        session.ended_task.abort();
        session.source.stop();

        if session.source.is_resumable() {
            debug!("retaining {} source for replay", session.mode);
            self.parked_file = Some(session.source);
        }

        self.state = SessionState::Idle;
        info!("session stopped ({:?})", reason);
        let _ = self.events.send(SessionEvent::Stopped {
            mode: session.mode,
            reason,
        });
    }

    /// The transport was rejected: stop everything and freeze controls.
    pub fn handle_rejected(&mut self) {
        if !self.rejected {
            warn!("stream controlled elsewhere; disabling capture controls");
        }
        self.rejected = true;
        self.stop(StopReason::Rejected);
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    fn take_parked(&mut self, mode: CaptureMode) -> Option<Box<dyn AudioSource>> {
        if mode == CaptureMode::File {
            self.parked_file.take()
        } else {
            None
        }
    }
}
