//! Outbound side of a push connection.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use super::EventFrame;

/// Write fault on a push connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer went away. Routine for long-lived connections.
    #[error("Client disconnected: {0}")]
    Disconnected(String),

    #[error("Transport failure: {0}")]
    Failed(String),
}

impl TransportError {
    pub fn is_routine(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }
}

/// Writes frames to one client. Owned by that connection's delivery loop.
#[async_trait]
pub trait EventTransport: Send + 'static {
    async fn send(&mut self, frame: EventFrame) -> Result<(), TransportError>;

    /// Called once after the connection reaches `Closed`.
    async fn close(&mut self) {}
}

/// Forwards frames into an mpsc channel; the receiving half is typically
/// turned into an HTTP response stream.
pub struct ChannelTransport {
    sender: mpsc::Sender<EventFrame>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<EventFrame>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventTransport for ChannelTransport {
    async fn send(&mut self, frame: EventFrame) -> Result<(), TransportError> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| TransportError::Disconnected("response stream dropped".to_string()))
    }
}

#[derive(Default)]
struct Recording {
    frames: Mutex<Vec<EventFrame>>,
    writes: AtomicUsize,
    closed: AtomicBool,
}

/// In-memory transport that captures frames. Can be told to fail on the
/// Nth write (1-based); clones share the same recording.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    recording: Arc<Recording>,
    fail_on: Option<(usize, TransportError)>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the `nth` write with `Disconnected`.
    pub fn failing_on(nth: usize) -> Self {
        Self::failing_on_with(nth, TransportError::Disconnected("peer reset".to_string()))
    }

    pub fn failing_on_with(nth: usize, error: TransportError) -> Self {
        Self {
            recording: Arc::default(),
            fail_on: Some((nth, error)),
        }
    }

    pub fn frames(&self) -> Vec<EventFrame> {
        self.recording
            .frames
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Number of attempted writes, failed ones included.
    pub fn write_count(&self) -> usize {
        self.recording.writes.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.recording.closed.load(Ordering::SeqCst)
    }

    /// Polls until at least `count` frames were captured or `timeout` passes.
    pub async fn wait_for_frames(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.frames().len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl EventTransport for RecordingTransport {
    async fn send(&mut self, frame: EventFrame) -> Result<(), TransportError> {
        let attempt = self.recording.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((nth, error)) = &self.fail_on {
            if attempt >= *nth {
                return Err(error.clone());
            }
        }
        self.recording
            .frames
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(frame);
        Ok(())
    }

    async fn close(&mut self) {
        self.recording.closed.store(true, Ordering::SeqCst);
    }
}
