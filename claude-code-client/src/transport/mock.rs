//! In-memory mock transport for testing
//!
//! Tests push raw output lines through the handle as if the CLI printed them
//! and observe what the client wrote, how often it connected and whether it
//! interrupted or disconnected.

use super::{RequestFrame, Transport};
use crate::errors::{Result, SdkError};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Handle for interacting with the mock transport in tests
pub struct MockTransportHandle {
    /// Inject inbound lines (as if coming from CLI); drop it to simulate EOF
    pub inbound_tx: mpsc::Sender<Result<Bytes>>,
    /// Observe lines written by the client
    pub sent_rx: mpsc::UnboundedReceiver<String>,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    interrupts: Arc<AtomicUsize>,
    stdin_closed: Arc<AtomicBool>,
}

impl MockTransportHandle {
    /// Push one output line
    pub async fn push_line(&self, line: impl Into<Bytes>) -> bool {
        self.inbound_tx.send(Ok(line.into())).await.is_ok()
    }

    /// Push a transport error as the next item
    pub async fn push_error(&self, error: SdkError) -> bool {
        self.inbound_tx.send(Err(error)).await.is_ok()
    }

    /// Number of times the transport actually started
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Number of times the transport actually stopped
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Number of interrupt requests
    pub fn interrupt_count(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    /// Whether the client closed stdin
    pub fn stdin_closed(&self) -> bool {
        self.stdin_closed.load(Ordering::SeqCst)
    }
}

/// An in-memory transport implementing the `Transport` trait
pub struct MockTransport {
    connected: bool,
    message_rx: Option<mpsc::Receiver<Result<Bytes>>>,
    sent_tx: mpsc::UnboundedSender<String>,
    connects: Arc<AtomicUsize>,
    disconnects: Arc<AtomicUsize>,
    interrupts: Arc<AtomicUsize>,
    stdin_closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a new mock transport and a handle for tests
    pub fn pair() -> (Box<dyn Transport + Send>, MockTransportHandle) {
        let (inbound_tx, message_rx) = mpsc::channel(100);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let connects = Arc::new(AtomicUsize::new(0));
        let disconnects = Arc::new(AtomicUsize::new(0));
        let interrupts = Arc::new(AtomicUsize::new(0));
        let stdin_closed = Arc::new(AtomicBool::new(false));

        let transport = MockTransport {
            connected: false,
            message_rx: Some(message_rx),
            sent_tx,
            connects: connects.clone(),
            disconnects: disconnects.clone(),
            interrupts: interrupts.clone(),
            stdin_closed: stdin_closed.clone(),
        };

        let handle = MockTransportHandle {
            inbound_tx,
            sent_rx,
            connects,
            disconnects,
            interrupts,
            stdin_closed,
        };

        (Box::new(transport), handle)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self) -> Result<()> {
        if !self.connected {
            self.connected = true;
            self.connects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn send_request(
        &mut self,
        frames: Vec<RequestFrame>,
        params: Option<Map<String, Value>>,
    ) -> Result<()> {
        if !self.connected {
            return Err(SdkError::NotConnected);
        }
        if self.stdin_closed.load(Ordering::SeqCst) {
            return Err(SdkError::stdin_closed());
        }
        for frame in &frames {
            let _ = self.sent_tx.send(frame.encode(params.as_ref())?);
        }
        Ok(())
    }

    async fn close_stdin(&mut self) -> Result<()> {
        self.stdin_closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn interrupt(&mut self) -> Result<()> {
        if !self.connected {
            return Err(SdkError::NotConnected);
        }
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.connected {
            self.connected = false;
            self.message_rx = None;
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn receive_messages(&mut self) -> Option<mpsc::Receiver<Result<Bytes>>> {
        self.message_rx.take()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
