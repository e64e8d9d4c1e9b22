//! Interactive client for stateful conversations with Claude
//!
//! One long-lived CLI process serves many turns. Every decoded message lands
//! in a single bounded channel in stdout order; callers that mix sessions on
//! one client demultiplex by `ResultMessage::session_id`.

use crate::{
    errors::{Result, SdkError},
    message_parser::decode_frame,
    query::QueryInput,
    session::SessionManager,
    transport::{
        RequestFrame, SubprocessTransport, Transport, TransportMode,
        subprocess::DEFAULT_CHANNEL_BUFFER_SIZE,
    },
    types::{ClaudeCodeOptions, DEFAULT_SESSION_ID, Message},
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Client state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected yet
    Disconnected,
    /// Connected and ready
    Connected,
    /// Closed for good; build a new client to reconnect
    Closed,
}

/// Stream of messages for one turn, ending after its `Result`
pub type ResponseStream = ReceiverStream<Result<Message>>;

/// Interactive client for bidirectional communication with Claude
///
/// # Example
///
/// ```rust,no_run
/// use claude_code_client::{ClaudeCodeOptions, InteractiveClient, Message, Result};
/// use futures::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let client = InteractiveClient::new(ClaudeCodeOptions::default());
///     client.connect().await?;
///
///     client.query("Hello!", "default").await?;
///     let mut response = client.receive_response();
///     while let Some(msg) = response.next().await {
///         if let Message::Assistant(assistant) = msg? {
///             println!("{}", assistant.text());
///         }
///     }
///
///     client.close().await
/// }
/// ```
pub struct InteractiveClient {
    transport: Arc<Mutex<Box<dyn Transport + Send>>>,
    state: RwLock<ClientState>,
    message_tx: parking_lot::Mutex<Option<mpsc::Sender<Result<Message>>>>,
    message_rx: Arc<Mutex<mpsc::Receiver<Result<Message>>>>,
    buffer: usize,
    forwarder: parking_lot::Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    sessions: Option<Arc<SessionManager>>,
}

impl InteractiveClient {
    /// Create a client that will run the CLI in interactive mode
    pub fn new(options: ClaudeCodeOptions) -> Self {
        let buffer = options
            .channel_buffer_size
            .unwrap_or(DEFAULT_CHANNEL_BUFFER_SIZE);
        let transport = SubprocessTransport::new(options, TransportMode::Interactive);
        Self::with_transport(Box::new(transport), buffer)
    }

    /// Create a client over an existing transport
    pub fn with_transport(transport: Box<dyn Transport + Send>, buffer: usize) -> Self {
        let buffer = buffer.max(1);
        let (tx, rx) = mpsc::channel(buffer);
        Self {
            transport: Arc::new(Mutex::new(transport)),
            state: RwLock::new(ClientState::Disconnected),
            message_tx: parking_lot::Mutex::new(Some(tx)),
            message_rx: Arc::new(Mutex::new(rx)),
            buffer,
            forwarder: parking_lot::Mutex::new(None),
            cancel: CancellationToken::new(),
            sessions: None,
        }
    }

    /// Track every session id passed to [`query`](Self::query) in `manager`
    pub fn with_session_manager(mut self, manager: Arc<SessionManager>) -> Self {
        self.sessions = Some(manager);
        self
    }

    /// Session registry attached to this client, if any
    pub fn session_manager(&self) -> Option<&Arc<SessionManager>> {
        self.sessions.as_ref()
    }

    /// Current state
    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    /// Whether the client is connected
    pub async fn is_connected(&self) -> bool {
        self.state().await == ClientState::Connected
    }

    /// Start the CLI and the forwarding task. Calling it again while
    /// connected does nothing.
    pub async fn connect(&self) -> Result<()> {
        let mut transport = self.transport.lock().await;
        match *self.state.read().await {
            ClientState::Connected => return Ok(()),
            ClientState::Closed => {
                return Err(SdkError::invalid_state("client is closed"));
            },
            ClientState::Disconnected => {},
        }

        transport.connect().await?;
        let Some(lines) = transport.receive_messages() else {
            if let Err(e) = transport.disconnect().await {
                debug!("Disconnect after failed connect: {}", e);
            }
            return Err(SdkError::invalid_state("transport output was already taken"));
        };
        let Some(tx) = self.message_tx.lock().take() else {
            if let Err(e) = transport.disconnect().await {
                debug!("Disconnect after failed connect: {}", e);
            }
            return Err(SdkError::invalid_state("message channel is gone"));
        };

        let handle = tokio::spawn(forward(lines, tx, self.cancel.child_token()));
        *self.forwarder.lock() = Some(handle);
        *self.state.write().await = ClientState::Connected;

        info!("Connected to Claude CLI");
        Ok(())
    }

    /// Send a user message for `session_id` without waiting for the answer.
    /// An empty id means the default session.
    ///
    /// The frame carries `session_id` as given, since the CLI echoes it back
    /// in `ResultMessage::session_id`. An attached [`SessionManager`] keys the
    /// session by [`normalize_session_id`](crate::session::normalize_session_id)
    /// instead; its lookups normalize, so either form finds the session.
    pub async fn query(&self, prompt: impl Into<QueryInput>, session_id: &str) -> Result<()> {
        if !self.is_connected().await {
            return Err(SdkError::NotConnected);
        }

        let session_id = if session_id.is_empty() {
            DEFAULT_SESSION_ID
        } else {
            session_id
        };
        if let Some(manager) = &self.sessions {
            manager.ensure_session(session_id)?;
        }

        let frame = RequestFrame::input(prompt.into(), session_id);
        self.transport
            .lock()
            .await
            .send_request(vec![frame], None)
            .await?;

        debug!("Message sent to session {}", session_id);
        Ok(())
    }

    /// Stream every message from the CLI.
    ///
    /// There is one consumer at a time: a second stream polled while the
    /// first is alive waits until the first is dropped.
    pub fn receive_messages(&self) -> impl Stream<Item = Result<Message>> + Send + 'static {
        let rx = self.message_rx.clone();
        async_stream::stream! {
            let mut rx = rx.lock_owned().await;
            while let Some(item) = rx.recv().await {
                yield item;
            }
        }
    }

    /// Stream messages up to and including the next `Result`
    pub fn receive_response(&self) -> ResponseStream {
        self.receive_response_with_cancel(CancellationToken::new())
    }

    /// Like [`receive_response`](Self::receive_response), ending early when
    /// `cancel` fires. Messages left in the channel stay there for the next
    /// reader.
    pub fn receive_response_with_cancel(&self, cancel: CancellationToken) -> ResponseStream {
        let rx = self.message_rx.clone();
        let (tx, out) = mpsc::channel(self.buffer);

        tokio::spawn(async move {
            let mut rx = tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tx.closed() => return,
                guard = rx.lock_owned() => guard,
            };

            loop {
                let item = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tx.closed() => break,
                    item = rx.recv() => item,
                };
                let Some(item) = item else {
                    break;
                };

                let done = matches!(&item, Ok(message) if message.is_result());
                if tx.send(item).await.is_err() || done {
                    break;
                }
            }
        });

        ReceiverStream::new(out)
    }

    /// Send a message to the default session and collect the full response
    pub async fn send_and_receive(&self, prompt: impl Into<QueryInput>) -> Result<Vec<Message>> {
        self.query(prompt, DEFAULT_SESSION_ID).await?;

        let mut response = self.receive_response();
        let mut messages = Vec::new();
        while let Some(item) = response.next().await {
            messages.push(item?);
        }
        Ok(messages)
    }

    /// Ask the CLI to stop the current turn
    pub async fn interrupt(&self) -> Result<()> {
        if !self.is_connected().await {
            return Err(SdkError::NotConnected);
        }
        self.transport.lock().await.interrupt().await?;
        info!("Interrupt sent");
        Ok(())
    }

    /// Stop the forwarder and the CLI. Safe to call more than once and
    /// before `connect`.
    pub async fn close(&self) -> Result<()> {
        let mut transport = self.transport.lock().await;
        {
            let mut state = self.state.write().await;
            if *state == ClientState::Closed {
                return Ok(());
            }
            *state = ClientState::Closed;
        }

        self.cancel.cancel();
        self.message_tx.lock().take();

        let forwarder = self.forwarder.lock().take();
        if let Some(handle) = forwarder
            && let Err(e) = handle.await
            && !e.is_cancelled()
        {
            warn!("Forwarding task failed: {}", e);
        }

        transport.disconnect().await?;
        info!("Interactive client closed");
        Ok(())
    }
}

impl Drop for InteractiveClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn forward(
    mut lines: mpsc::Receiver<Result<Bytes>>,
    tx: mpsc::Sender<Result<Message>>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = lines.recv() => item,
        };
        let Some(item) = item else {
            debug!("CLI output ended");
            break;
        };

        let message = item.map(|line| decode_frame(&line));
        let delivered = tokio::select! {
            _ = cancel.cancelled() => false,
            sent = tx.send(message) => sent.is_ok(),
        };
        if !delivered {
            break;
        }
    }
    debug!("Forwarding task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{SessionConfig, normalize_session_id};
    use crate::transport::{MockTransport, MockTransportHandle};
    use serde_json::{Value, json};
    use tokio_test::assert_ok;

    const ASSISTANT: &str = r#"{"role":"assistant","content":[{"type":"text","text":"4"}]}"#;
    const RESULT: &str = r#"{"subtype":"success","duration_ms":12,"duration_api_ms":9,"is_error":false,"num_turns":1,"session_id":"default","total_cost_usd":0.001}"#;

    fn client() -> (InteractiveClient, MockTransportHandle) {
        let (transport, handle) = MockTransport::pair();
        (InteractiveClient::with_transport(transport, 16), handle)
    }

    #[tokio::test]
    async fn test_connect_and_close_are_idempotent() {
        let (client, handle) = client();

        assert_ok!(client.connect().await);
        assert_ok!(client.connect().await);
        assert_eq!(handle.connect_count(), 1);
        assert!(client.is_connected().await);

        assert_ok!(client.close().await);
        assert_ok!(client.close().await);
        assert_eq!(handle.disconnect_count(), 1);
        assert_eq!(client.state().await, ClientState::Closed);

        assert!(matches!(
            client.connect().await,
            Err(SdkError::InvalidState { .. })
        ));
        assert_eq!(handle.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_close_without_connect() {
        let (client, handle) = client();
        assert_ok!(client.close().await);
        assert_eq!(handle.connect_count(), 0);
        assert_eq!(handle.disconnect_count(), 0);
    }

    #[tokio::test]
    async fn test_query_requires_connection() {
        let (client, _handle) = client();
        assert!(matches!(
            client.query("hi", "default").await,
            Err(SdkError::NotConnected)
        ));
        assert!(matches!(
            client.interrupt().await,
            Err(SdkError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_query_frame_shape() {
        let (client, mut handle) = client();
        client.connect().await.unwrap();

        client.query("What is 2+2?", "").await.unwrap();
        let line = handle.sent_rx.recv().await.unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "user",
                "message": {"role": "user", "content": "What is 2+2?"},
                "parent_tool_use_id": null,
                "session_id": "default"
            })
        );

        client.query("again", "review").await.unwrap();
        let line = handle.sent_rx.recv().await.unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["session_id"], "review");
    }

    #[tokio::test]
    async fn test_receive_response_stops_after_result() {
        let (client, handle) = client();
        client.connect().await.unwrap();

        handle.push_line(ASSISTANT).await;
        handle.push_line(RESULT).await;
        handle.push_line(ASSISTANT).await;

        let first: Vec<_> = client.receive_response().collect().await;
        assert_eq!(first.len(), 2);
        assert!(matches!(first[0], Ok(Message::Assistant(_))));
        assert!(matches!(first[1], Ok(Message::Result(_))));

        let mut rest = Box::pin(client.receive_messages());
        let next = rest.next().await.unwrap().unwrap();
        assert!(matches!(next, Message::Assistant(_)));
    }

    #[tokio::test]
    async fn test_malformed_line_is_delivered_inline() {
        let (client, handle) = client();
        client.connect().await.unwrap();

        handle.push_line("{not json").await;
        handle.push_line(RESULT).await;

        let messages = client.send_and_receive("hi").await.unwrap();
        assert_eq!(messages.len(), 2);
        let error = messages[0].as_error().unwrap();
        assert_eq!(error.data["raw_data"], "{not json");
        assert!(messages[1].is_result());
    }

    #[tokio::test]
    async fn test_receivers_take_turns() {
        let (client, handle) = client();
        client.connect().await.unwrap();

        handle.push_line(ASSISTANT).await;
        handle.push_line(RESULT).await;

        let mut first = Box::pin(client.receive_messages());
        assert!(matches!(first.next().await, Some(Ok(Message::Assistant(_)))));
        drop(first);

        let mut second = Box::pin(client.receive_messages());
        assert!(matches!(second.next().await, Some(Ok(Message::Result(_)))));
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let (client, _handle) = client();
        client.connect().await.unwrap();

        let response = client.receive_response();
        client.close().await.unwrap();

        let items: Vec<_> = response.collect().await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_is_forwarded() {
        let (client, handle) = client();
        client.connect().await.unwrap();

        handle
            .push_error(SdkError::ProcessExited {
                code: Some(2),
                stderr: None,
            })
            .await;

        let mut messages = Box::pin(client.receive_messages());
        assert!(matches!(
            messages.next().await,
            Some(Err(SdkError::ProcessExited { code: Some(2), .. }))
        ));
    }

    #[tokio::test]
    async fn test_interrupt_delegates() {
        let (client, handle) = client();
        client.connect().await.unwrap();
        client.interrupt().await.unwrap();
        assert_eq!(handle.interrupt_count(), 1);
    }

    #[tokio::test]
    async fn test_wire_id_and_registry_key() {
        let manager = Arc::new(SessionManager::default());
        let (transport, mut handle) = MockTransport::pair();
        let client =
            InteractiveClient::with_transport(transport, 16).with_session_manager(manager.clone());
        client.connect().await.unwrap();

        client.query("hi", "review").await.unwrap();
        let sent: Value = serde_json::from_str(&handle.sent_rx.recv().await.unwrap()).unwrap();
        assert_eq!(sent["session_id"], "review");

        let session = manager.get_session("review").unwrap();
        assert_eq!(session.id, normalize_session_id("review"));
        assert_ne!(session.id, "review");
    }

    #[tokio::test]
    async fn test_session_cap_is_enforced() {
        let manager = Arc::new(SessionManager::new(SessionConfig {
            max_sessions: 1,
            ..SessionConfig::default()
        }));
        let (transport, mut handle) = MockTransport::pair();
        let client =
            InteractiveClient::with_transport(transport, 16).with_session_manager(manager.clone());
        client.connect().await.unwrap();

        client.query("one", "alpha").await.unwrap();
        assert!(matches!(
            client.query("two", "beta").await,
            Err(SdkError::SessionLimitReached { max: 1 })
        ));
        client.query("three", "alpha").await.unwrap();

        assert_eq!(manager.active_count(), 1);
        assert!(handle.sent_rx.recv().await.unwrap().contains("one"));
        assert!(handle.sent_rx.recv().await.unwrap().contains("three"));
    }
}
