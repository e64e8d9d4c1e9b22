//! Simple query interface for one-shot interactions
//!
//! This module provides the `query` function for simple, stateless
//! interactions with Claude Code CLI: one prompt in, one stream of messages
//! out, one subprocess per call.
//!
//! The facade walks through a small state machine that callers can observe
//! with [`QueryStream::state`]:
//!
//! ```text
//! Idle -> Connecting -> Sending -> Streaming -> Done
//!            |             |           |
//!            +-------------+-----------+------> Failed
//! ```

use crate::{
    errors::{Result, SdkError},
    message_parser::decode_frame,
    transport::{
        RequestFrame, SubprocessTransport, Transport, TransportMode,
        subprocess::DEFAULT_CHANNEL_BUFFER_SIZE,
    },
    types::{ClaudeCodeOptions, Message, ResultMessage, SystemMessage},
};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use pin_project_lite::pin_project;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Query input type
#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    /// Simple string prompt
    Text(String),
    /// Structured payload sent as the `content` of the request
    Structured(Value),
}

impl From<String> for QueryInput {
    fn from(s: String) -> Self {
        QueryInput::Text(s)
    }
}

impl From<&str> for QueryInput {
    fn from(s: &str) -> Self {
        QueryInput::Text(s.to_string())
    }
}

impl From<Value> for QueryInput {
    fn from(value: Value) -> Self {
        QueryInput::Structured(value)
    }
}

impl From<QueryInput> for Value {
    fn from(input: QueryInput) -> Self {
        match input {
            QueryInput::Text(text) => Value::String(text),
            QueryInput::Structured(value) => value,
        }
    }
}

/// Lifecycle of a one-shot query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// Nothing started yet
    Idle,
    /// Starting the CLI
    Connecting,
    /// Writing the prompt
    Sending,
    /// Forwarding messages
    Streaming,
    /// Finished: result received, output ended or cancelled
    Done,
    /// Start-up failed or the transport reported an error
    Failed,
}

pin_project! {
    /// Messages of a one-shot query.
    ///
    /// Dropping the stream stops the query and disconnects the CLI.
    pub struct QueryStream {
        #[pin]
        inner: ReceiverStream<Result<Message>>,
        state: watch::Receiver<QueryState>,
    }
}

impl QueryStream {
    /// Current state of the query
    pub fn state(&self) -> QueryState {
        *self.state.borrow()
    }

    /// Drain the stream into a [`QueryOutcome`]
    pub async fn into_outcome(mut self) -> QueryOutcome {
        let mut outcome = QueryOutcome::default();
        while let Some(item) = self.next().await {
            match item {
                Ok(message) => {
                    if let Some(system) = message.as_error() {
                        outcome.error = Some(system_error_to_sdk(system));
                    }
                    outcome.messages.push(message);
                },
                Err(e) => outcome.error = Some(e),
            }
        }
        outcome
    }
}

impl Stream for QueryStream {
    type Item = Result<Message>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().inner.poll_next(cx)
    }
}

/// Everything a query produced
#[derive(Debug, Default)]
pub struct QueryOutcome {
    /// All messages in arrival order, including inline error messages
    pub messages: Vec<Message>,
    /// Last error observed on the stream
    pub error: Option<SdkError>,
}

impl QueryOutcome {
    /// The result message that ended the turn
    pub fn result(&self) -> Option<&ResultMessage> {
        self.messages.iter().rev().find_map(|message| match message {
            Message::Result(result) => Some(result),
            _ => None,
        })
    }

    /// Whether the query finished without any error
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.result().is_some_and(|result| !result.is_error)
    }

    /// The messages, or the last error if there was one
    pub fn into_result(self) -> Result<Vec<Message>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.messages),
        }
    }
}

/// Convert an inline `System { subtype: "error" }` message to an error value
fn system_error_to_sdk(system: &SystemMessage) -> SdkError {
    let error = system
        .data
        .get("error")
        .or_else(|| system.data.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();

    match system.data.get("raw_data").and_then(Value::as_str) {
        Some(raw) => SdkError::parse_error(error, raw),
        None => SdkError::cli_error(
            error,
            system
                .data
                .get("code")
                .and_then(Value::as_str)
                .map(str::to_owned),
        ),
    }
}

/// Query Claude Code for a one-shot interaction.
///
/// Spawns the CLI, sends `prompt`, closes stdin and streams the decoded
/// output. The stream ends after the `Result` message, when the CLI output
/// ends, or when the stream is dropped. The CLI is stopped in every case.
///
/// Lines that are not valid JSON show up as `System { subtype: "error" }`
/// messages and the stream goes on. Failures to start the CLI or send the
/// prompt are returned directly.
///
/// # Examples
///
/// ```rust,no_run
/// use claude_code_client::{query, Result};
/// use futures::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let mut messages = query("What is the capital of France?", None).await?;
///
///     while let Some(msg) = messages.next().await {
///         println!("{:?}", msg?);
///     }
///
///     Ok(())
/// }
/// ```
pub async fn query(
    prompt: impl Into<QueryInput>,
    options: Option<ClaudeCodeOptions>,
) -> Result<QueryStream> {
    query_with_cancel(prompt, options, CancellationToken::new()).await
}

/// Like [`query`], stopping early when `cancel` fires. A query cancelled
/// while the CLI is starting returns a stream that is already finished.
pub async fn query_with_cancel(
    prompt: impl Into<QueryInput>,
    options: Option<ClaudeCodeOptions>,
    cancel: CancellationToken,
) -> Result<QueryStream> {
    let options = options.unwrap_or_default();
    let buffer = options
        .channel_buffer_size
        .unwrap_or(DEFAULT_CHANNEL_BUFFER_SIZE);
    let transport = SubprocessTransport::new(options, TransportMode::OneShot);
    start(Box::new(transport), prompt.into(), cancel, buffer).await
}

/// Run a one-shot query over an already constructed transport
pub async fn query_with_transport(
    transport: Box<dyn Transport + Send>,
    prompt: impl Into<QueryInput>,
    cancel: CancellationToken,
) -> Result<QueryStream> {
    start(transport, prompt.into(), cancel, DEFAULT_CHANNEL_BUFFER_SIZE).await
}

/// Run a query and collect every message
pub async fn query_sync(
    prompt: impl Into<QueryInput>,
    options: Option<ClaudeCodeOptions>,
) -> Result<QueryOutcome> {
    query_sync_with_cancel(prompt, options, CancellationToken::new()).await
}

/// Like [`query_sync`], stopping early when `cancel` fires
pub async fn query_sync_with_cancel(
    prompt: impl Into<QueryInput>,
    options: Option<ClaudeCodeOptions>,
    cancel: CancellationToken,
) -> Result<QueryOutcome> {
    let stream = query_with_cancel(prompt, options, cancel).await?;
    Ok(stream.into_outcome().await)
}

async fn start(
    mut transport: Box<dyn Transport + Send>,
    prompt: QueryInput,
    cancel: CancellationToken,
    buffer: usize,
) -> Result<QueryStream> {
    let (state_tx, state_rx) = watch::channel(QueryState::Idle);

    state_tx.send_replace(QueryState::Connecting);
    let started = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        started = async {
            transport.connect().await?;
            state_tx.send_replace(QueryState::Sending);
            transport
                .send_request(vec![RequestFrame::prompt(prompt)], None)
                .await?;
            transport.close_stdin().await?;
            transport
                .receive_messages()
                .ok_or_else(|| SdkError::invalid_state("transport output was already taken"))
        } => Some(started),
    };

    let lines = match started {
        Some(Ok(lines)) => lines,
        None => {
            debug!("Query cancelled before streaming");
            if let Err(e) = transport.disconnect().await {
                debug!("Disconnect after cancelled start: {}", e);
            }
            state_tx.send_replace(QueryState::Done);
            let (_, rx) = mpsc::channel(1);
            return Ok(QueryStream {
                inner: ReceiverStream::new(rx),
                state: state_rx,
            });
        },
        Some(Err(e)) => {
            warn!("Query failed to start: {}", e);
            state_tx.send_replace(QueryState::Failed);
            if let Err(disconnect_err) = transport.disconnect().await {
                debug!("Disconnect after failed start: {}", disconnect_err);
            }
            return Err(e);
        },
    };

    state_tx.send_replace(QueryState::Streaming);
    let (tx, rx) = mpsc::channel(buffer.max(1));
    tokio::spawn(drive(transport, lines, tx, state_tx, cancel));

    Ok(QueryStream {
        inner: ReceiverStream::new(rx),
        state: state_rx,
    })
}

async fn drive(
    mut transport: Box<dyn Transport + Send>,
    mut lines: mpsc::Receiver<Result<Bytes>>,
    tx: mpsc::Sender<Result<Message>>,
    state_tx: watch::Sender<QueryState>,
    cancel: CancellationToken,
) {
    let mut final_state = QueryState::Done;

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Query cancelled");
                break;
            },
            _ = tx.closed() => {
                debug!("Query stream dropped");
                break;
            },
            item = lines.recv() => item,
        };

        let Some(item) = item else {
            debug!("CLI output ended");
            break;
        };

        let (message, is_result) = match item {
            Ok(line) => {
                let message = decode_frame(&line);
                let is_result = message.is_result();
                (Ok(message), is_result)
            },
            Err(e) => {
                final_state = QueryState::Failed;
                (Err(e), true)
            },
        };

        let delivered = tokio::select! {
            _ = cancel.cancelled() => false,
            sent = tx.send(message) => sent.is_ok(),
        };
        if !delivered || is_result {
            break;
        }
    }

    drop(lines);
    if let Err(e) = transport.disconnect().await {
        warn!("Failed to disconnect after query: {}", e);
    }
    state_tx.send_replace(final_state);
    info!("Query finished: {:?}", final_state);
}
