//! Transport layer abstractions
//!
//! This module defines the Transport trait and its implementations for
//! communicating with the Claude CLI. A transport moves bytes: it writes
//! request frames to the CLI and hands out the raw output lines. Decoding is
//! left to the caller.

use crate::errors::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::mpsc::Receiver;

pub mod mock;
pub mod subprocess;

pub use mock::{MockTransport, MockTransportHandle};
pub use subprocess::SubprocessTransport;

/// How the CLI is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// One prompt, then stdin is closed (`--print`)
    OneShot,
    /// Long-lived session reading stream-json from stdin
    Interactive,
}

/// Input message structure for interactive sessions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputMessage {
    /// Message type (always "user")
    #[serde(rename = "type")]
    pub r#type: String,
    /// Message content
    pub message: Value,
    /// Parent tool use ID (for tool results)
    pub parent_tool_use_id: Option<String>,
    /// Session ID
    pub session_id: String,
}

impl InputMessage {
    /// Create a new user message
    pub fn user(content: impl Into<Value>, session_id: impl Into<String>) -> Self {
        Self {
            r#type: "user".to_string(),
            message: json!({
                "role": "user",
                "content": content.into()
            }),
            parent_tool_use_id: None,
            session_id: session_id.into(),
        }
    }
}

/// One JSON object written to the CLI stdin
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RequestFrame {
    /// `{"role": "user", "content": ...}` used by one-shot queries
    Prompt {
        /// Always "user"
        role: String,
        /// Prompt text or structured payload
        content: Value,
    },
    /// Envelope used by interactive sessions
    Input(InputMessage),
}

impl RequestFrame {
    /// One-shot prompt frame
    pub fn prompt(content: impl Into<Value>) -> Self {
        Self::Prompt {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Interactive user frame for a session
    pub fn input(content: impl Into<Value>, session_id: impl Into<String>) -> Self {
        Self::Input(InputMessage::user(content, session_id))
    }

    /// Serialize to one line, merging `params` as extra top-level keys.
    /// Keys already set by the frame win.
    pub fn encode(&self, params: Option<&Map<String, Value>>) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let (Some(params), Some(obj)) = (params, value.as_object_mut()) {
            for (key, extra) in params {
                obj.entry(key.clone()).or_insert_with(|| extra.clone());
            }
        }
        Ok(serde_json::to_string(&value)?)
    }
}

/// Control frame asking the CLI to stop the current turn
pub fn interrupt_request(request_id: &str) -> Value {
    json!({
        "type": "control_request",
        "request_id": request_id,
        "request": {"subtype": "interrupt"}
    })
}

/// Whether an output line is a control frame rather than a message
pub(crate) fn is_control_frame(value: &Value) -> bool {
    matches!(
        value.get("type").and_then(Value::as_str),
        Some("control_response" | "control_request")
    )
}

/// Transport trait for communicating with Claude CLI
#[async_trait]
pub trait Transport: Send {
    /// Start the CLI. Calling it again while connected does nothing.
    async fn connect(&mut self) -> Result<()>;

    /// Write one JSON line per frame, merging `params` into each
    async fn send_request(
        &mut self,
        frames: Vec<RequestFrame>,
        params: Option<Map<String, Value>>,
    ) -> Result<()>;

    /// Close the input side; output keeps flowing
    async fn close_stdin(&mut self) -> Result<()>;

    /// Ask the CLI to stop the current turn
    async fn interrupt(&mut self) -> Result<()>;

    /// Stop the CLI and release every resource. Idempotent.
    async fn disconnect(&mut self) -> Result<()>;

    /// Take the receiver of raw output lines (can only be called once)
    fn receive_messages(&mut self) -> Option<Receiver<Result<Bytes>>>;

    /// Take the receiver of control frames, if supported by the transport
    fn take_control_receiver(&mut self) -> Option<Receiver<Value>> {
        None
    }

    /// Check if the transport is connected
    fn is_connected(&self) -> bool;
}

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Not connected
    Disconnected,
    /// Connecting
    Connecting,
    /// Connected and ready
    Connected,
    /// Disconnecting
    Disconnecting,
}
