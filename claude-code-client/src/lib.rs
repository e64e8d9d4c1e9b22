//! # Claude Code client for Rust
//!
//! Drives the Claude Code CLI as a subprocess and turns its stream-json output
//! into typed messages, with both one-shot and interactive interfaces.
//!
//! ## Features
//!
//! - **One-shot queries**: `query` streams the messages of a single prompt,
//!   `query_sync` collects them
//! - **Interactive client**: one long-lived CLI process for many turns and
//!   sessions with `InteractiveClient`
//! - **Lenient decoding**: malformed output lines become inline
//!   `System { subtype: "error" }` messages instead of ending the stream
//! - **Session registry**: `SessionManager` caps and expires sessions
//! - **Layered settings**: defaults, config files and `CLAUDE_CODE_*`
//!   environment variables through `Settings`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use claude_code_client::{query, Result};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut messages = query("What is 2 + 2?", None).await?;
//!
//!     while let Some(msg) = messages.next().await {
//!         println!("{:?}", msg?);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Conversion between decoded records and public message types
pub mod adapter;
mod errors;
mod interactive;
pub mod message_parser;
mod query;
pub mod retry;
pub mod session;
pub mod settings;
pub mod transport;
mod types;

// Re-export main types and functions
pub use errors::{Result, SdkError};
pub use interactive::{ClientState, InteractiveClient, ResponseStream};
pub use query::{
    QueryInput, QueryOutcome, QueryState, QueryStream, query, query_sync, query_sync_with_cancel,
    query_with_cancel, query_with_transport,
};
pub use retry::{RetryConfig, Retryable, retry_with_backoff};
pub use session::{Session, SessionConfig, SessionManager, SessionState};
pub use settings::{CliSettings, Settings};
pub use types::{
    AssistantMessage, ClaudeCodeOptions, ClaudeCodeOptionsBuilder, ContentBlock,
    DEFAULT_ENTRYPOINT, DEFAULT_SESSION_ID, McpServerConfig, Message, PermissionMode,
    ResultMessage, SystemMessage, TextContent, ToolResultContent, ToolUseContent, UserMessage,
};

// Re-export transport types for convenience
pub use transport::{SubprocessTransport, Transport, TransportMode};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        ClaudeCodeOptions, InteractiveClient, Message, PermissionMode, QueryOutcome, Result,
        SdkError, query, query_sync,
    };
}
