//! Error types for the Claude Code client
//!
//! Every fallible operation in the crate returns [`SdkError`]. Errors fall in
//! three groups: start-up failures (the CLI cannot be found or spawned),
//! stream failures (pipe I/O, abnormal process exit) and caller mistakes
//! (not connected, session limits, bad configuration). Decode failures are
//! special: the facades turn them into inline system messages instead of
//! ending the stream.

use bytes::Bytes;
use thiserror::Error;

/// Main error type for the Claude Code client
#[derive(Error, Debug)]
pub enum SdkError {
    /// Claude CLI executable was not found
    #[error(
        "Claude CLI not found. Install with: npm install -g @anthropic-ai/claude-code\n\nSearched in:\n{searched_paths}"
    )]
    CliNotFound {
        /// Paths that were searched for the CLI
        searched_paths: String,
    },

    /// The CLI binary was found but could not be spawned
    #[error("Failed to start Claude CLI at {path}: {source}")]
    ProcessStart {
        /// Path of the binary we tried to run
        path: String,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// Writing to the subprocess stdin failed (pipe closed or process gone)
    #[error("Failed to write to Claude CLI stdin: {0}")]
    Write(#[source] std::io::Error),

    /// Reading from the subprocess stdout failed
    #[error("Failed to read Claude CLI output: {0}")]
    Read(#[source] std::io::Error),

    /// Process exited with a non-zero status
    #[error("Claude process exited unexpectedly with code {code:?}{}", format_stderr(.stderr))]
    ProcessExited {
        /// Exit code if available (`None` when killed by a signal)
        code: Option<i32>,
        /// Last lines written to stderr before exit
        stderr: Option<String>,
    },

    /// An output line was not valid JSON
    #[error("Failed to decode JSON from CLI output: {}", String::from_utf8_lossy(.raw))]
    Decode {
        /// Raw bytes of the offending line
        raw: Bytes,
        /// Original error
        #[source]
        source: serde_json::Error,
    },

    /// An operation that needs a live connection was called before `connect`
    #[error("Not connected: call connect() first")]
    NotConnected,

    /// Failed to parse a message that was valid JSON
    #[error("Failed to parse message: {error}\nRaw message: {raw}")]
    MessageParseError {
        /// Parse error description
        error: String,
        /// Raw message that failed to parse
        raw: String,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout waiting for the subprocess
    #[error("Timeout after {seconds} seconds")]
    Timeout {
        /// Number of seconds waited before timeout
        seconds: u64,
    },

    /// Session registry is full
    #[error("Session limit reached: at most {max} sessions may be open")]
    SessionLimitReached {
        /// Configured cap
        max: usize,
    },

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A session with this id is already registered
    #[error("Session already exists: {0}")]
    SessionExists(String),

    /// Session was closed and cannot be used anymore
    #[error("Session is closed: {0}")]
    SessionClosed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Layered settings could not be loaded
    #[error("Failed to load settings: {0}")]
    Settings(#[from] config::ConfigError),

    /// CLI reported an error on the message stream
    #[error("Claude CLI error: {message}")]
    CliError {
        /// Error message from CLI
        message: String,
        /// Error code if available
        code: Option<String>,
    },

    /// Channel receive error
    #[error("Channel closed unexpectedly")]
    ChannelClosed,

    /// Invalid state transition
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the invalid state
        message: String,
    },

    /// Feature not supported
    #[error("Feature not supported: {feature}")]
    NotSupported {
        /// Description of unsupported feature
        feature: String,
    },
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, SdkError>;

fn format_stderr(stderr: &Option<String>) -> String {
    match stderr {
        Some(text) if !text.is_empty() => format!("\nstderr:\n{text}"),
        _ => String::new(),
    }
}

impl SdkError {
    /// Create a new MessageParseError
    pub fn parse_error(error: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MessageParseError {
            error: error.into(),
            raw: raw.into(),
        }
    }

    /// Create a new Timeout error
    pub fn timeout(seconds: u64) -> Self {
        Self::Timeout { seconds }
    }

    /// Create a new CliError
    pub fn cli_error(message: impl Into<String>, code: Option<String>) -> Self {
        Self::CliError {
            message: message.into(),
            code,
        }
    }

    /// Create a new InvalidState error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Write error for a stdin that has already been closed
    pub(crate) fn stdin_closed() -> Self {
        Self::Write(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "stdin is closed",
        ))
    }

    /// Whether the error happened before any subprocess existed
    pub fn is_start_error(&self) -> bool {
        matches!(self, Self::CliNotFound { .. } | Self::ProcessStart { .. })
    }

    /// Check if the error is a configuration issue
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::CliNotFound { .. }
                | Self::ConfigError(_)
                | Self::Settings(_)
                | Self::NotSupported { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SdkError::CliNotFound {
            searched_paths: "/usr/local/bin\n/usr/bin".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("npm install -g @anthropic-ai/claude-code"));
        assert!(msg.contains("/usr/local/bin"));
    }

    #[test]
    fn test_is_start_error() {
        let spawn = SdkError::ProcessStart {
            path: "/nope/claude".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(spawn.is_start_error());
        assert!(!SdkError::NotConnected.is_start_error());
    }

    #[test]
    fn test_is_config_error() {
        assert!(SdkError::ConfigError("test".into()).is_config_error());
        assert!(
            SdkError::CliNotFound {
                searched_paths: "test".into()
            }
            .is_config_error()
        );
        assert!(!SdkError::timeout(30).is_config_error());
    }

    #[test]
    fn test_decode_error_keeps_raw_bytes() {
        let raw = Bytes::from_static(br#"{"invalid": json"#);
        let source = serde_json::from_slice::<serde_json::Value>(&raw).unwrap_err();

        let error = SdkError::Decode {
            raw: raw.clone(),
            source,
        };

        let error_str = error.to_string();
        assert!(error_str.contains("Failed to decode JSON from CLI output"));
        assert!(error_str.contains(r#"{"invalid": json"#));
    }

    #[test]
    fn test_process_exited_display_includes_stderr() {
        let err = SdkError::ProcessExited {
            code: Some(2),
            stderr: Some("boom".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("Some(2)"));
        assert!(msg.contains("boom"));

        let quiet = SdkError::ProcessExited {
            code: Some(1),
            stderr: None,
        };
        assert!(!quiet.to_string().contains("stderr"));
    }
}
