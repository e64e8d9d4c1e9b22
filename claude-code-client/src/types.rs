//! Type definitions for the Claude Code client
//!
//! This module contains the public data model: configuration options for the
//! CLI subprocess, the decoded message variants and their content blocks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

/// Session id used when the caller does not name one
pub const DEFAULT_SESSION_ID: &str = "default";

/// Entrypoint tag passed to the CLI when the options do not override it
pub const DEFAULT_ENTRYPOINT: &str = "sdk-rust";

/// Permission mode for tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    /// Default mode - CLI prompts for dangerous tools
    #[default]
    Default,
    /// Auto-accept file edits
    AcceptEdits,
    /// Plan mode - for planning tasks
    Plan,
    /// Allow all tools without prompting (use with caution)
    BypassPermissions,
}

impl PermissionMode {
    /// Value passed to `--permission-mode`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
            Self::BypassPermissions => "bypassPermissions",
        }
    }
}

impl std::str::FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "acceptEdits" => Ok(Self::AcceptEdits),
            "plan" => Ok(Self::Plan),
            "bypassPermissions" => Ok(Self::BypassPermissions),
            other => Err(format!("unknown permission mode: {other}")),
        }
    }
}

/// MCP (Model Context Protocol) server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpServerConfig {
    /// Standard I/O based MCP server
    Stdio {
        /// Command to execute
        command: String,
        /// Command arguments
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Vec<String>>,
        /// Environment variables
        #[serde(default, skip_serializing_if = "Option::is_none")]
        env: Option<HashMap<String, String>>,
    },
    /// Server-Sent Events based MCP server
    Sse {
        /// Server URL
        url: String,
        /// HTTP headers
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },
    /// HTTP-based MCP server
    Http {
        /// Server URL
        url: String,
        /// HTTP headers
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<HashMap<String, String>>,
    },
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Configuration options for the CLI subprocess
///
/// Every field is optional. Unset fields are skipped when the options are
/// serialized and never turn into a command-line flag, so the CLI only sees
/// what the caller asked for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaudeCodeOptions {
    /// System prompt replacing the CLI default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Text appended to the system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub append_system_prompt: Option<String>,
    /// Tools whose invocations are auto-approved
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    /// Tools that are disabled entirely
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub disallowed_tools: Vec<String>,
    /// Permission mode for tool execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<PermissionMode>,
    /// Custom permission prompt tool name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission_prompt_tool_name: Option<String>,
    /// MCP server configurations keyed by server name
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub mcp_servers: HashMap<String, McpServerConfig>,
    /// Maximum number of conversation turns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    /// Extended thinking budget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_thinking_tokens: Option<u32>,
    /// Model to use
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Model used when the primary one is unavailable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_model: Option<String>,
    /// Working directory of the subprocess
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Additional directories the CLI may access
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub add_dirs: Vec<PathBuf>,
    /// Continue the most recent conversation
    #[serde(skip_serializing_if = "is_false")]
    pub continue_conversation: bool,
    /// Resume a specific conversation by id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resume: Option<String>,
    /// Branch a new session when resuming
    #[serde(skip_serializing_if = "is_false")]
    pub fork_session: bool,
    /// Stream partial assistant messages
    #[serde(skip_serializing_if = "is_false")]
    pub include_partial_messages: bool,
    /// Environment variables for the subprocess
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// Extra CLI flags; a missing `--` prefix is added
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_args: BTreeMap<String, Option<String>>,

    /// Explicit path to the CLI binary, skipping discovery
    #[serde(skip)]
    pub cli_path: Option<PathBuf>,
    /// Capacity of the internal message channels (default: 100)
    #[serde(skip)]
    pub channel_buffer_size: Option<usize>,
    /// How long `disconnect` waits for a clean exit before escalating
    #[serde(skip)]
    pub disconnect_timeout: Option<Duration>,
    /// Value of `CLAUDE_CODE_ENTRYPOINT` for the subprocess
    #[serde(skip)]
    pub entrypoint: Option<String>,
}

impl ClaudeCodeOptions {
    /// Create a new options builder
    pub fn builder() -> ClaudeCodeOptionsBuilder {
        ClaudeCodeOptionsBuilder::default()
    }
}

/// Builder for ClaudeCodeOptions
#[derive(Debug, Default)]
pub struct ClaudeCodeOptionsBuilder {
    options: ClaudeCodeOptions,
}

impl ClaudeCodeOptionsBuilder {
    /// Set system prompt
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.system_prompt = Some(prompt.into());
        self
    }

    /// Set append system prompt
    pub fn append_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.options.append_system_prompt = Some(prompt.into());
        self
    }

    /// Set allowed tools (auto-approval permissions only)
    pub fn allowed_tools(mut self, tools: Vec<String>) -> Self {
        self.options.allowed_tools = tools;
        self
    }

    /// Add a single allowed tool
    pub fn allow_tool(mut self, tool: impl Into<String>) -> Self {
        self.options.allowed_tools.push(tool.into());
        self
    }

    /// Set disallowed tools
    pub fn disallowed_tools(mut self, tools: Vec<String>) -> Self {
        self.options.disallowed_tools = tools;
        self
    }

    /// Add a single disallowed tool
    pub fn disallow_tool(mut self, tool: impl Into<String>) -> Self {
        self.options.disallowed_tools.push(tool.into());
        self
    }

    /// Set permission mode
    pub fn permission_mode(mut self, mode: PermissionMode) -> Self {
        self.options.permission_mode = Some(mode);
        self
    }

    /// Set permission prompt tool name
    pub fn permission_prompt_tool_name(mut self, name: impl Into<String>) -> Self {
        self.options.permission_prompt_tool_name = Some(name.into());
        self
    }

    /// Add MCP server
    pub fn add_mcp_server(mut self, name: impl Into<String>, config: McpServerConfig) -> Self {
        self.options.mcp_servers.insert(name.into(), config);
        self
    }

    /// Set all MCP servers
    pub fn mcp_servers(mut self, servers: HashMap<String, McpServerConfig>) -> Self {
        self.options.mcp_servers = servers;
        self
    }

    /// Set max turns
    pub fn max_turns(mut self, turns: u32) -> Self {
        self.options.max_turns = Some(turns);
        self
    }

    /// Set max thinking tokens
    pub fn max_thinking_tokens(mut self, tokens: u32) -> Self {
        self.options.max_thinking_tokens = Some(tokens);
        self
    }

    /// Set model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = Some(model.into());
        self
    }

    /// Set fallback model
    pub fn fallback_model(mut self, model: impl Into<String>) -> Self {
        self.options.fallback_model = Some(model.into());
        self
    }

    /// Set working directory
    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(path.into());
        self
    }

    /// Add an additional directory
    pub fn add_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.add_dirs.push(dir.into());
        self
    }

    /// Set additional directories
    pub fn add_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.options.add_dirs = dirs;
        self
    }

    /// Enable continue conversation
    pub fn continue_conversation(mut self, enable: bool) -> Self {
        self.options.continue_conversation = enable;
        self
    }

    /// Set resume conversation ID
    pub fn resume(mut self, id: impl Into<String>) -> Self {
        self.options.resume = Some(id.into());
        self
    }

    /// Fork the session when resuming
    pub fn fork_session(mut self, fork: bool) -> Self {
        self.options.fork_session = fork;
        self
    }

    /// Include partial assistant messages in the output stream
    pub fn include_partial_messages(mut self, include: bool) -> Self {
        self.options.include_partial_messages = include;
        self
    }

    /// Add an environment variable for the subprocess
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.env.insert(key.into(), value.into());
        self
    }

    /// Add a single extra CLI argument
    pub fn add_extra_arg(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.options.extra_args.insert(key.into(), value);
        self
    }

    /// Use an explicit CLI binary
    pub fn cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.cli_path = Some(path.into());
        self
    }

    /// Set the capacity of the internal channels
    pub fn channel_buffer_size(mut self, size: usize) -> Self {
        self.options.channel_buffer_size = Some(size);
        self
    }

    /// Set the grace period `disconnect` gives the subprocess
    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.options.disconnect_timeout = Some(timeout);
        self
    }

    /// Set the entrypoint tag reported to the CLI
    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.options.entrypoint = Some(entrypoint.into());
        self
    }

    /// Build the options
    pub fn build(self) -> ClaudeCodeOptions {
        self.options
    }
}

/// A decoded message from the CLI output stream
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Message {
    /// User message (echoed input or tool results)
    User(UserMessage),
    /// Assistant message
    Assistant(AssistantMessage),
    /// Out-of-band signal: errors, init, permission events
    System(SystemMessage),
    /// End of a turn
    Result(ResultMessage),
}

impl Message {
    /// Whether this message ends a turn
    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// The system message if this is a `System` variant with subtype `error`
    pub fn as_error(&self) -> Option<&SystemMessage> {
        match self {
            Self::System(system) if system.is_error() => Some(system),
            _ => None,
        }
    }
}

/// User message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserMessage {
    /// Caller-supplied payload (string or structured value)
    pub content: Value,
}

/// Assistant message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    /// Content blocks in emission order
    pub content: Vec<ContentBlock>,
}

impl AssistantMessage {
    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// System message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemMessage {
    /// Open-ended subtype (`error`, `init`, ...)
    pub subtype: String,
    /// Additional data
    pub data: Map<String, Value>,
}

impl SystemMessage {
    /// Whether this signals an error
    pub fn is_error(&self) -> bool {
        self.subtype == "error"
    }
}

/// Result message indicating end of turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultMessage {
    /// Result subtype
    pub subtype: String,
    /// Duration in milliseconds
    pub duration_ms: i64,
    /// API duration in milliseconds
    pub duration_api_ms: i64,
    /// Whether an error occurred
    pub is_error: bool,
    /// Number of turns
    pub num_turns: i32,
    /// Session ID
    pub session_id: String,
    /// Total cost in USD
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost_usd: Option<f64>,
    /// Usage statistics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Map<String, Value>>,
    /// Final result text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Structured output (when a JSON schema output format is in use)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<Value>,
}

/// Content block types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Text content
    Text(TextContent),
    /// Tool use request
    ToolUse(ToolUseContent),
    /// Tool result
    ToolResult(ToolResultContent),
}

/// Text content block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextContent {
    /// Text content
    pub text: String,
}

/// Tool use content block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseContent {
    /// Tool use ID
    pub id: String,
    /// Tool name
    pub name: String,
    /// Tool input parameters
    pub input: Map<String, Value>,
}

/// Tool result content block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultContent {
    /// Tool use ID this result corresponds to
    pub tool_use_id: String,
    /// Result content
    pub content: Value,
    /// Whether this is an error result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_permission_mode_serialization() {
        let mode = PermissionMode::AcceptEdits;
        let json = serde_json::to_string(&mode).unwrap();
        assert_eq!(json, r#""acceptEdits""#);

        let parsed: PermissionMode = "bypassPermissions".parse().unwrap();
        assert_eq!(parsed, PermissionMode::BypassPermissions);
        assert!("yolo".parse::<PermissionMode>().is_err());
    }

    #[test]
    fn test_unset_options_are_not_serialized() {
        let options = ClaudeCodeOptions::builder()
            .model("claude-sonnet-4-5")
            .system_prompt("be brief")
            .cli_path("/opt/claude")
            .build();

        let value = serde_json::to_value(&options).unwrap();
        assert_eq!(
            value,
            json!({"system_prompt": "be brief", "model": "claude-sonnet-4-5"})
        );
    }

    #[test]
    fn test_options_round_trip_through_json() {
        let options = ClaudeCodeOptions::builder()
            .allow_tool("Read")
            .permission_mode(PermissionMode::Plan)
            .max_turns(3)
            .add_mcp_server(
                "files",
                McpServerConfig::Stdio {
                    command: "mcp-files".into(),
                    args: Some(vec!["--root".into(), "/tmp".into()]),
                    env: None,
                },
            )
            .build();

        let json = serde_json::to_string(&options).unwrap();
        let back: ClaudeCodeOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
        assert!(json.contains(r#""type":"stdio""#));
        assert!(!json.contains("\"env\""));
    }

    #[test]
    fn test_builder_accumulates() {
        let options = ClaudeCodeOptions::builder()
            .allow_tool("Read")
            .allow_tool("Edit")
            .disallow_tool("Bash")
            .add_dir("/a")
            .add_dir("/b")
            .env("ANTHROPIC_API_KEY", "sk-test")
            .build();

        assert_eq!(options.allowed_tools, vec!["Read", "Edit"]);
        assert_eq!(options.disallowed_tools, vec!["Bash"]);
        assert_eq!(options.add_dirs.len(), 2);
        assert_eq!(options.env.get("ANTHROPIC_API_KEY").unwrap(), "sk-test");
    }

    #[test]
    fn test_assistant_text_concatenates_text_blocks() {
        let message = AssistantMessage {
            content: vec![
                ContentBlock::Text(TextContent { text: "2 + 2 ".into() }),
                ContentBlock::ToolUse(ToolUseContent {
                    id: "t1".into(),
                    name: "calc".into(),
                    input: Map::new(),
                }),
                ContentBlock::Text(TextContent { text: "= 4".into() }),
            ],
        };
        assert_eq!(message.text(), "2 + 2 = 4");
    }

    #[test]
    fn test_message_as_error() {
        let error = Message::System(SystemMessage {
            subtype: "error".into(),
            data: Map::new(),
        });
        let init = Message::System(SystemMessage {
            subtype: "init".into(),
            data: Map::new(),
        });
        assert!(error.as_error().is_some());
        assert!(init.as_error().is_none());
        assert!(!init.is_result());
    }
}
