//! Layered configuration
//!
//! Settings are read from built-in defaults, then `config/{RUN_MODE}` and
//! `config/local` (both optional, any format the `config` crate knows), then
//! environment variables prefixed with `CLAUDE_CODE` using `__` as the path
//! separator, e.g. `CLAUDE_CODE_SESSIONS__MAX_SESSIONS=10`.

use crate::{errors::Result, session::SessionConfig, types::ClaudeCodeOptions};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process-level settings that are not part of the CLI flags
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CliSettings {
    /// Explicit CLI binary
    pub path: Option<PathBuf>,
    /// Entrypoint tag reported to the CLI
    pub entrypoint: Option<String>,
    /// Capacity of the message channels
    pub channel_buffer_size: usize,
    /// Grace period for `disconnect`, in milliseconds
    pub disconnect_timeout_ms: u64,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            path: None,
            entrypoint: None,
            channel_buffer_size: 100,
            disconnect_timeout_ms: 2000,
        }
    }
}

/// Full client configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Subprocess settings
    pub cli: CliSettings,
    /// CLI options (model, tools, prompts, ...)
    pub options: ClaudeCodeOptions,
    /// Session registry limits
    pub sessions: SessionConfig,
}

impl Settings {
    /// Load defaults, config files and environment
    pub fn new() -> Result<Self> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let settings = Self::builder()?
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("CLAUDE_CODE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load defaults and one explicit file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = Self::builder()?
            .add_source(File::from(path.as_ref()).required(true))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let defaults = CliSettings::default();
        let sessions = SessionConfig::default();

        Ok(Config::builder()
            .set_default("cli.channel_buffer_size", defaults.channel_buffer_size as i64)?
            .set_default(
                "cli.disconnect_timeout_ms",
                defaults.disconnect_timeout_ms as i64,
            )?
            .set_default("sessions.max_sessions", sessions.max_sessions as i64)?
            .set_default("sessions.timeout_secs", sessions.timeout_secs as i64)?
            .set_default(
                "sessions.cleanup_interval_secs",
                sessions.cleanup_interval_secs as i64,
            )?)
    }

    /// Options for a transport or client, with the process settings applied
    pub fn to_options(&self) -> ClaudeCodeOptions {
        let mut options = self.options.clone();
        if self.cli.path.is_some() {
            options.cli_path = self.cli.path.clone();
        }
        if self.cli.entrypoint.is_some() {
            options.entrypoint = self.cli.entrypoint.clone();
        }
        options.channel_buffer_size = Some(self.cli.channel_buffer_size);
        options.disconnect_timeout = Some(Duration::from_millis(self.cli.disconnect_timeout_ms));
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PermissionMode;
    use std::io::Write;

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[cli]
entrypoint = "nightly-batch"
disconnect_timeout_ms = 500

[options]
model = "claude-sonnet-4-5"
allowed_tools = ["Read", "Grep"]
permission_mode = "acceptEdits"
max_turns = 2

[sessions]
max_sessions = 3
"#
        )
        .unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.sessions.max_sessions, 3);
        assert_eq!(settings.sessions.timeout_secs, 3600);
        assert_eq!(settings.cli.channel_buffer_size, 100);

        let options = settings.to_options();
        assert_eq!(options.model.as_deref(), Some("claude-sonnet-4-5"));
        assert_eq!(options.allowed_tools, vec!["Read", "Grep"]);
        assert_eq!(options.permission_mode, Some(PermissionMode::AcceptEdits));
        assert_eq!(options.max_turns, Some(2));
        assert_eq!(options.entrypoint.as_deref(), Some("nightly-batch"));
        assert_eq!(options.disconnect_timeout, Some(Duration::from_millis(500)));
        assert!(options.system_prompt.is_none());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Settings::from_file("/nonexistent/claude-client.toml").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_defaults() {
        let options = Settings::default().to_options();
        assert_eq!(options.channel_buffer_size, Some(100));
        assert_eq!(options.disconnect_timeout, Some(Duration::from_secs(2)));
        assert!(options.cli_path.is_none());
        assert!(options.model.is_none());
    }
}
