//! Subprocess-based transport implementation
//!
//! This module implements the Transport trait using a subprocess to run the
//! Claude CLI. Three background tasks run per connection:
//!
//! - a supervisor that owns the `Child`, waits for it and publishes the exit
//!   status on a watch channel,
//! - a stdout reader that splits output into lines and forwards them as raw
//!   bytes,
//! - a stderr drainer that logs the CLI's diagnostics and keeps the last lines
//!   for error reports.

use super::{RequestFrame, Transport, TransportMode, TransportState, interrupt_request};
use crate::{
    errors::{Result, SdkError},
    types::{ClaudeCodeOptions, DEFAULT_ENTRYPOINT},
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use serde_json::{Map, Value, json};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Default buffer size for channels
pub const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Time the CLI gets to exit on its own after stdin is closed
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Time the CLI gets after SIGTERM before it is killed
const TERMINATE_GRACE: Duration = Duration::from_millis(500);

/// How long `disconnect` waits for the background tasks to finish
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Number of stderr lines kept for error reports
const STDERR_TAIL_LINES: usize = 20;

/// Exit status published by the supervisor task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    /// Whether the process exited with status zero
    pub success: bool,
}

type StderrTail = Arc<SyncMutex<VecDeque<String>>>;

/// Subprocess-based transport for Claude CLI
pub struct SubprocessTransport {
    /// Configuration options
    options: ClaudeCodeOptions,
    /// Launch mode
    mode: TransportMode,
    /// CLI binary path, resolved on connect unless set explicitly
    cli_path: Option<PathBuf>,
    /// Transport state
    state: TransportState,
    /// Child stdin; `None` once closed
    stdin: Mutex<Option<ChildStdin>>,
    /// Raw output lines, handed out once
    message_rx: Option<mpsc::Receiver<Result<Bytes>>>,
    /// Control frames, handed out once
    control_rx: Option<mpsc::Receiver<Value>>,
    /// Child process id
    pid: Option<u32>,
    /// Asks the supervisor to kill the child; dropping it does the same
    kill_tx: Option<oneshot::Sender<()>>,
    /// Exit status, `None` while running
    exit_rx: Option<watch::Receiver<Option<ExitInfo>>>,
    /// Set once `disconnect` starts so the exit is not reported as a failure
    shutting_down: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    stderr_task: Option<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl SubprocessTransport {
    /// Create a new subprocess transport. The CLI is located on `connect`.
    pub fn new(options: ClaudeCodeOptions, mode: TransportMode) -> Self {
        let cli_path = options.cli_path.clone();
        Self {
            options,
            mode,
            cli_path,
            state: TransportState::Disconnected,
            stdin: Mutex::new(None),
            message_rx: None,
            control_rx: None,
            pid: None,
            kill_tx: None,
            exit_rx: None,
            shutting_down: Arc::new(AtomicBool::new(false)),
            reader: None,
            stderr_task: None,
            supervisor: None,
        }
    }

    /// Create with a specific CLI path
    pub fn with_cli_path(
        options: ClaudeCodeOptions,
        mode: TransportMode,
        cli_path: impl Into<PathBuf>,
    ) -> Self {
        let mut transport = Self::new(options, mode);
        transport.cli_path = Some(cli_path.into());
        transport
    }

    /// Process id of the running CLI
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status of the CLI, once it has exited
    pub fn exit_info(&self) -> Option<ExitInfo> {
        self.exit_rx.as_ref().and_then(|rx| *rx.borrow())
    }

    fn resolve_cli_path(&self) -> Result<PathBuf> {
        match &self.cli_path {
            Some(path) if path.exists() => Ok(path.clone()),
            Some(path) => Err(SdkError::CliNotFound {
                searched_paths: path.display().to_string(),
            }),
            None => find_claude_cli(),
        }
    }

    /// Build the command with all necessary arguments
    fn build_command(&self, cli_path: &Path) -> Command {
        let mut cmd = Command::new(cli_path);
        cmd.args(build_args(&self.options, self.mode));

        if let Some(ref cwd) = self.options.cwd {
            cmd.current_dir(cwd);
        }

        cmd.envs(build_env(&self.options));

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(
            "Executing Claude CLI command: {} {:?}",
            cli_path.display(),
            cmd.as_std().get_args().collect::<Vec<_>>()
        );

        cmd
    }

    /// Spawn the process and set up communication channels
    async fn spawn_process(&mut self) -> Result<()> {
        self.state = TransportState::Connecting;

        let cli_path = self.resolve_cli_path().inspect_err(|_| {
            self.state = TransportState::Disconnected;
        })?;
        let mut cmd = self.build_command(&cli_path);

        let mut child = cmd.spawn().map_err(|source| {
            error!("Failed to spawn Claude CLI: {}", source);
            self.state = TransportState::Disconnected;
            SdkError::ProcessStart {
                path: cli_path.display().to_string(),
                source,
            }
        })?;

        let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
        let (Some(stdin), Some(stdout), Some(stderr)) = pipes else {
            let _ = child.start_kill();
            self.state = TransportState::Disconnected;
            return Err(SdkError::ProcessStart {
                path: cli_path.display().to_string(),
                source: std::io::Error::other("stdio pipes were not captured"),
            });
        };

        self.pid = child.id();
        self.shutting_down.store(false, Ordering::SeqCst);

        let buffer_size = self
            .options
            .channel_buffer_size
            .unwrap_or(DEFAULT_CHANNEL_BUFFER_SIZE)
            .max(1);
        let (message_tx, message_rx) = mpsc::channel(buffer_size);
        let (control_tx, control_rx) = mpsc::channel(buffer_size);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let (exit_tx, exit_rx) = watch::channel(None);
        let tail: StderrTail = Arc::new(SyncMutex::new(VecDeque::new()));

        let supervisor = tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    if let Err(e) = child.start_kill() {
                        warn!("Failed to kill Claude CLI process: {}", e);
                    }
                    child.wait().await
                },
            };
            let info = match status {
                Ok(status) => ExitInfo {
                    code: status.code(),
                    success: status.success(),
                },
                Err(e) => {
                    warn!("Failed to collect Claude CLI exit status: {}", e);
                    ExitInfo {
                        code: None,
                        success: false,
                    }
                },
            };
            debug!("Claude CLI exited: {:?}", info);
            let _ = exit_tx.send(Some(info));
        });

        let exit_grace = self
            .options
            .disconnect_timeout
            .unwrap_or(DEFAULT_DISCONNECT_TIMEOUT);
        let reader = tokio::spawn(read_stdout(
            stdout,
            message_tx,
            control_tx,
            exit_rx.clone(),
            exit_grace,
            self.shutting_down.clone(),
            tail.clone(),
        ));
        let stderr_task = tokio::spawn(drain_stderr(stderr, tail));

        *self.stdin.lock().await = Some(stdin);
        self.message_rx = Some(message_rx);
        self.control_rx = Some(control_rx);
        self.kill_tx = Some(kill_tx);
        self.exit_rx = Some(exit_rx);
        self.supervisor = Some(supervisor);
        self.reader = Some(reader);
        self.stderr_task = Some(stderr_task);
        self.state = TransportState::Connected;

        Ok(())
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or_else(SdkError::stdin_closed)?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(SdkError::Write)?;
        stdin.write_all(b"\n").await.map_err(SdkError::Write)?;
        stdin.flush().await.map_err(SdkError::Write)?;
        debug!("Sent to Claude process: {}", line);
        Ok(())
    }

    fn has_exited(&self) -> bool {
        self.exit_info().is_some()
    }

    #[cfg(unix)]
    fn signal(&self, signal: libc::c_int) -> Result<()> {
        let Some(pid) = self.pid else {
            return Err(SdkError::NotConnected);
        };
        // The supervisor reaps the child; after that the pid may be reused
        if self.has_exited() {
            return Ok(());
        }
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| SdkError::invalid_state(format!("pid {pid} out of range")))?;
        let rc = unsafe { libc::kill(pid, signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(SdkError::Write(std::io::Error::last_os_error()))
        }
    }

    async fn wait_for_exit(&mut self) {
        let Some(exit_rx) = self.exit_rx.as_mut() else {
            return;
        };
        let grace = self
            .options
            .disconnect_timeout
            .unwrap_or(DEFAULT_DISCONNECT_TIMEOUT);

        if tokio::time::timeout(grace, wait_exit(exit_rx)).await.is_ok() {
            return;
        }

        #[cfg(unix)]
        {
            warn!(
                "Claude CLI did not exit within {:?}, sending SIGTERM",
                grace
            );
            if let Err(e) = self.signal(libc::SIGTERM) {
                debug!("SIGTERM delivery failed: {}", e);
            }
            if let Some(exit_rx) = self.exit_rx.as_mut()
                && tokio::time::timeout(TERMINATE_GRACE, wait_exit(exit_rx))
                    .await
                    .is_ok()
            {
                return;
            }
        }

        warn!("Killing Claude CLI process");
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        if let Some(exit_rx) = self.exit_rx.as_mut() {
            wait_exit(exit_rx).await;
        }
    }
}

#[async_trait]
impl Transport for SubprocessTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.state == TransportState::Connected {
            return Ok(());
        }

        self.spawn_process().await?;
        info!("Connected to Claude CLI (pid {:?}, {:?})", self.pid, self.mode);
        Ok(())
    }

    async fn send_request(
        &mut self,
        frames: Vec<RequestFrame>,
        params: Option<Map<String, Value>>,
    ) -> Result<()> {
        if self.state != TransportState::Connected {
            return Err(SdkError::NotConnected);
        }

        for frame in &frames {
            let line = frame.encode(params.as_ref())?;
            self.write_line(&line).await?;
        }
        Ok(())
    }

    async fn close_stdin(&mut self) -> Result<()> {
        if self.stdin.lock().await.take().is_some() {
            debug!("Closed Claude CLI stdin");
        }
        Ok(())
    }

    async fn interrupt(&mut self) -> Result<()> {
        if self.state != TransportState::Connected {
            return Err(SdkError::NotConnected);
        }

        let stdin_open = self.stdin.lock().await.is_some();
        if stdin_open {
            let request_id = uuid::Uuid::new_v4().to_string();
            let frame = interrupt_request(&request_id);
            debug!("Sending interrupt control request {}", request_id);
            return self.write_line(&frame.to_string()).await;
        }

        #[cfg(unix)]
        {
            debug!("Stdin closed, sending SIGINT to Claude CLI");
            self.signal(libc::SIGINT)
        }
        #[cfg(not(unix))]
        {
            Err(SdkError::NotSupported {
                feature: "interrupt after stdin is closed".into(),
            })
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.state == TransportState::Disconnected && self.supervisor.is_none() {
            return Ok(());
        }

        self.state = TransportState::Disconnecting;
        self.shutting_down.store(true, Ordering::SeqCst);

        self.stdin.lock().await.take();
        self.wait_for_exit().await;
        self.kill_tx.take();

        if let Some(supervisor) = self.supervisor.take() {
            let _ = supervisor.await;
        }
        for (name, task) in [
            ("stdout reader", self.reader.take()),
            ("stderr drainer", self.stderr_task.take()),
        ] {
            let Some(mut task) = task else { continue };
            if tokio::time::timeout(TASK_JOIN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                debug!("Aborting {} task", name);
                task.abort();
            }
        }

        self.message_rx = None;
        self.control_rx = None;
        self.state = TransportState::Disconnected;
        info!("Disconnected from Claude CLI");
        Ok(())
    }

    fn receive_messages(&mut self) -> Option<mpsc::Receiver<Result<Bytes>>> {
        self.message_rx.take()
    }

    fn take_control_receiver(&mut self) -> Option<mpsc::Receiver<Value>> {
        self.control_rx.take()
    }

    fn is_connected(&self) -> bool {
        self.state == TransportState::Connected
    }
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            let _ = kill_tx.send(());
        }
    }
}

async fn wait_exit(exit_rx: &mut watch::Receiver<Option<ExitInfo>>) -> Option<ExitInfo> {
    match exit_rx.wait_for(Option::is_some).await {
        Ok(info) => *info,
        Err(_) => None,
    }
}

fn trim_line(buf: &[u8]) -> &[u8] {
    let end = buf
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    let start = buf[..end]
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(end);
    &buf[start..end]
}

async fn read_stdout(
    stdout: ChildStdout,
    message_tx: mpsc::Sender<Result<Bytes>>,
    control_tx: mpsc::Sender<Value>,
    mut exit_rx: watch::Receiver<Option<ExitInfo>>,
    exit_grace: Duration,
    shutting_down: Arc<AtomicBool>,
    tail: StderrTail,
) {
    debug!("Stdout reader started");
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::with_capacity(4096);
    let mut receiver_gone = false;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = trim_line(&buf);
                if line.is_empty() || receiver_gone {
                    continue;
                }

                // Cheap prefilter before parsing for control frames
                if line.windows(9).any(|w| w == b"\"control_")
                    && let Ok(value) = serde_json::from_slice::<Value>(line)
                    && super::is_control_frame(&value)
                {
                    debug!("Received control frame: {}", value);
                    if let Err(e) = control_tx.try_send(value) {
                        warn!("Dropping control frame: {}", e);
                    }
                    continue;
                }

                if message_tx
                    .send(Ok(Bytes::copy_from_slice(line)))
                    .await
                    .is_err()
                {
                    debug!("Message receiver dropped, discarding remaining output");
                    receiver_gone = true;
                }
            },
            Err(e) => {
                warn!("Failed to read Claude CLI stdout: {}", e);
                let _ = message_tx.send(Err(SdkError::Read(e))).await;
                return;
            },
        }
    }

    debug!("Claude CLI stdout closed");
    // The channel closes after at most `exit_grace`, even if the CLI lingers
    let Ok(exit) = tokio::time::timeout(exit_grace, wait_exit(&mut exit_rx)).await else {
        warn!(
            "Claude CLI closed stdout but did not exit within {:?}",
            exit_grace
        );
        info!("Stdout reader ended");
        return;
    };
    if let Some(info) = exit
        && !info.success
        && !shutting_down.load(Ordering::SeqCst)
    {
        let stderr = {
            let tail = tail.lock();
            (!tail.is_empty()).then(|| tail.iter().cloned().collect::<Vec<_>>().join("\n"))
        };
        warn!("Claude CLI exited with code {:?}", info.code);
        let _ = message_tx
            .send(Err(SdkError::ProcessExited {
                code: info.code,
                stderr,
            }))
            .await;
    }
    info!("Stdout reader ended");
}

async fn drain_stderr(stderr: ChildStderr, tail: StderrTail) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        debug!("Claude CLI stderr: {}", line);
        let mut buffered = tail.lock();
        if buffered.len() == STDERR_TAIL_LINES {
            buffered.pop_front();
        }
        buffered.push_back(line);
    }
}

/// Build the CLI argument list. Unset options produce no flag.
pub fn build_args(options: &ClaudeCodeOptions, mode: TransportMode) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--output-format".into(),
        "stream-json".into(),
        "--verbose".into(),
    ];

    match mode {
        TransportMode::Interactive => {
            args.push("--input-format".into());
            args.push("stream-json".into());
        },
        TransportMode::OneShot => args.push("--print".into()),
    }

    let mut flag = |name: &str, value: Option<String>| {
        args.push(name.to_string());
        if let Some(value) = value {
            args.push(value);
        }
    };

    if let Some(ref prompt) = options.system_prompt {
        flag("--system-prompt", Some(prompt.clone()));
    }
    if let Some(ref prompt) = options.append_system_prompt {
        flag("--append-system-prompt", Some(prompt.clone()));
    }
    if !options.allowed_tools.is_empty() {
        flag("--allowedTools", Some(options.allowed_tools.join(",")));
    }
    if !options.disallowed_tools.is_empty() {
        flag("--disallowedTools", Some(options.disallowed_tools.join(",")));
    }
    if let Some(max_turns) = options.max_turns {
        flag("--max-turns", Some(max_turns.to_string()));
    }
    if let Some(tokens) = options.max_thinking_tokens {
        flag("--max-thinking-tokens", Some(tokens.to_string()));
    }
    if let Some(ref model) = options.model {
        flag("--model", Some(model.clone()));
    }
    if let Some(ref fallback) = options.fallback_model {
        flag("--fallback-model", Some(fallback.clone()));
    }
    if let Some(mode) = options.permission_mode {
        flag("--permission-mode", Some(mode.as_str().to_string()));
    }
    if let Some(ref tool_name) = options.permission_prompt_tool_name {
        flag("--permission-prompt-tool", Some(tool_name.clone()));
    }
    if !options.mcp_servers.is_empty() {
        let config = json!({ "mcpServers": options.mcp_servers });
        flag("--mcp-config", Some(config.to_string()));
    }
    if options.continue_conversation {
        flag("--continue", None);
    }
    if let Some(ref resume_id) = options.resume {
        flag("--resume", Some(resume_id.clone()));
    }
    if options.fork_session {
        flag("--fork-session", None);
    }
    for dir in &options.add_dirs {
        flag("--add-dir", Some(dir.display().to_string()));
    }
    if options.include_partial_messages {
        flag("--include-partial-messages", None);
    }
    for (key, value) in &options.extra_args {
        let name = if key.starts_with('-') {
            key.clone()
        } else {
            format!("--{key}")
        };
        flag(name.as_str(), value.clone());
    }

    args
}

/// Environment for the CLI process. Applied to one `Command`, never to the
/// current process.
pub fn build_env(options: &ClaudeCodeOptions) -> Vec<(String, String)> {
    let entrypoint = options
        .entrypoint
        .clone()
        .unwrap_or_else(|| DEFAULT_ENTRYPOINT.to_string());

    let mut env = vec![
        ("CLAUDE_CODE_ENTRYPOINT".to_string(), entrypoint),
        (
            "CLAUDE_AGENT_SDK_VERSION".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        ),
    ];
    let mut extra: Vec<_> = options
        .env
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    extra.sort();
    env.extend(extra);
    env
}

/// Find the Claude CLI binary
///
/// Search order:
/// 1. System PATH (`claude`, `claude-code`)
/// 2. Common installation locations
pub fn find_claude_cli() -> Result<PathBuf> {
    for cmd_name in &["claude", "claude-code"] {
        if let Ok(path) = which::which(cmd_name) {
            debug!("Found Claude CLI in PATH at: {}", path.display());
            return Ok(path);
        }
    }

    let home = dirs::home_dir().ok_or_else(|| SdkError::CliNotFound {
        searched_paths: "Unable to determine home directory".into(),
    })?;

    let locations = [
        home.join(".npm-global/bin/claude"),
        home.join(".npm-global/bin/claude-code"),
        PathBuf::from("/usr/local/bin/claude"),
        PathBuf::from("/usr/local/bin/claude-code"),
        home.join(".local/bin/claude"),
        home.join(".local/bin/claude-code"),
        home.join("node_modules/.bin/claude"),
        home.join(".yarn/bin/claude"),
        PathBuf::from("/opt/homebrew/bin/claude"),
        home.join(".claude/local/claude"),
    ];

    let mut searched = vec!["PATH (claude, claude-code)".to_string()];
    for path in &locations {
        searched.push(path.display().to_string());
        if path.is_file() {
            debug!("Found Claude CLI at: {}", path.display());
            return Ok(path.clone());
        }
    }

    warn!("Claude CLI not found in any standard location");
    Err(SdkError::CliNotFound {
        searched_paths: searched.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{McpServerConfig, PermissionMode};

    #[test]
    fn test_only_set_options_become_flags() {
        let options = ClaudeCodeOptions::builder()
            .model("claude-sonnet-4-5")
            .system_prompt("You are terse")
            .build();

        let args = build_args(&options, TransportMode::OneShot);
        assert_eq!(
            args,
            vec![
                "--output-format",
                "stream-json",
                "--verbose",
                "--print",
                "--system-prompt",
                "You are terse",
                "--model",
                "claude-sonnet-4-5",
            ]
        );
    }

    #[test]
    fn test_interactive_mode_reads_stream_json() {
        let args = build_args(&ClaudeCodeOptions::default(), TransportMode::Interactive);
        assert_eq!(
            args,
            vec![
                "--output-format",
                "stream-json",
                "--verbose",
                "--input-format",
                "stream-json"
            ]
        );
    }

    #[test]
    fn test_full_option_set() {
        let options = ClaudeCodeOptions::builder()
            .allowed_tools(vec!["Read".into(), "Grep".into()])
            .disallow_tool("Bash")
            .max_turns(4)
            .max_thinking_tokens(2048)
            .permission_mode(PermissionMode::AcceptEdits)
            .continue_conversation(true)
            .resume("session-9")
            .add_dir("/srv/data")
            .add_mcp_server(
                "fs",
                McpServerConfig::Stdio {
                    command: "mcp-fs".into(),
                    args: None,
                    env: None,
                },
            )
            .add_extra_arg("debug", None)
            .add_extra_arg("--settings", Some("s.json".into()))
            .build();

        let args = build_args(&options, TransportMode::Interactive);
        let joined = args.join(" ");
        assert!(joined.contains("--allowedTools Read,Grep"));
        assert!(joined.contains("--disallowedTools Bash"));
        assert!(joined.contains("--max-turns 4"));
        assert!(joined.contains("--max-thinking-tokens 2048"));
        assert!(joined.contains("--permission-mode acceptEdits"));
        assert!(joined.contains("--continue"));
        assert!(joined.contains("--resume session-9"));
        assert!(joined.contains("--add-dir /srv/data"));
        assert!(joined.contains(r#""mcpServers":{"fs":{"#));
        assert!(args.contains(&"--debug".to_string()));
        assert!(joined.contains("--settings s.json"));
        assert!(!args.contains(&"--print".to_string()));
    }

    #[test]
    fn test_entrypoint_is_scoped_to_command_env() {
        let env = build_env(&ClaudeCodeOptions::default());
        assert!(env.contains(&("CLAUDE_CODE_ENTRYPOINT".into(), "sdk-rust".into())));
        assert!(env.iter().any(|(key, _)| key == "CLAUDE_AGENT_SDK_VERSION"));

        let options = ClaudeCodeOptions::builder()
            .entrypoint("my-tool")
            .env("ANTHROPIC_API_KEY", "sk-test")
            .build();
        let env = build_env(&options);
        assert!(env.contains(&("CLAUDE_CODE_ENTRYPOINT".into(), "my-tool".into())));
        assert!(env.contains(&("ANTHROPIC_API_KEY".into(), "sk-test".into())));
        assert!(std::env::var("CLAUDE_CODE_ENTRYPOINT").as_deref() != Ok("my-tool"));
    }

    #[test]
    fn test_trim_line() {
        assert_eq!(trim_line(b"  {\"a\":1}\r\n"), b"{\"a\":1}");
        assert_eq!(trim_line(b"\n"), b"");
        assert_eq!(trim_line(b""), b"");
    }

    #[tokio::test]
    async fn test_transport_lifecycle_without_connect() {
        let mut transport = SubprocessTransport::with_cli_path(
            ClaudeCodeOptions::default(),
            TransportMode::OneShot,
            "/usr/bin/true",
        );

        assert!(!transport.is_connected());
        assert_eq!(transport.state, TransportState::Disconnected);
        assert!(matches!(
            transport.interrupt().await,
            Err(SdkError::NotConnected)
        ));
        assert!(matches!(
            transport
                .send_request(vec![RequestFrame::prompt("hi")], None)
                .await,
            Err(SdkError::NotConnected)
        ));
        assert!(transport.disconnect().await.is_ok());
        assert!(transport.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_explicit_cli_is_not_found() {
        let mut transport = SubprocessTransport::with_cli_path(
            ClaudeCodeOptions::default(),
            TransportMode::OneShot,
            "/nonexistent/bin/claude",
        );

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, SdkError::CliNotFound { .. }));
        assert!(err.is_start_error());
        assert!(!transport.is_connected());
        assert!(transport.pid().is_none());
    }
}
