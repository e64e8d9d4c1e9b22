//! Session registry
//!
//! Keeps track of the conversations multiplexed over an interactive client.
//! The registry has a hard cap: creating a session beyond `max_sessions`
//! fails instead of evicting an older one. Idle and closed sessions are
//! removed by [`SessionManager::cleanup_expired`], either on demand or from
//! the background task started by [`SessionManager::spawn_cleanup`].

use crate::errors::{Result, SdkError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Limits of a session registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of open sessions
    pub max_sessions: usize,
    /// Idle time after which a session expires, in seconds
    pub timeout_secs: u64,
    /// Period of the background sweep, in seconds
    pub cleanup_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            timeout_secs: 3600,
            cleanup_interval_secs: 300,
        }
    }
}

impl SessionConfig {
    /// Idle timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Sweep period
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Open for queries
    Active,
    /// Closed, waiting for the sweep
    Closed,
}

/// A registered conversation
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Canonical session id
    pub id: String,
    /// Caller-defined metadata
    pub metadata: HashMap<String, Value>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last time the session was used
    pub last_used: DateTime<Utc>,
    /// Lifecycle state
    pub state: SessionState,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            metadata: HashMap::new(),
            created_at: now,
            last_used: now,
            state: SessionState::Active,
        }
    }

    /// Whether the session is open
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match (now - self.last_used).to_std() {
            Ok(idle) => idle > timeout,
            Err(_) => false,
        }
    }
}

/// Canonical form of a caller-supplied session id.
///
/// A UUID is re-rendered as lowercase hyphenated text; any other string maps
/// to the same name-based UUID every time.
pub fn normalize_session_id(id: &str) -> String {
    match Uuid::parse_str(id.trim()) {
        Ok(uuid) => uuid.hyphenated().to_string(),
        Err(_) => Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes())
            .hyphenated()
            .to_string(),
    }
}

/// Concurrency-safe session registry
pub struct SessionManager {
    config: SessionConfig,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    /// Create an empty registry
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Registry limits
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Register a session, generating an id when none is given.
    ///
    /// Fails with `SessionLimitReached` when `max_sessions` sessions are
    /// active and with `SessionExists` when the id is already active. A
    /// closed session with the same id is replaced.
    pub fn create_session(&self, id: Option<&str>) -> Result<Session> {
        let id = id
            .map(normalize_session_id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut sessions = self.sessions.write();
        if sessions.get(&id).is_some_and(Session::is_active) {
            return Err(SdkError::SessionExists(id));
        }
        let active = sessions.values().filter(|s| s.is_active()).count();
        if active >= self.config.max_sessions {
            return Err(SdkError::SessionLimitReached {
                max: self.config.max_sessions,
            });
        }

        let session = Session::new(id.clone());
        sessions.insert(id, session.clone());
        debug!("Created session {}", session.id);
        Ok(session)
    }

    /// Touch the session, creating it first if it is unknown or closed
    pub fn ensure_session(&self, id: &str) -> Result<Session> {
        match self.touch(id) {
            Ok(session) => Ok(session),
            Err(SdkError::SessionNotFound(_) | SdkError::SessionClosed(_)) => {
                self.create_session(Some(id))
            },
            Err(e) => Err(e),
        }
    }

    /// Look up a session by id
    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.sessions.read().get(&normalize_session_id(id)).cloned()
    }

    /// Snapshot of every registered session
    pub fn list_sessions(&self) -> Vec<Session> {
        self.sessions.read().values().cloned().collect()
    }

    /// Number of open sessions
    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|s| s.is_active())
            .count()
    }

    fn with_active<T>(&self, id: &str, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        let id = normalize_session_id(id);
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| SdkError::SessionNotFound(id.clone()))?;
        if !session.is_active() {
            return Err(SdkError::SessionClosed(id));
        }
        Ok(f(session))
    }

    /// Set one metadata entry and mark the session as used
    pub fn set_metadata(&self, id: &str, key: impl Into<String>, value: Value) -> Result<()> {
        self.with_active(id, |session| {
            session.metadata.insert(key.into(), value);
            session.last_used = Utc::now();
        })
    }

    /// Mark the session as used
    pub fn touch(&self, id: &str) -> Result<Session> {
        self.with_active(id, |session| {
            session.last_used = Utc::now();
            session.clone()
        })
    }

    /// Mark a session as closed
    pub fn close_session(&self, id: &str) -> Result<()> {
        let id = normalize_session_id(id);
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| SdkError::SessionNotFound(id.clone()))?;
        session.state = SessionState::Closed;
        debug!("Closed session {}", id);
        Ok(())
    }

    /// Remove closed sessions and sessions idle longer than the timeout.
    /// Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let timeout = self.config.timeout();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.is_active() && !session.is_expired(now, timeout));
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Removed {} expired sessions", removed);
        }
        removed
    }

    /// Run `cleanup_expired` every `cleanup_interval` until `token` is
    /// cancelled
    pub fn spawn_cleanup(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let period = self.config.cleanup_interval().max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        self.cleanup_expired();
                    },
                }
            }
            debug!("Session cleanup task stopped");
        })
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
