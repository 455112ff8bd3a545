//! Server session management.
//!
//! Established sessions are keyed by the provider key they were negotiated
//! under and the client nonce, which every session message carries in the
//! [`SESSION_HEADER_NAME`](crate::core::SESSION_HEADER_NAME) header. A
//! session is only found from routes that resolve to the same key set. A
//! request takes its session out of the registry for its whole
//! duration and puts it back once the response is signed, so requests on
//! one session are serialized. A request that fails verification simply
//! never puts the session back.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::core::{SESSION_IDLE_TIMEOUT, SESSION_REGISTRY_CAPACITY};
use crate::crypto::{HmacEngine, Nonce};

/// An established session parked between requests.
#[derive(Debug)]
pub struct ServerSession {
    engine: HmacEngine,
    provider_key: String,
    created_at: Instant,
    last_activity: Instant,
}

impl ServerSession {
    /// Wrap a freshly established engine negotiated under `provider_key`.
    pub fn new(engine: HmacEngine, provider_key: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            engine,
            provider_key: provider_key.into(),
            created_at: now,
            last_activity: now,
        }
    }

    /// The session engine.
    pub fn engine(&self) -> &HmacEngine {
        &self.engine
    }

    /// Key provider entry the session was negotiated under.
    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    /// Mutable access to the session engine.
    pub fn engine_mut(&mut self) -> &mut HmacEngine {
        &mut self.engine
    }

    /// Unwrap the engine.
    pub fn into_engine(self) -> HmacEngine {
        self.engine
    }

    /// Record activity.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since last activity.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Session age.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Shared registry of established sessions.
#[derive(Debug)]
pub struct SessionRegistry {
    idle_timeout: Duration,
    capacity: usize,
    sessions: Mutex<HashMap<(String, String), ServerSession>>,
}

impl SessionRegistry {
    /// Registry with the default idle timeout and capacity.
    pub fn new() -> Self {
        Self::with_limits(SESSION_IDLE_TIMEOUT, SESSION_REGISTRY_CAPACITY)
    }

    /// Registry with explicit limits.
    pub fn with_limits(idle_timeout: Duration, capacity: usize) -> Self {
        Self {
            idle_timeout,
            capacity: capacity.max(1),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Take the session for `nonce` under `provider_key` out of the
    /// registry.
    ///
    /// Returns `None` for unknown, idle-expired or currently in-use
    /// sessions, and for sessions negotiated under another provider key.
    pub fn take(&self, provider_key: &str, nonce: &Nonce) -> Option<ServerSession> {
        let key = (provider_key.to_owned(), nonce.as_str().to_owned());
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let session = sessions.remove(&key)?;
        if session.idle_time() >= self.idle_timeout {
            debug!(age = ?session.age(), "dropping idle hmac session");
            return None;
        }
        Some(session)
    }

    /// Park a session until its next request.
    pub fn put(&self, nonce: &Nonce, session: ServerSession) {
        self.park(nonce, session, true);
    }

    /// Park a newly established session.
    ///
    /// Returns `false`, leaving the registry untouched, when a live session
    /// is already parked under the same provider key and nonce.
    pub fn insert_new(&self, nonce: &Nonce, session: ServerSession) -> bool {
        self.park(nonce, session, false)
    }

    fn park(&self, nonce: &Nonce, mut session: ServerSession, replace: bool) -> bool {
        session.touch();
        let key = (session.provider_key.clone(), nonce.as_str().to_owned());
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());

        let idle_timeout = self.idle_timeout;
        sessions.retain(|_, s| s.idle_time() < idle_timeout);

        if sessions.contains_key(&key) && !replace {
            return false;
        }

        if sessions.len() >= self.capacity && !sessions.contains_key(&key) {
            let stalest = sessions
                .iter()
                .max_by_key(|(_, s)| s.idle_time())
                .map(|(k, _)| k.clone());
            if let Some(key) = stalest {
                debug!("session registry full, evicting least recently used");
                sessions.remove(&key);
            }
        }
        sessions.insert(key, session);
        true
    }

    /// Number of parked sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no session is parked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
