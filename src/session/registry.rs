//! Session registry and rerun execution

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::id::SessionId;
use crate::config::SessionConfig;
use crate::state::StateStore;

/// One user's session: its state plus lifecycle bookkeeping
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    reruns: u64,
    state: StateStore,
}

impl Session {
    fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            last_seen: now,
            reruns: 0,
            state: StateStore::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Number of reruns executed so far
    pub fn reruns(&self) -> u64 {
        self.reruns
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }
}

/// What a single rerun gets to work with
pub struct RerunContext<'a> {
    session_id: &'a SessionId,
    rerun: u64,
    state: &'a mut StateStore,
}

impl RerunContext<'_> {
    pub fn session_id(&self) -> &SessionId {
        self.session_id
    }

    /// 1-based number of this rerun within the session
    pub fn rerun_number(&self) -> u64 {
        self.rerun
    }

    pub fn state(&self) -> &StateStore {
        self.state
    }

    pub fn state_mut(&mut self) -> &mut StateStore {
        self.state
    }
}

/// Shared handle to a session. Reruns through one handle (or its clones)
/// never overlap.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Execute one rerun against this session's state
    pub fn rerun<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut RerunContext<'_>) -> R,
    {
        let mut session = self.inner.lock();
        let session = &mut *session;
        session.reruns += 1;
        session.last_seen = Utc::now();
        tracing::trace!(session = %session.id, rerun = session.reruns, "Rerun started");

        let mut ctx = RerunContext {
            session_id: &session.id,
            rerun: session.reruns,
            state: &mut session.state,
        };
        f(&mut ctx)
    }

    /// Read the session without counting a rerun
    pub fn inspect<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Session) -> R,
    {
        f(&self.inner.lock())
    }

    pub fn reruns(&self) -> u64 {
        self.inner.lock().reruns
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.inner.lock().last_seen
    }
}

/// Owns every live session in the process
#[derive(Debug)]
pub struct SessionRegistry {
    config: SessionConfig,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resume a known session or start a new one.
    ///
    /// An unknown or expired id gets a brand new session with a fresh id;
    /// client-supplied ids are never adopted.
    pub fn connect(&self, id: Option<&SessionId>) -> SessionHandle {
        let mut sessions = self.sessions.lock();
        if let Some(handle) = id.and_then(|id| sessions.get(id)) {
            return handle.clone();
        }

        let id = SessionId::new();
        let handle = SessionHandle {
            id: id.clone(),
            inner: Arc::new(Mutex::new(Session::new(id.clone(), Utc::now()))),
        };
        sessions.insert(id.clone(), handle.clone());
        tracing::info!(session = %id, "Session created");
        handle
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.lock().get(id).cloned()
    }

    /// Drop a session and its state. Returns whether it existed.
    pub fn disconnect(&self, id: &SessionId) -> bool {
        let removed = self.sessions.lock().remove(id).is_some();
        if removed {
            tracing::info!(session = %id, "Session disconnected");
        }
        removed
    }

    /// Drop sessions idle longer than the configured timeout
    pub fn reap_idle(&self) -> Vec<SessionId> {
        self.reap_idle_at(Utc::now())
    }

    /// Drop sessions whose last activity is older than `now - idle_timeout`.
    ///
    /// Sessions in the middle of a rerun are active and never reaped.
    pub fn reap_idle_at(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let timeout = match chrono::Duration::from_std(self.config.idle_timeout) {
            Ok(timeout) => timeout,
            Err(_) => return Vec::new(),
        };

        let mut sessions = self.sessions.lock();
        let idle: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, handle)| match handle.inner.try_lock() {
                Some(session) => now - session.last_seen >= timeout,
                None => false,
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &idle {
            sessions.remove(id);
            tracing::info!(session = %id, "Session expired");
        }
        idle
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions.lock().keys().cloned().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
