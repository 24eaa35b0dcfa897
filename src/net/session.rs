//! Session store
//!
//! One `Arc<Mutex<Session>>` per (player, save). The map lock is held only to
//! insert, look up or remove handles; all in-session work happens under the
//! session's own mutex, so unrelated players never wait on each other while
//! requests for the same save run strictly one after another.
//!
//! Lock order is map, then session, and the map lock is always released
//! before a session lock is taken.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::game::state::SaveState;
use crate::net::repository::{RepositoryError, SaveRepository};
use crate::net::snapshot::Snapshot;

/// Identifies one loaded save
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub player: String,
    pub save: String,
}

impl SessionKey {
    pub fn new(player: impl Into<String>, save: impl Into<String>) -> Self {
        Self {
            player: player.into(),
            save: save.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.player, self.save)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Failed to load save: {0}")]
    Load(#[from] RepositoryError),
    #[error("Session capacity exceeded ({0})")]
    CapacityExceeded(usize),
}

/// Live state for one loaded save
#[derive(Debug)]
pub struct Session {
    pub key: SessionKey,
    pub state: SaveState,
    /// NPCs at the current location; not persisted
    pub npcs: BTreeSet<String>,
    /// Absolute game minute of the last NPC refresh
    pub npcs_refreshed_at: u64,
    /// Building open flags for the current district; not persisted
    pub buildings: BTreeMap<String, bool>,
    pub buildings_refreshed_at: u64,
    /// What the client was last told
    pub last_snapshot: Snapshot,
    /// Real instant up to which elapsed time has been turned into ticks
    pub last_processed: Instant,
    /// Real milliseconds not yet worth a whole game minute
    pub carry_ms: u64,
    /// Absolute game minute of the last player action
    pub last_action_minute: u64,
    pub paused: bool,
    pub auto_paused: bool,
    /// Set once the session has left the store; holders must re-open
    pub evicted: bool,
    pub loaded_at: Instant,
    pub last_activity: Instant,
}

impl Session {
    pub fn new(key: SessionKey, state: SaveState, now: Instant) -> Self {
        let minute = state.absolute_minutes();
        let last_snapshot = Snapshot::capture(&state, &BTreeSet::new(), &BTreeMap::new());
        Self {
            key,
            state,
            npcs: BTreeSet::new(),
            npcs_refreshed_at: minute,
            buildings: BTreeMap::new(),
            buildings_refreshed_at: minute,
            last_snapshot,
            last_processed: now,
            carry_ms: 0,
            last_action_minute: minute,
            paused: false,
            auto_paused: false,
            evicted: false,
            loaded_at: now,
            last_activity: now,
        }
    }

    /// Capture the current observable state
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.state, &self.npcs, &self.buildings)
    }

    /// Make the current state the client's baseline
    pub fn reset_snapshot(&mut self) {
        self.last_snapshot = self.snapshot();
    }

    /// Whether real time currently turns into game time
    pub fn is_accruing(&self) -> bool {
        !self.paused && !self.auto_paused
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn idle_time(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub fn is_expired(&self, timeout: Duration, now: Instant) -> bool {
        self.idle_time(now) > timeout
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

pub struct SessionStore {
    sessions: RwLock<HashMap<SessionKey, SessionHandle>>,
    repository: Arc<dyn SaveRepository>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(repository: Arc<dyn SaveRepository>, max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            repository,
            max_sessions,
        }
    }

    pub fn repository(&self) -> &Arc<dyn SaveRepository> {
        &self.repository
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    pub fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.sessions.read().keys().cloned().collect()
    }

    fn handle(&self, key: &SessionKey) -> Option<SessionHandle> {
        self.sessions.read().get(key).cloned()
    }

    /// Return the loaded session, hydrating it from the repository if needed
    ///
    /// `prepare` runs once on a freshly loaded session before anyone else can
    /// see it. The boolean is true when this call created the session.
    pub fn get_or_create<F>(
        &self,
        key: &SessionKey,
        now: Instant,
        prepare: F,
    ) -> Result<(SessionHandle, bool), SessionError>
    where
        F: FnOnce(&mut Session),
    {
        if let Some(handle) = self.handle(key) {
            return Ok((handle, false));
        }

        // Disk access happens outside the map lock
        let state = self
            .repository
            .load(key)?
            .ok_or_else(|| SessionError::NotFound(key.to_string()))?;
        self.insert_prepared(key, state, now, prepare)
    }

    /// Register a brand-new save, persisting it first
    pub fn create<F>(
        &self,
        key: &SessionKey,
        state: SaveState,
        now: Instant,
        prepare: F,
    ) -> Result<(SessionHandle, bool), SessionError>
    where
        F: FnOnce(&mut Session),
    {
        if let Some(handle) = self.handle(key) {
            return Ok((handle, false));
        }
        self.repository.store(key, &state)?;
        self.insert_prepared(key, state, now, prepare)
    }

    fn insert_prepared<F>(
        &self,
        key: &SessionKey,
        state: SaveState,
        now: Instant,
        prepare: F,
    ) -> Result<(SessionHandle, bool), SessionError>
    where
        F: FnOnce(&mut Session),
    {
        let mut session = Session::new(key.clone(), state, now);
        prepare(&mut session);

        let mut sessions = self.sessions.write();
        // Another request may have loaded it while we were reading
        if let Some(existing) = sessions.get(key) {
            return Ok((existing.clone(), false));
        }
        if sessions.len() >= self.max_sessions {
            return Err(SessionError::CapacityExceeded(self.max_sessions));
        }
        let handle = Arc::new(Mutex::new(session));
        sessions.insert(key.clone(), handle.clone());
        info!("Session {} loaded ({} active)", key, sessions.len());
        Ok((handle, true))
    }

    /// Run `f` under the session's exclusive lock
    pub fn with_session<R>(
        &self,
        key: &SessionKey,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, SessionError> {
        let handle = self
            .handle(key)
            .ok_or_else(|| SessionError::NotFound(key.to_string()))?;
        let mut session = handle.lock();
        if session.evicted {
            return Err(SessionError::NotFound(key.to_string()));
        }
        Ok(f(&mut session))
    }

    /// Remove a session from the map if the map still holds this handle
    fn detach(&self, key: &SessionKey, handle: &SessionHandle) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get(key) {
            Some(current) if Arc::ptr_eq(current, handle) => {
                sessions.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Put a detached session back after a failed write-back
    fn restore(&self, key: &SessionKey, handle: SessionHandle) {
        self.sessions.write().entry(key.clone()).or_insert(handle);
    }

    /// Persist and drop a session; false when it was not loaded
    pub fn unload(&self, key: &SessionKey) -> Result<bool, SessionError> {
        let Some(handle) = self.handle(key) else {
            return Ok(false);
        };
        if !self.detach(key, &handle) {
            return Ok(false);
        }

        let mut session = handle.lock();
        session.evicted = true;
        if let Err(e) = self.repository.store(key, &session.state) {
            session.evicted = false;
            drop(session);
            self.restore(key, handle);
            return Err(e.into());
        }
        info!("Session {} unloaded", key);
        Ok(true)
    }

    /// Drop the in-memory record without saving and load it again
    pub fn reload<F>(
        &self,
        key: &SessionKey,
        now: Instant,
        prepare: F,
    ) -> Result<SessionHandle, SessionError>
    where
        F: FnOnce(&mut Session),
    {
        if let Some(handle) = self.handle(key) {
            if self.detach(key, &handle) {
                handle.lock().evicted = true;
                debug!("Session {} discarded for reload", key);
            }
        }
        self.get_or_create(key, now, prepare).map(|(handle, _)| handle)
    }

    /// Persist and drop every session idle longer than `timeout`
    ///
    /// Sessions busy with a request are skipped; they are not idle.
    pub fn evict_idle(&self, timeout: Duration, now: Instant) -> Vec<SessionKey> {
        let candidates: Vec<(SessionKey, SessionHandle)> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, handle)| {
                handle
                    .try_lock()
                    .is_some_and(|session| session.is_expired(timeout, now))
            })
            .map(|(key, handle)| (key.clone(), handle.clone()))
            .collect();

        let mut evicted = Vec::with_capacity(candidates.len());
        for (key, handle) in candidates {
            if !self.detach(&key, &handle) {
                continue;
            }
            let mut session = handle.lock();
            if !session.is_expired(timeout, now) {
                drop(session);
                self.restore(&key, handle);
                continue;
            }
            session.evicted = true;
            if let Err(e) = self.repository.store(&key, &session.state) {
                error!("Failed to persist idle session {}: {}", key, e);
                session.evicted = false;
                drop(session);
                self.restore(&key, handle);
                continue;
            }
            info!(
                "Evicted idle session {} (idle {:?})",
                key,
                session.idle_time(now)
            );
            evicted.push(key);
        }
        evicted
    }

    /// Persist and drop everything; used at shutdown
    pub fn unload_all(&self) -> usize {
        let mut unloaded = 0;
        for key in self.keys() {
            match self.unload(&key) {
                Ok(true) => unloaded += 1,
                Ok(false) => {}
                Err(e) => error!("Failed to persist session {}: {}", key, e),
            }
        }
        unloaded
    }
}
