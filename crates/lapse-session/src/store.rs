//! Session store with per-session TTL expiration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::id::{IdGenerator, UuidGenerator};
use crate::session::{Session, SessionInfo, SessionValues};
use crate::watcher::{self, Watch, WatcherCount};

/// State shared between the store handles and their watchers.
pub(crate) struct StoreInner {
    /// Every read and write of a session happens under this lock.
    sessions: Mutex<HashMap<String, Session>>,

    config: StoreConfig,

    ids: Box<dyn IdGenerator>,

    watchers: WatcherCount,
}

impl StoreInner {
    /// Insert a fresh session under `id` and return its first watch.
    fn register(&self, id: String) -> Result<Watch> {
        let mut sessions = self.sessions.lock();

        if sessions.contains_key(&id) {
            return Err(Error::IdGeneration(format!("duplicate session ID: {id}")));
        }

        let session = Session::new(self.config.ttl, &self.watchers);
        let watch = session.watch(&id);
        sessions.insert(id, session);

        Ok(watch)
    }

    /// Replace a session's payload and roll it to a new generation.
    fn renew(&self, id: &str, data: SessionValues) -> Result<Watch> {
        let mut sessions = self.sessions.lock();

        match sessions.get_mut(id) {
            Some(session) => Ok(session.renew(id, data, self.config.ttl, &self.watchers)),
            None => Err(Error::NotFound(id.to_string())),
        }
    }

    /// Remove the session `watch` was spawned for, if that watch is still
    /// the current one. Returns whether anything was removed.
    ///
    /// Renewals and deletes cancel the previous token while holding the
    /// lock, so a token that is still live here proves no write happened
    /// since the watch was taken. Absent sessions are a no-op.
    pub(crate) fn expire(&self, watch: &Watch) -> bool {
        let mut sessions = self.sessions.lock();

        if watch.cancel.is_cancelled() {
            return false;
        }

        match sessions.get(&watch.id) {
            Some(session) if session.generation() == watch.generation => {
                watch.slot.release();
                sessions.remove(&watch.id);
                true
            }
            _ => false,
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        for session in self.sessions.get_mut().values() {
            session.invalidate();
        }
    }
}

/// In-memory session store with automatic TTL expiration.
///
/// Each session is removed a bounded time after its *last* write: at
/// least [`StoreConfig::ttl`], at most [`StoreConfig::max_lifetime`].
/// Every write starts a new expiration generation and cancels the watcher
/// of the previous one, so at most one watcher can ever delete a given
/// session, and only if nothing was written since it started.
///
/// All operations are synchronous and hold the store lock only for a
/// map lookup. Handles are cheap to clone and share one underlying store.
/// Dropping the last handle cancels all outstanding watchers.
///
/// # Panics
///
/// [`create`](Self::create) and [`update`](Self::update) spawn watcher
/// tasks with [`tokio::spawn`] and panic when called outside a Tokio
/// runtime.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

impl SessionStore {
    /// Create a store that hands out random UUIDs as session IDs.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_id_generator(config, UuidGenerator)
    }

    /// Create a store with a custom ID generator.
    pub fn with_id_generator(config: StoreConfig, ids: impl IdGenerator) -> Self {
        let inner = StoreInner {
            sessions: Mutex::new(HashMap::new()),
            config,
            ids: Box::new(ids),
            watchers: WatcherCount::default(),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Get the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Get the session TTL.
    pub fn ttl(&self) -> Duration {
        self.inner.config.ttl
    }

    /// Create a new empty session and return its ID.
    ///
    /// Fails with [`Error::IdGeneration`] if the generator fails or returns
    /// an ID that is already live; nothing is registered in that case.
    pub fn create(&self) -> Result<String> {
        let id = self.inner.ids.new_id().map_err(|e| match e {
            Error::IdGeneration(reason) => Error::IdGeneration(reason),
            other => Error::IdGeneration(other.to_string()),
        })?;
        let watch = self.inner.register(id.clone())?;

        debug!(session_id = %id, ttl_ms = millis(self.ttl()), "Session created");
        self.start_watcher(watch);

        Ok(id)
    }

    /// Get a copy of a session's payload.
    ///
    /// The returned map is detached from the store; changing it has no
    /// effect until passed back through [`update`](Self::update).
    pub fn get(&self, session_id: &str) -> Result<SessionValues> {
        let sessions = self.inner.sessions.lock();
        sessions
            .get(session_id)
            .map(|session| session.data().clone())
            .ok_or_else(|| Error::NotFound(session_id.to_string()))
    }

    /// Replace a session's payload and push its deadline to `now + ttl`.
    pub fn update(&self, session_id: &str, data: SessionValues) -> Result<()> {
        let watch = self.inner.renew(session_id, data)?;

        debug!(session_id = %session_id, generation = watch.generation, "Session updated");
        self.start_watcher(watch);

        Ok(())
    }

    /// Delete a session before its deadline.
    pub fn delete(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.inner.sessions.lock();

        match sessions.remove(session_id) {
            Some(session) => {
                session.invalidate();
                debug!(session_id = %session_id, "Session deleted");
                Ok(())
            }
            None => Err(Error::NotFound(session_id.to_string())),
        }
    }

    /// Check whether a session is live.
    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.sessions.lock().contains_key(session_id)
    }

    /// Get a snapshot of a session's expiry bookkeeping.
    pub fn inspect(&self, session_id: &str) -> Result<SessionInfo> {
        let sessions = self.inner.sessions.lock();
        sessions
            .get(session_id)
            .map(|session| session.info(session_id))
            .ok_or_else(|| Error::NotFound(session_id.to_string()))
    }

    /// Get the number of live sessions.
    pub fn len(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Check if the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.lock().is_empty()
    }

    /// Get store statistics.
    ///
    /// Both counts are read under the store lock, so `watchers` never
    /// exceeds `sessions`.
    pub fn stats(&self) -> StoreStats {
        let sessions = self.inner.sessions.lock();
        StoreStats {
            sessions: sessions.len(),
            watchers: self.inner.watchers.get(),
        }
    }

    fn start_watcher(&self, watch: Watch) {
        trace!(session_id = %watch.id, generation = watch.generation, "Starting watcher");
        watcher::spawn(watch, Arc::downgrade(&self.inner));
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<StoreInner> {
        &self.inner
    }

    #[cfg(test)]
    pub(crate) fn register_without_watcher(&self, id: &str) -> Watch {
        self.inner.register(id.to_string()).unwrap()
    }

    #[cfg(test)]
    pub(crate) fn renew_without_watcher(&self, id: &str, data: SessionValues) -> Watch {
        self.inner.renew(id, data).unwrap()
    }

    #[cfg(test)]
    pub(crate) fn watcher_count(&self) -> WatcherCount {
        self.inner.watchers.clone()
    }
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    /// Number of live sessions.
    pub sessions: usize,

    /// Number of watcher tasks that have not finished yet.
    pub watchers: usize,
}
