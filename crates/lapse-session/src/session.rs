//! The session entity and its expiry bookkeeping.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::watcher::{Watch, WatchSlot, WatcherCount};

/// Session payload: string keys to opaque JSON values.
///
/// Writes replace the whole map; there is no merge.
pub type SessionValues = HashMap<String, serde_json::Value>;

/// A stored session. Only ever touched under the store lock.
#[derive(Debug)]
pub(crate) struct Session {
    data: SessionValues,

    /// Bumped on every renewal; identifies the current watcher.
    generation: u64,

    expires_at: Instant,

    /// Cancels the watcher for `generation`.
    cancel: CancellationToken,

    /// Counts the watcher for `generation` as live until released.
    slot: WatchSlot,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session expiring `ttl` from now.
    pub(crate) fn new(ttl: Duration, watchers: &WatcherCount) -> Self {
        let now = Utc::now();
        Self {
            data: SessionValues::new(),
            generation: 0,
            expires_at: Instant::now() + ttl,
            cancel: CancellationToken::new(),
            slot: watchers.acquire(),
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn data(&self) -> &SessionValues {
        &self.data
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Parameters for the watcher owning the current generation.
    pub(crate) fn watch(&self, id: &str) -> Watch {
        Watch {
            id: id.to_string(),
            generation: self.generation,
            expires_at: self.expires_at,
            cancel: self.cancel.clone(),
            slot: self.slot.clone(),
        }
    }

    /// Replace the payload and start a new expiration contract.
    ///
    /// The previous watcher is cancelled before the generation moves on, so
    /// it can never observe itself as current again.
    pub(crate) fn renew(
        &mut self,
        id: &str,
        data: SessionValues,
        ttl: Duration,
        watchers: &WatcherCount,
    ) -> Watch {
        self.invalidate();

        self.data = data;
        self.generation += 1;
        self.expires_at = Instant::now() + ttl;
        self.cancel = CancellationToken::new();
        self.slot = watchers.acquire();
        self.updated_at = Utc::now();

        self.watch(id)
    }

    /// Cancel the current watcher and stop counting it. Safe to call
    /// repeatedly.
    pub(crate) fn invalidate(&self) {
        self.cancel.cancel();
        self.slot.release();
    }

    pub(crate) fn info(&self, id: &str) -> SessionInfo {
        SessionInfo {
            id: id.to_string(),
            generation: self.generation,
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_in: self.expires_at.saturating_duration_since(Instant::now()),
        }
    }
}

/// Read-only snapshot of a session's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Session identifier.
    pub id: String,

    /// Number of renewals since creation.
    pub generation: u64,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the payload was last replaced (equals `created_at` until then).
    pub updated_at: DateTime<Utc>,

    /// Time left until the session becomes eligible for removal.
    pub expires_in: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_new_session() {
        let watchers = WatcherCount::default();
        let session = Session::new(Duration::from_secs(5), &watchers);

        assert!(session.data().is_empty());
        assert_eq!(session.generation(), 0);

        let info = session.info("s-1");
        assert_eq!(info.expires_in, Duration::from_secs(5));
        assert_eq!(info.created_at, info.updated_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_cancels_previous_watch() {
        let watchers = WatcherCount::default();
        let mut session = Session::new(Duration::from_secs(5), &watchers);
        let first = session.watch("s-1");

        tokio::time::advance(Duration::from_secs(3)).await;

        let mut data = SessionValues::new();
        data.insert("website".to_string(), json!("longhoang.de"));
        let second = session.renew("s-1", data, Duration::from_secs(5), &watchers);

        assert!(first.cancel.is_cancelled());
        assert_eq!(watchers.get(), 1);
        assert!(!second.cancel.is_cancelled());
        assert_eq!(second.generation, 1);
        assert_eq!(second.expires_at - first.expires_at, Duration::from_secs(3));
        assert_eq!(session.data()["website"], json!("longhoang.de"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renew_replaces_data() {
        let watchers = WatcherCount::default();
        let mut session = Session::new(Duration::from_secs(5), &watchers);

        let mut data = SessionValues::new();
        data.insert("a".to_string(), json!(1));
        session.renew("s-1", data, Duration::from_secs(5), &watchers);

        let mut data = SessionValues::new();
        data.insert("b".to_string(), json!(2));
        session.renew("s-1", data, Duration::from_secs(5), &watchers);

        assert_eq!(session.data().len(), 1);
        assert!(!session.data().contains_key("a"));
        assert_eq!(session.generation(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_is_idempotent() {
        let watchers = WatcherCount::default();
        let session = Session::new(Duration::from_secs(5), &watchers);
        let watch = session.watch("s-1");

        session.invalidate();
        session.invalidate();

        assert!(watch.cancel.is_cancelled());
        assert_eq!(watchers.get(), 0);
    }
}
