//! Per-session expiration watchers.
//!
//! Every session generation gets exactly one watcher task. The watcher
//! sleeps until its deadline or until the generation is cancelled by a
//! renewal, whichever comes first:
//!
//! - cancelled first: the session was renewed in time, exit quietly.
//! - deadline first: re-check the cancellation token without waiting. If a
//!   renewal landed at the same instant, the renewal wins and the session
//!   survives. Otherwise ask the store to expire the session, which confirms
//!   under its lock that this generation is still the current one.
//!
//! A watcher never retries and always terminates.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::store::StoreInner;

/// What a watcher captured when it was spawned.
#[derive(Debug, Clone)]
pub(crate) struct Watch {
    pub(crate) id: String,
    pub(crate) generation: u64,
    pub(crate) expires_at: Instant,
    pub(crate) cancel: CancellationToken,
    pub(crate) slot: WatchSlot,
}

/// How a watcher finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatchOutcome {
    /// The generation was renewed or deleted before (or as) the deadline hit.
    Superseded,
    /// The deadline passed uncontested and the session was removed.
    Expired,
    /// The store or the session was already gone when the deadline hit.
    Gone,
}

/// Counts watchers that still hold authority to expire their session.
///
/// A watcher stops counting as soon as its generation is superseded or
/// its session is removed, not when its task is next polled. Both happen
/// under the store lock, so the count never exceeds the number of live
/// sessions.
#[derive(Debug, Clone, Default)]
pub(crate) struct WatcherCount(Arc<AtomicUsize>);

impl WatcherCount {
    pub(crate) fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Count one more watcher and hand back its slot.
    pub(crate) fn acquire(&self) -> WatchSlot {
        self.0.fetch_add(1, Ordering::AcqRel);
        WatchSlot(Arc::new(SlotInner {
            count: self.0.clone(),
            released: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
struct SlotInner {
    count: Arc<AtomicUsize>,
    released: AtomicBool,
}

/// One watcher's share of the [`WatcherCount`].
///
/// Shared by the session (released on renew, delete, or expiry) and the
/// watcher task (released when the task ends). Only the first release
/// decrements.
#[derive(Debug, Clone)]
pub(crate) struct WatchSlot(Arc<SlotInner>);

impl WatchSlot {
    pub(crate) fn release(&self) {
        if !self.0.released.swap(true, Ordering::AcqRel) {
            self.0.count.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

/// Releases the slot when the watcher future is dropped, whether it ran to
/// completion or was torn down with the runtime.
struct ReleaseOnDrop(WatchSlot);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.release();
    }
}

/// Spawn the watcher for `watch` onto the current Tokio runtime.
pub(crate) fn spawn(watch: Watch, store: Weak<StoreInner>) -> JoinHandle<WatchOutcome> {
    let guard = ReleaseOnDrop(watch.slot.clone());
    tokio::spawn(async move {
        let _guard = guard;
        run(watch, store).await
    })
}

async fn run(watch: Watch, store: Weak<StoreInner>) -> WatchOutcome {
    tokio::select! {
        _ = watch.cancel.cancelled() => {
            trace!(session_id = %watch.id, generation = watch.generation, "Session renewed before expiry");
            return WatchOutcome::Superseded;
        }
        _ = tokio::time::sleep_until(watch.expires_at) => {}
    }

    if watch.cancel.is_cancelled() {
        trace!(
            session_id = %watch.id,
            generation = watch.generation,
            "Deadline raced a renewal, keeping session"
        );
        return WatchOutcome::Superseded;
    }

    let Some(store) = store.upgrade() else {
        return WatchOutcome::Gone;
    };

    if store.expire(&watch) {
        debug!(session_id = %watch.id, generation = watch.generation, "Session expired");
        WatchOutcome::Expired
    } else if watch.cancel.is_cancelled() {
        WatchOutcome::Superseded
    } else {
        WatchOutcome::Gone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::session::SessionValues;
    use crate::store::SessionStore;
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(5);

    fn store() -> SessionStore {
        SessionStore::new(StoreConfig::new().with_ttl(TTL))
    }

    fn spawn_for(store: &SessionStore, watch: Watch) -> JoinHandle<WatchOutcome> {
        spawn(watch, Arc::downgrade(store.inner()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncontested_deadline_expires() {
        let store = store();
        let watch = store.register_without_watcher("s-1");

        let outcome = spawn_for(&store, watch).await.unwrap();

        assert_eq!(outcome, WatchOutcome::Expired);
        assert!(!store.contains("s-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_no_earlier_than_deadline() {
        let store = store();
        let start = Instant::now();
        let watch = store.register_without_watcher("s-1");

        spawn_for(&store, watch).await.unwrap();

        assert!(start.elapsed() >= TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_supersedes() {
        let store = store();
        let stale = store.register_without_watcher("s-1");
        let handle = spawn_for(&store, stale);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let current = store.renew_without_watcher("s-1", SessionValues::new());

        // The superseded watcher stops counting before its task resumes.
        assert_eq!(store.watcher_count().get(), 1);
        assert_eq!(handle.await.unwrap(), WatchOutcome::Superseded);
        assert!(store.contains("s-1"));

        assert_eq!(
            spawn_for(&store, current).await.unwrap(),
            WatchOutcome::Expired
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_at_deadline_wins() {
        let store = store();
        let stale = store.register_without_watcher("s-1");

        // Deadline has passed and the renewal already happened by the time
        // the watcher first runs.
        tokio::time::advance(TTL + Duration::from_millis(1)).await;
        store.renew_without_watcher("s-1", SessionValues::new());

        assert_eq!(
            spawn_for(&store, stale).await.unwrap(),
            WatchOutcome::Superseded
        );
        assert!(store.contains("s-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_store_is_gone() {
        let count = WatcherCount::default();
        let watch = Watch {
            id: "s-1".to_string(),
            generation: 0,
            expires_at: Instant::now(),
            cancel: CancellationToken::new(),
            slot: count.acquire(),
        };
        assert_eq!(count.get(), 1);

        let outcome = spawn(watch, Weak::new()).await.unwrap();

        assert_eq!(outcome, WatchOutcome::Gone);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn test_slot_releases_once() {
        let count = WatcherCount::default();
        let first = count.acquire();
        let second = count.acquire();
        assert_eq!(count.get(), 2);

        first.release();
        first.clone().release();
        assert_eq!(count.get(), 1);

        second.release();
        assert_eq!(count.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_finish_is_harmless() {
        let store = store();
        let watch = store.register_without_watcher("s-1");
        let cancel = watch.cancel.clone();

        spawn_for(&store, watch).await.unwrap();

        cancel.cancel();
        cancel.cancel();
        assert_eq!(store.watcher_count().get(), 0);
    }
}
