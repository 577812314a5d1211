//! Scoped subscriptions to subtree mutation batches.
//!
//! [`observe`] registers a callback against a subtree of a [`TreeHost`] and
//! returns a [`Subscription`]. The subscription moves through exactly one
//! terminal transition (fired, cancelled or timed out); every later release
//! is absorbed, and once a subscription left the armed state its callback is
//! never invoked again, even for batches the host had already queued.
//!
//! Callbacks run on a pump task spawned on the current tokio runtime. A
//! callback may release its own subscription through the [`WatchHandle`] it
//! is given without deadlocking.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use shelver_core_types::{HostError, MutationBatch, NodeId, ObserverId, TreeHost};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Lifecycle of a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchState {
    Armed,
    Fired,
    Cancelled,
    TimedOut,
}

impl WatchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WatchState::Armed)
    }
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WatchState::Armed => "armed",
            WatchState::Fired => "fired",
            WatchState::Cancelled => "cancelled",
            WatchState::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

struct Shared {
    // Held by the pump for the whole duration of a callback, so a release from
    // another thread waits for the callback to return. Re-entrant so the
    // callback itself can release.
    state: ReentrantMutex<Cell<WatchState>>,
    host: Arc<dyn TreeHost>,
    observer: ObserverId,
    root: NodeId,
    redundant_releases: AtomicU32,
}

impl Shared {
    fn state(&self) -> WatchState {
        self.state.lock().get()
    }

    fn release(&self, terminal: WatchState) -> bool {
        let guard = self.state.lock();
        let current = guard.get();
        if current.is_terminal() {
            self.redundant_releases.fetch_add(1, Ordering::Relaxed);
            debug!(
                observer = %self.observer,
                current = %current,
                requested = %terminal,
                "redundant subscription release absorbed"
            );
            return false;
        }
        guard.set(terminal);
        self.host.disconnect(self.observer);
        trace!(observer = %self.observer, state = %terminal, "subscription released");
        true
    }
}

/// Cloneable control surface of a subscription.
#[derive(Clone)]
pub struct WatchHandle {
    shared: Arc<Shared>,
}

impl WatchHandle {
    pub fn state(&self) -> WatchState {
        self.shared.state()
    }

    pub fn is_armed(&self) -> bool {
        self.state() == WatchState::Armed
    }

    pub fn observer_id(&self) -> ObserverId {
        self.shared.observer
    }

    pub fn root(&self) -> NodeId {
        self.shared.root
    }

    /// Release because the awaited condition was met. Returns `true` only for
    /// the call that performed the terminal transition.
    pub fn fire(&self) -> bool {
        self.shared.release(WatchState::Fired)
    }

    /// Release on caller request. Idempotent.
    pub fn cancel(&self) -> bool {
        self.shared.release(WatchState::Cancelled)
    }

    /// Release because the caller's deadline passed.
    pub fn expire(&self) -> bool {
        self.shared.release(WatchState::TimedOut)
    }

    /// Releases that arrived after the terminal transition and were ignored.
    pub fn redundant_releases(&self) -> u32 {
        self.shared.redundant_releases.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("observer", &self.shared.observer)
            .field("root", &self.shared.root)
            .field("state", &self.state())
            .finish()
    }
}

/// Owned registration; dropping it cancels the watch.
#[derive(Debug)]
pub struct Subscription {
    handle: WatchHandle,
}

impl Subscription {
    pub fn handle(&self) -> WatchHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> WatchState {
        self.handle.state()
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_armed()
    }

    pub fn observer_id(&self) -> ObserverId {
        self.handle.observer_id()
    }

    pub fn cancel(&self) -> bool {
        self.handle.cancel()
    }

    pub fn fire(&self) -> bool {
        self.handle.fire()
    }

    pub fn expire(&self) -> bool {
        self.handle.expire()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.handle.is_armed() {
            self.handle.cancel();
        }
    }
}

/// Watch the subtree rooted at `root`, invoking `on_batch` once per batch the
/// host delivers while the subscription is armed.
///
/// Must be called from within a tokio runtime.
pub fn observe<F>(
    host: Arc<dyn TreeHost>,
    root: NodeId,
    mut on_batch: F,
) -> Result<Subscription, HostError>
where
    F: FnMut(MutationBatch, &WatchHandle) + Send + 'static,
{
    let (sink, mut batches) = mpsc::unbounded_channel();
    let observer = host.observe(root, sink)?;
    let handle = WatchHandle {
        shared: Arc::new(Shared {
            state: ReentrantMutex::new(Cell::new(WatchState::Armed)),
            host,
            observer,
            root,
            redundant_releases: AtomicU32::new(0),
        }),
    };
    debug!(observer = %observer, root = %root, "subscription armed");

    let pump = handle.clone();
    tokio::spawn(async move {
        while let Some(batch) = batches.recv().await {
            let guard = pump.shared.state.lock();
            if guard.get().is_terminal() {
                trace!(
                    observer = %pump.shared.observer,
                    records = batch.len(),
                    "dropping batch delivered after release"
                );
                break;
            }
            on_batch(batch, &pump);
            drop(guard);
        }
    });

    Ok(Subscription { handle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelver_tree_memory::{ElementSpec, MemoryTree};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_batches_are_delivered_while_armed() {
        let tree = MemoryTree::new();
        let root = tree.document();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = observe(tree.clone(), root, move |batch, _| {
            let _ = tx.send(batch.len());
        })
        .unwrap();

        tree.append(root, ElementSpec::new("div")).unwrap();
        let records = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(records, Some(1));
        assert!(subscription.is_armed());
        assert_eq!(tree.observer_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_subscription_drops_queued_batches() {
        let tree = MemoryTree::new();
        let root = tree.document();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let subscription = observe(tree.clone(), root, move |_, _| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        // Queued before the pump task gets a chance to run.
        tree.append(root, ElementSpec::new("div")).unwrap();
        tree.append(root, ElementSpec::new("div")).unwrap();
        assert!(subscription.cancel());
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(subscription.state(), WatchState::Cancelled);
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_from_inside_callback() {
        let tree = MemoryTree::new();
        let root = tree.document();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();

        let subscription = observe(tree.clone(), root, move |_, watch| {
            seen.fetch_add(1, Ordering::SeqCst);
            watch.cancel();
            watch.cancel();
        })
        .unwrap();

        tree.append(root, ElementSpec::new("div")).unwrap();
        settle().await;
        tree.append(root, ElementSpec::new("div")).unwrap();
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(subscription.state(), WatchState::Cancelled);
        assert_eq!(subscription.handle().redundant_releases(), 1);
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_only_first_terminal_transition_counts() {
        let tree = MemoryTree::new();
        let subscription = observe(tree.clone(), tree.document(), |_, _| {}).unwrap();

        assert!(subscription.fire());
        assert!(!subscription.cancel());
        assert!(!subscription.expire());
        assert_eq!(subscription.state(), WatchState::Fired);
        assert_eq!(subscription.handle().redundant_releases(), 2);
    }

    #[tokio::test]
    async fn test_drop_releases_observer() {
        let tree = MemoryTree::new();
        {
            let _subscription = observe(tree.clone(), tree.document(), |_, _| {}).unwrap();
            assert_eq!(tree.observer_count(), 1);
        }
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_observe_fails_when_host_unavailable() {
        let tree = MemoryTree::new();
        tree.set_available(false);
        let result = observe(tree.clone(), tree.document(), |_, _| {});
        assert!(matches!(result, Err(HostError::Unavailable(_))));
    }
}
