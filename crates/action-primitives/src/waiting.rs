//! Mutation-driven waiting

use crate::{
    errors::ActionError,
    types::{ExecCtx, Resolution, Waited},
};
use action_locator::LocatorError;
use parking_lot::Mutex;
use shelver_core_types::{NodeId, TreeHost};
use shelver_mutation_watch::observe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{sleep, Instant};
use tracing::{debug, trace, warn};

/// Wait until `check` yields a value for the subtree under `root`.
///
/// Steps:
/// 1. Evaluate `check` immediately; resolve without arming a watch if it holds
/// 2. Arm a mutation watch on `root` and evaluate `check` once more, so a
///    change landing between step 1 and the arming is not missed
/// 3. Re-evaluate on every batch; the first satisfying batch fires the watch
///    and resolves, later notifications are ignored
/// 4. Fail with `Timeout` after `timeout`, or `Interrupted` when the
///    context is cancelled
///
/// The watch is released on every exit path.
pub async fn wait_for<T, P>(
    host: Arc<dyn TreeHost>,
    root: NodeId,
    check: P,
    timeout: Duration,
    ctx: &ExecCtx,
) -> Result<Waited<T>, ActionError>
where
    T: Send + 'static,
    P: Fn() -> Result<Option<T>, LocatorError> + Send + Sync + 'static,
{
    let started = Instant::now();

    if ctx.is_cancelled() {
        return Err(ActionError::Interrupted("Context cancelled".to_string()));
    }

    // 1. Pre-check
    if let Some(value) = check()? {
        debug!(action_id = %ctx.action_id, "wait satisfied before arming");
        return Ok(Waited {
            value,
            resolution: Resolution::PreCheck,
            batches: 0,
            elapsed: started.elapsed(),
        });
    }

    // 2. Arm the watch
    let check = Arc::new(check);
    let (tx, mut rx) = oneshot::channel::<Result<T, LocatorError>>();
    let slot = Arc::new(Mutex::new(Some(tx)));
    let batches = Arc::new(AtomicU32::new(0));

    let subscription = {
        let check = Arc::clone(&check);
        let slot = Arc::clone(&slot);
        let batches = Arc::clone(&batches);
        observe(host, root, move |batch, watch| {
            batches.fetch_add(1, Ordering::Relaxed);
            let outcome = match check() {
                Ok(Some(value)) => Ok(value),
                Ok(None) => {
                    trace!(records = batch.len(), "batch did not satisfy check");
                    return;
                }
                Err(err) => Err(err),
            };
            let Some(sender) = slot.lock().take() else {
                debug!("notification after resolution ignored");
                return;
            };
            watch.fire();
            let _ = sender.send(outcome);
        })?
    };
    debug!(
        action_id = %ctx.action_id,
        observer = %subscription.observer_id(),
        root = %root,
        timeout_ms = timeout.as_millis() as u64,
        "waiting for mutation"
    );

    // Re-check now that no change can slip past the watch
    match check() {
        Ok(Some(value)) => {
            if slot.lock().take().is_some() {
                subscription.fire();
                return Ok(Waited {
                    value,
                    resolution: Resolution::PostArm,
                    batches: batches.load(Ordering::Relaxed),
                    elapsed: started.elapsed(),
                });
            }
            // A batch already resolved; its result is waiting in the channel.
        }
        Ok(None) => {}
        Err(err) => {
            slot.lock().take();
            subscription.cancel();
            return Err(err.into());
        }
    }

    // 3./4. Race the watch against cancellation and the deadline
    let timeout_ms = timeout.as_millis() as u64;
    let outcome = tokio::select! {
        biased;

        received = &mut rx => match received {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ActionError::from(err)),
            Err(_) => Err(ActionError::Internal(
                "watch closed before resolving".to_string(),
            )),
        },

        _ = ctx.cancel_token.cancelled() => {
            slot.lock().take();
            subscription.cancel();
            Err(ActionError::Interrupted("Context cancelled".to_string()))
        }

        _ = sleep(timeout) => {
            if subscription.expire() {
                Err(ActionError::Timeout { timeout_ms })
            } else {
                // The watch fired while the timer elapsed.
                match rx.try_recv() {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(ActionError::from(err)),
                    Err(_) => Err(ActionError::Timeout { timeout_ms }),
                }
            }
        }
    };

    let batches = batches.load(Ordering::Relaxed);
    match outcome {
        Ok(value) => {
            debug!(
                action_id = %ctx.action_id,
                batches = batches,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "wait resolved by mutation"
            );
            Ok(Waited {
                value,
                resolution: Resolution::Mutation,
                batches,
                elapsed: started.elapsed(),
            })
        }
        Err(err) => {
            warn!(action_id = %ctx.action_id, batches = batches, "wait failed: {}", err);
            Err(err)
        }
    }
}

/// Sleep for `delay` unless the context is cancelled first
pub async fn pause(delay: Duration, ctx: &ExecCtx) -> Result<(), ActionError> {
    debug!(action_id = %ctx.action_id, "Pausing for {}ms", delay.as_millis());

    tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => {
            Err(ActionError::Interrupted("Context cancelled".to_string()))
        }
        _ = sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::{element_absent, element_present};
    use action_locator::{DefaultNodeLocator, NodeLocator, NodeQuery};
    use shelver_tree_memory::{ElementSpec, MemoryTree};
    use std::sync::atomic::AtomicUsize;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ExecCtx {
        ExecCtx::new("test", CancellationToken::new())
    }

    fn overlay_check(
        tree: &Arc<MemoryTree>,
    ) -> impl Fn() -> Result<Option<NodeId>, LocatorError> + Send + Sync + 'static {
        let locator: Arc<dyn NodeLocator> = Arc::new(DefaultNodeLocator::new(tree.clone()));
        element_present(locator, tree.document(), NodeQuery::id("overlay"), None)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_before_wait_needs_no_watch() {
        let tree = MemoryTree::new();
        let overlay = tree
            .append(tree.document(), ElementSpec::new("div").id("overlay"))
            .unwrap();

        let waited = wait_for(
            tree.clone(),
            tree.document(),
            overlay_check(&tree),
            Duration::from_millis(500),
            &ctx(),
        )
        .await
        .unwrap();

        assert_eq!(waited.value, overlay);
        assert_eq!(waited.resolution, Resolution::PreCheck);
        assert_eq!(waited.batches, 0);
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolves_on_mutation_and_releases_watch() {
        let tree = MemoryTree::new();
        let host = tree.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            // Unrelated noise first, then the overlay.
            host.append(host.document(), ElementSpec::new("span")).unwrap();
            sleep(Duration::from_millis(10)).await;
            host.append(host.document(), ElementSpec::new("div").id("overlay"))
                .unwrap();
        });

        let waited = wait_for(
            tree.clone(),
            tree.document(),
            overlay_check(&tree),
            Duration::from_millis(1000),
            &ctx(),
        )
        .await
        .unwrap();

        assert_eq!(waited.resolution, Resolution::Mutation);
        assert_eq!(waited.batches, 2);
        assert!(waited.elapsed >= Duration::from_millis(100));
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_before_arming_resolves_after_arm() {
        let tree = MemoryTree::new();
        let root = tree.document();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        // Unmet at the pre-check, met by the time the watch is armed.
        let check = move || -> Result<Option<NodeId>, LocatorError> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(None)
            } else {
                Ok(Some(root))
            }
        };

        let waited = wait_for(tree.clone(), root, check, Duration::from_millis(500), &ctx())
            .await
            .unwrap();

        assert_eq!(waited.value, root);
        assert_eq!(waited.resolution, Resolution::PostArm);
        assert_eq!(waited.batches, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_is_one_batch() {
        let tree = MemoryTree::new();
        let host = tree.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(100)).await;
            host.transaction(|tree| {
                let overlay = tree
                    .append(tree.document(), ElementSpec::new("div").id("overlay"))
                    .unwrap();
                tree.append(overlay, ElementSpec::new("a").text("X")).unwrap();
            });
        });

        let waited = wait_for(
            tree.clone(),
            tree.document(),
            overlay_check(&tree),
            Duration::from_millis(1000),
            &ctx(),
        )
        .await
        .unwrap();

        assert_eq!(waited.resolution, Resolution::Mutation);
        assert_eq!(waited.batches, 1);
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_watch() {
        let tree = MemoryTree::new();
        let started = Instant::now();

        let err = wait_for(
            tree.clone(),
            tree.document(),
            overlay_check(&tree),
            Duration::from_millis(500),
            &ctx(),
        )
        .await
        .unwrap_err();

        assert_eq!(err, ActionError::Timeout { timeout_ms: 500 });
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_releases_watch() {
        let tree = MemoryTree::new();
        let ctx = ctx();
        let token = ctx.cancel_token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let err = wait_for(
            tree.clone(),
            tree.document(),
            overlay_check(&tree),
            Duration::from_millis(1000),
            &ctx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ActionError::Interrupted(_)));
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_notifications_resolve_once() {
        let tree = MemoryTree::new();
        let resolutions = Arc::new(AtomicUsize::new(0));
        let host = tree.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            // Two batches that both satisfy the check, queued back to back.
            let overlay = host
                .append(host.document(), ElementSpec::new("div").id("overlay"))
                .unwrap();
            host.append(overlay, ElementSpec::new("a").text("X")).unwrap();
        });

        let locator = DefaultNodeLocator::new(tree.clone());
        let root = tree.document();
        let counter = resolutions.clone();
        let check = move || -> Result<Option<NodeId>, LocatorError> {
            let found = locator.resolve(root, &NodeQuery::id("overlay"))?;
            if found.is_some() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Ok(found)
        };

        let waited = wait_for(tree.clone(), root, check, Duration::from_millis(500), &ctx())
            .await
            .unwrap();
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }

        assert_eq!(waited.resolution, Resolution::Mutation);
        // Only the first batch reached the check; the second was dropped by the
        // released watch.
        assert_eq!(resolutions.load(Ordering::SeqCst), 1);
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_absence() {
        let tree = MemoryTree::new();
        let overlay = tree
            .append(tree.document(), ElementSpec::new("div").id("overlay"))
            .unwrap();
        let host = tree.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            host.remove(overlay).unwrap();
        });

        let locator: Arc<dyn NodeLocator> = Arc::new(DefaultNodeLocator::new(tree.clone()));
        let waited = wait_for(
            tree.clone(),
            tree.document(),
            element_absent(locator, tree.document(), NodeQuery::id("overlay")),
            Duration::from_millis(1000),
            &ctx(),
        )
        .await
        .unwrap();

        assert_eq!(waited.resolution, Resolution::Mutation);
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_failure_during_wait() {
        let tree = MemoryTree::new();
        let host = tree.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            host.append(host.document(), ElementSpec::new("span")).unwrap();
            host.set_available(false);
        });

        // The batch is delivered after the host went away, so the check fails.
        let err = wait_for(
            tree.clone(),
            tree.document(),
            overlay_check(&tree),
            Duration::from_millis(500),
            &ctx(),
        )
        .await
        .unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(tree.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_honours_cancellation() {
        let ctx = ctx();
        let started = Instant::now();
        pause(Duration::from_millis(300), &ctx).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));

        ctx.cancel_token.cancel();
        assert!(matches!(
            pause(Duration::from_millis(300), &ctx).await,
            Err(ActionError::Interrupted(_))
        ));
    }
}
