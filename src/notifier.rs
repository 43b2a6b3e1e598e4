use crate::engine::{CommitFeed, Committed};
use crate::storage::Index;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// ChangeNotifier holds the latest committed state in a single slot. Publishing never blocks; a
/// value nobody has looked at yet is simply replaced by the newer one.
pub struct ChangeNotifier<V> {
    sender: Arc<watch::Sender<Option<Committed<V>>>>,
}

impl<V> Clone for ChangeNotifier<V> {
    fn clone(&self) -> Self {
        ChangeNotifier {
            sender: self.sender.clone(),
        }
    }
}

impl<V: Clone> ChangeNotifier<V> {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);

        ChangeNotifier {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> Subscription<V> {
        Subscription {
            receiver: self.sender.subscribe(),
            last_seen: None,
        }
    }

    /// Returns false if `committed` is not newer than what was already published, in which case
    /// it is dropped. Subscribers never see the state move backwards.
    pub fn publish(&self, committed: Committed<V>) -> bool {
        self.sender.send_if_modified(|slot| match slot {
            Some(current) if current.index >= committed.index => false,
            _ => {
                *slot = Some(committed);
                true
            }
        })
    }

    pub fn latest(&self) -> Option<Committed<V>> {
        self.sender.borrow().clone()
    }
}

impl<V: Clone> Default for ChangeNotifier<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscription yields committed states newest-first-wins: if several commits land between two
/// calls to `next()`, only the latest is returned.
pub struct Subscription<V> {
    receiver: watch::Receiver<Option<Committed<V>>>,
    last_seen: Option<Index>,
}

impl<V: Clone> Subscription<V> {
    /// Waits for a state this subscription has not returned yet. Returns None once every
    /// notifier handle is gone.
    pub async fn next(&mut self) -> Option<Committed<V>> {
        loop {
            if let Some(committed) = self.unseen() {
                return Some(committed);
            }
            if self.receiver.changed().await.is_err() {
                // Closed, but the final value may not have been returned yet.
                return self.unseen();
            }
        }
    }

    /// The newest state, whether or not it was returned before.
    pub fn latest(&self) -> Option<Committed<V>> {
        self.receiver.borrow().clone()
    }

    fn unseen(&mut self) -> Option<Committed<V>> {
        let current = self.receiver.borrow_and_update().clone()?;
        if self.last_seen.map_or(false, |seen| seen >= current.index) {
            return None;
        }
        self.last_seen = Some(current.index);

        Some(current)
    }
}

/// Drains the engine's commit feed into `notifier` until cancelled or the feed ends.
pub async fn forward_commits<V: Clone>(
    mut feed: CommitFeed<V>,
    notifier: ChangeNotifier<V>,
    cancel: CancellationToken,
    logger: slog::Logger,
) {
    loop {
        let committed = tokio::select! {
            _ = cancel.cancelled() => break,
            committed = feed.next() => match committed {
                Some(committed) => committed,
                None => {
                    slog::info!(logger, "Commit feed closed");
                    break;
                }
            },
        };

        let index = committed.index;
        if notifier.publish(committed) {
            slog::debug!(logger, "Published state at index {}", index);
        } else {
            slog::warn!(logger, "Dropped out of order state at index {}", index);
        }
    }

    slog::info!(logger, "Change notifier has exited");
}
