use crate::storage::{Index, Term};
use tokio::sync::mpsc;

/// Committed is a state value together with the log position it was committed at. Log positions
/// are totally ordered cluster-wide.
#[derive(Clone, Debug, PartialEq)]
pub struct Committed<V> {
    pub index: Index,
    pub term: Term,
    pub value: V,
}

pub fn commit_feed<V>() -> (CommitFeedPublisher<V>, CommitFeed<V>) {
    let (tx, rx) = mpsc::unbounded_channel();

    (CommitFeedPublisher { sender: tx }, CommitFeed { receiver: rx })
}

/// CommitFeedPublisher is held by the engine. Publishing never blocks the commit path.
pub struct CommitFeedPublisher<V> {
    sender: mpsc::UnboundedSender<Committed<V>>,
}

impl<V> CommitFeedPublisher<V> {
    /// Returns false once the feed has disconnected, so the engine can forget about it.
    pub fn notify_commit(&self, committed: Committed<V>) -> bool {
        self.sender.send(committed).is_ok()
    }
}

/// CommitFeed yields every state value the engine applies, in commit order.
pub struct CommitFeed<V> {
    receiver: mpsc::UnboundedReceiver<Committed<V>>,
}

impl<V> CommitFeed<V> {
    /// Returns None once the engine has shut down.
    pub async fn next(&mut self) -> Option<Committed<V>> {
        self.receiver.recv().await
    }
}
