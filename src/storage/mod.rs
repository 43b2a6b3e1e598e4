//! Durable state the consensus engine persists: the replicated log and state snapshots.
mod in_memory;
mod log;
mod log_entry;
mod snapshot;

pub use in_memory::InMemoryLogStore;
pub use log::Index;
pub use log::LogStore;
pub use log::Term;
pub use log_entry::EntryPayload;
pub use log_entry::LogEntry;
pub use snapshot::FileSnapshotStore;
pub use snapshot::InMemorySnapshotStore;
pub use snapshot::Snapshot;
pub use snapshot::SnapshotMeta;
pub use snapshot::SnapshotStore;
pub use snapshot::DEFAULT_SNAPSHOT_RETAIN;

use std::io;
use std::sync::Arc;

/// DurableStores bundles the stores a single node's engine persists to.
#[derive(Clone)]
pub struct DurableStores {
    pub log: Arc<dyn LogStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

impl DurableStores {
    pub fn new(log: impl LogStore + 'static, snapshots: impl SnapshotStore + 'static) -> Self {
        DurableStores {
            log: Arc::new(log),
            snapshots: Arc::new(snapshots),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(InMemoryLogStore::new(), InMemorySnapshotStore::new(DEFAULT_SNAPSHOT_RETAIN))
    }
}

/// has_existing_state returns true if either store holds anything, i.e. this node has been part
/// of an initialized cluster before.
pub fn has_existing_state(log: &dyn LogStore, snapshots: &dyn SnapshotStore) -> Result<bool, io::Error> {
    if log.last_index().is_some() {
        return Ok(true);
    }

    Ok(snapshots.latest()?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_state_from_log_or_snapshot() {
        let log = InMemoryLogStore::new();
        let snapshots = InMemorySnapshotStore::new(3);
        assert!(!has_existing_state(&log, &snapshots).unwrap());

        snapshots
            .create(Snapshot {
                index: Index::new(4),
                term: Term::new(1),
                data: vec![],
            })
            .unwrap();
        assert!(has_existing_state(&log, &snapshots).unwrap());

        let log = InMemoryLogStore::new();
        let snapshots = InMemorySnapshotStore::new(3);
        log.append(vec![1]).unwrap();
        assert!(has_existing_state(&log, &snapshots).unwrap());
    }
}
