use crate::storage::{Index, Term};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub const DEFAULT_SNAPSHOT_RETAIN: usize = 3;

/// Snapshot is the materialized state as of the entry at `index`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub index: Index,
    pub term: Term,
    pub data: Vec<u8>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SnapshotMeta {
    pub index: Index,
    pub term: Term,
}

/// SnapshotStore keeps the most recent snapshots and discards older ones.
pub trait SnapshotStore: Send + Sync {
    fn create(&self, snapshot: Snapshot) -> Result<(), io::Error>;

    fn latest(&self) -> Result<Option<Snapshot>, io::Error>;

    /// Retained snapshots, newest first.
    fn list(&self) -> Result<Vec<SnapshotMeta>, io::Error>;
}

// -- InMemorySnapshotStore --

#[derive(Clone)]
pub struct InMemorySnapshotStore {
    retain: usize,
    snapshots: Arc<Mutex<VecDeque<Snapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new(retain: usize) -> Self {
        InMemorySnapshotStore {
            retain: retain.max(1),
            snapshots: Arc::new(Mutex::new(VecDeque::new())),
        }
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn create(&self, snapshot: Snapshot) -> Result<(), io::Error> {
        let mut snapshots = self
            .snapshots
            .lock()
            .expect("InMemorySnapshotStore.create() mutex guard poison");
        snapshots.push_front(snapshot);
        snapshots.make_contiguous().sort_by(|a, b| b.index.cmp(&a.index));
        snapshots.truncate(self.retain);

        Ok(())
    }

    fn latest(&self) -> Result<Option<Snapshot>, io::Error> {
        let snapshots = self
            .snapshots
            .lock()
            .expect("InMemorySnapshotStore.latest() mutex guard poison");

        Ok(snapshots.front().cloned())
    }

    fn list(&self) -> Result<Vec<SnapshotMeta>, io::Error> {
        let snapshots = self
            .snapshots
            .lock()
            .expect("InMemorySnapshotStore.list() mutex guard poison");

        Ok(snapshots
            .iter()
            .map(|s| SnapshotMeta {
                index: s.index,
                term: s.term,
            })
            .collect())
    }
}

// -- FileSnapshotStore --

const SNAPSHOT_PREFIX: &str = "snapshot-";
const SNAPSHOT_SUFFIX: &str = ".json";

/// FileSnapshotStore writes one JSON file per snapshot into a directory:
/// `snapshot-{index}-{term}.json`. Files are written to a temp name and renamed into place, so a
/// crash mid-write never leaves a partial snapshot behind.
pub struct FileSnapshotStore {
    directory: PathBuf,
    retain: usize,
}

impl FileSnapshotStore {
    pub fn open(directory: impl AsRef<Path>, retain: usize) -> Result<Self, io::Error> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;

        Ok(FileSnapshotStore {
            directory,
            retain: retain.max(1),
        })
    }

    fn file_name(meta: SnapshotMeta) -> String {
        format!(
            "{}{:020}-{}{}",
            SNAPSHOT_PREFIX,
            meta.index.as_u64(),
            meta.term.as_u64(),
            SNAPSHOT_SUFFIX
        )
    }

    fn parse_file_name(name: &str) -> Option<SnapshotMeta> {
        let body = name.strip_prefix(SNAPSHOT_PREFIX)?.strip_suffix(SNAPSHOT_SUFFIX)?;
        let (index, term) = body.split_once('-')?;
        let index = index.parse::<u64>().ok().filter(|i| *i > 0)?;
        let term = term.parse::<u64>().ok()?;

        Some(SnapshotMeta {
            index: Index::new(index),
            term: Term::new(term),
        })
    }

    fn list_files(&self) -> Result<Vec<(SnapshotMeta, PathBuf)>, io::Error> {
        let mut found = Vec::new();
        for dir_entry in fs::read_dir(&self.directory)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            if let Some(meta) = name.to_str().and_then(Self::parse_file_name) {
                found.push((meta, dir_entry.path()));
            }
        }
        found.sort_by(|(a, _), (b, _)| b.index.cmp(&a.index));

        Ok(found)
    }

    fn reap(&self) -> Result<(), io::Error> {
        for (_, path) in self.list_files()?.into_iter().skip(self.retain) {
            fs::remove_file(path)?;
        }

        Ok(())
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn create(&self, snapshot: Snapshot) -> Result<(), io::Error> {
        let final_name = Self::file_name(SnapshotMeta {
            index: snapshot.index,
            term: snapshot.term,
        });
        let tmp_path = self.directory.join(format!("{}.tmp", final_name));
        let bytes = serde_json::to_vec(&snapshot).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        fs::write(&tmp_path, bytes)?;
        fs::rename(&tmp_path, self.directory.join(final_name))?;

        self.reap()
    }

    fn latest(&self) -> Result<Option<Snapshot>, io::Error> {
        match self.list_files()?.into_iter().next() {
            Some((_, path)) => {
                let bytes = fs::read(path)?;
                let snapshot =
                    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<SnapshotMeta>, io::Error> {
        Ok(self.list_files()?.into_iter().map(|(meta, _)| meta).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(index: u64) -> Snapshot {
        Snapshot {
            index: Index::new(index),
            term: Term::new(1),
            data: format!("state-{}", index).into_bytes(),
        }
    }

    fn indexes(store: &dyn SnapshotStore) -> Vec<u64> {
        store.list().unwrap().iter().map(|m| m.index.as_u64()).collect()
    }

    #[test]
    fn in_memory_keeps_three_most_recent() {
        let store = InMemorySnapshotStore::new(DEFAULT_SNAPSHOT_RETAIN);
        assert_eq!(store.latest().unwrap(), None);

        for i in 1..=5 {
            store.create(snapshot(i)).unwrap();
        }

        assert_eq!(indexes(&store), vec![5, 4, 3]);
        assert_eq!(store.latest().unwrap(), Some(snapshot(5)));
    }

    #[test]
    fn file_store_keeps_three_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSnapshotStore::open(dir.path(), DEFAULT_SNAPSHOT_RETAIN).unwrap();

        for i in [2, 1, 7, 4, 9] {
            store.create(snapshot(i)).unwrap();
        }

        assert_eq!(indexes(&store), vec![9, 7, 4]);
        assert_eq!(store.latest().unwrap(), Some(snapshot(9)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[test]
    fn file_store_survives_reopen_and_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README"), b"not a snapshot").unwrap();
        {
            let store = FileSnapshotStore::open(dir.path(), 3).unwrap();
            store.create(snapshot(11)).unwrap();
        }

        let reopened = FileSnapshotStore::open(dir.path(), 3).unwrap();
        assert_eq!(reopened.latest().unwrap(), Some(snapshot(11)));
        assert_eq!(indexes(&reopened), vec![11]);
    }

    #[test]
    fn file_names_round_trip() {
        let meta = SnapshotMeta {
            index: Index::new(42),
            term: Term::new(3),
        };
        let name = FileSnapshotStore::file_name(meta);
        assert_eq!(FileSnapshotStore::parse_file_name(&name), Some(meta));
        assert_eq!(FileSnapshotStore::parse_file_name("snapshot-0-1.json"), None);
        assert_eq!(FileSnapshotStore::parse_file_name("snapshot-x-1.json"), None);
    }
}
