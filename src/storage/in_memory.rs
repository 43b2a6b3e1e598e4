use crate::storage::{Index, LogStore};
use std::io;
use std::sync::{Arc, Mutex};

/// InMemoryLogStore keeps the log in RAM. Clones share the same log, which lets a test "restart"
/// a node against the log its previous incarnation wrote.
#[derive(Clone)]
pub struct InMemoryLogStore {
    log: Arc<Mutex<InMemoryLog>>,
}

struct InMemoryLog {
    // Index of records[0].
    start: Index,
    records: Vec<Vec<u8>>,
}

impl InMemoryLog {
    fn vec_index(&self, index: Index) -> Option<usize> {
        index
            .as_u64()
            .checked_sub(self.start.as_u64())
            .map(|i| i as usize)
    }

    fn next_index(&self) -> Index {
        self.start.plus(self.records.len() as u64)
    }
}

impl Default for InMemoryLogStore {
    fn default() -> Self {
        InMemoryLogStore {
            log: Arc::new(Mutex::new(InMemoryLog {
                start: Index::start_index(),
                records: Vec::new(),
            })),
        }
    }
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        InMemoryLogStore::default()
    }
}

impl LogStore for InMemoryLogStore {
    fn append(&self, record: Vec<u8>) -> Result<Index, io::Error> {
        let mut log = self.log.lock().expect("InMemoryLogStore.append() mutex guard poison");
        let index = log.next_index();
        log.records.push(record);

        Ok(index)
    }

    fn read(&self, index: Index) -> Result<Option<Vec<u8>>, io::Error> {
        let log = self.log.lock().expect("InMemoryLogStore.read() mutex guard poison");

        Ok(log.vec_index(index).and_then(|i| log.records.get(i)).cloned())
    }

    fn reset(&self, next_index: Index) -> Result<(), io::Error> {
        let mut log = self.log.lock().expect("InMemoryLogStore.reset() mutex guard poison");
        log.start = next_index;
        log.records.clear();

        Ok(())
    }

    fn next_index(&self) -> Index {
        self.log
            .lock()
            .expect("InMemoryLogStore.next_index() mutex guard poison")
            .next_index()
    }
}
