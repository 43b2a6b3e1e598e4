use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use std::{fmt, io};

/// Index is an index of an entry in the log; i.e. a log entry's index.
///
/// Log indexes start from 1. There is never an entry at index 0.
#[derive(Copy, Clone, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Index(NonZeroU64);

impl Index {
    pub fn new(index: u64) -> Self {
        Index(NonZeroU64::new(index).expect("log index must be non-zero"))
    }

    pub fn start_index() -> Self {
        Self::new(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }

    pub fn plus(&self, delta: u64) -> Index {
        Index::new(self.as_u64() + delta)
    }

    pub fn checked_minus(&self, delta: u64) -> Option<Index> {
        self.as_u64().checked_sub(delta).and_then(NonZeroU64::new).map(Index)
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Term is the leadership epoch an entry was created in.
#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Term(u64);

impl Term {
    pub fn new(term: u64) -> Self {
        Term(term)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn incr(&mut self) {
        self.0 += 1;
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// LogStore is the durable, append only log the consensus engine persists entries to. Records
/// are opaque bytes; the engine owns their encoding.
///
/// Implementations are shared between tasks and must synchronize internally.
pub trait LogStore: Send + Sync {
    /// append() appends a record at the next log index, then returns the index that was just
    /// used to append the record.
    fn append(&self, record: Vec<u8>) -> Result<Index, io::Error>;

    /// Read the record at the specified index.
    fn read(&self, index: Index) -> Result<Option<Vec<u8>>, io::Error>;

    /// Discards every record and continues appending at `next_index`. Reads below `next_index`
    /// return `None` afterwards.
    fn reset(&self, next_index: Index) -> Result<(), io::Error>;

    /// next_index returns the next index that will be used to append a record.
    fn next_index(&self) -> Index;

    fn last_index(&self) -> Option<Index> {
        self.next_index().checked_minus(1)
    }
}
