use crate::roster::ServerRoster;
use crate::storage::{Index, Term};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io;

/// LogEntry is what the engine persists for every position of the replicated log.
///
/// Byte representation:
///
/// ```text
/// | 0 | 1 ...                   |
/// +---+-------------------------+
/// |Vrs| JSON body (variable)    |
/// +---+-------------------------+
/// ```
///
/// * `Vrs` - version of the serialized payload
/// * `JSON body` - index, term and payload
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: Index,
    pub term: Term,
    pub payload: EntryPayload,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntryPayload {
    /// Initial server configuration, written once when a cluster is bootstrapped.
    Configuration(ServerRoster),
    /// Application operation; a serialized state value.
    Command(Bytes),
}

const LOG_ENTRY_FORMAT_VERSION: u8 = 1;

impl LogEntry {
    pub fn encode(&self) -> Result<Vec<u8>, io::Error> {
        let mut bytes = vec![LOG_ENTRY_FORMAT_VERSION];
        serde_json::to_writer(&mut bytes, self).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, io::Error> {
        match bytes.split_first() {
            Some((&LOG_ENTRY_FORMAT_VERSION, body)) => {
                serde_json::from_slice(body).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            }
            Some((version, _)) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown log entry format version {}", version),
            )),
            None => Err(io::Error::new(io::ErrorKind::InvalidData, "empty log record")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_unknown_version() {
        let err = LogEntry::decode(&[9, b'{', b'}']).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let err = LogEntry::decode(&[]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn encoded_entry_carries_version_prefix() {
        let entry = LogEntry {
            index: Index::new(3),
            term: Term::new(2),
            payload: EntryPayload::Command(Bytes::from_static(b"\"T1\"")),
        };

        let bytes = entry.encode().unwrap();
        assert_eq!(bytes[0], LOG_ENTRY_FORMAT_VERSION);
        assert_eq!(LogEntry::decode(&bytes).unwrap(), entry);
    }
}
