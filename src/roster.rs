use crate::peers::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Suffrage {
    Voter,
    Nonvoter,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServerRosterEntry {
    pub peer_id: PeerId,
    pub suffrage: Suffrage,
}

/// ServerRoster is the initial server configuration handed to the consensus engine.
///
/// Entries have unique peer ids. Order carries no meaning, but it is deterministic for a given
/// directory listing so that every member hands the engine a byte-identical configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServerRoster {
    entries: Vec<ServerRosterEntry>,
}

impl ServerRoster {
    /// Directory peers in listing order, then `local_id` unless the directory already listed it.
    /// Every member is a voter. Duplicates in the listing are collapsed.
    pub fn from_peers(peers: Vec<PeerId>, local_id: PeerId) -> Self {
        let mut seen = HashSet::with_capacity(peers.len() + 1);
        let mut entries = Vec::with_capacity(peers.len() + 1);

        for peer_id in peers.into_iter().chain(std::iter::once(local_id)) {
            if seen.insert(peer_id.clone()) {
                entries.push(ServerRosterEntry {
                    peer_id,
                    suffrage: Suffrage::Voter,
                });
            }
        }

        ServerRoster { entries }
    }

    /// Strips the vote from every listed member. Ids not in the roster are ignored.
    pub fn with_nonvoters(mut self, nonvoters: &[PeerId]) -> Self {
        for entry in self.entries.iter_mut() {
            if nonvoters.contains(&entry.peer_id) {
                entry.suffrage = Suffrage::Nonvoter;
            }
        }

        self
    }

    pub fn entries(&self) -> &[ServerRosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, peer_id: &PeerId) -> bool {
        self.entries.iter().any(|e| &e.peer_id == peer_id)
    }

    pub fn is_voter(&self, peer_id: &PeerId) -> bool {
        self.entries
            .iter()
            .any(|e| &e.peer_id == peer_id && e.suffrage == Suffrage::Voter)
    }

    pub fn voters(&self) -> impl Iterator<Item = &PeerId> {
        self.entries
            .iter()
            .filter(|e| e.suffrage == Suffrage::Voter)
            .map(|e| &e.peer_id)
    }

    /// Number of voters that must agree for an entry to commit.
    pub fn quorum_size(&self) -> usize {
        self.voters().count() / 2 + 1
    }
}
