use serde::{Deserialize, Serialize};
use std::fmt;

/// PeerId identifies a cluster member. It doubles as the member's address on the transport.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct PeerId(String);

#[derive(Debug, thiserror::Error)]
#[error("peer id must not be empty")]
pub struct EmptyPeerId;

impl PeerId {
    pub fn parse(id: impl Into<String>) -> Result<Self, EmptyPeerId> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(EmptyPeerId);
        }

        Ok(PeerId(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl TryFrom<String> for PeerId {
    type Error = EmptyPeerId;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        PeerId::parse(id)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// PeerDirectory supplies the set of reachable peers plus our own identity. The returned peers
/// may or may not include the local id.
pub trait PeerDirectory {
    fn list_peers(&self) -> Vec<PeerId>;
    fn local_id(&self) -> PeerId;

    /// Members that replicate but neither vote nor lead.
    fn list_nonvoters(&self) -> Vec<PeerId> {
        Vec::new()
    }
}

/// StaticPeerDirectory is a directory fixed at construction time, e.g. from a config file.
#[derive(Clone, Debug)]
pub struct StaticPeerDirectory {
    local_id: PeerId,
    peers: Vec<PeerId>,
    nonvoters: Vec<PeerId>,
}

impl StaticPeerDirectory {
    pub fn new(local_id: PeerId, peers: Vec<PeerId>) -> Self {
        StaticPeerDirectory {
            local_id,
            peers,
            nonvoters: Vec::new(),
        }
    }

    pub fn with_nonvoters(mut self, nonvoters: Vec<PeerId>) -> Self {
        self.nonvoters = nonvoters;
        self
    }
}

impl PeerDirectory for StaticPeerDirectory {
    fn list_peers(&self) -> Vec<PeerId> {
        self.peers.clone()
    }

    fn local_id(&self) -> PeerId {
        self.local_id.clone()
    }

    fn list_nonvoters(&self) -> Vec<PeerId> {
        self.nonvoters.clone()
    }
}
