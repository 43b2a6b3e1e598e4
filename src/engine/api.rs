use crate::engine::{CommitFeed, Committed, Observer, ObserverId};
use crate::peers::PeerId;
use crate::roster::ServerRoster;
use crate::state::ReplicatedState;
use crate::storage::DurableStores;
use crate::transport::{Transport, TransportError};
use std::{fmt, io};

/// EngineRole is the local node's role as reported by the consensus engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EngineRole {
    Follower,
    Candidate,
    Leader,
    Shutdown,
}

impl fmt::Display for EngineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineRole::Follower => "Follower",
            EngineRole::Candidate => "Candidate",
            EngineRole::Leader => "Leader",
            EngineRole::Shutdown => "Shutdown",
        };
        f.write_str(name)
    }
}

/// LeadershipView is the part of an engine that does not depend on the replicated value type.
///
/// All methods are cheap, local reads and are safe to call concurrently.
pub trait LeadershipView: Send + Sync {
    fn local_id(&self) -> &PeerId;

    fn role(&self) -> EngineRole;

    /// The leader as currently known by this node, if any.
    fn current_leader(&self) -> Option<PeerId>;

    fn is_leader(&self) -> bool {
        self.role() == EngineRole::Leader
    }

    fn register_observer(&self, observer: Observer) -> ObserverId;

    fn deregister_observer(&self, id: ObserverId);
}

/// ConsensusEngine is a started engine replicating values of type `V`.
///
/// The engine is the single source of truth for the replicated value and serializes concurrent
/// calls internally.
#[async_trait::async_trait]
pub trait ConsensusEngine<V: ReplicatedState>: LeadershipView {
    /// Propose `value` and block until a quorum agrees or the proposal fails.
    ///
    /// `Ok(None)` means the proposal was not accepted because this node is not (or no longer)
    /// the leader. That is an expected race with leadership changes, not a fault.
    async fn propose_and_commit(&self, value: V) -> Result<Option<Committed<V>>, EngineError>;

    /// The latest state applied on this node. `Ok(None)` if nothing has been applied yet.
    async fn read_current_state(&self) -> Result<Option<Committed<V>>, EngineError>;

    /// A feed of every value applied on this node from now on, in commit order.
    fn subscribe(&self) -> CommitFeed<V>;

    async fn shutdown(&self);
}

/// EngineConfig is what an engine needs to know about the local node when it starts.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub local_id: PeerId,
    pub roster: ServerRoster,
    /// Take a snapshot after this many applied state values.
    pub snapshot_interval: u64,
}

/// ConsensusLauncher creates the transport and engine for one node.
#[async_trait::async_trait]
pub trait ConsensusLauncher<V: ReplicatedState>: Send + Sync {
    type Transport: Transport + 'static;
    type Engine: ConsensusEngine<V> + 'static;

    async fn bind_transport(&self, local_id: &PeerId) -> Result<Self::Transport, TransportError>;

    /// Write the initial configuration to fresh durable stores. Must be called at most once per
    /// set of stores; engines reject it with `AlreadyBootstrapped` on initialized stores.
    async fn bootstrap_cluster(
        &self,
        config: &EngineConfig,
        stores: &DurableStores,
        transport: &Self::Transport,
    ) -> Result<(), EngineError>;

    async fn start(
        &self,
        config: EngineConfig,
        stores: DurableStores,
        transport: Self::Transport,
    ) -> Result<Self::Engine, EngineError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("durable stores are already initialized; refusing to bootstrap again")]
    AlreadyBootstrapped,

    #[error("{0} is not in the cluster configuration")]
    NotInConfiguration(PeerId),

    // Can be retried. Likely peers are down or partitioned away.
    #[error("quorum unavailable: {live} live voters, {required} required")]
    QuorumUnavailable { live: usize, required: usize },

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("durable store failure: {0}")]
    Storage(#[from] io::Error),

    #[error("failed to encode or decode state: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("engine has shut down")]
    Shutdown,
}
