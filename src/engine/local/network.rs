use crate::engine::local::actor::{self, ActorClient, BindingId, JoinRequest};
use crate::engine::local::member::MemberSink;
use crate::engine::EngineError;
use crate::peers::PeerId;
use crate::roster::ServerRoster;
use crate::storage::{Index, Term};
use crate::transport::{Transport, TransportError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

const EVENT_QUEUE_SIZE: usize = 64;

/// LocalNetwork is an in-process cluster network. Every node of the cluster binds its transport
/// on the same `LocalNetwork`.
///
/// Must be created from within a tokio runtime.
#[derive(Clone)]
pub struct LocalNetwork {
    client: ActorClient,
}

impl LocalNetwork {
    /// `election_delay` is how long the network goes without a live leader before electing one.
    pub fn new(logger: slog::Logger, election_delay: Duration) -> Self {
        let (client, actor) = actor::create(logger, EVENT_QUEUE_SIZE, election_delay);
        tokio::spawn(actor.run_event_loop());

        LocalNetwork { client }
    }

    pub async fn bind(&self, peer_id: PeerId) -> Result<LocalTransport, TransportError> {
        let binding = self.client.bind(peer_id.clone()).await?;

        Ok(LocalTransport {
            local_id: peer_id,
            binding,
            client: self.client.clone(),
        })
    }

    /// Partition `peer_id` away from every other node.
    pub async fn disconnect(&self, peer_id: &PeerId) -> Result<(), TransportError> {
        self.client.set_reachable(peer_id.clone(), false).await
    }

    pub async fn reconnect(&self, peer_id: &PeerId) -> Result<(), TransportError> {
        self.client.set_reachable(peer_id.clone(), true).await
    }
}

/// LocalTransport is one node's address on a `LocalNetwork`. Dropping it releases the address.
pub struct LocalTransport {
    local_id: PeerId,
    binding: BindingId,
    client: ActorClient,
}

impl LocalTransport {
    pub(super) async fn join(&self, roster: ServerRoster, sink: Arc<dyn MemberSink>) -> Result<(), EngineError> {
        self.client
            .join(JoinRequest {
                peer_id: self.local_id.clone(),
                binding: self.binding,
                roster,
                sink,
            })
            .await
    }

    pub(super) async fn propose(&self, data: Bytes) -> Result<Option<(Index, Term)>, EngineError> {
        self.client.propose(self.local_id.clone(), data).await
    }

    pub(super) async fn leave(&self) -> Result<(), EngineError> {
        self.client.leave(self.local_id.clone(), self.binding).await
    }
}

impl Transport for LocalTransport {
    fn local_id(&self) -> &PeerId {
        &self.local_id
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.client.unbind(self.local_id.clone(), self.binding);
    }
}
