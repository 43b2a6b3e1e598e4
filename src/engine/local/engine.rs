use crate::engine::local::member::{MemberSink, MemberState};
use crate::engine::local::network::{LocalNetwork, LocalTransport};
use crate::engine::{
    CommitFeed, Committed, ConsensusEngine, ConsensusLauncher, EngineConfig, EngineError, EngineRole, LeadershipView,
    Observer, ObserverId,
};
use crate::peers::PeerId;
use crate::state::ReplicatedState;
use crate::storage::{has_existing_state, DurableStores, EntryPayload, Index, LogEntry, Term};
use crate::transport::{Transport, TransportError};
use bytes::Bytes;
use std::marker::PhantomData;
use std::sync::Arc;

/// LocalEngine is a started node on a `LocalNetwork`.
pub struct LocalEngine<V> {
    logger: slog::Logger,
    transport: LocalTransport,
    member: Arc<MemberState<V>>,
}

impl<V: ReplicatedState> LeadershipView for LocalEngine<V> {
    fn local_id(&self) -> &PeerId {
        self.transport.local_id()
    }

    fn role(&self) -> EngineRole {
        self.member.role()
    }

    fn current_leader(&self) -> Option<PeerId> {
        self.member.leader()
    }

    fn register_observer(&self, observer: Observer) -> ObserverId {
        self.member.register_observer(observer)
    }

    fn deregister_observer(&self, id: ObserverId) {
        self.member.deregister_observer(id)
    }
}

#[async_trait::async_trait]
impl<V: ReplicatedState> ConsensusEngine<V> for LocalEngine<V> {
    async fn propose_and_commit(&self, value: V) -> Result<Option<Committed<V>>, EngineError> {
        if self.role() == EngineRole::Shutdown {
            return Err(EngineError::Shutdown);
        }

        let data = Bytes::from(serde_json::to_vec(&value)?);
        let accepted = self.transport.propose(data).await?;

        Ok(accepted.map(|(index, term)| Committed { index, term, value }))
    }

    async fn read_current_state(&self) -> Result<Option<Committed<V>>, EngineError> {
        if self.role() == EngineRole::Shutdown {
            return Err(EngineError::Shutdown);
        }

        Ok(self.member.current())
    }

    fn subscribe(&self) -> CommitFeed<V> {
        self.member.subscribe()
    }

    async fn shutdown(&self) {
        if let Err(e) = self.transport.leave().await {
            slog::warn!(self.logger, "Failed to leave the network cleanly: {}", e);
        }

        // No-op when the network already demoted us.
        let term = self.member.current().map_or_else(Term::default, |c| c.term);
        self.member.update_role(EngineRole::Shutdown, None, term);
    }
}

/// LocalLauncher starts nodes on a `LocalNetwork`.
pub struct LocalLauncher<V> {
    network: LocalNetwork,
    logger: slog::Logger,
    _state: PhantomData<fn() -> V>,
}

impl<V> LocalLauncher<V> {
    pub fn new(network: LocalNetwork, logger: slog::Logger) -> Self {
        LocalLauncher {
            network,
            logger,
            _state: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<V: ReplicatedState> ConsensusLauncher<V> for LocalLauncher<V> {
    type Transport = LocalTransport;
    type Engine = LocalEngine<V>;

    async fn bind_transport(&self, local_id: &PeerId) -> Result<LocalTransport, TransportError> {
        self.network.bind(local_id.clone()).await
    }

    async fn bootstrap_cluster(
        &self,
        config: &EngineConfig,
        stores: &DurableStores,
        _transport: &LocalTransport,
    ) -> Result<(), EngineError> {
        if has_existing_state(&*stores.log, &*stores.snapshots)? {
            return Err(EngineError::AlreadyBootstrapped);
        }
        if !config.roster.contains(&config.local_id) {
            return Err(EngineError::NotInConfiguration(config.local_id.clone()));
        }

        let entry = LogEntry {
            index: Index::start_index(),
            term: Term::new(1),
            payload: EntryPayload::Configuration(config.roster.clone()),
        };
        stores.log.append(entry.encode()?)?;
        slog::info!(
            self.logger,
            "{} bootstrapped a cluster of {} servers",
            config.local_id,
            config.roster.len()
        );

        Ok(())
    }

    async fn start(
        &self,
        config: EngineConfig,
        stores: DurableStores,
        transport: LocalTransport,
    ) -> Result<LocalEngine<V>, EngineError> {
        if !config.roster.contains(&config.local_id) {
            return Err(EngineError::NotInConfiguration(config.local_id));
        }

        let logger = self.logger.new(slog::o!("peer" => config.local_id.to_string()));
        let member = Arc::new(MemberState::restore(logger.clone(), stores, config.snapshot_interval)?);
        transport.join(config.roster, member.clone()).await?;

        Ok(LocalEngine {
            logger,
            transport,
            member,
        })
    }
}
