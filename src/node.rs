use crate::engine::{Committed, ConsensusEngine, EngineError, EngineRole, LeadershipView};
use crate::notifier::{ChangeNotifier, Subscription};
use crate::peers::PeerId;
use crate::roster::ServerRoster;
use crate::state::ReplicatedState;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// ClusterNode is a running member of the cluster: the engine plus the background tasks that
/// replicate and publish state. Dropping it without `shutdown()` leaves the tasks running.
pub struct ClusterNode<V, E> {
    logger: slog::Logger,
    roster: ServerRoster,
    engine: Arc<E>,
    notifier: ChangeNotifier<V>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl<V, E> ClusterNode<V, E>
where
    V: ReplicatedState,
    E: ConsensusEngine<V>,
{
    pub(crate) fn new(
        logger: slog::Logger,
        roster: ServerRoster,
        engine: Arc<E>,
        notifier: ChangeNotifier<V>,
        cancel: CancellationToken,
        tasks: Vec<JoinHandle<()>>,
    ) -> Self {
        ClusterNode {
            logger,
            roster,
            engine,
            notifier,
            cancel,
            tasks,
        }
    }

    pub fn local_id(&self) -> &PeerId {
        self.engine.local_id()
    }

    /// The configuration this node was bootstrapped with.
    pub fn roster(&self) -> &ServerRoster {
        &self.roster
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn is_leader(&self) -> bool {
        self.engine.is_leader()
    }

    pub fn role(&self) -> EngineRole {
        self.engine.role()
    }

    pub fn current_leader(&self) -> Option<PeerId> {
        self.engine.current_leader()
    }

    pub async fn read_current_state(&self) -> Result<Option<Committed<V>>, EngineError> {
        self.engine.read_current_state().await
    }

    /// Subscribe to state changes. Each subscription sees the latest state, not every state.
    pub fn subscribe(&self) -> Subscription<V> {
        self.notifier.subscribe()
    }

    /// Stops the background tasks, then the engine.
    pub async fn shutdown(self) {
        slog::info!(self.logger, "Shutting down");
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                slog::error!(self.logger, "Background task failed: {}", e);
            }
        }

        self.engine.shutdown().await;
        slog::info!(self.logger, "Shut down");
    }
}

impl<V, E: LeadershipView> fmt::Debug for ClusterNode<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterNode")
            .field("local_id", self.engine.local_id())
            .field("roster", &self.roster)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
