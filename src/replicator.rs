use crate::engine::{Committed, ConsensusEngine, EngineError};
use crate::monitor::{wait_for_leader, WaitForLeaderError};
use crate::state::{ReplicatedState, StateSource};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// ReplicationFault is a failed tick. It is logged and the next tick tries again.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationFault {
    #[error("failed to commit or read state: {0}")]
    TransientCommitFailure(#[source] EngineError),

    /// The engine answered without a value; leadership moved while the call was in flight or
    /// nothing has been committed yet.
    #[error("no state returned; leadership changed or nothing committed yet")]
    LeadershipRace,
}

/// The result of one replication tick.
#[derive(Debug)]
pub enum TickOutcome<V> {
    /// The leader's proposal committed.
    Proposed(Committed<V>),
    /// Current state as read on this node.
    Read(Committed<V>),
    Fault(ReplicationFault),
}

/// StateReplicator drives the replicated state: on the leader it proposes a fresh value each
/// tick, on every node it reads back the agreed state.
pub struct StateReplicator<V, E, S> {
    logger: slog::Logger,
    engine: Arc<E>,
    source: S,
    interval: Duration,
    leader_wait_timeout: Duration,
    leader_poll_interval: Duration,
    _state: PhantomData<fn() -> V>,
}

impl<V, E, S> StateReplicator<V, E, S>
where
    V: ReplicatedState,
    E: ConsensusEngine<V>,
    S: StateSource<V>,
{
    pub fn new(
        logger: slog::Logger,
        engine: Arc<E>,
        source: S,
        interval: Duration,
        leader_wait_timeout: Duration,
        leader_poll_interval: Duration,
    ) -> Self {
        StateReplicator {
            logger,
            engine,
            source,
            interval,
            leader_wait_timeout,
            leader_poll_interval,
            _state: PhantomData,
        }
    }

    /// Waits for a leader, then ticks every `interval` until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        match wait_for_leader(
            &*self.engine,
            self.leader_wait_timeout,
            self.leader_poll_interval,
            &cancel,
            &self.logger,
        )
        .await
        {
            Ok(_) => {}
            Err(WaitForLeaderError::Cancelled) => return,
            Err(e @ WaitForLeaderError::Timeout { .. }) => {
                slog::warn!(self.logger, "{}", e);
                slog::warn!(self.logger, "Current role: {}", self.engine.role());
                slog::warn!(self.logger, "Current leader: {:?}", self.engine.current_leader());
            }
        }

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        slog::info!(self.logger, "State replicator has exited");
    }

    /// One round: propose (leader only), then read the current state. On the leader the read is
    /// only logged; the outcome is the proposal's commit.
    pub async fn tick(&mut self) -> TickOutcome<V> {
        let leader = self.engine.is_leader();
        if leader {
            slog::info!(self.logger, "I am the leader");
        } else {
            slog::info!(self.logger, "I am not the leader");
        }
        slog::info!(self.logger, "Engine role: {}", self.engine.role());

        let proposed = if leader {
            match self.propose().await {
                Ok(committed) => Some(committed),
                Err(fault) => {
                    slog::warn!(self.logger, "Proposal failed: {}", fault);
                    return TickOutcome::Fault(fault);
                }
            }
        } else {
            None
        };

        let read = self.read().await;
        if let Err(fault) = &read {
            slog::warn!(self.logger, "Read failed: {}", fault);
        }

        match (proposed, read) {
            (Some(committed), _) => TickOutcome::Proposed(committed),
            (None, Ok(committed)) => TickOutcome::Read(committed),
            (None, Err(fault)) => TickOutcome::Fault(fault),
        }
    }

    async fn propose(&mut self) -> Result<Committed<V>, ReplicationFault> {
        let value = self.source.next_state();
        let committed = self
            .engine
            .propose_and_commit(value)
            .await
            .map_err(ReplicationFault::TransientCommitFailure)?
            .ok_or(ReplicationFault::LeadershipRace)?;
        slog::debug!(self.logger, "Committed {:?} at index {}", committed.value, committed.index);

        Ok(committed)
    }

    async fn read(&mut self) -> Result<Committed<V>, ReplicationFault> {
        let current = self
            .engine
            .read_current_state()
            .await
            .map_err(ReplicationFault::TransientCommitFailure)?
            .ok_or(ReplicationFault::LeadershipRace)?;
        slog::info!(self.logger, "Current state: {:?} (index {})", current.value, current.index);

        Ok(current)
    }
}
