use crate::engine::{EngineRole, LeadershipView, Observation, Observer, ObserverId};
use crate::peers::PeerId;
use tokio::sync::mpsc;
use tokio::time::{self, Duration, Instant};
use tokio_util::sync::CancellationToken;

const OBSERVER_BUFFER_SIZE: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum WaitForLeaderError {
    #[error("timed out after {waited:?} waiting for a leader")]
    Timeout { waited: Duration },

    #[error("cancelled while waiting for a leader")]
    Cancelled,
}

/// What woke the monitor up.
#[derive(Debug)]
enum LeadershipObservation {
    RoleChanged(EngineRole),
    Timeout,
    HeartbeatTick,
}

/// Deregisters the observer on every exit path.
struct ObserverGuard<'a, E: LeadershipView + ?Sized> {
    engine: &'a E,
    id: ObserverId,
}

impl<'a, E: LeadershipView + ?Sized> ObserverGuard<'a, E> {
    fn register(engine: &'a E, observer: Observer) -> Self {
        let id = engine.register_observer(observer);
        ObserverGuard { engine, id }
    }
}

impl<'a, E: LeadershipView + ?Sized> Drop for ObserverGuard<'a, E> {
    fn drop(&mut self) {
        self.engine.deregister_observer(self.id);
    }
}

/// Blocks until the engine knows of a leader, up to `timeout`.
///
/// Engines may only emit an observation when the local role changes, and not when some other
/// node becomes leader, so observations are complemented by polling `current_leader()` every
/// `poll_interval`.
pub async fn wait_for_leader<E: LeadershipView + ?Sized>(
    engine: &E,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
    logger: &slog::Logger,
) -> Result<PeerId, WaitForLeaderError> {
    let (observer, mut observations) = Observer::channel(OBSERVER_BUFFER_SIZE);
    // Register before the first check, so a change in between is not missed.
    let _guard = ObserverGuard::register(engine, observer);

    if let Some(leader) = engine.current_leader() {
        return Ok(leader);
    }

    let start = Instant::now();
    let deadline = start + timeout;
    let mut ticker = time::interval_at(start + poll_interval, poll_interval);
    let mut feed_open = true;

    loop {
        let observation = tokio::select! {
            _ = cancel.cancelled() => return Err(WaitForLeaderError::Cancelled),
            _ = time::sleep_until(deadline) => LeadershipObservation::Timeout,
            _ = ticker.tick() => LeadershipObservation::HeartbeatTick,
            received = next_role_change(&mut observations), if feed_open => match received {
                Some(role) => LeadershipObservation::RoleChanged(role),
                None => {
                    feed_open = false;
                    continue;
                }
            },
        };
        slog::debug!(logger, "Waiting for leader: {:?}", observation);

        if let Some(leader) = engine.current_leader() {
            slog::info!(logger, "Leader is {}", leader);
            return Ok(leader);
        }

        if let LeadershipObservation::Timeout = observation {
            return Err(WaitForLeaderError::Timeout {
                waited: start.elapsed(),
            });
        }
    }
}

// Reachability observations are of no interest here.
async fn next_role_change(observations: &mut mpsc::Receiver<Observation>) -> Option<EngineRole> {
    loop {
        match observations.recv().await? {
            Observation::RoleChanged(role) => return Some(role),
            Observation::PeerReachability { .. } => continue,
        }
    }
}
