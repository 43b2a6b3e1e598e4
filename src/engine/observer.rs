use crate::engine::EngineRole;
use crate::peers::PeerId;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// An event observed by the local engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Observation {
    /// The local node's role changed. Engines are not required to emit anything when only the
    /// identity of the cluster leader changes.
    RoleChanged(EngineRole),
    PeerReachability { peer_id: PeerId, reachable: bool },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ObserverId(u64);

/// Observer is a non-blocking observation sink. When its buffer is full, observations are
/// dropped rather than stalling the engine.
#[derive(Clone)]
pub struct Observer {
    sender: mpsc::Sender<Observation>,
}

impl Observer {
    pub fn channel(buffer_size: usize) -> (Observer, mpsc::Receiver<Observation>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));

        (Observer { sender: tx }, rx)
    }

    /// Returns false if the observation was dropped.
    pub fn notify(&self, observation: Observation) -> bool {
        self.sender.try_send(observation).is_ok()
    }
}

/// ObserverRegistry is the bookkeeping an engine needs to support `register_observer` and
/// `deregister_observer`.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: u64,
    observers: HashMap<ObserverId, Observer>,
    dropped: u64,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        ObserverRegistry::default()
    }

    pub fn register(&mut self, observer: Observer) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.insert(id, observer);

        id
    }

    pub fn deregister(&mut self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    pub fn notify_all(&mut self, observation: &Observation) {
        for observer in self.observers.values() {
            if !observer.notify(observation.clone()) {
                self.dropped += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Number of observations that could not be delivered.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
