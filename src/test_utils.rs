//! Test doubles shared by the unit tests.
use crate::engine::{
    commit_feed, CommitFeed, CommitFeedPublisher, Committed, ConsensusEngine, ConsensusLauncher, EngineConfig,
    EngineError, EngineRole, LeadershipView, Observation, Observer, ObserverId, ObserverRegistry,
};
use crate::peers::PeerId;
use crate::roster::ServerRoster;
use crate::state::ReplicatedState;
use crate::storage::{has_existing_state, DurableStores, EntryPayload, Index, LogEntry, Term};
use crate::transport::{Transport, TransportError};
use slog::Drain;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) fn create_test_logger() -> slog::Logger {
    let decorator = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();

    slog::Logger::root(drain, slog::o!())
}

#[derive(Copy, Clone, Debug)]
pub(crate) enum ProposeBehavior {
    /// Commit the value at the next index.
    Echo,
    /// Answer `Ok(None)`, as an engine does when leadership moved mid-call.
    NoValue,
    /// Commit, but leave the readable state as it was.
    CommitUnread,
    Fail,
}

struct MockState<V> {
    role: EngineRole,
    leader: Option<PeerId>,
    current: Option<Committed<V>>,
    next_index: u64,
    propose_behavior: ProposeBehavior,
    proposed: Vec<V>,
}

/// MockEngine is a scriptable engine. Leader changes made with `set_leader` are silent, like
/// engines that only report local role changes.
pub(crate) struct MockEngine<V> {
    local_id: PeerId,
    state: Mutex<MockState<V>>,
    observers: Mutex<ObserverRegistry>,
    feeds: Mutex<Vec<CommitFeedPublisher<V>>>,
    propose_calls: AtomicUsize,
    read_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
}

impl<V: ReplicatedState> MockEngine<V> {
    pub fn new(local_id: PeerId) -> Self {
        MockEngine {
            local_id,
            state: Mutex::new(MockState {
                role: EngineRole::Follower,
                leader: None,
                current: None,
                next_index: 1,
                propose_behavior: ProposeBehavior::Echo,
                proposed: Vec::new(),
            }),
            observers: Mutex::new(ObserverRegistry::new()),
            feeds: Mutex::new(Vec::new()),
            propose_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_role(&self, role: EngineRole) {
        self.state.lock().unwrap().role = role;
    }

    pub fn set_leader(&self, leader: Option<PeerId>) {
        self.state.lock().unwrap().leader = leader;
    }

    pub fn set_propose_behavior(&self, behavior: ProposeBehavior) {
        self.state.lock().unwrap().propose_behavior = behavior;
    }

    /// Applies `value` at the next index, as if replicated from a leader.
    pub fn set_current(&self, value: impl Into<V>) -> Committed<V> {
        let committed = {
            let mut state = self.state.lock().unwrap();
            let committed = Committed {
                index: Index::new(state.next_index),
                term: Term::new(1),
                value: value.into(),
            };
            state.next_index += 1;
            state.current = Some(committed.clone());
            committed
        };
        self.publish(committed.clone());

        committed
    }

    pub fn emit(&self, observation: Observation) {
        self.observers.lock().unwrap().notify_all(&observation);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    pub fn propose_calls(&self) -> usize {
        self.propose_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    pub fn proposed_values(&self) -> Vec<V> {
        self.state.lock().unwrap().proposed.clone()
    }

    fn publish(&self, committed: Committed<V>) {
        self.feeds
            .lock()
            .unwrap()
            .retain(|feed| feed.notify_commit(committed.clone()));
    }
}

impl<V: ReplicatedState> LeadershipView for MockEngine<V> {
    fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    fn role(&self) -> EngineRole {
        self.state.lock().unwrap().role
    }

    fn current_leader(&self) -> Option<PeerId> {
        self.state.lock().unwrap().leader.clone()
    }

    fn register_observer(&self, observer: Observer) -> ObserverId {
        self.observers.lock().unwrap().register(observer)
    }

    fn deregister_observer(&self, id: ObserverId) {
        self.observers.lock().unwrap().deregister(id);
    }
}

#[async_trait::async_trait]
impl<V: ReplicatedState> ConsensusEngine<V> for MockEngine<V> {
    async fn propose_and_commit(&self, value: V) -> Result<Option<Committed<V>>, EngineError> {
        self.propose_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = {
            let mut state = self.state.lock().unwrap();
            state.proposed.push(value.clone());
            state.propose_behavior
        };

        match behavior {
            ProposeBehavior::Echo => Ok(Some(self.set_current(value))),
            ProposeBehavior::NoValue => Ok(None),
            ProposeBehavior::CommitUnread => {
                let mut state = self.state.lock().unwrap();
                let committed = Committed {
                    index: Index::new(state.next_index),
                    term: Term::new(1),
                    value,
                };
                state.next_index += 1;
                Ok(Some(committed))
            }
            ProposeBehavior::Fail => Err(EngineError::QuorumUnavailable { live: 1, required: 2 }),
        }
    }

    async fn read_current_state(&self) -> Result<Option<Committed<V>>, EngineError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().current.clone())
    }

    fn subscribe(&self) -> CommitFeed<V> {
        let (publisher, feed) = commit_feed();
        self.feeds.lock().unwrap().push(publisher);

        feed
    }

    async fn shutdown(&self) {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.set_role(EngineRole::Shutdown);
        self.feeds.lock().unwrap().clear();
    }
}

pub(crate) struct MockTransport {
    local_id: PeerId,
}

impl Transport for MockTransport {
    fn local_id(&self) -> &PeerId {
        &self.local_id
    }
}

/// MockLauncher records what the bootstrapper asks of it. `bootstrap_cluster` writes a
/// configuration entry, so stores it bootstrapped count as initialized afterwards.
pub(crate) struct MockLauncher<V> {
    pub fail_bind: bool,
    pub fail_start: bool,
    pub reject_bootstrap: bool,
    pub leader_on_start: bool,
    bootstrap_calls: AtomicUsize,
    start_calls: AtomicUsize,
    roster: Mutex<Option<ServerRoster>>,
    _state: PhantomData<fn() -> V>,
}

impl<V> MockLauncher<V> {
    pub fn new() -> Self {
        MockLauncher {
            fail_bind: false,
            fail_start: false,
            reject_bootstrap: false,
            leader_on_start: true,
            bootstrap_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            roster: Mutex::new(None),
            _state: PhantomData,
        }
    }

    pub fn bootstrap_calls(&self) -> usize {
        self.bootstrap_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// The roster handed to the most recent `start`.
    pub fn roster(&self) -> Option<ServerRoster> {
        self.roster.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl<V: ReplicatedState> ConsensusLauncher<V> for MockLauncher<V> {
    type Transport = MockTransport;
    type Engine = MockEngine<V>;

    async fn bind_transport(&self, local_id: &PeerId) -> Result<MockTransport, TransportError> {
        if self.fail_bind {
            return Err(TransportError::AddressInUse(local_id.clone()));
        }

        Ok(MockTransport {
            local_id: local_id.clone(),
        })
    }

    async fn bootstrap_cluster(
        &self,
        config: &EngineConfig,
        stores: &DurableStores,
        _transport: &MockTransport,
    ) -> Result<(), EngineError> {
        self.bootstrap_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_bootstrap || has_existing_state(&*stores.log, &*stores.snapshots)? {
            return Err(EngineError::AlreadyBootstrapped);
        }

        let entry = LogEntry {
            index: Index::start_index(),
            term: Term::new(1),
            payload: EntryPayload::Configuration(config.roster.clone()),
        };
        stores.log.append(entry.encode()?)?;

        Ok(())
    }

    async fn start(
        &self,
        config: EngineConfig,
        _stores: DurableStores,
        transport: MockTransport,
    ) -> Result<MockEngine<V>, EngineError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(EngineError::NotInConfiguration(transport.local_id));
        }

        *self.roster.lock().unwrap() = Some(config.roster);
        let engine = MockEngine::new(config.local_id.clone());
        if self.leader_on_start {
            engine.set_role(EngineRole::Leader);
            engine.set_leader(Some(config.local_id));
        }

        Ok(engine)
    }
}
