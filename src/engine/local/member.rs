use crate::engine::{
    commit_feed, CommitFeed, CommitFeedPublisher, Committed, EngineError, EngineRole, Observation, Observer,
    ObserverId, ObserverRegistry,
};
use crate::peers::PeerId;
use crate::state::ReplicatedState;
use crate::storage::{DurableStores, EntryPayload, Index, LogEntry, LogStore, Snapshot, Term};
use std::io;
use std::sync::Mutex;

/// MemberSink is how the network drives a single member: replicate entries into it and tell it
/// about its role.
pub(super) trait MemberSink: Send + Sync {
    fn last_index(&self) -> Option<Index>;

    fn read(&self, index: Index) -> Result<Option<LogEntry>, EngineError>;

    /// Persist `entry` (unless it is already persisted) and apply it.
    fn apply(&self, entry: &LogEntry) -> Result<(), EngineError>;

    fn latest_snapshot(&self) -> Result<Option<Snapshot>, EngineError>;

    /// Replace everything up to and including `snapshot.index` with the snapshot. A no-op if this
    /// member has already applied that far.
    fn install(&self, snapshot: &Snapshot) -> Result<(), EngineError>;

    fn update_role(&self, role: EngineRole, leader: Option<PeerId>, term: Term);

    fn notify(&self, observation: Observation);
}

struct MemberView<V> {
    role: EngineRole,
    leader: Option<PeerId>,
    term: Term,
    current: Option<Committed<V>>,
    applied_since_snapshot: u64,
}

/// MemberState is one node's view of the cluster: its durable stores, the value it has applied
/// last, and who it believes the leader is.
pub(super) struct MemberState<V> {
    logger: slog::Logger,
    stores: DurableStores,
    snapshot_interval: u64,
    view: Mutex<MemberView<V>>,
    observers: Mutex<ObserverRegistry>,
    feeds: Mutex<Vec<CommitFeedPublisher<V>>>,
}

impl<V: ReplicatedState> MemberState<V> {
    /// Rebuild the last applied value from the newest snapshot plus whatever the log holds after
    /// it.
    pub fn restore(logger: slog::Logger, stores: DurableStores, snapshot_interval: u64) -> Result<Self, EngineError> {
        let mut current = None;
        let mut term = Term::default();
        let mut next = Index::start_index();

        if let Some(snapshot) = stores.snapshots.latest()? {
            current = Some(Committed {
                index: snapshot.index,
                term: snapshot.term,
                value: serde_json::from_slice(&snapshot.data)?,
            });
            term = snapshot.term;
            next = snapshot.index.plus(1);

            // The log lost entries the snapshot covers. New entries go after the snapshot.
            if stores.log.next_index() < next {
                slog::warn!(
                    logger,
                    "Log ends at {:?}, before snapshot index {}; continuing after the snapshot",
                    stores.log.last_index(),
                    snapshot.index
                );
                stores.log.reset(next)?;
            }
        }

        let mut applied_since_snapshot = 0;
        while next < stores.log.next_index() {
            if let Some(entry) = read_entry(&*stores.log, next)? {
                term = term.max(entry.term);
                if let EntryPayload::Command(data) = &entry.payload {
                    current = Some(Committed {
                        index: entry.index,
                        term: entry.term,
                        value: serde_json::from_slice(data)?,
                    });
                    applied_since_snapshot += 1;
                }
            }
            next = next.plus(1);
        }

        slog::info!(
            logger,
            "Restored state at index {:?} (term {})",
            current.as_ref().map(|c: &Committed<V>| c.index),
            term
        );

        Ok(MemberState {
            logger,
            stores,
            snapshot_interval: snapshot_interval.max(1),
            view: Mutex::new(MemberView {
                role: EngineRole::Follower,
                leader: None,
                term,
                current,
                applied_since_snapshot,
            }),
            observers: Mutex::new(ObserverRegistry::new()),
            feeds: Mutex::new(Vec::new()),
        })
    }

    pub fn role(&self) -> EngineRole {
        self.view.lock().expect("MemberState.role() mutex guard poison").role
    }

    pub fn leader(&self) -> Option<PeerId> {
        self.view
            .lock()
            .expect("MemberState.leader() mutex guard poison")
            .leader
            .clone()
    }

    pub fn current(&self) -> Option<Committed<V>> {
        self.view
            .lock()
            .expect("MemberState.current() mutex guard poison")
            .current
            .clone()
    }

    pub fn subscribe(&self) -> CommitFeed<V> {
        let (publisher, feed) = commit_feed();
        self.feeds
            .lock()
            .expect("MemberState.subscribe() mutex guard poison")
            .push(publisher);

        feed
    }

    pub fn register_observer(&self, observer: Observer) -> ObserverId {
        self.observers
            .lock()
            .expect("MemberState.register_observer() mutex guard poison")
            .register(observer)
    }

    pub fn deregister_observer(&self, id: ObserverId) {
        self.observers
            .lock()
            .expect("MemberState.deregister_observer() mutex guard poison")
            .deregister(id);
    }

    fn publish(&self, committed: Committed<V>) {
        self.feeds
            .lock()
            .expect("MemberState.publish() mutex guard poison")
            .retain(|feed| feed.notify_commit(committed.clone()));
    }

    fn take_snapshot(&self, entry: &LogEntry, data: &[u8]) {
        let snapshot = Snapshot {
            index: entry.index,
            term: entry.term,
            data: data.to_vec(),
        };

        // Disk interaction is synchronous, like the rest of the sequencer's event handling.
        match self.stores.snapshots.create(snapshot) {
            Ok(()) => slog::debug!(self.logger, "Took snapshot at index {}", entry.index),
            Err(e) => slog::error!(self.logger, "Failed to take snapshot at index {}: {}", entry.index, e),
        }
    }
}

impl<V: ReplicatedState> MemberSink for MemberState<V> {
    fn last_index(&self) -> Option<Index> {
        self.stores.log.last_index()
    }

    fn read(&self, index: Index) -> Result<Option<LogEntry>, EngineError> {
        read_entry(&*self.stores.log, index)
    }

    fn apply(&self, entry: &LogEntry) -> Result<(), EngineError> {
        let next_index = self.stores.log.next_index();
        if entry.index == next_index {
            self.stores.log.append(entry.encode()?)?;
        } else if entry.index > next_index {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("log gap: next index is {}, got entry {}", next_index, entry.index),
            )
            .into());
        }

        let data = match &entry.payload {
            EntryPayload::Command(data) => data,
            EntryPayload::Configuration(_) => return Ok(()),
        };
        let committed = Committed {
            index: entry.index,
            term: entry.term,
            value: serde_json::from_slice::<V>(data)?,
        };

        let snapshot_due = {
            let mut view = self.view.lock().expect("MemberState.apply() mutex guard poison");
            if matches!(&view.current, Some(c) if c.index >= entry.index) {
                return Ok(());
            }
            view.current = Some(committed.clone());
            view.applied_since_snapshot += 1;
            if view.applied_since_snapshot >= self.snapshot_interval {
                view.applied_since_snapshot = 0;
                true
            } else {
                false
            }
        };

        if snapshot_due {
            self.take_snapshot(entry, data);
        }
        self.publish(committed);

        Ok(())
    }

    fn latest_snapshot(&self) -> Result<Option<Snapshot>, EngineError> {
        Ok(self.stores.snapshots.latest()?)
    }

    fn install(&self, snapshot: &Snapshot) -> Result<(), EngineError> {
        let committed = Committed {
            index: snapshot.index,
            term: snapshot.term,
            value: serde_json::from_slice::<V>(&snapshot.data)?,
        };

        {
            let mut view = self.view.lock().expect("MemberState.install() mutex guard poison");
            if matches!(&view.current, Some(c) if c.index >= snapshot.index) {
                return Ok(());
            }
            self.stores.snapshots.create(snapshot.clone())?;
            self.stores.log.reset(snapshot.index.plus(1))?;
            view.current = Some(committed.clone());
            view.term = view.term.max(snapshot.term);
            view.applied_since_snapshot = 0;
        }

        slog::info!(self.logger, "Installed snapshot at index {}", snapshot.index);
        self.publish(committed);

        Ok(())
    }

    fn update_role(&self, role: EngineRole, leader: Option<PeerId>, term: Term) {
        let changed = {
            let mut view = self.view.lock().expect("MemberState.update_role() mutex guard poison");
            let changed = view.role != role;
            view.role = role;
            view.leader = leader;
            view.term = term;
            changed
        };

        if !changed {
            return;
        }

        slog::info!(self.logger, "Role changed to {} (term {})", role, term);
        self.notify(Observation::RoleChanged(role));
        if role == EngineRole::Shutdown {
            // Ends every feed.
            self.feeds
                .lock()
                .expect("MemberState.update_role() mutex guard poison")
                .clear();
        }
    }

    fn notify(&self, observation: Observation) {
        let missed = {
            let mut observers = self.observers.lock().expect("MemberState.notify() mutex guard poison");
            let before = observers.dropped();
            observers.notify_all(&observation);
            observers.dropped() - before
        };

        if missed > 0 {
            slog::debug!(self.logger, "{} observer(s) were full and missed {:?}", missed, observation);
        }
    }
}

fn read_entry(log: &dyn LogStore, index: Index) -> Result<Option<LogEntry>, EngineError> {
    match log.read(index)? {
        Some(bytes) => Ok(Some(LogEntry::decode(&bytes)?)),
        None => Ok(None),
    }
}
