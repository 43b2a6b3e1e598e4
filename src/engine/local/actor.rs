use crate::engine::local::member::MemberSink;
use crate::engine::{EngineError, EngineRole, Observation};
use crate::peers::PeerId;
use crate::roster::ServerRoster;
use crate::storage::{EntryPayload, Index, LogEntry, Snapshot, Term};
use crate::transport::TransportError;
use bytes::Bytes;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};

pub(super) fn create(logger: slog::Logger, buffer_size: usize, election_delay: Duration) -> (ActorClient, ClusterActor) {
    let (tx, rx) = mpsc::channel(buffer_size);
    let client = ActorClient { sender: tx };
    let actor = ClusterActor {
        logger,
        receiver: rx,
        election_delay,
        election_deadline: None,
        next_binding: 0,
        bindings: HashMap::new(),
        roster: None,
        members: BTreeMap::new(),
        base: None,
        log: Vec::new(),
        term: Term::default(),
        leader: None,
    };

    (client, actor)
}

/// BindingId tells apart successive bindings of the same address, so a stale transport being
/// dropped can't release an address that a restarted node has bound since.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(super) struct BindingId(u64);

pub(super) struct JoinRequest {
    pub(super) peer_id: PeerId,
    pub(super) binding: BindingId,
    pub(super) roster: ServerRoster,
    pub(super) sink: Arc<dyn MemberSink>,
}

enum Event {
    Bind(PeerId, Callback<BindingId, TransportError>),

    // Sent when a transport is dropped. Also removes the member if it joined.
    Unbind(PeerId, BindingId),

    // Adopt any committed entries the member has that the network doesn't (previous incarnation
    // of the network), then catch the member up to the network's log.
    Join(JoinRequest, Callback<(), EngineError>),

    // Member stops participating and releases its address.
    Leave(PeerId, BindingId, Callback<(), EngineError>),

    // Leader: commit if quorum is live, then answer with the entry's position.
    // Anyone else: answer with None.
    Propose(PeerId, Bytes, Callback<Option<(Index, Term)>, EngineError>),

    SetReachable(PeerId, bool, Callback<(), TransportError>),
}

struct Callback<O, E>(oneshot::Sender<Result<O, E>>);

impl<O, E> Callback<O, E> {
    fn send(self, message: Result<O, E>) {
        let _ = self.0.send(message);
    }
}

#[derive(Clone)]
pub(super) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

impl ActorClient {
    pub async fn bind(&self, peer_id: PeerId) -> Result<BindingId, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Bind(peer_id, Callback(tx))).await?;

        rx.await.map_err(|_| TransportError::NetworkClosed)?
    }

    /// Best effort. Returns false if the network is gone or its queue is full.
    pub fn unbind(&self, peer_id: PeerId, binding: BindingId) -> bool {
        self.sender.try_send(Event::Unbind(peer_id, binding)).is_ok()
    }

    pub async fn join(&self, request: JoinRequest) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Join(request, Callback(tx))).await?;

        rx.await.map_err(|_| TransportError::NetworkClosed)?
    }

    pub async fn leave(&self, peer_id: PeerId, binding: BindingId) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Leave(peer_id, binding, Callback(tx))).await?;

        rx.await.map_err(|_| TransportError::NetworkClosed)?
    }

    pub async fn propose(&self, peer_id: PeerId, data: Bytes) -> Result<Option<(Index, Term)>, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Propose(peer_id, data, Callback(tx))).await?;

        rx.await.map_err(|_| TransportError::NetworkClosed)?
    }

    pub async fn set_reachable(&self, peer_id: PeerId, reachable: bool) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::SetReachable(peer_id, reachable, Callback(tx))).await?;

        rx.await.map_err(|_| TransportError::NetworkClosed)?
    }

    async fn send(&self, event: Event) -> Result<(), TransportError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| TransportError::NetworkClosed)
    }
}

struct Member {
    sink: Arc<dyn MemberSink>,
    reachable: bool,
    applied: Option<Index>,
}

/// ClusterActor sequences everything that happens on a local network: bindings, membership,
/// elections and commits. It owns the authoritative copy of the committed log.
///
/// The log may start after a snapshot (`base`) when the network was formed from members that
/// restored from snapshots. Members behind the snapshot get it installed before any entries.
pub(super) struct ClusterActor {
    logger: slog::Logger,
    receiver: mpsc::Receiver<Event>,
    election_delay: Duration,
    election_deadline: Option<Instant>,
    next_binding: u64,
    bindings: HashMap<PeerId, BindingId>,
    roster: Option<ServerRoster>,
    members: BTreeMap<PeerId, Member>,
    base: Option<Snapshot>,
    // log[0] is the entry right after `base`.
    log: Vec<LogEntry>,
    term: Term,
    leader: Option<PeerId>,
}

impl ClusterActor {
    pub async fn run_event_loop(mut self) {
        loop {
            let election = sleep_until(self.election_deadline);
            tokio::select! {
                event = self.receiver.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = election => {
                    self.election_deadline = None;
                    self.run_election();
                    self.schedule_election_if_leaderless();
                }
            }
        }

        slog::info!(self.logger, "Local network event loop has exited");
    }

    // This must NOT be async.
    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Bind(peer_id, callback) => {
                callback.send(self.bind(peer_id));
            }
            Event::Unbind(peer_id, binding) => {
                self.unbind(&peer_id, binding);
            }
            Event::Join(request, callback) => {
                let result = self.join(request);
                callback.send(result);
            }
            Event::Leave(peer_id, binding, callback) => {
                self.unbind(&peer_id, binding);
                callback.send(Ok(()));
            }
            Event::Propose(peer_id, data, callback) => {
                let result = self.propose(&peer_id, data);
                callback.send(result);
            }
            Event::SetReachable(peer_id, reachable, callback) => {
                let result = self.set_reachable(&peer_id, reachable);
                callback.send(result);
            }
        }

        self.schedule_election_if_leaderless();
    }

    fn bind(&mut self, peer_id: PeerId) -> Result<BindingId, TransportError> {
        if self.bindings.contains_key(&peer_id) {
            return Err(TransportError::AddressInUse(peer_id));
        }

        let binding = BindingId(self.next_binding);
        self.next_binding += 1;
        slog::debug!(self.logger, "Bound {}", peer_id);
        self.bindings.insert(peer_id, binding);

        Ok(binding)
    }

    fn unbind(&mut self, peer_id: &PeerId, binding: BindingId) {
        if self.bindings.get(peer_id) != Some(&binding) {
            return;
        }

        self.bindings.remove(peer_id);
        slog::debug!(self.logger, "Unbound {}", peer_id);
        self.remove_member(peer_id);
    }

    fn join(&mut self, request: JoinRequest) -> Result<(), EngineError> {
        let JoinRequest {
            peer_id,
            binding,
            roster,
            sink,
        } = request;

        if self.bindings.get(&peer_id) != Some(&binding) {
            return Err(TransportError::Unreachable(peer_id).into());
        }

        if self.roster.is_none() {
            slog::info!(self.logger, "Cluster configuration has {} servers", roster.len());
            self.roster = Some(roster);
        }
        if !self.roster.as_ref().map_or(false, |r| r.contains(&peer_id)) {
            return Err(EngineError::NotInConfiguration(peer_id));
        }

        self.adopt_log_tail(&*sink)?;
        let applied = sink.last_index();
        self.members.insert(
            peer_id.clone(),
            Member {
                sink,
                reachable: true,
                applied,
            },
        );
        slog::info!(self.logger, "{} joined at index {:?}", peer_id, applied);

        self.catch_up(&peer_id)?;
        self.refresh_role(&peer_id);
        self.broadcast_reachability(&peer_id, true);

        Ok(())
    }

    // A member may have committed entries from a previous run that this network has never seen.
    fn adopt_log_tail(&mut self, sink: &dyn MemberSink) -> Result<(), EngineError> {
        let last = match sink.last_index() {
            Some(index) => index,
            None => return Ok(()),
        };

        let mut next = self.next_index();
        while next <= last {
            let entry = match sink.read(next)? {
                Some(entry) => entry,
                None => {
                    self.rebase(sink, next)?;
                    next = self.next_index();
                    continue;
                }
            };
            self.term = self.term.max(entry.term);
            self.log.push(entry);
            next = next.plus(1);
        }

        Ok(())
    }

    // The member no longer has the entry at `missing` in its log; only its snapshot covers it.
    fn rebase(&mut self, sink: &dyn MemberSink, missing: Index) -> Result<(), EngineError> {
        let snapshot = match sink.latest_snapshot()? {
            Some(snapshot) if snapshot.index >= missing => snapshot,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("missing log entry at index {}", missing),
                )
                .into())
            }
        };

        slog::info!(
            self.logger,
            "Log continues from snapshot at index {} (term {})",
            snapshot.index,
            snapshot.term
        );
        self.log.retain(|entry| entry.index > snapshot.index);
        self.term = self.term.max(snapshot.term);
        self.base = Some(snapshot);

        Ok(())
    }

    fn base_index(&self) -> u64 {
        self.base.as_ref().map_or(0, |snapshot| snapshot.index.as_u64())
    }

    fn next_index(&self) -> Index {
        Index::new(self.base_index() + self.log.len() as u64 + 1)
    }

    fn last_index(&self) -> Option<Index> {
        self.next_index().checked_minus(1)
    }

    fn remove_member(&mut self, peer_id: &PeerId) {
        let member = match self.members.remove(peer_id) {
            Some(member) => member,
            None => return,
        };

        member.sink.update_role(EngineRole::Shutdown, None, self.term);
        slog::info!(self.logger, "{} left the cluster", peer_id);
        self.broadcast_reachability(peer_id, false);

        if self.leader.as_ref() == Some(peer_id) {
            self.step_down_leader();
        }
    }

    fn propose(&mut self, peer_id: &PeerId, data: Bytes) -> Result<Option<(Index, Term)>, EngineError> {
        if !self.is_live(peer_id) {
            return Err(TransportError::Unreachable(peer_id.clone()).into());
        }
        if self.leader.as_ref() != Some(peer_id) {
            slog::debug!(self.logger, "Ignoring proposal from non-leader {}", peer_id);
            return Ok(None);
        }

        let (live, required) = self.voter_quorum();
        if live < required {
            return Err(EngineError::QuorumUnavailable { live, required });
        }

        let index = self.next_index();
        self.log.push(LogEntry {
            index,
            term: self.term,
            payload: EntryPayload::Command(data),
        });

        // The proposer has to apply it before it hears back.
        self.catch_up(peer_id)?;
        self.catch_up_all();

        Ok(Some((index, self.term)))
    }

    fn set_reachable(&mut self, peer_id: &PeerId, reachable: bool) -> Result<(), TransportError> {
        let member = self
            .members
            .get_mut(peer_id)
            .ok_or_else(|| TransportError::Unreachable(peer_id.clone()))?;
        if member.reachable == reachable {
            return Ok(());
        }
        member.reachable = reachable;

        if reachable {
            slog::info!(self.logger, "{} reconnected", peer_id);
            if let Err(e) = self.catch_up(peer_id) {
                slog::warn!(self.logger, "{} failed to catch up: {}", peer_id, e);
            }
            self.refresh_role(peer_id);
        } else {
            slog::info!(self.logger, "{} disconnected", peer_id);
            // Cut off from everyone, it can only keep campaigning.
            member.sink.update_role(EngineRole::Candidate, None, self.term);
            if self.leader.as_ref() == Some(peer_id) {
                self.step_down_leader();
            }
        }
        self.broadcast_reachability(peer_id, reachable);

        Ok(())
    }

    fn catch_up(&mut self, peer_id: &PeerId) -> Result<(), EngineError> {
        let member = match self.members.get_mut(peer_id) {
            Some(member) if member.reachable => member,
            _ => return Ok(()),
        };

        let base_index = self.base.as_ref().map_or(0, |snapshot| snapshot.index.as_u64());
        let mut applied = member.applied.map_or(0, |index| index.as_u64());
        if let Some(snapshot) = &self.base {
            if applied < base_index {
                member.sink.install(snapshot)?;
                member.applied = Some(snapshot.index);
                applied = base_index;
            }
        }

        let start = (applied - base_index) as usize;
        for entry in self.log.get(start..).unwrap_or(&[]) {
            member.sink.apply(entry)?;
            member.applied = Some(entry.index);
        }

        Ok(())
    }

    fn catch_up_all(&mut self) {
        let peers: Vec<PeerId> = self.members.keys().cloned().collect();
        for peer_id in peers {
            if let Err(e) = self.catch_up(&peer_id) {
                slog::warn!(self.logger, "{} failed to apply committed entries: {}", peer_id, e);
            }
        }
    }

    fn step_down_leader(&mut self) {
        if let Some(leader) = self.leader.take() {
            slog::info!(self.logger, "Leader {} lost for term {}", leader, self.term);
        }

        for member in self.members.values().filter(|m| m.reachable) {
            member.sink.update_role(EngineRole::Candidate, None, self.term);
        }
    }

    fn run_election(&mut self) {
        if self.leader.is_some() {
            return;
        }
        let roster = match &self.roster {
            Some(roster) => roster,
            None => return,
        };

        let (live, required) = self.voter_quorum();
        if live < required {
            slog::warn!(
                self.logger,
                "Election failed: {} of {} required voters reachable",
                live,
                required
            );
            return;
        }

        // Voters holding the whole committed log are electable. Lowest id wins for determinism.
        let log_end = self.last_index();
        let winner = roster
            .voters()
            .filter(|peer_id| {
                self.members
                    .get(*peer_id)
                    .map_or(false, |m| m.reachable && m.applied == log_end)
            })
            .min()
            .cloned();

        let winner = match winner {
            Some(winner) => winner,
            None => {
                slog::warn!(self.logger, "Election failed: no up to date voter is reachable");
                return;
            }
        };

        self.term.incr();
        slog::info!(self.logger, "{} won the election for term {}", winner, self.term);
        self.leader = Some(winner);

        let peers: Vec<PeerId> = self.members.keys().cloned().collect();
        for peer_id in peers {
            self.refresh_role(&peer_id);
        }
    }

    fn schedule_election_if_leaderless(&mut self) {
        if self.leader.is_some() || self.election_deadline.is_some() || !self.members.values().any(|m| m.reachable) {
            return;
        }

        let jitter = rand::thread_rng().gen_range(Duration::ZERO..=self.election_delay / 2);
        self.election_deadline = Some(Instant::now() + self.election_delay + jitter);
    }

    fn refresh_role(&self, peer_id: &PeerId) {
        let member = match self.members.get(peer_id) {
            Some(member) if member.reachable => member,
            _ => return,
        };

        let role = match &self.leader {
            Some(leader) if leader == peer_id => EngineRole::Leader,
            _ => EngineRole::Follower,
        };
        member.sink.update_role(role, self.leader.clone(), self.term);
    }

    fn broadcast_reachability(&self, peer_id: &PeerId, reachable: bool) {
        for (id, member) in &self.members {
            if id != peer_id && member.reachable {
                member.sink.notify(Observation::PeerReachability {
                    peer_id: peer_id.clone(),
                    reachable,
                });
            }
        }
    }

    fn voter_quorum(&self) -> (usize, usize) {
        match &self.roster {
            Some(roster) => {
                let live = roster.voters().filter(|peer_id| self.is_live(peer_id)).count();
                (live, roster.quorum_size())
            }
            None => (0, 1),
        }
    }

    fn is_live(&self, peer_id: &PeerId) -> bool {
        self.members.get(peer_id).map_or(false, |m| m.reachable)
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
