use raft_coordinator::{
    bootstrap, create_root_logger_for_stdout, level_from_env, BootstrapError, ClusterNode, Committed,
    CoordinatorOptions, DurableStores, EngineRole, EntryPayload, Index, InMemoryLogStore, InMemorySnapshotStore,
    LocalEngine, LocalLauncher, LocalNetwork, LogEntry, LogStore, PeerId, StaticPeerDirectory, Subscription,
};
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{timeout, Duration, Instant};

type Node = ClusterNode<String, LocalEngine<String>>;

const ELECTION_DELAY: Duration = Duration::from_millis(50);

#[tokio::test(start_paused = true)]
async fn three_nodes_agree_on_state_without_rollback() -> Result<(), Box<dyn Error>> {
    let logger = create_root_logger_for_stdout(level_from_env());
    let launcher = LocalLauncher::new(LocalNetwork::new(logger.clone(), ELECTION_DELAY), logger.clone());
    let counter = Arc::new(AtomicU64::new(0));
    let ids = peer_ids(3);

    let mut nodes = Vec::new();
    for local_id in &ids {
        nodes.push(start_node(&launcher, &ids, local_id, DurableStores::in_memory(), &counter, &logger).await?);
    }
    let mut subscriptions: Vec<Subscription<String>> = nodes.iter().map(|n| n.subscribe()).collect();

    // T1 -> T2 -> ... on every node, never backwards.
    for subscription in subscriptions.iter_mut() {
        let mut last: Option<Committed<String>> = None;
        for _ in 0..3 {
            let committed = next_change(subscription).await?;
            if let Some(previous) = &last {
                assert!(committed.index > previous.index);
                assert_ne!(committed.value, previous.value);
            }
            last = Some(committed);
        }
    }

    let leader = wait_for_cluster_leader(&nodes, Duration::from_secs(5)).await;
    assert_eq!(nodes.iter().filter(|n| n.is_leader()).count(), 1);
    for node in &nodes {
        assert_eq!(node.current_leader().as_ref(), Some(nodes[leader].local_id()));
    }

    let expected = nodes[leader].read_current_state().await?;
    assert!(expected.is_some());
    for node in &nodes {
        assert_eq!(node.read_current_state().await?, expected);
    }

    for node in nodes {
        node.shutdown().await;
    }

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn replication_survives_leader_failover() -> Result<(), Box<dyn Error>> {
    let logger = create_root_logger_for_stdout(level_from_env());
    let network = LocalNetwork::new(logger.clone(), ELECTION_DELAY);
    let launcher = LocalLauncher::new(network.clone(), logger.clone());
    let counter = Arc::new(AtomicU64::new(0));
    let ids = peer_ids(3);

    let mut nodes = Vec::new();
    for local_id in &ids {
        nodes.push(start_node(&launcher, &ids, local_id, DurableStores::in_memory(), &counter, &logger).await?);
    }

    let old_leader = wait_for_cluster_leader(&nodes, Duration::from_secs(5)).await;
    let follower = (old_leader + 1) % nodes.len();
    let mut follower_changes = nodes[follower].subscribe();
    let before = next_change(&mut follower_changes).await?;

    let old_leader_id = nodes[old_leader].local_id().clone();
    network.disconnect(&old_leader_id).await?;
    assert_eq!(nodes[old_leader].role(), EngineRole::Candidate);

    let new_leader = wait_for_cluster_leader(&nodes, Duration::from_secs(5)).await;
    assert_ne!(new_leader, old_leader);

    // The new leader keeps the sequence going, in a later term.
    let mut after = next_change(&mut follower_changes).await?;
    while after.term == before.term {
        after = next_change(&mut follower_changes).await?;
    }
    assert!(after.index > before.index);
    assert!(after.term > before.term);

    // The old leader catches up as a follower once it can talk to the others again.
    network.reconnect(&old_leader_id).await?;
    assert_eq!(nodes[old_leader].role(), EngineRole::Follower);
    assert_eq!(nodes[old_leader].current_leader().as_ref(), Some(nodes[new_leader].local_id()));
    assert_eq!(
        nodes[old_leader].read_current_state().await?,
        nodes[new_leader].read_current_state().await?
    );

    for node in nodes {
        node.shutdown().await;
    }

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn restarted_node_does_not_bootstrap_again() -> Result<(), Box<dyn Error>> {
    let logger = create_root_logger_for_stdout(level_from_env());
    let launcher = LocalLauncher::new(LocalNetwork::new(logger.clone(), ELECTION_DELAY), logger.clone());
    let counter = Arc::new(AtomicU64::new(0));
    let ids = peer_ids(1);
    let log = InMemoryLogStore::new();
    let stores = DurableStores::new(log.clone(), InMemorySnapshotStore::new(3));

    let node = start_node(&launcher, &ids, &ids[0], stores.clone(), &counter, &logger).await?;
    let mut changes = node.subscribe();
    next_change(&mut changes).await?;
    let before = next_change(&mut changes).await?;
    node.shutdown().await;

    let node = start_node(&launcher, &ids, &ids[0], stores, &counter, &logger).await?;
    let restored = node.read_current_state().await?.expect("restored state");
    assert!(restored.index >= before.index);

    // New commits pick up after the restored state.
    let mut changes = node.subscribe();
    let after = next_change(&mut changes).await?;
    assert!(after.index > restored.index);
    node.shutdown().await;

    let mut configurations = 0;
    for i in 1..log.next_index().as_u64() {
        let entry = LogEntry::decode(&log.read(Index::new(i))?.expect("entry"))?;
        if let EntryPayload::Configuration(_) = entry.payload {
            configurations += 1;
        }
    }
    assert_eq!(configurations, 1);

    Ok(())
}

fn peer_ids(count: usize) -> Vec<PeerId> {
    (1..=count)
        .map(|i| PeerId::parse(format!("node-{}", i)).unwrap())
        .collect()
}

async fn start_node(
    launcher: &LocalLauncher<String>,
    ids: &[PeerId],
    local_id: &PeerId,
    stores: DurableStores,
    counter: &Arc<AtomicU64>,
    logger: &slog::Logger,
) -> Result<Node, BootstrapError> {
    let directory = StaticPeerDirectory::new(local_id.clone(), ids.to_vec());
    let counter = counter.clone();
    let source = move || format!("T{}", counter.fetch_add(1, Ordering::SeqCst) + 1);
    let options = CoordinatorOptions {
        replication_interval: Some(Duration::from_millis(100)),
        leader_wait_timeout: Some(Duration::from_secs(2)),
        leader_poll_interval: Some(Duration::from_millis(20)),
        snapshot_interval: Some(4),
    };

    bootstrap(&directory, launcher, stores, source, options, logger.clone()).await
}

async fn next_change(subscription: &mut Subscription<String>) -> Result<Committed<String>, Box<dyn Error>> {
    timeout(Duration::from_secs(5), subscription.next())
        .await?
        .ok_or_else(|| "subscription closed".into())
}

async fn wait_for_cluster_leader(nodes: &[Node], within: Duration) -> usize {
    let deadline = Instant::now() + within;
    loop {
        if let Some(leader) = nodes.iter().position(|n| n.is_leader()) {
            return leader;
        }
        assert!(Instant::now() < deadline, "no leader elected within {:?}", within);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
