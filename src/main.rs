use clap::Parser;
use raft_coordinator::{
    bootstrap, create_root_logger_for_stdout, create_root_logger_with_file, level_from_env, ClusterNode,
    CoordinatorOptions, DurableStores, FileSnapshotStore, InMemoryLogStore, LocalEngine, LocalLauncher, LocalNetwork,
    PeerId, StaticPeerDirectory, Timestamp, WallClock, DEFAULT_SNAPSHOT_RETAIN,
};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

/// Runs a cluster of in-process nodes that agree on the current wall-clock time.
#[derive(Parser)]
#[command(name = "raft-coordinator")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of nodes in the cluster
    #[arg(short, long, default_value_t = 3)]
    nodes: usize,

    /// How many of the nodes (the highest numbered) replicate without a vote
    #[arg(long, default_value_t = 0)]
    nonvoters: usize,

    /// Milliseconds between proposals
    #[arg(long, default_value_t = 5000)]
    interval_ms: u64,

    /// Milliseconds to wait for a leader before replicating anyway
    #[arg(long, default_value_t = 10_000)]
    leader_timeout_ms: u64,

    /// Milliseconds without a leader before the network holds an election
    #[arg(long, default_value_t = 200)]
    election_delay_ms: u64,

    /// Keep snapshots on disk under this directory, one sub-directory per node
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Also append every log line to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

type Node = ClusterNode<Timestamp, LocalEngine<Timestamp>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let level = level_from_env();
    let logger = match &args.log_file {
        Some(path) => create_root_logger_with_file(level, path)?,
        None => create_root_logger_for_stdout(level),
    };

    let ids = (1..=args.nodes.max(1))
        .map(|i| PeerId::parse(format!("node-{}", i)))
        .collect::<Result<Vec<_>, _>>()?;
    // At least one voter.
    let nonvoters: Vec<PeerId> = ids.iter().rev().take(args.nonvoters.min(ids.len() - 1)).cloned().collect();

    let network = LocalNetwork::new(
        logger.new(slog::o!("component" => "network")),
        Duration::from_millis(args.election_delay_ms),
    );
    let launcher = LocalLauncher::new(network, logger.clone());

    let mut nodes: Vec<Node> = Vec::with_capacity(ids.len());
    for local_id in &ids {
        let peers = ids.iter().filter(|id| *id != local_id).cloned().collect();
        let directory = StaticPeerDirectory::new(local_id.clone(), peers).with_nonvoters(nonvoters.clone());
        let stores = match &args.snapshot_dir {
            Some(dir) => DurableStores::new(
                InMemoryLogStore::new(),
                FileSnapshotStore::open(dir.join(local_id.as_str()), DEFAULT_SNAPSHOT_RETAIN)?,
            ),
            None => DurableStores::in_memory(),
        };
        let options = CoordinatorOptions {
            replication_interval: Some(Duration::from_millis(args.interval_ms)),
            leader_wait_timeout: Some(Duration::from_millis(args.leader_timeout_ms)),
            ..Default::default()
        };

        let node = bootstrap(&directory, &launcher, stores, WallClock, options, logger.clone()).await?;
        nodes.push(node);
    }

    let mut subscription = nodes[0].subscribe();
    let watcher = logger.new(slog::o!("peer" => nodes[0].local_id().to_string()));
    let printer = tokio::spawn(async move {
        while let Some(committed) = subscription.next().await {
            slog::info!(watcher, "New state is: {}", committed.value);
        }
    });

    tokio::signal::ctrl_c().await?;
    slog::info!(logger, "Received Ctrl-C, shutting down");

    for node in nodes {
        node.shutdown().await;
    }
    printer.await?;

    Ok(())
}
