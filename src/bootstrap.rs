use crate::engine::{ConsensusEngine, ConsensusLauncher, EngineConfig, EngineError};
use crate::node::ClusterNode;
use crate::notifier::{forward_commits, ChangeNotifier};
use crate::options::{CoordinatorOptions, CoordinatorOptionsValidated, OptionsError};
use crate::peers::PeerDirectory;
use crate::replicator::StateReplicator;
use crate::roster::ServerRoster;
use crate::state::{ReplicatedState, StateSource};
use crate::storage::{has_existing_state, DurableStores};
use crate::transport::TransportError;
use std::convert::TryFrom;
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("failed to start: {0}")]
    Startup(#[from] StartupFailure),

    // The stores looked fresh but the engine says they are not. Something else is writing to them.
    #[error("engine refused to bootstrap: {0}")]
    ProtocolViolation(#[source] EngineError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("cluster roster is empty")]
    EmptyRoster,

    #[error(transparent)]
    InvalidOptions(#[from] OptionsError),
}

#[derive(Debug, thiserror::Error)]
pub enum StartupFailure {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("durable stores: {0}")]
    Storage(#[from] io::Error),

    #[error("engine: {0}")]
    Engine(#[source] EngineError),
}

/// Brings this node into the cluster and starts replicating.
///
/// The roster is every peer the directory lists plus this node, voters unless the directory
/// lists them as nonvoters. The cluster
/// configuration is written only if this node's stores hold no prior state, so restarting a
/// node never bootstraps twice. Any failure is returned before a background task is spawned.
pub async fn bootstrap<V, D, L, S>(
    directory: &D,
    launcher: &L,
    stores: DurableStores,
    source: S,
    options: CoordinatorOptions,
    logger: slog::Logger,
) -> Result<ClusterNode<V, L::Engine>, BootstrapError>
where
    V: ReplicatedState,
    D: PeerDirectory + ?Sized,
    L: ConsensusLauncher<V>,
    S: StateSource<V> + 'static,
{
    let options = CoordinatorOptionsValidated::try_from(options).map_err(ConfigurationError::from)?;

    let local_id = directory.local_id();
    let roster =
        ServerRoster::from_peers(directory.list_peers(), local_id.clone()).with_nonvoters(&directory.list_nonvoters());
    if roster.is_empty() {
        return Err(ConfigurationError::EmptyRoster.into());
    }

    let logger = logger.new(slog::o!("peer" => local_id.to_string()));
    slog::info!(logger, "Cluster roster has {} servers", roster.len());

    let config = EngineConfig {
        local_id: local_id.clone(),
        roster: roster.clone(),
        snapshot_interval: options.snapshot_interval,
    };

    let transport = launcher.bind_transport(&local_id).await.map_err(StartupFailure::from)?;

    let initialized = has_existing_state(&*stores.log, &*stores.snapshots).map_err(StartupFailure::from)?;
    if initialized {
        slog::info!(logger, "Already initialized");
    } else {
        launcher
            .bootstrap_cluster(&config, &stores, &transport)
            .await
            .map_err(|e| match e {
                e @ EngineError::AlreadyBootstrapped => BootstrapError::ProtocolViolation(e),
                other => StartupFailure::Engine(other).into(),
            })?;
        slog::info!(logger, "Bootstrapped cluster configuration");
    }

    let engine = launcher
        .start(config, stores, transport)
        .await
        .map_err(StartupFailure::Engine)?;
    let engine = Arc::new(engine);

    let cancel = CancellationToken::new();
    let notifier = ChangeNotifier::new();
    let forwarder = tokio::spawn(forward_commits(
        engine.subscribe(),
        notifier.clone(),
        cancel.clone(),
        logger.new(slog::o!("task" => "notifier")),
    ));

    let replicator = StateReplicator::new(
        logger.new(slog::o!("task" => "replicator")),
        engine.clone(),
        source,
        options.replication_interval,
        options.leader_wait_timeout,
        options.leader_poll_interval,
    );
    let replicator = tokio::spawn(replicator.run(cancel.clone()));

    Ok(ClusterNode::new(
        logger,
        roster,
        engine,
        notifier,
        cancel,
        vec![replicator, forwarder],
    ))
}
