mod bootstrap;
mod engine;
mod logging;
mod monitor;
mod node;
mod notifier;
mod options;
mod peers;
mod replicator;
mod roster;
mod state;
mod storage;
#[cfg(test)]
mod test_utils;
mod transport;

pub use bootstrap::bootstrap;
pub use bootstrap::BootstrapError;
pub use bootstrap::ConfigurationError;
pub use bootstrap::StartupFailure;
pub use engine::commit_feed;
pub use engine::CommitFeed;
pub use engine::CommitFeedPublisher;
pub use engine::Committed;
pub use engine::ConsensusEngine;
pub use engine::ConsensusLauncher;
pub use engine::EngineConfig;
pub use engine::EngineError;
pub use engine::EngineRole;
pub use engine::LeadershipView;
pub use engine::LocalEngine;
pub use engine::LocalLauncher;
pub use engine::LocalNetwork;
pub use engine::LocalTransport;
pub use engine::Observation;
pub use engine::Observer;
pub use engine::ObserverId;
pub use engine::ObserverRegistry;
pub use logging::create_root_logger_for_stdout;
pub use logging::create_root_logger_with_file;
pub use logging::level_from_env;
pub use logging::parse_level;
pub use logging::LOG_LEVEL_ENV;
pub use monitor::wait_for_leader;
pub use monitor::WaitForLeaderError;
pub use node::ClusterNode;
pub use notifier::forward_commits;
pub use notifier::ChangeNotifier;
pub use notifier::Subscription;
pub use options::CoordinatorOptions;
pub use options::OptionsError;
pub use peers::EmptyPeerId;
pub use peers::PeerDirectory;
pub use peers::PeerId;
pub use peers::StaticPeerDirectory;
pub use replicator::ReplicationFault;
pub use replicator::StateReplicator;
pub use replicator::TickOutcome;
pub use roster::ServerRoster;
pub use roster::ServerRosterEntry;
pub use roster::Suffrage;
pub use state::ReplicatedState;
pub use state::StateSource;
pub use state::Timestamp;
pub use state::WallClock;
pub use storage::has_existing_state;
pub use storage::DurableStores;
pub use storage::EntryPayload;
pub use storage::FileSnapshotStore;
pub use storage::InMemoryLogStore;
pub use storage::InMemorySnapshotStore;
pub use storage::Index;
pub use storage::LogEntry;
pub use storage::LogStore;
pub use storage::Snapshot;
pub use storage::SnapshotMeta;
pub use storage::SnapshotStore;
pub use storage::Term;
pub use storage::DEFAULT_SNAPSHOT_RETAIN;
pub use transport::Transport;
pub use transport::TransportError;

// The crate root only declares modules and re-exports. No module is `pub`; everything public is
// exported individually from here.
