//! The consensus engine as consumed by the coordination layer, plus an in-process engine.
mod api;
mod commit_feed;
mod local;
mod observer;

pub use api::ConsensusEngine;
pub use api::ConsensusLauncher;
pub use api::EngineConfig;
pub use api::EngineError;
pub use api::EngineRole;
pub use api::LeadershipView;
pub use commit_feed::commit_feed;
pub use commit_feed::CommitFeed;
pub use commit_feed::CommitFeedPublisher;
pub use commit_feed::Committed;
pub use local::LocalEngine;
pub use local::LocalLauncher;
pub use local::LocalNetwork;
pub use local::LocalTransport;
pub use observer::Observation;
pub use observer::Observer;
pub use observer::ObserverId;
pub use observer::ObserverRegistry;
