//! An in-process engine. A single sequencer task stands in for the consensus protocol: it elects
//! the lowest live voter and commits only when a majority of voters is reachable.
mod actor;
mod engine;
mod member;
mod network;

pub use engine::LocalEngine;
pub use engine::LocalLauncher;
pub use network::LocalNetwork;
pub use network::LocalTransport;
