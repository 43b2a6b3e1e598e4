use crate::peers::PeerId;

/// Transport is the point-to-point messaging substrate a consensus engine runs over. This layer
/// only needs to know which identity a transport is bound to; everything else is between the
/// transport and the engine that consumes it.
pub trait Transport: Send + Sync {
    fn local_id(&self) -> &PeerId;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("address {0} is already bound")]
    AddressInUse(PeerId),

    #[error("peer {0} is unreachable")]
    Unreachable(PeerId),

    // The network's background task has exited.
    #[error("network has shut down")]
    NetworkClosed,
}
