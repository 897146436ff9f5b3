//! Peer network contract.

use ark_types::Block;

/// What a health check of the peer network concluded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkStatus {
    pub forked: bool,
    /// How many blocks to remove to rejoin the majority, when known.
    pub blocks_to_rollback: Option<u64>,
}

/// The peer layer as seen by the blockchain service. Peer discovery,
/// reputation and wire formats live behind this trait.
pub trait Network: Send + Sync {
    fn has_peers(&self) -> bool;

    /// Fire-and-forget relay of a block to peers.
    fn broadcast_block(&self, block: &Block);

    /// Blocks above `height` from some peer, ascending. Empty when no peer
    /// could supply any.
    fn download_blocks_from_height(&self, height: u64) -> Vec<Block>;

    fn check_network_health(&self) -> NetworkStatus;

    fn refresh_peers_after_fork(&self) {}
}
