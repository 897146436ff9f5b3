//! Nullable network: records broadcasts and serves queued downloads.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ark_store::{Network, NetworkStatus};
use ark_types::Block;

#[derive(Default)]
struct State {
    has_peers: bool,
    broadcasts: Vec<Block>,
    downloads: VecDeque<Vec<Block>>,
    download_requests: Vec<u64>,
    health: NetworkStatus,
    fork_refreshes: usize,
}

/// A peer layer with no peers unless the test adds some.
#[derive(Default)]
pub struct NullNetwork {
    state: Mutex<State>,
}

impl NullNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// A network that reports connected peers.
    pub fn with_peers() -> Self {
        let network = Self::new();
        network.set_has_peers(true);
        network
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_has_peers(&self, has_peers: bool) {
        self.state().has_peers = has_peers;
    }

    /// Serve `blocks` on the next download request.
    pub fn queue_download(&self, blocks: Vec<Block>) {
        self.state().downloads.push_back(blocks);
    }

    pub fn set_health(&self, status: NetworkStatus) {
        self.state().health = status;
    }

    /// Every block broadcast so far, oldest first.
    pub fn broadcasts(&self) -> Vec<Block> {
        self.state().broadcasts.clone()
    }

    /// Heights the node asked to download from.
    pub fn download_requests(&self) -> Vec<u64> {
        self.state().download_requests.clone()
    }

    pub fn fork_refreshes(&self) -> usize {
        self.state().fork_refreshes
    }
}

impl Network for NullNetwork {
    fn has_peers(&self) -> bool {
        self.state().has_peers
    }

    fn broadcast_block(&self, block: &Block) {
        self.state().broadcasts.push(block.clone());
    }

    fn download_blocks_from_height(&self, height: u64) -> Vec<Block> {
        let mut state = self.state();
        state.download_requests.push(height);
        state.downloads.pop_front().unwrap_or_default()
    }

    fn check_network_health(&self) -> NetworkStatus {
        self.state().health
    }

    fn refresh_peers_after_fork(&self) {
        self.state().fork_refreshes += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downloads_are_served_in_order() {
        let network = NullNetwork::new();
        network.queue_download(Vec::new());
        assert!(network.download_blocks_from_height(5).is_empty());
        assert!(network.download_blocks_from_height(6).is_empty());
        assert_eq!(network.download_requests(), vec![5, 6]);
    }

    #[test]
    fn peers_are_opt_in() {
        assert!(!NullNetwork::new().has_peers());
        assert!(NullNetwork::with_peers().has_peers());
    }
}
