//! Chain tip tracking and the sync controller that assigns heights to
//! accepted merkle-blocks and buffers their matching transactions.

pub mod sync_controller;

pub use sync_controller::{SyncController, SyncControllerEvent, SyncState};

use crate::error::Result;
use crate::store::Store;

/// Read-only view over the locally persisted chain tip, backed by the
/// store. Thin wrapper kept separate from `SyncController` so query-only
/// consumers (balance/history lookups) don't need to construct a full
/// sync pipeline.
#[derive(Clone)]
pub struct BlockChain {
    store: Store,
}

impl BlockChain {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// `latest_height = max(height)` over stored merkle-blocks, or `None`
    /// if nothing has been synced yet.
    pub fn latest_height(&self) -> Result<Option<u32>> {
        self.store.latest_block_height()
    }

    /// Header hash of the current tip.
    pub fn latest_hash(&self) -> Result<Option<[u8; 32]>> {
        self.store.latest_block_hash()
    }
}
