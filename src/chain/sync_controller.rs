//! Consumes `headers`/`merkleblock`/`tx` events from the currently
//! syncing peer, validates and assigns heights, and buffers transactions
//! against the current block's expected hash set until every match has
//! arrived or the block-assembly quiescence window elapses.
//!
//! `only_checkpoints` mode shares this exact header-walk path — per the
//! upstream design note that a checkpoint-only syncer is a
//! specialization, not a parallel state machine — and simply never
//! issues `getdata` for merkle-blocks.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tracing::warn;

use crate::config::{Checkpoint, Network};
use crate::error::{ProtocolError, Result};
use crate::merkle;
use crate::network::protocol::{
    BlockHeader, GetDataMessage, GetHeadersMessage, InventoryItem, MerkleBlockMessage, TxMessage,
    INV_FILTERED_BLOCK,
};
use crate::script::extractor::{extract_input_address, extract_output_address};
use crate::store::Store;

/// Coarse-grained progress signal surfaced to `PeerGroup`'s delegate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncState {
    NotSynced,
    Syncing { progress: f64 },
    Synced,
}

/// Side effects the controller asks its driving peer to perform, or
/// notable state changes the caller should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncControllerEvent {
    SendGetHeaders(GetHeadersMessage),
    SendGetData(GetDataMessage),
    BlockCommitted { height: u32, hash: [u8; 32] },
    CheckpointReached { height: u32, hash: [u8; 32] },
    ReachedTip,
}

struct PendingBlock {
    header: BlockHeader,
    expected: HashSet<[u8; 32]>,
    received: Vec<TxMessage>,
    deadline: Instant,
}

/// Drives header/block/tx ingestion for one syncing peer.
pub struct SyncController {
    store: Store,
    network: Network,
    only_checkpoints: bool,
    next_height: u32,
    tip_hash: Option<[u8; 32]>,
    /// Height assigned to each header as it was walked in `process_headers`,
    /// consumed (and removed) by `commit_pending` so a whole batch doesn't
    /// collapse onto the batch's final height.
    heights: HashMap<[u8; 32], u32>,
    pending: Option<PendingBlock>,
    block_assembly_window: std::time::Duration,
}

impl SyncController {
    pub fn new(store: Store, network: Network, only_checkpoints: bool) -> Result<Self> {
        let next_height = store.latest_block_height()?.map(|h| h + 1).unwrap_or(0);
        let tip_hash = store.latest_block_hash()?;
        Ok(Self {
            store,
            network,
            only_checkpoints,
            next_height,
            tip_hash,
            heights: HashMap::new(),
            pending: None,
            block_assembly_window: crate::utils::timeout::DEFAULT_BLOCK_ASSEMBLY_TIMEOUT,
        })
    }

    /// Build the locator for the initial (or post-reorg) `getheaders`
    /// request: a single hash, the stored tip, or the network's genesis
    /// if nothing is stored yet.
    pub fn initial_getheaders(&self) -> GetHeadersMessage {
        let locator_hash = self.tip_hash.unwrap_or(self.network.genesis_hash);
        GetHeadersMessage {
            version: 70015,
            locator_hashes: vec![locator_hash],
            hash_stop: [0u8; 32],
        }
    }

    fn next_checkpoint(&self) -> Option<&'static Checkpoint> {
        self.network
            .checkpoints
            .iter()
            .find(|c| c.height >= self.next_height)
    }

    /// Validate and act on a `headers` batch (at most 2000 entries per
    /// the wire limit).
    ///
    /// Returns one event per header that should be fetched (`getdata`
    /// for filtered merkle-blocks in full-sync mode), or a single
    /// `SendGetHeaders` event if the batch's first header does not
    /// extend the stored tip (the controller discards it and asks the
    /// peer to realign).
    pub fn process_headers(&mut self, headers: &[BlockHeader]) -> Vec<SyncControllerEvent> {
        if headers.is_empty() {
            return vec![SyncControllerEvent::ReachedTip];
        }

        if let Some(tip) = self.tip_hash {
            if headers[0].prev_hash != tip {
                warn!(
                    expected = %hex::encode(tip),
                    got = %hex::encode(headers[0].prev_hash),
                    "header batch does not extend stored tip, requesting realignment"
                );
                return vec![SyncControllerEvent::SendGetHeaders(GetHeadersMessage {
                    version: 70015,
                    locator_hashes: vec![tip],
                    hash_stop: [0u8; 32],
                })];
            }
        }

        let mut events = Vec::new();
        for header in headers {
            let id = header.id();
            self.heights.insert(id, self.next_height);

            if self.only_checkpoints {
                if let Some(checkpoint) = self.next_checkpoint() {
                    if self.next_height == checkpoint.height {
                        events.push(SyncControllerEvent::CheckpointReached {
                            height: checkpoint.height,
                            hash: id,
                        });
                    }
                }
            } else {
                events.push(SyncControllerEvent::SendGetData(GetDataMessage {
                    items: vec![InventoryItem { kind: INV_FILTERED_BLOCK, hash: id }],
                }));
            }

            self.tip_hash = Some(id);
            self.next_height += 1;
        }

        if headers.len() < 2000 {
            events.push(SyncControllerEvent::ReachedTip);
        }
        events
    }

    /// Begin assembling a block: records the expected transaction-id set
    /// from the merkle verifier, rejecting the block outright on a root
    /// mismatch.
    pub fn process_merkleblock(&mut self, msg: MerkleBlockMessage) -> Result<()> {
        let verification = merkle::verify(msg.total_transactions, &msg.hashes, &msg.flags)?;
        if msg.total_transactions > 0 && verification.computed_root != msg.header.merkle_root {
            return Err(ProtocolError::MerkleRootMismatch {
                computed: hex::encode(verification.computed_root),
                expected: hex::encode(msg.header.merkle_root),
            }
            .into());
        }

        self.pending = Some(PendingBlock {
            header: msg.header,
            expected: verification.matched_tx_ids.into_iter().collect(),
            received: Vec::new(),
            deadline: Instant::now() + self.block_assembly_window,
        });
        Ok(())
    }

    /// Feed a matching transaction for the block currently being
    /// assembled. Returns `true` once every expected hash has arrived,
    /// at which point the caller should call
    /// [`SyncController::commit_pending`].
    pub fn process_tx(&mut self, tx: TxMessage) -> bool {
        let Some(pending) = self.pending.as_mut() else { return false };
        let id = tx.id();
        if pending.expected.contains(&id) {
            pending.received.push(tx);
        }
        pending.received.len() >= pending.expected.len()
    }

    /// Whether the block-assembly quiescence window has elapsed for the
    /// block currently being assembled.
    pub fn assembly_quiescent(&self) -> bool {
        self.pending
            .as_ref()
            .map(|p| Instant::now() >= p.deadline)
            .unwrap_or(false)
    }

    /// Persist the pending block and its collected transactions, whether
    /// assembly finished normally or the quiescence window forced an
    /// early commit with only a subset of matches.
    pub async fn commit_pending(&mut self) -> Result<Option<SyncControllerEvent>> {
        let Some(pending) = self.pending.take() else { return Ok(None) };
        let block_hash = pending.header.id();
        let height = self
            .heights
            .remove(&block_hash)
            .unwrap_or_else(|| self.next_height.saturating_sub(1));

        self.store.add_block(&pending.header).await?;
        self.store
            .add_merkleblock(&block_hash, height, pending.expected.len() as u32)
            .await?;

        for tx in &pending.received {
            let input_addresses: Vec<_> = tx
                .inputs
                .iter()
                .map(|input| extract_input_address(&self.network, &input.script_sig))
                .collect();
            let output_addresses: Vec<_> = tx
                .outputs
                .iter()
                .map(|output| extract_output_address(&self.network, &output.script_pubkey))
                .collect();
            self.store
                .add_transaction(&block_hash, tx, &input_addresses, &output_addresses)
                .await?;
        }

        Ok(Some(SyncControllerEvent::BlockCommitted { height, hash: block_hash }))
    }

    pub fn next_height(&self) -> u32 {
        self.next_height
    }

    pub fn tip_hash(&self) -> Option<[u8; 32]> {
        self.tip_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BITCOIN_REGTEST;
    use crate::network::protocol::TxOut;

    fn header(prev: [u8; 32], nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_hash: prev,
            merkle_root: [0u8; 32],
            timestamp: 0,
            bits: 0,
            nonce,
        }
    }

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn initial_getheaders_uses_genesis_when_store_is_empty() {
        let controller = SyncController::new(store(), BITCOIN_REGTEST, false).unwrap();
        let locator = controller.initial_getheaders();
        assert_eq!(locator.locator_hashes, vec![BITCOIN_REGTEST.genesis_hash]);
    }

    #[test]
    fn processing_headers_advances_height_and_requests_merkleblocks() {
        let mut controller = SyncController::new(store(), BITCOIN_REGTEST, false).unwrap();
        let h0 = header(BITCOIN_REGTEST.genesis_hash, 1);
        let events = controller.process_headers(&[h0]);
        assert!(events
            .iter()
            .any(|e| matches!(e, SyncControllerEvent::SendGetData(_))));
        assert_eq!(controller.next_height(), 1);
    }

    #[test]
    fn discontinuous_header_batch_requests_realignment() {
        let mut controller = SyncController::new(store(), BITCOIN_REGTEST, false).unwrap();
        controller.process_headers(&[header(BITCOIN_REGTEST.genesis_hash, 1)]);
        let bogus = header([0xAAu8; 32], 2);
        let events = controller.process_headers(&[bogus]);
        assert!(events
            .iter()
            .any(|e| matches!(e, SyncControllerEvent::SendGetHeaders(_))));
    }

    #[tokio::test]
    async fn merkle_root_mismatch_rejects_block() {
        let mut controller = SyncController::new(store(), BITCOIN_REGTEST, false).unwrap();
        let bad_header = header(BITCOIN_REGTEST.genesis_hash, 99);
        let msg = MerkleBlockMessage {
            header: bad_header,
            total_transactions: 1,
            hashes: vec![[1u8; 32]],
            flags: vec![0b0000_0001],
        };
        let result = controller.process_merkleblock(msg);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn commit_pending_persists_block_and_height() {
        let mut controller = SyncController::new(store(), BITCOIN_REGTEST, false).unwrap();

        let tx = TxMessage {
            version: 1,
            inputs: vec![],
            outputs: vec![TxOut { value: 5000, script_pubkey: bytes::Bytes::from_static(&[]) }],
            lock_time: 0,
        };
        let tx_id = tx.id();
        // The merkle root must match what the peer would actually advertise
        // in its `headers` batch, so use the same header struct throughout.
        let verification = merkle::verify(1, &[tx_id], &[0b0000_0001]).unwrap();
        let mut mb_header = header(BITCOIN_REGTEST.genesis_hash, 1);
        mb_header.merkle_root = verification.computed_root;

        controller.process_headers(&[mb_header]);

        let msg = MerkleBlockMessage {
            header: mb_header,
            total_transactions: 1,
            hashes: vec![tx_id],
            flags: vec![0b0000_0001],
        };
        controller.process_merkleblock(msg).unwrap();
        controller.process_tx(tx);
        let event = controller.commit_pending().await.unwrap().unwrap();
        assert!(matches!(event, SyncControllerEvent::BlockCommitted { height: 0, .. }));
        assert_eq!(controller.store.latest_block_height().unwrap(), Some(0));
    }

    #[tokio::test]
    async fn multi_header_batch_assigns_each_block_its_own_height() {
        let mut controller = SyncController::new(store(), BITCOIN_REGTEST, false).unwrap();

        // Both blocks are empty, so they share the same (valid) merkle
        // root; set it before the headers are walked so the ids the
        // controller records in `process_headers` are the exact ids it
        // will later see again in `process_merkleblock`.
        let verification = merkle::verify(0, &[], &[]).unwrap();
        let mut h0 = header(BITCOIN_REGTEST.genesis_hash, 1);
        h0.merkle_root = verification.computed_root;
        let mut h1 = header(h0.id(), 2);
        h1.merkle_root = verification.computed_root;

        controller.process_headers(&[h0, h1]);
        assert_eq!(controller.next_height(), 2);

        // Commit the second header in the batch first, mirroring a peer
        // that answers `getdata` out of request order.
        controller
            .process_merkleblock(MerkleBlockMessage {
                header: h1,
                total_transactions: 0,
                hashes: vec![],
                flags: vec![],
            })
            .unwrap();
        let event = controller.commit_pending().await.unwrap().unwrap();
        assert!(matches!(event, SyncControllerEvent::BlockCommitted { height: 1, .. }));

        controller
            .process_merkleblock(MerkleBlockMessage {
                header: h0,
                total_transactions: 0,
                hashes: vec![],
                flags: vec![],
            })
            .unwrap();
        let event = controller.commit_pending().await.unwrap().unwrap();
        assert!(matches!(event, SyncControllerEvent::BlockCommitted { height: 0, .. }));
    }
}
