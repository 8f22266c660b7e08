//! End-to-end exercise of header ingestion, merkle verification, and
//! transaction indexing against a real (in-memory) store, without any
//! network I/O.

use spv_sync::config::BITCOIN_REGTEST;
use spv_sync::network::protocol::{BlockHeader, MerkleBlockMessage, TxMessage, TxOut};
use spv_sync::{BlockChain, Store, SyncController, SyncControllerEvent};

fn header(prev: [u8; 32], nonce: u32) -> BlockHeader {
    BlockHeader {
        version: 1,
        prev_hash: prev,
        merkle_root: [0u8; 32],
        timestamp: 1_700_000_000,
        bits: 0x1d00ffff,
        nonce,
    }
}

#[tokio::test]
async fn header_then_matching_tx_lands_in_the_store_and_tip_advances() {
    let chain = BlockChain::new(Store::open_in_memory().unwrap());
    let mut controller =
        SyncController::new(chain.store().clone(), BITCOIN_REGTEST, false).unwrap();

    assert_eq!(chain.latest_height().unwrap(), None);

    let h0 = header(BITCOIN_REGTEST.genesis_hash, 7);
    let events = controller.process_headers(&[h0]);
    assert!(events
        .iter()
        .any(|e| matches!(e, SyncControllerEvent::SendGetData(_))));

    let tx = TxMessage {
        version: 1,
        inputs: vec![],
        outputs: vec![TxOut { value: 2_500_000, script_pubkey: bytes::Bytes::from_static(&[]) }],
        lock_time: 0,
    };
    let tx_id = tx.id();

    let verification = spv_sync::merkle::verify(1, &[tx_id], &[0b0000_0001]).unwrap();
    let mut block_header = h0;
    block_header.merkle_root = verification.computed_root;

    controller
        .process_merkleblock(MerkleBlockMessage {
            header: block_header,
            total_transactions: 1,
            hashes: vec![tx_id],
            flags: vec![0b0000_0001],
        })
        .unwrap();

    assert!(controller.process_tx(tx));
    let event = controller.commit_pending().await.unwrap().unwrap();
    assert!(matches!(event, SyncControllerEvent::BlockCommitted { height: 0, .. }));

    assert_eq!(chain.latest_height().unwrap(), Some(0));
    assert_eq!(chain.latest_hash().unwrap(), Some(block_header.id()));
}

#[tokio::test]
async fn discontinuous_headers_do_not_silently_advance_the_tip() {
    let chain = BlockChain::new(Store::open_in_memory().unwrap());
    let mut controller =
        SyncController::new(chain.store().clone(), BITCOIN_REGTEST, false).unwrap();

    controller.process_headers(&[header(BITCOIN_REGTEST.genesis_hash, 1)]);
    let height_after_first = controller.next_height();

    let orphan = header([0x42u8; 32], 2);
    let events = controller.process_headers(&[orphan]);
    assert!(events
        .iter()
        .any(|e| matches!(e, SyncControllerEvent::SendGetHeaders(_))));
    assert_eq!(controller.next_height(), height_after_first);
}

#[tokio::test]
async fn checkpoint_mode_never_requests_merkleblocks() {
    let chain = BlockChain::new(Store::open_in_memory().unwrap());
    let mut controller =
        SyncController::new(chain.store().clone(), BITCOIN_REGTEST, true).unwrap();

    let events = controller.process_headers(&[header(BITCOIN_REGTEST.genesis_hash, 1)]);
    assert!(!events
        .iter()
        .any(|e| matches!(e, SyncControllerEvent::SendGetData(_))));
}
