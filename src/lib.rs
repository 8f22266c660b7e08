//! A simplified payment verification (SPV) client library for the
//! Bitcoin family of networks.
//!
//! Connects to a handful of full nodes, verifies a bloom-filtered
//! transaction stream against the headers it downloads (BIP37 partial
//! merkle trees), and indexes the matching transactions into a local
//! SQLite database with derived balance/history/UTXO views.
//!
//! ## Layout
//!
//! - [`config`] — network descriptors and the consumer-facing
//!   [`config::ClientConfig`].
//! - [`error`] — the crate's [`Error`] hierarchy and propagation policy.
//! - [`crypto`] — hashing and base58check primitives shared by the wire
//!   codec and the address extractor.
//! - [`merkle`] — BIP37 partial merkle tree verification.
//! - [`script`] — minimal script parsing and output/input address
//!   extraction (P2PKH, P2SH, P2WPKH-in-P2SH).
//! - [`network`] — the wire protocol, a single peer connection, and the
//!   [`network::PeerGroup`] that coordinates a pool of them.
//! - [`store`] — the SQLite-backed relational index.
//! - [`chain`] — chain-tip tracking and the header/block sync
//!   controller driven by whichever peer is currently syncing.
//! - [`utils`] — logging setup, retry/backoff, and timeout helpers used
//!   throughout the above.
//!
//! This crate never installs a global `tracing` subscriber or reads
//! process environment itself (see [`utils::logging::init_logging`]);
//! a host application wires that up.

pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod merkle;
pub mod network;
pub mod script;
pub mod store;
pub mod utils;

pub use chain::{BlockChain, SyncController, SyncControllerEvent, SyncState};
pub use config::{
    ClientConfig, Network, BITCOIN_CASH_MAINNET, BITCOIN_MAINNET, BITCOIN_REGTEST,
    BITCOIN_TESTNET3,
};
pub use error::{Error, Result};
pub use network::{CheckpointSyncer, PeerGroup, PeerGroupDelegate, PeerGroupEvent};
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_defaults_to_bitcoin_mainnet() {
        let config = ClientConfig::default();
        assert_eq!(config.network, BITCOIN_MAINNET);
    }

    #[test]
    fn opening_a_store_and_chain_reports_no_tip_yet() {
        let store = Store::open_in_memory().unwrap();
        let chain = BlockChain::new(store);
        assert_eq!(chain.latest_height().unwrap(), None);
        assert_eq!(chain.latest_hash().unwrap(), None);
    }
}
