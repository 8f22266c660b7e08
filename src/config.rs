//! Network descriptors and client configuration.
//!
//! `Network` is the immutable, per-chain set of constants a peer
//! connection and the address extractor both need (magic bytes, default
//! port, address version bytes, seed hostnames, genesis hash, trusted
//! checkpoints). `ClientConfig` is the mutable bag of knobs a caller
//! supplies to open a `PeerGroup`/`Store` pair.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::timeout::{
    DEFAULT_BLOCK_ASSEMBLY_TIMEOUT, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_IDLE_TIMEOUT,
    DEFAULT_PONG_TIMEOUT,
};

/// A single checkpoint: a block height known in advance to be on the
/// canonical chain, paired with its header hash (natural byte order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: u32,
    pub hash: [u8; 32],
}

/// Immutable descriptor for a Bitcoin-family network.
///
/// Constructed once per process and shared by reference; never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Network {
    pub name: &'static str,
    pub magic: [u8; 4],
    pub default_port: u16,
    pub p2pkh_version: u8,
    pub p2sh_version: u8,
    pub dns_seeds: &'static [&'static str],
    pub genesis_hash: [u8; 32],
    pub checkpoints: &'static [Checkpoint],
}

/// Bitcoin mainnet.
pub const BITCOIN_MAINNET: Network = Network {
    name: "bitcoin-mainnet",
    magic: [0xF9, 0xBE, 0xB4, 0xD9],
    default_port: 8333,
    p2pkh_version: 0x00,
    p2sh_version: 0x05,
    dns_seeds: &[
        "seed.bitcoin.sipa.be",
        "dnsseed.bluematt.me",
        "dnsseed.bitcoin.dashjr.org",
        "seed.bitcoinstats.com",
        "seed.btc.petertodd.org",
        "seed.bitcoin.sprovoost.nl",
        "dnsseed.emzy.de",
    ],
    genesis_hash: [
        0x6f, 0xe2, 0x8c, 0x0a, 0xb6, 0xf1, 0xb3, 0x72, 0xc1, 0xa6, 0xa2, 0x46, 0xae, 0x63, 0xf7,
        0x4f, 0x93, 0x1e, 0x83, 0x65, 0xe1, 0x5a, 0x08, 0x9c, 0x68, 0xd6, 0x19, 0x00, 0x00, 0x00,
        0x00, 0x00,
    ],
    checkpoints: &[],
};

/// Bitcoin testnet3.
pub const BITCOIN_TESTNET3: Network = Network {
    name: "bitcoin-testnet3",
    magic: [0x0B, 0x11, 0x09, 0x07],
    default_port: 18333,
    p2pkh_version: 0x6F,
    p2sh_version: 0xC4,
    dns_seeds: &[
        "testnet-seed.bitcoin.jonasschnelli.ch",
        "seed.tbtc.petertodd.org",
        "seed.testnet.bitcoin.sprovoost.nl",
    ],
    genesis_hash: [
        0x43, 0x49, 0x7f, 0xd7, 0xf8, 0x26, 0x95, 0x71, 0x08, 0xf4, 0xa3, 0x0f, 0xd9, 0xce, 0xc3,
        0xae, 0xba, 0x79, 0x97, 0x20, 0x84, 0xe9, 0x0e, 0xad, 0x01, 0xea, 0x33, 0x09, 0x00, 0x00,
        0x00, 0x00,
    ],
    checkpoints: &[],
};

/// Local regression-test network. No DNS seeds; peers are added manually.
pub const BITCOIN_REGTEST: Network = Network {
    name: "bitcoin-regtest",
    magic: [0xFA, 0xBF, 0xB5, 0xDA],
    default_port: 18444,
    p2pkh_version: 0x6F,
    p2sh_version: 0xC4,
    dns_seeds: &[],
    genesis_hash: [
        0x06, 0x22, 0x6e, 0x46, 0x11, 0x1a, 0x0b, 0x59, 0xca, 0xaf, 0x12, 0x60, 0x43, 0xeb, 0x5b,
        0xbf, 0x28, 0xc3, 0x4f, 0x3a, 0x5e, 0x33, 0x2a, 0x1f, 0xc7, 0xb2, 0xb7, 0x3c, 0xf1, 0x88,
        0x91, 0x0f,
    ],
    checkpoints: &[],
};

/// Bitcoin Cash mainnet (a BTC-family variant per the crate's remit).
pub const BITCOIN_CASH_MAINNET: Network = Network {
    name: "bitcoin-cash-mainnet",
    magic: [0xE3, 0xE1, 0xF3, 0xE8],
    default_port: 8333,
    p2pkh_version: 0x00,
    p2sh_version: 0x05,
    dns_seeds: &[
        "seed.bchd.cash",
        "seed.bch.loping.net",
        "dnsseed.electroncash.de",
    ],
    genesis_hash: [
        0x6f, 0xe2, 0x8c, 0x0a, 0xb6, 0xf1, 0xb3, 0x72, 0xc1, 0xa6, 0xa2, 0x46, 0xae, 0x63, 0xf7,
        0x4f, 0x93, 0x1e, 0x83, 0x65, 0xe1, 0x5a, 0x08, 0x9c, 0x68, 0xd6, 0x19, 0x00, 0x00, 0x00,
        0x00, 0x00,
    ],
    checkpoints: &[],
};

fn default_max_connections() -> usize {
    8
}

fn default_user_agent() -> String {
    "/spv-sync:0.1.0/".to_string()
}

fn default_db_name() -> String {
    "wallet.sqlite".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(remote = "Duration")]
struct DurationSeconds(#[serde(getter = "Duration::as_secs")] u64);

impl From<DurationSeconds> for Duration {
    fn from(value: DurationSeconds) -> Self {
        Duration::from_secs(value.0)
    }
}

fn default_handshake_timeout() -> Duration {
    DEFAULT_HANDSHAKE_TIMEOUT
}

fn default_idle_timeout() -> Duration {
    DEFAULT_IDLE_TIMEOUT
}

fn default_pong_timeout() -> Duration {
    DEFAULT_PONG_TIMEOUT
}

fn default_block_assembly_timeout() -> Duration {
    DEFAULT_BLOCK_ASSEMBLY_TIMEOUT
}

/// Consumer-facing configuration for opening a `PeerGroup`/`Store` pair.
///
/// No field here is ever read from an environment variable or a process
/// global; every value a caller needs is supplied explicitly through this
/// struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Network this client connects to and indexes against.
    #[serde(skip, default = "default_network")]
    pub network: Network,

    /// Maximum number of simultaneously connected peers.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// File name of the SQLite database (relative to a caller-chosen data
    /// directory). Defaults to `wallet.sqlite`.
    #[serde(default = "default_db_name")]
    pub db_name: String,

    /// Optional SQLCipher passphrase. Only meaningful when the crate is
    /// built with the `encryption` feature; ignored otherwise.
    #[serde(default, skip_serializing)]
    pub db_passphrase: Option<String>,

    /// User-agent string sent in the `version` message.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(with = "DurationSeconds", default = "default_handshake_timeout")]
    pub handshake_timeout: Duration,

    #[serde(with = "DurationSeconds", default = "default_idle_timeout")]
    pub idle_timeout: Duration,

    #[serde(with = "DurationSeconds", default = "default_pong_timeout")]
    pub pong_timeout: Duration,

    #[serde(with = "DurationSeconds", default = "default_block_assembly_timeout")]
    pub block_assembly_timeout: Duration,
}

fn default_network() -> Network {
    BITCOIN_MAINNET
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            network: BITCOIN_MAINNET,
            max_connections: default_max_connections(),
            db_name: default_db_name(),
            db_passphrase: None,
            user_agent: default_user_agent(),
            handshake_timeout: default_handshake_timeout(),
            idle_timeout: default_idle_timeout(),
            pong_timeout: default_pong_timeout(),
            block_assembly_timeout: default_block_assembly_timeout(),
        }
    }
}

impl ClientConfig {
    /// Start from the defaults for the given network.
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_and_testnet_have_distinct_magic() {
        assert_ne!(BITCOIN_MAINNET.magic, BITCOIN_TESTNET3.magic);
        assert_ne!(BITCOIN_MAINNET.magic, BITCOIN_REGTEST.magic);
    }

    #[test]
    fn regtest_has_no_dns_seeds() {
        assert!(BITCOIN_REGTEST.dns_seeds.is_empty());
    }

    #[test]
    fn default_config_targets_mainnet() {
        let config = ClientConfig::default();
        assert_eq!(config.network, BITCOIN_MAINNET);
        assert_eq!(config.db_name, "wallet.sqlite");
    }

    #[test]
    fn for_network_overrides_network_only() {
        let config = ClientConfig::for_network(BITCOIN_TESTNET3);
        assert_eq!(config.network, BITCOIN_TESTNET3);
        assert_eq!(config.max_connections, default_max_connections());
    }
}
