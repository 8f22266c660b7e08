//! Error kinds for the SPV sync and indexing engine.
//!
//! Mirrors the five error categories a peer-to-peer SPV client runs into in
//! practice: malformed wire framing, protocol-level inconsistencies (bad
//! merkle roots, discontinuous header chains), timeouts, storage failures,
//! and address-decoding failures. See the propagation policy in the crate
//! docs: wire/protocol/timeout errors are absorbed by dropping the affected
//! peer, store errors propagate to the caller, conversion errors are
//! recorded but never fatal.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type returned by public APIs.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad magic, bad checksum, truncated payload, or an unparseable frame.
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    /// Merkle-root mismatch, header chain discontinuity, invalid bloom filter.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Handshake, idle, pong, or block-assembly quiescence timeout.
    #[error("timeout: {0}")]
    Timeout(#[from] TimeoutError),

    /// Database unavailable or schema mismatch.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Address decoding failure (bad checksum, unknown version byte).
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Programmer error: invalid configuration supplied by the caller.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Wire-codec-level failures. Always recoverable by dropping the peer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("bad magic bytes: expected {expected:?}, got {actual:?}")]
    BadMagic { expected: [u8; 4], actual: [u8; 4] },

    #[error("checksum mismatch for command {command:?}")]
    BadChecksum { command: String },

    #[error("payload length {len} exceeds maximum of {max}")]
    PayloadTooLarge { len: u32, max: u32 },

    #[error("frame truncated: need {needed} more bytes")]
    Truncated { needed: usize },

    #[error("malformed {field} in {command:?} message")]
    MalformedField { command: String, field: &'static str },
}

/// Protocol-level inconsistencies detected above the framing layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("computed merkle root {computed} does not match header root {expected}")]
    MerkleRootMismatch { computed: String, expected: String },

    #[error("header chain discontinuity: {prev_hash} does not extend stored tip")]
    HeaderChainDiscontinuity { prev_hash: String },

    #[error("invalid bloom filter: {0}")]
    InvalidBloomFilter(String),

    #[error("peer user-agent {0:?} is on the known-bad list")]
    BannedUserAgent(String),

    #[error("unexpected message {0:?} for current peer state")]
    UnexpectedMessage(String),
}

/// Timeouts, all controller-configurable (see `config::ClientConfig`).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutError {
    #[error("handshake did not complete within the configured window")]
    Handshake,
    #[error("no inbound message within the configured idle window")]
    Idle,
    #[error("no pong within the configured window")]
    Pong,
    #[error("merkle-block assembly quiescence window elapsed")]
    BlockAssembly,
}

/// Persistence failures. These propagate to the caller; sync halts until
/// the caller reopens the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    #[error("io error opening database: {0}")]
    Io(#[from] std::io::Error),
}

/// Address decoding failures. Never fatal: the offending row is stored
/// with an empty address string and simply will not appear in address
/// queries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversionError {
    #[error("base58check checksum mismatch")]
    BadChecksum,

    #[error("unknown address version byte {0:#x}")]
    UnknownVersion(u8),

    #[error("no recognized script shape")]
    UnrecognizedScript,
}
