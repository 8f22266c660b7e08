//! Wire protocol, peer connections, and the peer-pool coordinator.
//!
//! Layered bottom-up: `varint`/`protocol`/`bloom` are pure encode/decode
//! with no I/O, `codec` frames them over a byte stream, `peer` drives one
//! socket's handshake and liveness protocol, and `peer_group` manages a
//! pool of peers and elects the one driving chain sync.

pub mod bloom;
pub mod codec;
pub mod peer;
pub mod peer_group;
pub mod protocol;
pub mod varint;

pub use peer::{PeerCommand, PeerEvent, PeerHandle, PeerState};
pub use peer_group::{CheckpointSyncer, ChannelDelegate, PeerGroup, PeerGroupDelegate, PeerGroupEvent};
