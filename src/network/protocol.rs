//! Bitcoin P2P message types and their little-endian wire encodings.
//!
//! Every struct here round-trips through [`Message::encode_payload`]/
//! [`Message::decode_payload`] without going through a general-purpose
//! serializer — Bitcoin's wire format mixes fixed-width little-endian
//! fields with `VarInt`-prefixed arrays in a way no off-the-shelf derive
//! produces, so each message writes and reads its own fields explicitly.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

use super::varint::{get_varint, get_varstr, put_varint, put_varstr, varint_len};

/// Cap on a decoded payload, matching the limit enforced by the frame codec.
pub const MAX_PAYLOAD_LEN: u32 = 32 * 1024 * 1024;

/// `services` bit for a full node able to serve the complete chain.
pub const NODE_NETWORK: u64 = 1 << 0;
/// `services` bit for bloom-filter support (BIP37); SPV clients never set
/// this themselves but peers supporting it are preferred sync targets.
pub const NODE_BLOOM: u64 = 1 << 2;

/// Inventory vector type: a filtered block matching an installed bloom
/// filter, requested via `getdata` during sync.
pub const INV_FILTERED_BLOCK: u32 = 3;
pub const INV_TX: u32 = 1;
pub const INV_BLOCK: u32 = 2;

/// 26-byte network address record embedded in `version` and `addr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAddress {
    pub services: u64,
    /// IPv4 addresses are stored IPv4-mapped (`::ffff:a.b.c.d`).
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetworkAddress {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.services);
        buf.put_slice(&self.ip);
        buf.put_u16(self.port); // port is big-endian on the wire
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        if buf.remaining() < 26 {
            return Err(WireError::Truncated { needed: 26 - buf.remaining() });
        }
        let services = buf.get_u64_le();
        let mut ip = [0u8; 16];
        buf.copy_to_slice(&mut ip);
        let port = buf.get_u16();
        Ok(Self { services, ip, port })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub addr_recv: NetworkAddress,
    pub addr_from: NetworkAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingMessage {
    pub nonce: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongMessage {
    pub nonce: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryItem {
    pub kind: u32,
    pub hash: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvMessage {
    pub items: Vec<InventoryItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDataMessage {
    pub items: Vec<InventoryItem>,
}

/// A block locator: a sparse set of known hashes, densest near the tip,
/// used to find the common ancestor with a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetHeadersMessage {
    pub version: i32,
    pub locator_hashes: Vec<[u8; 32]>,
    pub hash_stop: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlocksMessage {
    pub version: i32,
    pub locator_hashes: Vec<[u8; 32]>,
    pub hash_stop: [u8; 32],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub const SERIALIZED_LEN: usize = 80;

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.version);
        buf.put_slice(&self.prev_hash);
        buf.put_slice(&self.merkle_root);
        buf.put_u32_le(self.timestamp);
        buf.put_u32_le(self.bits);
        buf.put_u32_le(self.nonce);
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        if buf.remaining() < Self::SERIALIZED_LEN {
            return Err(WireError::Truncated {
                needed: Self::SERIALIZED_LEN - buf.remaining(),
            });
        }
        let version = buf.get_i32_le();
        let mut prev_hash = [0u8; 32];
        buf.copy_to_slice(&mut prev_hash);
        let mut merkle_root = [0u8; 32];
        buf.copy_to_slice(&mut merkle_root);
        let timestamp = buf.get_u32_le();
        let bits = buf.get_u32_le();
        let nonce = buf.get_u32_le();
        Ok(Self {
            version,
            prev_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
        })
    }

    /// Serialized header bytes, the preimage for the block id hash.
    pub fn serialized(&self) -> [u8; Self::SERIALIZED_LEN] {
        let mut buf = BytesMut::with_capacity(Self::SERIALIZED_LEN);
        self.encode(&mut buf);
        let mut out = [0u8; Self::SERIALIZED_LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// Natural byte-order double-SHA-256 of the header; the canonical id.
    pub fn id(&self) -> [u8; 32] {
        crate::crypto::sha256d(&self.serialized())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersMessage {
    pub headers: Vec<BlockHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutPoint {
    pub tx_id: [u8; 32],
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prev_out: OutPoint,
    pub script_sig: Bytes,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxMessage {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl TxMessage {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32_le(self.version);
        put_varint(buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.put_slice(&input.prev_out.tx_id);
            buf.put_u32_le(input.prev_out.index);
            put_varstr(buf, &input.script_sig);
            buf.put_u32_le(input.sequence);
        }
        put_varint(buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.put_i64_le(output.value);
            put_varstr(buf, &output.script_pubkey);
        }
        buf.put_u32_le(self.lock_time);
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        if buf.remaining() < 4 {
            return Err(WireError::Truncated { needed: 4 });
        }
        let version = buf.get_i32_le();
        let input_count = get_varint(buf).ok_or(WireError::Truncated { needed: 1 })?;
        let mut inputs = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            if buf.remaining() < 36 {
                return Err(WireError::Truncated { needed: 36 - buf.remaining() });
            }
            let mut tx_id = [0u8; 32];
            buf.copy_to_slice(&mut tx_id);
            let index = buf.get_u32_le();
            let script_sig = get_varstr(buf, MAX_PAYLOAD_LEN as usize)
                .map_err(|_| WireError::MalformedField {
                    command: "tx".to_string(),
                    field: "script_sig",
                })?
                .ok_or(WireError::Truncated { needed: 1 })?;
            if buf.remaining() < 4 {
                return Err(WireError::Truncated { needed: 4 });
            }
            let sequence = buf.get_u32_le();
            inputs.push(TxIn {
                prev_out: OutPoint { tx_id, index },
                script_sig: Bytes::from(script_sig),
                sequence,
            });
        }
        let output_count = get_varint(buf).ok_or(WireError::Truncated { needed: 1 })?;
        let mut outputs = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            if buf.remaining() < 8 {
                return Err(WireError::Truncated { needed: 8 - buf.remaining() });
            }
            let value = buf.get_i64_le();
            let script_pubkey = get_varstr(buf, MAX_PAYLOAD_LEN as usize)
                .map_err(|_| WireError::MalformedField {
                    command: "tx".to_string(),
                    field: "script_pubkey",
                })?
                .ok_or(WireError::Truncated { needed: 1 })?;
            outputs.push(TxOut {
                value,
                script_pubkey: Bytes::from(script_pubkey),
            });
        }
        if buf.remaining() < 4 {
            return Err(WireError::Truncated { needed: 4 });
        }
        let lock_time = buf.get_u32_le();
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Canonical serialization used to compute the transaction id.
    pub fn serialized(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Natural byte-order double-SHA-256 of the canonical serialization.
    pub fn id(&self) -> [u8; 32] {
        crate::crypto::sha256d(&self.serialized())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlockMessage {
    pub header: BlockHeader,
    pub total_transactions: u32,
    pub hashes: Vec<[u8; 32]>,
    pub flags: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomFlags {
    None = 0,
    All = 1,
    PubkeyOnly = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterLoadMessage {
    pub filter: Vec<u8>,
    pub n_hash_funcs: u32,
    pub tweak: u32,
    pub flags: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectMessage<'a> {
    pub message: &'a str,
    pub code: u8,
    pub reason: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedRejectMessage {
    pub message: String,
    pub code: u8,
    pub reason: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrMessage {
    pub addresses: Vec<(u32, NetworkAddress)>,
}

/// The decoded set of message kinds this client sends or understands.
/// Anything else (`sendcmpct`, `feefilter`, ...) decodes to `Unknown` and
/// is silently dropped by the controller — never treated as fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    Ping(PingMessage),
    Pong(PongMessage),
    Inv(InvMessage),
    GetData(GetDataMessage),
    GetHeaders(GetHeadersMessage),
    Headers(HeadersMessage),
    GetBlocks(GetBlocksMessage),
    MerkleBlock(MerkleBlockMessage),
    Tx(TxMessage),
    FilterLoad(FilterLoadMessage),
    Mempool,
    Reject(OwnedRejectMessage),
    Addr(AddrMessage),
    /// An unrecognized command; carries the command name for logging.
    Unknown(String),
}

impl Message {
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::GetHeaders(_) => "getheaders",
            Message::Headers(_) => "headers",
            Message::GetBlocks(_) => "getblocks",
            Message::MerkleBlock(_) => "merkleblock",
            Message::Tx(_) => "tx",
            Message::FilterLoad(_) => "filterload",
            Message::Mempool => "mempool",
            Message::Reject(_) => "reject",
            Message::Addr(_) => "addr",
            Message::Unknown(cmd) => cmd.as_str(),
        }
    }

    pub fn encode_payload(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        match self {
            Message::Version(v) => {
                buf.put_i32_le(v.version);
                buf.put_u64_le(v.services);
                buf.put_i64_le(v.timestamp);
                v.addr_recv.encode(&mut buf);
                v.addr_from.encode(&mut buf);
                buf.put_u64_le(v.nonce);
                put_varstr(&mut buf, v.user_agent.as_bytes());
                buf.put_i32_le(v.start_height);
                buf.put_u8(v.relay as u8);
            }
            Message::Verack | Message::Mempool => {}
            Message::Ping(p) => buf.put_u64_le(p.nonce),
            Message::Pong(p) => buf.put_u64_le(p.nonce),
            Message::Inv(inv) => encode_inventory(&mut buf, &inv.items),
            Message::GetData(gd) => encode_inventory(&mut buf, &gd.items),
            Message::GetHeaders(gh) => encode_locator(&mut buf, gh.version, &gh.locator_hashes, &gh.hash_stop),
            Message::GetBlocks(gb) => encode_locator(&mut buf, gb.version, &gb.locator_hashes, &gb.hash_stop),
            Message::Headers(h) => {
                put_varint(&mut buf, h.headers.len() as u64);
                for header in &h.headers {
                    header.encode(&mut buf);
                    // headers message carries a trailing tx_count, always 0
                    buf.put_u8(0);
                }
            }
            Message::MerkleBlock(mb) => {
                mb.header.encode(&mut buf);
                buf.put_u32_le(mb.total_transactions);
                put_varint(&mut buf, mb.hashes.len() as u64);
                for hash in &mb.hashes {
                    buf.put_slice(hash);
                }
                put_varstr(&mut buf, &mb.flags);
            }
            Message::Tx(tx) => tx.encode(&mut buf),
            Message::FilterLoad(fl) => {
                put_varstr(&mut buf, &fl.filter);
                buf.put_u32_le(fl.n_hash_funcs);
                buf.put_u32_le(fl.tweak);
                buf.put_u8(fl.flags);
            }
            Message::Reject(r) => {
                put_varstr(&mut buf, r.message.as_bytes());
                buf.put_u8(r.code);
                put_varstr(&mut buf, r.reason.as_bytes());
                buf.put_slice(&r.data);
            }
            Message::Addr(addr) => {
                put_varint(&mut buf, addr.addresses.len() as u64);
                for (timestamp, address) in &addr.addresses {
                    buf.put_u32_le(*timestamp);
                    address.encode(&mut buf);
                }
            }
            Message::Unknown(_) => {}
        }
        buf
    }

    pub fn decode_payload(command: &str, mut payload: Bytes) -> Result<Self, WireError> {
        match command {
            "version" => {
                if payload.remaining() < 20 {
                    return Err(WireError::Truncated { needed: 20 - payload.remaining() });
                }
                let version = payload.get_i32_le();
                let services = payload.get_u64_le();
                let timestamp = payload.get_i64_le();
                let addr_recv = NetworkAddress::decode(&mut payload)?;
                let addr_from = NetworkAddress::decode(&mut payload)?;
                if payload.remaining() < 8 {
                    return Err(WireError::Truncated { needed: 8 });
                }
                let nonce = payload.get_u64_le();
                let user_agent_bytes = get_varstr(&mut payload, 1024)
                    .map_err(|_| WireError::MalformedField {
                        command: "version".to_string(),
                        field: "user_agent",
                    })?
                    .ok_or(WireError::Truncated { needed: 1 })?;
                let user_agent = String::from_utf8_lossy(&user_agent_bytes).into_owned();
                if payload.remaining() < 4 {
                    return Err(WireError::Truncated { needed: 4 });
                }
                let start_height = payload.get_i32_le();
                let relay = payload.remaining() > 0 && payload.get_u8() != 0;
                Ok(Message::Version(VersionMessage {
                    version,
                    services,
                    timestamp,
                    addr_recv,
                    addr_from,
                    nonce,
                    user_agent,
                    start_height,
                    relay,
                }))
            }
            "verack" => Ok(Message::Verack),
            "mempool" => Ok(Message::Mempool),
            "ping" => {
                if payload.remaining() < 8 {
                    return Err(WireError::Truncated { needed: 8 - payload.remaining() });
                }
                Ok(Message::Ping(PingMessage { nonce: payload.get_u64_le() }))
            }
            "pong" => {
                if payload.remaining() < 8 {
                    return Err(WireError::Truncated { needed: 8 - payload.remaining() });
                }
                Ok(Message::Pong(PongMessage { nonce: payload.get_u64_le() }))
            }
            "inv" => Ok(Message::Inv(InvMessage { items: decode_inventory(&mut payload, "inv")? })),
            "getdata" => Ok(Message::GetData(GetDataMessage {
                items: decode_inventory(&mut payload, "getdata")?,
            })),
            "getheaders" => {
                let (version, locator_hashes, hash_stop) = decode_locator(&mut payload, "getheaders")?;
                Ok(Message::GetHeaders(GetHeadersMessage { version, locator_hashes, hash_stop }))
            }
            "getblocks" => {
                let (version, locator_hashes, hash_stop) = decode_locator(&mut payload, "getblocks")?;
                Ok(Message::GetBlocks(GetBlocksMessage { version, locator_hashes, hash_stop }))
            }
            "headers" => {
                let count = get_varint(&mut payload).ok_or(WireError::Truncated { needed: 1 })?;
                let mut headers = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let header = BlockHeader::decode(&mut payload)?;
                    if payload.remaining() < 1 {
                        return Err(WireError::Truncated { needed: 1 });
                    }
                    payload.get_u8(); // trailing tx_count, always 0
                    headers.push(header);
                }
                Ok(Message::Headers(HeadersMessage { headers }))
            }
            "merkleblock" => {
                let header = BlockHeader::decode(&mut payload)?;
                if payload.remaining() < 4 {
                    return Err(WireError::Truncated { needed: 4 });
                }
                let total_transactions = payload.get_u32_le();
                let hash_count = get_varint(&mut payload).ok_or(WireError::Truncated { needed: 1 })?;
                let mut hashes = Vec::with_capacity(hash_count as usize);
                for _ in 0..hash_count {
                    if payload.remaining() < 32 {
                        return Err(WireError::Truncated { needed: 32 - payload.remaining() });
                    }
                    let mut hash = [0u8; 32];
                    payload.copy_to_slice(&mut hash);
                    hashes.push(hash);
                }
                let flags = get_varstr(&mut payload, MAX_PAYLOAD_LEN as usize)
                    .map_err(|_| WireError::MalformedField {
                        command: "merkleblock".to_string(),
                        field: "flags",
                    })?
                    .ok_or(WireError::Truncated { needed: 1 })?;
                Ok(Message::MerkleBlock(MerkleBlockMessage {
                    header,
                    total_transactions,
                    hashes,
                    flags,
                }))
            }
            "tx" => Ok(Message::Tx(TxMessage::decode(&mut payload)?)),
            "filterload" => {
                let filter = get_varstr(&mut payload, MAX_PAYLOAD_LEN as usize)
                    .map_err(|_| WireError::MalformedField {
                        command: "filterload".to_string(),
                        field: "filter",
                    })?
                    .ok_or(WireError::Truncated { needed: 1 })?;
                if payload.remaining() < 9 {
                    return Err(WireError::Truncated { needed: 9 - payload.remaining() });
                }
                let n_hash_funcs = payload.get_u32_le();
                let tweak = payload.get_u32_le();
                let flags = payload.get_u8();
                Ok(Message::FilterLoad(FilterLoadMessage { filter, n_hash_funcs, tweak, flags }))
            }
            "reject" => {
                let message = get_varstr(&mut payload, 1024)
                    .map_err(|_| WireError::MalformedField { command: "reject".to_string(), field: "message" })?
                    .ok_or(WireError::Truncated { needed: 1 })?;
                if payload.remaining() < 1 {
                    return Err(WireError::Truncated { needed: 1 });
                }
                let code = payload.get_u8();
                let reason = get_varstr(&mut payload, 1024)
                    .map_err(|_| WireError::MalformedField { command: "reject".to_string(), field: "reason" })?
                    .ok_or(WireError::Truncated { needed: 1 })?;
                let data = payload.to_vec();
                Ok(Message::Reject(OwnedRejectMessage {
                    message: String::from_utf8_lossy(&message).into_owned(),
                    code,
                    reason: String::from_utf8_lossy(&reason).into_owned(),
                    data,
                }))
            }
            "addr" => {
                let count = get_varint(&mut payload).ok_or(WireError::Truncated { needed: 1 })?;
                let mut addresses = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    if payload.remaining() < 4 {
                        return Err(WireError::Truncated { needed: 4 - payload.remaining() });
                    }
                    let timestamp = payload.get_u32_le();
                    let address = NetworkAddress::decode(&mut payload)?;
                    addresses.push((timestamp, address));
                }
                Ok(Message::Addr(AddrMessage { addresses }))
            }
            other => Ok(Message::Unknown(other.to_string())),
        }
    }
}

fn encode_inventory(buf: &mut BytesMut, items: &[InventoryItem]) {
    put_varint(buf, items.len() as u64);
    for item in items {
        buf.put_u32_le(item.kind);
        buf.put_slice(&item.hash);
    }
}

fn decode_inventory(buf: &mut Bytes, command: &str) -> Result<Vec<InventoryItem>, WireError> {
    let count = get_varint(buf).ok_or(WireError::Truncated { needed: 1 })?;
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if buf.remaining() < 36 {
            return Err(WireError::MalformedField {
                command: command.to_string(),
                field: "inventory",
            });
        }
        let kind = buf.get_u32_le();
        let mut hash = [0u8; 32];
        buf.copy_to_slice(&mut hash);
        items.push(InventoryItem { kind, hash });
    }
    Ok(items)
}

fn encode_locator(buf: &mut BytesMut, version: i32, locator_hashes: &[[u8; 32]], hash_stop: &[u8; 32]) {
    buf.put_i32_le(version);
    put_varint(buf, locator_hashes.len() as u64);
    for hash in locator_hashes {
        buf.put_slice(hash);
    }
    buf.put_slice(hash_stop);
}

fn decode_locator(
    buf: &mut Bytes,
    command: &str,
) -> Result<(i32, Vec<[u8; 32]>, [u8; 32]), WireError> {
    if buf.remaining() < 4 {
        return Err(WireError::Truncated { needed: 4 - buf.remaining() });
    }
    let version = buf.get_i32_le();
    let count = get_varint(buf).ok_or(WireError::Truncated { needed: 1 })?;
    let mut locator_hashes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        if buf.remaining() < 32 {
            return Err(WireError::MalformedField {
                command: command.to_string(),
                field: "locator_hash",
            });
        }
        let mut hash = [0u8; 32];
        buf.copy_to_slice(&mut hash);
        locator_hashes.push(hash);
    }
    if buf.remaining() < 32 {
        return Err(WireError::MalformedField {
            command: command.to_string(),
            field: "hash_stop",
        });
    }
    let mut hash_stop = [0u8; 32];
    buf.copy_to_slice(&mut hash_stop);
    Ok((version, locator_hashes, hash_stop))
}

/// Byte length a `VarInt` encoding of `n` items would occupy, used by
/// callers sizing buffers before encoding.
pub fn inventory_len(count: usize) -> usize {
    varint_len(count as u64) + count * 36
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_address() -> NetworkAddress {
        NetworkAddress { services: NODE_NETWORK, ip: [0u8; 16], port: 8333 }
    }

    #[test]
    fn version_message_round_trips() {
        let msg = Message::Version(VersionMessage {
            version: 70015,
            services: NODE_NETWORK,
            timestamp: 1_700_000_000,
            addr_recv: sample_address(),
            addr_from: sample_address(),
            nonce: 0xdead_beef_cafe_f00d,
            user_agent: "/spv-sync:0.1.0/".to_string(),
            start_height: 800_000,
            relay: true,
        });
        let payload = msg.encode_payload().freeze();
        let decoded = Message::decode_payload("version", payload).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn version_message_has_expected_byte_layout() {
        let msg = VersionMessage {
            version: 1,
            services: 0,
            timestamp: 0,
            addr_recv: NetworkAddress { services: 0, ip: [0u8; 16], port: 0 },
            addr_from: NetworkAddress { services: 0, ip: [0u8; 16], port: 0 },
            nonce: 0,
            user_agent: "".to_string(),
            start_height: 0,
            relay: false,
        };
        let payload = Message::Version(msg).encode_payload();
        // version(4) + services(8) + timestamp(8) + 2*addr(26) + nonce(8) + varstr(1) + start_height(4) + relay(1)
        assert_eq!(payload.len(), 4 + 8 + 8 + 26 + 26 + 8 + 1 + 4 + 1);
        assert_eq!(&payload[0..4], &1i32.to_le_bytes());
    }

    #[test]
    fn ping_pong_round_trip() {
        let ping = Message::Ping(PingMessage { nonce: 42 });
        let payload = ping.encode_payload().freeze();
        assert_eq!(Message::decode_payload("ping", payload).unwrap(), ping);
    }

    #[test]
    fn inv_message_has_exact_layout() {
        let items = vec![InventoryItem { kind: INV_TX, hash: [7u8; 32] }];
        let msg = Message::Inv(InvMessage { items: items.clone() });
        let payload = msg.encode_payload();
        assert_eq!(payload.len(), 1 + 4 + 32);
        assert_eq!(payload[0], 1); // varint count
        assert_eq!(&payload[1..5], &INV_TX.to_le_bytes());
        assert_eq!(&payload[5..37], &[7u8; 32]);
    }

    #[test]
    fn tx_message_round_trips_with_min_and_max_varint_sizes() {
        let tx_small = TxMessage { version: 1, inputs: vec![], outputs: vec![], lock_time: 0 };
        let payload = tx_small.serialized();
        assert_eq!(TxMessage::decode(&mut payload.clone()).unwrap(), tx_small);

        let big_script = vec![0xAB; 100_000];
        let tx_large = TxMessage {
            version: 2,
            inputs: vec![TxIn {
                prev_out: OutPoint { tx_id: [1u8; 32], index: 0 },
                script_sig: Bytes::from(big_script.clone()),
                sequence: 0xffff_ffff,
            }],
            outputs: vec![TxOut { value: 5000, script_pubkey: Bytes::from(big_script) }],
            lock_time: 500_000,
        };
        let payload = tx_large.serialized();
        assert_eq!(TxMessage::decode(&mut payload.clone()).unwrap(), tx_large);
    }

    #[test]
    fn unknown_command_decodes_to_unknown_variant() {
        let decoded = Message::decode_payload("sendcmpct", Bytes::from_static(&[1, 2, 3])).unwrap();
        assert_eq!(decoded, Message::Unknown("sendcmpct".to_string()));
    }

    #[test]
    fn block_header_id_is_double_sha256_of_serialization() {
        let header = BlockHeader {
            version: 1,
            prev_hash: [0u8; 32],
            merkle_root: [1u8; 32],
            timestamp: 0,
            bits: 0,
            nonce: 0,
        };
        assert_eq!(header.id(), crate::crypto::sha256d(&header.serialized()));
    }
}
