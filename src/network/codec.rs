//! Frame-level `Decoder`/`Encoder` for the Bitcoin P2P wire format.
//!
//! A frame is: 4-byte magic, 12-byte zero-padded command name, 4-byte
//! little-endian payload length, 4-byte checksum (first four bytes of
//! `sha256d(payload)`), then the payload itself. `MessageCodec` is meant
//! to wrap a socket via `tokio_util::codec::Framed`, the same shape the
//! rest of this crate uses for every other length-prefixed stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::crypto::sha256d;
use crate::error::WireError;

use super::protocol::{Message, MAX_PAYLOAD_LEN};

const HEADER_LEN: usize = 4 + 12 + 4 + 4;

pub struct MessageCodec {
    magic: [u8; 4],
}

impl MessageCodec {
    pub fn new(magic: [u8; 4]) -> Self {
        Self { magic }
    }
}

fn command_bytes(command: &str) -> [u8; 12] {
    let mut bytes = [0u8; 12];
    let src = command.as_bytes();
    let len = src.len().min(12);
    bytes[..len].copy_from_slice(&src[..len]);
    bytes
}

fn command_str(bytes: &[u8; 12]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(12);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, WireError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&src[0..4]);
        if magic != self.magic {
            return Err(WireError::BadMagic {
                expected: self.magic,
                actual: magic,
            });
        }

        let mut command_raw = [0u8; 12];
        command_raw.copy_from_slice(&src[4..16]);
        let command = command_str(&command_raw);

        let payload_len = u32::from_le_bytes(src[16..20].try_into().unwrap());
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(WireError::PayloadTooLarge {
                len: payload_len,
                max: MAX_PAYLOAD_LEN,
            });
        }

        let mut checksum = [0u8; 4];
        checksum.copy_from_slice(&src[20..24]);

        let total_len = HEADER_LEN + payload_len as usize;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total_len);
        frame.advance(HEADER_LEN);
        let payload: Bytes = frame.freeze();

        let digest = sha256d(&payload);
        if digest[0..4] != checksum {
            return Err(WireError::BadChecksum { command });
        }

        let message = Message::decode_payload(&command, payload)?;
        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = WireError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), WireError> {
        let payload = item.encode_payload();
        let checksum = sha256d(&payload);

        dst.reserve(HEADER_LEN + payload.len());
        dst.put_slice(&self.magic);
        dst.put_slice(&command_bytes(item.command()));
        dst.put_u32_le(payload.len() as u32);
        dst.put_slice(&checksum[0..4]);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BITCOIN_MAINNET;
    use crate::network::protocol::PingMessage;

    #[test]
    fn encode_then_decode_recovers_message() {
        let mut codec = MessageCodec::new(BITCOIN_MAINNET.magic);
        let mut buf = BytesMut::new();
        let msg = Message::Ping(PingMessage { nonce: 99 });
        codec.encode(msg.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_needs_more_on_partial_header() {
        let mut codec = MessageCodec::new(BITCOIN_MAINNET.magic);
        let mut buf = BytesMut::from(&b"\xf9\xbe\xb4\xd9ping"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn decode_needs_more_on_partial_payload() {
        let mut codec = MessageCodec::new(BITCOIN_MAINNET.magic);
        let mut full = BytesMut::new();
        codec
            .encode(Message::Ping(PingMessage { nonce: 1 }), &mut full)
            .unwrap();
        let mut truncated = BytesMut::from(&full[..full.len() - 2]);
        assert_eq!(codec.decode(&mut truncated).unwrap(), None);
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut codec = MessageCodec::new(BITCOIN_MAINNET.magic);
        let mut buf = BytesMut::new();
        buf.put_slice(&[0u8; 24]);
        assert!(matches!(codec.decode(&mut buf), Err(WireError::BadMagic { .. })));
    }

    #[test]
    fn decode_rejects_bad_checksum() {
        let mut codec = MessageCodec::new(BITCOIN_MAINNET.magic);
        let mut buf = BytesMut::new();
        codec
            .encode(Message::Ping(PingMessage { nonce: 5 }), &mut buf)
            .unwrap();
        // corrupt the payload without fixing the checksum
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert!(matches!(codec.decode(&mut buf), Err(WireError::BadChecksum { .. })));
    }

    #[test]
    fn decode_rejects_oversized_payload_length() {
        let mut codec = MessageCodec::new(BITCOIN_MAINNET.magic);
        let mut buf = BytesMut::new();
        buf.put_slice(&BITCOIN_MAINNET.magic);
        buf.put_slice(&command_bytes("tx"));
        buf.put_u32_le(MAX_PAYLOAD_LEN + 1);
        buf.put_slice(&[0u8; 4]);
        assert!(matches!(codec.decode(&mut buf), Err(WireError::PayloadTooLarge { .. })));
    }

    #[test]
    fn unknown_command_is_never_fatal() {
        let mut codec = MessageCodec::new(BITCOIN_MAINNET.magic);
        let mut buf = BytesMut::new();
        buf.put_slice(&BITCOIN_MAINNET.magic);
        buf.put_slice(&command_bytes("sendcmpct"));
        buf.put_u32_le(1);
        let checksum = sha256d(&[0u8]);
        buf.put_slice(&checksum[0..4]);
        buf.put_slice(&[0u8]);
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Message::Unknown("sendcmpct".to_string()));
    }
}
