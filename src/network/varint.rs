//! Bitcoin's variable-length integer and string encodings.
//!
//! `VarInt` prefixes a value with a marker byte that determines how many
//! following bytes (if any) hold the value, all little-endian:
//!
//! | value range              | encoding                          |
//! |--------------------------|------------------------------------|
//! | `< 0xFD`                 | single byte                        |
//! | `<= 0xFFFF`               | `0xFD` + 2 bytes LE                |
//! | `<= 0xFFFF_FFFF`          | `0xFE` + 4 bytes LE                |
//! | else                      | `0xFF` + 8 bytes LE                |
//!
//! `VarStr` is a `VarInt` length followed by that many raw bytes.

use bytes::{Buf, BufMut};

use crate::error::WireError;

/// Number of bytes a value of `n` would encode to as a `VarInt`.
pub fn varint_len(n: u64) -> usize {
    match n {
        0..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

/// Write `n` as a `VarInt` into `buf`.
pub fn put_varint(buf: &mut impl BufMut, n: u64) {
    match n {
        0..=0xFC => buf.put_u8(n as u8),
        0xFD..=0xFFFF => {
            buf.put_u8(0xFD);
            buf.put_u16_le(n as u16);
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf.put_u8(0xFE);
            buf.put_u32_le(n as u32);
        }
        _ => {
            buf.put_u8(0xFF);
            buf.put_u64_le(n);
        }
    }
}

/// Read a `VarInt` from `buf`, advancing it past the bytes consumed.
///
/// Returns `None` (rather than erroring) when `buf` does not yet hold a
/// complete encoding; callers treat this as "need more bytes" the same way
/// the frame decoder does for the outer message length.
pub fn get_varint(buf: &mut impl Buf) -> Option<u64> {
    if !buf.has_remaining() {
        return None;
    }
    let marker = buf.chunk()[0];
    match marker {
        0xFD => {
            if buf.remaining() < 3 {
                return None;
            }
            buf.advance(1);
            Some(buf.get_u16_le() as u64)
        }
        0xFE => {
            if buf.remaining() < 5 {
                return None;
            }
            buf.advance(1);
            Some(buf.get_u32_le() as u64)
        }
        0xFF => {
            if buf.remaining() < 9 {
                return None;
            }
            buf.advance(1);
            Some(buf.get_u64_le())
        }
        _ => {
            buf.advance(1);
            Some(marker as u64)
        }
    }
}

/// Write a length-prefixed byte string.
pub fn put_varstr(buf: &mut impl BufMut, s: &[u8]) {
    put_varint(buf, s.len() as u64);
    buf.put_slice(s);
}

/// Read a length-prefixed byte string, capping the length at `max_len` to
/// guard against a peer claiming an absurd size before any bytes arrive.
pub fn get_varstr(buf: &mut impl Buf, max_len: usize) -> Result<Option<Vec<u8>>, WireError> {
    let mut peek = buf.chunk();
    let before = peek.remaining();
    let len = match get_varint(&mut peek) {
        Some(len) => len,
        None => return Ok(None),
    };
    if len as usize > max_len {
        return Err(WireError::MalformedField {
            command: "varstr".to_string(),
            field: "length",
        });
    }
    let consumed_by_len = before - peek.remaining();
    if buf.remaining() < consumed_by_len + len as usize {
        return Ok(None);
    }
    buf.advance(consumed_by_len);
    let mut out = vec![0u8; len as usize];
    buf.copy_to_slice(&mut out);
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn round_trip(n: u64) {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, n);
        assert_eq!(buf.len(), varint_len(n));
        let mut reader = &buf[..];
        assert_eq!(get_varint(&mut reader), Some(n));
        assert!(reader.is_empty());
    }

    #[test]
    fn one_byte_boundary() {
        round_trip(0);
        round_trip(0xFC);
    }

    #[test]
    fn three_byte_boundary() {
        round_trip(0xFD);
        round_trip(0xFFFF);
    }

    #[test]
    fn five_byte_boundary() {
        round_trip(0x1_0000);
        round_trip(0xFFFF_FFFF);
    }

    #[test]
    fn nine_byte_boundary() {
        round_trip(0x1_0000_0000);
        round_trip(u64::MAX);
    }

    #[test]
    fn varint_encodes_exact_prefix_bytes() {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, 0xFD);
        assert_eq!(&buf[..], &[0xFD, 0xFD, 0x00]);
    }

    #[test]
    fn varstr_round_trips() {
        let mut buf = BytesMut::new();
        put_varstr(&mut buf, b"hello");
        let mut reader = &buf[..];
        let s = get_varstr(&mut reader, 1024).unwrap().unwrap();
        assert_eq!(s, b"hello");
    }

    #[test]
    fn varstr_rejects_oversize_claim() {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, 100);
        let mut reader = &buf[..];
        assert!(get_varstr(&mut reader, 10).is_err());
    }

    #[test]
    fn varstr_returns_none_when_truncated() {
        let mut buf = BytesMut::new();
        put_varstr(&mut buf, b"hello world");
        buf.truncate(buf.len() - 3);
        let mut reader = &buf[..];
        assert_eq!(get_varstr(&mut reader, 1024).unwrap(), None);
    }
}
