//! Hashing and address-encoding primitives.
//!
//! `sha256`/`ripemd160`/`hash160` wrap the same `sha2`/`ripemd` crates used
//! throughout the rest of the crate for header and transaction hashing;
//! `base58check_encode`/`decode` wrap `bs58`'s `check` feature for the
//! P2PKH/P2SH address forms produced by the script extractor.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::error::ConversionError;

/// Single SHA-256 digest.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Double SHA-256, Bitcoin's standard hash for block headers and
/// transactions (`SHA256(SHA256(x))`).
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// RIPEMD-160 digest.
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `RIPEMD160(SHA256(x))`, Bitcoin's standard pubkey/script hash used to
/// build P2PKH/P2SH addresses.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

/// Encode a payload under the given version byte as Base58Check.
pub fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(version);
    buf.extend_from_slice(payload);
    bs58::encode(buf).with_check().into_string()
}

/// Decode a Base58Check string, returning the version byte and payload.
pub fn base58check_decode(s: &str) -> Result<(u8, Vec<u8>), ConversionError> {
    let decoded = bs58::decode(s)
        .with_check(None)
        .into_vec()
        .map_err(|_| ConversionError::BadChecksum)?;
    let (version, payload) = decoded.split_first().ok_or(ConversionError::BadChecksum)?;
    Ok((*version, payload.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty_matches_known_vector() {
        let digest = sha256(b"");
        assert_eq!(
            hex::encode(digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256d_differs_from_single_sha256() {
        assert_ne!(sha256(b"hello"), sha256d(b"hello"));
    }

    #[test]
    fn hash160_is_ripemd_of_sha256() {
        let data = b"test data";
        assert_eq!(hash160(data), ripemd160(&sha256(data)));
    }

    #[test]
    fn hash_functions_are_deterministic() {
        let data = b"deterministic";
        assert_eq!(sha256(data), sha256(data));
        assert_eq!(sha256d(data), sha256d(data));
        assert_eq!(hash160(data), hash160(data));
    }

    #[test]
    fn base58check_round_trips() {
        let payload = hash160(b"some pubkey bytes");
        let encoded = base58check_encode(0x00, &payload);
        let (version, decoded) = base58check_decode(&encoded).unwrap();
        assert_eq!(version, 0x00);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn base58check_rejects_corrupted_checksum() {
        let payload = hash160(b"some pubkey bytes");
        let mut encoded = base58check_encode(0x00, &payload);
        encoded.push('x');
        assert!(base58check_decode(&encoded).is_err());
    }
}
