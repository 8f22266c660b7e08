//! BIP37 bloom filter construction.
//!
//! No crate in the corpus provides a murmur3 implementation, so the hash
//! used by BIP37 (32-bit murmur3 with a per-filter tweak) is hand-rolled
//! here — it is a small, fully specified algorithm and the only piece of
//! cryptography this crate cannot simply delegate to `sha2`/`ripemd`.

use rand::RngCore;

use crate::error::ProtocolError;

const BIP37_CONSTANT: u32 = 0xFBA4_C795;
const FALSE_POSITIVE_RATE: f64 = 0.00005;
const MAX_FILTER_BYTES: usize = 36_000;
const MAX_HASH_FUNCS: u32 = 50;

/// 32-bit murmur3 (x86) as specified by BIP37.
fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h1 = seed;
    let chunks = data.chunks_exact(4);
    let tail = chunks.remainder();

    for chunk in chunks {
        let mut k1 = u32::from_le_bytes(chunk.try_into().unwrap());
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);

        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let mut k1 = 0u32;
    for (i, &byte) in tail.iter().enumerate().rev() {
        k1 ^= (byte as u32) << (8 * i);
    }
    if !tail.is_empty() {
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85eb_ca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2_ae35);
    h1 ^= h1 >> 16;
    h1
}

/// A probabilistic filter of elements (addresses, outpoints, scripts) to
/// install on a peer via `filterload`, so it relays only matching
/// transactions.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u8>,
    n_hash_funcs: u32,
    tweak: u32,
}

impl BloomFilter {
    /// Size the filter for `n_elements` at the BIP37-recommended false
    /// positive rate, with a random tweak.
    pub fn new(n_elements: usize) -> Self {
        Self::with_tweak(n_elements, rand::thread_rng().next_u32())
    }

    /// Same sizing as [`BloomFilter::new`] but with an explicit tweak,
    /// for deterministic tests.
    pub fn with_tweak(n_elements: usize, tweak: u32) -> Self {
        let n = n_elements.max(1) as f64;
        let size_bits = (-1.0 / (2f64.ln().powi(2)) * n * FALSE_POSITIVE_RATE.ln())
            .max(8.0)
            .min((MAX_FILTER_BYTES * 8) as f64);
        let size_bytes = ((size_bits / 8.0).ceil() as usize).max(1);

        let n_hash_funcs = ((size_bytes * 8) as f64 / n * 2f64.ln())
            .max(1.0)
            .min(MAX_HASH_FUNCS as f64) as u32;

        Self {
            bits: vec![0u8; size_bytes],
            n_hash_funcs,
            tweak,
        }
    }

    /// An empty filter of the minimum legal size: matches nothing, but is
    /// still a well-formed `filterload` payload.
    pub fn empty() -> Self {
        Self { bits: vec![0u8], n_hash_funcs: 1, tweak: 0 }
    }

    fn hash_index(&self, data: &[u8], hash_num: u32) -> usize {
        let seed = hash_num.wrapping_mul(BIP37_CONSTANT).wrapping_add(self.tweak);
        let hash = murmur3_32(data, seed);
        (hash as usize) % (self.bits.len() * 8)
    }

    /// Add an element to the filter.
    pub fn insert(&mut self, data: &[u8]) {
        for i in 0..self.n_hash_funcs {
            let idx = self.hash_index(data, i);
            self.bits[idx / 8] |= 1 << (idx % 8);
        }
    }

    /// Test whether an element may be present (false positives possible,
    /// false negatives never).
    pub fn contains(&self, data: &[u8]) -> bool {
        (0..self.n_hash_funcs).all(|i| {
            let idx = self.hash_index(data, i);
            self.bits[idx / 8] & (1 << (idx % 8)) != 0
        })
    }

    pub fn n_hash_funcs(&self) -> u32 {
        self.n_hash_funcs
    }

    pub fn tweak(&self) -> u32 {
        self.tweak
    }

    pub fn filter_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Validate a filter received over the wire (defense against a
    /// malformed or oversized `filterload`, not something this client
    /// itself would ever produce).
    pub fn validate(filter: &[u8], n_hash_funcs: u32) -> Result<(), ProtocolError> {
        if filter.is_empty() || filter.len() > MAX_FILTER_BYTES {
            return Err(ProtocolError::InvalidBloomFilter(format!(
                "filter size {} out of bounds",
                filter.len()
            )));
        }
        if n_hash_funcs == 0 || n_hash_funcs > MAX_HASH_FUNCS {
            return Err(ProtocolError::InvalidBloomFilter(format!(
                "hash func count {} out of bounds",
                n_hash_funcs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_element_is_found() {
        let mut filter = BloomFilter::with_tweak(10, 12345);
        filter.insert(b"address-one");
        assert!(filter.contains(b"address-one"));
    }

    #[test]
    fn empty_filter_matches_nothing_meaningful() {
        let filter = BloomFilter::empty();
        // An empty filter's single all-zero byte cannot match an inserted
        // element since nothing was ever inserted.
        assert!(!filter.contains(b"anything"));
    }

    #[test]
    fn murmur3_matches_known_test_vector() {
        // BIP37 reference vector: seed 0, empty input hashes to 0.
        assert_eq!(murmur3_32(b"", 0), 0);
    }

    #[test]
    fn validate_rejects_oversized_filter() {
        let oversized = vec![0u8; MAX_FILTER_BYTES + 1];
        assert!(BloomFilter::validate(&oversized, 5).is_err());
    }

    #[test]
    fn validate_rejects_zero_hash_funcs() {
        assert!(BloomFilter::validate(&[0u8; 8], 0).is_err());
    }

    #[test]
    fn validate_accepts_well_formed_filter() {
        assert!(BloomFilter::validate(&[0u8; 8], 5).is_ok());
    }
}
