//! BIP37 partial merkle tree reconstruction.
//!
//! A `merkleblock` payload commits to a sparse subset of leaf hashes plus
//! a flag bitstream describing how to walk the tree: this module replays
//! that walk to recover both the set of matched transaction ids and the
//! merkle root, which the caller compares against the block header.

use crate::crypto::sha256d;
use crate::error::ProtocolError;

struct BitReader<'a> {
    bits: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(bits: &'a [u8]) -> Self {
        Self { bits, pos: 0 }
    }

    fn next(&mut self) -> Result<bool, ProtocolError> {
        let byte_idx = self.pos / 8;
        if byte_idx >= self.bits.len() {
            return Err(ProtocolError::InvalidBloomFilter(
                "merkle flag bitstream exhausted".to_string(),
            ));
        }
        let bit = (self.bits[byte_idx] >> (self.pos % 8)) & 1;
        self.pos += 1;
        Ok(bit != 0)
    }
}

/// Outcome of reconstructing a partial merkle tree: the recovered root
/// and the leaf hashes the flag bitstream identified as matched.
pub struct MerkleVerification {
    pub computed_root: [u8; 32],
    pub matched_tx_ids: Vec<[u8; 32]>,
}

fn tree_width(height: u32, total_transactions: u32) -> u32 {
    (total_transactions + (1 << height) - 1) >> height
}

fn tree_height(total_transactions: u32) -> u32 {
    let mut height = 0;
    while tree_width(height, total_transactions) > 1 {
        height += 1;
    }
    height
}

struct Traversal<'a> {
    hashes: &'a [[u8; 32]],
    hash_pos: usize,
    total_transactions: u32,
    matched: Vec<[u8; 32]>,
}

impl<'a> Traversal<'a> {
    fn next_hash(&mut self) -> Result<[u8; 32], ProtocolError> {
        let hash = self
            .hashes
            .get(self.hash_pos)
            .ok_or_else(|| ProtocolError::InvalidBloomFilter("ran out of merkle hashes".to_string()))?;
        self.hash_pos += 1;
        Ok(*hash)
    }

    fn recurse(
        &mut self,
        height: u32,
        pos: u32,
        bits: &mut BitReader,
    ) -> Result<[u8; 32], ProtocolError> {
        let parent_is_match = bits.next()?;

        if height == 0 || !parent_is_match {
            let hash = self.next_hash()?;
            if height == 0 && parent_is_match {
                self.matched.push(hash);
            }
            return Ok(hash);
        }

        let left = self.recurse(height - 1, pos * 2, bits)?;
        let right = if pos * 2 + 1 < tree_width(height - 1, self.total_transactions) {
            self.recurse(height - 1, pos * 2 + 1, bits)?
        } else {
            left
        };

        let mut preimage = Vec::with_capacity(64);
        preimage.extend_from_slice(&left);
        preimage.extend_from_slice(&right);
        Ok(sha256d(&preimage))
    }
}

/// Reconstruct the partial merkle tree committed to by a `merkleblock`
/// payload, returning the computed root and the matched transaction ids
/// in tree (left-to-right) order.
///
/// Per spec, `total_transactions = 0` is a degenerate but legal case: the
/// block is stored with no transactions expected, and the computed root
/// trivially equals the zero hash unless the caller checks `hashes` is
/// also empty (the header check against the real merkle root still
/// applies for non-empty blocks).
pub fn verify(
    total_transactions: u32,
    hashes: &[[u8; 32]],
    flags: &[u8],
) -> Result<MerkleVerification, ProtocolError> {
    if total_transactions == 0 {
        return Ok(MerkleVerification {
            computed_root: [0u8; 32],
            matched_tx_ids: Vec::new(),
        });
    }

    let height = tree_height(total_transactions);
    let mut bits = BitReader::new(flags);
    let mut traversal = Traversal {
        hashes,
        hash_pos: 0,
        total_transactions,
        matched: Vec::new(),
    };

    let computed_root = traversal.recurse(height, 0, &mut bits)?;
    Ok(MerkleVerification {
        computed_root,
        matched_tx_ids: traversal.matched,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> [u8; 32] {
        let mut h = [0u8; 32];
        h[0] = n;
        h
    }

    #[test]
    fn single_transaction_tree_root_is_the_leaf() {
        // height 0: one bit (match), one hash.
        let result = verify(1, &[leaf(1)], &[0b0000_0001]).unwrap();
        assert_eq!(result.computed_root, leaf(1));
        assert_eq!(result.matched_tx_ids, vec![leaf(1)]);
    }

    #[test]
    fn two_transaction_tree_with_one_match() {
        // Tree of 2 leaves: root = sha256d(leaf0 || leaf1).
        // Flags: parent=1 (continue), left=1 (match, leaf), right=0 (no match, leaf).
        let l0 = leaf(1);
        let l1 = leaf(2);
        let mut preimage = Vec::new();
        preimage.extend_from_slice(&l0);
        preimage.extend_from_slice(&l1);
        let expected_root = sha256d(&preimage);

        let flags = [0b0000_0011]; // bits: 1,1,0 read LSB-first -> parent=1, left=1, right=0
        let result = verify(2, &[l0, l1], &flags).unwrap();
        assert_eq!(result.computed_root, expected_root);
        assert_eq!(result.matched_tx_ids, vec![l0]);
    }

    #[test]
    fn zero_transactions_is_stored_with_no_expected_txs() {
        let result = verify(0, &[], &[]).unwrap();
        assert!(result.matched_tx_ids.is_empty());
    }

    #[test]
    fn truncated_flag_bitstream_is_an_error() {
        assert!(verify(2, &[leaf(1), leaf(2)], &[]).is_err());
    }

    #[test]
    fn ran_out_of_hashes_is_an_error() {
        let flags = [0b0000_0011];
        assert!(verify(2, &[leaf(1)], &flags).is_err());
    }
}
