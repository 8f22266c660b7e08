//! Row types returned by the store's query surface.

/// Which side of a payment the query address is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    Sent,
    Received,
    Unknown,
}

/// A derived payment row, joined from `tx`/`txin`/`txout`/`merkleblock`
/// and shaped relative to the address a query was made for.
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub state: PaymentState,
    pub output_index: u32,
    pub amount: i64,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub tx_id: String,
    pub block_height: u32,
    pub timestamp: u32,
    pub confirmations: u32,
    pub fee: Option<i64>,
}

/// A decoded block header row, as stored (no height — see
/// [`MerkleBlockRow`] for the assigned height).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRow {
    pub hash: String,
    pub version: i32,
    pub prev_hash: String,
    pub merkle_root: String,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

/// A merkle-block row: the header hash plus its synchronizer-assigned
/// height and the transaction count it committed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerkleBlockHeightRow {
    pub height: u32,
    pub total_transactions: u32,
}

/// An unspent output row, as returned by `view_utxo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoRow {
    pub tx_id: String,
    pub output_index: u32,
    pub value: i64,
    pub address: Option<String>,
}
