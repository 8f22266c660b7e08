//! Relational index of blocks, transactions, and derived payment/UTXO
//! views, backed by `rusqlite` behind an `r2d2` pool.
//!
//! Writes serialize through a single dedicated connection guarded by a
//! `tokio::sync::Mutex`; reads run concurrently against a pool of
//! `r2d2_sqlite` connections opened `PRAGMA query_only = true` in WAL
//! mode. Every tx/block id column stores lowercase hex of the natural
//! byte-order double-SHA-256 — reversal to the conventional
//! big-endian display form, if a caller wants it, happens at the call
//! site, never inside the store.

pub mod models;
pub mod schema;

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};
use crate::network::protocol::{BlockHeader, TxMessage};

use models::{BlockRow, MerkleBlockHeightRow, Payment, PaymentState, UtxoRow};
use schema::{SCHEMA_SQL, SCHEMA_VERSION};

fn hash_to_hex(hash: &[u8; 32]) -> String {
    hex::encode(hash)
}

fn configure_connection(conn: &Connection, passphrase: Option<&str>) -> rusqlite::Result<()> {
    #[cfg(feature = "encryption")]
    if let Some(key) = passphrase {
        conn.pragma_update(None, "key", key)?;
    }
    #[cfg(not(feature = "encryption"))]
    let _ = passphrase;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(())
}

fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    let user_version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if user_version > SCHEMA_VERSION {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_SCHEMA),
            Some(format!(
                "database schema version {user_version} is newer than supported {SCHEMA_VERSION}"
            )),
        ));
    }
    if user_version < SCHEMA_VERSION {
        conn.execute_batch(SCHEMA_SQL)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(())
}

/// The persistent relational index. Cheap to clone (pool + mutex are
/// already reference-counted); all clones share the same database.
#[derive(Clone)]
pub struct Store {
    writer: std::sync::Arc<Mutex<Connection>>,
    readers: Pool<SqliteConnectionManager>,
}

impl Store {
    /// Open (creating if absent) the database at `path`, applying the
    /// embedded schema if this is a fresh file or an older version.
    pub fn open(path: impl AsRef<Path>, passphrase: Option<&str>) -> Result<Self> {
        let path = path.as_ref();

        let writer_conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        configure_connection(&writer_conn, passphrase).map_err(StoreError::Sqlite)?;
        apply_schema(&writer_conn).map_err(StoreError::Sqlite)?;

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.pragma_update(None, "query_only", true)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            Ok(())
        });
        let readers = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(StoreError::Pool)?;

        Ok(Self {
            writer: std::sync::Arc::new(Mutex::new(writer_conn)),
            readers,
        })
    }

    /// Open an in-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let writer_conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        apply_schema(&writer_conn).map_err(StoreError::Sqlite)?;
        let manager = SqliteConnectionManager::memory();
        let readers = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(StoreError::Pool)?;
        Ok(Self {
            writer: std::sync::Arc::new(Mutex::new(writer_conn)),
            readers,
        })
    }

    /// Insert or replace a block header row.
    pub async fn add_block(&self, header: &BlockHeader) -> Result<()> {
        let id = hash_to_hex(&header.id());
        let conn = self.writer.lock().await;
        conn.execute(
            "INSERT INTO block (hash, version, prev_hash, merkle_root, timestamp, bits, nonce)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(hash) DO UPDATE SET
                version=excluded.version, prev_hash=excluded.prev_hash,
                merkle_root=excluded.merkle_root, timestamp=excluded.timestamp,
                bits=excluded.bits, nonce=excluded.nonce",
            params![
                id,
                header.version,
                hash_to_hex(&header.prev_hash),
                hash_to_hex(&header.merkle_root),
                header.timestamp,
                header.bits,
                header.nonce,
            ],
        )
        .map_err(StoreError::Sqlite)?;
        Ok(())
    }

    /// Insert or replace the height assignment for an already-stored
    /// block header.
    pub async fn add_merkleblock(
        &self,
        block_hash: &[u8; 32],
        height: u32,
        total_transactions: u32,
    ) -> Result<()> {
        let id = hash_to_hex(block_hash);
        let conn = self.writer.lock().await;
        conn.execute(
            "INSERT INTO merkleblock (hash, height, total_transactions)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(hash) DO UPDATE SET
                height=excluded.height, total_transactions=excluded.total_transactions",
            params![id, height, total_transactions],
        )
        .map_err(StoreError::Sqlite)?;
        Ok(())
    }

    fn upsert_address(conn: &Connection, address: &Option<String>) -> rusqlite::Result<Option<i64>> {
        let Some(address) = address else { return Ok(None) };
        if address.is_empty() {
            return Ok(None);
        }
        conn.execute(
            "INSERT INTO address (address) VALUES (?1) ON CONFLICT(address) DO NOTHING",
            params![address],
        )?;
        conn.query_row(
            "SELECT id FROM address WHERE address = ?1",
            params![address],
            |row| row.get(0),
        )
        .optional()
        .map(|id| id)
    }

    /// Insert or fully replace a transaction's `tx`/`txin`/`txout` rows.
    /// Existing `txin`/`txout` rows for this tx id are deleted before the
    /// new rows are inserted, so a re-emission never leaves stale rows
    /// from a previous version of the same transaction.
    ///
    /// `input_addresses`/`output_addresses` are the extractor's results,
    /// parallel to `tx.inputs`/`tx.outputs`; `None` entries are stored
    /// with no associated address.
    pub async fn add_transaction(
        &self,
        block_hash: &[u8; 32],
        tx: &TxMessage,
        input_addresses: &[Option<String>],
        output_addresses: &[Option<String>],
    ) -> Result<()> {
        let tx_id = hash_to_hex(&tx.id());
        let block_hash_hex = hash_to_hex(block_hash);

        let mut conn = self.writer.lock().await;
        let txn = conn.transaction().map_err(StoreError::Sqlite)?;

        txn.execute(
            "INSERT INTO tx (id, version, lock_time, block_hash)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                version=excluded.version, lock_time=excluded.lock_time,
                block_hash=excluded.block_hash",
            params![tx_id, tx.version, tx.lock_time, block_hash_hex],
        )
        .map_err(StoreError::Sqlite)?;

        txn.execute("DELETE FROM txin WHERE tx_id = ?1", params![tx_id])
            .map_err(StoreError::Sqlite)?;
        txn.execute("DELETE FROM txout WHERE tx_id = ?1", params![tx_id])
            .map_err(StoreError::Sqlite)?;

        for (idx, input) in tx.inputs.iter().enumerate() {
            let address_id = Self::upsert_address(&txn, input_addresses.get(idx).unwrap_or(&None))
                .map_err(StoreError::Sqlite)?;
            txn.execute(
                "INSERT INTO txin (tx_id, input_index, prev_tx_id, prev_index, script_sig, sequence, address_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    tx_id,
                    idx as i64,
                    hash_to_hex(&input.prev_out.tx_id),
                    input.prev_out.index,
                    input.script_sig.as_ref(),
                    input.sequence,
                    address_id,
                ],
            )
            .map_err(StoreError::Sqlite)?;
        }

        for (idx, output) in tx.outputs.iter().enumerate() {
            let address_id = Self::upsert_address(&txn, output_addresses.get(idx).unwrap_or(&None))
                .map_err(StoreError::Sqlite)?;
            txn.execute(
                "INSERT INTO txout (tx_id, output_index, value, script_pubkey, address_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    tx_id,
                    idx as i64,
                    output.value,
                    output.script_pubkey.as_ref(),
                    address_id,
                ],
            )
            .map_err(StoreError::Sqlite)?;
        }

        txn.commit().map_err(StoreError::Sqlite)?;
        Ok(())
    }

    fn reader(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.readers.get().map_err(StoreError::Pool).map_err(Into::into)
    }

    /// `latest_height = max(height)` over stored merkle-blocks.
    pub fn latest_block_height(&self) -> Result<Option<u32>> {
        let conn = self.reader()?;
        conn.query_row(
            "SELECT height FROM merkleblock ORDER BY height DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::Sqlite)
        .map_err(Into::into)
    }

    /// Header hash of the merkle-block with `height = latest_block_height()`.
    pub fn latest_block_hash(&self) -> Result<Option<[u8; 32]>> {
        let conn = self.reader()?;
        let hash_hex: Option<String> = conn
            .query_row(
                "SELECT hash FROM merkleblock ORDER BY height DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::Sqlite)?;
        Ok(hash_hex.map(|hex_str| {
            let bytes = hex::decode(hex_str).expect("stored hash is valid hex");
            let mut out = [0u8; 32];
            out.copy_from_slice(&bytes);
            out
        }))
    }

    /// `Σ value over view_utxo where address = addr`.
    pub fn calculate_balance(&self, address: &str) -> Result<i64> {
        let conn = self.reader()?;
        let balance: i64 = conn
            .query_row(
                "SELECT COALESCE(SUM(view_utxo.value), 0)
                 FROM view_utxo
                 JOIN address ON address.id = view_utxo.address_id
                 WHERE address.address = ?1",
                params![address],
                |row| row.get(0),
            )
            .map_err(StoreError::Sqlite)?;
        Ok(balance)
    }

    /// Unspent outputs for `address`.
    pub fn unspent_transactions(&self, address: &str) -> Result<Vec<UtxoRow>> {
        let conn = self.reader()?;
        let mut stmt = conn
            .prepare(
                "SELECT view_utxo.tx_id, view_utxo.output_index, view_utxo.value, address.address
                 FROM view_utxo
                 JOIN address ON address.id = view_utxo.address_id
                 WHERE address.address = ?1",
            )
            .map_err(StoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![address], |row| {
                Ok(UtxoRow {
                    tx_id: row.get(0)?,
                    output_index: row.get(1)?,
                    value: row.get(2)?,
                    address: row.get(3)?,
                })
            })
            .map_err(StoreError::Sqlite)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)
            .map_err(Into::into)
    }

    fn payment_from_row(row: &rusqlite::Row, query_address: &str) -> rusqlite::Result<Payment> {
        let to_address: Option<String> = row.get("to_address")?;
        let from_address: Option<String> = row.get("from_address")?;
        let height: u32 = row.get("height")?;
        let latest_height: u32 = row.get("latest_height")?;
        let state = if to_address.as_deref() == Some(query_address) {
            PaymentState::Received
        } else if from_address.as_deref() == Some(query_address) {
            PaymentState::Sent
        } else {
            PaymentState::Unknown
        };
        Ok(Payment {
            state,
            output_index: row.get("output_index")?,
            amount: row.get("amount")?,
            from_address,
            to_address,
            tx_id: row.get("tx_id")?,
            block_height: height,
            timestamp: row.get("timestamp")?,
            confirmations: latest_height.saturating_sub(height),
            fee: row.get("fee")?,
        })
    }

    const TX_BY_ID_QUERY: &'static str = "
        SELECT tx.id AS tx_id,
               txout.output_index AS output_index,
               txout.value AS amount,
               in_addr.address AS from_address,
               out_addr.address AS to_address,
               merkleblock.height AS height,
               block.timestamp AS timestamp,
               view_tx_fees.fee AS fee,
               (SELECT MAX(height) FROM merkleblock) AS latest_height
        FROM tx
        JOIN merkleblock ON merkleblock.hash = tx.block_hash
        JOIN block ON block.hash = tx.block_hash
        JOIN txout ON txout.tx_id = tx.id
        LEFT JOIN address AS out_addr ON out_addr.id = txout.address_id
        LEFT JOIN txin ON txin.tx_id = tx.id AND txin.input_index = 0
        LEFT JOIN address AS in_addr ON in_addr.id = txin.address_id
        LEFT JOIN view_tx_fees ON view_tx_fees.tx_id = tx.id
        WHERE (in_addr.address IS DISTINCT FROM out_addr.address)
    ";

    /// `address` spent one of its own outputs as an input of this tx and did
    /// not also receive a fresh output in it (that combination is a
    /// self-transfer, handled by [`Self::RECEIVED_QUERY`] returning nothing
    /// for either side). Amount is the value `address` gave up: the sum of
    /// the previous outputs its inputs consumed, not this tx's own outputs.
    const SENT_QUERY: &'static str = "
        SELECT tx.id AS tx_id,
               (SELECT MIN(txin.input_index) FROM txin
                 WHERE txin.tx_id = tx.id AND txin.address_id = addr.id) AS output_index,
               (SELECT COALESCE(SUM(prev_out.value), 0)
                  FROM txin
                  JOIN txout AS prev_out
                    ON prev_out.tx_id = txin.prev_tx_id AND prev_out.output_index = txin.prev_index
                 WHERE txin.tx_id = tx.id AND txin.address_id = addr.id) AS amount,
               addr.address AS from_address,
               NULL AS to_address,
               merkleblock.height AS height,
               block.timestamp AS timestamp,
               view_tx_fees.fee AS fee,
               (SELECT MAX(height) FROM merkleblock) AS latest_height
        FROM tx
        JOIN merkleblock ON merkleblock.hash = tx.block_hash
        JOIN block ON block.hash = tx.block_hash
        JOIN address AS addr ON addr.address = ?1
        LEFT JOIN view_tx_fees ON view_tx_fees.tx_id = tx.id
        WHERE EXISTS (SELECT 1 FROM txin WHERE txin.tx_id = tx.id AND txin.address_id = addr.id)
          AND NOT EXISTS (SELECT 1 FROM txout WHERE txout.tx_id = tx.id AND txout.address_id = addr.id)
    ";

    /// `address` still holds at least one unspent output from this tx and
    /// did not also spend into it (self-transfer). Amount is the sum of
    /// `address`'s own outputs that remain unspent — once fully spent, the
    /// receipt is superseded by the spending tx's own [`Self::SENT_QUERY`] row.
    const RECEIVED_QUERY: &'static str = "
        SELECT tx.id AS tx_id,
               (SELECT MIN(txout.output_index) FROM txout
                 WHERE txout.tx_id = tx.id AND txout.address_id = addr.id
                   AND EXISTS (SELECT 1 FROM view_utxo
                               WHERE view_utxo.tx_id = txout.tx_id
                                 AND view_utxo.output_index = txout.output_index)) AS output_index,
               (SELECT COALESCE(SUM(txout.value), 0) FROM txout
                 WHERE txout.tx_id = tx.id AND txout.address_id = addr.id
                   AND EXISTS (SELECT 1 FROM view_utxo
                               WHERE view_utxo.tx_id = txout.tx_id
                                 AND view_utxo.output_index = txout.output_index)) AS amount,
               NULL AS from_address,
               addr.address AS to_address,
               merkleblock.height AS height,
               block.timestamp AS timestamp,
               view_tx_fees.fee AS fee,
               (SELECT MAX(height) FROM merkleblock) AS latest_height
        FROM tx
        JOIN merkleblock ON merkleblock.hash = tx.block_hash
        JOIN block ON block.hash = tx.block_hash
        JOIN address AS addr ON addr.address = ?1
        LEFT JOIN view_tx_fees ON view_tx_fees.tx_id = tx.id
        WHERE EXISTS (SELECT 1 FROM txout
                       WHERE txout.tx_id = tx.id AND txout.address_id = addr.id
                         AND EXISTS (SELECT 1 FROM view_utxo
                                     WHERE view_utxo.tx_id = txout.tx_id
                                       AND view_utxo.output_index = txout.output_index))
          AND NOT EXISTS (SELECT 1 FROM txin WHERE txin.tx_id = tx.id AND txin.address_id = addr.id)
    ";

    /// Payment history for `address`, newest first. Each tx contributes at
    /// most one row: a sent row when `address` spent into it, a received row
    /// when it still holds an unspent output from it, or no row at all when
    /// both are true (self-transfer) or the receipt has since been spent.
    pub fn transactions(&self, address: &str) -> Result<Vec<Payment>> {
        let conn = self.reader()?;
        let query = format!(
            "{} UNION ALL {} ORDER BY timestamp DESC",
            Self::SENT_QUERY,
            Self::RECEIVED_QUERY
        );
        let mut stmt = conn.prepare(&query).map_err(StoreError::Sqlite)?;
        let rows = stmt
            .query_map(params![address], |row| Self::payment_from_row(row, address))
            .map_err(StoreError::Sqlite)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Sqlite)
            .map_err(Into::into)
    }

    /// A single payment row by transaction id, if present and not a
    /// filtered-out self-transfer.
    pub fn transaction(&self, tx_id_hex: &str) -> Result<Option<Payment>> {
        let conn = self.reader()?;
        let query = format!("{} AND tx.id = ?1 GROUP BY tx.id", Self::TX_BY_ID_QUERY);
        let mut stmt = conn.prepare(&query).map_err(StoreError::Sqlite)?;
        stmt.query_row(params![tx_id_hex], |row| Self::payment_from_row(row, ""))
            .optional()
            .map_err(StoreError::Sqlite)
            .map_err(Into::into)
    }

    /// Fetch a stored block header by hash, if present.
    pub fn block(&self, hash: &[u8; 32]) -> Result<Option<BlockRow>> {
        let conn = self.reader()?;
        conn.query_row(
            "SELECT hash, version, prev_hash, merkle_root, timestamp, bits, nonce
             FROM block WHERE hash = ?1",
            params![hash_to_hex(hash)],
            |row| {
                Ok(BlockRow {
                    hash: row.get(0)?,
                    version: row.get(1)?,
                    prev_hash: row.get(2)?,
                    merkle_root: row.get(3)?,
                    timestamp: row.get(4)?,
                    bits: row.get(5)?,
                    nonce: row.get(6)?,
                })
            },
        )
        .optional()
        .map_err(StoreError::Sqlite)
        .map_err(Into::into)
    }

    /// Fetch the height/total-transactions assignment for a block hash.
    pub fn merkleblock_height(&self, hash: &[u8; 32]) -> Result<Option<MerkleBlockHeightRow>> {
        let conn = self.reader()?;
        conn.query_row(
            "SELECT height, total_transactions FROM merkleblock WHERE hash = ?1",
            params![hash_to_hex(hash)],
            |row| {
                Ok(MerkleBlockHeightRow {
                    height: row.get(0)?,
                    total_transactions: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(StoreError::Sqlite)
        .map_err(Into::into)
    }
}
