//! Embedded schema, applied once per database file and gated by
//! `PRAGMA user_version` so repeat opens are no-ops.

pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS address (
    id      INTEGER PRIMARY KEY,
    address TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS block (
    hash        TEXT PRIMARY KEY,
    version     INTEGER NOT NULL,
    prev_hash   TEXT NOT NULL,
    merkle_root TEXT NOT NULL,
    timestamp   INTEGER NOT NULL,
    bits        INTEGER NOT NULL,
    nonce       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS merkleblock (
    hash               TEXT PRIMARY KEY REFERENCES block(hash),
    height             INTEGER NOT NULL,
    total_transactions INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_merkleblock_height ON merkleblock(height);

CREATE TABLE IF NOT EXISTS tx (
    id         TEXT PRIMARY KEY,
    version    INTEGER NOT NULL,
    lock_time  INTEGER NOT NULL,
    block_hash TEXT NOT NULL REFERENCES merkleblock(hash)
);
CREATE INDEX IF NOT EXISTS idx_tx_block_hash ON tx(block_hash);

CREATE TABLE IF NOT EXISTS txin (
    tx_id        TEXT NOT NULL REFERENCES tx(id),
    input_index  INTEGER NOT NULL,
    prev_tx_id   TEXT NOT NULL,
    prev_index   INTEGER NOT NULL,
    script_sig   BLOB NOT NULL,
    sequence     INTEGER NOT NULL,
    address_id   INTEGER REFERENCES address(id),
    PRIMARY KEY (tx_id, input_index)
);
CREATE INDEX IF NOT EXISTS idx_txin_prev ON txin(prev_tx_id, prev_index);
CREATE INDEX IF NOT EXISTS idx_txin_address ON txin(address_id);

CREATE TABLE IF NOT EXISTS txout (
    tx_id         TEXT NOT NULL REFERENCES tx(id),
    output_index  INTEGER NOT NULL,
    value         INTEGER NOT NULL,
    script_pubkey BLOB NOT NULL,
    address_id    INTEGER REFERENCES address(id),
    PRIMARY KEY (tx_id, output_index)
);
CREATE INDEX IF NOT EXISTS idx_txout_address ON txout(address_id);

-- Outputs not referenced by any stored input.
CREATE VIEW IF NOT EXISTS view_utxo AS
SELECT txout.tx_id, txout.output_index, txout.value, txout.address_id
FROM txout
WHERE NOT EXISTS (
    SELECT 1 FROM txin
    WHERE txin.prev_tx_id = txout.tx_id
      AND txin.prev_index = txout.output_index
);

-- Per-tx fee: sum of resolvable input values minus sum of output values.
-- NULL when any input's previous output is not locally resolvable.
CREATE VIEW IF NOT EXISTS view_tx_fees AS
SELECT tx.id AS tx_id,
       CASE
           WHEN (SELECT COUNT(*) FROM txin WHERE txin.tx_id = tx.id) =
                (SELECT COUNT(*) FROM txin
                 JOIN txout ON txout.tx_id = txin.prev_tx_id AND txout.output_index = txin.prev_index
                 WHERE txin.tx_id = tx.id)
           THEN (SELECT COALESCE(SUM(txout.value), 0)
                 FROM txin
                 JOIN txout ON txout.tx_id = txin.prev_tx_id AND txout.output_index = txin.prev_index
                 WHERE txin.tx_id = tx.id)
                - (SELECT COALESCE(SUM(txout2.value), 0) FROM txout txout2 WHERE txout2.tx_id = tx.id)
           ELSE NULL
       END AS fee
FROM tx;
"#;
