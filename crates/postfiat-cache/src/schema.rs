//! Core schema. Executed idempotently at startup; registered schema
//! extensions run afterwards and may add tables, views, indices or grants,
//! but the core objects below are invariant.

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS postfiat_tx_cache (
    hash            VARCHAR(64) PRIMARY KEY,
    account         VARCHAR(255),
    destination     VARCHAR(255),
    ledger_index    BIGINT,
    close_time_iso  TIMESTAMPTZ,
    tx_json         JSONB NOT NULL,
    meta            JSONB NOT NULL,
    validated       BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE TABLE IF NOT EXISTS transaction_processing_results (
    hash              VARCHAR(64) PRIMARY KEY,
    processed         BOOLEAN NOT NULL,
    rule_name         VARCHAR(255) NOT NULL,
    response_tx_hash  VARCHAR(64),
    notes             TEXT,
    reviewed_at       TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS pft_holders (
    account       VARCHAR(255) PRIMARY KEY,
    balance       DOUBLE PRECISION NOT NULL,
    last_updated  TIMESTAMPTZ NOT NULL DEFAULT now()
);
"#;

pub const CREATE_FUNCTIONS: &str = r#"
CREATE OR REPLACE FUNCTION decode_hex_memo(hex_text TEXT)
RETURNS TEXT AS $$
BEGIN
    IF hex_text IS NULL THEN
        RETURN '';
    END IF;
    RETURN convert_from(decode(hex_text, 'hex'), 'UTF8');
EXCEPTION WHEN OTHERS THEN
    RETURN hex_text;
END;
$$ LANGUAGE plpgsql IMMUTABLE;
"#;

pub const CREATE_VIEWS: &str = r#"
CREATE OR REPLACE VIEW decoded_memos AS
SELECT
    hash,
    account,
    destination,
    ledger_index,
    close_time_iso AS datetime,
    decode_hex_memo(tx_json->'Memos'->0->'Memo'->>'MemoType')   AS memo_type,
    decode_hex_memo(tx_json->'Memos'->0->'Memo'->>'MemoFormat') AS memo_format,
    decode_hex_memo(tx_json->'Memos'->0->'Memo'->>'MemoData')   AS memo_data,
    COALESCE(
        NULLIF(COALESCE(tx_json->'DeliverMax'->>'value', tx_json->'Amount'->>'value'), '')::DOUBLE PRECISION,
        0
    ) AS pft_absolute_amount,
    COALESCE(meta->>'TransactionResult', '') AS transaction_result,
    validated
FROM postfiat_tx_cache
WHERE tx_json->'Memos'->0->'Memo' IS NOT NULL;
"#;

pub const CREATE_INDICES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tx_cache_account ON postfiat_tx_cache (account);
CREATE INDEX IF NOT EXISTS idx_tx_cache_destination ON postfiat_tx_cache (destination);
CREATE INDEX IF NOT EXISTS idx_tx_cache_close_time ON postfiat_tx_cache (close_time_iso);
"#;

/// A schema extension shipped by a plug-in: named SQL blocks appended to the
/// core schema.
#[derive(Debug, Clone)]
pub struct SchemaExtension {
    pub id: String,
    pub sql: Vec<String>,
}
