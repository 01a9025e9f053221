//! The transaction cache: the single source of truth between the
//! ledger and the processing queues.
//!
//! Every write is an upsert keyed by transaction hash, so ingestion from
//! any mix of backfills and the live monitor converges to the same state.

pub mod schema;

use chrono::{DateTime, Utc};
use postfiat_ledger::types::TransactionRecord;
use postfiat_ledger::TxSink;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use schema::SchemaExtension;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("database unavailable: {0}")]
    DbUnavailable(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("query failed: {0}")]
    Query(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.constraint().is_some() => {
                Self::ConstraintViolation(db.to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                Self::DbUnavailable(err.to_string())
            }
            _ => Self::Query(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// A row of the `decoded_memos` view, direction-tagged for a reference
/// account.
#[derive(Debug, Clone)]
pub struct MemoRow {
    pub hash: String,
    pub account: String,
    pub destination: String,
    pub ledger_index: i64,
    pub datetime: DateTime<Utc>,
    pub memo_type: String,
    pub memo_format: String,
    pub memo_data: String,
    pub pft_absolute_amount: f64,
    /// Positive when the reference account received, negative when it sent.
    pub directional_pft: f64,
    pub transaction_result: String,
}

/// A processing outcome row, written only after on-ledger confirmation.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub tx_hash: String,
    pub processed: bool,
    pub rule_name: String,
    pub response_tx_hash: Option<String>,
    pub notes: Option<String>,
}

/// Ordering for unprocessed-transaction scans.
#[derive(Debug, Clone, Copy)]
pub enum ScanOrder {
    OldestFirst,
    NewestFirst,
}

impl ScanOrder {
    fn sql(self) -> &'static str {
        match self {
            Self::OldestFirst => "datetime ASC, ledger_index ASC, hash ASC",
            Self::NewestFirst => "datetime DESC, ledger_index DESC, hash DESC",
        }
    }
}

#[derive(Clone)]
pub struct TxCache {
    pool: PgPool,
}

impl TxCache {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .connect(database_url)
            .await
            .map_err(|err| CacheError::DbUnavailable(err.to_string()))?;
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|err| CacheError::DbUnavailable(err.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create core tables, functions, views and indices, then apply any
    /// registered schema extensions.
    pub async fn init_schema(&self, extensions: &[SchemaExtension]) -> Result<()> {
        for block in [
            schema::CREATE_TABLES,
            schema::CREATE_FUNCTIONS,
            schema::CREATE_VIEWS,
            schema::CREATE_INDICES,
        ] {
            sqlx::raw_sql(block).execute(&self.pool).await?;
        }
        for extension in extensions {
            info!(extension = %extension.id, "applying schema extension");
            for statement in &extension.sql {
                sqlx::raw_sql(statement).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    /// Insert a batch of transactions in one database transaction.
    /// Re-inserting a known hash is a no-op; the returned count is the
    /// number of genuinely new rows.
    pub async fn batch_insert(&self, records: &[TransactionRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;
        for record in records {
            let result = sqlx::query(
                "INSERT INTO postfiat_tx_cache
                     (hash, account, destination, ledger_index, close_time_iso,
                      tx_json, meta, validated)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 ON CONFLICT (hash) DO NOTHING",
            )
            .bind(&record.hash)
            .bind(record.account())
            .bind(record.destination())
            .bind(record.ledger_index)
            .bind(record.close_time_iso)
            .bind(&record.tx_json)
            .bind(&record.meta)
            .bind(record.validated)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        if inserted > 0 {
            debug!(inserted, batch = records.len(), "cached transactions");
        }
        Ok(inserted)
    }

    /// Decoded memo history for an account (as sender or destination),
    /// ordered by (datetime, ledger_index, hash).
    pub async fn history(&self, account: &str, pft_only: bool) -> Result<Vec<MemoRow>> {
        let rows = sqlx::query(
            "SELECT hash, account, destination, ledger_index,
                    COALESCE(datetime, to_timestamp(0)) AS datetime,
                    memo_type, memo_format, memo_data,
                    pft_absolute_amount,
                    CASE WHEN destination = $1 THEN pft_absolute_amount
                         ELSE -pft_absolute_amount END AS directional_pft,
                    transaction_result
             FROM decoded_memos
             WHERE (account = $1 OR destination = $1)
               AND ($2 = FALSE OR pft_absolute_amount <> 0)
             ORDER BY datetime ASC, ledger_index ASC, hash ASC",
        )
        .bind(account)
        .bind(pft_only)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(memo_row).collect()
    }

    /// Rows that have no processing-results entry yet.
    pub async fn unprocessed(&self, order: ScanOrder, limit: Option<i64>) -> Result<Vec<MemoRow>> {
        let sql = format!(
            "SELECT d.hash, d.account, d.destination, d.ledger_index,
                    COALESCE(d.datetime, to_timestamp(0)) AS datetime,
                    d.memo_type, d.memo_format, d.memo_data,
                    d.pft_absolute_amount,
                    d.pft_absolute_amount AS directional_pft,
                    d.transaction_result
             FROM decoded_memos d
             LEFT JOIN transaction_processing_results r ON r.hash = d.hash
             WHERE r.hash IS NULL
             ORDER BY {}
             LIMIT $1",
            order.sql()
        );
        let rows = sqlx::query(&sql)
            .bind(limit.unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(memo_row).collect()
    }

    /// Record a processing outcome. Written only after the queue verified
    /// the response on-ledger.
    pub async fn record_result(&self, result: &ProcessingResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO transaction_processing_results
                 (hash, processed, rule_name, response_tx_hash, notes, reviewed_at)
             VALUES ($1, $2, $3, $4, $5, now())
             ON CONFLICT (hash) DO UPDATE
                 SET processed = EXCLUDED.processed,
                     rule_name = EXCLUDED.rule_name,
                     response_tx_hash = EXCLUDED.response_tx_hash,
                     notes = EXCLUDED.notes,
                     reviewed_at = now()",
        )
        .bind(&result.tx_hash)
        .bind(result.processed)
        .bind(&result.rule_name)
        .bind(&result.response_tx_hash)
        .bind(&result.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_result(&self, tx_hash: &str) -> Result<Option<ProcessingResult>> {
        let row = sqlx::query(
            "SELECT hash, processed, rule_name, response_tx_hash, notes
             FROM transaction_processing_results WHERE hash = $1",
        )
        .bind(tx_hash)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            Ok(ProcessingResult {
                tx_hash: row.try_get("hash").map_err(CacheError::from)?,
                processed: row.try_get("processed").map_err(CacheError::from)?,
                rule_name: row.try_get("rule_name").map_err(CacheError::from)?,
                response_tx_hash: row.try_get("response_tx_hash").map_err(CacheError::from)?,
                notes: row.try_get("notes").map_err(CacheError::from)?,
            })
        })
        .transpose()
    }

    pub async fn upsert_pft_holder(&self, account: &str, balance: f64) -> Result<()> {
        sqlx::query(
            "INSERT INTO pft_holders (account, balance, last_updated)
             VALUES ($1, $2, now())
             ON CONFLICT (account) DO UPDATE
                 SET balance = EXCLUDED.balance, last_updated = now()",
        )
        .bind(account)
        .bind(balance)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Holders at or above the tracking threshold.
    pub async fn pft_holders(&self, min_balance: f64) -> Result<Vec<(String, f64)>> {
        let rows = sqlx::query(
            "SELECT account, balance FROM pft_holders WHERE balance >= $1 ORDER BY account",
        )
        .bind(min_balance)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get("account").map_err(CacheError::from)?,
                    row.try_get("balance").map_err(CacheError::from)?,
                ))
            })
            .collect()
    }
}

fn memo_row(row: &sqlx::postgres::PgRow) -> Result<MemoRow> {
    Ok(MemoRow {
        hash: row.try_get("hash").map_err(CacheError::from)?,
        account: row.try_get::<Option<String>, _>("account")?.unwrap_or_default(),
        destination: row
            .try_get::<Option<String>, _>("destination")?
            .unwrap_or_default(),
        ledger_index: row.try_get::<Option<i64>, _>("ledger_index")?.unwrap_or(0),
        datetime: row.try_get("datetime").map_err(CacheError::from)?,
        memo_type: row.try_get("memo_type").map_err(CacheError::from)?,
        memo_format: row.try_get("memo_format").map_err(CacheError::from)?,
        memo_data: row.try_get("memo_data").map_err(CacheError::from)?,
        pft_absolute_amount: row
            .try_get::<Option<f64>, _>("pft_absolute_amount")?
            .unwrap_or(0.0),
        directional_pft: row
            .try_get::<Option<f64>, _>("directional_pft")?
            .unwrap_or(0.0),
        transaction_result: row
            .try_get::<Option<String>, _>("transaction_result")?
            .unwrap_or_default(),
    })
}

/// The monitor writes straight into the cache. Ingestion errors are logged
/// and swallowed; a missed row is recovered by the next backfill.
#[async_trait::async_trait]
impl TxSink for TxCache {
    async fn ingest(&self, records: Vec<TransactionRecord>) -> usize {
        match self.batch_insert(&records).await {
            Ok(inserted) => inserted,
            Err(err) => {
                warn!(%err, "monitor ingest failed, awaiting backfill");
                0
            }
        }
    }
}
