//! SQLite state store for Mirror Operator
//!
//! Manages a SQLite connection pool with WAL mode and stores the ledger
//! snapshot in two tables: `tracked_accounts` and `trades`.

use crate::error::{AppError, AppResult};
use crate::ledger::{LedgerSnapshot, StateStore};
use crate::models::{TrackedAccount, Trade};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Type alias for the SQLite connection pool
pub type DbPool = Pool<Sqlite>;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS tracked_accounts (
        address TEXT PRIMARY KEY NOT NULL,
        category TEXT NOT NULL,
        active INTEGER NOT NULL,
        added_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS trades (
        seq INTEGER NOT NULL,
        id TEXT PRIMARY KEY NOT NULL,
        source_account TEXT NOT NULL,
        asset_id TEXT NOT NULL,
        asset_symbol TEXT,
        direction TEXT NOT NULL,
        state TEXT NOT NULL,
        size_native REAL NOT NULL,
        tp_percent REAL NOT NULL,
        sl_percent REAL NOT NULL,
        mode TEXT NOT NULL,
        entry_price REAL,
        exit_price REAL,
        pnl_native REAL,
        pnl_percent REAL,
        exit_reason TEXT,
        source_signature TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
];

/// Initialize the database connection pool
pub async fn init_pool(path: &Path) -> AppResult<DbPool> {
    // Ensure data directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            info!("Created database directory: {:?}", parent);
        }
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let connect_options = SqliteConnectOptions::from_str(&db_url)?
        // Enable WAL mode for concurrent reads
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }

    info!("Database pool initialized: {:?}", path);
    Ok(pool)
}

/// Ledger snapshot stored in SQLite
#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    pool: DbPool,
}

impl SqliteStateStore {
    pub async fn connect(path: &Path) -> AppResult<Self> {
        Ok(Self {
            pool: init_pool(path).await?,
        })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn parse_column<T: FromStr<Err = String>>(row: &SqliteRow, column: &str) -> AppResult<T> {
    let raw: String = row.try_get(column)?;
    raw.parse::<T>()
        .map_err(|e| AppError::Internal(format!("Bad {} value in state store: {}", column, e)))
}

fn account_from_row(row: &SqliteRow) -> AppResult<TrackedAccount> {
    Ok(TrackedAccount {
        address: row.try_get("address")?,
        category: parse_column(row, "category")?,
        active: row.try_get("active")?,
        added_at: row.try_get("added_at")?,
    })
}

fn trade_from_row(row: &SqliteRow) -> AppResult<Trade> {
    let exit_reason: Option<String> = row.try_get("exit_reason")?;
    let exit_reason = exit_reason
        .map(|raw| serde_json::from_value(serde_json::Value::String(raw)))
        .transpose()?;
    let direction: String = row.try_get("direction")?;

    Ok(Trade {
        id: row.try_get("id")?,
        source_account: row.try_get("source_account")?,
        asset_id: row.try_get("asset_id")?,
        asset_symbol: row.try_get("asset_symbol")?,
        direction: serde_json::from_value(serde_json::Value::String(direction))?,
        state: parse_column(row, "state")?,
        size_native: row.try_get("size_native")?,
        tp_percent: row.try_get("tp_percent")?,
        sl_percent: row.try_get("sl_percent")?,
        mode: parse_column(row, "mode")?,
        entry_price: row.try_get("entry_price")?,
        exit_price: row.try_get("exit_price")?,
        pnl_native: row.try_get("pnl_native")?,
        pnl_percent: row.try_get("pnl_percent")?,
        exit_reason,
        source_signature: row.try_get("source_signature")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn load(&self) -> AppResult<Option<LedgerSnapshot>> {
        let account_rows = sqlx::query("SELECT * FROM tracked_accounts ORDER BY added_at, address")
            .fetch_all(&self.pool)
            .await?;
        let trade_rows = sqlx::query("SELECT * FROM trades ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;

        if account_rows.is_empty() && trade_rows.is_empty() {
            return Ok(None);
        }

        let accounts = account_rows
            .iter()
            .map(account_from_row)
            .collect::<AppResult<Vec<_>>>()?;
        let trades = trade_rows
            .iter()
            .map(trade_from_row)
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Some(LedgerSnapshot { accounts, trades }))
    }

    async fn save(&self, snapshot: &LedgerSnapshot) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tracked_accounts")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM trades").execute(&mut *tx).await?;

        for account in &snapshot.accounts {
            sqlx::query(
                "INSERT INTO tracked_accounts (address, category, active, added_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&account.address)
            .bind(account.category.to_string())
            .bind(account.active)
            .bind(account.added_at)
            .execute(&mut *tx)
            .await?;
        }

        for (seq, trade) in snapshot.trades.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO trades (
                    seq, id, source_account, asset_id, asset_symbol, direction, state,
                    size_native, tp_percent, sl_percent, mode, entry_price, exit_price,
                    pnl_native, pnl_percent, exit_reason, source_signature, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(seq as i64)
            .bind(&trade.id)
            .bind(&trade.source_account)
            .bind(&trade.asset_id)
            .bind(&trade.asset_symbol)
            .bind(trade.direction.to_string())
            .bind(trade.state.to_string())
            .bind(trade.size_native)
            .bind(trade.tp_percent)
            .bind(trade.sl_percent)
            .bind(trade.mode.to_string())
            .bind(trade.entry_price)
            .bind(trade.exit_price)
            .bind(trade.pnl_native)
            .bind(trade.pnl_percent)
            .bind(trade.exit_reason.map(|r| r.to_string()))
            .bind(&trade.source_signature)
            .bind(trade.created_at)
            .bind(trade.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            accounts = snapshot.accounts.len(),
            trades = snapshot.trades.len(),
            "State saved to SQLite"
        );
        Ok(())
    }
}
