//! PostgreSQL-wire store (CockroachDB behind a load balancer)

use crate::error::StoreError;
use crate::store::{LedgerStore, UnitOfWork, WriteResult};
use crate::types::{AccountId, LedgerEntry, WritePath};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

const INSERT_ENTRY: &str = "INSERT INTO transactions (account, id, amount_cents, description) \
     VALUES ($1, gen_random_uuid(), $2, $3)";
const DEBIT_BALANCE: &str = "UPDATE accounts SET balance_cents = balance_cents - $1 WHERE id = $2";

const CREATE_ACCOUNTS: &str = r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        balance_cents INT8 NOT NULL
    )
"#;
const CREATE_TRANSACTIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        account UUID NOT NULL,
        amount_cents INT8 NOT NULL,
        description TEXT NOT NULL
    )
"#;

/// Pool size used when none is configured
pub const DEFAULT_MAX_CONNECTIONS: u32 = 101;

/// Connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection string of the load balancer in front of the cluster
    pub url: String,

    /// Pool upper bound; must cover every concurrently active transactor.
    /// Unset means [`DEFAULT_MAX_CONNECTIONS`] unless the caller sizes it.
    pub max_connections: Option<u32>,

    /// Connections kept open while idle
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub connect_timeout_secs: u64,

    /// Create the tables on startup when missing
    pub bootstrap_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://root@localhost:26257/bank?sslmode=disable".to_string(),
            max_connections: None,
            min_connections: 5,
            connect_timeout_secs: 30,
            bootstrap_schema: true,
        }
    }
}

/// Ledger store backed by one shared `PgPool`
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl DatabaseConfig {
    /// Configured pool upper bound, or the default
    pub fn pool_size(&self) -> u32 {
        self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS)
    }
}

impl PgLedgerStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open the pool described by `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size())
            .min_connections(config.min_connections.min(config.pool_size()))
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.pool_size(),
            "Connected to ledger database"
        );

        Ok(Self { pool })
    }

    /// Create `accounts` and `transactions` if they do not exist
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_ACCOUNTS).execute(&self.pool).await?;
        sqlx::query(CREATE_TRANSACTIONS).execute(&self.pool).await?;
        info!("Ledger schema ready");
        Ok(())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn read_balance(&self, account: &AccountId) -> Result<i64, StoreError> {
        let balance = sqlx::query_scalar::<_, i64>("SELECT balance_cents FROM accounts WHERE id = $1")
            .bind(account.as_uuid())
            .fetch_one(&self.pool)
            .await?;
        Ok(balance)
    }

    async fn insert_account(&self, balance_cents: i64) -> Result<AccountId, StoreError> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO accounts (balance_cents) VALUES ($1) RETURNING id",
        )
        .bind(balance_cents)
        .fetch_one(&self.pool)
        .await?;
        Ok(AccountId::from(id))
    }

    async fn delete_account(&self, account: &AccountId) -> Result<WriteResult, StoreError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(account.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(WriteResult::with_rows(result.rows_affected()))
    }

    async fn random_account(&self) -> Result<(AccountId, i64), StoreError> {
        let (id, balance) = sqlx::query_as::<_, (Uuid, i64)>(
            "SELECT id, balance_cents FROM accounts ORDER BY random() LIMIT 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok((AccountId::from(id), balance))
    }

    async fn count_accounts(&self) -> Result<u64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT count(*) FROM accounts")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn begin(&self, path: WritePath) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx, path }))
    }
}

struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    path: WritePath,
}

/// Write statement with the suffix `path` asks for
fn write_sql(statement: &str, path: WritePath) -> String {
    format!("{}{}", statement, path.sql_suffix())
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn insert_entry(
        &mut self,
        account: &AccountId,
        entry: &LedgerEntry,
    ) -> Result<(), StoreError> {
        let sql = write_sql(INSERT_ENTRY, self.path);
        sqlx::query(&sql)
            .bind(account.as_uuid())
            .bind(entry.amount_cents())
            .bind(entry.description())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn debit_balance(
        &mut self,
        account: &AccountId,
        total_cents: i64,
    ) -> Result<WriteResult, StoreError> {
        let sql = write_sql(DEBIT_BALANCE, self.path);
        let result = sqlx::query(&sql)
            .bind(total_cents)
            .bind(account.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        Ok(WriteResult::with_rows(result.rows_affected()))
    }

    async fn read_balance(&mut self, account: &AccountId) -> Result<i64, StoreError> {
        let balance = sqlx::query_scalar::<_, i64>("SELECT balance_cents FROM accounts WHERE id = $1")
            .bind(account.as_uuid())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(balance)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_path_selects_statement_suffix() {
        assert_eq!(write_sql(DEBIT_BALANCE, WritePath::Standard), DEBIT_BALANCE);
        assert_eq!(
            write_sql(DEBIT_BALANCE, WritePath::ReturningNothing),
            "UPDATE accounts SET balance_cents = balance_cents - $1 WHERE id = $2 RETURNING NOTHING"
        );
        assert!(write_sql(INSERT_ENTRY, WritePath::ReturningNothing)
            .ends_with("VALUES ($1, gen_random_uuid(), $2, $3) RETURNING NOTHING"));
    }

    #[test]
    fn test_default_database_config() {
        let config = DatabaseConfig::default();
        assert!(config.url.contains(":26257/bank"));
        assert_eq!(config.max_connections, None);
        assert_eq!(config.pool_size(), DEFAULT_MAX_CONNECTIONS);
        assert!(config.bootstrap_schema);
    }
}
