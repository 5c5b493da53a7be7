//! Owned, shareable transactions.
//!
//! A [`Transaction`] holds one pooled connection between `BEGIN` and
//! `COMMIT`/`ROLLBACK`. Unlike `tokio_postgres::Transaction` it does not
//! borrow the client, so it can be stored in a service and cloned into
//! request handlers. Statements on one transaction run strictly one after
//! another; the connection sits behind an async mutex.
//!
//! # Example
//!
//! ```ignore
//! let tx = Transaction::begin(&pool).await?;
//! UpdateBuilder::new("wallets")
//!     .set_map(UpdateMap::new().set("balance", 0_i64))
//!     .where_and([("id", Condition::eq(wallet_id))])
//!     .build()?
//!     .execute(&tx)
//!     .await?;
//! tx.commit().await?;
//! ```

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use deadpool_postgres::{Client, Pool};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// An open transaction on a pooled connection. Clones share the same
/// connection.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxInner>,
}

struct TxInner {
    /// `None` once committed or rolled back.
    conn: Mutex<Option<Client>>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("open", &self.is_open())
            .finish()
    }
}

impl Transaction {
    /// Check out a connection from `pool` and run `BEGIN` on it.
    pub async fn begin(pool: &Pool) -> OrmResult<Self> {
        let client = pool.get().await?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(OrmError::from_db_error)?;
        Ok(Self {
            inner: Arc::new(TxInner {
                conn: Mutex::new(Some(client)),
            }),
        })
    }

    /// Whether neither `commit` nor `rollback` has run yet. Returns `true`
    /// while another task holds the connection.
    pub fn is_open(&self) -> bool {
        match self.inner.conn.try_lock() {
            Ok(conn) => conn.is_some(),
            Err(_) => true,
        }
    }

    /// `COMMIT`. On failure the transaction is rolled back and the commit
    /// error returned. The connection goes back to the pool either way.
    pub async fn commit(&self) -> OrmResult<()> {
        let client = self.finish().await?;
        if let Err(err) = client.batch_execute("COMMIT").await {
            tracing::error!(target: "pgquery.sql", error = %err, "commit failed, rolling back");
            if let Err(rollback_err) = client.batch_execute("ROLLBACK").await {
                tracing::error!(target: "pgquery.sql", error = %rollback_err, "rollback after failed commit failed");
                drop(Client::take(client));
            }
            return Err(OrmError::from_db_error(err));
        }
        Ok(())
    }

    /// `ROLLBACK`. A connection whose rollback fails is dropped instead of
    /// being recycled.
    pub async fn rollback(&self) -> OrmResult<()> {
        let client = self.finish().await?;
        if let Err(err) = client.batch_execute("ROLLBACK").await {
            drop(Client::take(client));
            return Err(OrmError::from_db_error(err));
        }
        Ok(())
    }

    async fn finish(&self) -> OrmResult<Client> {
        self.inner
            .conn
            .lock()
            .await
            .take()
            .ok_or_else(finished)
    }

    /// Exclusive access to the connection for statements the
    /// [`GenericClient`] surface does not cover (binary COPY).
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Option<Client>> {
        self.inner.conn.lock().await
    }
}

impl Drop for TxInner {
    fn drop(&mut self) {
        if let Some(client) = self.conn.get_mut().take() {
            tracing::warn!(
                target: "pgquery.sql",
                "transaction dropped without commit or rollback; discarding its connection"
            );
            // Detach from the pool so the open transaction is never reused;
            // closing the connection makes the server roll it back.
            drop(Client::take(client));
        }
    }
}

fn finished() -> OrmError {
    OrmError::Transaction("transaction already finished".to_string())
}

impl GenericClient for Transaction {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        let conn = self.inner.conn.lock().await;
        let client = conn.as_ref().ok_or_else(finished)?;
        GenericClient::query(client, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        let conn = self.inner.conn.lock().await;
        let client = conn.as_ref().ok_or_else(finished)?;
        GenericClient::execute(client, sql, params).await
    }
}
