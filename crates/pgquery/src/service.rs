//! Transaction-aware data-access service.
//!
//! [`RelationalService`] runs built statements against either a pool or an
//! active [`Transaction`]. Once a transaction is set, every call goes
//! through it. The `*_with_data` / `*_with_filter` helpers assemble the
//! statement from a table name, filters and a record or [`UpdateMap`]; the
//! `*_returning` variants replace the RETURNING list and decode the rows.
//!
//! ```ignore
//! let service = RelationalService::new(pool.clone());
//! let id = service.insert_one_with_data("users", &user).await?;
//!
//! let renamed: User = service
//!     .update_one_returning(
//!         "users",
//!         [("id", Condition::eq(id))],
//!         UpdateMap::new().set("name", "Ada".to_string()),
//!         &ReturningConfig::new(["id", "name"]),
//!     )
//!     .await?;
//! ```

use crate::builder::{
    BuiltQuery, DeleteBuilder, InsertBuilder, Returning, SelectBuilder, Statement, UpdateBuilder,
    UpdateMap,
};
use crate::client::GenericClient;
use crate::condition::Filter;
use crate::error::{OrmError, OrmResult};
use crate::meta::insert_template;
use crate::pagination::PaginationResult;
use crate::param::Param;
use crate::record::{FieldValue, Record};
use crate::scan::{scan_row, scan_rows, scan_scalar};
use crate::transaction::Transaction;
use deadpool_postgres::Pool;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tokio_postgres::Row;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::{ToSql, Type};

const SQL_TARGET: &str = "pgquery.sql";

/// RETURNING override for the `*_returning` calls. An empty column list
/// keeps the builder default (`id`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturningConfig {
    pub columns: Vec<String>,
}

impl ReturningConfig {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Values written by a soft delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftDelete {
    pub is_deleted: bool,
}

impl Default for SoftDelete {
    fn default() -> Self {
        Self { is_deleted: true }
    }
}

/// Something an UPDATE can take its SET list from.
pub trait UpdateSource {
    fn apply(self, builder: &mut UpdateBuilder);
}

impl<T: Record> UpdateSource for &T {
    fn apply(self, builder: &mut UpdateBuilder) {
        builder.set_record(self);
    }
}

impl UpdateSource for UpdateMap {
    fn apply(self, builder: &mut UpdateBuilder) {
        builder.set_map(self);
    }
}

impl UpdateSource for SoftDelete {
    /// `is_deleted = $n, deleted_at = NOW()`
    fn apply(self, builder: &mut UpdateBuilder) {
        builder.set_map(
            UpdateMap::new()
                .set("is_deleted", self.is_deleted)
                .raw("deleted_at", "NOW()", Vec::new()),
        );
    }
}

/// Data-access service bound to a pool and, optionally, a transaction.
#[derive(Clone, Default)]
pub struct RelationalService {
    pool: Option<Pool>,
    tx: Option<Transaction>,
    debug_level: u8,
}

impl std::fmt::Debug for RelationalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalService")
            .field("pool", &self.pool.as_ref().map(Pool::status))
            .field("tx", &self.tx)
            .field("debug_level", &self.debug_level)
            .finish()
    }
}

impl RelationalService {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool: Some(pool),
            tx: None,
            debug_level: 0,
        }
    }

    /// A service that only runs inside `tx`.
    pub fn for_transaction(tx: Transaction) -> Self {
        Self {
            pool: None,
            tx: Some(tx),
            debug_level: 0,
        }
    }

    /// SQL logging level (target `pgquery.sql`):
    ///
    /// - 1: statement text
    /// - 2: text and arguments
    /// - 3: text, arguments, elapsed time and row count
    ///
    /// Anything else selects level 1.
    pub fn debug(&mut self, level: u8) -> &mut Self {
        self.debug_level = if (1..=3).contains(&level) { level } else { 1 };
        self
    }

    pub fn debug_level(&self) -> u8 {
        self.debug_level
    }

    pub fn get_pool(&self) -> Option<&Pool> {
        self.pool.as_ref()
    }

    pub fn get_transaction(&self) -> Option<&Transaction> {
        self.tx.as_ref()
    }

    /// Route every following call through `tx`.
    pub fn set_transaction(&mut self, tx: Transaction) -> &mut Self {
        self.tx = Some(tx);
        self
    }

    /// Commit the active transaction and detach it. A failed commit is
    /// rolled back.
    pub async fn commit_transaction(&mut self) -> OrmResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| OrmError::Transaction("no active transaction to commit".to_string()))?;
        tx.commit().await
    }

    /// Roll back the active transaction and detach it.
    pub async fn rollback_transaction(&mut self) -> OrmResult<()> {
        let tx = self.tx.take().ok_or_else(|| {
            OrmError::Transaction("no active transaction to rollback".to_string())
        })?;
        tx.rollback().await
    }

    // ===== raw statements =====

    /// Run a `SELECT COUNT(*)`-shaped statement.
    pub async fn count(&self, query: &BuiltQuery) -> OrmResult<i64> {
        let rows = self.fetch(query).await?;
        let row = first(rows)?;
        scan_scalar(&row)
    }

    /// `SELECT COUNT(*) FROM table WHERE <filter>`.
    pub async fn count_with_filter(&self, table: &str, filter: impl Into<Filter>) -> OrmResult<i64> {
        let query = SelectBuilder::count(table).where_and(filter).build()?;
        self.count(&query).await
    }

    /// Run a statement that returns nothing useful, such as DDL.
    pub async fn execute(&self, sql: &str) -> OrmResult<()> {
        self.run(&BuiltQuery::new(sql)).await.map(|_| ())
    }

    /// First row of `query`, or [`OrmError::NotFound`].
    pub async fn select_one<T: Record>(&self, query: &BuiltQuery) -> OrmResult<T> {
        let rows = self.fetch(query).await?;
        scan_row(&first(rows)?)
    }

    pub async fn select_many<T: Record>(&self, query: &BuiltQuery) -> OrmResult<Vec<T>> {
        let rows = self.fetch(query).await?;
        scan_rows(&rows)
    }

    /// Run a statement built in pagination mode and decode its single
    /// `data, totalRecords` row.
    pub async fn select_paginated<T: DeserializeOwned>(
        &self,
        query: &BuiltQuery,
    ) -> OrmResult<PaginationResult<T>> {
        let rows = self.fetch(query).await?;
        let row = first(rows)?;
        let data: serde_json::Value = row
            .try_get(0)
            .map_err(|e| OrmError::decode("data", e.to_string()))?;
        let total_records: i64 = row
            .try_get(1)
            .map_err(|e| OrmError::decode("totalrecords", e.to_string()))?;
        Ok(PaginationResult {
            total_records,
            data: serde_json::from_value(data)?,
        })
    }

    /// Run an `INSERT ... RETURNING id` and return the id.
    pub async fn insert_one(&self, query: &BuiltQuery) -> OrmResult<i64> {
        self.returning_id(query).await
    }

    /// Run an INSERT and return the affected row count.
    pub async fn insert_many(&self, query: &BuiltQuery) -> OrmResult<u64> {
        self.run(query).await
    }

    /// Run an `UPDATE ... RETURNING id` and return the id.
    pub async fn update_one(&self, query: &BuiltQuery) -> OrmResult<i64> {
        self.returning_id(query).await
    }

    pub async fn update_many(&self, query: &BuiltQuery) -> OrmResult<u64> {
        self.run(query).await
    }

    /// Run a `... RETURNING id` delete and return the id.
    pub async fn delete_one(&self, query: &BuiltQuery) -> OrmResult<i64> {
        self.returning_id(query).await
    }

    pub async fn delete_many(&self, query: &BuiltQuery) -> OrmResult<u64> {
        self.run(query).await
    }

    // ===== built from records and filters =====

    /// Insert `record` and return its id.
    pub async fn insert_one_with_data<T: Record>(&self, table: &str, record: &T) -> OrmResult<i64> {
        let query = InsertBuilder::new(table).insert_one(record).build()?;
        self.insert_one(&query).await
    }

    /// Insert `record` and decode the RETURNING row into `R`.
    pub async fn insert_one_returning<T: Record, R: Record>(
        &self,
        table: &str,
        record: &T,
        returning: &ReturningConfig,
    ) -> OrmResult<R> {
        let mut builder = InsertBuilder::new(table);
        builder.insert_one(record);
        let query = builder.build_returning(&returning.columns)?;
        self.select_one(&query).await
    }

    /// Insert every record in one statement and return the affected row count.
    pub async fn insert_many_with_data<T: Record>(&self, table: &str, records: &[T]) -> OrmResult<u64> {
        let query = InsertBuilder::new(table).insert_many(records).build()?;
        self.insert_many(&query).await
    }

    pub async fn insert_many_returning<T: Record, R: Record>(
        &self,
        table: &str,
        records: &[T],
        returning: &ReturningConfig,
    ) -> OrmResult<Vec<R>> {
        let mut builder = InsertBuilder::new(table);
        builder.insert_many(records);
        let query = builder.build_returning(&returning.columns)?;
        self.select_many(&query).await
    }

    /// Bulk load through binary `COPY ... FROM STDIN`.
    ///
    /// Uses the insert template of `T`: unset ids are generated and the
    /// timestamp columns get the client clock, since COPY cannot evaluate
    /// `NOW()`. Returns the number of rows written.
    pub async fn insert_batch<T: Record>(&self, table: &str, records: &[T]) -> OrmResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        if let Some(tx) = &self.tx {
            let conn = tx.lock().await;
            let client = conn
                .as_ref()
                .ok_or_else(|| OrmError::Transaction("transaction already finished".to_string()))?;
            copy_records(client, table, records, self.debug_level).await
        } else {
            let client = self.pool()?.get().await?;
            copy_records(&client, table, records, self.debug_level).await
        }
    }

    /// Update one row matching `filter` and return its id.
    pub async fn update_one_with_data(
        &self,
        table: &str,
        filter: impl Into<Filter>,
        body: impl UpdateSource,
    ) -> OrmResult<i64> {
        let query = update_statement(table, filter, body).build()?;
        self.update_one(&query).await
    }

    pub async fn update_one_returning<R: Record>(
        &self,
        table: &str,
        filter: impl Into<Filter>,
        body: impl UpdateSource,
        returning: &ReturningConfig,
    ) -> OrmResult<R> {
        let query = update_statement(table, filter, body).build_returning(&returning.columns)?;
        self.select_one(&query).await
    }

    /// Update every row matching `filter`; returns the affected row count.
    pub async fn update_many_with_data(
        &self,
        table: &str,
        filter: impl Into<Filter>,
        body: impl UpdateSource,
    ) -> OrmResult<u64> {
        let query = update_statement(table, filter, body).build()?;
        self.update_many(&query).await
    }

    pub async fn update_many_returning<R: Record>(
        &self,
        table: &str,
        filter: impl Into<Filter>,
        body: impl UpdateSource,
        returning: &ReturningConfig,
    ) -> OrmResult<Vec<R>> {
        let query = update_statement(table, filter, body).build_returning(&returning.columns)?;
        self.select_many(&query).await
    }

    /// Per-row bulk update: each record's values are joined on `row_id`.
    pub async fn update_each_with_data<T: Record>(
        &self,
        table: &str,
        row_id: &str,
        filter: impl Into<Filter>,
        records: &[T],
    ) -> OrmResult<u64> {
        let mut builder = UpdateBuilder::new(table);
        builder.update_each(records, row_id).where_and(filter);
        let query = builder.build()?;
        self.update_many(&query).await
    }

    /// `UPDATE table SET is_deleted = true, deleted_at = NOW()` on one row.
    pub async fn soft_delete_one(&self, table: &str, filter: impl Into<Filter>) -> OrmResult<i64> {
        self.update_one_with_data(table, filter, SoftDelete::default())
            .await
    }

    pub async fn soft_delete_one_returning<R: Record>(
        &self,
        table: &str,
        filter: impl Into<Filter>,
        returning: &ReturningConfig,
    ) -> OrmResult<R> {
        self.update_one_returning(table, filter, SoftDelete::default(), returning)
            .await
    }

    pub async fn soft_delete_many(&self, table: &str, filter: impl Into<Filter>) -> OrmResult<u64> {
        self.update_many_with_data(table, filter, SoftDelete::default())
            .await
    }

    pub async fn soft_delete_many_returning<R: Record>(
        &self,
        table: &str,
        filter: impl Into<Filter>,
        returning: &ReturningConfig,
    ) -> OrmResult<Vec<R>> {
        self.update_many_returning(table, filter, SoftDelete::default(), returning)
            .await
    }

    pub async fn delete_one_with_filter(&self, table: &str, filter: impl Into<Filter>) -> OrmResult<i64> {
        let query = DeleteBuilder::new(table).where_and(filter).build()?;
        self.delete_one(&query).await
    }

    pub async fn delete_many_with_filter(&self, table: &str, filter: impl Into<Filter>) -> OrmResult<u64> {
        let query = DeleteBuilder::new(table).where_and(filter).build()?;
        self.delete_many(&query).await
    }

    // ===== execution =====

    fn pool(&self) -> OrmResult<&Pool> {
        self.pool
            .as_ref()
            .ok_or_else(|| OrmError::Connection("service has neither a pool nor a transaction".to_string()))
    }

    async fn returning_id(&self, query: &BuiltQuery) -> OrmResult<i64> {
        let rows = self.fetch(query).await?;
        scan_scalar(&first(rows)?)
    }

    async fn fetch(&self, query: &BuiltQuery) -> OrmResult<Vec<Row>> {
        self.log_statement(query);
        let started = Instant::now();
        let params = query.params_ref();
        let result = match &self.tx {
            Some(tx) => tx.query(&query.sql, &params).await,
            None => {
                let client = self.pool()?.get().await?;
                GenericClient::query(&client, &query.sql, &params).await
            }
        };
        self.log_outcome(query, started, result.as_ref().map(|rows| rows.len() as u64));
        result
    }

    async fn run(&self, query: &BuiltQuery) -> OrmResult<u64> {
        self.log_statement(query);
        let started = Instant::now();
        let params = query.params_ref();
        let result = match &self.tx {
            Some(tx) => tx.execute(&query.sql, &params).await,
            None => {
                let client = self.pool()?.get().await?;
                GenericClient::execute(&client, &query.sql, &params).await
            }
        };
        self.log_outcome(query, started, result.as_ref().copied());
        result
    }

    fn log_statement(&self, query: &BuiltQuery) {
        match self.debug_level {
            0 => {}
            1 => tracing::debug!(target: SQL_TARGET, sql = %query.sql, "query"),
            _ => tracing::debug!(target: SQL_TARGET, sql = %query.sql, args = ?query.args, "query"),
        }
    }

    fn log_outcome(&self, query: &BuiltQuery, started: Instant, outcome: Result<u64, &OrmError>) {
        match outcome {
            Ok(rows) if self.debug_level >= 3 => tracing::debug!(
                target: SQL_TARGET,
                elapsed_ms = started.elapsed().as_millis() as u64,
                rows,
                "query finished"
            ),
            Ok(_) => {}
            Err(err) if self.debug_level >= 1 => tracing::error!(
                target: SQL_TARGET,
                sql = %query.sql,
                args = ?query.args,
                error = %err,
                "query failed"
            ),
            Err(_) => {}
        }
    }
}

fn first(rows: Vec<Row>) -> OrmResult<Row> {
    rows.into_iter()
        .next()
        .ok_or_else(|| OrmError::not_found("Expected one row, got none"))
}

fn update_statement(table: &str, filter: impl Into<Filter>, body: impl UpdateSource) -> UpdateBuilder {
    let mut builder = UpdateBuilder::new(table);
    body.apply(&mut builder);
    builder.where_and(filter);
    builder
}

async fn copy_records<T: Record>(
    client: &tokio_postgres::Client,
    table: &str,
    records: &[T],
    debug_level: u8,
) -> OrmResult<u64> {
    let template = insert_template::<T>();
    let columns = template
        .columns
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ");

    // Column types drive the binary encoding.
    let probe = client
        .prepare(&format!("SELECT {columns} FROM {table} LIMIT 0"))
        .await
        .map_err(OrmError::from_db_error)?;
    let types: Vec<Type> = probe.columns().iter().map(|c| c.type_().clone()).collect();

    let copy = format!("COPY {table} ({columns}) FROM STDIN (FORMAT binary)");
    if debug_level >= 1 {
        tracing::debug!(target: SQL_TARGET, sql = %copy, rows = records.len(), "copy");
    }
    let sink = client.copy_in(&copy).await.map_err(OrmError::from_db_error)?;
    let writer = BinaryCopyInWriter::new(sink, &types);
    futures_util::pin_mut!(writer);

    let generator = crate::id::default_generator();
    let now = chrono::Utc::now();
    for record in records {
        let values = record.field_values();
        let row: Vec<Param> = template
            .field_indexes
            .iter()
            .zip(template.use_id.iter().zip(&template.use_now))
            .zip(&types)
            .map(|((index, (use_id, use_now)), ty)| {
                if *use_now {
                    return if *ty == Type::TIMESTAMP {
                        Param::new(now.naive_utc())
                    } else {
                        Param::new(now)
                    };
                }
                match index.and_then(|i| values.get(i)) {
                    Some(FieldValue::Bound { param, is_zero }) if !(*use_id && *is_zero) => {
                        param.clone()
                    }
                    _ if *use_id => Param::new(generator.next_id()),
                    _ => Param::null(),
                }
            })
            .collect();
        let refs: Vec<&(dyn ToSql + Sync)> = row.iter().map(Param::as_ref).collect();
        writer
            .as_mut()
            .write(&refs)
            .await
            .map_err(OrmError::from_db_error)?;
    }
    writer.finish().await.map_err(OrmError::from_db_error)
}

/// Run `f` inside a fresh transaction.
///
/// Commits when `f` returns `Ok`, rolls back when it returns `Err` or
/// panics. Begin/commit failures and panics are logged and reported as the
/// generic [`OrmError::Transaction`] message; errors returned by `f` pass
/// through unchanged.
///
/// ```ignore
/// let id = use_transactions(&pool, |tx| async move {
///     let service = RelationalService::for_transaction(tx);
///     let id = service.insert_one_with_data("wallets", &wallet).await?;
///     service.update_many_with_data("users", [("id", Condition::eq(owner))], &owner_patch).await?;
///     Ok(id)
/// })
/// .await?;
/// ```
pub async fn use_transactions<T, F, Fut>(pool: &Pool, f: F) -> OrmResult<T>
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = OrmResult<T>>,
{
    let tx = begin(pool).await?;
    let value = run_unit(&tx, f).await?;
    if let Err(err) = tx.commit().await {
        tracing::error!(error = %err, "failed to commit transaction");
        return Err(OrmError::generic_transaction());
    }
    Ok(value)
}

/// Like [`use_transactions`], but on success the transaction is handed back
/// open and the caller must commit or roll it back. A held transaction that
/// is dropped unfinished is logged and its connection discarded. On error or
/// panic the transaction is rolled back before returning.
pub async fn use_transactions_held<T, F, Fut>(pool: &Pool, f: F) -> OrmResult<(T, Transaction)>
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = OrmResult<T>>,
{
    let tx = begin(pool).await?;
    let value = run_unit(&tx, f).await?;
    Ok((value, tx))
}

async fn begin(pool: &Pool) -> OrmResult<Transaction> {
    Transaction::begin(pool).await.map_err(|err| {
        tracing::error!(error = %err, "can't start transaction");
        OrmError::generic_transaction()
    })
}

/// Run the unit of work; on error or panic roll `tx` back.
async fn run_unit<T, F, Fut>(tx: &Transaction, f: F) -> OrmResult<T>
where
    F: FnOnce(Transaction) -> Fut,
    Fut: Future<Output = OrmResult<T>>,
{
    let outcome = AssertUnwindSafe(async { f(tx.clone()).await })
        .catch_unwind()
        .await;
    let err = match outcome {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "transaction unit of work failed");
            err
        }
        Err(panic) => {
            tracing::error!(
                panic = panic_message(panic.as_ref()),
                backtrace = %Backtrace::force_capture(),
                "transaction panicked"
            );
            OrmError::generic_transaction()
        }
    };
    if tx.is_open() {
        if let Err(rollback_err) = tx.rollback().await {
            tracing::error!(error = %rollback_err, "rollback failed");
        }
    }
    Err(err)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
