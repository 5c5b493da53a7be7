//! # pgquery
//!
//! A typed PostgreSQL query builder with a fused pagination engine and a
//! transactional data-access service.
//!
//! ## Features
//!
//! - **Typed records**: `#[derive(Record)]` produces a static field table;
//!   column lists, insert plans and scanner maps are derived from it once per
//!   type and cached.
//! - **Filter compiler**: ordered AND/OR condition groups compile to
//!   positional SQL (`$1`, `$2`, ...) with gap-free numbering.
//! - **Four builders**: SELECT / INSERT / UPDATE / DELETE sharing one
//!   statement state, with CTE and sub-query splicing.
//! - **Fused pagination**: one round trip returns the page as JSON plus the
//!   total row count.
//! - **Safe defaults**: UPDATE/DELETE require WHERE, HAVING requires GROUP BY.
//! - **Service layer**: pool- or transaction-backed CRUD helpers with
//!   commit/rollback/panic handling.
//!
//! ```ignore
//! use pgquery::prelude::*;
//!
//! let built = SelectBuilder::new("users")
//!     .select(["id", "name"])
//!     .where_and([("status", Condition::eq("active"))])
//!     .build()?;
//! assert_eq!(built.sql, r#"SELECT id,name FROM users WHERE "status" = $1"#);
//!
//! let users: Vec<User> = built.fetch_all(&client).await?;
//! ```

extern crate self as pgquery;

pub mod builder;
pub mod client;
pub mod condition;
pub mod cte;
pub mod error;
mod filter;
pub mod id;
pub mod ident;
pub mod meta;
pub mod pagination;
pub mod param;
pub mod prelude;
pub mod record;
pub mod scan;
pub mod text;

#[cfg(feature = "pool")]
pub mod config;
#[cfg(feature = "pool")]
pub mod pool;
#[cfg(feature = "pool")]
pub mod service;
#[cfg(feature = "pool")]
pub mod transaction;

pub use builder::{
    ArrayAggConfig, BuiltQuery, CaseBuilder, CustomSort, DeleteBuilder, InsertBuilder,
    JsonAggOptions, JsonFields, Returning, SelectBuilder, Statement, StatementKind,
    UpdateBuilder, UpdateMap, UpdateValue,
};
pub use client::GenericClient;
pub use condition::{CondValue, Condition, Filter, MultiFilter, SqlOp};
pub use error::{OrmError, OrmResult};
pub use id::{IdGenerator, SequenceIdGenerator, Snowflake};
pub use meta::{FieldMeta, InsertTemplate, clear_cache};
pub use pagination::{Pagination, PaginationResult, Sort};
pub use param::{Null, Param, ParamList};
pub use record::{FieldDef, FieldShape, FieldValue, IsZero, Record};
pub use scan::{scan_row, scan_rows};
pub use tokio_postgres::Row;

#[cfg(feature = "pool")]
pub use config::DbConfig;
#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config, create_pool_with_manager_config};
#[cfg(feature = "pool")]
pub use service::{
    RelationalService, ReturningConfig, SoftDelete, UpdateSource, use_transactions,
    use_transactions_held,
};
#[cfg(feature = "pool")]
pub use transaction::Transaction;

#[cfg(feature = "derive")]
pub use pgquery_derive::Record;
