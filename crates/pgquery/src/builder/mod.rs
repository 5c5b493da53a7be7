//! Statement builders.
//!
//! All four statement kinds wrap one [`QueryState`](state::QueryState)
//! accumulator and differ only in the operations they expose and in how
//! `build()` assembles the final text.
//!
//! ## Design
//!
//! - Builder methods take `&mut self` and return `&mut Self` for chaining.
//! - Construction errors are deferred: the first one is recorded and
//!   returned by `build()`.
//! - Placeholders are numbered automatically (`$1`, `$2`, ...) and stay
//!   gap-free relative to the returned argument list.
//! - Safe defaults: UPDATE/DELETE require WHERE; HAVING requires GROUP BY.

pub mod delete;
pub mod insert;
pub mod options;
pub mod select;
pub mod select_json;
pub(crate) mod state;
pub mod update;

pub use delete::DeleteBuilder;
pub use insert::InsertBuilder;
pub use options::CustomSort;
pub use select::{ArrayAggConfig, SelectBuilder};
pub use select_json::{JsonAggOptions, JsonFields};
pub use update::{CaseBuilder, UpdateBuilder, UpdateMap, UpdateValue};

use crate::error::OrmResult;
use crate::param::ParamList;
use tokio_postgres::types::ToSql;

/// Which statement a builder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Final SQL text and its positional arguments.
#[derive(Debug, Clone)]
pub struct BuiltQuery {
    pub sql: String,
    pub args: ParamList,
    /// Placeholders in `sql` start at `$placeholder_offset + 1`.
    pub(crate) placeholder_offset: usize,
}

impl BuiltQuery {
    /// A hand-written statement without arguments.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: ParamList::new(),
            placeholder_offset: 0,
        }
    }

    /// A hand-written statement with its `$n` arguments.
    pub fn with_args(sql: impl Into<String>, args: ParamList) -> Self {
        Self {
            sql: sql.into(),
            args,
            placeholder_offset: 0,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Arguments as references compatible with tokio-postgres.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.args.as_refs()
    }
}

/// Anything that can be turned into SQL text plus arguments.
pub trait Statement {
    fn kind(&self) -> StatementKind;

    /// Assemble the statement. Does not modify the builder, so it can be
    /// called repeatedly.
    fn build(&self) -> OrmResult<BuiltQuery>;
}

/// Write statements whose RETURNING list can be replaced at execution time.
pub trait Returning: Statement {
    fn build_returning(&self, columns: &[String]) -> OrmResult<BuiltQuery>;
}

#[cfg(test)]
mod tests;
