//! Convenient imports for typical `pgquery` usage.
//!
//! ```ignore
//! use pgquery::prelude::*;
//! ```

pub use crate::{
    BuiltQuery, Condition, DeleteBuilder, Filter, GenericClient, InsertBuilder, MultiFilter,
    OrmError, OrmResult, Pagination, PaginationResult, Param, Record, Returning, SelectBuilder,
    Sort, SqlOp, Statement, UpdateBuilder, UpdateMap,
};

#[cfg(feature = "pool")]
pub use crate::{
    DbConfig, RelationalService, ReturningConfig, Transaction, create_pool, use_transactions,
};
