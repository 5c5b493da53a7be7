//! Filter conditions.
//!
//! A [`Filter`] maps columns to [`Condition`]s and compiles to one AND-group;
//! a slice of filters compiles to an OR of AND-groups.
//!
//! # Example
//! ```ignore
//! use pgquery::{Condition, Filter};
//!
//! let filter = Filter::new()
//!     .and("status", Condition::eq("active"))
//!     .and("u.age", Condition::gte(18_i32))
//!     .and("deleted_at", Condition::is_null())
//!     .and("role", Condition::in_list(vec!["admin", "editor"]));
//! ```

use crate::error::OrmError;
use crate::param::Param;
use std::str::FromStr;
use tokio_postgres::types::ToSql;

/// SQL operator families understood by the filter compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    /// `~`
    Match,
    /// `~*`
    IMatch,
    /// `!~`
    NotMatch,
    /// `!~*`
    NotIMatch,
    In,
    NotIn,
    Any,
    Like,
    NotLike,
    ILike,
    NotILike,
    IsNull,
    IsNotNull,
    Between,
    NotBetween,
    Exists,
    NotExists,
    /// The value is literal SQL with `?` placeholders.
    Raw,
}

impl SqlOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            SqlOp::Eq => "=",
            SqlOp::Ne => "!=",
            SqlOp::Gt => ">",
            SqlOp::Lt => "<",
            SqlOp::Gte => ">=",
            SqlOp::Lte => "<=",
            SqlOp::Match => "~",
            SqlOp::IMatch => "~*",
            SqlOp::NotMatch => "!~",
            SqlOp::NotIMatch => "!~*",
            SqlOp::In => "IN",
            SqlOp::NotIn => "NOT IN",
            SqlOp::Any => "ANY",
            SqlOp::Like => "LIKE",
            SqlOp::NotLike => "NOT LIKE",
            SqlOp::ILike => "ILIKE",
            SqlOp::NotILike => "NOT ILIKE",
            SqlOp::IsNull => "IS NULL",
            SqlOp::IsNotNull => "IS NOT NULL",
            SqlOp::Between => "BETWEEN",
            SqlOp::NotBetween => "NOT BETWEEN",
            SqlOp::Exists => "EXISTS",
            SqlOp::NotExists => "NOT EXISTS",
            SqlOp::Raw => "__RAW__",
        }
    }

    pub fn is_null_check(self) -> bool {
        matches!(self, SqlOp::IsNull | SqlOp::IsNotNull)
    }
}

impl std::fmt::Display for SqlOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SqlOp {
    type Err = OrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_uppercase().as_str() {
            "=" => SqlOp::Eq,
            "!=" | "<>" => SqlOp::Ne,
            ">" => SqlOp::Gt,
            "<" => SqlOp::Lt,
            ">=" => SqlOp::Gte,
            "<=" => SqlOp::Lte,
            "~" => SqlOp::Match,
            "~*" => SqlOp::IMatch,
            "!~" => SqlOp::NotMatch,
            "!~*" => SqlOp::NotIMatch,
            "IN" => SqlOp::In,
            "NOT IN" => SqlOp::NotIn,
            "ANY" => SqlOp::Any,
            "LIKE" => SqlOp::Like,
            "NOT LIKE" => SqlOp::NotLike,
            "ILIKE" => SqlOp::ILike,
            "NOT ILIKE" => SqlOp::NotILike,
            "IS NULL" => SqlOp::IsNull,
            "IS NOT NULL" => SqlOp::IsNotNull,
            "BETWEEN" => SqlOp::Between,
            "NOT BETWEEN" => SqlOp::NotBetween,
            "EXISTS" => SqlOp::Exists,
            "NOT EXISTS" => SqlOp::NotExists,
            "__RAW__" => SqlOp::Raw,
            other => return Err(OrmError::validation(format!("unknown operator '{other}'"))),
        };
        Ok(op)
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone)]
pub enum CondValue {
    /// Absent value: the condition is skipped unless it is a null check.
    Null,
    One(Param),
    /// One placeholder per element (`IN` / `NOT IN`).
    List(Vec<Param>),
    /// The whole array bound as one argument (`= ANY($n)`).
    Array { param: Param, len: usize },
    /// `BETWEEN` bounds; either side may be absent.
    Range(Option<Param>, Option<Param>),
    /// Epoch-millisecond `BETWEEN` bounds, compared through `to_timestamp`.
    EpochRange(Option<i64>, Option<i64>),
    /// SQL text inlined as given: a column reference, a subquery or raw SQL.
    Sql(String),
}

impl CondValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CondValue::Null)
    }

    /// Cast for a text operand compared against this value; see
    /// [`Param::text_cast`].
    pub fn text_cast(&self) -> Option<&'static str> {
        match self {
            CondValue::One(param) | CondValue::Array { param, .. } => param.text_cast(),
            CondValue::List(items) => items.first().and_then(Param::text_cast),
            CondValue::Range(from, to) => from.as_ref().or(to.as_ref()).and_then(Param::text_cast),
            CondValue::EpochRange(..) => Some("timestamptz"),
            CondValue::Null | CondValue::Sql(_) => None,
        }
    }
}

/// One filter condition.
#[derive(Debug, Clone)]
pub struct Condition {
    pub operator: SqlOp,
    /// Key inside JSON array elements (`value ->> 'key'`).
    pub key: Option<String>,
    pub value: CondValue,
    /// The value is a column/expression reference, not a bound argument.
    pub is_ref: bool,
    /// The column name itself is bound as the left-hand argument.
    pub source_is_value: bool,
    /// The value is a subquery inlined untouched; the column is not quoted.
    pub is_sub_query: bool,
    pub is_epoch_time: bool,
    /// Match against the elements of a JSONB array column.
    pub is_array: bool,
    /// Arguments for the `?` marks of a raw condition.
    pub extra_args: Vec<Param>,
}

impl Condition {
    pub fn new(operator: SqlOp, value: CondValue) -> Self {
        Self {
            operator,
            key: None,
            value,
            is_ref: false,
            source_is_value: false,
            is_sub_query: false,
            is_epoch_time: false,
            is_array: false,
            extra_args: Vec::new(),
        }
    }

    /// `column <op> $n`
    pub fn op<T: ToSql + Send + Sync + 'static>(operator: SqlOp, value: T) -> Self {
        Self::new(operator, CondValue::One(Param::new(value)))
    }

    /// `column <op> $n` when `value` is present; skipped otherwise.
    pub fn maybe<T: ToSql + Send + Sync + 'static>(operator: SqlOp, value: Option<T>) -> Self {
        match value {
            Some(value) => Self::op(operator, value),
            None => Self::new(operator, CondValue::Null),
        }
    }

    pub fn eq<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Self::op(SqlOp::Eq, value)
    }

    pub fn ne<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Self::op(SqlOp::Ne, value)
    }

    pub fn gt<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Self::op(SqlOp::Gt, value)
    }

    pub fn gte<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Self::op(SqlOp::Gte, value)
    }

    pub fn lt<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Self::op(SqlOp::Lt, value)
    }

    pub fn lte<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Self::op(SqlOp::Lte, value)
    }

    pub fn like<T: ToSql + Send + Sync + 'static>(pattern: T) -> Self {
        Self::op(SqlOp::Like, pattern)
    }

    pub fn ilike<T: ToSql + Send + Sync + 'static>(pattern: T) -> Self {
        Self::op(SqlOp::ILike, pattern)
    }

    pub fn not_like<T: ToSql + Send + Sync + 'static>(pattern: T) -> Self {
        Self::op(SqlOp::NotLike, pattern)
    }

    pub fn not_ilike<T: ToSql + Send + Sync + 'static>(pattern: T) -> Self {
        Self::op(SqlOp::NotILike, pattern)
    }

    /// POSIX regex match (`~`).
    pub fn matches<T: ToSql + Send + Sync + 'static>(pattern: T) -> Self {
        Self::op(SqlOp::Match, pattern)
    }

    /// Case-insensitive POSIX regex match (`~*`).
    pub fn imatches<T: ToSql + Send + Sync + 'static>(pattern: T) -> Self {
        Self::op(SqlOp::IMatch, pattern)
    }

    pub fn is_null() -> Self {
        Self::new(SqlOp::IsNull, CondValue::Null)
    }

    pub fn is_not_null() -> Self {
        Self::new(SqlOp::IsNotNull, CondValue::Null)
    }

    pub fn in_list<T: ToSql + Send + Sync + 'static>(values: Vec<T>) -> Self {
        Self::new(SqlOp::In, list(values))
    }

    pub fn not_in<T: ToSql + Send + Sync + 'static>(values: Vec<T>) -> Self {
        Self::new(SqlOp::NotIn, list(values))
    }

    /// `IN` over an optional list: `None` skips the condition, an empty list
    /// matches nothing.
    pub fn in_list_opt<T: ToSql + Send + Sync + 'static>(values: Option<Vec<T>>) -> Self {
        match values {
            Some(values) => Self::in_list(values),
            None => Self::new(SqlOp::In, CondValue::Null),
        }
    }

    /// `column = ANY($n)` with the whole array bound once.
    pub fn any<T>(values: Vec<T>) -> Self
    where
        T: ToSql + Send + Sync + 'static,
        Vec<T>: ToSql,
    {
        let len = values.len();
        Self::new(
            SqlOp::Any,
            CondValue::Array {
                param: Param::new(values),
                len,
            },
        )
    }

    pub fn between<T: ToSql + Send + Sync + 'static>(from: T, to: T) -> Self {
        Self::range(SqlOp::Between, Some(from), Some(to))
    }

    pub fn not_between<T: ToSql + Send + Sync + 'static>(from: T, to: T) -> Self {
        Self::range(SqlOp::NotBetween, Some(from), Some(to))
    }

    /// A range where either bound may be absent.
    pub fn range<T: ToSql + Send + Sync + 'static>(
        operator: SqlOp,
        from: Option<T>,
        to: Option<T>,
    ) -> Self {
        Self::new(
            operator,
            CondValue::Range(from.map(Param::new), to.map(Param::new)),
        )
    }

    /// Epoch-millisecond range compared against a timestamp column.
    pub fn epoch_between(from_ms: Option<i64>, to_ms: Option<i64>) -> Self {
        let mut cond = Self::new(SqlOp::Between, CondValue::EpochRange(from_ms, to_ms));
        cond.is_epoch_time = true;
        cond
    }

    pub fn epoch_not_between(from_ms: Option<i64>, to_ms: Option<i64>) -> Self {
        let mut cond = Self::epoch_between(from_ms, to_ms);
        cond.operator = SqlOp::NotBetween;
        cond
    }

    /// `column <op> <expr>` where `expr` is another column or expression.
    pub fn column_ref(operator: SqlOp, expr: impl Into<String>) -> Self {
        let mut cond = Self::new(operator, CondValue::Sql(expr.into()));
        cond.is_ref = true;
        cond
    }

    /// `column <op> <subquery>`; the text is inlined untouched, parentheses
    /// included, and the column is not quoted.
    pub fn sub_query(operator: SqlOp, sql: impl Into<String>) -> Self {
        let mut cond = Self::new(operator, CondValue::Sql(sql.into()));
        cond.is_sub_query = true;
        cond
    }

    /// Literal SQL; each `?` is bound to the next entry of `args`.
    pub fn raw(sql: impl Into<String>, args: Vec<Param>) -> Self {
        let mut cond = Self::new(SqlOp::Raw, CondValue::Sql(sql.into()));
        cond.extra_args = args;
        cond
    }

    /// Bind the column name as the left-hand argument (`$n <op> $n+1`).
    pub fn source_is_value(mut self) -> Self {
        self.source_is_value = true;
        self
    }

    /// Match `key` inside the elements of a JSONB array column.
    pub fn json_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self.is_array = true;
        self
    }
}

fn list<T: ToSql + Send + Sync + 'static>(values: Vec<T>) -> CondValue {
    CondValue::List(values.into_iter().map(Param::new).collect())
}

/// An ordered AND-group: column (or case key) -> condition.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    entries: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition (builder style).
    pub fn and(mut self, column: impl Into<String>, condition: Condition) -> Self {
        self.push(column, condition);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, condition: Condition) {
        self.entries.push((column.into(), condition));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.entries.iter().map(|(c, cond)| (c.as_str(), cond))
    }
}

impl<S: Into<String>> FromIterator<(S, Condition)> for Filter {
    fn from_iter<I: IntoIterator<Item = (S, Condition)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(c, cond)| (c.into(), cond)).collect(),
        }
    }
}

impl<S: Into<String>, const N: usize> From<[(S, Condition); N]> for Filter {
    fn from(entries: [(S, Condition); N]) -> Self {
        entries.into_iter().collect()
    }
}

/// AND-group plus OR-groups, used by CASE branches.
#[derive(Debug, Clone, Default)]
pub struct MultiFilter {
    pub and: Filter,
    pub or: Vec<Filter>,
}

impl MultiFilter {
    pub fn and(filter: impl Into<Filter>) -> Self {
        Self {
            and: filter.into(),
            or: Vec::new(),
        }
    }

    pub fn or(mut self, filters: Vec<Filter>) -> Self {
        self.or = filters;
        self
    }
}
