//! Compile-time record description.
//!
//! A [`Record`] exposes a `'static` table of [`FieldDef`]s (normally generated by
//! `#[derive(Record)]`), the current value of each field as a bound argument,
//! and a setter used by the row scanner.
//!
//! ```ignore
//! #[derive(Debug, Default, Clone, Record)]
//! #[record(rename_all = "camelCase")]
//! struct Wallet {
//!     id: i64,
//!     #[record(column = "w.owner_name")]
//!     owner_name: String,
//!     #[record(special = "generated")]
//!     balance_text: Option<String>,
//! }
//! ```

use crate::error::{OrmError, OrmResult};
use crate::param::Param;
use serde::de::DeserializeOwned;
use std::error::Error;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, WasNull, WrongType};

/// Shape of one field, as seen by the metadata extractor.
#[derive(Clone, Copy)]
pub enum FieldShape {
    Scalar,
    /// Date/time values: scalar, never recursed into.
    Temporal,
    /// A nested record (`T` or `Option<T>`).
    Record(fn() -> &'static [FieldDef]),
    /// A list of nested records (`Vec<T>`).
    RecordList(fn() -> &'static [FieldDef]),
}

impl std::fmt::Debug for FieldShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldShape::Scalar => f.write_str("Scalar"),
            FieldShape::Temporal => f.write_str("Temporal"),
            FieldShape::Record(_) => f.write_str("Record"),
            FieldShape::RecordList(_) => f.write_str("RecordList"),
        }
    }
}

/// Static description of one record field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    /// Rust field name.
    pub name: &'static str,
    /// Field type as written in the source.
    pub type_name: &'static str,
    /// Public (JSON-style) name. `"-"` means never projected.
    pub json: &'static str,
    /// Storage column: `""` (derive from the public name), `"col"`,
    /// `"table.col"` or `"-"` (hand-projected).
    pub column: &'static str,
    /// Free-form marker list; contains `generated` for server-computed columns.
    pub special: &'static str,
    /// Cast used by bulk update-each rows (`$n::<transform>`).
    pub transform: &'static str,
    pub shape: FieldShape,
}

impl FieldDef {
    pub const fn scalar(name: &'static str, type_name: &'static str) -> Self {
        Self {
            name,
            type_name,
            json: name,
            column: "",
            special: "",
            transform: "",
            shape: FieldShape::Scalar,
        }
    }
}

/// Current value of one field.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Bound { param: Param, is_zero: bool },
    /// Values of a nested record, in the nested record's field order.
    Nested(Vec<FieldValue>),
    /// The field carries no writable value (absent nested record, record lists).
    Absent,
}

impl FieldValue {
    pub fn bound<T>(value: &T) -> Self
    where
        T: tokio_postgres::types::ToSql + IsZero + Clone + Send + Sync + 'static,
    {
        FieldValue::Bound {
            param: Param::new(value.clone()),
            is_zero: value.is_zero(),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            FieldValue::Bound { is_zero, .. } => *is_zero,
            FieldValue::Nested(values) => values.iter().all(FieldValue::is_zero),
            FieldValue::Absent => true,
        }
    }
}

/// A typed record that can be written by the builders and filled by the
/// row scanner.
pub trait Record: Default + Send + Sync + 'static {
    /// Field table, in declaration order.
    fn fields() -> &'static [FieldDef];

    /// One value per entry of [`Record::fields`].
    fn field_values(&self) -> Vec<FieldValue>;

    /// Decode result column `column` of `row` into field `index`.
    fn set_field(&mut self, index: usize, row: &Row, column: usize) -> OrmResult<()>;
}

/// Store result column `column` of `row` in `slot`.
///
/// A value the field cannot hold (a column of another SQL type, or `NULL`
/// for a non-`Option` field) is skipped and `slot` keeps its value. Other
/// decode failures are errors.
pub fn assign_column<'a, T: FromSql<'a>>(slot: &mut T, row: &'a Row, column: usize) -> OrmResult<()> {
    match row.try_get(column) {
        Ok(value) => {
            *slot = value;
            Ok(())
        }
        Err(err) if is_unassignable(err.source()) => {
            tracing::debug!(
                target: "pgquery.scan",
                column = column_name(row, column),
                error = %err,
                "column not assignable to field, skipped"
            );
            Ok(())
        }
        Err(err) => Err(OrmError::decode(column_name(row, column), err.to_string())),
    }
}

/// Decode a JSON/JSONB result column into `T`. SQL `NULL` or a non-JSON
/// column gives `None`.
pub fn decode_json<T: DeserializeOwned>(row: &Row, column: usize) -> OrmResult<Option<T>> {
    let mut value: Option<serde_json::Value> = None;
    assign_column(&mut value, row, column)?;
    let Some(value) = value else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| OrmError::decode(column_name(row, column), e.to_string()))
}

fn column_name(row: &Row, column: usize) -> &str {
    row.columns()
        .get(column)
        .map(|c| c.name())
        .unwrap_or("<out of range>")
}

/// Whether a `try_get` failure means the value does not fit the field type.
fn is_unassignable(cause: Option<&(dyn Error + 'static)>) -> bool {
    cause.is_some_and(|cause| cause.is::<WrongType>() || cause.is::<WasNull>())
}

/// Zero-value test used by `exclude_empty` and id generation.
pub trait IsZero {
    fn is_zero(&self) -> bool;
}

macro_rules! impl_is_zero_default {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IsZero for $ty {
                fn is_zero(&self) -> bool {
                    *self == <$ty>::default()
                }
            }
        )*
    };
}

impl_is_zero_default!(
    i8, i16, i32, i64, u32, f32, f64, bool, char,
    chrono::NaiveDateTime, chrono::NaiveDate, chrono::NaiveTime,
);

impl IsZero for String {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl IsZero for &'static str {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<T> IsZero for Option<T> {
    fn is_zero(&self) -> bool {
        self.is_none()
    }
}

impl<T> IsZero for Vec<T> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<Tz: chrono::TimeZone> IsZero for chrono::DateTime<Tz> {
    fn is_zero(&self) -> bool {
        self.timestamp() == 0 && self.timestamp_subsec_nanos() == 0
    }
}

impl IsZero for std::time::SystemTime {
    fn is_zero(&self) -> bool {
        *self == std::time::UNIX_EPOCH
    }
}

impl IsZero for uuid::Uuid {
    fn is_zero(&self) -> bool {
        self.is_nil()
    }
}

impl IsZero for serde_json::Value {
    fn is_zero(&self) -> bool {
        self.is_null()
    }
}

impl<T> IsZero for tokio_postgres::types::Json<T> {
    fn is_zero(&self) -> bool {
        false
    }
}
