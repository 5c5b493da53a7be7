//! Positional argument storage shared by every builder.

use bytes::BytesMut;
use std::error::Error;
use std::sync::Arc;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};

/// A clone-friendly bound argument.
///
/// Builders clone their argument lists when sub-queries are spliced into a
/// parent, so values are stored behind an `Arc`.
#[derive(Clone)]
pub struct Param {
    value: Arc<dyn ToSql + Send + Sync>,
    accepts: fn(&Type) -> bool,
}

/// Casts tried, in order, for text extracted from JSON. Array types map to
/// their element type so `= ANY($n)` compares like with like.
const TEXT_CASTS: &[(Type, &str)] = &[
    (Type::BOOL, "boolean"),
    (Type::INT2, "int2"),
    (Type::INT4, "int4"),
    (Type::INT8, "int8"),
    (Type::FLOAT4, "float4"),
    (Type::FLOAT8, "float8"),
    (Type::NUMERIC, "numeric"),
    (Type::UUID, "uuid"),
    (Type::DATE, "date"),
    (Type::TIMESTAMP, "timestamp"),
    (Type::TIMESTAMPTZ, "timestamptz"),
    (Type::JSONB, "jsonb"),
    (Type::BOOL_ARRAY, "boolean"),
    (Type::INT2_ARRAY, "int2"),
    (Type::INT4_ARRAY, "int4"),
    (Type::INT8_ARRAY, "int8"),
    (Type::FLOAT4_ARRAY, "float4"),
    (Type::FLOAT8_ARRAY, "float8"),
    (Type::NUMERIC_ARRAY, "numeric"),
    (Type::UUID_ARRAY, "uuid"),
    (Type::DATE_ARRAY, "date"),
    (Type::TIMESTAMP_ARRAY, "timestamp"),
    (Type::TIMESTAMPTZ_ARRAY, "timestamptz"),
];

impl Param {
    /// Create a new parameter from any ToSql value.
    pub fn new<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Param {
            value: Arc::new(value),
            accepts: <T as ToSql>::accepts,
        }
    }

    /// Whether the value can be bound to a parameter of type `ty`.
    pub fn accepts(&self, ty: &Type) -> bool {
        (self.accepts)(ty)
    }

    /// SQL type that text (such as `value ->> 'key'`) must be cast to before
    /// it is compared with this value. `None` when the value binds as text.
    pub fn text_cast(&self) -> Option<&'static str> {
        if self.accepts(&Type::TEXT) {
            return None;
        }
        TEXT_CASTS
            .iter()
            .find(|(ty, _)| self.accepts(ty))
            .map(|(_, cast)| *cast)
    }

    /// SQL `NULL`, accepted for a parameter of any type.
    pub fn null() -> Self {
        Param::new(Null)
    }

    /// Get a reference to the inner value as a ToSql trait object.
    pub fn as_ref(&self) -> &(dyn ToSql + Sync) {
        &*self.value as &(dyn ToSql + Sync)
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // ToSql requires Debug, so the bound value can be shown in SQL logs.
        std::fmt::Debug::fmt(&*self.value, f)
    }
}

/// Untyped `NULL`: accepts whatever type the server inferred for its slot.
#[derive(Debug, Clone, Copy)]
pub struct Null;

impl ToSql for Null {
    fn to_sql(&self, _: &Type, _: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// An ordered argument list; position `i` is bound to `$i+1`.
#[derive(Clone, Debug, Default)]
pub struct ParamList {
    params: Vec<Param>,
}

impl ParamList {
    /// Create a new empty parameter list.
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Add a parameter and return its 1-based index.
    pub fn push<T: ToSql + Send + Sync + 'static>(&mut self, value: T) -> usize {
        self.params.push(Param::new(value));
        self.params.len()
    }

    /// Add a pre-wrapped Param and return its 1-based index.
    pub fn push_param(&mut self, param: Param) -> usize {
        self.params.push(param);
        self.params.len()
    }

    /// Get the current parameter count.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.params.iter()
    }

    /// Get all parameters as references for tokio-postgres.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    /// Extend this list with another list's parameters.
    pub fn extend(&mut self, other: &ParamList) {
        self.params.extend(other.params.iter().cloned());
    }

    /// Extend this list with parameters from an iterator.
    pub fn extend_params(&mut self, params: impl IntoIterator<Item = Param>) {
        self.params.extend(params);
    }

    pub fn truncate(&mut self, len: usize) {
        self.params.truncate(len);
    }
}

impl FromIterator<Param> for ParamList {
    fn from_iter<I: IntoIterator<Item = Param>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}
