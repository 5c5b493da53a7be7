//! Derive macros for pgquery
//!
//! Provides `#[derive(Record)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod common;
mod record;

/// Derive `pgquery::Record` for a struct with named fields.
///
/// # Example
///
/// ```ignore
/// use pgquery::Record;
///
/// #[derive(Debug, Default, Clone, Record)]
/// #[record(rename_all = "camelCase")]
/// struct Wallet {
///     id: i64,
///     #[record(column = "w.owner_name")]
///     owner_name: String,
///     #[record(transform = "int8")]
///     balance: i64,
///     #[record(special = "generated")]
///     balance_text: Option<String>,
///     #[record(nested)]
///     owner: Option<Owner>,
/// }
/// ```
///
/// # Struct attributes
///
/// - `#[record(rename_all = "camelCase" | "snake_case" | "PascalCase")]` -
///   default public name of every field
///
/// # Field attributes
///
/// - `json = "name"` - public (JSON-style) name
/// - `skip` - never projected, written or decoded
/// - `column = "col" | "table.col" | "-"` - storage column; `-` means the
///   column is projected by hand
/// - `special = "generated"` - server-computed, excluded from writes
/// - `transform = "int8"` - cast used by bulk per-row updates
/// - `nested` - the field is a `Record` (`T`, `Option<T>` or `Vec<T>`),
///   projected through JSON aggregation and decoded from JSONB; the nested
///   type must also implement `serde::Deserialize`
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
