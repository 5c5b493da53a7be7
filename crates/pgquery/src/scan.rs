//! Row scanner: decode driver rows into [`Record`] values.
//!
//! Result columns are matched to fields through [`field_map`], which is
//! memoized per record type and column signature. Columns that match no
//! field are skipped; a column that matches but fails to decode is an error.

use crate::error::{OrmError, OrmResult};
use crate::meta::field_map;
use crate::record::Record;
use tokio_postgres::Row;

/// Decode one row.
pub fn scan_row<T: Record>(row: &Row) -> OrmResult<T> {
    let names: Vec<&str> = row.columns().iter().map(|c| c.name()).collect();
    let map = field_map::<T>(&names);
    decode(row, &map)
}

/// Decode every row. The column map is resolved once from the first row.
pub fn scan_rows<T: Record>(rows: &[Row]) -> OrmResult<Vec<T>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let names: Vec<&str> = first.columns().iter().map(|c| c.name()).collect();
    let map = field_map::<T>(&names);
    rows.iter().map(|row| decode(row, &map)).collect()
}

/// Decode a single-column row (`RETURNING id`, `COUNT(*)`).
pub fn scan_scalar<V>(row: &Row) -> OrmResult<V>
where
    V: for<'a> tokio_postgres::types::FromSql<'a>,
{
    let column = row
        .columns()
        .first()
        .map(|c| c.name().to_string())
        .ok_or_else(|| OrmError::decode("<none>", "row has no columns"))?;
    row.try_get(0)
        .map_err(|e| OrmError::decode(column, e.to_string()))
}

fn decode<T: Record>(row: &Row, map: &[Option<usize>]) -> OrmResult<T> {
    let mut record = T::default();
    for (column, field) in map.iter().enumerate() {
        if let Some(field) = field {
            record.set_field(*field, row, column)?;
        }
    }
    Ok(record)
}
