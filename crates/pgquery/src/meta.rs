//! Metadata extractor and the process-wide caches built on top of it.
//!
//! Every derived artefact (field tree, default select list, insert template,
//! scanner column map) is computed once per type and shared read-only
//! afterwards. [`clear_cache`] resets all of them.

use crate::record::{FieldDef, FieldShape, Record};
use crate::text::camel_to_snake;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One record field, resolved from its [`FieldDef`].
#[derive(Debug, Clone)]
pub struct FieldMeta {
    pub name: &'static str,
    pub type_name: &'static str,
    pub json_tag: &'static str,
    pub column_tag: &'static str,
    pub transform: &'static str,
    /// Position in [`Record::fields`] / [`Record::field_values`].
    pub index: usize,
    pub nested: Vec<FieldMeta>,
    pub is_list: bool,
    pub is_record: bool,
    pub is_temporal: bool,
    pub is_generated: bool,
}

impl FieldMeta {
    /// Storage column used for writes: the part after the dot of a qualified
    /// column tag, or the snake-cased public name.
    pub fn write_column(&self) -> Option<String> {
        match self.column_tag {
            "-" => None,
            "" => match self.json_tag {
                "" | "-" => None,
                json => Some(camel_to_snake(json)),
            },
            tag => Some(match tag.split_once('.') {
                Some((_, column)) => column.to_string(),
                None => tag.to_string(),
            }),
        }
    }

    /// Whether this field holds the row identifier.
    pub fn is_id(&self) -> bool {
        matches!(self.json_tag, "id" | "_id") || self.column_tag == "id"
    }
}

/// Column/placeholder plan for inserting one record type.
///
/// Column 0 is always `id`; the two trailing columns are `updated_at` and
/// `created_at`, filled with the server clock.
#[derive(Debug, Clone)]
pub struct InsertTemplate {
    /// Bare storage column names.
    pub columns: Vec<String>,
    /// Source field for each column (`None` for server-filled columns).
    pub field_indexes: Vec<Option<usize>>,
    /// Column takes a generated id when the source field is zero or absent.
    pub use_id: Vec<bool>,
    /// Column is filled with the current time.
    pub use_now: Vec<bool>,
    single_row: String,
}

impl InsertTemplate {
    fn build(fields: &[FieldMeta]) -> Self {
        let mut columns = vec!["id".to_string()];
        let mut field_indexes = vec![fields.iter().find(|f| f.is_id()).map(|f| f.index)];
        let mut use_id = vec![true];
        let mut use_now = vec![false];

        for field in fields {
            if field.is_generated || field.is_id() || field.is_record || field.is_list {
                continue;
            }
            let Some(column) = field.write_column() else {
                continue;
            };
            if column == "updated_at" || column == "created_at" {
                continue;
            }
            columns.push(column);
            field_indexes.push(Some(field.index));
            use_id.push(false);
            use_now.push(false);
        }

        for column in ["updated_at", "created_at"] {
            columns.push(column.to_string());
            field_indexes.push(None);
            use_id.push(false);
            use_now.push(true);
        }

        let mut single_row = String::from("(");
        let mut n = 0;
        for (i, now) in use_now.iter().enumerate() {
            if i > 0 {
                single_row.push(',');
            }
            if *now {
                single_row.push_str("NOW()");
            } else {
                n += 1;
                single_row.push_str(&format!("${n}"));
            }
        }
        single_row.push(')');

        Self {
            columns,
            field_indexes,
            use_id,
            use_now,
            single_row,
        }
    }

    /// Column list as written in an INSERT: `id` and the timestamps bare,
    /// every other column quoted.
    pub fn insert_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .zip(&self.use_id)
            .zip(&self.use_now)
            .map(|((column, id), now)| {
                if *id || *now {
                    column.clone()
                } else {
                    format!("\"{column}\"")
                }
            })
            .collect()
    }

    /// Pre-rendered `($1,...,NOW(),NOW())` row for a single-record insert.
    pub fn single_row_placeholders(&self) -> &str {
        &self.single_row
    }

    /// Number of bound arguments per row.
    pub fn bound_per_row(&self) -> usize {
        self.use_now.iter().filter(|now| !**now).count()
    }
}

#[derive(Default)]
struct Caches {
    field_meta: RwLock<HashMap<TypeId, Arc<[FieldMeta]>>>,
    columns: RwLock<HashMap<TypeId, Arc<[String]>>>,
    insert: RwLock<HashMap<TypeId, Arc<InsertTemplate>>>,
    field_maps: RwLock<HashMap<(TypeId, String), Arc<[Option<usize>]>>>,
}

fn caches() -> &'static Caches {
    static CACHES: OnceLock<Caches> = OnceLock::new();
    CACHES.get_or_init(Caches::default)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Look `key` up in `lock`, computing and storing the value on a miss.
fn cached<K, V>(lock: &RwLock<HashMap<K, V>>, key: K, build: impl FnOnce() -> V) -> V
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    if let Some(hit) = read(lock).get(&key) {
        return hit.clone();
    }
    let value = build();
    write(lock).entry(key).or_insert(value).clone()
}

/// Resolve a static field table into a [`FieldMeta`] tree.
pub fn extract_fields(defs: &'static [FieldDef]) -> Vec<FieldMeta> {
    defs.iter()
        .enumerate()
        .map(|(index, def)| {
            let (nested, is_record, is_list) = match def.shape {
                FieldShape::Record(fields) => (extract_fields(fields()), true, false),
                FieldShape::RecordList(fields) => (extract_fields(fields()), false, true),
                FieldShape::Scalar | FieldShape::Temporal => (Vec::new(), false, false),
            };
            FieldMeta {
                name: def.name,
                type_name: def.type_name,
                json_tag: def.json,
                column_tag: def.column,
                transform: def.transform,
                index,
                nested,
                is_list,
                is_record,
                is_temporal: matches!(def.shape, FieldShape::Temporal),
                is_generated: def.special.contains("generated"),
            }
        })
        .collect()
}

/// Field tree of `T`, built once per type.
pub fn field_meta<T: Record>() -> Arc<[FieldMeta]> {
    cached(&caches().field_meta, TypeId::of::<T>(), || {
        extract_fields(T::fields()).into()
    })
}

/// Default select list of `T`: every projected field aliased to its public name.
pub fn select_columns<T: Record>() -> Arc<[String]> {
    cached(&caches().columns, TypeId::of::<T>(), || {
        columns_from_meta(&field_meta::<T>()).into()
    })
}

/// Insert plan of `T`, built once per type.
pub fn insert_template<T: Record>() -> Arc<InsertTemplate> {
    cached(&caches().insert, TypeId::of::<T>(), || {
        Arc::new(InsertTemplate::build(&field_meta::<T>()))
    })
}

/// Public name -> storage column, for fields with an explicit column tag.
pub fn json_column_map<T: Record>() -> HashMap<&'static str, &'static str> {
    field_meta::<T>()
        .iter()
        .filter(|f| !matches!(f.json_tag, "" | "-") && !matches!(f.column_tag, "" | "-"))
        .map(|f| (f.json_tag, f.column_tag))
        .collect()
}

/// For each result column, the index of the field it decodes into.
///
/// Matching is case-insensitive against the storage column (unqualified),
/// the Rust field name and the public name. Memoized per column signature.
pub fn field_map<T: Record>(result_columns: &[&str]) -> Arc<[Option<usize>]> {
    let key = (TypeId::of::<T>(), result_columns.join(","));
    cached(&caches().field_maps, key, || {
        let meta = field_meta::<T>();
        let mut lookup: HashMap<String, usize> = HashMap::new();
        for field in meta.iter() {
            // Later candidates never override an explicit column tag.
            let column = field
                .column_tag
                .rsplit('.')
                .next()
                .filter(|c| !c.is_empty() && *c != "-");
            if let Some(column) = column {
                lookup.insert(column.to_lowercase(), field.index);
            }
            lookup.entry(field.name.to_lowercase()).or_insert(field.index);
            if !matches!(field.json_tag, "" | "-") {
                lookup
                    .entry(field.json_tag.to_lowercase())
                    .or_insert(field.index);
            }
        }
        result_columns
            .iter()
            .map(|name| lookup.get(&name.to_lowercase()).copied())
            .collect::<Vec<_>>()
            .into()
    })
}

/// Drop every cached artefact. Intended for test isolation.
pub fn clear_cache() {
    let caches = caches();
    write(&caches.field_meta).clear();
    write(&caches.columns).clear();
    write(&caches.insert).clear();
    write(&caches.field_maps).clear();
}

fn columns_from_meta(fields: &[FieldMeta]) -> Vec<String> {
    let mut columns = Vec::with_capacity(fields.len());
    for field in fields {
        if matches!(field.json_tag, "" | "-") {
            continue;
        }

        if !field.nested.is_empty() {
            if let Some(expr) = nested_projection(field) {
                columns.push(format!("{expr} as \"{}\"", field.json_tag));
            }
            continue;
        }

        match field.column_tag {
            "" => {
                let snake = camel_to_snake(field.json_tag);
                if snake == field.json_tag {
                    columns.push(snake);
                } else {
                    columns.push(format!("\"{snake}\" as \"{}\"", field.json_tag));
                }
            }
            "-" => {}
            column => columns.push(format!("{column} as \"{}\"", field.json_tag)),
        }
    }
    columns
}

fn nested_projection(parent: &FieldMeta) -> Option<String> {
    let pairs: Vec<String> = parent
        .nested
        .iter()
        .filter(|f| !matches!(f.json_tag, "" | "-") && !matches!(f.column_tag, "" | "-"))
        .map(|f| format!("'{}', {}", f.json_tag, crate::ident::quote_column(f.column_tag)))
        .collect();

    if pairs.is_empty() {
        return None;
    }
    let object = format!("jsonb_build_object({})", pairs.join(", "));
    Some(if parent.is_list {
        format!("jsonb_agg({object})")
    } else {
        object
    })
}
