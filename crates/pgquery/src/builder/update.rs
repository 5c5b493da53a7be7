use super::state::{QueryState, join_parts};
use super::{BuiltQuery, Returning, Statement, StatementKind};
use crate::condition::{Filter, MultiFilter};
use crate::error::{OrmError, OrmResult};
use crate::ident::{bind_question_marks, is_valid_type_name};
use crate::meta::{FieldMeta, field_meta};
use crate::param::Param;
use crate::record::{FieldValue, IsZero, Record};
use crate::text::camel_to_snake;
use tokio_postgres::types::ToSql;

/// Value assigned to one column by [`UpdateBuilder::set_map`].
#[derive(Debug, Clone)]
pub enum UpdateValue {
    Value { param: Param, is_zero: bool },
    /// SQL expression; each `?` binds the next entry of `args`.
    Raw { expr: String, args: Vec<Param> },
    /// Entries merged into the same SET list.
    Nested(UpdateMap),
}

/// Ordered column -> value assignments.
///
/// ```ignore
/// let map = UpdateMap::new()
///     .set("used", 5_i32)
///     .raw("available", "CASE WHEN available IS NULL THEN NULL ELSE available - ? END", vec![Param::new(5_i32)]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct UpdateMap {
    entries: Vec<(String, UpdateValue)>,
}

impl UpdateMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T>(mut self, column: impl Into<String>, value: T) -> Self
    where
        T: ToSql + IsZero + Send + Sync + 'static,
    {
        let is_zero = value.is_zero();
        self.entries.push((
            column.into(),
            UpdateValue::Value {
                param: Param::new(value),
                is_zero,
            },
        ));
        self
    }

    pub fn set_param(mut self, column: impl Into<String>, param: Param) -> Self {
        self.entries.push((
            column.into(),
            UpdateValue::Value {
                param,
                is_zero: false,
            },
        ));
        self
    }

    pub fn raw(mut self, column: impl Into<String>, expr: impl Into<String>, args: Vec<Param>) -> Self {
        self.entries.push((
            column.into(),
            UpdateValue::Raw {
                expr: expr.into(),
                args,
            },
        ));
        self
    }

    pub fn nested(mut self, column: impl Into<String>, map: UpdateMap) -> Self {
        self.entries.push((column.into(), UpdateValue::Nested(map)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Branches of one `CASE` expression added by [`UpdateBuilder::add_case`].
pub struct CaseBuilder<'a> {
    state: &'a mut QueryState,
    branches: Vec<String>,
}

impl CaseBuilder<'_> {
    /// `WHEN <conditions> THEN $n`.
    pub fn case<T: ToSql + Send + Sync + 'static>(&mut self, conditions: MultiFilter, value: T) -> &mut Self {
        let when = self.when_clause(conditions);
        let value = self.state.bind(Param::new(value));
        self.branches.push(format!("WHEN {when} THEN {value}"));
        self
    }

    /// `WHEN <conditions> THEN <expr>` where `expr` is a column or expression.
    pub fn case_ref(&mut self, conditions: MultiFilter, expr: &str) -> &mut Self {
        let when = self.when_clause(conditions);
        self.branches.push(format!("WHEN {when} THEN {expr}"));
        self
    }

    /// `ELSE $n`.
    pub fn otherwise<T: ToSql + Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
        let value = self.state.bind(Param::new(value));
        self.branches.push(format!("ELSE {value}"));
        self
    }

    /// `ELSE <expr>`, e.g. the column itself to keep its value.
    pub fn otherwise_ref(&mut self, expr: &str) -> &mut Self {
        self.branches.push(format!("ELSE {expr}"));
        self
    }

    fn when_clause(&mut self, conditions: MultiFilter) -> String {
        let mut parts = self.state.compile_and(&conditions.and);
        if let Some(or) = self.state.compile_or(&conditions.or) {
            parts.push(or);
        }
        if parts.is_empty() {
            "TRUE".to_string()
        } else {
            parts.join(" AND ")
        }
    }
}

/// UPDATE builder.
///
/// ```ignore
/// let mut q = UpdateBuilder::new("users");
/// q.set_record(&patch).where_and([("id", Condition::eq(id))]);
/// let built = q.build()?; // UPDATE users SET ..., "updated_at" = NOW() WHERE "id" = $n RETURNING id
/// ```
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    state: QueryState,
    sets: Vec<String>,
    touched_updated_at: bool,
    cases: Vec<(String, Vec<String>)>,
    values_table: Option<String>,
    from_tables: Vec<String>,
    exclude_empty: bool,
}

impl UpdateBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            state: QueryState::new(StatementKind::Update, table),
            sets: Vec::new(),
            touched_updated_at: false,
            cases: Vec::new(),
            values_table: None,
            from_tables: Vec::new(),
            exclude_empty: false,
        }
    }

    pub fn aliased(table: &str, alias: &str) -> Self {
        Self::new(format!("{table} {}", alias.trim()))
    }

    /// Skip zero-valued fields in later `set_record` / `set_map` calls.
    pub fn exclude_empty(&mut self) -> &mut Self {
        self.exclude_empty = true;
        self
    }

    /// Assign every writable field of `record`.
    ///
    /// Skipped: fields with public name `-`, generated fields, record lists,
    /// hand-projected columns (`column = "-"`) and, with
    /// [`exclude_empty`](Self::exclude_empty), zero values. Nested records are
    /// flattened into the same SET list.
    pub fn set_record<T: Record>(&mut self, record: &T) -> &mut Self {
        let meta = field_meta::<T>();
        let values = record.field_values();
        self.set_fields(&meta, &values);
        self
    }

    fn set_fields(&mut self, meta: &[FieldMeta], values: &[FieldValue]) {
        for field in meta {
            if field.json_tag == "-" || field.is_generated || field.is_list {
                continue;
            }
            let Some(value) = values.get(field.index) else {
                continue;
            };
            match value {
                FieldValue::Nested(nested) => self.set_fields(&field.nested, nested),
                FieldValue::Absent => {}
                FieldValue::Bound { param, is_zero } => {
                    if *is_zero && self.exclude_empty {
                        continue;
                    }
                    let Some(column) = update_column(field) else {
                        continue;
                    };
                    let placeholder = self.state.bind(param.clone());
                    self.touch(&column);
                    self.sets.push(format!("\"{column}\" = {placeholder}"));
                }
            }
        }
    }

    /// Assign the entries of `map`, in order. Keys are used as column names.
    pub fn set_map(&mut self, map: UpdateMap) -> &mut Self {
        for (column, value) in map.entries {
            match value {
                UpdateValue::Value { param, is_zero } => {
                    if is_zero && self.exclude_empty {
                        continue;
                    }
                    let placeholder = self.state.bind(param);
                    self.touch(&column);
                    self.sets.push(format!("\"{column}\" = {placeholder}"));
                }
                UpdateValue::Raw { expr, args } => {
                    let offset = self.state.placeholder_offset;
                    let expr = bind_question_marks(&expr, &args, &mut self.state.args, offset);
                    self.touch(&column);
                    self.sets.push(format!("\"{column}\" = {expr}"));
                }
                UpdateValue::Nested(nested) => {
                    self.set_map(nested);
                }
            }
        }
        self
    }

    /// `"col" = "col" + $n` for each entry; keys are snake-cased.
    pub fn increment<I, K>(&mut self, amounts: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, Param)>,
        K: AsRef<str>,
    {
        for (key, amount) in amounts {
            let column = camel_to_snake(key.as_ref());
            let placeholder = self.state.bind(amount);
            self.touch(&column);
            self.sets
                .push(format!("\"{column}\" = \"{column}\" + {placeholder}"));
        }
        self
    }

    /// Update many rows in one statement from a `VALUES` table joined on
    /// `row_id`:
    ///
    /// `UPDATE t SET "c" = v."c", ... FROM (VALUES ($1::int8, ...), ...) as v("id","c",...) WHERE t."id" = v."id"`
    ///
    /// Every written field must carry a `transform` cast type.
    pub fn update_each<T: Record>(&mut self, records: &[T], row_id: &str) -> &mut Self {
        if records.is_empty() {
            self.state.fail("update many values must be non-empty slice of struct");
            return self;
        }

        let meta = field_meta::<T>();
        let fields: Vec<(&FieldMeta, String)> = meta
            .iter()
            .filter(|f| !f.is_generated && !f.is_record && !f.is_list && f.json_tag != "-")
            .filter_map(|f| update_column(f).map(|column| (f, column)))
            .collect();

        if let Some((field, _)) = fields
            .iter()
            .find(|(f, _)| !is_valid_type_name(f.transform))
        {
            self.state.fail(format!(
                "update_each: field '{}' needs a valid transform type, got '{}'",
                field.name, field.transform
            ));
            return self;
        }

        let prefix = self.state.table_prefix().to_string();
        self.state
            .filters
            .push(format!("{prefix}.\"{row_id}\" = v.\"{row_id}\""));

        let mut value_columns = Vec::with_capacity(fields.len());
        for (_, column) in &fields {
            value_columns.push(format!("\"{column}\""));
            if column != row_id {
                self.touch(column);
                self.sets.push(format!("\"{column}\" = v.\"{column}\""));
            }
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let values = record.field_values();
            let placeholders: Vec<String> = fields
                .iter()
                .map(|(field, _)| {
                    let param = match values.get(field.index) {
                        Some(FieldValue::Bound { param, .. }) => param.clone(),
                        _ => Param::null(),
                    };
                    format!("{}::{}", self.state.bind(param), field.transform.trim())
                })
                .collect();
            rows.push(format!("({})", placeholders.join(", ")));
        }

        self.values_table = Some(format!(
            "(VALUES {}) as v({})",
            rows.join(", "),
            value_columns.join(",")
        ));
        self
    }

    /// Set `column` through a `CASE` expression built in `f`.
    pub fn add_case(&mut self, column: &str, f: impl FnOnce(&mut CaseBuilder<'_>)) -> &mut Self {
        let mut cases = CaseBuilder {
            state: &mut self.state,
            branches: Vec::new(),
        };
        f(&mut cases);
        let branches = cases.branches;
        self.touch(column);
        self.cases.push((column.to_string(), branches));
        self
    }

    /// `FROM a, b` for multi-table updates.
    pub fn from<I, S>(&mut self, tables: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.from_tables.extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn where_and(&mut self, filter: impl Into<Filter>) -> &mut Self {
        let parts = self.state.compile_and(&filter.into());
        self.state.filters.extend(parts);
        self
    }

    pub fn where_or(&mut self, groups: impl IntoIterator<Item = Filter>) -> &mut Self {
        let groups: Vec<Filter> = groups.into_iter().collect();
        if let Some(fragment) = self.state.compile_or(&groups) {
            self.state.filters.push(fragment);
        }
        self
    }

    pub fn join(&mut self, table: &str, on: &str) -> &mut Self {
        self.state.joins.push(format!("JOIN {table} ON {on}"));
        self
    }

    pub fn left_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.state.joins.push(format!("LEFT JOIN {table} ON {on}"));
        self
    }

    pub fn with_cte<S: Statement>(&mut self, name: &str, sub: &S) -> &mut Self {
        match sub.build() {
            Ok(built) => self.state.add_cte(name, &built, false),
            Err(err) => self.state.fail(err.to_string()),
        }
        self
    }

    pub fn with_recursive_cte<S: Statement>(&mut self, name: &str, sub: &S) -> &mut Self {
        match sub.build() {
            Ok(built) => self.state.add_cte(name, &built, true),
            Err(err) => self.state.fail(err.to_string()),
        }
        self
    }

    /// Columns to return. Defaults to `id`.
    pub fn returning<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    fn touch(&mut self, column: &str) {
        if column.trim_matches('"') == "updated_at" {
            self.touched_updated_at = true;
        }
    }

    fn render(&self, returning: &[String]) -> OrmResult<BuiltQuery> {
        let st = &self.state;
        if let Some(err) = &st.error {
            return Err(OrmError::build(err.clone()));
        }
        if st.filters.is_empty() {
            return Err(OrmError::build(
                "unsafe query: DELETE/UPDATE must have WHERE clause",
            ));
        }
        if self.sets.is_empty() && self.cases.is_empty() {
            return Err(OrmError::build("invalid update query: nothing to set"));
        }

        let mut sets = self.sets.clone();
        for (column, branches) in &self.cases {
            sets.push(format!("{column} = CASE {} END", branches.join(" ")));
        }
        if !self.touched_updated_at {
            sets.push("\"updated_at\" = NOW()".to_string());
        }

        let mut sources: Vec<&str> = Vec::new();
        if let Some(values) = &self.values_table {
            sources.push(values);
        }
        sources.extend(self.from_tables.iter().map(String::as_str));
        let from = if sources.is_empty() {
            String::new()
        } else {
            format!("FROM {}", sources.join(", "))
        };

        let sql = join_parts([
            st.render_with().unwrap_or_default(),
            format!("UPDATE {} SET {}", st.table, sets.join(", ")),
            from,
            st.joins.join(" "),
            st.render_where().unwrap_or_default(),
            st.render_returning(returning),
        ]);
        Ok(st.finish(sql))
    }
}

/// Column written for `field`: column tag (after the table qualifier), else
/// the snake-cased public name, else the snake-cased field name.
fn update_column(field: &FieldMeta) -> Option<String> {
    match field.column_tag {
        "-" => None,
        "" if field.json_tag.is_empty() => Some(camel_to_snake(field.name)),
        _ => field.write_column(),
    }
}

impl Statement for UpdateBuilder {
    fn kind(&self) -> StatementKind {
        self.state.kind
    }

    fn build(&self) -> OrmResult<BuiltQuery> {
        self.render(&self.state.returning)
    }
}

impl Returning for UpdateBuilder {
    fn build_returning(&self, columns: &[String]) -> OrmResult<BuiltQuery> {
        if columns.is_empty() {
            return self.build();
        }
        self.render(columns)
    }
}
