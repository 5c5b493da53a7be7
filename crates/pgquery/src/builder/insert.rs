use super::state::QueryState;
use super::{BuiltQuery, Returning, Statement, StatementKind};
use crate::error::{OrmError, OrmResult};
use crate::id::{IdGenerator, default_generator};
use crate::meta::{InsertTemplate, insert_template};
use crate::param::{Param, ParamList};
use crate::record::{FieldValue, Record};
use std::sync::Arc;

/// One value of a pending row.
#[derive(Debug, Clone)]
enum Cell {
    Bound { param: Param, is_zero: bool },
    /// Server clock (`NOW()`).
    Now,
}

/// INSERT builder for [`Record`] values.
///
/// Columns come from the cached [`InsertTemplate`] of the record type: `id`
/// first (generated when unset), then every writable field, then
/// `updated_at` / `created_at` filled with `NOW()`.
///
/// ```ignore
/// let mut q = InsertBuilder::new("users");
/// q.insert_one(&user).conflict("(email)", "NOTHING");
/// let built = q.build()?;
/// ```
#[derive(Clone)]
pub struct InsertBuilder {
    state: QueryState,
    template: Option<Arc<InsertTemplate>>,
    rows: Vec<Vec<Cell>>,
    single: bool,
    exclude_empty: bool,
    conflict: Option<String>,
    id_generator: Arc<dyn IdGenerator>,
}

impl std::fmt::Debug for InsertBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsertBuilder")
            .field("table", &self.state.table)
            .field("rows", &self.rows.len())
            .field("exclude_empty", &self.exclude_empty)
            .field("conflict", &self.conflict)
            .finish_non_exhaustive()
    }
}

impl InsertBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            state: QueryState::new(StatementKind::Insert, table),
            template: None,
            rows: Vec::new(),
            single: false,
            exclude_empty: false,
            conflict: None,
            id_generator: default_generator(),
        }
    }

    pub fn aliased(table: &str, alias: &str) -> Self {
        Self::new(format!("{table} {}", alias.trim()))
    }

    /// Use `generator` for ids of rows whose id field is unset. Must be
    /// called before the rows are added.
    pub fn id_generator(&mut self, generator: Arc<dyn IdGenerator>) -> &mut Self {
        self.id_generator = generator;
        self
    }

    /// Insert one record.
    pub fn insert_one<T: Record>(&mut self, record: &T) -> &mut Self {
        let template = insert_template::<T>();
        self.rows = vec![self.row_cells(&template, record)];
        self.template = Some(template);
        self.single = true;
        self
    }

    /// Insert every record of `records` in one statement.
    pub fn insert_many<T: Record>(&mut self, records: &[T]) -> &mut Self {
        if records.is_empty() {
            self.state.fail("cannot insert with empty slice");
            return self;
        }
        let template = insert_template::<T>();
        self.rows = records
            .iter()
            .map(|record| self.row_cells(&template, record))
            .collect();
        self.template = Some(template);
        self.single = false;
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

    /// Leave zero-valued fields out of a single-row insert. Bulk inserts
    /// always keep every column.
    pub fn exclude_empty(&mut self) -> &mut Self {
        self.exclude_empty = true;
        self
    }

    /// ` ON CONFLICT <target> DO <action>`, e.g. `("(id)", "NOTHING")`.
    pub fn conflict(&mut self, target: &str, action: &str) -> &mut Self {
        self.conflict = Some(format!("ON CONFLICT {target} DO {action}"));
        self
    }

    fn row_cells<T: Record>(&self, template: &InsertTemplate, record: &T) -> Vec<Cell> {
        let values = record.field_values();
        template
            .field_indexes
            .iter()
            .zip(template.use_id.iter().zip(&template.use_now))
            .map(|(index, (use_id, use_now))| {
                if *use_now {
                    return Cell::Now;
                }
                let value = index.and_then(|i| values.get(i));
                match value {
                    Some(FieldValue::Bound { param, is_zero }) if !(*use_id && *is_zero) => {
                        Cell::Bound {
                            param: param.clone(),
                            is_zero: *is_zero,
                        }
                    }
                    _ if *use_id => Cell::Bound {
                        param: Param::new(self.id_generator.next_id()),
                        is_zero: false,
                    },
                    _ => Cell::Bound {
                        param: Param::null(),
                        is_zero: true,
                    },
                }
            })
            .collect()
    }

    fn render(&self, returning: &[String]) -> OrmResult<BuiltQuery> {
        let st = &self.state;
        if let Some(err) = &st.error {
            return Err(OrmError::build(err.clone()));
        }
        if !st.filters.is_empty() || st.use_pagination || !st.joins.is_empty() {
            return Err(OrmError::build(
                "invalid insert query: cannot include filters, joins, or pagination",
            ));
        }
        let Some(template) = &self.template else {
            return Err(OrmError::build(
                "insert values must be a record or a slice of records",
            ));
        };

        let columns = template.insert_columns();
        let mut args = ParamList::new();

        let (column_list, values) = if self.single && !self.exclude_empty {
            for cell in &self.rows[0] {
                if let Cell::Bound { param, .. } = cell {
                    args.push_param(param.clone());
                }
            }
            (
                columns.join(","),
                template.single_row_placeholders().to_string(),
            )
        } else if self.single {
            let row = &self.rows[0];
            let keep: Vec<bool> = row
                .iter()
                .enumerate()
                .map(|(i, cell)| match cell {
                    Cell::Now => true,
                    Cell::Bound { is_zero, .. } => i == 0 || !is_zero,
                })
                .collect();
            let kept_columns: Vec<&str> = columns
                .iter()
                .zip(&keep)
                .filter(|(_, keep)| **keep)
                .map(|(c, _)| c.as_str())
                .collect();
            let cells: Vec<&Cell> = row
                .iter()
                .zip(&keep)
                .filter(|(_, keep)| **keep)
                .map(|(cell, _)| cell)
                .collect();
            (kept_columns.join(","), render_row(cells, &mut args))
        } else {
            let rows: Vec<String> = self
                .rows
                .iter()
                .map(|row| render_row(row.iter().collect(), &mut args))
                .collect();
            (columns.join(","), rows.join(","))
        };

        let mut sql = format!(
            "INSERT INTO {} ({column_list}) VALUES {values}",
            st.table
        );
        if let Some(conflict) = &self.conflict {
            sql.push(' ');
            sql.push_str(conflict);
        }
        sql.push(' ');
        sql.push_str(&st.render_returning(returning));

        Ok(BuiltQuery::with_args(sql, args))
    }
}

fn render_row(cells: Vec<&Cell>, args: &mut ParamList) -> String {
    let placeholders: Vec<String> = cells
        .into_iter()
        .map(|cell| match cell {
            Cell::Now => "NOW()".to_string(),
            Cell::Bound { param, .. } => format!("${}", args.push_param(param.clone())),
        })
        .collect();
    format!("({})", placeholders.join(","))
}

impl Statement for InsertBuilder {
    fn kind(&self) -> StatementKind {
        self.state.kind
    }

    fn build(&self) -> OrmResult<BuiltQuery> {
        self.render(&self.state.returning)
    }
}

impl Returning for InsertBuilder {
    fn build_returning(&self, columns: &[String]) -> OrmResult<BuiltQuery> {
        if columns.is_empty() {
            return self.build();
        }
        self.render(columns)
    }
}
