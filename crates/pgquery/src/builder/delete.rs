use super::state::{QueryState, join_parts};
use super::{BuiltQuery, Returning, Statement, StatementKind};
use crate::condition::Filter;
use crate::error::{OrmError, OrmResult};

/// DELETE builder. Requires at least one WHERE condition and always ends with
/// `RETURNING` (default `id`).
///
/// ```ignore
/// let mut q = DeleteBuilder::new("sessions");
/// q.using(["users u"])
///     .where_and([("sessions.user_id", Condition::column_ref(SqlOp::Eq, "u.id"))]);
/// ```
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    state: QueryState,
    using: Vec<String>,
}

impl DeleteBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            state: QueryState::new(StatementKind::Delete, table),
            using: Vec::new(),
        }
    }

    pub fn aliased(table: &str, alias: &str) -> Self {
        Self::new(format!("{table} {}", alias.trim()))
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

    /// `USING a, b` for multi-table deletes.
    pub fn using<I, S>(&mut self, tables: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.using.extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn with_cte<S: Statement>(&mut self, name: &str, sub: &S) -> &mut Self {
        match sub.build() {
            Ok(built) => self.state.add_cte(name, &built, false),
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
        if !st.joins.is_empty() || st.use_pagination {
            return Err(OrmError::build(
                "invalid delete query: cannot include joins or pagination",
            ));
        }

        let using = if self.using.is_empty() {
            String::new()
        } else {
            format!("USING {}", self.using.join(", "))
        };
        let sql = join_parts([
            st.render_with().unwrap_or_default(),
            format!("DELETE FROM {}", st.table),
            using,
            st.render_where().unwrap_or_default(),
            st.render_returning(returning),
        ]);
        Ok(st.finish(sql))
    }
}

impl Statement for DeleteBuilder {
    fn kind(&self) -> StatementKind {
        self.state.kind
    }

    fn build(&self) -> OrmResult<BuiltQuery> {
        self.render(&self.state.returning)
    }
}

impl Returning for DeleteBuilder {
    fn build_returning(&self, columns: &[String]) -> OrmResult<BuiltQuery> {
        if columns.is_empty() {
            return self.build();
        }
        self.render(columns)
    }
}
