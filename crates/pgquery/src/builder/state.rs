use super::{BuiltQuery, StatementKind};
use crate::cte;
use crate::param::{Param, ParamList};

/// Mutable accumulator shared by the four statement builders.
#[derive(Debug, Clone)]
pub(crate) struct QueryState {
    pub kind: StatementKind,
    /// Target table, optionally followed by an alias (`users u`).
    pub table: String,
    pub columns: Vec<String>,
    pub filters: Vec<String>,
    pub joins: Vec<String>,
    /// Rendered `name AS (sql)` definitions.
    pub ctes: Vec<String>,
    pub recursive: bool,
    pub group_by: Vec<String>,
    pub having: Vec<String>,
    pub order_by: Vec<String>,
    pub limit: i64,
    pub offset: i64,
    pub use_pagination: bool,
    pub returning: Vec<String>,
    pub args: ParamList,
    /// Added to every placeholder number this state renders.
    pub placeholder_offset: usize,
    /// First construction error; reported by `build()`.
    pub error: Option<String>,
}

impl QueryState {
    pub fn new(kind: StatementKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            columns: Vec::new(),
            filters: Vec::new(),
            joins: Vec::new(),
            ctes: Vec::new(),
            recursive: false,
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: 0,
            offset: 0,
            use_pagination: false,
            returning: Vec::new(),
            args: ParamList::new(),
            placeholder_offset: 0,
            error: None,
        }
    }

    /// Record a construction error; only the first one is kept.
    pub fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
    }

    /// Number the next placeholder would get.
    pub fn next_index(&self) -> usize {
        self.placeholder_offset + self.args.len() + 1
    }

    /// Append `param` and return its placeholder.
    pub fn bind(&mut self, param: Param) -> String {
        let placeholder = format!("${}", self.next_index());
        self.args.push_param(param);
        placeholder
    }

    /// Splice a built sub-query: renumber its placeholders to follow the
    /// current arguments and adopt its arguments.
    pub fn splice(&mut self, sub: &BuiltQuery) -> String {
        cte::splice(
            &sub.sql,
            sub.placeholder_offset,
            &sub.args,
            &mut self.args,
            self.placeholder_offset,
        )
    }

    pub fn add_cte(&mut self, name: &str, sub: &BuiltQuery, recursive: bool) {
        let sql = self.splice(sub);
        self.ctes.push(format!("{name} AS ({sql})"));
        self.recursive |= recursive;
    }

    /// Alias when one is given, otherwise the table name.
    pub fn table_prefix(&self) -> &str {
        self.table
            .split_whitespace()
            .last()
            .unwrap_or(self.table.as_str())
    }

    pub fn render_with(&self) -> Option<String> {
        if self.ctes.is_empty() {
            return None;
        }
        let keyword = if self.recursive {
            "WITH RECURSIVE"
        } else {
            "WITH"
        };
        Some(format!("{keyword} {}", self.ctes.join(", ")))
    }

    pub fn render_where(&self) -> Option<String> {
        (!self.filters.is_empty()).then(|| format!("WHERE {}", self.filters.join(" AND ")))
    }

    pub fn render_group_by(&self) -> Option<String> {
        (!self.group_by.is_empty()).then(|| format!("GROUP BY {}", self.group_by.join(", ")))
    }

    pub fn render_having(&self) -> Option<String> {
        (!self.having.is_empty()).then(|| format!("HAVING {}", self.having.join(" AND ")))
    }

    pub fn render_returning(&self, columns: &[String]) -> String {
        if columns.is_empty() {
            "RETURNING id".to_string()
        } else {
            format!("RETURNING {}", columns.join(","))
        }
    }

    pub fn finish(&self, sql: String) -> BuiltQuery {
        BuiltQuery {
            sql,
            args: self.args.clone(),
            placeholder_offset: self.placeholder_offset,
        }
    }
}

/// Join the non-empty parts with single spaces.
pub(crate) fn join_parts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for part in parts {
        let part = part.as_ref();
        if part.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(part);
    }
    out
}
