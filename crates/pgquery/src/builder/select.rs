use super::state::{QueryState, join_parts};
use super::{BuiltQuery, Statement, StatementKind};
use crate::condition::Filter;
use crate::error::{OrmError, OrmResult};
use crate::ident::{bind_question_marks, extract_alias};
use crate::meta::select_columns;
use crate::pagination::{Pagination, PaginationParts, fused_query};
use crate::param::Param;
use crate::record::Record;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Sub-select aggregating one expression into an array.
#[derive(Debug, Clone, Default)]
pub struct ArrayAggConfig {
    pub expr: String,
    pub sort_by: String,
    /// `> 0` ascending, `< 0` descending, `0` unordered.
    pub sort_order: i32,
}

/// Structured SELECT builder.
///
/// ```ignore
/// let mut q = SelectBuilder::new("users");
/// q.select(["id", "name"])
///     .where_and([("status", Condition::eq("active"))]);
/// let built = q.build()?;
/// assert_eq!(built.sql, r#"SELECT id,name FROM users WHERE "status" = $1"#);
/// ```
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    pub(crate) state: QueryState,
    distinct_alias: String,
    distinct_by: Vec<String>,
    unions: Vec<String>,
    pub(crate) nested_aggregation: Vec<String>,
    pub(crate) wrap_aggregation: bool,
}

impl SelectBuilder {
    /// Select from `table` with no default columns (`*` when none are added).
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            state: QueryState::new(StatementKind::Select, table),
            distinct_alias: String::new(),
            distinct_by: Vec::new(),
            unions: Vec::new(),
            nested_aggregation: Vec::new(),
            wrap_aggregation: false,
        }
    }

    /// Select from `table alias`.
    pub fn aliased(table: &str, alias: &str) -> Self {
        Self::new(format!("{table} {}", alias.trim()))
    }

    /// Select the default projection of `T` from `table`.
    pub fn for_record<T: Record>(table: impl Into<String>) -> Self {
        let mut builder = Self::new(table);
        builder.state.columns = select_columns::<T>().to_vec();
        builder
    }

    /// `SELECT COUNT(*) FROM table`.
    pub fn count(table: impl Into<String>) -> Self {
        let mut builder = Self::new(table);
        builder.state.columns = vec!["COUNT(*)".to_string()];
        builder
    }

    /// Add an AND-group to WHERE.
    pub fn where_and(&mut self, filter: impl Into<Filter>) -> &mut Self {
        let parts = self.state.compile_and(&filter.into());
        self.state.filters.extend(parts);
        self
    }

    /// Add OR-combined AND-groups to WHERE as one parenthesized fragment.
    pub fn where_or(&mut self, groups: impl IntoIterator<Item = Filter>) -> &mut Self {
        let groups: Vec<Filter> = groups.into_iter().collect();
        if let Some(fragment) = self.state.compile_or(&groups) {
            self.state.filters.push(fragment);
        }
        self
    }

    /// Highest placeholder number taken so far; a hand-written placeholder
    /// for the next argument is `$current_arg_index + 1`.
    pub fn current_arg_index(&self) -> usize {
        self.state.next_index() - 1
    }

    /// Append arguments for placeholders written by hand into select
    /// expressions. Use [`current_arg_index`](Self::current_arg_index) to
    /// compute their numbers.
    pub fn add_args(&mut self, args: impl IntoIterator<Item = Param>) -> &mut Self {
        self.state.args.extend_params(args);
        self
    }

    /// Number the next placeholder `$index` instead of `$1`.
    ///
    /// For sub-queries whose text is spliced by hand into a parent that
    /// already holds `index - 1` arguments; the built argument list contains
    /// only this builder's own values, to be appended after the parent's.
    /// Call it before anything is bound. Splicing the builder through
    /// [`with_cte`](Self::with_cte), a lateral join or `union_all` renumbers
    /// it to follow the receiving builder's arguments.
    pub fn start_placeholder_from(&mut self, index: usize) -> &mut Self {
        self.state.placeholder_offset = index.saturating_sub(1);
        self
    }

    /// Case-insensitive substring search across `fields`, OR-combined.
    ///
    /// A field with an `:array` suffix is searched element-wise.
    pub fn search(&mut self, keyword: &str, fields: &[&str]) -> &mut Self {
        if keyword.is_empty() || fields.is_empty() {
            return self;
        }
        let pattern = format!("%{keyword}%");
        let clauses: Vec<String> = fields
            .iter()
            .map(|field| {
                let placeholder = self.state.bind(Param::new(pattern.clone()));
                match field.strip_suffix(":array") {
                    Some(column) => format!(
                        "EXISTS (SELECT 1 FROM unnest({column}) as val WHERE val ILIKE {placeholder})"
                    ),
                    None => format!("{field} ILIKE {placeholder}"),
                }
            })
            .collect();
        self.state.filters.push(format!("({})", clauses.join(" OR ")));
        self
    }

    /// `DISTINCT ON (columns...) alias`, rendered as the first select item.
    pub fn distinct<I, S>(&mut self, alias: impl Into<String>, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.distinct_alias = alias.into();
        for column in columns {
            upsert_by_alias(&mut self.distinct_by, column.into());
        }
        self
    }

    pub fn clear_selects(&mut self) -> &mut Self {
        self.state.columns.clear();
        self
    }

    /// Add select items. An item whose alias is already selected replaces
    /// the earlier one in place.
    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            self.put_column(column.into());
        }
        self
    }

    pub(crate) fn put_column(&mut self, column: String) {
        upsert_by_alias(&mut self.state.columns, column);
    }

    /// `bool_and(expr) AS "alias"`; `?` marks in `expr` bind `args`.
    pub fn select_bool_and(&mut self, expr: &str, alias: &str, args: Vec<Param>) -> &mut Self {
        self.select_bool("bool_and", expr, alias, args)
    }

    /// `bool_or(expr) AS "alias"`; `?` marks in `expr` bind `args`.
    pub fn select_bool_or(&mut self, expr: &str, alias: &str, args: Vec<Param>) -> &mut Self {
        self.select_bool("bool_or", expr, alias, args)
    }

    fn select_bool(&mut self, func: &str, expr: &str, alias: &str, args: Vec<Param>) -> &mut Self {
        let expr = self.bind_expr(expr, args);
        self.put_column(format!("{func}({expr}) AS \"{alias}\""));
        self
    }

    /// `(SELECT array_agg(expr [ORDER BY ...]) FROM source) AS "alias"`.
    pub fn select_array_aggregation(
        &mut self,
        alias: &str,
        source: &str,
        config: ArrayAggConfig,
    ) -> &mut Self {
        if config.expr.is_empty() {
            self.state.fail("expression should not empty");
            return self;
        }
        let order_by = if !config.sort_by.is_empty() && config.sort_order != 0 {
            let direction = if config.sort_order < 0 { "DESC" } else { "ASC" };
            format!(" ORDER BY {} {direction}", config.sort_by)
        } else {
            String::new()
        };
        let source = if source.is_empty() {
            String::new()
        } else {
            format!(" FROM {source}")
        };
        self.put_column(format!(
            "(SELECT array_agg({}{order_by}){source}) AS \"{alias}\"",
            config.expr
        ));
        self
    }

    /// `CASE WHEN when THEN then ELSE else END AS "alias"`; `?` marks in
    /// `when` bind `args`.
    pub fn select_case_when(
        &mut self,
        then_expr: &str,
        else_expr: &str,
        alias: &str,
        when: &str,
        args: Vec<Param>,
    ) -> &mut Self {
        let when = self.bind_expr(when, args);
        self.put_column(format!(
            "CASE WHEN {when} THEN {then_expr} ELSE {else_expr} END AS \"{alias}\""
        ));
        self
    }

    fn bind_expr(&mut self, expr: &str, args: Vec<Param>) -> String {
        let offset = self.state.placeholder_offset;
        bind_question_marks(expr, &args, &mut self.state.args, offset)
    }

    /// `JOIN table ON on`.
    pub fn join(&mut self, table: &str, on: &str) -> &mut Self {
        self.add_join("JOIN", table, on, None)
    }

    /// `JOIN table ON on AND <filter...>`.
    pub fn join_with(&mut self, table: &str, on: &str, filter: impl Into<Filter>) -> &mut Self {
        self.add_join("JOIN", table, on, Some(filter.into()))
    }

    /// `LEFT JOIN table ON on`.
    pub fn left_join(&mut self, table: &str, on: &str) -> &mut Self {
        self.add_join("LEFT JOIN", table, on, None)
    }

    /// `LEFT JOIN table ON on AND <filter...>`.
    pub fn left_join_with(&mut self, table: &str, on: &str, filter: impl Into<Filter>) -> &mut Self {
        self.add_join("LEFT JOIN", table, on, Some(filter.into()))
    }

    fn add_join(&mut self, keyword: &str, table: &str, on: &str, filter: Option<Filter>) -> &mut Self {
        if table.is_empty() {
            return self;
        }
        let extra = self.join_filter(filter);
        self.state.joins.push(format!("{keyword} {table} ON {on}{extra}"));
        self
    }

    fn join_filter(&mut self, filter: Option<Filter>) -> String {
        filter
            .map(|f| self.state.compile_and(&f))
            .unwrap_or_default()
            .iter()
            .map(|part| format!(" AND {part}"))
            .collect()
    }

    /// `LEFT JOIN LATERAL (<sub>) name ON on [AND <filter...>]`, with the
    /// sub-query's placeholders shifted past the current arguments.
    pub fn left_join_lateral<S: Statement>(
        &mut self,
        name: &str,
        sub: &S,
        on: &str,
        filter: Option<Filter>,
    ) -> &mut Self {
        let built = match sub.build() {
            Ok(built) => built,
            Err(err) => {
                self.state.fail(err.to_string());
                return self;
            }
        };
        let sql = self.state.splice(&built);
        let extra = self.join_filter(filter);
        self.state
            .joins
            .push(format!("LEFT JOIN LATERAL ({sql}) {name} ON {on}{extra}"));
        self
    }

    pub fn group_by<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Add an AND-group to HAVING. Requires at least one GROUP BY column at
    /// build time.
    pub fn having(&mut self, filter: impl Into<Filter>) -> &mut Self {
        let parts = self.state.compile_and(&filter.into());
        self.state.having.extend(parts);
        self
    }

    /// Queue `cols ASC NULLS FIRST` or `cols DESC NULLS LAST`.
    ///
    /// Sort keys matching a selected alias are rewritten to the aliased
    /// expression when the statement is built.
    pub fn order_by<I, S>(&mut self, columns: I, asc: bool) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let rule = if asc {
            "ASC NULLS FIRST"
        } else {
            "DESC NULLS LAST"
        };
        self.state.order_by.push(format!("{} {rule}", columns.join(", ")));
        self
    }

    /// Switch to the fused pagination statement for `page`.
    pub fn paginate(&mut self, page: &Pagination) -> &mut Self {
        self.state.use_pagination = true;
        self.state.limit = page.limit;
        self.state.offset = page.offset();

        if !page.sort_by.is_empty() && page.sort_order != 0 {
            self.order_by([page.sort_by.as_str()], page.sort_order > 0);
        } else if !page.multi_sort.is_empty() {
            self.state.order_by.clear();
            for sort in &page.multi_sort {
                self.order_by([sort.sort_by.as_str()], sort.sort_order > 0);
            }
        } else if !page.default_sort.is_empty() {
            self.state.order_by.clear();
            for sort in &page.default_sort {
                self.order_by([sort.sort_by.as_str()], sort.sort_order > 0);
            }
        }
        self
    }

    /// Plain `LIMIT n` without pagination.
    pub fn set_limit(&mut self, limit: i64) -> &mut Self {
        self.state.limit = limit;
        self.state.offset = 0;
        self
    }

    /// Plain `OFFSET n` without pagination.
    pub fn set_offset(&mut self, offset: i64) -> &mut Self {
        self.state.offset = offset;
        self
    }

    /// Attach `name AS (<sub>)` to the WITH clause.
    pub fn with_cte<S: Statement>(&mut self, name: &str, sub: &S) -> &mut Self {
        self.attach_cte(name, sub, false)
    }

    /// Attach `name AS (<sub>)` and render the clause as `WITH RECURSIVE`.
    pub fn with_recursive_cte<S: Statement>(&mut self, name: &str, sub: &S) -> &mut Self {
        self.attach_cte(name, sub, true)
    }

    fn attach_cte<S: Statement>(&mut self, name: &str, sub: &S, recursive: bool) -> &mut Self {
        match sub.build() {
            Ok(built) => self.state.add_cte(name, &built, recursive),
            Err(err) => self.state.fail(err.to_string()),
        }
        self
    }

    /// Replace the `SELECT ... FROM table` head with `sub1 UNION ALL sub2 ...`.
    pub fn union_all<'a, I>(&mut self, subs: I) -> &mut Self
    where
        I: IntoIterator<Item = &'a SelectBuilder>,
    {
        for sub in subs {
            match sub.build() {
                Ok(built) => {
                    let sql = self.state.splice(&built);
                    self.unions.push(sql);
                }
                Err(err) => {
                    self.state.fail(err.to_string());
                    break;
                }
            }
        }
        self
    }

    fn projection(&self) -> Vec<String> {
        let mut columns = if self.state.columns.is_empty() {
            vec!["*".to_string()]
        } else {
            self.state.columns.clone()
        };
        if !self.distinct_by.is_empty() {
            columns.insert(
                0,
                format!(
                    "DISTINCT ON ({}) {}",
                    self.distinct_by.join(","),
                    self.distinct_alias
                ),
            );
        }
        columns
    }

    fn render_order_by(&self) -> Option<String> {
        if self.state.order_by.is_empty() {
            return None;
        }

        let mut alias_to_expr: HashMap<String, String> = HashMap::new();
        for column in &self.state.columns {
            let column = column.trim();
            let mut parts = as_split_re().splitn(column, 2);
            match (parts.next(), parts.next()) {
                (Some(expr), Some(alias)) => {
                    alias_to_expr.insert(clean(alias).to_lowercase(), expr.trim().to_string());
                }
                _ => {
                    let ident = clean(column);
                    alias_to_expr.insert(ident.to_lowercase(), ident.to_string());
                }
            }
        }

        let rules: Vec<String> = self
            .state
            .order_by
            .iter()
            .map(|rule| {
                let rule = rule.trim();
                let (key, direction) = match direction_re().find(rule) {
                    Some(m) => (&rule[..m.start()], Some(m.as_str().trim())),
                    None => (rule, None),
                };
                let key = key.trim();
                let expr = alias_to_expr
                    .get(&clean(key).to_lowercase())
                    .map(String::as_str)
                    .unwrap_or(key);
                match direction {
                    Some(direction) => format!("{expr} {direction}"),
                    None => expr.to_string(),
                }
            })
            .collect();

        Some(format!("ORDER BY {}", rules.join(", ")))
    }
}

impl Statement for SelectBuilder {
    fn kind(&self) -> StatementKind {
        self.state.kind
    }

    fn build(&self) -> OrmResult<BuiltQuery> {
        let st = &self.state;
        if let Some(err) = &st.error {
            return Err(OrmError::build(err.clone()));
        }
        if !st.having.is_empty() && st.group_by.is_empty() {
            return Err(OrmError::build(
                "HAVING clauses only allowed if GROUP BY clause is exists",
            ));
        }

        let head = if self.unions.is_empty() {
            format!("SELECT {} FROM {}", self.projection().join(","), st.table)
        } else {
            self.unions.join(" UNION ALL ")
        };
        let joins = st.joins.join(" ");
        let where_clause = st.render_where().unwrap_or_default();
        let group = st.render_group_by().unwrap_or_default();
        let having = st.render_having().unwrap_or_default();
        let order = self.render_order_by().unwrap_or_default();

        if st.use_pagination {
            let prefix = st.table_prefix();
            let rejoin = format!("JOIN paginated_ids ON paginated_ids.id = {prefix}.id");
            let source = format!("SELECT {prefix}.id as id from {}", st.table);
            let main = join_parts([
                head.as_str(),
                joins.as_str(),
                rejoin.as_str(),
                group.as_str(),
                having.as_str(),
                order.as_str(),
            ]);
            let filtered = join_parts([
                source.as_str(),
                joins.as_str(),
                where_clause.as_str(),
                group.as_str(),
                having.as_str(),
                order.as_str(),
            ]);
            let paginated = if st.limit > 0 {
                format!(
                    "SELECT id as id from filtered_ids LIMIT {} OFFSET {}",
                    st.limit, st.offset
                )
            } else {
                format!("SELECT id as id from filtered_ids OFFSET {}", st.offset)
            };
            let sql = fused_query(PaginationParts {
                ctes: &st.ctes,
                recursive: st.recursive,
                main,
                filtered,
                paginated,
                count: "SELECT COUNT(id) from filtered_ids".to_string(),
            });
            return Ok(st.finish(sql));
        }

        let limit = (st.limit > 0)
            .then(|| format!("LIMIT {}", st.limit))
            .unwrap_or_default();
        let offset = (st.offset > 0)
            .then(|| format!("OFFSET {}", st.offset))
            .unwrap_or_default();
        let with = st.render_with().unwrap_or_default();

        let sql = join_parts([
            with.as_str(),
            head.as_str(),
            joins.as_str(),
            where_clause.as_str(),
            group.as_str(),
            having.as_str(),
            order.as_str(),
            limit.as_str(),
            offset.as_str(),
        ]);
        Ok(st.finish(sql))
    }
}

/// Replace the item with the same alias, or append.
fn upsert_by_alias(columns: &mut Vec<String>, column: String) {
    if let Some(alias) = extract_alias(&column) {
        if let Some(existing) = columns
            .iter_mut()
            .find(|existing| extract_alias(existing).as_deref() == Some(alias.as_str()))
        {
            *existing = column;
            return;
        }
    }
    columns.push(column);
}

fn as_split_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s+AS\s+").expect("invalid built-in alias regex"))
}

fn direction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\s+(ASC|DESC)(\s+NULLS\s+(FIRST|LAST))?\s*$")
            .expect("invalid built-in sort direction regex")
    })
}

/// Trim spaces, a trailing comma and surrounding double quotes.
fn clean(s: &str) -> &str {
    let s = s.trim();
    let s = s.strip_suffix(',').unwrap_or(s);
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}
