//! Filter compiler.
//!
//! Turns [`Filter`] groups into SQL fragments, appending each bound value to
//! the statement's argument list in the same pass so fragment text and
//! argument order never drift apart.

use crate::builder::state::QueryState;
use crate::condition::{CondValue, Condition, Filter, SqlOp};
use crate::ident::{bind_question_marks, quote_column};
use crate::param::Param;

impl QueryState {
    /// Compile one AND-group into fragments (one per rendered condition).
    pub(crate) fn compile_and(&mut self, filter: &Filter) -> Vec<String> {
        filter
            .iter()
            .filter_map(|(column, cond)| self.compile_condition(column, cond))
            .collect()
    }

    /// Compile OR-combined AND-groups into `((a AND b) OR (c))`.
    ///
    /// Groups that render nothing are dropped; `None` when every group is empty.
    pub(crate) fn compile_or(&mut self, groups: &[Filter]) -> Option<String> {
        let rendered: Vec<String> = groups
            .iter()
            .filter_map(|group| {
                let parts = self.compile_and(group);
                (!parts.is_empty()).then(|| format!("({})", parts.join(" AND ")))
            })
            .collect();

        (!rendered.is_empty()).then(|| format!("({})", rendered.join(" OR ")))
    }

    fn compile_condition(&mut self, column: &str, cond: &Condition) -> Option<String> {
        if cond.value.is_null() && !cond.operator.is_null_check() {
            return None;
        }

        if cond.operator == SqlOp::Raw {
            let CondValue::Sql(sql) = &cond.value else {
                self.fail(format!("raw condition on '{column}' needs SQL text"));
                return None;
            };
            return Some(bind_question_marks(
                sql,
                &cond.extra_args,
                &mut self.args,
                self.placeholder_offset,
            ));
        }

        if cond.is_sub_query {
            let CondValue::Sql(sql) = &cond.value else {
                self.fail(format!("sub-query condition on '{column}' needs SQL text"));
                return None;
            };
            return Some(if column.is_empty() {
                format!("{} {sql}", cond.operator)
            } else {
                format!("{column} {} {sql}", cond.operator)
            });
        }

        match (&cond.key, cond.is_array) {
            (Some(key), true) => {
                let lhs = match cond.value.text_cast() {
                    Some(cast) => format!("(value ->> '{key}')::{cast}"),
                    None => format!("value ->> '{key}'"),
                };
                let clause = self.compile_operand(&lhs, column, cond)?;
                Some(format!(
                    "EXISTS (SELECT FROM jsonb_array_elements({}) WHERE {clause})",
                    quote_column(column)
                ))
            }
            _ => {
                let lhs = quote_column(column);
                self.compile_operand(&lhs, column, cond)
            }
        }
    }

    /// Render `lhs <op> rhs` for one condition. `column` is the raw key, bound
    /// as a value when the condition compares literals.
    fn compile_operand(&mut self, lhs: &str, column: &str, cond: &Condition) -> Option<String> {
        let op = cond.operator;

        if op.is_null_check() {
            return Some(format!("{lhs} {op}"));
        }

        match op {
            SqlOp::Between | SqlOp::NotBetween => self.compile_range(lhs, column, cond),
            SqlOp::In | SqlOp::NotIn | SqlOp::Any => Some(self.compile_set(lhs, cond)),
            _ => {
                let lhs = if cond.source_is_value {
                    self.bind(Param::new(column.to_string()))
                } else {
                    lhs.to_string()
                };
                let rhs = match &cond.value {
                    CondValue::Sql(expr) if cond.is_ref => expr.clone(),
                    CondValue::Sql(text) => self.bind(Param::new(text.clone())),
                    CondValue::One(param) => self.bind(param.clone()),
                    CondValue::Array { param, .. } => self.bind(param.clone()),
                    other => {
                        self.fail(format!("operator {op} on '{column}' does not accept {other:?}"));
                        return None;
                    }
                };
                Some(format!("{lhs} {op} {rhs}"))
            }
        }
    }

    fn compile_range(&mut self, lhs: &str, column: &str, cond: &Condition) -> Option<String> {
        let (from, to) = match &cond.value {
            CondValue::EpochRange(from, to) => (
                from.map(|ms| epoch_seconds(self, ms)),
                to.map(|ms| epoch_seconds(self, ms)),
            ),
            CondValue::Range(from, to) => (
                from.clone().map(|p| self.bind(p)),
                to.clone().map(|p| self.bind(p)),
            ),
            _ => {
                self.fail(format!("{} on '{column}' requires a two-bound range", cond.operator));
                return None;
            }
        };

        let negated = cond.operator == SqlOp::NotBetween;
        match (from, to) {
            (Some(from), Some(to)) => Some(format!("{lhs} {} {from} AND {to}", cond.operator)),
            (None, Some(to)) => Some(format!("{lhs} {} {to}", if negated { ">" } else { "<=" })),
            (Some(from), None) => Some(format!("{lhs} {} {from}", if negated { "<" } else { ">=" })),
            (None, None) => None,
        }
    }

    fn compile_set(&mut self, lhs: &str, cond: &Condition) -> String {
        let op = cond.operator;
        let empty = match &cond.value {
            CondValue::List(items) => items.is_empty(),
            CondValue::Array { len, .. } => *len == 0,
            _ => false,
        };
        if empty {
            return if op == SqlOp::NotIn { "TRUE" } else { "FALSE" }.to_string();
        }

        match &cond.value {
            CondValue::List(items) => {
                let placeholders: Vec<String> =
                    items.iter().map(|p| self.bind(p.clone())).collect();
                if op == SqlOp::Any {
                    format!("{lhs} = ANY(ARRAY[{}])", placeholders.join(", "))
                } else {
                    format!("{lhs} {op} ({})", placeholders.join(", "))
                }
            }
            CondValue::Array { param, .. } => {
                let placeholder = self.bind(param.clone());
                if op == SqlOp::NotIn {
                    format!("{lhs} != ALL({placeholder})")
                } else {
                    format!("{lhs} = ANY({placeholder})")
                }
            }
            CondValue::Sql(expr) if cond.is_ref => format!("{lhs} {op} ({expr})"),
            value => {
                let placeholder = match value {
                    CondValue::One(param) => self.bind(param.clone()),
                    CondValue::Sql(text) => self.bind(Param::new(text.clone())),
                    _ => self.bind(Param::null()),
                };
                if op == SqlOp::Any {
                    format!("{lhs} = ANY({placeholder})")
                } else {
                    format!("{lhs} {op} ({placeholder})")
                }
            }
        }
    }
}

/// Bind epoch milliseconds as whole seconds and wrap them in `to_timestamp`.
fn epoch_seconds(state: &mut QueryState, ms: i64) -> String {
    let placeholder = state.bind(Param::new((ms / 1000) as f64));
    format!("to_timestamp({placeholder})")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StatementKind;

    fn state() -> QueryState {
        QueryState::new(StatementKind::Select, "users")
    }

    #[test]
    fn skips_absent_values() {
        let mut st = state();
        let filter = Filter::new()
            .and("name", Condition::maybe::<String>(SqlOp::Eq, None))
            .and("deleted_at", Condition::is_null());
        assert_eq!(st.compile_and(&filter), vec![r#""deleted_at" IS NULL"#]);
        assert!(st.args.is_empty());
    }

    #[test]
    fn empty_sets_become_constants() {
        let mut st = state();
        let filter = Filter::new()
            .and("role", Condition::in_list(Vec::<i32>::new()))
            .and("kind", Condition::not_in(Vec::<i32>::new()))
            .and("tag", Condition::any(Vec::<String>::new()));
        assert_eq!(st.compile_and(&filter), vec!["FALSE", "TRUE", "FALSE"]);
        assert!(st.args.is_empty());
    }

    #[test]
    fn in_list_binds_each_element() {
        let mut st = state();
        let filter = Filter::new().and("u.role", Condition::in_list(vec![1_i32, 2, 3]));
        assert_eq!(st.compile_and(&filter), vec![r#""u"."role" IN ($1, $2, $3)"#]);
        assert_eq!(st.args.len(), 3);
    }

    #[test]
    fn any_binds_whole_array() {
        let mut st = state();
        let filter = Filter::new().and("tags", Condition::any(vec!["a".to_string()]));
        assert_eq!(st.compile_and(&filter), vec![r#""tags" = ANY($1)"#]);
        assert_eq!(st.args.len(), 1);
    }

    #[test]
    fn epoch_range_uses_to_timestamp() {
        let mut st = state();
        let filter = Filter::new()
            .and("created_at", Condition::epoch_between(Some(1_000), Some(5_999)))
            .and("updated_at", Condition::epoch_not_between(None, Some(2_000)));
        assert_eq!(
            st.compile_and(&filter),
            vec![
                r#""created_at" BETWEEN to_timestamp($1) AND to_timestamp($2)"#,
                r#""updated_at" > to_timestamp($3)"#,
            ]
        );
        assert_eq!(st.args.len(), 3);
    }

    #[test]
    fn one_sided_ranges() {
        let mut st = state();
        let filter = Filter::new()
            .and("age", Condition::range(SqlOp::Between, Some(18_i32), None))
            .and("score", Condition::range::<i32>(SqlOp::Between, None, None));
        assert_eq!(st.compile_and(&filter), vec![r#""age" >= $1"#]);
    }

    #[test]
    fn raw_condition_binds_question_marks() {
        let mut st = state();
        let filter = Filter::new().and(
            "custom",
            Condition::raw("age > ? OR status = 'x'", vec![Param::new(18_i32)]),
        );
        assert_eq!(st.compile_and(&filter), vec!["age > $1 OR status = 'x'"]);
        assert_eq!(st.args.len(), 1);
    }

    #[test]
    fn references_and_literal_sources() {
        let mut st = state();
        let filter = Filter::new()
            .and("u.id", Condition::column_ref(SqlOp::Eq, "o.user_id"))
            .and("'a'", Condition::eq("a").source_is_value());
        assert_eq!(
            st.compile_and(&filter),
            vec![r#""u"."id" = o.user_id"#, "$1 = $2"]
        );
        assert_eq!(st.args.len(), 2);
    }

    #[test]
    fn sub_query_is_inlined() {
        let mut st = state();
        let filter = Filter::new()
            .and("id", Condition::sub_query(SqlOp::In, "(SELECT user_id FROM orders)"))
            .and("", Condition::sub_query(SqlOp::Exists, "(SELECT 1)"));
        assert_eq!(
            st.compile_and(&filter),
            vec!["id IN (SELECT user_id FROM orders)", "EXISTS (SELECT 1)"]
        );
    }

    #[test]
    fn json_array_elements_match() {
        let mut st = state();
        let filter = Filter::new().and("items", Condition::eq("book").json_key("kind"));
        assert_eq!(
            st.compile_and(&filter),
            vec![
                r#"EXISTS (SELECT FROM jsonb_array_elements("items") WHERE value ->> 'kind' = $1)"#
            ]
        );
    }

    #[test]
    fn json_array_elements_cast_typed_values() {
        let mut st = state();
        let filter = Filter::new()
            .and("items", Condition::eq(5_i64).json_key("qty"))
            .and("flags", Condition::in_list(vec![1_i32, 2]).json_key("level"));
        assert_eq!(
            st.compile_and(&filter),
            vec![
                r#"EXISTS (SELECT FROM jsonb_array_elements("items") WHERE (value ->> 'qty')::int8 = $1)"#,
                r#"EXISTS (SELECT FROM jsonb_array_elements("flags") WHERE (value ->> 'level')::int4 IN ($2, $3))"#,
            ]
        );
        assert_eq!(st.args.len(), 3);
    }

    #[test]
    fn or_groups_skip_empty_groups() {
        let mut st = state();
        st.args.push(0_i32);
        let groups = vec![
            Filter::new().and("a", Condition::eq(1_i32)).and("b", Condition::eq(2_i32)),
            Filter::new().and("c", Condition::maybe::<i32>(SqlOp::Eq, None)),
            Filter::new().and("d", Condition::eq(3_i32)),
        ];
        assert_eq!(
            st.compile_or(&groups).as_deref(),
            Some(r#"(("a" = $2 AND "b" = $3) OR ("d" = $4))"#)
        );
        assert_eq!(st.compile_or(&[Filter::new()]), None);
    }

    #[test]
    fn placeholder_offset_applies() {
        let mut st = state();
        st.placeholder_offset = 5;
        let filter = Filter::new().and("a", Condition::eq(1_i32));
        assert_eq!(st.compile_and(&filter), vec![r#""a" = $6"#]);
    }
}
