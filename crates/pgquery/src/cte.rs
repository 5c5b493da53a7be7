//! Placeholder shifting for sub-query composition.
//!
//! A sub-query is built on its own, so its placeholders start at `$1` (or
//! after its own `start_placeholder_from` offset). Before its text is spliced
//! into a parent (`WITH name AS (...)`, `LEFT JOIN LATERAL (...)`,
//! `UNION ALL`), every `$N` is renumbered to follow the parent's current
//! arguments, and the sub-query's arguments are appended to the parent's list.

use crate::param::ParamList;
use regex::{Captures, Regex};
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$(\d+)").expect("invalid built-in placeholder regex"))
}

/// Renumber every `$N` in `sql` to `$N + offset`.
///
/// Only `$`-prefixed digit runs are touched. The text is not tokenized, so a
/// `$N` inside a string literal is shifted as well.
pub fn shift_placeholders(sql: &str, offset: usize) -> String {
    rebase_placeholders(sql, 0, offset)
}

/// Renumber every `$N` above `from` to `$N - from + to`. Lower numbers refer
/// to slots owned by an enclosing statement and are left alone.
pub fn rebase_placeholders(sql: &str, from: usize, to: usize) -> String {
    if from == to {
        return sql.to_string();
    }
    placeholder_re()
        .replace_all(sql, |caps: &Captures<'_>| match caps[1].parse::<usize>() {
            Ok(n) if n > from => format!("${}", n - from + to),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// Renumber a sub-query whose placeholders start after `sub_offset` so they
/// follow the arguments already in `args`, then append `sub_args`.
pub(crate) fn splice(
    sql: &str,
    sub_offset: usize,
    sub_args: &ParamList,
    args: &mut ParamList,
    offset: usize,
) -> String {
    let rebased = rebase_placeholders(sql, sub_offset, offset + args.len());
    args.extend(sub_args);
    rebased
}

/// Highest placeholder number used in `sql` (0 when there is none).
pub fn max_placeholder(sql: &str) -> usize {
    placeholder_re()
        .captures_iter(sql)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .max()
        .unwrap_or(0)
}
