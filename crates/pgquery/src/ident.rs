//! Column quoting and SQL text helpers.
//!
//! Identifiers handled here always come from record metadata or literals in
//! calling code, never from end-user input.

use crate::param::{Param, ParamList};

/// Quote a (possibly dotted) column reference.
///
/// - `status` -> `"status"`
/// - `u.status` -> `"u"."status"`
/// - `u.created_at::date` -> `"u"."created_at"::date`
/// - `meta->>key` -> `"meta"->>key`
/// - anything containing a call, e.g. `lower(name)`, is left untouched
pub fn quote_column(column: &str) -> String {
    let (base, suffix) = if let Some(pos) = column.rfind("::") {
        // The base is everything before the first cast; the suffix is the last one.
        let first = column.find("::").unwrap_or(pos);
        (&column[..first], &column[pos..])
    } else if let Some(pos) = column.rfind("->>") {
        let first = column.find("->>").unwrap_or(pos);
        (&column[..first], &column[pos..])
    } else {
        (column, "")
    };

    let mut quoted = if base.contains('(') {
        base.to_string()
    } else {
        base.split('.')
            .map(|part| format!("\"{part}\""))
            .collect::<Vec<_>>()
            .join(".")
    };
    quoted.push_str(suffix);
    quoted
}

/// Alias of a select expression, lowercased and unquoted.
///
/// `u.id AS "userId"` -> `userid`; returns `None` when there is no alias.
pub fn extract_alias(column: &str) -> Option<String> {
    let lowered = column.to_lowercase();
    let mut parts = lowered.split(" as ");
    parts.next()?;
    let alias = parts.last()?;
    Some(alias.trim().trim_matches('"').to_string())
}

/// Replace each `?` in `expr`, left to right, with the next placeholder while
/// appending the paired argument. Surplus `?` marks are left as they are.
pub(crate) fn bind_question_marks(
    expr: &str,
    extra: &[Param],
    args: &mut ParamList,
    offset: usize,
) -> String {
    let mut out = expr.to_string();
    for arg in extra {
        let Some(pos) = out.find('?') else {
            break;
        };
        let placeholder = format!("${}", offset + args.len() + 1);
        out.replace_range(pos..pos + 1, &placeholder);
        args.push_param(arg.clone());
    }
    out
}

/// `[A-Za-z_][A-Za-z0-9_]*`, optionally followed by `[]` (array types) or a
/// parenthesised modifier list such as `numeric(10,2)`.
pub(crate) fn is_valid_type_name(s: &str) -> bool {
    let s = s.trim();
    let s = s.strip_suffix("[]").unwrap_or(s);
    let (name, modifier) = match s.find('(') {
        Some(pos) => (&s[..pos], Some(&s[pos..])),
        None => (s, None),
    };
    let valid_name = name
        .split(' ')
        .filter(|w| !w.is_empty())
        .all(is_valid_sql_ident)
        && !name.trim().is_empty();
    let valid_modifier = modifier.is_none_or(|m| {
        m.starts_with('(')
            && m.ends_with(')')
            && m[1..m.len() - 1]
                .split(',')
                .all(|d| !d.trim().is_empty() && d.trim().chars().all(|c| c.is_ascii_digit()))
    });
    valid_name && valid_modifier
}

pub(crate) fn is_valid_sql_ident(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
