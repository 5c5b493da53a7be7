//! Page requests and the fused pagination statement.
//!
//! In pagination mode a select is rewritten into four CTEs evaluated in one
//! round trip:
//!
//! - `filtered_ids`: ids passing WHERE/JOIN/GROUP/HAVING, in sort order
//! - `paginated_ids`: the LIMIT/OFFSET slice of `filtered_ids`
//! - `total_query`: the row count of `filtered_ids`
//! - `data_query`: the full projection joined back to `paginated_ids`
//!
//! The statement returns exactly one row: `data` (a JSONB array) and
//! `totalRecords`.

use serde::{Deserialize, Serialize};

/// One sort rule. `sort_order > 0` is ascending, `< 0` descending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    pub sort_by: String,
    pub sort_order: i32,
}

impl Sort {
    pub fn asc(sort_by: impl Into<String>) -> Self {
        Self {
            sort_by: sort_by.into(),
            sort_order: 1,
        }
    }

    pub fn desc(sort_by: impl Into<String>) -> Self {
        Self {
            sort_by: sort_by.into(),
            sort_order: -1,
        }
    }
}

/// A page request. Pages are 1-based; non-positive pages mean the first page.
///
/// Sort precedence: `sort_by`/`sort_order` (appended to queued rules), then
/// `multi_sort` (replaces queued rules), then `default_sort` (replaces queued
/// rules, used only when nothing else is given).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub sort_by: String,
    pub sort_order: i32,
    pub multi_sort: Vec<Sort>,
    pub default_sort: Vec<Sort>,
}

impl Pagination {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page,
            limit,
            ..Self::default()
        }
    }

    pub fn sort(mut self, sort_by: impl Into<String>, sort_order: i32) -> Self {
        self.sort_by = sort_by.into();
        self.sort_order = sort_order;
        self
    }

    pub fn multi_sort(mut self, sorts: Vec<Sort>) -> Self {
        self.multi_sort = sorts;
        self
    }

    pub fn default_sort(mut self, sorts: Vec<Sort>) -> Self {
        self.default_sort = sorts;
        self
    }

    /// Zero-based row offset of the requested page.
    pub fn offset(&self) -> i64 {
        (self.page - 1).max(0) * self.limit
    }
}

/// Decoded result of a fused pagination statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult<T> {
    pub total_records: i64,
    pub data: Vec<T>,
}

impl<T> Default for PaginationResult<T> {
    fn default() -> Self {
        Self {
            total_records: 0,
            data: Vec::new(),
        }
    }
}

/// Pieces of a select rendered for pagination mode.
pub(crate) struct PaginationParts<'a> {
    /// Existing CTE definitions (without the `WITH` keyword).
    pub ctes: &'a [String],
    pub recursive: bool,
    pub main: String,
    pub filtered: String,
    pub paginated: String,
    pub count: String,
}

/// Assemble the fused statement.
pub(crate) fn fused_query(parts: PaginationParts<'_>) -> String {
    let keyword = if parts.recursive {
        "WITH RECURSIVE"
    } else {
        "WITH"
    };
    let mut ctes: Vec<String> = parts.ctes.to_vec();
    ctes.push(format!("filtered_ids AS ({})", parts.filtered));
    ctes.push(format!("paginated_ids AS ({})", parts.paginated));
    ctes.push(format!("total_query AS ({})", parts.count));
    ctes.push(format!("data_query AS ({})", parts.main));

    format!(
        "{keyword} {} SELECT COALESCE((SELECT jsonb_agg(data_query) FROM data_query), '[]') AS data, (SELECT COUNT FROM total_query) AS totalRecords",
        ctes.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_zero_based() {
        assert_eq!(Pagination::new(1, 10).offset(), 0);
        assert_eq!(Pagination::new(3, 10).offset(), 20);
        assert_eq!(Pagination::new(0, 10).offset(), 0);
        assert_eq!(Pagination::new(-4, 10).offset(), 0);
    }

    #[test]
    fn deserializes_request_shape() {
        let raw = r#"{"page":2,"limit":5,"sortBy":"name","sortOrder":-1,"multiSort":[{"sortBy":"a","sortOrder":1}]}"#;
        let p: Pagination = serde_json::from_str(raw).unwrap();
        assert_eq!(p.page, 2);
        assert_eq!(p.sort_by, "name");
        assert_eq!(p.multi_sort, vec![Sort::asc("a")]);
        assert!(p.default_sort.is_empty());
    }

    #[test]
    fn fused_query_chains_ctes() {
        let existing = vec!["a AS (SELECT 1)".to_string()];
        let sql = fused_query(PaginationParts {
            ctes: &existing,
            recursive: false,
            main: "SELECT * FROM t JOIN paginated_ids ON paginated_ids.id = t.id".into(),
            filtered: "SELECT t.id as id from t".into(),
            paginated: "SELECT id as id from filtered_ids LIMIT 10 OFFSET 0".into(),
            count: "SELECT COUNT(id) from filtered_ids".into(),
        });
        assert!(sql.starts_with("WITH a AS (SELECT 1), filtered_ids AS (SELECT t.id as id from t), paginated_ids AS ("));
        assert!(sql.ends_with("AS data, (SELECT COUNT FROM total_query) AS totalRecords"));
    }
}
