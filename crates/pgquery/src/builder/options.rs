//! Label/value option lists projected through a CTE.

use super::select::SelectBuilder;
use crate::ident::quote_column;
use crate::pagination::Sort;
use crate::text::camel_to_snake;

/// Ordering override for [`SelectBuilder::generate_cte_option`].
pub type CustomSort = Sort;

impl SelectBuilder {
    /// Project a `[{label, value}]` option list named `alias` from `source`.
    ///
    /// `source` is reduced to `DISTINCT ON (value) value, key, ref.id` and
    /// attached as a CTE named after `alias` in snake case; this builder
    /// left-joins it on `id` and selects
    /// `COALESCE(jsonb_agg(...) FILTER (...), '[]'::jsonb) AS "alias"`.
    /// With `enabled == false` only `'[]'::jsonb AS "alias"` is selected.
    #[allow(clippy::too_many_arguments)]
    pub fn generate_cte_option(
        &mut self,
        mut source: SelectBuilder,
        alias: &str,
        ref_table: &str,
        enabled: bool,
        label_key: &str,
        label_value: &str,
        custom_sort: Option<&CustomSort>,
    ) -> &mut Self {
        if !enabled {
            return self.select([format!("'[]'::jsonb AS \"{alias}\"")]);
        }

        let label_key = quote_column(label_key);
        let label_value = quote_column(label_value);
        let cte = camel_to_snake(alias);

        source
            .clear_selects()
            .distinct(format!("{label_value} AS \"value\""), [label_value.as_str()])
            .select([
                format!("{label_key} AS \"key\""),
                format!("\"{ref_table}\".\"id\" AS \"id\""),
            ]);

        self.with_cte(&cte, &source);
        self.left_join(&cte, &format!("\"{cte}\".\"id\" = \"{ref_table}\".\"id\""));

        let order = match custom_sort {
            Some(sort) => format!("{} ASC", sort.sort_by),
            None => format!("\"{cte}\".\"key\" ASC"),
        };
        self.select([format!(
            "COALESCE(jsonb_agg(jsonb_build_object('label', \"{cte}\".\"key\", 'value', \"{cte}\".\"value\") ORDER BY {order}) FILTER (WHERE \"{cte}\".\"value\" IS NOT NULL AND \"{cte}\".\"value\" != '' AND \"{cte}\".\"key\" != ''), '[]'::jsonb) AS \"{alias}\""
        )])
    }
}
