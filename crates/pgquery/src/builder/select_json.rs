//! JSON projection helpers for [`SelectBuilder`].
//!
//! These project nested one-to-one or one-to-many relations as
//! `jsonb_build_object` / `jsonb_agg` expressions. Keys are emitted in sorted
//! order so the generated text is stable.

use super::select::SelectBuilder;
use crate::meta::json_column_map;
use crate::param::Param;
use crate::record::Record;
use std::collections::BTreeMap;

/// Public key -> SQL expression, sorted by key.
#[derive(Debug, Clone, Default)]
pub struct JsonFields(BTreeMap<String, String>);

impl JsonFields {
    /// Keys and expressions from the column tags of `T`.
    pub fn of<T: Record>() -> Self {
        Self(
            json_column_map::<T>()
                .into_iter()
                .map(|(key, column)| (key.to_string(), column.to_string()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn pairs(&self) -> String {
        self.0
            .iter()
            .map(|(key, expr)| format!("'{key}', {expr}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for JsonFields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for JsonFields {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl From<BTreeMap<String, String>> for JsonFields {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Modifiers shared by the JSON aggregation helpers.
#[derive(Debug, Clone, Default)]
pub struct JsonAggOptions {
    /// `FILTER (WHERE ...)` in array mode, `CASE WHEN ... ELSE NULL` otherwise.
    pub condition: Option<String>,
    /// Aggregate rows with `jsonb_agg` instead of building one object.
    pub as_array: bool,
    /// `ORDER BY` inside `jsonb_agg`; ignored outside array mode.
    pub order_by: Option<String>,
}

impl JsonAggOptions {
    pub fn object() -> Self {
        Self::default()
    }

    pub fn array() -> Self {
        Self {
            as_array: true,
            ..Self::default()
        }
    }

    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }
}

impl SelectBuilder {
    /// `jsonb_array_elements($n::jsonb) AS "alias"` over `elements`, bound as
    /// one JSON argument. `alias` defaults to `array_elements`.
    pub fn select_json_array_elements(
        &mut self,
        alias: &str,
        elements: &[BTreeMap<String, String>],
    ) -> &mut Self {
        let alias = if alias.is_empty() {
            "array_elements"
        } else {
            alias
        };
        let value = match serde_json::to_value(elements) {
            Ok(value) => value,
            Err(err) => {
                self.state
                    .fail(format!("select_json_array_elements marshal error: {err}"));
                return self;
            }
        };
        let placeholder = self.state.bind(Param::new(value));
        self.state.columns.push(format!(
            "jsonb_array_elements({placeholder}::jsonb) AS \"{alias}\""
        ));
        self
    }

    /// Project `fields` as one JSON object, or as an array of objects in
    /// array mode.
    pub fn select_json_aggregate(
        &mut self,
        alias: &str,
        fields: impl Into<JsonFields>,
        options: JsonAggOptions,
    ) -> &mut Self {
        self.push_json(alias, &fields.into(), &options, false, None)
    }

    /// Like [`select_json_aggregate`](Self::select_json_aggregate), wrapped
    /// in `COALESCE(<expr>,<fallback>)`.
    pub fn select_json_coalesce(
        &mut self,
        alias: &str,
        fields: impl Into<JsonFields>,
        fallback: &str,
        options: JsonAggOptions,
    ) -> &mut Self {
        self.push_json(alias, &fields.into(), &options, false, Some(fallback))
    }

    /// Like [`select_json_aggregate`](Self::select_json_aggregate) with
    /// `jsonb_agg(DISTINCT ...)` in array mode.
    pub fn select_json_distinct(
        &mut self,
        alias: &str,
        fields: impl Into<JsonFields>,
        options: JsonAggOptions,
    ) -> &mut Self {
        self.push_json(alias, &fields.into(), &options, true, None)
    }

    /// Collect the object-mode projections added inside `f` into one
    /// `jsonb_build_object('alias1', ..., 'alias2', ...) AS "alias"` column.
    /// `alias` defaults to `json_result`.
    pub fn select_json_aggregate_func(
        &mut self,
        alias: &str,
        f: impl FnOnce(&mut SelectBuilder),
    ) -> &mut Self {
        let alias = if alias.is_empty() { "json_result" } else { alias };

        self.wrap_aggregation = true;
        f(self);
        self.wrap_aggregation = false;

        let nested = std::mem::take(&mut self.nested_aggregation);
        self.state.columns.push(format!(
            "jsonb_build_object({}) AS \"{alias}\"",
            nested.join(", ")
        ));
        self
    }

    fn push_json(
        &mut self,
        alias: &str,
        fields: &JsonFields,
        options: &JsonAggOptions,
        distinct: bool,
        fallback: Option<&str>,
    ) -> &mut Self {
        if fields.is_empty() {
            return self;
        }

        let object = format!("jsonb_build_object({})", fields.pairs());
        let mut expr = if options.as_array {
            let distinct = if distinct { "DISTINCT " } else { "" };
            let order_by = options
                .order_by
                .as_ref()
                .map(|o| format!(" ORDER BY {o}"))
                .unwrap_or_default();
            let mut agg = format!("jsonb_agg({distinct}{object}{order_by})");
            if let Some(condition) = &options.condition {
                agg = format!("{agg} FILTER (WHERE {condition})");
            }
            agg
        } else {
            match &options.condition {
                Some(condition) => format!("CASE WHEN {condition} THEN {object} ELSE NULL END"),
                None => object,
            }
        };
        if let Some(fallback) = fallback {
            expr = format!("COALESCE({expr},{fallback})");
        }

        if self.wrap_aggregation && !options.as_array {
            self.nested_aggregation.push(format!("'{alias}', {expr}"));
        } else {
            self.state.columns.push(format!("{expr} AS \"{alias}\""));
        }
        self
    }
}
