//! Attribute parsing for the Record derive macro.

use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use syn::{DeriveInput, Result};

/// Struct-level `rename_all` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(super) enum RenameRule {
    #[default]
    None,
    Camel,
    Snake,
    Pascal,
}

impl RenameRule {
    pub(super) fn apply(self, name: &str) -> String {
        match self {
            RenameRule::None => name.to_string(),
            RenameRule::Camel => name.to_lower_camel_case(),
            RenameRule::Snake => name.to_snake_case(),
            RenameRule::Pascal => name.to_upper_camel_case(),
        }
    }
}

/// Parse `#[record(rename_all = "...")]` on the struct.
pub(super) fn get_rename_rule(input: &DeriveInput) -> Result<RenameRule> {
    let mut rule = RenameRule::None;
    for attr in &input.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }
        let nested = attr.parse_args::<syn::MetaNameValue>()?;
        if !nested.path.is_ident("rename_all") {
            return Err(syn::Error::new_spanned(
                &nested.path,
                "unknown struct attribute, expected `rename_all`",
            ));
        }
        let syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(lit),
            ..
        }) = &nested.value
        else {
            return Err(syn::Error::new_spanned(&nested.value, "expected a string"));
        };
        rule = match lit.value().as_str() {
            "camelCase" => RenameRule::Camel,
            "snake_case" => RenameRule::Snake,
            "PascalCase" => RenameRule::Pascal,
            other => {
                return Err(syn::Error::new_spanned(
                    lit,
                    format!("unsupported rename_all rule `{other}`"),
                ));
            }
        };
    }
    Ok(rule)
}

/// Field-level `#[record(...)]` options.
#[derive(Default)]
pub(super) struct FieldAttrs {
    pub json: Option<String>,
    pub skip: bool,
    pub column: Option<String>,
    pub special: Option<String>,
    pub transform: Option<String>,
    pub nested: bool,
}

impl FieldAttrs {
    pub(super) fn is_generated(&self) -> bool {
        self.special
            .as_deref()
            .is_some_and(|s| s.contains("generated"))
    }
}

impl syn::parse::Parse for FieldAttrs {
    fn parse(input: syn::parse::ParseStream) -> Result<Self> {
        let mut attrs = FieldAttrs::default();

        loop {
            if input.is_empty() {
                break;
            }

            let ident: syn::Ident = input.parse()?;
            let key = ident.to_string();

            if input.peek(syn::Token![=]) {
                let _: syn::Token![=] = input.parse()?;
                let value: syn::LitStr = input.parse()?;
                let slot = match key.as_str() {
                    "json" => &mut attrs.json,
                    "column" => &mut attrs.column,
                    "special" => &mut attrs.special,
                    "transform" => &mut attrs.transform,
                    _ => {
                        return Err(syn::Error::new_spanned(
                            &ident,
                            format!("unknown record attribute `{key}`"),
                        ));
                    }
                };
                *slot = Some(value.value());
            } else {
                match key.as_str() {
                    "skip" => attrs.skip = true,
                    "nested" => attrs.nested = true,
                    _ => {
                        return Err(syn::Error::new_spanned(
                            &ident,
                            format!("unknown record flag `{key}`"),
                        ));
                    }
                }
            }

            if input.peek(syn::Token![,]) {
                let _: syn::Token![,] = input.parse()?;
            } else {
                break;
            }
        }

        Ok(attrs)
    }
}

/// Merge every `#[record(...)]` attribute on a field.
pub(super) fn get_field_attrs(field: &syn::Field) -> Result<FieldAttrs> {
    let mut merged = FieldAttrs::default();
    for attr in &field.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }
        let parsed: FieldAttrs = attr.parse_args()?;
        merged.json = parsed.json.or(merged.json);
        merged.column = parsed.column.or(merged.column);
        merged.special = parsed.special.or(merged.special);
        merged.transform = parsed.transform.or(merged.transform);
        merged.skip |= parsed.skip;
        merged.nested |= parsed.nested;
    }
    Ok(merged)
}
