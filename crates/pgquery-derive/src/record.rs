//! Record derive macro implementation

mod attrs;

use crate::common::syn_types::{is_temporal, option_inner, type_name, vec_inner};
use attrs::{FieldAttrs, get_field_attrs, get_rename_rule};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Result};

/// How a field is stored and decoded.
enum Kind<'a> {
    Scalar,
    Temporal,
    /// Decoded only, never written: generated or hand-projected columns.
    ReadOnly,
    Skipped,
    Nested(&'a syn::Type),
    NestedOption(&'a syn::Type),
    NestedList(&'a syn::Type),
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Record can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Record can only be derived for structs",
            ));
        }
    };

    let rename = get_rename_rule(&input)?;

    let mut defs = Vec::with_capacity(fields.len());
    let mut values = Vec::with_capacity(fields.len());
    let mut setters = Vec::with_capacity(fields.len());

    for (index, field) in fields.iter().enumerate() {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let attrs = get_field_attrs(field)?;
        let kind = classify(field, &attrs);

        let field_name = ident.to_string();
        let ty_name = type_name(&field.ty);
        let json = if attrs.skip {
            "-".to_string()
        } else {
            attrs
                .json
                .clone()
                .unwrap_or_else(|| rename.apply(&field_name))
        };
        let column = attrs.column.clone().unwrap_or_default();
        let special = attrs.special.clone().unwrap_or_default();
        let transform = attrs.transform.clone().unwrap_or_default();

        let shape = match &kind {
            Kind::Temporal => quote!(::pgquery::FieldShape::Temporal),
            Kind::Nested(inner) | Kind::NestedOption(inner) => {
                quote!(::pgquery::FieldShape::Record(<#inner as ::pgquery::Record>::fields))
            }
            Kind::NestedList(inner) => {
                quote!(::pgquery::FieldShape::RecordList(<#inner as ::pgquery::Record>::fields))
            }
            Kind::Scalar | Kind::ReadOnly | Kind::Skipped => quote!(::pgquery::FieldShape::Scalar),
        };

        defs.push(quote! {
            ::pgquery::FieldDef {
                name: #field_name,
                type_name: #ty_name,
                json: #json,
                column: #column,
                special: #special,
                transform: #transform,
                shape: #shape,
            }
        });

        values.push(match &kind {
            Kind::Scalar | Kind::Temporal => {
                quote!(::pgquery::FieldValue::bound(&self.#ident))
            }
            Kind::Nested(_) => {
                quote!(::pgquery::FieldValue::Nested(::pgquery::Record::field_values(&self.#ident)))
            }
            Kind::NestedOption(_) => quote! {
                match &self.#ident {
                    ::std::option::Option::Some(value) => {
                        ::pgquery::FieldValue::Nested(::pgquery::Record::field_values(value))
                    }
                    ::std::option::Option::None => ::pgquery::FieldValue::Absent,
                }
            },
            Kind::NestedList(_) | Kind::ReadOnly | Kind::Skipped => {
                quote!(::pgquery::FieldValue::Absent)
            }
        });

        let decode = match &kind {
            Kind::Scalar | Kind::Temporal | Kind::ReadOnly => quote! {
                ::pgquery::record::assign_column(&mut self.#ident, row, column)?;
            },
            Kind::Nested(inner) => quote! {
                if let ::std::option::Option::Some(value) =
                    ::pgquery::record::decode_json::<#inner>(row, column)?
                {
                    self.#ident = value;
                }
            },
            Kind::NestedOption(inner) => quote! {
                self.#ident = ::pgquery::record::decode_json::<#inner>(row, column)?;
            },
            Kind::NestedList(inner) => quote! {
                self.#ident = ::pgquery::record::decode_json::<::std::vec::Vec<#inner>>(row, column)?
                    .unwrap_or_default();
            },
            Kind::Skipped => quote! {},
        };
        setters.push(quote! {
            #index => { #decode }
        });
    }

    Ok(quote! {
        impl ::pgquery::Record for #name {
            fn fields() -> &'static [::pgquery::FieldDef] {
                const FIELDS: &[::pgquery::FieldDef] = &[#(#defs),*];
                FIELDS
            }

            fn field_values(&self) -> ::std::vec::Vec<::pgquery::FieldValue> {
                ::std::vec![#(#values),*]
            }

            fn set_field(
                &mut self,
                index: usize,
                row: &::pgquery::Row,
                column: usize,
            ) -> ::pgquery::OrmResult<()> {
                match index {
                    #(#setters)*
                    _ => {}
                }
                ::std::result::Result::Ok(())
            }
        }
    })
}

fn classify<'a>(field: &'a syn::Field, attrs: &FieldAttrs) -> Kind<'a> {
    if attrs.skip {
        return Kind::Skipped;
    }
    if attrs.nested {
        if let Some(inner) = vec_inner(&field.ty) {
            return Kind::NestedList(inner);
        }
        if let Some(inner) = option_inner(&field.ty) {
            return Kind::NestedOption(inner);
        }
        return Kind::Nested(&field.ty);
    }
    if attrs.is_generated() || attrs.column.as_deref() == Some("-") {
        return Kind::ReadOnly;
    }
    if is_temporal(&field.ty) {
        return Kind::Temporal;
    }
    Kind::Scalar
}
