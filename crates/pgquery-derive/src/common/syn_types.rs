//! Type helper utilities for syn type analysis.

/// Extract the single generic argument of a type whose last path segment is
/// `wrapper` (`Option<T>`, `std::vec::Vec<T>`, ...).
fn single_arg<'a>(ty: &'a syn::Type, wrapper: &str) -> Option<&'a syn::Type> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    let seg = type_path.path.segments.last()?;
    if seg.ident != wrapper {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &seg.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    let syn::GenericArgument::Type(inner) = args.args.first()? else {
        return None;
    };
    Some(inner)
}

/// Extract the inner type T from Option<T>, or return None if not an Option type.
pub fn option_inner(ty: &syn::Type) -> Option<&syn::Type> {
    single_arg(ty, "Option")
}

/// Extract the inner type T from Vec<T>, or return None if not a Vec type.
pub fn vec_inner(ty: &syn::Type) -> Option<&syn::Type> {
    single_arg(ty, "Vec")
}

/// Date/time types, optionally wrapped in `Option`:
/// `DateTime<_>`, `NaiveDateTime`, `NaiveDate`, `NaiveTime`, `SystemTime`.
pub fn is_temporal(ty: &syn::Type) -> bool {
    let ty = option_inner(ty).unwrap_or(ty);
    let syn::Type::Path(type_path) = ty else {
        return false;
    };
    type_path.path.segments.last().is_some_and(|seg| {
        matches!(
            seg.ident.to_string().as_str(),
            "DateTime" | "NaiveDateTime" | "NaiveDate" | "NaiveTime" | "SystemTime"
        )
    })
}

/// Source text of a type without token spacing (`Option<String>`).
pub fn type_name(ty: &syn::Type) -> String {
    quote::quote!(#ty).to_string().replace(' ', "")
}
