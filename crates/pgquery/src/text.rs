//! Identifier case conversion.

use heck::{ToLowerCamelCase, ToSnakeCase};

/// `ownerName` / `OwnerName` -> `owner_name`
pub fn camel_to_snake(s: &str) -> String {
    s.to_snake_case()
}

/// `owner_name` -> `ownerName`
pub fn to_camel_case(s: &str) -> String {
    s.to_lower_camel_case()
}

/// `OwnerName` -> `ownerName`. Only the first character changes.
pub fn pascal_to_camel(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
