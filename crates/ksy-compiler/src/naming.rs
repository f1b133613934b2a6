//! Schema identifier → Rust identifier mapping.
//!
//! The mapping is deterministic. Generated records keep the original
//! schema id next to each member in their `FIELDS` table, so the
//! conversion never has to be reversed by guessing.

use heck::{ToSnakeCase, ToUpperCamelCase};

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub",
    "ref", "return", "self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Members every generated record defines itself. Names starting with
/// `parse_` are escaped too, since each field gets a `parse_<field>` routine.
const RESERVED_MEMBERS: &[&str] = &["base", "read", "read_fields"];

/// Prelude names generated code relies on.
const RESERVED_TYPES: &[&str] = &[
    "Box", "Default", "Err", "None", "Ok", "Option", "Result", "Self", "Some", "String", "Vec",
];

/// Struct member / accessor name for a field id.
pub fn field_name(id: &str) -> String {
    let mut name = id.to_snake_case();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, 'f');
    }
    if KEYWORDS.contains(&name.as_str())
        || RESERVED_MEMBERS.contains(&name.as_str())
        || name.starts_with("parse_")
    {
        name.push('_');
    }
    name
}

/// Struct or enum name for a schema type / enum name.
pub fn type_name(id: &str) -> String {
    let mut name = id.to_upper_camel_case();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, 'T');
    }
    if RESERVED_TYPES.contains(&name.as_str()) {
        name.push_str("Type");
    }
    name
}

/// Enum variant name for an enum literal or switch case type.
pub fn variant_name(id: &str) -> String {
    let mut name = id.to_upper_camel_case();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, 'V');
    }
    if name == "Self" {
        name.push_str("Value");
    }
    name
}

/// Rust path for a dotted user transform name (`my_crate.codecs.unpack`).
pub fn transform_path(name: &str) -> String {
    name.split('.').collect::<Vec<_>>().join("::")
}

/// Rust string literal for arbitrary text.
pub fn str_literal(text: &str) -> String {
    format!("{text:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_snake_case_and_escaped() {
        assert_eq!(field_name("numEntries"), "num_entries");
        assert_eq!(field_name("type"), "type_");
        assert_eq!(field_name("base"), "base_");
        assert_eq!(field_name("2nd"), "f2nd");
        assert_eq!(field_name("parse_len"), "parse_len_");
    }

    #[test]
    fn types_are_camel_case_and_avoid_prelude() {
        assert_eq!(type_name("png_chunk"), "PngChunk");
        assert_eq!(type_name("result"), "ResultType");
        assert_eq!(variant_name("ihdr"), "Ihdr");
        assert_eq!(variant_name("u4"), "U4");
    }

    #[test]
    fn dotted_transform_names_become_paths() {
        assert_eq!(transform_path("my_codecs.unscramble"), "my_codecs::unscramble");
        assert_eq!(transform_path("decode"), "decode");
    }
}
