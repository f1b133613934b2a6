use std::fmt;
use std::path::Path;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::attribute::Attribute;
use crate::error::SchemaError;

/// Declared byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum Endianness {
    #[serde(rename = "le", alias = "little")]
    Little,
    #[serde(rename = "be", alias = "big")]
    Big,
}

/// The `meta` block of a record type.
///
/// Only the top-level record is required to carry an `id`; nested types
/// typically use `meta` just to override `endian` or `encoding`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Meta {
    pub id: Option<String>,
    pub title: Option<String>,
    pub application: Option<String>,
    pub file_extension: Option<FileExtension>,
    #[serde(alias = "licence")]
    pub license: Option<String>,
    pub endian: Option<Endianness>,
    /// Default text encoding for `str`/`strz` fields.
    pub encoding: Option<String>,
}

/// `file-extension` may be a single string or a list.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FileExtension {
    One(String),
    Many(Vec<String>),
}

/// One symbolic name of an enum, optionally documented.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "RawLiteral")]
pub struct EnumLiteral {
    pub id: String,
    pub doc: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLiteral {
    Name(String),
    Detailed { id: String, doc: Option<String> },
}

impl From<RawLiteral> for EnumLiteral {
    fn from(raw: RawLiteral) -> Self {
        match raw {
            RawLiteral::Name(id) => Self { id, doc: None },
            RawLiteral::Detailed { id, doc } => Self { id, doc },
        }
    }
}

/// Integer → literal table, in document order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnumSpec {
    pub values: Vec<(i64, EnumLiteral)>,
}

impl EnumSpec {
    /// Literal whose symbolic name is `id`.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<(i64, &EnumLiteral)> {
        self.values
            .iter()
            .find(|(_, lit)| lit.id == id)
            .map(|(value, lit)| (*value, lit))
    }
}

/// Parse an enum key written as decimal, `0x` hex, `0b` binary or `0o`
/// octal, optionally negative.
///
/// # Errors
///
/// [`SchemaError::InvalidEnumKey`] for anything else.
pub fn parse_enum_key(key: &str) -> Result<i64, SchemaError> {
    let invalid = || SchemaError::InvalidEnumKey {
        key: key.to_owned(),
    };
    let trimmed = key.trim().replace('_', "");
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.as_str()),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, body) = [("0x", 16), ("0b", 2), ("0o", 8)]
        .into_iter()
        .find_map(|(prefix, radix)| lower.strip_prefix(prefix).map(|body| (radix, body)))
        .unwrap_or((10, lower.as_str()));
    let magnitude = i128::from_str_radix(body, radix).map_err(|_| invalid())?;
    let value = if negative { -magnitude } else { magnitude };
    i64::try_from(value)
        .or_else(|_| u64::try_from(value).map(|bits| bits as i64))
        .map_err(|_| invalid())
}

impl<'de> Deserialize<'de> for EnumSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EnumVisitor;

        impl<'de> Visitor<'de> for EnumVisitor {
            type Value = EnumSpec;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from integer keys to enum literals")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<EnumSpec, A::Error> {
                let mut values = Vec::new();
                while let Some((key, literal)) = map.next_entry::<String, EnumLiteral>()? {
                    let value = parse_enum_key(&key).map_err(serde::de::Error::custom)?;
                    values.push((value, literal));
                }
                Ok(EnumSpec { values })
            }
        }

        deserializer.deserialize_map(EnumVisitor)
    }
}

/// A record type: the top-level schema or a nested entry of `types`.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TypeSpec {
    #[serde(default)]
    pub meta: Meta,
    pub doc: Option<String>,
    #[serde(default)]
    pub seq: Vec<Attribute>,
    #[serde(default, deserialize_with = "crate::ordered::deserialize")]
    pub types: Vec<(String, TypeSpec)>,
    #[serde(default, deserialize_with = "crate::ordered::deserialize")]
    pub enums: Vec<(String, EnumSpec)>,
    #[serde(default, deserialize_with = "crate::ordered::deserialize")]
    pub instances: Vec<(String, Attribute)>,
}

impl TypeSpec {
    /// Give every instance the id of its map key, recursively.
    fn normalize(&mut self) {
        for (name, attr) in &mut self.instances {
            if attr.id.is_empty() {
                attr.id.clone_from(name);
            }
        }
        for (_, nested) in &mut self.types {
            nested.normalize();
        }
    }
}

/// A loaded, validated top-level schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    pub root: TypeSpec,
    id: String,
}

impl Schema {
    /// Wrap an already-built root record type.
    ///
    /// # Errors
    ///
    /// [`SchemaError::MissingId`] if `root.meta.id` is absent or empty.
    pub fn new(mut root: TypeSpec) -> Result<Self, SchemaError> {
        let id = root
            .meta
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .ok_or(SchemaError::MissingId)?;
        root.normalize();
        Ok(Self { root, id })
    }

    /// Load a schema from its JSON tree-document form.
    ///
    /// # Errors
    ///
    /// [`SchemaError::Json`] for malformed documents and
    /// [`SchemaError::MissingId`] when `meta.id` is absent.
    pub fn from_json_str(json: &str) -> Result<Self, SchemaError> {
        Self::new(serde_json::from_str(json)?)
    }

    /// Load a schema file.
    ///
    /// # Errors
    ///
    /// [`SchemaError::Io`] if the file cannot be read, plus everything
    /// [`from_json_str`](Self::from_json_str) reports.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// The top-level `meta.id`.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "meta": {"id": "sample", "endian": "be", "encoding": "ASCII"},
        "seq": [{"id": "kind", "type": "u1", "enum": "kind"}],
        "types": {"zeta": {"meta": {"endian": "little"}}, "alpha": {}},
        "enums": {"kind": {"0x01": "one", "2": {"id": "two", "doc": "Second."}, "-1": "neg"}},
        "instances": {"doubled": {"value": "kind.to_i * 2"}}
    }"#;

    #[test]
    fn loads_meta_and_nested_types_in_order() {
        let schema = Schema::from_json_str(SAMPLE).unwrap();
        assert_eq!(schema.id(), "sample");
        assert_eq!(schema.root.meta.endian, Some(Endianness::Big));
        let names: Vec<&str> = schema.root.types.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha"]);
        assert_eq!(schema.root.types[0].1.meta.endian, Some(Endianness::Little));
    }

    #[test]
    fn enum_keys_and_literal_forms() {
        let schema = Schema::from_json_str(SAMPLE).unwrap();
        let (_, kind) = &schema.root.enums[0];
        assert_eq!(kind.values.len(), 3);
        assert_eq!(kind.values[0].0, 1);
        assert_eq!(kind.find("two").map(|(v, l)| (v, l.doc.as_deref())), Some((2, Some("Second."))));
        assert_eq!(kind.find("neg").map(|(v, _)| v), Some(-1));
    }

    #[test]
    fn instance_ids_come_from_keys() {
        let schema = Schema::from_json_str(SAMPLE).unwrap();
        assert_eq!(schema.root.instances[0].1.id, "doubled");
    }

    #[test]
    fn missing_id_is_rejected() {
        assert!(matches!(
            Schema::from_json_str(r#"{"meta": {}, "seq": []}"#),
            Err(SchemaError::MissingId)
        ));
        assert!(matches!(
            Schema::from_json_str(r#"{"seq": "#),
            Err(SchemaError::Json(_))
        ));
    }

    #[test]
    fn enum_key_radixes() {
        assert_eq!(parse_enum_key("0b101").unwrap(), 5);
        assert_eq!(parse_enum_key("0o17").unwrap(), 15);
        assert_eq!(parse_enum_key("0xFFFF_FFFF").unwrap(), 0xFFFF_FFFF);
        assert_eq!(parse_enum_key("0xFFFFFFFFFFFFFFFF").unwrap(), -1);
        assert!(parse_enum_key("seven").is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Schema::from_path("/nonexistent/schema.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/schema.json"));
    }
}
