use std::fmt;

use serde::de::{Deserializer, Error as _};
use serde::Deserialize;

use crate::error::SchemaError;

/// Source text of an embedded expression.
///
/// Schema documents may write simple expressions as bare JSON numbers or
/// booleans (`"size": 4`, `"if": true`); those are kept as their textual
/// form so the compiler sees one representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "RawExpression")]
pub struct Expression(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExpression {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

impl From<RawExpression> for Expression {
    fn from(raw: RawExpression) -> Self {
        Self(match raw {
            RawExpression::Text(s) => s,
            RawExpression::Int(v) => v.to_string(),
            RawExpression::UInt(v) => v.to_string(),
            RawExpression::Float(v) => format!("{v:?}"),
            RawExpression::Bool(v) => v.to_string(),
        })
    }
}

impl Expression {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Expression {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Declared type of a field: a type name or a switch.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TypeKey {
    Named(String),
    Switch(SwitchSpec),
}

/// Type chosen at decode time from a selector expression.
///
/// `cases` maps case-literal expressions (`"1"`, `"0x10"`,
/// `"kind::png"`, `"_"` for the default) to type names, in document
/// order.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SwitchSpec {
    pub switch_on: Expression,
    #[serde(deserialize_with = "crate::ordered::deserialize")]
    pub cases: Vec<(String, String)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    Expr,
    Until,
    Eos,
}

/// Origin for a `pos` expression.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Whence {
    #[default]
    SeekSet,
    SeekEnd,
    SeekCur,
}

/// Fixed bytes a field must contain.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Contents {
    Text(String),
    Items(Vec<ContentItem>),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ContentItem {
    Byte(u8),
    Text(String),
}

impl Contents {
    /// The expected bytes, with string items contributing their UTF-8.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.as_bytes().to_vec(),
            Self::Items(items) => items
                .iter()
                .flat_map(|item| match item {
                    ContentItem::Byte(b) => vec![*b],
                    ContentItem::Text(s) => s.as_bytes().to_vec(),
                })
                .collect(),
        }
    }
}

/// One step of a `process` pipeline, e.g. `xor(0x5a)` or `zlib`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct ProcessSpec {
    /// Transform name; dotted names refer to user transforms.
    pub name: String,
    pub args: Vec<Expression>,
}

impl TryFrom<String> for ProcessSpec {
    type Error = SchemaError;

    fn try_from(spec: String) -> Result<Self, Self::Error> {
        let invalid = |reason| SchemaError::InvalidProcess {
            spec: spec.clone(),
            reason,
        };
        let text = spec.trim();
        let (name, args) = match text.find('(') {
            None => (text, Vec::new()),
            Some(open) => {
                let inner = text[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(|| invalid("missing closing parenthesis"))?;
                let args = split_top_level(inner)
                    .ok_or_else(|| invalid("unbalanced brackets in arguments"))?
                    .into_iter()
                    .map(Expression::new)
                    .collect();
                (text[..open].trim(), args)
            }
        };
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !valid {
            return Err(invalid("transform name must be a dotted identifier"));
        }
        Ok(Self {
            name: name.to_owned(),
            args,
        })
    }
}

/// Split on commas that are not nested in brackets or quotes.
fn split_top_level(inner: &str) -> Option<Vec<String>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote = None;
    let mut current = String::new();
    for c in inner.chars() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            (None, ',') if depth == 0 => {
                parts.push(current.trim().to_owned());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if depth != 0 || quote.is_some() {
        return None;
    }
    if !current.trim().is_empty() || !parts.is_empty() {
        parts.push(current.trim().to_owned());
    }
    Some(parts)
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<ProcessSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    let specs = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(spec) => vec![spec],
        OneOrMany::Many(specs) => specs,
    };
    specs
        .into_iter()
        .map(|spec| ProcessSpec::try_from(spec).map_err(D::Error::custom))
        .collect()
}

/// A field of a record's `seq`, or a derived field under `instances`.
///
/// Keys follow the schema document's kebab-case spelling.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Attribute {
    /// Filled from the map key for instances.
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub ty: Option<TypeKey>,
    pub size: Option<Expression>,
    #[serde(default)]
    pub size_eos: bool,
    pub doc: Option<String>,
    pub repeat: Option<Repeat>,
    pub repeat_expr: Option<Expression>,
    pub repeat_until: Option<Expression>,
    pub contents: Option<Contents>,
    pub value: Option<Expression>,
    pub pos: Option<Expression>,
    pub whence: Option<Whence>,
    #[serde(rename = "enum")]
    pub enum_name: Option<String>,
    #[serde(rename = "if")]
    pub if_expr: Option<Expression>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub process: Vec<ProcessSpec>,
    pub terminator: Option<Expression>,
    pub consume: Option<bool>,
    pub include: Option<bool>,
    pub eos_error: Option<bool>,
    pub pad_right: Option<Expression>,
    pub encoding: Option<String>,
}

impl Attribute {
    /// Type name when the declared type is not a switch.
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        match &self.ty {
            Some(TypeKey::Named(name)) => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(spec: &str) -> Result<ProcessSpec, SchemaError> {
        ProcessSpec::try_from(spec.to_owned())
    }

    #[test]
    fn process_without_args() {
        let spec = process("zlib").unwrap();
        assert_eq!(spec.name, "zlib");
        assert!(spec.args.is_empty());
    }

    #[test]
    fn process_splits_top_level_commas_only() {
        let spec = process("my_codecs.unscramble(key, [1, 2], 'a,b')").unwrap();
        assert_eq!(spec.name, "my_codecs.unscramble");
        let args: Vec<&str> = spec.args.iter().map(Expression::as_str).collect();
        assert_eq!(args, ["key", "[1, 2]", "'a,b'"]);
    }

    #[test]
    fn process_rejects_malformed() {
        assert!(process("xor(0x5a").is_err());
        assert!(process("xor([1, 2)").is_err());
        assert!(process("bad name(1)").is_err());
    }

    #[test]
    fn numeric_expressions_become_text() {
        let attr: Attribute =
            serde_json::from_str(r#"{"id": "x", "size": 4, "if": true, "pad-right": 32}"#).unwrap();
        assert_eq!(attr.size, Some(Expression::new("4")));
        assert_eq!(attr.if_expr, Some(Expression::new("true")));
        assert_eq!(attr.pad_right, Some(Expression::new("32")));
    }

    #[test]
    fn contents_string_and_mixed_array() {
        let text: Contents = serde_json::from_str(r#""GIF""#).unwrap();
        assert_eq!(text.bytes(), b"GIF");
        let mixed: Contents = serde_json::from_str(r#"[137, "PNG", 13, 10]"#).unwrap();
        assert_eq!(mixed.bytes(), vec![137, b'P', b'N', b'G', 13, 10]);
    }

    #[test]
    fn switch_type_keeps_case_order() {
        let attr: Attribute = serde_json::from_str(
            r#"{"id": "body", "type": {"switch-on": "kind", "cases": {"2": "b", "1": "a", "_": "c"}}}"#,
        )
        .unwrap();
        let Some(TypeKey::Switch(switch)) = attr.ty else {
            panic!("expected switch type");
        };
        assert_eq!(switch.switch_on.as_str(), "kind");
        let keys: Vec<&str> = switch.cases.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["2", "1", "_"]);
    }

    #[test]
    fn process_accepts_one_or_many() {
        let one: Attribute = serde_json::from_str(r#"{"id": "a", "process": "xor(1)"}"#).unwrap();
        assert_eq!(one.process.len(), 1);
        let many: Attribute =
            serde_json::from_str(r#"{"id": "a", "process": ["rol(3)", "zlib"]}"#).unwrap();
        let names: Vec<&str> = many.process.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["rol", "zlib"]);
    }

    #[test]
    fn whence_and_repeat_spellings() {
        let attr: Attribute = serde_json::from_str(
            r#"{"id": "a", "whence": "seek_cur", "repeat": "until", "repeat-until": "_ == 0"}"#,
        )
        .unwrap();
        assert_eq!(attr.whence, Some(Whence::SeekCur));
        assert_eq!(attr.repeat, Some(Repeat::Until));
    }
}
