//! Type Resolver: classifies each field's declared type.

use ksy_schema::{Attribute, Endianness, Expression, Repeat, TypeKey};

use crate::error::{CompileError, Site};
use crate::scope::SchemaScope;

/// Built-in type families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveKind {
    Unsigned(u8),
    Signed(u8),
    Float(u8),
    /// Raw byte run.
    Bytes,
    /// Length-delimited string.
    Str,
    /// Null-terminated string.
    StrZ,
}

/// A built-in type, with the byte order its spelling names (`u4be`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub endian: Option<Endianness>,
}

impl Primitive {
    pub const BYTES: Self = Self {
        kind: PrimitiveKind::Bytes,
        endian: None,
    };

    /// Look a type name up in the primitive table.
    ///
    /// ```text
    /// ┌───────────────────────┬────────────────────────────────┐
    /// │ Spelling              │ Kind                           │
    /// ├───────────────────────┼────────────────────────────────┤
    /// │ u1 u2 u4 u8 (le|be)?  │ Unsigned(width)                │
    /// │ s1 s2 s4 s8 (le|be)?  │ Signed(width)                  │
    /// │ f4 f8 (le|be)?        │ Float(width)                   │
    /// │ str                   │ Str                            │
    /// │ strz                  │ StrZ                           │
    /// └───────────────────────┴────────────────────────────────┘
    /// ```
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "str" => return Some(Self::plain(PrimitiveKind::Str)),
            "strz" => return Some(Self::plain(PrimitiveKind::StrZ)),
            _ => {}
        }
        let mut chars = name.chars();
        let family = chars.next()?;
        let width = chars.next()?.to_digit(10)?;
        let suffix = chars.as_str();
        let endian = match suffix {
            "" => None,
            "le" => Some(Endianness::Little),
            "be" => Some(Endianness::Big),
            _ => return None,
        };
        let width = u8::try_from(width).ok()?;
        let kind = match (family, width) {
            ('u', 1 | 2 | 4 | 8) => PrimitiveKind::Unsigned(width),
            ('s', 1 | 2 | 4 | 8) => PrimitiveKind::Signed(width),
            ('f', 4 | 8) => PrimitiveKind::Float(width),
            _ => return None,
        };
        Some(Self { kind, endian })
    }

    fn plain(kind: PrimitiveKind) -> Self {
        Self { kind, endian: None }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self.kind,
            PrimitiveKind::Unsigned(_) | PrimitiveKind::Signed(_) | PrimitiveKind::Float(_)
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self.kind,
            PrimitiveKind::Unsigned(_) | PrimitiveKind::Signed(_)
        )
    }

    /// Rust storage type.
    pub fn rust_type(self) -> &'static str {
        match self.kind {
            PrimitiveKind::Unsigned(1) => "u8",
            PrimitiveKind::Unsigned(2) => "u16",
            PrimitiveKind::Unsigned(4) => "u32",
            PrimitiveKind::Unsigned(_) => "u64",
            PrimitiveKind::Signed(1) => "i8",
            PrimitiveKind::Signed(2) => "i16",
            PrimitiveKind::Signed(4) => "i32",
            PrimitiveKind::Signed(_) => "i64",
            PrimitiveKind::Float(4) => "f32",
            PrimitiveKind::Float(_) => "f64",
            PrimitiveKind::Bytes => "Vec<u8>",
            PrimitiveKind::Str | PrimitiveKind::StrZ => "String",
        }
    }

    /// Stream reader method for numeric kinds (`read_u4`, `read_f8`, …).
    pub fn read_method(self) -> Option<String> {
        let (family, width) = match self.kind {
            PrimitiveKind::Unsigned(w) => ('u', w),
            PrimitiveKind::Signed(w) => ('s', w),
            PrimitiveKind::Float(w) => ('f', w),
            _ => return None,
        };
        Some(format!("read_{family}{width}"))
    }
}

/// `rt::TextEncoding` variant for an encoding name, if supported.
///
/// Matching ignores case, `-` and `_`, so `UTF-8`, `utf8` and `Utf_8`
/// are the same encoding.
pub fn text_encoding(name: &str) -> Option<&'static str> {
    let key: String = name
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    match key.as_str() {
        "UTF8" => Some("Utf8"),
        "ASCII" | "USASCII" => Some("Ascii"),
        "ISO88591" | "LATIN1" => Some("Latin1"),
        _ => None,
    }
}

/// Resolved classification of a field's type.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeRef {
    Primitive(Primitive),
    /// Index of a nested record in the [`SchemaScope`].
    UserDefined(usize),
    Switch(SwitchRef),
}

/// Type selected at decode time.
#[derive(Clone, Debug, PartialEq)]
pub struct SwitchRef {
    pub selector: Expression,
    /// `(case literal, type name, resolved type)` in document order.
    pub cases: Vec<SwitchCase>,
    pub default: Option<Box<SwitchCase>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SwitchCase {
    pub literal: String,
    pub type_name: String,
    pub ty: TypeRef,
}

/// How a field is stored, fixed at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldShape {
    Scalar,
    /// `repeat: expr`: element count known before the loop starts.
    ArrayKnownLength,
    /// `repeat: until` / `repeat: eos`: count discovered while reading.
    ArrayDiscovered,
    /// Single nested record or switch, owned by the enclosing record.
    Owned,
}

impl FieldShape {
    pub fn of(attr: &Attribute, ty: Option<&TypeRef>) -> Self {
        match attr.repeat {
            Some(Repeat::Expr) => Self::ArrayKnownLength,
            Some(Repeat::Until | Repeat::Eos) => Self::ArrayDiscovered,
            None => match ty {
                Some(TypeRef::UserDefined(_) | TypeRef::Switch(_)) => Self::Owned,
                _ => Self::Scalar,
            },
        }
    }

    pub fn is_array(self) -> bool {
        matches!(self, Self::ArrayKnownLength | Self::ArrayDiscovered)
    }
}

/// Resolve a type name against the primitive table, then the record
/// scope chain starting at `record`.
pub(crate) fn resolve_named(
    scope: &SchemaScope<'_>,
    record: usize,
    name: &str,
    site: Site<'_>,
) -> Result<TypeRef, CompileError> {
    if let Some(prim) = Primitive::parse(name) {
        return Ok(TypeRef::Primitive(prim));
    }
    scope
        .lookup_record(record, name)
        .map(TypeRef::UserDefined)
        .ok_or_else(|| site.unknown_type(name))
}

/// Whether the attribute says how many bytes a byte run or string spans.
fn is_delimited(attr: &Attribute) -> bool {
    attr.size.is_some() || attr.size_eos || attr.terminator.is_some() || attr.contents.is_some()
}

/// Resolve an attribute's type. Computed-value fields have no stream
/// type and resolve to `None`.
pub(crate) fn resolve_type(
    scope: &SchemaScope<'_>,
    record: usize,
    attr: &Attribute,
    site: Site<'_>,
) -> Result<Option<TypeRef>, CompileError> {
    match attr.repeat {
        Some(Repeat::Expr) if attr.repeat_expr.is_none() => {
            return Err(CompileError::MissingRepeatExpr {
                record: site.record.to_owned(),
                field: site.field.to_owned(),
            });
        }
        Some(Repeat::Until) if attr.repeat_until.is_none() => {
            return Err(CompileError::MissingRepeatUntil {
                record: site.record.to_owned(),
                field: site.field.to_owned(),
            });
        }
        _ => {}
    }
    if attr.value.is_some() {
        return Ok(None);
    }
    let ty = match &attr.ty {
        None if is_delimited(attr) => TypeRef::Primitive(Primitive::BYTES),
        None => return Err(site.missing_size()),
        Some(TypeKey::Named(name)) => resolve_named(scope, record, name, site)?,
        Some(TypeKey::Switch(switch)) => {
            let mut cases = Vec::new();
            let mut default = None;
            for (literal, type_name) in &switch.cases {
                let case = SwitchCase {
                    literal: literal.clone(),
                    type_name: type_name.clone(),
                    ty: resolve_named(scope, record, type_name, site)?,
                };
                if literal.trim() == "_" {
                    default = Some(Box::new(case));
                } else {
                    cases.push(case);
                }
            }
            TypeRef::Switch(SwitchRef {
                selector: switch.switch_on.clone(),
                cases,
                default,
            })
        }
    };
    if let TypeRef::Primitive(prim) = &ty {
        if matches!(prim.kind, PrimitiveKind::Str | PrimitiveKind::Bytes) && !is_delimited(attr) {
            return Err(site.missing_size());
        }
    }
    Ok(Some(ty))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_table() {
        let u4be = Primitive::parse("u4be").unwrap();
        assert_eq!(u4be.kind, PrimitiveKind::Unsigned(4));
        assert_eq!(u4be.endian, Some(Endianness::Big));
        assert_eq!(Primitive::parse("s2").unwrap().rust_type(), "i16");
        assert_eq!(Primitive::parse("f8le").unwrap().rust_type(), "f64");
        assert_eq!(Primitive::parse("strz").unwrap().kind, PrimitiveKind::StrZ);
        assert!(Primitive::parse("u3").is_none());
        assert!(Primitive::parse("f2").is_none());
        assert!(Primitive::parse("u4xe").is_none());
        assert!(Primitive::parse("header").is_none());
    }

    #[test]
    fn read_methods() {
        assert_eq!(Primitive::parse("u1").unwrap().read_method().as_deref(), Some("read_u1"));
        assert_eq!(Primitive::parse("f4be").unwrap().read_method().as_deref(), Some("read_f4"));
        assert_eq!(Primitive::parse("str").unwrap().read_method(), None);
    }

    #[test]
    fn encodings() {
        assert_eq!(text_encoding("UTF-8"), Some("Utf8"));
        assert_eq!(text_encoding("ascii"), Some("Ascii"));
        assert_eq!(text_encoding("iso-8859-1"), Some("Latin1"));
        assert_eq!(text_encoding("latin1"), Some("Latin1"));
        assert_eq!(text_encoding("SJIS"), None);
    }

    #[test]
    fn shapes() {
        let mut attr = Attribute::default();
        let user = TypeRef::UserDefined(1);
        assert_eq!(FieldShape::of(&attr, Some(&user)), FieldShape::Owned);
        assert_eq!(FieldShape::of(&attr, None), FieldShape::Scalar);
        attr.repeat = Some(Repeat::Eos);
        assert_eq!(FieldShape::of(&attr, Some(&user)), FieldShape::ArrayDiscovered);
        attr.repeat = Some(Repeat::Expr);
        assert!(FieldShape::of(&attr, Some(&user)).is_array());
    }
}
