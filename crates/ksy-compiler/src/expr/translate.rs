//! Ahead-of-time translation of schema expressions into Rust.
//!
//! Every translated expression is a Rust expression that is valid inside
//! the generated routine it is emitted into. Those routines have the
//! following names in scope:
//!
//! ```text
//! ┌──────────┬──────────────────────────────────────────────────────┐
//! │ Name     │ Meaning                                              │
//! ├──────────┼──────────────────────────────────────────────────────┤
//! │ self     │ record being decoded (or owning a derived field)     │
//! │ parents  │ enclosing records, nearest first (not in the root)   │
//! │ root     │ top-level record (`self` inside the top-level record)│
//! │ io       │ stream the current field is read from                │
//! │ elem     │ element just read (repeat-until predicate only)      │
//! │ index    │ element index (inside repetition loops)              │
//! └──────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! Results carry a [`ValueType`] and follow one rendering per type:
//! integers are `i64` values, floats `f64`, text `&str`, byte runs
//! `&[u8]`, records `&Record`, arrays `&[T]`, switch fields
//! `&Option<Enum>`. Everything that can fail at decode time (unset
//! nested records, out-of-range indices, text conversion, a parent of
//! the wrong type) is rendered with `?`, so translated code only appears
//! in routines returning `Result<_, rt::DecodeError>`.
//!
//! `_parent` walks the `parents` chain. When only one record type can
//! sit at that depth the link is downcast to it directly; otherwise
//! member access tries each candidate type in turn.

use crate::error::{CompileError, Site};
use crate::layout::{Category, Layout, Slot, element_slot};
use crate::naming;
use crate::resolve::{Primitive, PrimitiveKind, TypeRef, text_encoding};

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::parser;

/// Static type of a translated expression.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueType {
    Int,
    Float,
    Bool,
    Str,
    Bytes,
    Enum(usize),
    Record(usize),
    Array(Box<Slot>),
    Switch(usize),
    /// `_io`
    Stream,
    /// `_parent` chain link that may hold any of several record types.
    Ancestor { depth: usize, candidates: Vec<usize> },
}

impl ValueType {
    fn describe(&self) -> &'static str {
        match self {
            Self::Int => "integer",
            Self::Float => "float",
            Self::Bool => "boolean",
            Self::Str => "string",
            Self::Bytes => "byte array",
            Self::Enum(_) => "enum",
            Self::Record(_) => "record",
            Self::Array(_) => "array",
            Self::Switch(_) => "switch field",
            Self::Stream => "stream",
            Self::Ancestor { .. } => "parent record",
        }
    }
}

/// A translated expression.
#[derive(Clone, Debug)]
pub struct Typed {
    pub code: String,
    pub ty: ValueType,
    /// For record values (and arrays or switches of them): the ancestor
    /// chain the record's own derived fields are called with.
    parents: Option<String>,
    /// For `self` and `_parent` links: how many levels above `self`.
    depth: Option<usize>,
    /// Schema id used in decode-time error messages.
    label: String,
}

impl Typed {
    pub fn new(code: impl Into<String>, ty: ValueType) -> Self {
        Self {
            code: code.into(),
            ty,
            parents: None,
            depth: None,
            label: String::new(),
        }
    }

    fn labelled(mut self, label: &str) -> Self {
        self.label = label.to_owned();
        self
    }

    fn with_parents(mut self, parents: Option<String>) -> Self {
        self.parents = parents;
        self
    }

    fn at_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }
}

/// Integer type an expression is cast to where the generated code needs
/// a fixed width (sizes, counts, positions, transform arguments).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntCast {
    U8,
    U32,
    U64,
    Usize,
    I64,
}

impl IntCast {
    fn suffix(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::Usize => "usize",
            Self::I64 => "i64",
        }
    }

    fn fits(self, v: i128) -> bool {
        match self {
            Self::U8 => u8::try_from(v).is_ok(),
            Self::U32 => u32::try_from(v).is_ok(),
            Self::U64 | Self::Usize => u64::try_from(v).is_ok(),
            Self::I64 => i64::try_from(v).is_ok(),
        }
    }
}

/// Translates the expressions of one field.
pub struct Translator<'a, 's> {
    layout: &'a Layout<'s>,
    record: usize,
    site: Site<'a>,
    elem: Option<Slot>,
    in_loop: bool,
}

impl<'a, 's> Translator<'a, 's> {
    pub(crate) fn new(layout: &'a Layout<'s>, record: usize, site: Site<'a>) -> Self {
        Self {
            layout,
            record,
            site,
            elem: None,
            in_loop: false,
        }
    }

    /// Expressions evaluated inside a repetition loop, where `_index`
    /// is defined.
    #[must_use]
    pub fn in_loop(mut self) -> Self {
        self.in_loop = true;
        self
    }

    /// Expressions evaluated in a repeat-until predicate, where `_` is
    /// the element just read.
    #[must_use]
    pub fn with_element(mut self, slot: Slot) -> Self {
        self.elem = Some(slot);
        self.in_loop = true;
        self
    }

    /// Translate an expression.
    ///
    /// # Errors
    ///
    /// Parse errors and type errors as
    /// [`CompileError::InvalidExpression`]; unknown names as
    /// [`CompileError::UnresolvedIdentifier`] or
    /// [`CompileError::UnresolvedEnum`]; constructs that have no
    /// generated-code equivalent as
    /// [`CompileError::UnsupportedExpression`].
    pub fn translate(&self, src: &str) -> Result<Typed, CompileError> {
        let ast = parser::parse(src).map_err(|e| self.site.invalid(src, e.to_string()))?;
        self.expr(&ast).map_err(|err| with_source(err, src))
    }

    /// Translate a boolean condition (`if`, `repeat-until`).
    ///
    /// # Errors
    ///
    /// As [`translate`](Self::translate), plus a type error when the
    /// expression is not boolean.
    pub fn condition(&self, src: &str) -> Result<String, CompileError> {
        let typed = self.translate(src)?;
        match typed.ty {
            ValueType::Bool => Ok(typed.code),
            other => Err(self
                .site
                .invalid(src, format!("expected a boolean, found {}", other.describe()))),
        }
    }

    /// Translate an integer expression and cast it to `cast`.
    ///
    /// Literals that fit are emitted with a type suffix. Computed sizes
    /// and counts are checked at decode time: a negative value fails with
    /// `DecodeError::InvalidSize` instead of reading nothing.
    ///
    /// # Errors
    ///
    /// As [`translate`](Self::translate), plus a type error when the
    /// expression is not an integer.
    pub fn integer(&self, src: &str, cast: IntCast) -> Result<String, CompileError> {
        let ast = parser::parse(src).map_err(|e| self.site.invalid(src, e.to_string()))?;
        if let Expr::Int(v) = ast {
            if cast.fits(v) {
                return Ok(format!("{v}_{}", cast.suffix()));
            }
        }
        let typed = self.expr(&ast).map_err(|err| with_source(err, src))?;
        let code = self.int_code(&typed).map_err(|err| with_source(err, src))?;
        Ok(match cast {
            IntCast::I64 => code,
            IntCast::U8 | IntCast::U32 => format!("({code} as {})", cast.suffix()),
            IntCast::U64 => format!("rt::size({code}, {:?})?", self.site.field),
            IntCast::Usize => format!("rt::count({code}, {:?})?", self.site.field),
        })
    }

    /// Rust condition testing whether the switch selector `on` equals
    /// the case literal `literal`.
    ///
    /// # Errors
    ///
    /// As [`translate`](Self::translate), plus a type error when the
    /// literal cannot be compared with the selector.
    pub fn case_matches(&self, on: &Typed, literal: &str) -> Result<String, CompileError> {
        let case = self.translate(literal)?;
        self.compare(BinaryOp::Eq, on.clone(), case)
            .map(|t| t.code)
            .map_err(|err| with_source(err, literal))
    }

    /// Convert a translated value into the owned form stored in `slot`.
    ///
    /// # Errors
    ///
    /// A type error when the value does not fit the slot.
    pub fn owned(&self, typed: &Typed, slot: &Slot) -> Result<String, CompileError> {
        let code = &typed.code;
        Ok(match (slot, &typed.ty) {
            (Slot::Enum(e), ValueType::Int) => {
                format!("{}::from({code})", self.layout.scope.enums[*e].rust_name)
            }
            (Slot::Int(_), ValueType::Int)
            | (Slot::Float(_), ValueType::Float)
            | (Slot::Bool, ValueType::Bool)
            | (Slot::Enum(_), ValueType::Enum(_)) => code.clone(),
            (Slot::Float(_), ValueType::Int) => format!("({code} as f64)"),
            (Slot::Str, ValueType::Str) => format!("{code}.to_owned()"),
            (Slot::Bytes, ValueType::Bytes) | (Slot::Array(_), ValueType::Array(_)) => {
                format!("{code}.to_vec()")
            }
            (Slot::Element(_), ValueType::Record(_)) | (Slot::Switch(_), ValueType::Switch(_)) => {
                format!("{code}.clone()")
            }
            (_, ty) => {
                return Err(self
                    .site
                    .invalid("", format!("cannot store a {} here", ty.describe())));
            }
        })
    }

    /// Code naming the top-level record: `self` inside the top-level
    /// record's own routines, `root` everywhere else.
    pub fn root_code(&self) -> &'static str {
        if self.record == 0 { "self" } else { "root" }
    }

    /// Ancestor chain handed to records decoded as fields of `self`.
    pub fn child_parents(&self) -> &'static str {
        if self.record == 0 {
            "&rt::Parents::new(self)"
        } else {
            "&parents.push(self)"
        }
    }

    fn mistyped(&self, reason: impl Into<String>) -> CompileError {
        self.site.invalid("", reason)
    }

    fn expr(&self, e: &Expr) -> Result<Typed, CompileError> {
        match e {
            Expr::Int(v) => self.int_literal(*v),
            Expr::Float(v) => Ok(Typed::new(format!("{v:?}_f64"), ValueType::Float)),
            Expr::Str(s) => Ok(Typed::new(naming::str_literal(s), ValueType::Str)),
            Expr::Bool(b) => Ok(Typed::new(b.to_string(), ValueType::Bool)),
            Expr::Name(name) => self.name(name),
            Expr::EnumRef { path } => self.enum_ref(path),
            Expr::Array(items) => self.byte_array(items),
            Expr::Unary(op, inner) => self.unary(*op, inner),
            Expr::Binary(op, a, b) => {
                let a = self.expr(a)?;
                let b = self.expr(b)?;
                self.binary(*op, a, b)
            }
            Expr::Ternary(c, a, b) => self.ternary(c, a, b),
            Expr::Member(base, name) => {
                let base = self.expr(base)?;
                self.member(base, name)
            }
            Expr::Call(base, name, args) => {
                let base = self.expr(base)?;
                self.method(base, name, args)
            }
            Expr::Index(base, index) => self.index(base, index),
            Expr::Cast(base, ty) => self.cast(base, ty),
        }
    }

    fn int_literal(&self, v: i128) -> Result<Typed, CompileError> {
        if let Ok(v) = i64::try_from(v) {
            Ok(Typed::new(format!("{v}_i64"), ValueType::Int))
        } else if let Ok(v) = u64::try_from(v) {
            Ok(Typed::new(format!("({v}_u64 as i64)"), ValueType::Int))
        } else {
            Err(self.mistyped(format!("integer literal {v} does not fit in 64 bits")))
        }
    }

    fn int_code(&self, typed: &Typed) -> Result<String, CompileError> {
        match typed.ty {
            ValueType::Int => Ok(typed.code.clone()),
            ValueType::Enum(_) => Ok(format!("{}.value()", typed.code)),
            ref other => Err(self.mistyped(format!("expected an integer, found {}", other.describe()))),
        }
    }

    // ── Names ───────────────────────────────────────────────────────

    fn name(&self, name: &str) -> Result<Typed, CompileError> {
        match name {
            "_root" => Ok(self.root()),
            "_parent" => self.ancestor(1),
            "_io" => Ok(Typed::new("io", ValueType::Stream)),
            "_" => match &self.elem {
                Some(slot) => Ok(load(&deref("elem"), slot, "_")),
                None => Err(self.site.unsupported("`_` is only defined in repeat-until")),
            },
            "_index" if self.in_loop => Ok(Typed::new("(index as i64)", ValueType::Int)),
            "_index" => Err(self.site.unsupported("`_index` is only defined inside repetitions")),
            _ => self.member(self.this(), name),
        }
    }

    fn this(&self) -> Typed {
        let parents = (self.record != 0).then(|| "parents".to_owned());
        Typed::new("self", ValueType::Record(self.record))
            .labelled(&self.layout.scope.records[self.record].schema_name)
            .at_depth(0)
            .with_parents(parents)
    }

    fn root(&self) -> Typed {
        Typed::new(self.root_code(), ValueType::Record(0)).labelled("_root")
    }

    /// The `_parent` link `depth` levels above `self`.
    fn ancestor(&self, depth: usize) -> Result<Typed, CompileError> {
        let candidates = self.layout.scope.ancestors(self.record, depth);
        match candidates.as_slice() {
            [] if self.record == 0 => Err(self
                .site
                .unsupported("`_parent` is not defined in the top-level record")),
            [] => Err(self.site.unsupported(format!(
                "`_parent` {depth} levels up from {} is above the top-level record",
                self.layout.scope.records[self.record].schema_name
            ))),
            [only] => Ok(self.ancestor_as(depth, *only)),
            _ => Ok(Typed::new(
                format!("parents.link({depth})?.record()"),
                ValueType::Ancestor { depth, candidates },
            )
            .labelled("_parent")),
        }
    }

    /// The `_parent` link `depth` levels up, known to hold a `record`.
    fn ancestor_as(&self, depth: usize, record: usize) -> Typed {
        let rust_name = &self.layout.scope.records[record].rust_name;
        Typed::new(
            format!("parents.get::<{rust_name}>({depth})?"),
            ValueType::Record(record),
        )
        .labelled("_parent")
        .at_depth(depth)
        .with_parents((record != 0).then(|| format!("parents.link({})?", depth + 1)))
    }

    /// Member access on a `_parent` link whose record type is only known
    /// at decode time: each candidate type is tried in turn, and all of
    /// them must agree on the member's type.
    fn ancestor_member(&self, depth: usize, candidates: &[usize], name: &str) -> Result<Typed, CompileError> {
        match name {
            "_parent" => return self.ancestor(depth + 1),
            "_root" => return Ok(self.root()),
            _ => {}
        }
        let scope = &self.layout.scope;
        let mut result: Option<Typed> = None;
        let mut branches = Vec::with_capacity(candidates.len());
        for &candidate in candidates {
            let mut base = self.ancestor_as(depth, candidate);
            base.code = "p".to_owned();
            let typed = self.record_member(&base, candidate, name)?;
            if result.as_ref().is_some_and(|first| first.ty != typed.ty) {
                return Err(self.site.ambiguous_parent(name));
            }
            branches.push(format!(
                "if let Some(p) = up.downcast_ref::<{}>() {{ {} }}",
                scope.records[candidate].rust_name, typed.code
            ));
            result.get_or_insert(typed);
        }
        let expected = candidates
            .iter()
            .map(|c| scope.records[*c].schema_name.as_str())
            .collect::<Vec<_>>()
            .join(" | ");
        let Some(mut typed) = result else {
            return Err(self.site.unresolved(name));
        };
        typed.code = format!(
            "{{ let up = parents.link({depth})?.record(); {} else {{ return Err(rt::DecodeError::ParentMismatch {{ depth: {depth}, expected: {expected:?} }}) }} }}",
            branches.join(" else ")
        );
        Ok(typed)
    }

    fn member(&self, base: Typed, name: &str) -> Result<Typed, CompileError> {
        match &base.ty {
            ValueType::Record(r) => self.record_member(&base, *r, name),
            ValueType::Ancestor { depth, candidates } => self.ancestor_member(*depth, candidates, name),
            ValueType::Stream => match name {
                "pos" => Ok(Typed::new(format!("({}.pos() as i64)", base.code), ValueType::Int)),
                "size" => Ok(Typed::new(format!("({}.size() as i64)", base.code), ValueType::Int)),
                "eof" => Ok(Typed::new(format!("{}.is_eof()", base.code), ValueType::Bool)),
                other => Err(self.site.unsupported(format!("`_io.{other}`"))),
            },
            _ => self.method(base, name, &[]),
        }
    }

    fn record_member(&self, base: &Typed, record: usize, name: &str) -> Result<Typed, CompileError> {
        match (name, base.depth) {
            ("_root", _) => return Ok(self.root()),
            ("_parent", Some(depth)) => return self.ancestor(depth + 1),
            ("_io", Some(0)) => return Ok(Typed::new("io", ValueType::Stream)),
            ("_parent" | "_io", _) => {
                return Err(self.site.unsupported(format!("`{name}` of another record")));
            }
            _ => {}
        }
        let field = self.layout.records[record]
            .member(name)
            .ok_or_else(|| self.site.unresolved(name))?;
        let slot = self.layout.slot(record, field)?;
        let chain = if holds_records(&slot) {
            self.children_chain(base, record)
        } else {
            None
        };
        let typed = match field.category {
            Category::Sequence => {
                load(&format!("{}.{}", base.code, field.rust_name), &slot, &field.id)
            }
            Category::Instance => {
                let args = self.instance_args(record, base.parents.as_deref())?;
                let call = format!("{}.{}({args})?", base.code, field.rust_name);
                load(&deref(&call), &slot, &field.id)
            }
        };
        Ok(typed.with_parents(chain))
    }

    /// Ancestor chain of records held as fields by `base`, a `record`.
    fn children_chain(&self, base: &Typed, record: usize) -> Option<String> {
        match base.depth {
            Some(0) => Some(self.child_parents().to_owned()),
            Some(depth) => Some(format!("parents.link({depth})?")),
            None if record == 0 => Some(format!("&rt::Parents::new({})", base.code)),
            None => base.parents.as_ref().map(|chain| {
                format!("&{}.push({})", chain.strip_prefix('&').unwrap_or(chain), base.code)
            }),
        }
    }

    /// Arguments of a derived-field accessor of `target`.
    fn instance_args(&self, target: usize, parents: Option<&str>) -> Result<String, CompileError> {
        if target == 0 {
            return Ok(String::new());
        }
        let parents = parents.ok_or_else(|| {
            self.site.unsupported(format!(
                "derived fields of {} need their parent records, which are not known here",
                self.layout.scope.records[target].schema_name
            ))
        })?;
        Ok(format!("{parents}, {}", self.root_code()))
    }

    fn enum_ref(&self, path: &[String]) -> Result<Typed, CompileError> {
        let full = path.join("::");
        let Some((literal, owner)) = path.split_last() else {
            return Err(self.site.unresolved_enum(&full));
        };
        let scope = &self.layout.scope;
        let info = scope
            .lookup_enum(self.record, &owner.join("::"))
            .map(|e| (e, &scope.enums[e]))
            .ok_or_else(|| self.site.unresolved_enum(&full))?;
        let variant = info
            .1
            .variant(literal)
            .ok_or_else(|| self.site.unresolved_enum(&full))?;
        Ok(Typed::new(
            format!("{}::{}", info.1.rust_name, variant.rust_name),
            ValueType::Enum(info.0),
        ))
    }

    fn byte_array(&self, items: &[Expr]) -> Result<Typed, CompileError> {
        if items.is_empty() {
            return Ok(Typed::new("&[0_u8; 0][..]", ValueType::Bytes));
        }
        let mut bytes = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Expr::Int(v) if (0..=255).contains(v) => bytes.push(format!("{v}_u8")),
                other => {
                    let typed = self.expr(other)?;
                    bytes.push(format!("({} as u8)", self.int_code(&typed)?));
                }
            }
        }
        Ok(Typed::new(format!("&[{}][..]", bytes.join(", ")), ValueType::Bytes))
    }

    // ── Methods and properties ──────────────────────────────────────

    fn method(&self, base: Typed, name: &str, args: &[Expr]) -> Result<Typed, CompileError> {
        let code = &base.code;
        let label = &base.label;
        let no_args = |typed: Typed| {
            if args.is_empty() {
                Ok(typed)
            } else {
                Err(self.mistyped(format!("`{name}` takes no arguments")))
            }
        };
        match (&base.ty, name) {
            (ValueType::Array(_) | ValueType::Bytes, "size" | "length") => {
                no_args(Typed::new(format!("({code}.len() as i64)"), ValueType::Int))
            }
            (ValueType::Str, "length") => no_args(Typed::new(
                format!("({code}.chars().count() as i64)"),
                ValueType::Int,
            )),
            (ValueType::Array(inner), "first" | "last") => {
                let call = format!("rt::{name}({code}, {label:?})?");
                no_args(load(&deref(&call), inner, label).with_parents(base.parents.clone()))
            }
            (ValueType::Bytes, "first" | "last") => no_args(Typed::new(
                format!("(*rt::{name}({code}, {label:?})? as i64)"),
                ValueType::Int,
            )),
            (ValueType::Int, "to_i") => no_args(base.clone()),
            (ValueType::Str, "to_i") => {
                no_args(Typed::new(format!("rt::str_to_int({code})?"), ValueType::Int))
            }
            (ValueType::Enum(_), "to_i") => {
                no_args(Typed::new(format!("{code}.value()"), ValueType::Int))
            }
            (ValueType::Float, "to_i") => {
                no_args(Typed::new(format!("({code} as i64)"), ValueType::Int))
            }
            (ValueType::Bool, "to_i") => {
                no_args(Typed::new(format!("i64::from({code})"), ValueType::Int))
            }
            (ValueType::Str, "to_s") => no_args(base.clone()),
            (ValueType::Int | ValueType::Float, "to_s") => no_args(Typed::new(
                format!("{code}.to_string().as_str()"),
                ValueType::Str,
            )),
            (ValueType::Bytes, "to_s") => {
                let [Expr::Str(encoding)] = args else {
                    return Err(self.mistyped("`to_s` on bytes takes one encoding name"));
                };
                let variant = text_encoding(encoding).ok_or_else(|| {
                    CompileError::UnsupportedEncoding {
                        record: self.site.record.to_owned(),
                        field: self.site.field.to_owned(),
                        encoding: encoding.clone(),
                    }
                })?;
                Ok(Typed::new(
                    format!("rt::decode_text({code}.to_vec(), rt::TextEncoding::{variant})?.as_str()"),
                    ValueType::Str,
                ))
            }
            (ty, _) => Err(self
                .site
                .unsupported(format!("`{name}` on a {}", ty.describe()))),
        }
    }

    fn index(&self, base: &Expr, index: &Expr) -> Result<Typed, CompileError> {
        let base = self.expr(base)?;
        let index = self.expr(index)?;
        let i = self.int_code(&index)?;
        let (code, label) = (&base.code, &base.label);
        match &base.ty {
            ValueType::Array(inner) => {
                let call = format!("rt::at({code}, {i}, {label:?})?");
                Ok(load(&deref(&call), inner, label).with_parents(base.parents.clone()))
            }
            ValueType::Bytes => Ok(Typed::new(
                format!("(*rt::at({code}, {i}, {label:?})? as i64)"),
                ValueType::Int,
            )),
            other => Err(self.mistyped(format!("cannot index a {}", other.describe()))),
        }
    }

    fn cast(&self, base: &Expr, ty: &str) -> Result<Typed, CompileError> {
        let base = self.expr(base)?;
        if let ValueType::Switch(s) = base.ty {
            return self.switch_cast(&base, s, ty);
        }
        if let Some(prim) = Primitive::parse(ty) {
            return match prim.kind {
                PrimitiveKind::Unsigned(_) | PrimitiveKind::Signed(_) => Ok(Typed::new(
                    format!("({} as {} as i64)", self.int_code(&base)?, prim.rust_type()),
                    ValueType::Int,
                )),
                PrimitiveKind::Float(_) => match base.ty {
                    ValueType::Int | ValueType::Float => {
                        Ok(Typed::new(format!("({} as f64)", base.code), ValueType::Float))
                    }
                    ref other => Err(self.mistyped(format!("cannot cast a {} to {ty}", other.describe()))),
                },
                PrimitiveKind::Str | PrimitiveKind::StrZ if base.ty == ValueType::Str => Ok(base),
                _ => Err(self.mistyped(format!("cannot cast a {} to {ty}", base.ty.describe()))),
            };
        }
        if ty == "bytes" && base.ty == ValueType::Bytes {
            return Ok(base);
        }
        let target = self
            .layout
            .scope
            .lookup_record(self.record, ty)
            .ok_or_else(|| self.site.unknown_type(ty))?;
        match base.ty {
            ValueType::Record(r) if r == target => Ok(base),
            ValueType::Ancestor { depth, ref candidates } if candidates.contains(&target) => {
                Ok(self.ancestor_as(depth, target))
            }
            ref other => Err(self.mistyped(format!("cannot cast a {} to {ty}", other.describe()))),
        }
    }

    /// `.as<T>` on a switch field: the payload of the variant for `T`,
    /// or an `UnsetField` error when another case was decoded.
    fn switch_cast(&self, base: &Typed, switch: usize, ty: &str) -> Result<Typed, CompileError> {
        let info = &self.layout.switches[switch];
        let target = self.layout.scope.lookup_record(self.record, ty);
        let matching: Vec<_> = info
            .variants
            .iter()
            .filter(|v| v.type_name == ty || target.is_some_and(|t| v.ty == TypeRef::UserDefined(t)))
            .collect();
        let Some(first) = matching.first() else {
            return Err(self.mistyped(format!("switch field has no case of type {ty}")));
        };
        let patterns: Vec<String> = matching
            .iter()
            .map(|v| format!("{}::{}(v)", info.rust_name, v.rust_name))
            .collect();
        let label = &base.label;
        let arm = |payload: &str| {
            format!(
                "(match {} {{ Some({}) => {payload}, _ => return Err(rt::DecodeError::UnsetField {{ field: {label:?} }}) }})",
                base.code,
                patterns.join(" | "),
            )
        };
        Ok(match &first.ty {
            TypeRef::UserDefined(r) => Typed::new(arm("&**v"), ValueType::Record(*r))
                .labelled(label)
                .with_parents(base.parents.clone()),
            other => load(&deref(&arm("v")), &element_slot(other, None, None), label),
        })
    }

    // ── Operators ───────────────────────────────────────────────────

    fn unary(&self, op: UnaryOp, inner: &Expr) -> Result<Typed, CompileError> {
        let inner = self.expr(inner)?;
        let code = &inner.code;
        match (op, &inner.ty) {
            (UnaryOp::Neg, ValueType::Int | ValueType::Float) => {
                Ok(Typed::new(format!("(-{code})"), inner.ty.clone()))
            }
            (UnaryOp::BitNot, ValueType::Int) | (UnaryOp::Not, ValueType::Bool) => {
                Ok(Typed::new(format!("(!{code})"), inner.ty.clone()))
            }
            (_, ty) => Err(self.mistyped(format!("operator {op:?} on a {}", ty.describe()))),
        }
    }

    fn binary(&self, op: BinaryOp, a: Typed, b: Typed) -> Result<Typed, CompileError> {
        use ValueType::{Bool, Float, Int, Str};
        if op.is_comparison() {
            return self.compare(op, a, b);
        }
        let sym = op.symbol();
        let (x, y) = (&a.code, &b.code);
        match (op, &a.ty, &b.ty) {
            (BinaryOp::And | BinaryOp::Or, Bool, Bool)
            | (BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor, Bool, Bool) => {
                Ok(Typed::new(format!("({x} {sym} {y})"), Bool))
            }
            (BinaryOp::Add, Str, Str) => Ok(Typed::new(
                format!("format!(\"{{}}{{}}\", {x}, {y}).as_str()"),
                Str,
            )),
            (BinaryOp::Div, Int, Int) => Ok(Typed::new(format!("{x}.div_euclid({y})"), Int)),
            (BinaryOp::Rem, Int, Int) => Ok(Typed::new(format!("{x}.rem_euclid({y})"), Int)),
            (
                BinaryOp::Add
                | BinaryOp::Sub
                | BinaryOp::Mul
                | BinaryOp::Shl
                | BinaryOp::Shr
                | BinaryOp::BitAnd
                | BinaryOp::BitOr
                | BinaryOp::BitXor,
                Int,
                Int,
            ) => Ok(Typed::new(format!("({x} {sym} {y})"), Int)),
            (
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem,
                Int | Float,
                Int | Float,
            ) => Ok(Typed::new(
                format!("({} {sym} {})", as_float(&a), as_float(&b)),
                Float,
            )),
            (_, ta, tb) => Err(self.mistyped(format!(
                "operator {sym} on a {} and a {}",
                ta.describe(),
                tb.describe()
            ))),
        }
    }

    fn compare(&self, op: BinaryOp, a: Typed, b: Typed) -> Result<Typed, CompileError> {
        use ValueType::{Bool, Bytes, Enum, Float, Int, Str};
        let sym = op.symbol();
        let equality = matches!(op, BinaryOp::Eq | BinaryOp::Ne);
        let (x, y) = match (&a.ty, &b.ty) {
            (Int, Int) | (Float, Float) | (Str, Str) | (Bytes, Bytes) => {
                (a.code.clone(), b.code.clone())
            }
            (Int | Float, Int | Float) => (as_float(&a), as_float(&b)),
            (Bool, Bool) if equality => (a.code.clone(), b.code.clone()),
            (Enum(ea), Enum(eb)) if equality && ea == eb => (a.code.clone(), b.code.clone()),
            (Enum(_), Int) => (format!("{}.value()", a.code), b.code.clone()),
            (Int, Enum(_)) => (a.code.clone(), format!("{}.value()", b.code)),
            (ta, tb) => {
                return Err(self.mistyped(format!(
                    "cannot compare a {} with a {}",
                    ta.describe(),
                    tb.describe()
                )));
            }
        };
        Ok(Typed::new(format!("({x} {sym} {y})"), ValueType::Bool))
    }

    fn ternary(&self, cond: &Expr, a: &Expr, b: &Expr) -> Result<Typed, CompileError> {
        use ValueType::{Bytes, Float, Int, Str};
        let cond = self.expr(cond)?;
        if cond.ty != ValueType::Bool {
            return Err(self.mistyped("ternary condition must be a boolean"));
        }
        let (a, b) = (self.expr(a)?, self.expr(b)?);
        let c = &cond.code;
        let (x, y, ty) = match (&a.ty, &b.ty) {
            (Str, Str) => {
                return Ok(Typed::new(
                    format!("(if {c} {{ {}.to_owned() }} else {{ {}.to_owned() }}).as_str()", a.code, b.code),
                    Str,
                ));
            }
            (Bytes, Bytes) => {
                return Ok(Typed::new(
                    format!("(if {c} {{ {}.to_vec() }} else {{ {}.to_vec() }}).as_slice()", a.code, b.code),
                    Bytes,
                ));
            }
            (Int, Float) | (Float, Int) => (as_float(&a), as_float(&b), Float),
            (ta, tb) if ta == tb && !matches!(ta, ValueType::Stream | ValueType::Ancestor { .. }) => {
                (a.code.clone(), b.code.clone(), ta.clone())
            }
            (ta, tb) => {
                return Err(self.mistyped(format!(
                    "ternary branches have different types ({} and {})",
                    ta.describe(),
                    tb.describe()
                )));
            }
        };
        Ok(Typed::new(format!("(if {c} {{ {x} }} else {{ {y} }})"), ty))
    }
}

fn as_float(typed: &Typed) -> String {
    match typed.ty {
        ValueType::Float => typed.code.clone(),
        _ => format!("({} as f64)", typed.code),
    }
}

fn holds_records(slot: &Slot) -> bool {
    match slot {
        Slot::Record(_) | Slot::Element(_) | Slot::Switch(_) => true,
        Slot::Array(inner) => holds_records(inner),
        _ => false,
    }
}

fn deref(reference: &str) -> String {
    format!("(*{reference})")
}

/// Read a value of storage type `slot` out of the place `place`.
fn load(place: &str, slot: &Slot, label: &str) -> Typed {
    let (code, ty) = match slot {
        Slot::Int(_) => (format!("({place} as i64)"), ValueType::Int),
        Slot::Float(_) => (format!("({place} as f64)"), ValueType::Float),
        Slot::Bool => (place.to_owned(), ValueType::Bool),
        Slot::Str => (format!("{place}.as_str()"), ValueType::Str),
        Slot::Bytes => (format!("{place}.as_slice()"), ValueType::Bytes),
        Slot::Enum(e) => (place.to_owned(), ValueType::Enum(*e)),
        Slot::Record(r) => (
            format!("rt::require({place}.as_deref(), {label:?})?"),
            ValueType::Record(*r),
        ),
        Slot::Element(r) => (format!("(&{place})"), ValueType::Record(*r)),
        Slot::Switch(s) => (format!("(&{place})"), ValueType::Switch(*s)),
        Slot::Array(inner) => (format!("{place}.as_slice()"), ValueType::Array(inner.clone())),
    };
    Typed::new(code, ty).labelled(label)
}

/// Attach the expression text to type errors raised below `translate`.
fn with_source(err: CompileError, src: &str) -> CompileError {
    match err {
        CompileError::InvalidExpression {
            record,
            field,
            expr,
            reason,
        } if expr.is_empty() => CompileError::InvalidExpression {
            record,
            field,
            expr: src.to_owned(),
            reason,
        },
        other => other,
    }
}
