//! Storage layout of every generated record.
//!
//! Fixes, before any code is emitted, the Rust name and storage type of
//! each sequence field and derived field, and the shape of the enum
//! generated for each switch-typed field.
//!
//! ```text
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │ Field                        │ Storage                      │
//! ├──────────────────────────────┼──────────────────────────────┤
//! │ u1 … s8, f4, f8              │ u8 … i64, f32, f64           │
//! │ numeric with `enum`          │ generated enum (Copy)        │
//! │ bytes / str / strz           │ Vec<u8> / String             │
//! │ nested record                │ Option<Box<Record>>          │
//! │ switch                       │ Option<RecordField>          │
//! │ any of the above, repeated   │ Vec<element>                 │
//! │ `value`                      │ type of the expression       │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! Repeated nested records are stored inline (`Vec<Record>`), without
//! the `Option<Box<_>>` wrapper.

use std::cell::RefCell;
use std::collections::HashMap;

use ksy_schema::{Attribute, Schema};

use crate::config::CompilerConfig;
use crate::error::{CompileError, Site};
use crate::expr::{Translator, ValueType};
use crate::naming;
use crate::resolve::{FieldShape, PrimitiveKind, TypeRef, resolve_type};
use crate::scope::SchemaScope;

/// Rust storage type of a field or array element.
#[derive(Clone, Debug, PartialEq)]
pub enum Slot {
    /// Integer stored as the named primitive (`u8`, `i64`, …).
    Int(&'static str),
    Float(&'static str),
    Bool,
    Str,
    Bytes,
    Enum(usize),
    /// `Option<Box<Record>>`
    Record(usize),
    /// Record stored inline.
    Element(usize),
    /// `Option<SwitchEnum>`
    Switch(usize),
    Array(Box<Slot>),
}

impl Slot {
    pub fn rust_type(&self, layout: &Layout<'_>) -> String {
        match self {
            Self::Int(ty) | Self::Float(ty) => (*ty).to_owned(),
            Self::Bool => "bool".to_owned(),
            Self::Str => "String".to_owned(),
            Self::Bytes => "Vec<u8>".to_owned(),
            Self::Enum(e) => layout.scope.enums[*e].rust_name.clone(),
            Self::Record(r) => format!("Option<Box<{}>>", layout.scope.records[*r].rust_name),
            Self::Element(r) => layout.scope.records[*r].rust_name.clone(),
            Self::Switch(s) => format!("Option<{}>", layout.switches[*s].rust_name),
            Self::Array(inner) => format!("Vec<{}>", inner.rust_type(layout)),
        }
    }

    /// Storage for a value of type `ty`, as produced by a `value` field.
    pub fn for_value(ty: &ValueType) -> Option<Self> {
        Some(match ty {
            ValueType::Int => Self::Int("i64"),
            ValueType::Float => Self::Float("f64"),
            ValueType::Bool => Self::Bool,
            ValueType::Str => Self::Str,
            ValueType::Bytes => Self::Bytes,
            ValueType::Enum(e) => Self::Enum(*e),
            ValueType::Record(r) => Self::Element(*r),
            ValueType::Switch(s) => Self::Switch(*s),
            ValueType::Array(inner) => Self::Array(inner.clone()),
            ValueType::Stream | ValueType::Ancestor { .. } => return None,
        })
    }
}

/// Storage of a single stream-read value of type `ty`.
pub(crate) fn element_slot(ty: &TypeRef, enum_ref: Option<usize>, switch: Option<usize>) -> Slot {
    match ty {
        TypeRef::Primitive(prim) => match (prim.kind, enum_ref) {
            (PrimitiveKind::Unsigned(_) | PrimitiveKind::Signed(_), Some(e)) => Slot::Enum(e),
            (PrimitiveKind::Unsigned(_) | PrimitiveKind::Signed(_), None) => {
                Slot::Int(prim.rust_type())
            }
            (PrimitiveKind::Float(_), _) => Slot::Float(prim.rust_type()),
            (PrimitiveKind::Bytes, _) => Slot::Bytes,
            (PrimitiveKind::Str | PrimitiveKind::StrZ, _) => Slot::Str,
        },
        TypeRef::UserDefined(r) => Slot::Element(*r),
        TypeRef::Switch(_) => Slot::Switch(switch.unwrap_or_default()),
    }
}

/// Whether a member came from `seq` or `instances`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Sequence,
    Instance,
}

#[derive(Debug)]
pub struct FieldLayout<'s> {
    pub attr: &'s Attribute,
    pub id: String,
    pub rust_name: String,
    pub category: Category,
    /// `None` for computed-value fields.
    pub ty: Option<TypeRef>,
    pub shape: FieldShape,
    pub enum_ref: Option<usize>,
    /// Index into [`Layout::switches`] for switch-typed fields.
    pub switch: Option<usize>,
    /// `None` until inferred for computed-value fields.
    slot: Option<Slot>,
}

impl FieldLayout<'_> {
    pub fn is_value(&self) -> bool {
        self.attr.value.is_some()
    }
}

#[derive(Debug, Default)]
pub struct RecordLayout<'s> {
    pub fields: Vec<FieldLayout<'s>>,
    pub instances: Vec<FieldLayout<'s>>,
}

impl<'s> RecordLayout<'s> {
    pub fn member(&self, id: &str) -> Option<&FieldLayout<'s>> {
        self.fields
            .iter()
            .chain(&self.instances)
            .find(|f| f.id == id)
    }

    pub fn members(&self) -> impl Iterator<Item = &FieldLayout<'s>> {
        self.fields.iter().chain(&self.instances)
    }
}

/// Enum generated for one switch-typed field.
#[derive(Debug)]
pub struct SwitchEnum {
    pub rust_name: String,
    pub record: usize,
    pub field: String,
    pub variants: Vec<SwitchVariant>,
    /// `(case literal, variant index)` in document order.
    pub arms: Vec<(String, usize)>,
    pub default: Option<usize>,
}

#[derive(Debug)]
pub struct SwitchVariant {
    pub rust_name: String,
    pub type_name: String,
    pub ty: TypeRef,
}

impl SwitchVariant {
    /// Payload type: nested records are boxed.
    pub fn payload_type(&self, layout: &Layout<'_>) -> String {
        match &self.ty {
            TypeRef::UserDefined(r) => format!("Box<{}>", layout.scope.records[*r].rust_name),
            other => element_slot(other, None, None).rust_type(layout),
        }
    }
}

#[derive(Clone, Debug)]
enum ValueSlot {
    Pending,
    Done(Slot),
}

#[derive(Debug)]
pub struct Layout<'s> {
    pub scope: SchemaScope<'s>,
    pub config: CompilerConfig,
    pub records: Vec<RecordLayout<'s>>,
    pub switches: Vec<SwitchEnum>,
    values: RefCell<HashMap<(usize, String), ValueSlot>>,
}

impl<'s> Layout<'s> {
    /// Lay out every record of `schema` and infer computed-value types.
    ///
    /// # Errors
    ///
    /// Type resolution errors, unresolved enum annotations, name clashes
    /// between generated types, and any error translating a `value`.
    pub fn build(schema: &'s Schema, config: &CompilerConfig) -> Result<Self, CompileError> {
        let scope = SchemaScope::build(schema, config)?;
        let mut layout = Self {
            scope,
            config: config.clone(),
            records: Vec::new(),
            switches: Vec::new(),
            values: RefCell::new(HashMap::new()),
        };
        for record in 0..layout.scope.records.len() {
            let spec = layout.scope.records[record].spec;
            let mut fields = Vec::new();
            for attr in &spec.seq {
                fields.push(layout.field(record, attr, Category::Sequence)?);
            }
            let mut instances = Vec::new();
            for (_, attr) in &spec.instances {
                instances.push(layout.field(record, attr, Category::Instance)?);
            }
            layout.records.push(RecordLayout { fields, instances });
        }
        layout.check_names()?;
        for record in 0..layout.records.len() {
            for field in layout.records[record].members() {
                layout.slot(record, field)?;
            }
        }
        Ok(layout)
    }

    fn field(
        &mut self,
        record: usize,
        attr: &'s Attribute,
        category: Category,
    ) -> Result<FieldLayout<'s>, CompileError> {
        let site = Site {
            record: &self.scope.records[record].schema_name,
            field: &attr.id,
        };
        let ty = resolve_type(&self.scope, record, attr, site)?;
        let shape = FieldShape::of(attr, ty.as_ref());
        let enum_ref = match &attr.enum_name {
            Some(name) => Some(
                self.scope
                    .lookup_enum(record, name)
                    .ok_or_else(|| site.unresolved_enum(name))?,
            ),
            None => None,
        };
        let switch = match &ty {
            Some(TypeRef::Switch(sw)) => {
                let mut variants: Vec<SwitchVariant> = Vec::new();
                let mut variant_of = |case: &crate::resolve::SwitchCase| {
                    if let Some(i) = variants.iter().position(|v| v.type_name == case.type_name) {
                        return i;
                    }
                    variants.push(SwitchVariant {
                        rust_name: naming::variant_name(&case.type_name),
                        type_name: case.type_name.clone(),
                        ty: case.ty.clone(),
                    });
                    variants.len() - 1
                };
                let arms = sw
                    .cases
                    .iter()
                    .map(|case| (case.literal.clone(), variant_of(case)))
                    .collect();
                let default = sw.default.as_deref().map(&mut variant_of);
                self.switches.push(SwitchEnum {
                    rust_name: format!(
                        "{}{}",
                        self.scope.records[record].rust_name,
                        naming::type_name(&attr.id)
                    ),
                    record,
                    field: attr.id.clone(),
                    variants,
                    arms,
                    default,
                });
                Some(self.switches.len() - 1)
            }
            _ => None,
        };
        let slot = ty.as_ref().map(|ty| {
            let elem = element_slot(ty, enum_ref, switch);
            match (shape, elem) {
                (s, elem) if s.is_array() => Slot::Array(Box::new(elem)),
                (_, Slot::Element(r)) => Slot::Record(r),
                (_, elem) => elem,
            }
        });
        Ok(FieldLayout {
            attr,
            id: attr.id.clone(),
            rust_name: naming::field_name(&attr.id),
            category,
            ty,
            shape,
            enum_ref,
            switch,
            slot,
        })
    }

    /// Every generated type name must be unique within the module, and
    /// every member name unique within its record.
    fn check_names(&self) -> Result<(), CompileError> {
        let mut seen: HashMap<&str, String> = HashMap::new();
        let records = self
            .scope
            .records
            .iter()
            .map(|r| (r.rust_name.as_str(), format!("type {}", r.schema_name)));
        let enums = self
            .scope
            .enums
            .iter()
            .map(|e| (e.rust_name.as_str(), format!("enum {}", e.schema_name)));
        let switches = self.switches.iter().map(|s| {
            let record = &self.scope.records[s.record].schema_name;
            (s.rust_name.as_str(), format!("switch {record}.{}", s.field))
        });
        for (name, origin) in records.chain(enums).chain(switches) {
            if let Some(first) = seen.insert(name, origin.clone()) {
                return Err(CompileError::DuplicateName {
                    name: name.to_owned(),
                    first,
                    second: origin,
                });
            }
        }
        for (idx, record) in self.records.iter().enumerate() {
            let mut members: HashMap<&str, &str> = HashMap::new();
            for field in record.members() {
                if let Some(first) = members.insert(field.rust_name.as_str(), field.id.as_str()) {
                    return Err(CompileError::DuplicateName {
                        name: format!("{}::{}", self.scope.records[idx].rust_name, field.rust_name),
                        first: first.to_owned(),
                        second: field.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Storage of `field`, inferring it from the expression for
    /// computed-value fields.
    ///
    /// # Errors
    ///
    /// Any translation error in the `value` expression, or
    /// [`CompileError::UnsupportedExpression`] when computed values
    /// depend on each other in a cycle.
    pub fn slot(&self, record: usize, field: &FieldLayout<'_>) -> Result<Slot, CompileError> {
        if let Some(slot) = &field.slot {
            return Ok(slot.clone());
        }
        let site = Site {
            record: &self.scope.records[record].schema_name,
            field: &field.id,
        };
        let key = (record, field.id.clone());
        let state = self.values.borrow().get(&key).cloned();
        match state {
            Some(ValueSlot::Done(slot)) => return Ok(slot),
            Some(ValueSlot::Pending) => {
                return Err(site.unsupported("computed value depends on itself"));
            }
            None => {}
        }
        let Some(value) = &field.attr.value else {
            return Err(site.missing_size());
        };
        self.values.borrow_mut().insert(key.clone(), ValueSlot::Pending);
        let typed = Translator::new(self, record, site).translate(value.as_str())?;
        let slot = match (field.enum_ref, &typed.ty) {
            (Some(e), ValueType::Int) => Slot::Enum(e),
            (_, ty) => Slot::for_value(ty)
                .ok_or_else(|| site.unsupported("a stream or a parent of unknown type cannot be stored in a field"))?,
        };
        self.values.borrow_mut().insert(key, ValueSlot::Done(slot.clone()));
        tracing::trace!(record = %site.record, field = %site.field, ?slot, "inferred value type");
        Ok(slot)
    }
}
