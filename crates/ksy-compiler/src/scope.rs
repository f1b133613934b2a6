//! Record and enum tables for one schema.
//!
//! Nested record types are flattened depth-first (the top-level record
//! is index 0). Each record carries the byte order and text encoding in
//! effect for it, inherited from its lexical parent unless its own
//! `meta` overrides them: byte order is an explicit per-record value,
//! never shared state consulted while compiling.

use std::collections::BTreeSet;

use ksy_schema::{Attribute, EnumSpec, Endianness, Schema, TypeSpec};

use crate::config::CompilerConfig;
use crate::error::{CompileError, Site};
use crate::naming;
use crate::resolve::{TypeRef, resolve_type};

#[derive(Debug)]
pub struct RecordInfo<'s> {
    pub spec: &'s TypeSpec,
    pub schema_name: String,
    pub rust_name: String,
    pub lexical_parent: Option<usize>,
    /// Nested `types`, by schema name.
    pub children: Vec<(String, usize)>,
    /// Declared `enums`, by schema name, as indices into [`SchemaScope::enums`].
    pub enums: Vec<(String, usize)>,
    pub endian: Endianness,
    pub encoding: Option<String>,
    /// Record types that can hold this one as a field, i.e. what its
    /// `_parent` may be. Empty only for the top-level record.
    pub parents: Vec<usize>,
}

#[derive(Debug)]
pub struct EnumInfo<'s> {
    pub spec: &'s EnumSpec,
    pub schema_name: String,
    pub rust_name: String,
    pub owner: usize,
    pub variants: Vec<VariantInfo>,
    /// Variant holding values without a symbolic name.
    pub catch_all: String,
}

#[derive(Clone, Debug)]
pub struct VariantInfo {
    pub value: i64,
    pub id: String,
    pub rust_name: String,
    pub doc: Option<String>,
}

impl EnumInfo<'_> {
    pub fn variant(&self, id: &str) -> Option<&VariantInfo> {
        self.variants.iter().find(|v| v.id == id)
    }
}

#[derive(Debug)]
pub struct SchemaScope<'s> {
    pub records: Vec<RecordInfo<'s>>,
    pub enums: Vec<EnumInfo<'s>>,
}

impl<'s> SchemaScope<'s> {
    /// Flatten the schema, name every record and enum, and infer parents.
    ///
    /// # Errors
    ///
    /// [`CompileError::DuplicateName`] if two enum literals of one enum
    /// map to the same variant name, and any type resolution error met
    /// while inferring parent links.
    pub fn build(schema: &'s Schema, config: &CompilerConfig) -> Result<Self, CompileError> {
        let mut scope = Self {
            records: Vec::new(),
            enums: Vec::new(),
        };
        scope.flatten(&schema.root, schema.id(), None, config.default_endian, None);
        scope.register_enums()?;
        scope.infer_parents()?;
        Ok(scope)
    }

    fn flatten(
        &mut self,
        spec: &'s TypeSpec,
        name: &str,
        lexical_parent: Option<usize>,
        endian: Endianness,
        encoding: Option<String>,
    ) -> usize {
        let endian = spec.meta.endian.unwrap_or(endian);
        let encoding = spec.meta.encoding.clone().or(encoding);
        let idx = self.records.len();
        self.records.push(RecordInfo {
            spec,
            schema_name: name.to_owned(),
            rust_name: naming::type_name(name),
            lexical_parent,
            children: Vec::new(),
            enums: Vec::new(),
            endian,
            encoding: encoding.clone(),
            parents: Vec::new(),
        });
        for (child_name, child) in &spec.types {
            let child_idx = self.flatten(child, child_name, Some(idx), endian, encoding.clone());
            self.records[idx].children.push((child_name.clone(), child_idx));
        }
        idx
    }

    fn register_enums(&mut self) -> Result<(), CompileError> {
        for owner in 0..self.records.len() {
            let record = &self.records[owner];
            let spec = record.spec;
            let mut owned = Vec::new();
            for (name, enum_spec) in &spec.enums {
                let rust_name = if owner == 0 {
                    naming::type_name(name)
                } else {
                    format!("{}{}", record.rust_name, naming::type_name(name))
                };
                let mut variants: Vec<VariantInfo> = Vec::new();
                for (value, literal) in &enum_spec.values {
                    let rust = naming::variant_name(&literal.id);
                    if let Some(clash) = variants.iter().find(|v| v.rust_name == rust) {
                        return Err(CompileError::DuplicateName {
                            name: format!("{rust_name}::{rust}"),
                            first: clash.id.clone(),
                            second: literal.id.clone(),
                        });
                    }
                    variants.push(VariantInfo {
                        value: *value,
                        id: literal.id.clone(),
                        rust_name: rust,
                        doc: literal.doc.clone(),
                    });
                }
                let catch_all = if variants.iter().any(|v| v.rust_name == "Unknown") {
                    "UnknownValue"
                } else {
                    "Unknown"
                };
                owned.push((name.clone(), self.enums.len()));
                self.enums.push(EnumInfo {
                    spec: enum_spec,
                    schema_name: name.clone(),
                    rust_name,
                    owner,
                    variants,
                    catch_all: catch_all.to_owned(),
                });
            }
            self.records[owner].enums = owned;
        }
        Ok(())
    }

    /// Every attribute of a record: sequence first, then instances.
    pub fn attributes(&self, record: usize) -> impl Iterator<Item = &'s Attribute> + use<'s> {
        let spec = self.records[record].spec;
        spec.seq
            .iter()
            .chain(spec.instances.iter().map(|(_, attr)| attr))
    }

    fn infer_parents(&mut self) -> Result<(), CompileError> {
        let mut users: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); self.records.len()];
        for record in 0..self.records.len() {
            for attr in self.attributes(record) {
                let site = Site {
                    record: &self.records[record].schema_name,
                    field: &attr.id,
                };
                if let Some(ty) = resolve_type(self, record, attr, site)? {
                    for target in referenced_records(&ty) {
                        users[target].insert(record);
                    }
                }
            }
        }
        for (idx, record_users) in users.into_iter().enumerate().skip(1) {
            let record = &mut self.records[idx];
            record.parents = if record_users.is_empty() {
                record.lexical_parent.into_iter().collect()
            } else {
                record_users.into_iter().collect()
            };
            tracing::trace!(record = %record.schema_name, parents = ?record.parents, "inferred parents");
        }
        Ok(())
    }

    /// Record types that can sit `depth` levels above `record`.
    ///
    /// Depth 1 gives the possible `_parent` types, depth 2 the possible
    /// `_parent._parent` types, and so on. The top-level record has no
    /// parents, so chains through it end there.
    pub fn ancestors(&self, record: usize, depth: usize) -> Vec<usize> {
        let mut level = BTreeSet::from([record]);
        for _ in 0..depth {
            level = level
                .iter()
                .flat_map(|r| self.records[*r].parents.iter().copied())
                .collect();
        }
        level.into_iter().collect()
    }

    pub fn root(&self) -> &RecordInfo<'s> {
        &self.records[0]
    }

    fn child(&self, record: usize, name: &str) -> Option<usize> {
        self.records[record]
            .children
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, idx)| *idx)
    }

    /// Resolve a (possibly `::`-qualified) type name as seen from `from`.
    ///
    /// The first segment is looked up among the nested types of `from`,
    /// then of each lexical ancestor; the top-level record also answers
    /// to its own id.
    pub fn lookup_record(&self, from: usize, path: &str) -> Option<usize> {
        let mut segments = path.split("::");
        let first = segments.next()?;
        let mut at = Some(from);
        let mut found = None;
        while let Some(idx) = at {
            if let Some(child) = self.child(idx, first) {
                found = Some(child);
                break;
            }
            at = self.records[idx].lexical_parent;
        }
        let mut current = found.or_else(|| (self.records[0].schema_name == first).then_some(0))?;
        for segment in segments {
            current = self.child(current, segment)?;
        }
        Some(current)
    }

    /// Resolve an enum name (`kind` or `header::kind`) as seen from `from`.
    pub fn lookup_enum(&self, from: usize, path: &str) -> Option<usize> {
        let in_record = |record: usize, name: &str| {
            self.records[record]
                .enums
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, idx)| *idx)
        };
        if let Some((owner, name)) = path.rsplit_once("::") {
            return in_record(self.lookup_record(from, owner)?, name);
        }
        let mut at = Some(from);
        while let Some(idx) = at {
            if let Some(found) = in_record(idx, path) {
                return Some(found);
            }
            at = self.records[idx].lexical_parent;
        }
        None
    }
}

fn referenced_records(ty: &TypeRef) -> Vec<usize> {
    match ty {
        TypeRef::Primitive(_) => Vec::new(),
        TypeRef::UserDefined(idx) => vec![*idx],
        TypeRef::Switch(switch) => switch
            .cases
            .iter()
            .chain(switch.default.as_deref())
            .flat_map(|case| referenced_records(&case.ty))
            .collect(),
    }
}
