//! Decode routine for one field.
//!
//! Each field compiles to one private routine returning the field's
//! storage type. The routine body applies the field's rules in a fixed
//! priority order:
//!
//! ```text
//!   if          → guard; false leaves the field at its default
//!   value       → computed, no stream I/O
//!   pos         → io.at(origin, pos, |io| …) restores the position
//!   repeat      → rt::repeat_expr / repeat_until / repeat_eos
//!   element     → switch | nested record | primitive
//!                   └── primitive: read → pad-right → terminator
//!                                  → process → contents → text
//! ```

use ksy_schema::{Endianness, Repeat, Whence};

use crate::error::{CompileError, Site};
use crate::expr::{IntCast, Translator, Typed, ValueType};
use crate::layout::{Category, FieldLayout, Layout, Slot};
use crate::naming;
use crate::resolve::{Primitive, PrimitiveKind, SwitchRef, TypeRef, text_encoding};

use super::record::parse_params;
use super::writer::CodeWriter;

/// Which kind of routine a field compiles to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Routine {
    /// Decoding a sequence field during construction.
    Parse,
    /// Evaluating a derived field on first access.
    Instance,
}

pub struct FieldEmitter<'a, 's> {
    layout: &'a Layout<'s>,
    record: usize,
    field: &'a FieldLayout<'s>,
    site: Site<'a>,
    routine: Routine,
}

impl<'a, 's> FieldEmitter<'a, 's> {
    pub fn new(layout: &'a Layout<'s>, record: usize, field: &'a FieldLayout<'s>) -> Self {
        let routine = match field.category {
            Category::Sequence => Routine::Parse,
            Category::Instance => Routine::Instance,
        };
        Self {
            layout,
            record,
            field,
            site: Site {
                record: &layout.scope.records[record].schema_name,
                field: &field.id,
            },
            routine,
        }
    }

    fn translator(&self) -> Translator<'a, 's> {
        Translator::new(self.layout, self.record, self.site)
    }

    /// Emit `fn parse_<field>(…) -> Result<T, rt::DecodeError>`.
    pub fn emit_routine(&self, w: &mut CodeWriter) -> Result<(), CompileError> {
        let slot = self.layout.slot(self.record, self.field)?;
        let ty = slot.rust_type(self.layout);
        let params = match self.routine {
            Routine::Parse => format!(
                ", io: &mut rt::KStream{}",
                parse_params(self.layout, self.record)
            ),
            Routine::Instance => parse_params(self.layout, self.record),
        };
        w.open(format!(
            "fn parse_{}(&self{params}) -> Result<{ty}, rt::DecodeError> {{",
            self.field.rust_name
        ));
        if self.routine == Routine::Instance {
            w.line("let mut stream = self.base.stream();");
            w.line("let io = &mut stream;");
        }
        let attr = self.field.attr;
        let tr = self.translator();
        if let Some(cond) = &attr.if_expr {
            let cond = tr.condition(cond.as_str())?;
            w.open(format!("if !({cond}) {{"));
            w.line("return Ok(Default::default());");
            w.close("}");
        }
        if let Some(value) = &attr.value {
            tracing::trace!(record = %self.site.record, field = %self.site.field, "computed value");
            self.emit_value(w, &tr, value.as_str(), &slot)?;
        } else if let Some(pos) = &attr.pos {
            let origin = match attr.whence.unwrap_or_default() {
                Whence::SeekSet => "Start",
                Whence::SeekEnd => "End",
                Whence::SeekCur => "Current",
            };
            tracing::trace!(record = %self.site.record, field = %self.site.field, origin, "positioned read");
            w.line(format!("let pos = {};", tr.integer(pos.as_str(), IntCast::I64)?));
            w.open(format!(
                "io.at(rt::Origin::{origin}, pos, |io: &mut rt::KStream| -> Result<{ty}, rt::DecodeError> {{"
            ));
            self.emit_repeat(w, &slot)?;
            w.close("})");
        } else {
            self.emit_repeat(w, &slot)?;
        }
        w.close("}");
        Ok(())
    }

    fn emit_value(
        &self,
        w: &mut CodeWriter,
        tr: &Translator<'_, '_>,
        src: &str,
        slot: &Slot,
    ) -> Result<(), CompileError> {
        let typed = tr.translate(src)?;
        let owned = tr.owned(&typed, slot)?;
        if self.field.attr.process.is_empty() {
            w.line(format!("Ok({owned})"));
            return Ok(());
        }
        if *slot != Slot::Bytes {
            let name = &self.field.attr.process[0].name;
            return Err(self.site.invalid_process(name, "only byte arrays can be processed"));
        }
        w.line(format!("let raw = {owned};"));
        self.emit_process(w, tr)?;
        w.line("Ok(raw)");
        Ok(())
    }

    fn emit_repeat(&self, w: &mut CodeWriter, slot: &Slot) -> Result<(), CompileError> {
        let attr = self.field.attr;
        let Some(repeat) = attr.repeat else {
            return self.emit_element(w, &self.translator(), false);
        };
        let Slot::Array(elem) = slot else {
            return Err(self.site.unsupported("repeated field without array storage"));
        };
        let elem_ty = elem.rust_type(self.layout);
        let tr = self.translator().in_loop();
        let closure =
            format!("|io: &mut rt::KStream, index: usize| -> Result<{elem_ty}, rt::DecodeError> {{");
        tracing::trace!(record = %self.site.record, field = %self.site.field, ?repeat, "repeated read");
        match repeat {
            Repeat::Expr => {
                let count = attr
                    .repeat_expr
                    .as_ref()
                    .ok_or_else(|| CompileError::MissingRepeatExpr {
                        record: self.site.record.to_owned(),
                        field: self.site.field.to_owned(),
                    })?;
                let count = self.translator().integer(count.as_str(), IntCast::Usize)?;
                w.line(format!("let count = {count};"));
                w.open(format!("rt::repeat_expr(io, count, {closure}"));
                self.emit_element(w, &tr, true)?;
                w.close("})");
            }
            Repeat::Until => {
                let until = attr
                    .repeat_until
                    .as_ref()
                    .ok_or_else(|| CompileError::MissingRepeatUntil {
                        record: self.site.record.to_owned(),
                        field: self.site.field.to_owned(),
                    })?;
                let cond = self
                    .translator()
                    .with_element((**elem).clone())
                    .condition(until.as_str())?;
                w.open("rt::repeat_until(");
                w.line("io,");
                w.open(closure);
                self.emit_element(w, &tr, true)?;
                w.close("},");
                w.line(format!(
                    "|elem: &{elem_ty}, index: usize, io: &rt::KStream| -> Result<bool, rt::DecodeError> {{ Ok({cond}) }},"
                ));
                w.close(")");
            }
            Repeat::Eos => {
                w.open(format!("rt::repeat_eos(io, {closure}"));
                self.emit_element(w, &tr, true)?;
                w.close("})");
            }
        }
        Ok(())
    }

    /// Statements decoding one value, ending in `Ok(..)`.
    fn emit_element(
        &self,
        w: &mut CodeWriter,
        tr: &Translator<'_, '_>,
        in_array: bool,
    ) -> Result<(), CompileError> {
        let Some(ty) = &self.field.ty else {
            return Err(self.site.missing_size());
        };
        match ty {
            TypeRef::Switch(switch) => self.emit_switch(w, tr, switch),
            TypeRef::UserDefined(target) => {
                let value = self.read_record(w, tr, *target)?;
                if in_array {
                    w.line(format!("Ok({value})"));
                } else {
                    w.line(format!("Ok(Some(Box::new({value})))"));
                }
                Ok(())
            }
            TypeRef::Primitive(prim) => {
                let value = self.read_primitive(w, tr, *prim)?;
                match self.field.enum_ref {
                    Some(e) if prim.is_integer() => {
                        let name = &self.layout.scope.enums[e].rust_name;
                        w.line(format!("Ok({name}::from({value} as i64))"));
                    }
                    _ => w.line(format!("Ok({value})")),
                }
                Ok(())
            }
        }
    }

    fn emit_switch(
        &self,
        w: &mut CodeWriter,
        tr: &Translator<'_, '_>,
        switch: &SwitchRef,
    ) -> Result<(), CompileError> {
        let Some(idx) = self.field.switch else {
            return Err(self.site.unsupported("switch without a generated enum"));
        };
        let info = &self.layout.switches[idx];
        let selector = tr.translate(switch.selector.as_str())?;
        let (init, on) = match &selector.ty {
            ValueType::Str => (
                format!("{}.to_owned()", selector.code),
                Typed::new("on.as_str()", ValueType::Str),
            ),
            ValueType::Bytes => (
                format!("{}.to_vec()", selector.code),
                Typed::new("on.as_slice()", ValueType::Bytes),
            ),
            ValueType::Int | ValueType::Float | ValueType::Bool | ValueType::Enum(_) => {
                (selector.code.clone(), Typed::new("on", selector.ty.clone()))
            }
            _ => {
                return Err(self.site.invalid(
                    switch.selector.as_str(),
                    "switch-on must be a number, enum, boolean, string or byte array",
                ));
            }
        };
        w.line(format!("let on = {init};"));
        for (literal, variant) in &info.arms {
            let cond = tr.case_matches(&on, literal)?;
            w.open(format!("if {cond} {{"));
            let value = self.case_value(w, tr, &info.variants[*variant].ty)?;
            w.line(format!(
                "return Ok(Some({}::{}({value})));",
                info.rust_name, info.variants[*variant].rust_name
            ));
            w.close("}");
        }
        if let Some(default) = info.default {
            let value = self.case_value(w, tr, &info.variants[default].ty)?;
            w.line(format!(
                "Ok(Some({}::{}({value})))",
                info.rust_name, info.variants[default].rust_name
            ));
        } else {
            tracing::warn!(
                record = %self.site.record,
                field = %self.site.field,
                "switch has no default case; unmatched values leave the field unset"
            );
            w.line("Ok(None)");
        }
        Ok(())
    }

    fn case_value(
        &self,
        w: &mut CodeWriter,
        tr: &Translator<'_, '_>,
        ty: &TypeRef,
    ) -> Result<String, CompileError> {
        match ty {
            TypeRef::UserDefined(target) => {
                Ok(format!("Box::new({})", self.read_record(w, tr, *target)?))
            }
            TypeRef::Primitive(prim) => self.read_primitive(w, tr, *prim),
            TypeRef::Switch(_) => Err(self.site.unsupported("nested switch types")),
        }
    }

    /// Statements preparing a nested record's stream; returns the call
    /// that decodes it.
    fn read_record(
        &self,
        w: &mut CodeWriter,
        tr: &Translator<'_, '_>,
        target: usize,
    ) -> Result<String, CompileError> {
        let attr = self.field.attr;
        let stream = if !attr.process.is_empty() || attr.terminator.is_some() {
            self.emit_raw(w, tr, false)?;
            self.emit_process(w, tr)?;
            w.line("let mut sub = rt::KStream::new(raw);");
            "&mut sub"
        } else if let Some(size) = &attr.size {
            let size = tr.integer(size.as_str(), IntCast::U64)?;
            w.line(format!("let mut sub = io.substream({size})?;"));
            "&mut sub"
        } else if attr.size_eos {
            w.line("let mut sub = io.substream_full()?;");
            "&mut sub"
        } else {
            "io"
        };
        let scope = &self.layout.scope;
        let name = &scope.records[target].rust_name;
        if target == 0 {
            return Ok(format!("<{name} as rt::Decode>::decode({stream})?"));
        }
        Ok(format!(
            "{name}::read({stream}, {}, {})?",
            tr.child_parents(),
            tr.root_code()
        ))
    }

    /// `let raw = …;` reading the field's byte run, with padding and a
    /// terminator inside a fixed-size run stripped off.
    fn emit_raw(&self, w: &mut CodeWriter, tr: &Translator<'_, '_>, strz: bool) -> Result<(), CompileError> {
        let attr = self.field.attr;
        w.line(format!("let raw = {};", self.raw_read(tr, strz)?));
        if let Some(pad) = &attr.pad_right {
            let pad = tr.integer(pad.as_str(), IntCast::U8)?;
            w.line(format!("let raw = rt::bytes_strip_right(raw, {pad});"));
        }
        if attr.size.is_some() || attr.size_eos {
            if let Some(term) = self.terminator(tr, strz)? {
                let include = attr.include.unwrap_or(false);
                w.line(format!("let raw = rt::bytes_terminate(raw, {term}, {include});"));
            }
        }
        Ok(())
    }

    /// Expression reading the field's raw byte run.
    fn raw_read(&self, tr: &Translator<'_, '_>, strz: bool) -> Result<String, CompileError> {
        let attr = self.field.attr;
        if let Some(size) = &attr.size {
            return Ok(format!("io.read_bytes({})?", tr.integer(size.as_str(), IntCast::U64)?));
        }
        if attr.size_eos {
            return Ok("io.read_bytes_full()?".to_owned());
        }
        if let Some(term) = self.terminator(tr, strz)? {
            return Ok(format!(
                "io.read_bytes_term({term}, rt::Terminator {{ include: {}, consume: {}, eos_error: {} }})?",
                attr.include.unwrap_or(false),
                attr.consume.unwrap_or(true),
                attr.eos_error.unwrap_or(true),
            ));
        }
        if let Some(contents) = &attr.contents {
            return Ok(format!("io.read_bytes({}_u64)?", contents.bytes().len()));
        }
        Err(self.site.missing_size())
    }

    fn terminator(&self, tr: &Translator<'_, '_>, strz: bool) -> Result<Option<String>, CompileError> {
        match &self.field.attr.terminator {
            Some(term) => tr.integer(term.as_str(), IntCast::U8).map(Some),
            None if strz => Ok(Some("0_u8".to_owned())),
            None => Ok(None),
        }
    }

    fn read_primitive(
        &self,
        w: &mut CodeWriter,
        tr: &Translator<'_, '_>,
        prim: Primitive,
    ) -> Result<String, CompileError> {
        let attr = self.field.attr;
        if let Some(method) = prim.read_method() {
            if let Some(spec) = attr.process.first() {
                return Err(self
                    .site
                    .invalid_process(&spec.name, "numeric fields cannot be processed"));
            }
            if matches!(prim.kind, PrimitiveKind::Unsigned(1) | PrimitiveKind::Signed(1)) {
                return Ok(format!("io.{method}()?"));
            }
            let endian = match self.endian(prim) {
                Endianness::Little => "Little",
                Endianness::Big => "Big",
            };
            return Ok(format!("io.{method}(rt::Endian::{endian})?"));
        }
        self.emit_raw(w, tr, prim.kind == PrimitiveKind::StrZ)?;
        self.emit_process(w, tr)?;
        if let Some(contents) = &attr.contents {
            let bytes: Vec<String> = contents.bytes().iter().map(|b| format!("{b}_u8")).collect();
            w.line(format!(
                "rt::ensure_contents(&raw, &[{}], {})?;",
                bytes.join(", "),
                naming::str_literal(&self.field.id)
            ));
        }
        if prim.kind == PrimitiveKind::Bytes {
            return Ok("raw".to_owned());
        }
        let record = &self.layout.scope.records[self.record];
        let encoding = attr
            .encoding
            .as_deref()
            .or(record.encoding.as_deref())
            .unwrap_or("UTF-8");
        let variant = text_encoding(encoding).ok_or_else(|| CompileError::UnsupportedEncoding {
            record: self.site.record.to_owned(),
            field: self.site.field.to_owned(),
            encoding: encoding.to_owned(),
        })?;
        Ok(format!("rt::decode_text(raw, rt::TextEncoding::{variant})?"))
    }

    /// Byte order of a numeric read: the type's own suffix, then the
    /// field-id suffix rule, then the record's byte order.
    fn endian(&self, prim: Primitive) -> Endianness {
        if let Some(endian) = prim.endian {
            return endian;
        }
        let suffix = &self.layout.config.big_endian_suffix;
        if !suffix.is_empty() && self.field.id.ends_with(suffix.as_str()) {
            return Endianness::Big;
        }
        self.layout.scope.records[self.record].endian
    }

    /// `let raw = …;` for each step of the `process` pipeline, in order.
    fn emit_process(&self, w: &mut CodeWriter, tr: &Translator<'_, '_>) -> Result<(), CompileError> {
        for spec in &self.field.attr.process {
            let name = spec.name.as_str();
            let args = &spec.args;
            let arity = |n: usize| {
                if args.len() == n {
                    Ok(())
                } else {
                    Err(self
                        .site
                        .invalid_process(name, format!("expected {n} argument(s), found {}", args.len())))
                }
            };
            let call = match name {
                "xor" => {
                    arity(1)?;
                    let key = tr.translate(args[0].as_str())?;
                    match key.ty {
                        ValueType::Int | ValueType::Enum(_) => format!(
                            "rt::process_xor_one(&raw, {})",
                            tr.integer(args[0].as_str(), IntCast::U8)?
                        ),
                        ValueType::Bytes => format!("rt::process_xor_many(&raw, {})", key.code),
                        _ => {
                            return Err(self
                                .site
                                .invalid_process(name, "key must be a byte or a byte array"));
                        }
                    }
                }
                "rol" | "ror" => {
                    arity(1)?;
                    let amount = tr.integer(args[0].as_str(), IntCast::U32)?;
                    let direction = if name == "rol" { "left" } else { "right" };
                    format!("rt::process_rotate_{direction}(&raw, {amount})")
                }
                "zlib" | "zstd" => {
                    arity(0)?;
                    format!("rt::process_{name}(&raw)?")
                }
                _ => {
                    let mut call_args = vec!["&raw".to_owned()];
                    for arg in args {
                        call_args.push(tr.translate(arg.as_str())?.code);
                    }
                    format!("{}({})?", naming::transform_path(name), call_args.join(", "))
                }
            };
            w.line(format!("let raw = {call};"));
        }
        Ok(())
    }
}
