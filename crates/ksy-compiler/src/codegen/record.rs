//! Struct, constructor and accessors for one record.

use crate::error::CompileError;
use crate::layout::{Category, Layout, Slot};
use crate::naming;

use super::field::FieldEmitter;
use super::writer::CodeWriter;

/// Extra parameters of a nested record's `read`, its field routines and
/// its derived-field accessors. The top-level record takes none: it is
/// its own root and has no parents.
pub(crate) fn parse_params(layout: &Layout<'_>, record: usize) -> String {
    if record == 0 {
        return String::new();
    }
    format!(
        ", parents: &rt::Parents<'_>, root: &{}",
        layout.scope.records[0].rust_name
    )
}

fn parse_args(record: usize) -> &'static str {
    if record == 0 { "" } else { ", parents, root" }
}

/// Return type and body of the getter for a sequence field stored as
/// `slot`. Scalars are returned by value, everything else by reference.
fn getter(layout: &Layout<'_>, slot: &Slot, field: &str) -> (String, String) {
    match slot {
        Slot::Int(_) | Slot::Float(_) | Slot::Bool | Slot::Enum(_) => {
            (slot.rust_type(layout), format!("self.{field}"))
        }
        Slot::Str => ("&str".to_owned(), format!("&self.{field}")),
        Slot::Bytes => ("&[u8]".to_owned(), format!("&self.{field}")),
        Slot::Array(inner) => (format!("&[{}]", inner.rust_type(layout)), format!("&self.{field}")),
        Slot::Element(_) => (format!("&{}", slot.rust_type(layout)), format!("&self.{field}")),
        Slot::Record(r) => (
            format!("Option<&{}>", layout.scope.records[*r].rust_name),
            format!("self.{field}.as_deref()"),
        ),
        Slot::Switch(s) => (
            format!("Option<&{}>", layout.switches[*s].rust_name),
            format!("self.{field}.as_ref()"),
        ),
    }
}

/// Emit the struct and impl blocks of `record`.
pub fn emit(layout: &Layout<'_>, record: usize, w: &mut CodeWriter) -> Result<(), CompileError> {
    let info = &layout.scope.records[record];
    let fields = &layout.records[record];
    let name = &info.rust_name;
    tracing::debug!(
        record = %info.schema_name,
        fields = fields.fields.len(),
        instances = fields.instances.len(),
        endian = ?info.endian,
        "compiling record"
    );

    if layout.config.emit_docs {
        if let Some(doc) = &info.spec.doc {
            w.doc(doc);
        }
    }
    w.line("#[derive(Debug, Clone, Default)]");
    w.open(format!("pub struct {name} {{"));
    w.line("base: rt::RecordBase,");
    for field in &fields.fields {
        let ty = layout.slot(record, field)?.rust_type(layout);
        w.line(format!("{}: {ty},", field.rust_name));
    }
    for field in &fields.instances {
        let ty = layout.slot(record, field)?.rust_type(layout);
        w.line(format!("{}: rt::Lazy<{ty}>,", field.rust_name));
    }
    w.close("}");
    w.blank();

    w.line("#[allow(unused_variables, unused_mut, unused_parens, unreachable_code, clippy::all)]");
    w.open(format!("impl {name} {{"));
    w.line(format!(
        "pub const SCHEMA_ID: &'static str = {};",
        naming::str_literal(&info.schema_name)
    ));
    w.open("pub const FIELDS: &'static [rt::FieldInfo] = &[");
    for field in fields.members() {
        let category = match field.category {
            Category::Sequence => "Sequence",
            Category::Instance => "Instance",
        };
        w.line(format!(
            "rt::FieldInfo {{ name: {}, id: {}, category: rt::FieldCategory::{category} }},",
            naming::str_literal(&field.rust_name),
            naming::str_literal(&field.id)
        ));
    }
    w.close("];");

    let params = parse_params(layout, record);
    let args = parse_args(record);
    if record != 0 {
        w.blank();
        w.line("/// Decode this record from the stream's current position.");
        w.line("/// `parents` lists the enclosing records, nearest first.");
        w.open(format!(
            "pub fn read(io: &mut rt::KStream{params}) -> Result<Self, rt::DecodeError> {{"
        ));
        emit_construct(w, args);
        w.close("}");
    }

    w.blank();
    w.line("/// Stream handle and byte span of the decoded sequence.");
    w.open("pub fn base(&self) -> &rt::RecordBase {");
    w.line("&self.base");
    w.close("}");

    for field in &fields.fields {
        let slot = layout.slot(record, field)?;
        let (ty, body) = getter(layout, &slot, &field.rust_name);
        w.blank();
        if layout.config.emit_docs {
            if let Some(doc) = &field.attr.doc {
                w.doc(doc);
            }
        }
        w.open(format!("pub fn {}(&self) -> {ty} {{", field.rust_name));
        w.line(body);
        w.close("}");
    }

    w.blank();
    w.open(format!(
        "fn read_fields(&mut self, io: &mut rt::KStream{params}) -> Result<(), rt::DecodeError> {{"
    ));
    for field in &fields.fields {
        w.line(format!(
            "self.{0} = self.parse_{0}(io{args})?;",
            field.rust_name
        ));
    }
    w.line("Ok(())");
    w.close("}");

    for field in &fields.fields {
        w.blank();
        FieldEmitter::new(layout, record, field).emit_routine(w)?;
    }

    let accessor_args = args.trim_start_matches(", ");
    for field in &fields.instances {
        let ty = layout.slot(record, field)?.rust_type(layout);
        w.blank();
        if layout.config.emit_docs {
            if let Some(doc) = &field.attr.doc {
                w.doc(doc);
            }
        }
        w.open(format!(
            "pub fn {0}(&self{params}) -> Result<&{ty}, rt::DecodeError> {{",
            field.rust_name
        ));
        w.line(format!(
            "self.{0}.get_or_eval(|| self.parse_{0}({accessor_args}))",
            field.rust_name
        ));
        w.close("}");
        w.blank();
        FieldEmitter::new(layout, record, field).emit_routine(w)?;
    }
    w.close("}");

    if record == 0 {
        w.blank();
        w.open(format!("impl rt::Decode for {name} {{"));
        w.open("fn decode(io: &mut rt::KStream) -> Result<Self, rt::DecodeError> {");
        emit_construct(w, args);
        w.close("}");
        w.close("}");
    }
    w.blank();
    Ok(())
}

fn emit_construct(w: &mut CodeWriter, args: &str) {
    w.open("let mut this = Self {");
    w.line("base: rt::RecordBase::begin(io),");
    w.line("..Self::default()");
    w.close("};");
    w.line(format!("this.read_fields(io{args})?;"));
    w.line("this.base.finish(io);");
    w.line("Ok(this)");
}

#[cfg(test)]
mod tests {
    use ksy_schema::Schema;

    use super::*;
    use crate::config::CompilerConfig;

    fn emit_all(json: &str) -> String {
        let schema = Schema::from_json_str(json).unwrap();
        let layout = Layout::build(&schema, &CompilerConfig::default()).unwrap();
        let mut w = CodeWriter::new();
        for record in 0..layout.records.len() {
            emit(&layout, record, &mut w).unwrap();
        }
        w.finish()
    }

    #[test]
    fn nested_record_threads_parent_and_root() {
        let out = emit_all(
            r#"{
                "meta": {"id": "outer"},
                "seq": [{"id": "n", "type": "u1"}, {"id": "inner", "type": "inner", "size": "n"}],
                "types": {"inner": {
                    "seq": [{"id": "b", "type": "u1"}],
                    "instances": {"sum": {"value": "_parent.n + b"}}
                }}
            }"#,
        );
        assert!(out.contains("    inner: Option<Box<Inner>>,"), "{out}");
        assert!(out.contains(r#"let mut sub = io.substream(rt::size((self.n as i64), "inner")?)?;"#));
        assert!(out.contains("Ok(Some(Box::new(Inner::read(&mut sub, &rt::Parents::new(self), self)?)))"));
        assert!(out.contains(
            "pub fn read(io: &mut rt::KStream, parents: &rt::Parents<'_>, root: &Outer) -> Result<Self, rt::DecodeError> {"
        ));
        assert!(out.contains("self.b = self.parse_b(io, parents, root)?;"));
        assert!(out.contains(
            "pub fn sum(&self, parents: &rt::Parents<'_>, root: &Outer) -> Result<&i64, rt::DecodeError> {"
        ));
        assert!(out.contains("self.sum.get_or_eval(|| self.parse_sum(parents, root))"));
        assert!(out.contains("((parents.get::<Outer>(1)?.n as i64) + (self.b as i64))"));
        assert!(out.contains("impl rt::Decode for Outer {"));
    }

    #[test]
    fn field_table_keeps_schema_ids() {
        let out = emit_all(
            r#"{"meta": {"id": "t"}, "seq": [{"id": "Type", "type": "u1"}],
                "instances": {"loop": {"value": "1"}}}"#,
        );
        assert!(out.contains(
            r#"rt::FieldInfo { name: "type_", id: "Type", category: rt::FieldCategory::Sequence },"#
        ));
        assert!(out.contains(
            r#"rt::FieldInfo { name: "loop_", id: "loop", category: rt::FieldCategory::Instance },"#
        ));
        assert!(out.contains("loop_: rt::Lazy<i64>,"));
    }

    #[test]
    fn sequence_fields_get_getters() {
        let out = emit_all(
            r#"{
                "meta": {"id": "t"},
                "seq": [
                    {"id": "n", "type": "u2"},
                    {"id": "name", "type": "strz", "encoding": "ASCII"},
                    {"id": "raw", "size": 2},
                    {"id": "hdr", "type": "hdr"},
                    {"id": "items", "type": "hdr", "repeat": "expr", "repeat-expr": 2}
                ],
                "types": {"hdr": {"seq": [{"id": "x", "type": "u1"}]}}
            }"#,
        );
        insta::assert_snapshot!(
            out.lines()
                .map(str::trim)
                .filter(|l| l.starts_with("pub fn ") && !l.starts_with("pub fn read") && !l.starts_with("pub fn base"))
                .collect::<Vec<_>>()
                .join("\n"),
            @r"
        pub fn n(&self) -> u16 {
        pub fn name(&self) -> &str {
        pub fn raw(&self) -> &[u8] {
        pub fn hdr(&self) -> Option<&Hdr> {
        pub fn items(&self) -> &[Hdr] {
        pub fn x(&self) -> u8 {
        "
        );
        assert!(out.contains("self.hdr.as_deref()"));
        assert!(!out.contains("pub n: u16"));
    }
}
