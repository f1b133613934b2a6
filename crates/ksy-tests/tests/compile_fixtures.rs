//! End-to-end compilation of the schema fixtures.
//!
//! Every fixture under `tests/fixtures/` is compiled with the default
//! configuration and the emitted module is parsed with `syn`, so a
//! regression that produces malformed Rust fails here before any
//! downstream crate tries to build the generated decoder. The remaining
//! tests pin the decode strategy chosen for representative fields.

use ksy_compiler::{CompileError, Compiler, CompilerConfig, compile_str};
use ksy_tests::{FIXTURES, compile_fixture, load_fixture};

fn module(name: &str) -> String {
    compile_fixture(name)
        .unwrap_or_else(|e| panic!("fixture {name} failed to compile: {e}"))
        .module
}

fn assert_contains(out: &str, snippets: &[&str]) {
    for snippet in snippets {
        assert!(out.contains(snippet), "missing `{snippet}` in:\n{out}");
    }
}

// ── Every fixture ─────────────────────────────────────────────────────────────

#[test]
fn every_fixture_emits_valid_rust() {
    for name in FIXTURES {
        let out = module(name);
        if let Err(e) = syn::parse_file(&out) {
            panic!("fixture {name} produced invalid Rust: {e}\n{out}");
        }
        assert!(out.starts_with("// @generated by ksy-compiler\n"));
        assert!(out.contains("use ksy_runtime as rt;"));
    }
}

#[test]
fn compilation_is_deterministic() {
    for name in FIXTURES {
        assert_eq!(module(name), module(name), "fixture {name}");
    }
}

#[test]
fn every_record_gets_decode_entry_points() {
    for name in FIXTURES {
        let generated = compile_fixture(name).unwrap();
        let (root, nested) = generated.records.split_first().unwrap();
        assert!(generated.module.contains(&format!("impl rt::Decode for {root} {{")));
        for record in nested {
            assert!(
                generated.module.contains(&format!("impl {record} {{")),
                "{name}: no impl for {record}"
            );
        }
    }
}

// ── Strategies ────────────────────────────────────────────────────────────────

#[test]
fn terminated_strings() {
    let out = module("terminated");
    assert_contains(
        &out,
        &[
            "/// Null-terminated and padded strings.",
            "io.read_bytes_term(0_u8, rt::Terminator { include: false, consume: true, eos_error: true })?",
            "let raw = rt::bytes_strip_right(raw, 32_u8);",
            "let raw = rt::bytes_terminate(raw, 0_u8, false);",
            "io.read_bytes_term(10_u8, rt::Terminator { include: true, consume: false, eos_error: false })?",
            "rt::decode_text(raw, rt::TextEncoding::Ascii)?",
            "io.read_bytes_full()?",
            "pub fn name(&self) -> &str {",
            "pub fn rest(&self) -> &[u8] {",
        ],
    );
}

#[test]
fn repetitions_and_suffix_endianness() {
    let out = module("repetitions");
    assert_contains(
        &out,
        &[
            "pub fn fixed(&self) -> &[u16] {",
            "pub fn until_nine(&self) -> &[u8] {",
            "rt::repeat_expr(io, count, |io: &mut rt::KStream, index: usize|",
            "rt::repeat_until(",
            "rt::repeat_eos(io, |io: &mut rt::KStream, index: usize|",
            "io.read_u2(rt::Endian::Little)?",
            "io.read_u2(rt::Endian::Big)?",
            "total: rt::Lazy<i64>,",
            "pub fn total(&self) -> Result<&i64, rt::DecodeError> {",
        ],
    );
}

#[test]
fn switch_emits_case_enum() {
    let generated = compile_fixture("tagged_switch").unwrap();
    assert_eq!(
        generated.records,
        ["Tagged", "Record", "Point", "LabelBody", "Opaque"]
    );
    assert_eq!(generated.enums, ["Kind", "RecordBody"]);
    assert_contains(
        &generated.module,
        &[
            "rt::ensure_contents(&raw, &[137_u8, 84_u8, 65_u8, 71_u8], \"magic\")?;",
            "Ok(Kind::from(io.read_u1()? as i64))",
            "pub fn body(&self) -> Option<&RecordBody> {",
            "Point::read(&mut sub, &parents.push(self), root)?",
            "pub enum RecordBody {",
            "Point(Box<Point>),",
            "LabelBody(Box<LabelBody>),",
            "Opaque(Box<Opaque>),",
            "/// UTF-8 text.",
            "(255, \"reserved\"),",
        ],
    );
}

#[test]
fn process_pipeline_feeds_nested_record() {
    let out = module("processed");
    assert_contains(
        &out,
        &[
            "rt::process_xor_one(&raw, ",
            "rt::process_xor_many(&raw, ",
            "let raw = rt::process_rotate_left(&raw, 3_u32);",
            "let raw = rt::process_rotate_right(&raw, 1_u32);",
            "let raw = rt::process_zlib(&raw)?;",
            "let mut sub = rt::KStream::new(raw);",
            "Inner::read(&mut sub, &rt::Parents::new(self), self)?",
            "pub fn packed(&self) -> Option<&Inner> {",
            "io.read_u2(rt::Endian::Big)?",
        ],
    );
    let rol = out.find("process_rotate_left").unwrap();
    let ror = out.find("process_rotate_right").unwrap();
    assert!(rol < ror, "pipeline steps must keep declared order");
}

#[test]
fn derived_fields_are_lazy_accessors() {
    let out = module("instances");
    assert_contains(
        &out,
        &[
            "entries: rt::Lazy<Vec<u32>>,",
            "pub fn entries(&self, parents: &rt::Parents<'_>, root: &Indexed) -> Result<&Vec<u32>, rt::DecodeError> {",
            "self.entries.get_or_eval(|| self.parse_entries(parents, root))",
            "let count = rt::count((self.num_entries as i64), \"entries\")?;",
            "let mut stream = self.base.stream();",
            "io.at(rt::Origin::Start, pos, |io: &mut rt::KStream|",
            "io.at(rt::Origin::End, pos, |io: &mut rt::KStream|",
            "io.read_u4(rt::Endian::Big)?",
            "pub fn footer(&self) -> Result<&u32, rt::DecodeError> {",
            "pub fn entry_count(&self) -> Result<&i64, rt::DecodeError> {",
        ],
    );
}

#[test]
fn parent_and_root_are_threaded() {
    let out = module("parent_links");
    assert_contains(
        &out,
        &[
            "pub fn read(io: &mut rt::KStream, parents: &rt::Parents<'_>, root: &Nested) -> Result<Self, rt::DecodeError> {",
            "Row::read(io, &rt::Parents::new(self), self)?",
            "(parents.get::<Nested>(1)?.width as i64)",
            "(root.version as i64)",
            "pub fn rows(&self) -> &[Row] {",
        ],
    );
}

// ── Configuration ─────────────────────────────────────────────────────────────

#[test]
fn docs_can_be_suppressed() {
    let schema = load_fixture("terminated");
    let quiet = Compiler::new(CompilerConfig {
        emit_docs: false,
        ..CompilerConfig::default()
    })
    .compile(&schema)
    .unwrap();
    assert!(!quiet.module.contains("Null-terminated and padded strings."));
    syn::parse_file(&quiet.module).unwrap();
}

#[test]
fn endian_suffix_rule_can_be_disabled() {
    let schema = load_fixture("repetitions");
    let out = Compiler::new(CompilerConfig {
        big_endian_suffix: String::new(),
        ..CompilerConfig::default()
    })
    .compile(&schema)
    .unwrap()
    .module;
    assert!(!out.contains("rt::Endian::Big"));
}

#[test]
fn custom_header_comment() {
    let schema = load_fixture("terminated");
    let out = Compiler::new(CompilerConfig {
        header_comment: "// generated, do not edit".to_owned(),
        ..CompilerConfig::default()
    })
    .compile(&schema)
    .unwrap()
    .module;
    assert!(out.starts_with("// generated, do not edit\n// Source schema: terminated\n"));
}

// ── Compile errors ────────────────────────────────────────────────────────────

#[test]
fn unknown_type_names_record_and_field() {
    let err = compile_str(
        r#"{"meta": {"id": "img"}, "types": {"hdr": {"seq": [{"id": "w", "type": "u3"}]}},
            "seq": [{"id": "h", "type": "hdr"}]}"#,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "hdr.w: unknown type \"u3\"");
}

#[test]
fn repeat_without_count() {
    let err = compile_str(r#"{"meta": {"id": "t"}, "seq": [{"id": "xs", "type": "u1", "repeat": "expr"}]}"#)
        .unwrap_err();
    assert!(matches!(err, CompileError::MissingRepeatExpr { ref field, .. } if field == "xs"));

    let err = compile_str(r#"{"meta": {"id": "t"}, "seq": [{"id": "xs", "type": "u1", "repeat": "until"}]}"#)
        .unwrap_err();
    assert!(matches!(err, CompileError::MissingRepeatUntil { .. }));
}

#[test]
fn unresolved_identifier_and_enum() {
    let err = compile_str(
        r#"{"meta": {"id": "t"}, "seq": [{"id": "data", "size": "missing_len"}]}"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, CompileError::UnresolvedIdentifier { ref field, ref name, .. }
            if field == "data" && name == "missing_len"),
        "{err}"
    );

    let err = compile_str(
        r#"{"meta": {"id": "t"}, "seq": [{"id": "k", "type": "u1", "enum": "nope"}]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::UnresolvedEnum { .. }), "{err}");
}

#[test]
fn grandparents_and_shared_records_are_threaded() {
    let out = module("lineage");
    assert_contains(
        &out,
        &[
            "Group::read(io, &rt::Parents::new(self), self)?",
            "Leaf::read(io, &parents.push(self), root)?",
            "rt::count((parents.get::<Lineage>(2)?.count as i64), \"xs\")?",
            "Ok((parents.get::<Group>(1)?.count as i64))",
            "let up = parents.link(1)?.record();",
            "if let Some(p) = up.downcast_ref::<Lineage>() { (p.count as i64) }",
            "else if let Some(p) = up.downcast_ref::<Group>() { (p.count as i64) }",
            "return Err(rt::DecodeError::ParentMismatch { depth: 1, expected: \"lineage | group\" })",
        ],
    );
}

#[test]
fn parent_member_types_must_agree() {
    let err = compile_str(
        r#"{
            "meta": {"id": "t"},
            "seq": [{"id": "n", "type": "u1"}, {"id": "a", "type": "wrap"}, {"id": "b", "type": "item"}],
            "types": {
                "wrap": {"seq": [{"id": "n", "type": "strz", "encoding": "ASCII"}, {"id": "i", "type": "item"}]},
                "item": {"seq": [{"id": "xs", "type": "u1", "repeat": "expr", "repeat-expr": "_parent.n"}]}
            }
        }"#,
    )
    .unwrap_err();
    assert!(
        matches!(err, CompileError::AmbiguousParent { ref record, ref member, .. }
            if record == "item" && member == "n"),
        "{err}"
    );
}
