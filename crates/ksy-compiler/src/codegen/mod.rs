//! Rust source emission.
//!
//! A compiled schema becomes one self-contained module:
//!
//! ```text
//! // @generated by ksy-compiler
//! // Source schema: <id>
//!
//! use ksy_runtime as rt;
//!
//! pub struct Root { .. }          ← one struct + impl per record, root first
//! impl rt::Decode for Root { .. }
//! pub struct Child { .. }
//! pub enum Kind { .. }            ← schema enums, then switch enums
//! pub enum RootBody { .. }
//! ```

mod enums;
mod field;
mod record;
mod writer;

use ksy_schema::Schema;

use crate::config::CompilerConfig;
use crate::error::CompileError;
use crate::layout::Layout;

use self::writer::CodeWriter;

/// Output of one compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedSource {
    /// Complete module source.
    pub module: String,
    /// Rust names of the generated record structs, top-level record first.
    pub records: Vec<String>,
    /// Rust names of the generated enums (schema enums, then switch enums).
    pub enums: Vec<String>,
}

/// Schema → Rust decoder source compiler.
#[derive(Clone, Debug, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile every record of `schema` into a single module.
    ///
    /// # Errors
    ///
    /// The first [`CompileError`] met. No partial source is returned.
    pub fn compile(&self, schema: &Schema) -> Result<GeneratedSource, CompileError> {
        let layout = Layout::build(schema, &self.config)?;
        let mut w = CodeWriter::new();
        w.line(&self.config.header_comment);
        w.line(format!("// Source schema: {}", schema.id()));
        w.blank();
        w.line(format!("use {} as rt;", self.config.runtime_path));
        w.blank();

        for record in 0..layout.records.len() {
            record::emit(&layout, record, &mut w)?;
        }
        for info in &layout.scope.enums {
            enums::emit_enum(&layout, info, &mut w);
        }
        for switch in 0..layout.switches.len() {
            enums::emit_switch(&layout, switch, &mut w);
        }

        let records = layout.scope.records.iter().map(|r| r.rust_name.clone()).collect();
        let enums = layout
            .scope
            .enums
            .iter()
            .map(|e| e.rust_name.clone())
            .chain(layout.switches.iter().map(|s| s.rust_name.clone()))
            .collect();
        let mut module = w.finish();
        while module.ends_with("\n\n") {
            module.pop();
        }
        tracing::debug!(schema = %schema.id(), bytes = module.len(), "compiled schema");
        Ok(GeneratedSource {
            module,
            records,
            enums,
        })
    }
}

/// Load a JSON schema document and compile it with the default
/// configuration.
///
/// # Errors
///
/// [`CompileError::Schema`] when the document does not load, otherwise
/// the first compile error.
pub fn compile_str(json: &str) -> Result<GeneratedSource, CompileError> {
    let schema = Schema::from_json_str(json)?;
    Compiler::default().compile(&schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_LIKE: &str = r#"{
        "meta": {"id": "chunks", "endian": "be"},
        "doc": "A list of tagged chunks.",
        "seq": [
            {"id": "magic", "contents": [137, "PNG"]},
            {"id": "chunks", "type": "chunk", "repeat": "eos"}
        ],
        "types": {
            "chunk": {
                "seq": [
                    {"id": "len", "type": "u4"},
                    {"id": "kind", "type": "u1", "enum": "kind"},
                    {"id": "body", "size": "len", "type": {
                        "switch-on": "kind",
                        "cases": {"kind::text": "text_body", "_": "raw_body"}
                    }}
                ]
            },
            "text_body": {"seq": [{"id": "value", "type": "str", "size-eos": true, "encoding": "ASCII"}]},
            "raw_body": {"seq": [{"id": "data", "size-eos": true}]}
        },
        "enums": {"kind": {"1": "text", "2": "image"}}
    }"#;

    #[test]
    fn emits_parseable_module() {
        let out = compile_str(PNG_LIKE).unwrap();
        syn::parse_file(&out.module).unwrap();
        assert_eq!(out.records, ["Chunks", "Chunk", "TextBody", "RawBody"]);
        assert_eq!(out.enums, ["Kind", "ChunkBody"]);
        assert!(out.module.starts_with("// @generated by ksy-compiler\n// Source schema: chunks\n"));
        assert!(out.module.contains("use ksy_runtime as rt;"));
        assert!(out.module.contains("/// A list of tagged chunks."));
        assert!(out.module.ends_with("}\n"));
    }

    #[test]
    fn runtime_path_is_configurable() {
        let schema = Schema::from_json_str(r#"{"meta": {"id": "t"}, "seq": [{"id": "a", "type": "u1"}]}"#)
            .unwrap();
        let compiler = Compiler::new(CompilerConfig {
            runtime_path: "crate::rt_support".to_owned(),
            emit_docs: false,
            ..CompilerConfig::default()
        });
        let out = compiler.compile(&schema).unwrap();
        assert!(out.module.contains("use crate::rt_support as rt;"));
        syn::parse_file(&out.module).unwrap();
    }

    #[test]
    fn first_error_aborts() {
        let err = compile_str(
            r#"{"meta": {"id": "t"}, "seq": [
                {"id": "a", "type": "u1"},
                {"id": "b", "type": "missing"}
            ]}"#,
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "t.b: unknown type \"missing\"");
    }

    #[test]
    fn schema_errors_pass_through() {
        let err = compile_str("{ not json").unwrap_err();
        assert!(matches!(err, CompileError::Schema(_)));
    }
}
