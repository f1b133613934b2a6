use ksy_schema::Endianness;

/// Configuration for the schema compiler.
///
/// ```text
/// ┌───────────────────┬──────────────────────────────┬────────────────────────────────────────┐
/// │ Field             │ Default                      │ Purpose                                │
/// ├───────────────────┼──────────────────────────────┼────────────────────────────────────────┤
/// │ runtime_path      │ ksy_runtime                  │ Path generated code imports as `rt`    │
/// │ default_endian    │ little                       │ Byte order when no record declares one │
/// │ big_endian_suffix │ _be                          │ Field-id suffix forcing big-endian     │
/// │ emit_docs         │ true                         │ Copy schema `doc` into doc comments    │
/// │ header_comment    │ // @generated by ksy-compiler│ First line of the emitted source       │
/// └───────────────────┴──────────────────────────────┴────────────────────────────────────────┘
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Rust path of the runtime crate, e.g. `ksy_runtime` or
    /// `crate::runtime` when the runtime is vendored into a module.
    pub runtime_path: String,

    pub default_endian: Endianness,

    /// Integer and float fields whose schema id ends with this suffix are
    /// read big-endian unless their type spelling names an explicit order.
    /// An empty suffix disables the rule.
    pub big_endian_suffix: String,

    pub emit_docs: bool,

    pub header_comment: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            runtime_path: "ksy_runtime".to_owned(),
            default_endian: Endianness::Little,
            big_endian_suffix: "_be".to_owned(),
            emit_docs: true,
            header_comment: "// @generated by ksy-compiler".to_owned(),
        }
    }
}
