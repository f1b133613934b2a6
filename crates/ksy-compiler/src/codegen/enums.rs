//! Schema enums and switch-field enums.

use crate::layout::Layout;
use crate::naming;
use crate::scope::EnumInfo;

use super::writer::CodeWriter;

/// Emit a schema enum: one variant per literal plus a catch-all holding
/// values the schema does not name.
///
/// ```text
/// enum kind { 1: png, 2: jpeg }
///
///   Kind::from(1)       == Kind::Png
///   Kind::from(7)       == Kind::Unknown(7)
///   Kind::Png.value()   == 1
///   Kind::Png.symbol()  == Some("png")
/// ```
pub fn emit_enum(layout: &Layout<'_>, info: &EnumInfo<'_>, w: &mut CodeWriter) {
    let name = &info.rust_name;
    let other = &info.catch_all;
    w.line("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]");
    w.open(format!("pub enum {name} {{"));
    for variant in &info.variants {
        if layout.config.emit_docs {
            if let Some(doc) = &variant.doc {
                w.doc(doc);
            }
        }
        w.line(format!("{},", variant.rust_name));
    }
    w.line("/// Value with no symbolic name in the schema.");
    w.line(format!("{other}(i64),"));
    w.close("}");
    w.blank();

    w.open(format!("impl {name} {{"));
    w.open("pub const TABLE: &'static [(i64, &'static str)] = &[");
    for variant in &info.variants {
        w.line(format!("({}, {}),", variant.value, naming::str_literal(&variant.id)));
    }
    w.close("];");
    w.blank();
    w.open("pub fn value(self) -> i64 {");
    w.open("match self {");
    for variant in &info.variants {
        w.line(format!("Self::{} => {},", variant.rust_name, variant.value));
    }
    w.line(format!("Self::{other}(value) => value,"));
    w.close("}");
    w.close("}");
    w.blank();
    w.open("pub fn symbol(self) -> Option<&'static str> {");
    w.open("match self {");
    for variant in &info.variants {
        w.line(format!(
            "Self::{} => Some({}),",
            variant.rust_name,
            naming::str_literal(&variant.id)
        ));
    }
    w.line(format!("Self::{other}(_) => None,"));
    w.close("}");
    w.close("}");
    w.close("}");
    w.blank();

    w.open(format!("impl From<i64> for {name} {{"));
    w.line("#[allow(unreachable_patterns)]");
    w.open("fn from(value: i64) -> Self {");
    w.open("match value {");
    for variant in &info.variants {
        w.line(format!("{} => Self::{},", variant.value, variant.rust_name));
    }
    w.line(format!("other => Self::{other}(other),"));
    w.close("}");
    w.close("}");
    w.close("}");
    w.blank();

    w.open(format!("impl Default for {name} {{"));
    w.open("fn default() -> Self {");
    w.line("Self::from(0)");
    w.close("}");
    w.close("}");
    w.blank();
}

/// Emit the enum holding whichever case a switch field decoded.
pub fn emit_switch(layout: &Layout<'_>, switch: usize, w: &mut CodeWriter) {
    let info = &layout.switches[switch];
    let record = &layout.scope.records[info.record].schema_name;
    w.doc(&format!("Decoded case of `{record}.{}`.", info.field));
    w.line("#[derive(Debug, Clone)]");
    w.open(format!("pub enum {} {{", info.rust_name));
    for variant in &info.variants {
        w.line(format!("{}({}),", variant.rust_name, variant.payload_type(layout)));
    }
    w.close("}");
    w.blank();
}

#[cfg(test)]
mod tests {
    use ksy_schema::Schema;

    use super::*;
    use crate::config::CompilerConfig;

    #[test]
    fn schema_enum() {
        let schema = Schema::from_json_str(
            r#"{"meta": {"id": "t"}, "enums": {"kind": {
                "0x1": {"id": "png", "doc": "Portable."},
                "-2": "unknown"
            }}}"#,
        )
        .unwrap();
        let layout = Layout::build(&schema, &CompilerConfig::default()).unwrap();
        let mut w = CodeWriter::new();
        emit_enum(&layout, &layout.scope.enums[0], &mut w);
        insta::assert_snapshot!(w.finish(), @r#"
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Kind {
            /// Portable.
            Png,
            Unknown,
            /// Value with no symbolic name in the schema.
            UnknownValue(i64),
        }

        impl Kind {
            pub const TABLE: &'static [(i64, &'static str)] = &[
                (1, "png"),
                (-2, "unknown"),
            ];

            pub fn value(self) -> i64 {
                match self {
                    Self::Png => 1,
                    Self::Unknown => -2,
                    Self::UnknownValue(value) => value,
                }
            }

            pub fn symbol(self) -> Option<&'static str> {
                match self {
                    Self::Png => Some("png"),
                    Self::Unknown => Some("unknown"),
                    Self::UnknownValue(_) => None,
                }
            }
        }

        impl From<i64> for Kind {
            #[allow(unreachable_patterns)]
            fn from(value: i64) -> Self {
                match value {
                    1 => Self::Png,
                    -2 => Self::Unknown,
                    other => Self::UnknownValue(other),
                }
            }
        }

        impl Default for Kind {
            fn default() -> Self {
                Self::from(0)
            }
        }
        "#);
    }
}
