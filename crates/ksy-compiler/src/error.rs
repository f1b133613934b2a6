use ksy_schema::SchemaError;

/// Errors that abort compilation.
///
/// Compilation stops at the first error; no partial source is returned.
/// Every field-level variant names the record and field (schema ids) it
/// was raised for.
///
/// ```text
///   CompileError
///   ├── UnknownType            ← type name is neither primitive nor a declared record
///   ├── MissingRepeatExpr      ← `repeat: expr` without `repeat-expr`
///   ├── MissingRepeatUntil     ← `repeat: until` without `repeat-until`
///   ├── MissingSize            ← byte run / string with no way to know its length
///   ├── UnresolvedIdentifier   ← expression names a field that does not exist
///   ├── UnresolvedEnum         ← enum or enum literal not found
///   ├── InvalidExpression      ← expression does not parse or is ill-typed
///   ├── UnsupportedExpression  ← well-formed, but not expressible in generated code
///   ├── UnsupportedEncoding    ← text encoding other than UTF-8 / ASCII / ISO-8859-1
///   ├── DuplicateName          ← two schema names map to the same Rust name
///   ├── AmbiguousParent        ← `_parent.x` has a different type in each possible parent
///   ├── InvalidProcess         ← bad arguments to a built-in transform
///   └── Schema(SchemaError)    ← from loading the schema document
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("{record}.{field}: unknown type {type_name:?}")]
    UnknownType {
        record: String,
        field: String,
        type_name: String,
    },

    #[error("{record}.{field}: repeat: expr requires repeat-expr")]
    MissingRepeatExpr { record: String, field: String },

    #[error("{record}.{field}: repeat: until requires repeat-until")]
    MissingRepeatUntil { record: String, field: String },

    #[error("{record}.{field}: no size, size-eos, terminator or contents to delimit the field")]
    MissingSize { record: String, field: String },

    #[error("{record}.{field}: unresolved identifier {name:?}")]
    UnresolvedIdentifier {
        record: String,
        field: String,
        name: String,
    },

    #[error("{record}.{field}: unresolved enum reference {name:?}")]
    UnresolvedEnum {
        record: String,
        field: String,
        name: String,
    },

    #[error("{record}.{field}: invalid expression {expr:?}: {reason}")]
    InvalidExpression {
        record: String,
        field: String,
        expr: String,
        reason: String,
    },

    #[error("{record}.{field}: unsupported expression: {reason}")]
    UnsupportedExpression {
        record: String,
        field: String,
        reason: String,
    },

    #[error("{record}.{field}: unsupported text encoding {encoding:?}")]
    UnsupportedEncoding {
        record: String,
        field: String,
        encoding: String,
    },

    #[error("generated name {name} is used by both {first} and {second}")]
    DuplicateName {
        name: String,
        first: String,
        second: String,
    },

    /// `record` is used by several record types, and `member` has a
    /// different type in some of them.
    #[error("{record}.{field}: _parent.{member} has a different type in each record type that uses {record}")]
    AmbiguousParent {
        record: String,
        field: String,
        member: String,
    },

    #[error("{record}.{field}: invalid process {name:?}: {reason}")]
    InvalidProcess {
        record: String,
        field: String,
        name: String,
        reason: String,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Record and field a diagnostic belongs to.
///
/// Threaded through the resolver and translator so that every error
/// can be built without repeating the two names at each call site.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Site<'a> {
    pub record: &'a str,
    pub field: &'a str,
}

impl Site<'_> {
    pub fn unknown_type(self, type_name: &str) -> CompileError {
        CompileError::UnknownType {
            record: self.record.to_owned(),
            field: self.field.to_owned(),
            type_name: type_name.to_owned(),
        }
    }

    pub fn missing_size(self) -> CompileError {
        CompileError::MissingSize {
            record: self.record.to_owned(),
            field: self.field.to_owned(),
        }
    }

    pub fn unresolved(self, name: &str) -> CompileError {
        CompileError::UnresolvedIdentifier {
            record: self.record.to_owned(),
            field: self.field.to_owned(),
            name: name.to_owned(),
        }
    }

    pub fn unresolved_enum(self, name: &str) -> CompileError {
        CompileError::UnresolvedEnum {
            record: self.record.to_owned(),
            field: self.field.to_owned(),
            name: name.to_owned(),
        }
    }

    pub fn invalid(self, expr: &str, reason: impl Into<String>) -> CompileError {
        CompileError::InvalidExpression {
            record: self.record.to_owned(),
            field: self.field.to_owned(),
            expr: expr.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(self, reason: impl Into<String>) -> CompileError {
        CompileError::UnsupportedExpression {
            record: self.record.to_owned(),
            field: self.field.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn ambiguous_parent(self, member: &str) -> CompileError {
        CompileError::AmbiguousParent {
            record: self.record.to_owned(),
            field: self.field.to_owned(),
            member: member.to_owned(),
        }
    }

    pub fn invalid_process(self, name: &str, reason: impl Into<String>) -> CompileError {
        CompileError::InvalidProcess {
            record: self.record.to_owned(),
            field: self.field.to_owned(),
            name: name.to_owned(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_record_and_field() {
        let site = Site {
            record: "png",
            field: "chunks",
        };
        assert_eq!(
            site.unknown_type("chunk").to_string(),
            "png.chunks: unknown type \"chunk\""
        );
        assert_eq!(
            site.ambiguous_parent("len").to_string(),
            "png.chunks: _parent.len has a different type in each record type that uses png"
        );
    }
}
