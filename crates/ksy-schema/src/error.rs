use std::path::PathBuf;

/// Errors raised while loading a schema document.
///
/// ```text
/// ┌────────────────┬─────────────────────────────────────────────────┐
/// │ Variant        │ Cause                                           │
/// ├────────────────┼─────────────────────────────────────────────────┤
/// │ Json           │ Document is not valid JSON or has a wrong shape │
/// │ Io             │ Schema file could not be read                   │
/// │ MissingId      │ Top-level `meta.id` absent or empty             │
/// │ InvalidProcess │ `process` spec string is malformed              │
/// │ InvalidEnumKey │ Enum key is not a decimal/hex/binary integer    │
/// └────────────────┴─────────────────────────────────────────────────┘
/// ```
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("malformed schema document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read schema {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema has no meta.id")]
    MissingId,

    #[error("invalid process spec {spec:?}: {reason}")]
    InvalidProcess { spec: String, reason: &'static str },

    #[error("enum key {key:?} is not an integer")]
    InvalidEnumKey { key: String },
}
