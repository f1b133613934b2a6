/// Errors raised by [`KStream`](crate::KStream) reads and seeks.
///
/// End-of-stream is a distinguished condition: generated decoders ask
/// [`StreamError::is_eof`] to decide whether a failed read ends a
/// repetition loop or aborts the whole decode.
///
/// ```text
///   StreamError
///   ├── UnexpectedEof       ← fewer bytes left than the read requested  (eof)
///   ├── MissingTerminator   ← terminator not found before end of stream (eof)
///   ├── SeekOutOfRange      ← seek target outside the stream window
///   └── Io                  ← failure draining an external reader
/// ```
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The read needed more bytes than remain in the stream window.
    ///
    /// `offset` is absolute, measured from the start of the outermost
    /// buffer, so errors raised inside sub-views still point at the
    /// right byte of the original input.
    #[error("unexpected end of stream at offset {offset}: requested {requested} bytes, {available} available")]
    UnexpectedEof {
        offset: u64,
        requested: u64,
        available: u64,
    },

    /// A terminator-delimited read ran off the end of the stream.
    #[error("terminator {terminator:#04X} not found before end of stream (read started at offset {offset})")]
    MissingTerminator { terminator: u8, offset: u64 },

    /// A seek targeted a position before the start or past the end.
    #[error("seek to {target} is outside the stream window of {size} bytes")]
    SeekOutOfRange { target: i64, size: u64 },

    /// The external reader handed to [`KStream::from_reader`](crate::KStream::from_reader) failed.
    #[error("i/o error: {0}")]
    Io(String),
}

impl StreamError {
    /// Whether this error means the stream ran out of bytes.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedEof { .. } | Self::MissingTerminator { .. }
        )
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Errors that abort decoding of a record tree.
///
/// Every generated field routine returns `Result<_, DecodeError>`; the
/// first fatal error short-circuits all later reads through `?` and
/// surfaces at the outermost [`Decode::decode`](crate::Decode::decode)
/// call.
///
/// ```text
///   DecodeError
///   ├── Stream(StreamError)   ← read/seek failure (may be end-of-stream)
///   ├── ContentsMismatch      ← fixed `contents` did not match
///   ├── DecompressFailed      ← zlib/zstd could not inflate the field
///   ├── DecompressionBomb     ← inflated size exceeds MAX_DECOMPRESSED_SIZE
///   ├── InvalidText           ← bytes are not valid in the field encoding
///   ├── UnsetField            ← expression touched a field left unset
///   ├── IndexOutOfRange       ← expression indexed past an array's end
///   ├── InvalidInteger        ← `to_i` on text that is not an integer
///   ├── InvalidSize           ← size or repeat count evaluated negative
///   ├── MissingParent         ← `_parent` chain shorter than the expression needs
///   ├── ParentMismatch        ← ancestor is not one of the expected record types
///   └── Process               ← user transform reported a failure
/// ```
///
/// The type is `Clone` so a memoized derived field that evaluated to an
/// error can hand the same error out on every access.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// A field with fixed `contents` read different bytes.
    #[error("field {field}: expected contents {expected:02X?}, found {actual:02X?}")]
    ContentsMismatch {
        field: &'static str,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },

    #[error("decompression failed: {0}")]
    DecompressFailed(String),

    /// Decompressed data exceeds the safety limit.
    #[error("decompressed size exceeds limit {limit}")]
    DecompressionBomb { limit: usize },

    #[error("field bytes are not valid {encoding}")]
    InvalidText { encoding: &'static str },

    /// An expression dereferenced a nested record that was never decoded,
    /// e.g. because its `if` guard was false.
    #[error("field {field} is unset")]
    UnsetField { field: &'static str },

    #[error("index {index} out of range for field {field} of length {len}")]
    IndexOutOfRange {
        field: &'static str,
        index: i64,
        len: usize,
    },

    #[error("cannot convert {text:?} to an integer")]
    InvalidInteger { text: String },

    /// A `size` or `repeat-expr` evaluated to a value that cannot count
    /// bytes or elements.
    #[error("field {field}: {value} is not a valid size")]
    InvalidSize { field: &'static str, value: i64 },

    /// The ancestor chain handed to a record ends before `depth`.
    #[error("no parent record {depth} level(s) up")]
    MissingParent { depth: usize },

    /// The ancestor at `depth` has a record type the expression cannot use.
    #[error("parent record {depth} level(s) up is not {expected}")]
    ParentMismatch { depth: usize, expected: &'static str },

    /// Reported by a user-supplied `process` transform.
    #[error("process {name} failed: {reason}")]
    Process { name: &'static str, reason: String },
}

impl DecodeError {
    /// Whether this error is an end-of-stream condition.
    ///
    /// Only stream errors can be end-of-stream; everything else is fatal
    /// wherever it occurs.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        match self {
            Self::Stream(err) => err.is_eof(),
            _ => false,
        }
    }
}
