use std::cell::OnceCell;
use std::fmt;

use bytes::Bytes;

use crate::error::DecodeError;
use crate::stream::KStream;

/// Bookkeeping carried by every generated record.
///
/// Holds the record's stream handle (the stream it was decoded from, or
/// the bounded sub-view carved for it) together with the span of bytes
/// its sequence occupied. Derived fields read through a clone of this
/// handle, so evaluating them never moves any caller's stream position.
///
/// Parent and root links are not stored here: generated code passes a
/// [`Parents`](crate::Parents) chain and the root as borrowed parameters
/// to `read` and to every derived-field accessor, so ownership stays
/// strictly top-down.
#[derive(Clone, Debug, Default)]
pub struct RecordBase {
    io: KStream,
    start: u64,
    end: u64,
}

impl RecordBase {
    /// Open a record at the stream's current position.
    #[must_use]
    pub fn begin(io: &KStream) -> Self {
        Self {
            io: io.clone(),
            start: io.pos(),
            end: io.pos(),
        }
    }

    /// Close the record once its last sequence field has been read.
    pub fn finish(&mut self, io: &KStream) {
        self.io = io.clone();
        self.end = io.pos();
    }

    /// Independent cursor over the record's stream, positioned where the
    /// record's sequence ended.
    #[must_use]
    pub fn stream(&self) -> KStream {
        self.io.clone()
    }

    /// Offset of the record's first byte within its stream.
    #[must_use]
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Offset one past the record's last sequence byte.
    #[must_use]
    pub fn end(&self) -> u64 {
        self.end
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Observable state of a [`Lazy`] cell.
#[derive(Debug, PartialEq)]
pub enum LazyState<'a, T> {
    Unevaluated,
    Evaluated(Result<&'a T, &'a DecodeError>),
}

/// Memoized derived field.
///
/// The first call to [`get_or_eval`](Self::get_or_eval) runs the
/// evaluator and caches its outcome, success or failure; later calls
/// return the cached outcome without re-running it. "Not evaluated yet"
/// and "evaluated to an error" are distinct states (see [`LazyState`]).
pub struct Lazy<T> {
    cell: OnceCell<Result<T, DecodeError>>,
}

impl<T> Lazy<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Return the cached value, evaluating it on first access.
    ///
    /// # Errors
    ///
    /// The error the evaluator produced on its one and only run.
    pub fn get_or_eval<F>(&self, eval: F) -> Result<&T, DecodeError>
    where
        F: FnOnce() -> Result<T, DecodeError>,
    {
        match self.cell.get_or_init(eval) {
            Ok(value) => Ok(value),
            Err(err) => Err(err.clone()),
        }
    }

    #[must_use]
    pub fn state(&self) -> LazyState<'_, T> {
        match self.cell.get() {
            None => LazyState::Unevaluated,
            Some(outcome) => LazyState::Evaluated(outcome.as_ref()),
        }
    }

    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T> Default for Lazy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            None => f.write_str("Lazy(<unevaluated>)"),
            Some(outcome) => f.debug_tuple("Lazy").field(outcome).finish(),
        }
    }
}

/// Whether a generated member came from the schema's `seq` or `instances`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldCategory {
    Sequence,
    Instance,
}

/// Maps one generated member back to its schema identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    /// Rust member name as emitted.
    pub name: &'static str,
    /// Identifier exactly as written in the schema.
    pub id: &'static str,
    pub category: FieldCategory,
}

/// Entry point implemented by the outermost generated record.
///
/// The outermost record acts as its own root: nested records decoded
/// from it receive a borrow of it as `root`.
pub trait Decode: Sized {
    /// Decode a record tree starting at the stream's current position.
    ///
    /// # Errors
    ///
    /// The first fatal error raised anywhere in the tree.
    fn decode(io: &mut KStream) -> Result<Self, DecodeError>;

    /// Decode a record tree from an in-memory buffer.
    ///
    /// # Errors
    ///
    /// Same as [`decode`](Self::decode).
    fn from_bytes(data: impl Into<Bytes>) -> Result<Self, DecodeError> {
        let mut io = KStream::new(data);
        Self::decode(&mut io)
    }
}

// ── Expression helpers ──────────────────────────────────────────────

/// Dereference an optional nested record, failing if it was never set.
///
/// # Errors
///
/// [`DecodeError::UnsetField`] when `value` is `None`.
pub fn require<'a, T: ?Sized>(value: Option<&'a T>, field: &'static str) -> Result<&'a T, DecodeError> {
    value.ok_or(DecodeError::UnsetField { field })
}

/// Bounds-checked indexing with an expression-language (signed) index.
///
/// # Errors
///
/// [`DecodeError::IndexOutOfRange`] for negative or too-large indices.
pub fn at<'a, T>(items: &'a [T], index: i64, field: &'static str) -> Result<&'a T, DecodeError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| items.get(i))
        .ok_or(DecodeError::IndexOutOfRange {
            field,
            index,
            len: items.len(),
        })
}

/// # Errors
///
/// [`DecodeError::IndexOutOfRange`] when `items` is empty.
pub fn first<'a, T>(items: &'a [T], field: &'static str) -> Result<&'a T, DecodeError> {
    at(items, 0, field)
}

/// # Errors
///
/// [`DecodeError::IndexOutOfRange`] when `items` is empty.
pub fn last<'a, T>(items: &'a [T], field: &'static str) -> Result<&'a T, DecodeError> {
    items.last().ok_or(DecodeError::IndexOutOfRange {
        field,
        index: -1,
        len: 0,
    })
}

/// Convert an evaluated `size` into a byte count.
///
/// # Errors
///
/// [`DecodeError::InvalidSize`] for negative values.
pub fn size(value: i64, field: &'static str) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::InvalidSize { field, value })
}

/// Convert an evaluated `repeat-expr` into an element count.
///
/// # Errors
///
/// [`DecodeError::InvalidSize`] for negative values or counts that do
/// not fit the platform's `usize`.
pub fn count(value: i64, field: &'static str) -> Result<usize, DecodeError> {
    usize::try_from(value).map_err(|_| DecodeError::InvalidSize { field, value })
}

/// Check bytes read for a fixed-`contents` field.
///
/// # Errors
///
/// [`DecodeError::ContentsMismatch`] if `actual != expected`.
pub fn ensure_contents(actual: &[u8], expected: &[u8], field: &'static str) -> Result<(), DecodeError> {
    if actual == expected {
        Ok(())
    } else {
        Err(DecodeError::ContentsMismatch {
            field,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        })
    }
}

/// Character encodings supported for text fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Ascii,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

impl TextEncoding {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Ascii => "ASCII",
            Self::Latin1 => "ISO-8859-1",
        }
    }
}

/// Decode a byte run into text.
///
/// # Errors
///
/// [`DecodeError::InvalidText`] if the bytes are not valid in `encoding`.
pub fn decode_text(data: Vec<u8>, encoding: TextEncoding) -> Result<String, DecodeError> {
    let invalid = || DecodeError::InvalidText {
        encoding: encoding.name(),
    };
    match encoding {
        TextEncoding::Utf8 => String::from_utf8(data).map_err(|_| invalid()),
        TextEncoding::Ascii if data.is_ascii() => String::from_utf8(data).map_err(|_| invalid()),
        TextEncoding::Ascii => Err(invalid()),
        TextEncoding::Latin1 => Ok(data.into_iter().map(char::from).collect()),
    }
}

/// Parse decimal text (optionally signed, surrounding whitespace ignored).
///
/// # Errors
///
/// [`DecodeError::InvalidInteger`] if `text` is not an integer.
pub fn str_to_int(text: &str) -> Result<i64, DecodeError> {
    text.trim()
        .parse::<i64>()
        .map_err(|_| DecodeError::InvalidInteger {
            text: text.to_owned(),
        })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::stream::Endian;

    #[test]
    fn record_base_tracks_span() {
        let mut io = KStream::new(vec![0; 8]);
        io.read_u2(Endian::Little).unwrap();
        let mut base = RecordBase::begin(&io);
        io.read_u4(Endian::Little).unwrap();
        base.finish(&io);
        assert_eq!((base.start(), base.end(), base.len()), (2, 6, 4));
        assert_eq!(base.stream().pos(), 6);
    }

    #[test]
    fn lazy_evaluates_once() {
        let calls = Cell::new(0);
        let lazy: Lazy<u32> = Lazy::new();
        assert_eq!(lazy.state(), LazyState::Unevaluated);

        let eval = || {
            calls.set(calls.get() + 1);
            Ok(7)
        };
        assert_eq!(*lazy.get_or_eval(eval).unwrap(), 7);
        assert_eq!(*lazy.get_or_eval(|| Ok(99)).unwrap(), 7);
        assert_eq!(calls.get(), 1);
        assert_eq!(lazy.state(), LazyState::Evaluated(Ok(&7)));
    }

    #[test]
    fn lazy_caches_errors_distinctly() {
        let lazy: Lazy<u32> = Lazy::default();
        let err = DecodeError::UnsetField { field: "body" };
        assert_eq!(lazy.get_or_eval(|| Err(err.clone())).unwrap_err(), err);
        assert!(lazy.is_evaluated());
        assert_eq!(lazy.get_or_eval(|| Ok(1)).unwrap_err(), err);
        assert_eq!(lazy.state(), LazyState::Evaluated(Err(&err)));
    }

    #[test]
    fn lazy_derived_read_does_not_move_caller_stream() {
        let mut io = KStream::new(vec![0xAA, 0xBB, 0xCC]);
        io.read_u1().unwrap();
        let mut base = RecordBase::begin(&io);
        base.finish(&io);

        let lazy: Lazy<u8> = Lazy::new();
        let read = || {
            let mut stream = base.stream();
            let value: Result<u8, DecodeError> =
                stream.at(crate::Origin::Start, 2, |io| Ok(io.read_u1()?));
            value
        };
        assert_eq!(*lazy.get_or_eval(read).unwrap(), 0xCC);
        assert_eq!(*lazy.get_or_eval(read).unwrap(), 0xCC);
        assert_eq!(io.pos(), 1);
    }

    #[test]
    fn indexing_helpers() {
        let items = [10, 20, 30];
        assert_eq!(*at(&items, 1, "xs").unwrap(), 20);
        assert_eq!(*first(&items, "xs").unwrap(), 10);
        assert_eq!(*last(&items, "xs").unwrap(), 30);
        assert_eq!(
            at(&items, -1, "xs").unwrap_err(),
            DecodeError::IndexOutOfRange {
                field: "xs",
                index: -1,
                len: 3
            }
        );
        assert!(last::<u8>(&[], "xs").is_err());
    }

    #[test]
    fn negative_sizes_are_rejected() {
        assert_eq!(size(4, "body").unwrap(), 4);
        assert_eq!(count(0, "items").unwrap(), 0);
        assert_eq!(
            size(-1, "body").unwrap_err(),
            DecodeError::InvalidSize { field: "body", value: -1 }
        );
        assert_eq!(
            count(-7, "items").unwrap_err(),
            DecodeError::InvalidSize { field: "items", value: -7 }
        );
    }

    #[test]
    fn require_reports_field() {
        let present = Some(Box::new(5));
        assert_eq!(**require(present.as_ref(), "hdr").unwrap(), 5);
        assert_eq!(
            require::<u8>(None, "hdr").unwrap_err(),
            DecodeError::UnsetField { field: "hdr" }
        );
    }

    #[test]
    fn contents_mismatch_carries_both_sides() {
        assert!(ensure_contents(b"PK", b"PK", "magic").is_ok());
        assert_eq!(
            ensure_contents(b"PX", b"PK", "magic").unwrap_err(),
            DecodeError::ContentsMismatch {
                field: "magic",
                expected: b"PK".to_vec(),
                actual: b"PX".to_vec()
            }
        );
    }

    #[test]
    fn text_encodings() {
        assert_eq!(decode_text(b"hi".to_vec(), TextEncoding::Ascii).unwrap(), "hi");
        assert_eq!(decode_text(vec![0xE9], TextEncoding::Latin1).unwrap(), "é");
        assert!(decode_text(vec![0xE9], TextEncoding::Ascii).is_err());
        assert_eq!(
            decode_text(vec![0xFF], TextEncoding::Utf8).unwrap_err(),
            DecodeError::InvalidText { encoding: "UTF-8" }
        );
    }

    #[test]
    fn text_to_integer() {
        assert_eq!(str_to_int(" -42 ").unwrap(), -42);
        assert!(matches!(
            str_to_int("4x"),
            Err(DecodeError::InvalidInteger { .. })
        ));
    }
}
