use std::io::Read;

use bytes::Bytes;

use crate::error::StreamError;

/// Byte order for multi-byte numeric reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Origin for [`KStream::seek`] and [`KStream::at`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Offset from the first byte of the stream window.
    Start,
    /// Offset from the end of the stream window (usually negative).
    End,
    /// Offset from the current position.
    Current,
}

/// Options for a terminator-delimited read.
///
/// ```text
/// ┌───────────┬─────────┬──────────────────────────────────────────────┐
/// │ Field     │ Default │ Effect                                       │
/// ├───────────┼─────────┼──────────────────────────────────────────────┤
/// │ include   │ false   │ Keep the terminator byte in the result       │
/// │ consume   │ true    │ Advance past the terminator; when false the  │
/// │           │         │ stream is left positioned on it              │
/// │ eos_error │ true    │ Missing terminator is an error; when false   │
/// │           │         │ the rest of the stream is returned           │
/// └───────────┴─────────┴──────────────────────────────────────────────┘
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Terminator {
    pub include: bool,
    pub consume: bool,
    pub eos_error: bool,
}

impl Default for Terminator {
    fn default() -> Self {
        Self {
            include: false,
            consume: true,
            eos_error: true,
        }
    }
}

/// Seekable in-memory byte stream.
///
/// A `KStream` is a window over a shared [`Bytes`] buffer plus a cursor.
/// Cloning is cheap (reference-counted buffer) and produces an
/// independent cursor, which is how derived fields read without moving
/// the position of the stream that decoded their record.
///
/// Sub-views created with [`substream`](Self::substream) cover exactly
/// the requested span: a nested record decoded from one cannot read past
/// its allotted bytes.
///
/// ```text
///   outermost buffer  ┌──────────────────────────────────────────┐
///                     │ 00 01 02 03 04 05 06 07 08 09 0A 0B 0C   │
///                     └──────────────────────────────────────────┘
///   substream(4) @ 3           └──────────┘
///                              base = 3, pos ∈ 0..=4
/// ```
#[derive(Clone, Debug, Default)]
pub struct KStream {
    data: Bytes,
    pos: usize,
    /// Absolute offset of `data[0]` within the outermost buffer.
    base: u64,
}

macro_rules! read_int {
    ($(#[$doc:meta])* $name:ident, $ty:ty) => {
        $(#[$doc])*
        ///
        /// # Errors
        ///
        /// [`StreamError::UnexpectedEof`] if too few bytes remain; the
        /// position is left unchanged in that case.
        pub fn $name(&mut self, endian: Endian) -> Result<$ty, StreamError> {
            let mut raw = [0u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(self.take(std::mem::size_of::<$ty>())?);
            Ok(match endian {
                Endian::Little => <$ty>::from_le_bytes(raw),
                Endian::Big => <$ty>::from_be_bytes(raw),
            })
        }
    };
}

impl KStream {
    /// Create a stream over an in-memory buffer, positioned at offset 0.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            base: 0,
        }
    }

    /// Drain an external reader into a new stream.
    ///
    /// # Errors
    ///
    /// [`StreamError::Io`] if the reader fails.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, StreamError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Self::new(buf))
    }

    /// Current position, relative to the start of this stream window.
    #[must_use]
    pub fn pos(&self) -> u64 {
        self.pos as u64
    }

    /// Current position measured from the start of the outermost buffer.
    #[must_use]
    pub fn absolute_pos(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Total size of this stream window in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Number of unread bytes left in the window.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Move the cursor and return the new position.
    ///
    /// Seeking exactly to the end is allowed (the next read reports
    /// end-of-stream); seeking before the start or past the end is not.
    ///
    /// # Errors
    ///
    /// [`StreamError::SeekOutOfRange`] if the target lies outside `0..=size`.
    pub fn seek(&mut self, origin: Origin, offset: i64) -> Result<u64, StreamError> {
        let anchor = match origin {
            Origin::Start => 0,
            Origin::End => self.data.len() as i64,
            Origin::Current => self.pos as i64,
        };
        let target = anchor.saturating_add(offset);
        if target < 0 || target > self.data.len() as i64 {
            return Err(StreamError::SeekOutOfRange {
                target,
                size: self.size(),
            });
        }
        self.pos = target as usize;
        Ok(self.pos())
    }

    /// Run `read` at another position, then restore the current one.
    ///
    /// The original position is restored on every exit path, including
    /// when `read` fails. A [`Origin::Current`] offset is applied after
    /// rewinding to the stream start, matching the schema convention for
    /// relative `pos` values.
    ///
    /// # Errors
    ///
    /// Whatever the seek or `read` returns.
    pub fn at<T, E, F>(&mut self, origin: Origin, offset: i64, read: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<StreamError>,
    {
        let saved = self.pos;
        if origin == Origin::Current {
            self.pos = 0;
        }
        let result = match self.seek(origin, offset) {
            Ok(_) => read(self),
            Err(err) => Err(E::from(err)),
        };
        self.pos = saved;
        result
    }

    /// Borrow the next `n` bytes and advance past them.
    fn take(&mut self, n: usize) -> Result<&[u8], StreamError> {
        let available = self.remaining();
        if n > available {
            return Err(StreamError::UnexpectedEof {
                offset: self.absolute_pos(),
                requested: n as u64,
                available: available as u64,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..start + n])
    }

    /// Read one unsigned byte.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEof`] at end of stream.
    pub fn read_u1(&mut self) -> Result<u8, StreamError> {
        Ok(self.take(1)?[0])
    }

    /// Read one signed byte.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEof`] at end of stream.
    pub fn read_s1(&mut self) -> Result<i8, StreamError> {
        Ok(i8::from_ne_bytes([self.read_u1()?]))
    }

    read_int!(
        /// Read a 2-byte unsigned integer.
        read_u2, u16
    );
    read_int!(
        /// Read a 4-byte unsigned integer.
        read_u4, u32
    );
    read_int!(
        /// Read an 8-byte unsigned integer.
        read_u8, u64
    );
    read_int!(
        /// Read a 2-byte signed integer.
        read_s2, i16
    );
    read_int!(
        /// Read a 4-byte signed integer.
        read_s4, i32
    );
    read_int!(
        /// Read an 8-byte signed integer.
        read_s8, i64
    );
    read_int!(
        /// Read an IEEE 754 single-precision float.
        read_f4, f32
    );
    read_int!(
        /// Read an IEEE 754 double-precision float.
        read_f8, f64
    );

    /// Read exactly `n` bytes.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEof`] if fewer than `n` bytes remain;
    /// nothing is consumed in that case.
    pub fn read_bytes(&mut self, n: u64) -> Result<Vec<u8>, StreamError> {
        let n = usize::try_from(n).unwrap_or(usize::MAX);
        Ok(self.take(n)?.to_vec())
    }

    /// Read every byte from the current position to the end of the window.
    ///
    /// # Errors
    ///
    /// Never fails today; the `Result` keeps the read API uniform.
    pub fn read_bytes_full(&mut self) -> Result<Vec<u8>, StreamError> {
        let rest = self.remaining();
        Ok(self.take(rest)?.to_vec())
    }

    /// Read bytes up to a terminator.
    ///
    /// Returns the bytes before the terminator, plus the terminator itself
    /// when `opts.include` is set. An immediate terminator yields an empty
    /// run. With `opts.eos_error == false` a missing terminator is not an
    /// error: the remainder of the stream is returned and consumed.
    ///
    /// # Errors
    ///
    /// [`StreamError::MissingTerminator`] if the stream ends first and
    /// `opts.eos_error` is set. Nothing is consumed in that case.
    pub fn read_bytes_term(&mut self, term: u8, opts: Terminator) -> Result<Vec<u8>, StreamError> {
        let start = self.pos;
        let rest = &self.data[start..];
        match rest.iter().position(|&b| b == term) {
            Some(idx) => {
                let end = if opts.include { idx + 1 } else { idx };
                let value = rest[..end].to_vec();
                self.pos = start + idx + usize::from(opts.consume);
                Ok(value)
            }
            None if opts.eos_error => Err(StreamError::MissingTerminator {
                terminator: term,
                offset: self.base + start as u64,
            }),
            None => {
                self.pos = self.data.len();
                Ok(rest.to_vec())
            }
        }
    }

    /// Carve the next `n` bytes into a bounded sub-view and advance past them.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnexpectedEof`] if fewer than `n` bytes remain.
    pub fn substream(&mut self, n: u64) -> Result<Self, StreamError> {
        let n = usize::try_from(n).unwrap_or(usize::MAX);
        let available = self.remaining();
        if n > available {
            return Err(StreamError::UnexpectedEof {
                offset: self.absolute_pos(),
                requested: n as u64,
                available: available as u64,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(Self {
            data: self.data.slice(start..start + n),
            pos: 0,
            base: self.base + start as u64,
        })
    }

    /// Carve everything that remains into a sub-view.
    ///
    /// # Errors
    ///
    /// Never fails today; mirrors [`substream`](Self::substream).
    pub fn substream_full(&mut self) -> Result<Self, StreamError> {
        let rest = self.remaining() as u64;
        self.substream(rest)
    }
}

/// Strip trailing `pad` bytes.
#[must_use]
pub fn bytes_strip_right(mut data: Vec<u8>, pad: u8) -> Vec<u8> {
    while data.last() == Some(&pad) {
        data.pop();
    }
    data
}

/// Cut `data` at the first `term`, keeping the terminator when `include`.
///
/// Used for sized fields that also declare a terminator: the full size is
/// always consumed from the stream, only the value is shortened.
#[must_use]
pub fn bytes_terminate(mut data: Vec<u8>, term: u8, include: bool) -> Vec<u8> {
    if let Some(idx) = data.iter().position(|&b| b == term) {
        data.truncate(if include { idx + 1 } else { idx });
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_honor_byte_order() {
        let mut io = KStream::new(vec![0x01, 0x02, 0x01, 0x02]);
        assert_eq!(io.read_u2(Endian::Little).unwrap(), 0x0201);
        assert_eq!(io.read_u2(Endian::Big).unwrap(), 0x0102);
        assert!(io.is_eof());
    }

    #[test]
    fn signed_and_float_reads() {
        let mut data = vec![0xFF, 0xFE, 0xFF];
        data.extend_from_slice(&1.5f32.to_be_bytes());
        let mut io = KStream::new(data);
        assert_eq!(io.read_s1().unwrap(), -1);
        assert_eq!(io.read_s2(Endian::Little).unwrap(), -2);
        assert!((io.read_f4(Endian::Big).unwrap() - 1.5).abs() < f32::EPSILON);
    }

    #[test]
    fn short_read_is_eof_and_consumes_nothing() {
        let mut io = KStream::new(vec![0xAA, 0xBB, 0xCC]);
        io.read_u1().unwrap();
        let err = io.read_u4(Endian::Little).unwrap_err();
        assert!(err.is_eof());
        assert_eq!(
            err,
            StreamError::UnexpectedEof {
                offset: 1,
                requested: 4,
                available: 2
            }
        );
        assert_eq!(io.pos(), 1);
    }

    #[test]
    fn terminator_excluded_from_value() {
        let mut io = KStream::new(b"abc\0tail".to_vec());
        let value = io.read_bytes_term(0, Terminator::default()).unwrap();
        assert_eq!(value, b"abc");
        assert_eq!(io.pos(), 4);
        assert_eq!(io.read_bytes_full().unwrap(), b"tail");
    }

    #[test]
    fn terminator_included_and_not_consumed() {
        let mut io = KStream::new(b"ab|cd".to_vec());
        let opts = Terminator {
            include: true,
            consume: false,
            eos_error: true,
        };
        assert_eq!(io.read_bytes_term(b'|', opts).unwrap(), b"ab|");
        assert_eq!(io.pos(), 2);
        assert_eq!(io.read_u1().unwrap(), b'|');
    }

    #[test]
    fn empty_run_before_immediate_terminator() {
        let mut io = KStream::new(vec![0x00, 0x41]);
        assert!(io.read_bytes_term(0, Terminator::default()).unwrap().is_empty());
        assert_eq!(io.pos(), 1);
    }

    #[test]
    fn missing_terminator_respects_eos_error() {
        let mut strict = KStream::new(b"abc".to_vec());
        let err = strict.read_bytes_term(0, Terminator::default()).unwrap_err();
        assert!(err.is_eof());
        assert_eq!(strict.pos(), 0);

        let mut lenient = KStream::new(b"abc".to_vec());
        let opts = Terminator {
            eos_error: false,
            ..Terminator::default()
        };
        assert_eq!(lenient.read_bytes_term(0, opts).unwrap(), b"abc");
        assert!(lenient.is_eof());
    }

    #[test]
    fn seek_bounds() {
        let mut io = KStream::new(vec![0; 4]);
        assert_eq!(io.seek(Origin::End, -1).unwrap(), 3);
        assert_eq!(io.seek(Origin::Current, 1).unwrap(), 4);
        assert!(matches!(
            io.seek(Origin::Start, 5),
            Err(StreamError::SeekOutOfRange { target: 5, size: 4 })
        ));
        assert!(io.seek(Origin::Start, -1).is_err());
    }

    #[test]
    fn at_restores_position_on_success_and_failure() {
        let mut io = KStream::new(vec![1, 2, 3, 4]);
        io.read_u1().unwrap();

        let value: Result<u8, StreamError> = io.at(Origin::End, -1, KStream::read_u1);
        assert_eq!(value.unwrap(), 4);
        assert_eq!(io.pos(), 1);

        let failed: Result<u32, StreamError> =
            io.at(Origin::Start, 2, |io| io.read_u4(Endian::Little));
        assert!(failed.unwrap_err().is_eof());
        assert_eq!(io.pos(), 1);
    }

    #[test]
    fn at_current_is_relative_to_stream_start() {
        let mut io = KStream::new(vec![10, 20, 30, 40]);
        io.seek(Origin::Start, 3).unwrap();
        let value: Result<u8, StreamError> = io.at(Origin::Current, 1, KStream::read_u1);
        assert_eq!(value.unwrap(), 20);
        assert_eq!(io.pos(), 3);
    }

    #[test]
    fn substream_is_bounded() {
        let mut io = KStream::new(vec![0, 1, 2, 3, 4, 5]);
        io.read_u1().unwrap();
        let mut sub = io.substream(2).unwrap();
        assert_eq!(io.pos(), 3);
        assert_eq!(sub.size(), 2);
        assert_eq!(sub.read_u1().unwrap(), 1);
        assert_eq!(sub.absolute_pos(), 2);
        let err = sub.read_u2(Endian::Little).unwrap_err();
        assert_eq!(
            err,
            StreamError::UnexpectedEof {
                offset: 2,
                requested: 2,
                available: 1
            }
        );
    }

    #[test]
    fn from_reader_drains_input() {
        let io = KStream::from_reader(&b"xyz"[..]).unwrap();
        assert_eq!(io.size(), 3);
    }

    #[test]
    fn pad_strip_then_terminate() {
        let raw = b"ab\0cd@@@".to_vec();
        let stripped = bytes_strip_right(raw, b'@');
        assert_eq!(stripped, b"ab\0cd");
        assert_eq!(bytes_terminate(stripped.clone(), 0, false), b"ab");
        assert_eq!(bytes_terminate(stripped, 0, true), b"ab\0");
    }
}
