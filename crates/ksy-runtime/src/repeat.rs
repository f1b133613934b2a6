//! Repetition drivers shared by generated decoders.
//!
//! All three loops treat end-of-stream while reading an element as a
//! normal stop: the partially read element is discarded, the stream is
//! rewound to where that element began, and the elements collected so
//! far are returned. Any other error aborts the loop and propagates.

use crate::error::DecodeError;
use crate::stream::{KStream, Origin};

/// Outcome of reading one element.
enum Step<T> {
    Item(T),
    Stop,
}

fn step<T, F>(io: &mut KStream, index: usize, read: &mut F) -> Result<Step<T>, DecodeError>
where
    F: FnMut(&mut KStream, usize) -> Result<T, DecodeError>,
{
    let start = io.pos();
    match read(io, index) {
        Ok(item) => Ok(Step::Item(item)),
        Err(err) if err.is_eof() => {
            tracing::trace!(index, offset = start, error = %err, "repetition ended at end of stream");
            io.seek(Origin::Start, start as i64)?;
            Ok(Step::Stop)
        }
        Err(err) => Err(err),
    }
}

/// Read up to `count` elements.
///
/// # Errors
///
/// The first non-end-of-stream error raised by `read`.
pub fn repeat_expr<T, F>(io: &mut KStream, count: usize, mut read: F) -> Result<Vec<T>, DecodeError>
where
    F: FnMut(&mut KStream, usize) -> Result<T, DecodeError>,
{
    let mut items = Vec::with_capacity(count.min(io.remaining()));
    for index in 0..count {
        match step(io, index, &mut read)? {
            Step::Item(item) => items.push(item),
            Step::Stop => break,
        }
    }
    Ok(items)
}

/// Read elements until `until` holds for one of them.
///
/// The element that satisfies the predicate is kept as the last element
/// of the result. The predicate sees the stream positioned just after
/// that element.
///
/// # Errors
///
/// The first non-end-of-stream error raised by `read` or `until`.
pub fn repeat_until<T, F, P>(io: &mut KStream, mut read: F, mut until: P) -> Result<Vec<T>, DecodeError>
where
    F: FnMut(&mut KStream, usize) -> Result<T, DecodeError>,
    P: FnMut(&T, usize, &KStream) -> Result<bool, DecodeError>,
{
    let mut items = Vec::new();
    loop {
        let index = items.len();
        let item = match step(io, index, &mut read)? {
            Step::Item(item) => item,
            Step::Stop => break,
        };
        let done = until(&item, index, io)?;
        items.push(item);
        if done {
            break;
        }
    }
    Ok(items)
}

/// Read elements until the stream is exhausted.
///
/// # Errors
///
/// The first non-end-of-stream error raised by `read`.
pub fn repeat_eos<T, F>(io: &mut KStream, mut read: F) -> Result<Vec<T>, DecodeError>
where
    F: FnMut(&mut KStream, usize) -> Result<T, DecodeError>,
{
    let mut items = Vec::new();
    while !io.is_eof() {
        let before = io.pos();
        match step(io, items.len(), &mut read)? {
            Step::Item(item) => items.push(item),
            Step::Stop => break,
        }
        // An element that consumed nothing would loop forever.
        if io.pos() == before {
            break;
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Endian;

    fn u1(io: &mut KStream, _: usize) -> Result<u8, DecodeError> {
        Ok(io.read_u1()?)
    }

    #[test]
    fn expr_reads_exact_count() {
        let mut io = KStream::new(vec![1, 2, 3, 4]);
        assert_eq!(repeat_expr(&mut io, 3, u1).unwrap(), vec![1, 2, 3]);
        assert_eq!(io.pos(), 3);
    }

    #[test]
    fn expr_zero_reads_nothing() {
        let mut io = KStream::new(vec![1]);
        assert!(repeat_expr(&mut io, 0, u1).unwrap().is_empty());
        assert_eq!(io.pos(), 0);
    }

    #[test]
    fn expr_stops_quietly_at_eof() {
        let mut io = KStream::new(vec![1, 2]);
        assert_eq!(repeat_expr(&mut io, 5, u1).unwrap(), vec![1, 2]);
    }

    #[test]
    fn until_keeps_matching_element() {
        let mut io = KStream::new(vec![5, 9, 7]);
        let items = repeat_until(&mut io, u1, |b, _, _| Ok(*b == 9)).unwrap();
        assert_eq!(items, vec![5, 9]);
        assert_eq!(io.pos(), 2);
    }

    #[test]
    fn until_without_match_ends_at_eof() {
        let mut io = KStream::new(vec![1, 2, 3]);
        let items = repeat_until(&mut io, u1, |_, _, _| Ok(false)).unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[test]
    fn until_predicate_can_check_stream_end() {
        let mut io = KStream::new(vec![1, 2, 3]);
        let items = repeat_until(&mut io, u1, |b, _, io| Ok(*b == 0 || io.is_eof())).unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[test]
    fn eos_discards_partial_element() {
        let mut io = KStream::new(vec![1, 0, 2, 0, 3]);
        let items = repeat_eos(&mut io, |io, _| Ok(io.read_u2(Endian::Little)?)).unwrap();
        assert_eq!(items, vec![1, 2]);
        assert_eq!(io.pos(), 4);
    }

    #[test]
    fn partial_multi_read_element_is_rewound() {
        let mut io = KStream::new(vec![1, 2, 3]);
        let items = repeat_eos(&mut io, |io, _| {
            let a = io.read_u1()?;
            let b = io.read_u1()?;
            Ok((a, b))
        })
        .unwrap();
        assert_eq!(items, vec![(1, 2)]);
        assert_eq!(io.pos(), 2);
    }

    #[test]
    fn index_is_passed_to_reader() {
        let mut io = KStream::new(vec![0; 3]);
        let items = repeat_expr(&mut io, 3, |io, index| {
            io.read_u1()?;
            Ok(index)
        })
        .unwrap();
        assert_eq!(items, vec![0, 1, 2]);
    }

    #[test]
    fn non_eof_errors_propagate() {
        let mut io = KStream::new(vec![1, 2]);
        let result = repeat_eos(&mut io, |_: &mut KStream, _| -> Result<u8, DecodeError> {
            Err(DecodeError::UnsetField { field: "x" })
        });
        assert_eq!(result.unwrap_err(), DecodeError::UnsetField { field: "x" });
    }
}
