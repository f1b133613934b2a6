//! Byte transforms applied to raw field bytes before interpretation.
//!
//! A field's `process` pipeline runs these in declaration order on the
//! bytes the stream produced; the output then feeds the field's type
//! (primitive decode or nested record stream).
//!
//! ```text
//! ┌──────────────┬────────────────────────────────────────────────────┐
//! │ Transform    │ Behavior                                           │
//! ├──────────────┼────────────────────────────────────────────────────┤
//! │ xor(k)       │ every byte XOR the single key byte                 │
//! │ xor([k..])   │ byte i XOR key[i mod key.len()]; empty key = noop  │
//! │ rol(n)       │ rotate each byte left by n mod 8 bits              │
//! │ ror(n)       │ rotate each byte right by n mod 8 bits             │
//! │ zlib         │ inflate a zlib stream (bounded)                    │
//! │ zstd         │ decode a zstd frame (bounded)                      │
//! └──────────────┴────────────────────────────────────────────────────┘
//! ```

use std::io::{Cursor, Read};

use flate2::read::ZlibDecoder;

use crate::error::DecodeError;

/// Upper bound on the output of a single decompression transform.
///
/// Inputs that would inflate beyond this are rejected with
/// [`DecodeError::DecompressionBomb`] before the full output is buffered.
///
/// Default: 64 MiB.
pub const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// XOR every byte with a single key byte.
#[must_use]
pub fn process_xor_one(data: &[u8], key: u8) -> Vec<u8> {
    data.iter().map(|b| b ^ key).collect()
}

/// XOR with a repeating multi-byte key.
///
/// An empty key leaves the data unchanged.
#[must_use]
pub fn process_xor_many(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() {
        return data.to_vec();
    }
    data.iter()
        .zip(key.iter().cycle())
        .map(|(b, k)| b ^ k)
        .collect()
}

#[must_use]
pub fn process_rotate_left(data: &[u8], amount: u32) -> Vec<u8> {
    data.iter().map(|b| b.rotate_left(amount % 8)).collect()
}

#[must_use]
pub fn process_rotate_right(data: &[u8], amount: u32) -> Vec<u8> {
    data.iter().map(|b| b.rotate_right(amount % 8)).collect()
}

/// Inflate a zlib stream.
///
/// # Errors
///
/// - [`DecodeError::DecompressFailed`] if the input is not a valid zlib
///   stream (bad header, corrupt data, truncated input).
/// - [`DecodeError::DecompressionBomb`] if the output would exceed
///   [`MAX_DECOMPRESSED_SIZE`].
pub fn process_zlib(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let out = read_bounded(ZlibDecoder::new(data), MAX_DECOMPRESSED_SIZE)?;
    tracing::debug!(input = data.len(), output = out.len(), "inflated zlib field");
    Ok(out)
}

/// Decode a zstd frame.
///
/// # Errors
///
/// Same conditions as [`process_zlib`].
pub fn process_zstd(data: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let decoder = zstd::stream::read::Decoder::new(Cursor::new(data))
        .map_err(|e| DecodeError::DecompressFailed(e.to_string()))?;
    let out = read_bounded(decoder, MAX_DECOMPRESSED_SIZE)?;
    tracing::debug!(input = data.len(), output = out.len(), "decoded zstd field");
    Ok(out)
}

/// Drain `reader`, failing once more than `limit` bytes come out.
fn read_bounded<R: Read>(reader: R, limit: usize) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    reader
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| DecodeError::DecompressFailed(e.to_string()))?;
    if out.len() > limit {
        return Err(DecodeError::DecompressionBomb { limit });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    use super::*;

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn xor_single_key() {
        assert_eq!(process_xor_one(&[0x10, 0x20], 0xFF), vec![0xEF, 0xDF]);
    }

    #[test]
    fn xor_key_wraps_around() {
        assert_eq!(process_xor_many(&[0x10, 0x20], &[0x01, 0x02]), vec![0x11, 0x22]);
        assert_eq!(
            process_xor_many(&[0x00, 0x00, 0x00], &[0xAA, 0x55]),
            vec![0xAA, 0x55, 0xAA]
        );
    }

    #[test]
    fn xor_empty_key_is_identity() {
        assert_eq!(process_xor_many(&[1, 2, 3], &[]), vec![1, 2, 3]);
    }

    #[test]
    fn rotations_are_per_byte_and_inverse() {
        assert_eq!(process_rotate_left(&[0b1000_0001], 1), vec![0b0000_0011]);
        assert_eq!(process_rotate_right(&[0b0000_0011], 1), vec![0b1000_0001]);
        assert_eq!(process_rotate_left(&[0x12], 8), vec![0x12]);
        let data = [0x01, 0x80, 0x5A];
        assert_eq!(process_rotate_right(&process_rotate_left(&data, 3), 3), data);
    }

    #[test]
    fn zlib_inflates() {
        let packed = deflate(b"hello hello hello");
        assert_eq!(process_zlib(&packed).unwrap(), b"hello hello hello");
    }

    #[test]
    fn zlib_rejects_garbage() {
        assert!(matches!(
            process_zlib(b"definitely not zlib"),
            Err(DecodeError::DecompressFailed(_))
        ));
    }

    #[test]
    fn bounded_read_rejects_oversized_output() {
        let packed = deflate(&[0u8; 4096]);
        let err = read_bounded(ZlibDecoder::new(packed.as_slice()), 100).unwrap_err();
        assert_eq!(err, DecodeError::DecompressionBomb { limit: 100 });
    }

    #[test]
    fn zstd_decodes() {
        let packed = zstd::encode_all(Cursor::new(b"frame payload".to_vec()), 3).unwrap();
        assert_eq!(process_zstd(&packed).unwrap(), b"frame payload");
    }
}
