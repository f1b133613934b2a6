#![warn(clippy::pedantic)]

pub mod error;
pub mod parents;
pub mod process;
pub mod record;
pub mod repeat;
pub mod stream;

pub use error::{DecodeError, StreamError};
pub use parents::Parents;
pub use process::{
    MAX_DECOMPRESSED_SIZE, process_rotate_left, process_rotate_right, process_xor_many,
    process_xor_one, process_zlib, process_zstd,
};
pub use record::{
    Decode, FieldCategory, FieldInfo, Lazy, LazyState, RecordBase, TextEncoding, at,
    count, decode_text, ensure_contents, first, last, require, size, str_to_int,
};
pub use repeat::{repeat_eos, repeat_expr, repeat_until};
pub use stream::{Endian, KStream, Origin, Terminator, bytes_strip_right, bytes_terminate};
