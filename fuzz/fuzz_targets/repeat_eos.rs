#![no_main]

use libfuzzer_sys::fuzz_target;

use ksy_runtime::{DecodeError, Endian, KStream, repeat_eos, repeat_until};

// Fuzz target: repetition drivers over arbitrary input.
//
// Catches bugs in:
// - End-of-stream during an element not rewinding to the element start
// - Loops that never terminate on zero-length elements
// - Non-EOF errors being swallowed
fuzz_target!(|data: &[u8]| {
    let len = data.len();
    let mut io = KStream::new(data.to_vec());
    let words = repeat_eos(&mut io, |io, _| Ok(io.read_u4(Endian::Big)?)).unwrap();
    assert_eq!(words.len(), len / 4);
    assert_eq!(io.pos() as usize, words.len() * 4);

    let mut io = KStream::new(data.to_vec());
    let items = repeat_until(&mut io, |io, _| Ok(io.read_u1()?), |b, _, _| Ok(*b == 0)).unwrap();
    match data.iter().position(|&b| b == 0) {
        Some(idx) => assert_eq!(items.len(), idx + 1),
        None => assert_eq!(items.len(), len),
    }

    let mut io = KStream::new(data.to_vec());
    let fails = repeat_eos(&mut io, |io, index| -> Result<u8, DecodeError> {
        let b = io.read_u1()?;
        if index == 3 {
            Err(DecodeError::UnsetField { field: "fuzz" })
        } else {
            Ok(b)
        }
    });
    assert_eq!(fails.is_err(), len > 3);
});
