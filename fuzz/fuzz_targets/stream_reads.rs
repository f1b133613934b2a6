#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ksy_runtime::{Endian, KStream, Origin, Terminator};

// Fuzz target: KStream read and seek primitives.
//
// Replays an arbitrary sequence of stream operations against arbitrary
// bytes. Catches bugs in:
// - Bounds checks on fixed-width and sized reads
// - Terminator search with every include/consume/eos_error combination
// - Sub-view offsets (absolute_pos must never exceed the outer buffer)
// - Positioned reads failing to restore the cursor

#[derive(Arbitrary, Debug)]
enum Op {
    U1,
    U2(bool),
    U4(bool),
    U8(bool),
    F8(bool),
    Bytes(u16),
    Rest,
    Term { term: u8, include: bool, consume: bool, eos_error: bool },
    Sub(u16),
    Seek(i32),
    At(i32),
}

#[derive(Arbitrary, Debug)]
struct Input {
    data: Vec<u8>,
    ops: Vec<Op>,
}

fn endian(big: bool) -> Endian {
    if big { Endian::Big } else { Endian::Little }
}

fuzz_target!(|input: Input| {
    let total = input.data.len() as u64;
    let mut io = KStream::new(input.data);
    for op in input.ops {
        let before = io.pos();
        let ok = match op {
            Op::U1 => io.read_u1().is_ok(),
            Op::U2(big) => io.read_u2(endian(big)).is_ok(),
            Op::U4(big) => io.read_u4(endian(big)).is_ok(),
            Op::U8(big) => io.read_u8(endian(big)).is_ok(),
            Op::F8(big) => io.read_f8(endian(big)).is_ok(),
            Op::Bytes(n) => io.read_bytes(u64::from(n)).is_ok(),
            Op::Rest => io.read_bytes_full().is_ok(),
            Op::Term { term, include, consume, eos_error } => io
                .read_bytes_term(term, Terminator { include, consume, eos_error })
                .is_ok(),
            Op::Sub(n) => match io.substream(u64::from(n)) {
                Ok(sub) => {
                    assert_eq!(sub.size(), u64::from(n));
                    io = sub;
                    true
                }
                Err(_) => false,
            },
            Op::Seek(offset) => io.seek(Origin::Current, i64::from(offset)).is_ok(),
            Op::At(offset) => {
                let _: Result<u8, ksy_runtime::StreamError> =
                    io.at(Origin::Start, i64::from(offset), |io| io.read_u1());
                assert_eq!(io.pos(), before);
                true
            }
        };
        if !ok {
            assert_eq!(io.pos(), before, "failed read moved the cursor");
        }
        assert!(io.pos() <= io.size());
        assert!(io.absolute_pos() <= total);
    }
});
