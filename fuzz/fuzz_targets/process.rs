#![no_main]

use libfuzzer_sys::fuzz_target;

use ksy_runtime::{
    process_rotate_left, process_rotate_right, process_xor_many, process_xor_one, process_zlib,
    process_zstd,
};

// Fuzz target: post-processing transforms.
//
// Catches bugs in:
// - Decompressors panicking or over-allocating on hostile input
// - Rotation and XOR not being exact inverses
fuzz_target!(|data: &[u8]| {
    let _ = process_zlib(data);
    let _ = process_zstd(data);

    let Some((&key, body)) = data.split_first() else {
        return;
    };
    let amount = u32::from(key);
    assert_eq!(process_rotate_right(&process_rotate_left(body, amount), amount), body);
    assert_eq!(process_xor_one(&process_xor_one(body, key), key), body);
    let keys = &data[..data.len().min(4)];
    assert_eq!(process_xor_many(&process_xor_many(body, keys), keys), body);
});
