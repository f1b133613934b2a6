#![no_main]

use libfuzzer_sys::fuzz_target;

// Fuzz target: schema loading and compilation.
//
// Feeds arbitrary text as a JSON schema document. Anything that loads
// must either compile to parseable Rust or fail with a CompileError;
// the compiler must never panic.
fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(generated) = ksy_compiler::compile_str(json) {
        assert!(syn::parse_file(&generated.module).is_ok(), "{}", generated.module);
    }
});
