//! Compiles every schema under `tests/fixtures/` into `OUT_DIR/<stem>.rs`
//! so the decode tests can `include!` the generated decoders and run them
//! against real buffers.

use std::error::Error;
use std::path::PathBuf;
use std::{env, fs};

use ksy_compiler::{Compiler, CompilerConfig};
use ksy_schema::Schema;

fn main() -> Result<(), Box<dyn Error>> {
    let fixtures = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?).join("tests/fixtures");
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    println!("cargo:rerun-if-changed={}", fixtures.display());

    let compiler = Compiler::new(CompilerConfig::default());
    let mut paths = fs::read_dir(&fixtures)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|p| p.extension().is_some_and(|ext| ext == "json"));
    paths.sort();

    for path in paths {
        println!("cargo:rerun-if-changed={}", path.display());
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let schema = Schema::from_path(&path)?;
        let generated = compiler
            .compile(&schema)
            .map_err(|e| format!("{}: {e}", path.display()))?;
        fs::write(out_dir.join(format!("{stem}.rs")), generated.module)?;
    }
    Ok(())
}
