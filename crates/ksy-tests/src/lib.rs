//! Shared helpers for the integration tests and benches.

use std::path::{Path, PathBuf};

use ksy_compiler::{CompileError, Compiler, CompilerConfig, GeneratedSource};
use ksy_schema::Schema;

/// Every schema under `tests/fixtures/`, by file stem.
pub const FIXTURES: &[&str] = &[
    "instances",
    "lineage",
    "parent_links",
    "processed",
    "repetitions",
    "tagged_switch",
    "terminated",
];

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(format!("{name}.json"))
}

/// Load `tests/fixtures/<name>.json`.
///
/// # Panics
///
/// If the fixture is missing or malformed.
pub fn load_fixture(name: &str) -> Schema {
    let path = fixture_path(name);
    Schema::from_path(&path)
        .unwrap_or_else(|e| panic!("failed to load fixture {}: {e}", path.display()))
}

/// Compile a fixture with the default configuration.
///
/// # Errors
///
/// Whatever the compiler reports for the fixture.
pub fn compile_fixture(name: &str) -> Result<GeneratedSource, CompileError> {
    Compiler::new(CompilerConfig::default()).compile(&load_fixture(name))
}
