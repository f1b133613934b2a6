#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod codegen;
pub mod config;
pub mod error;
pub mod expr;
pub mod layout;
pub mod naming;
pub mod resolve;
pub mod scope;

pub use codegen::{Compiler, GeneratedSource, compile_str};
pub use config::CompilerConfig;
pub use error::CompileError;
