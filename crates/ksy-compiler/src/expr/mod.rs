//! The schema expression language: lexer, parser and translator.

mod ast;
mod lexer;
mod parser;
mod translate;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use parser::{ParseError, parse};
pub use translate::{IntCast, Translator, Typed, ValueType};
