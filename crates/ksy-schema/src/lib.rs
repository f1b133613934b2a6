#![warn(clippy::pedantic)]

pub mod attribute;
pub mod error;
pub mod ordered;
pub mod schema;

pub use attribute::{
    Attribute, ContentItem, Contents, Expression, ProcessSpec, Repeat, SwitchSpec, TypeKey, Whence,
};
pub use error::SchemaError;
pub use schema::{EnumLiteral, EnumSpec, Endianness, FileExtension, Meta, Schema, TypeSpec, parse_enum_key};
