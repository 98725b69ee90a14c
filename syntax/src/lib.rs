#[macro_use]
mod macros;
mod parse;
pub use parse::{parse_sample_sheet, Error};
pub mod ast;
