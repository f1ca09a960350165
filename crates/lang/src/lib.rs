//! The Tarn language: lexer, parser, and a tree-walking evaluator over
//! persistent tables.
//!
//! This crate is deliberately host-agnostic. It knows nothing about
//! sandboxing policy, file loading, or host bindings beyond the generic
//! native calling convention in [`value::Native`]; all of that lives in
//! the embedding layer (`tarn-sandbox`).

pub mod ast;
pub mod budget;
pub mod chunk;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value;

pub use budget::{Budget, Exhausted, Meter};
pub use chunk::{compile, Chunk};
pub use error::ParseError;
pub use eval::{eval_chunk, EvalError, Outcome, MAX_CALL_DEPTH};
pub use value::{Key, Native, ScriptFn, Table, Value};
