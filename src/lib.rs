//! Crate root: wires together the compilation pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns typed functions with
//!   their locals.
//! - `ast`, `ty` and `symbol` hold the tree, the type rules and the
//!   per-function symbol data shared by parser and code generator.
//! - `codegen` lays out stack frames and lowers each function into RV64
//!   assembly.
//! - `error` centralises reporting utilities shared by the other modules.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod parser;
pub mod symbol;
pub mod tokenizer;
pub mod ty;

pub use error::{CompileError, CompileResult};
pub use symbol::Program;

/// Lex and parse a translation unit into typed functions.
pub fn compile(source: &str) -> CompileResult<Program> {
  let tokens = tokenizer::tokenize(source)?;
  parser::parse(tokens, source)
}

/// Compile a source string into RV64 assembly.
pub fn generate_assembly(source: &str) -> CompileResult<String> {
  let mut program = compile(source)?;
  codegen::generate(&mut program)
}
