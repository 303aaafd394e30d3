//! Shared error utilities used across the compilation pipeline.
//!
//! Diagnostics are kept lightweight on purpose – these routines format
//! messages in a style reminiscent of chibicc, echoing the offending source
//! line and pointing at the offending column with a caret.

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("{line}\n{marker} {message}"))]
  WithLocation {
    line: String,
    marker: String,
    message: String,
  },

  /// A code generator bug rather than a problem with the input program.
  #[snafu(display("internal error: {message}"))]
  Internal { message: String },
}

impl CompileError {
  /// Construct an error anchored at a specific byte offset in the source.
  pub fn at(source: &str, loc: usize, message: impl Into<String>) -> Self {
    let safe_loc = floor_char_boundary(source, loc.min(source.len()));
    let line_start = source[..safe_loc].rfind('\n').map_or(0, |idx| idx + 1);
    let line_end = source[safe_loc..]
      .find('\n')
      .map_or(source.len(), |idx| safe_loc + idx);
    let column = source[line_start..safe_loc].chars().count();
    Self::WithLocation {
      line: source[line_start..line_end].to_string(),
      marker: format!("{}^", " ".repeat(column)),
      message: message.into(),
    }
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::Internal {
      message: message.into(),
    }
  }
}

fn floor_char_boundary(source: &str, mut loc: usize) -> usize {
  while !source.is_char_boundary(loc) {
    loc -= 1;
  }
  loc
}

/// Type errors raised while building typed expression nodes. They carry no
/// position; the parser anchors them at the operator that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Snafu)]
pub enum SemanticError {
  #[snafu(display("invalid operands"))]
  InvalidOperands,
  #[snafu(display("not an lvalue"))]
  NotAnLvalue,
  #[snafu(display("invalid pointer dereference"))]
  InvalidDeref,
}
