//! Per-function symbol bookkeeping.
//!
//! Locals live in a growable vector in declaration order; parameters come
//! first. Expressions refer to a local by its index, and frame offsets are
//! filled in by the code generator once parsing is complete.

use crate::ast::Stmt;
use crate::ty::Type;

/// A local variable or parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obj {
  pub name: String,
  pub ty: Type,
  /// Byte offset from the frame pointer; negative once assigned.
  pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct Function {
  pub name: String,
  /// Number of leading `locals` that are parameters.
  pub param_count: usize,
  pub locals: Vec<Obj>,
  pub body: Vec<Stmt>,
  /// Frame size in bytes, rounded up to 16.
  pub stack_size: i64,
}

impl Function {
  pub fn params(&self) -> &[Obj] {
    &self.locals[..self.param_count]
  }
}

/// Function definitions in source order.
#[derive(Debug, Clone, Default)]
pub struct Program {
  pub functions: Vec<Function>,
}

/// Locals declared so far in the function being parsed.
#[derive(Debug, Default)]
pub struct Scope {
  locals: Vec<Obj>,
}

impl Scope {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a new local and return its index. Redeclaring a name gets a
  /// fresh slot; the older one stays in the frame but is no longer found.
  pub fn declare(&mut self, name: &str, ty: Type) -> usize {
    self.locals.push(Obj {
      name: name.to_string(),
      ty,
      offset: 0,
    });
    self.locals.len() - 1
  }

  /// Most recent declaration of `name`.
  pub fn find(&self, name: &str) -> Option<(usize, &Obj)> {
    self
      .locals
      .iter()
      .enumerate()
      .rev()
      .find(|(_, obj)| obj.name == name)
  }

  pub fn into_locals(self) -> Vec<Obj> {
    self.locals
  }
}
