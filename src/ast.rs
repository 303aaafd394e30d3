//! Typed syntax tree.
//!
//! Every expression is typed when it is built, so there is no separate
//! annotation pass. The constructors here own the typing table, including
//! the pointer-aware `+`/`-` rules that scale integer operands by the size
//! of the pointee.

use crate::error::SemanticError;
use crate::ty::{Type, pointer_to};

/// Operators that evaluate both operands and then combine them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
}

impl BinaryOp {
  pub fn is_comparison(self) -> bool {
    matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
  Num(i64),
  /// Index into the enclosing function's `locals`.
  Var(usize),
  Neg(Box<Expr>),
  Addr(Box<Expr>),
  Deref(Box<Expr>),
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Assign {
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Call {
    name: String,
    args: Vec<Expr>,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
  pub kind: ExprKind,
  pub ty: Type,
}

pub type ExprResult = Result<Expr, SemanticError>;

impl Expr {
  pub fn number(value: i64) -> Self {
    Self {
      kind: ExprKind::Num(value),
      ty: Type::Int,
    }
  }

  /// Reference to a local; `ty` is the declared type of that local.
  pub fn var(obj: usize, ty: Type) -> Self {
    Self {
      kind: ExprKind::Var(obj),
      ty,
    }
  }

  pub fn call(name: String, args: Vec<Expr>) -> Self {
    Self {
      kind: ExprKind::Call { name, args },
      ty: Type::Int,
    }
  }

  pub fn neg(operand: Expr) -> Self {
    Self {
      ty: operand.ty.clone(),
      kind: ExprKind::Neg(Box::new(operand)),
    }
  }

  /// `&operand`. Taking the address of an array yields a pointer to its
  /// element type.
  pub fn addr(operand: Expr) -> ExprResult {
    if !operand.is_addressable() {
      return Err(SemanticError::NotAnLvalue);
    }
    let ty = match &operand.ty {
      Type::Array { base, .. } => pointer_to((**base).clone()),
      other => pointer_to(other.clone()),
    };
    Ok(Self {
      kind: ExprKind::Addr(Box::new(operand)),
      ty,
    })
  }

  pub fn deref(operand: Expr) -> ExprResult {
    let ty = operand.ty.base().ok_or(SemanticError::InvalidDeref)?.clone();
    Ok(Self {
      kind: ExprKind::Deref(Box::new(operand)),
      ty,
    })
  }

  pub fn assign(lhs: Expr, rhs: Expr) -> ExprResult {
    if !lhs.is_addressable() || lhs.ty.is_array() {
      return Err(SemanticError::NotAnLvalue);
    }
    Ok(Self {
      ty: lhs.ty.clone(),
      kind: ExprKind::Assign {
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
    })
  }

  /// Plain binary node without pointer scaling. Comparisons are `int`;
  /// arithmetic takes the type of its left operand.
  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
    let ty = if op.is_comparison() {
      Type::Int
    } else {
      lhs.ty.clone()
    };
    Self {
      kind: ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
      ty,
    }
  }

  /// `lhs + rhs` with pointer scaling. The pointer operand is moved to the
  /// left before the integer operand is scaled.
  pub fn add(lhs: Expr, rhs: Expr) -> ExprResult {
    if lhs.ty.is_integer() && rhs.ty.is_integer() {
      return Ok(Self::binary(BinaryOp::Add, lhs, rhs));
    }

    let (ptr, int) = match (lhs.ty.base().is_some(), rhs.ty.base().is_some()) {
      (true, false) if rhs.ty.is_integer() => (lhs, rhs),
      (false, true) if lhs.ty.is_integer() => (rhs, lhs),
      _ => return Err(SemanticError::InvalidOperands),
    };
    let scaled = Self::scale(int, &ptr.ty);
    Ok(Self::binary(BinaryOp::Add, ptr, scaled))
  }

  /// `lhs - rhs`: integer difference, pointer minus integer (scaled), or
  /// pointer minus pointer (element distance).
  pub fn sub(lhs: Expr, rhs: Expr) -> ExprResult {
    if lhs.ty.is_integer() && rhs.ty.is_integer() {
      return Ok(Self::binary(BinaryOp::Sub, lhs, rhs));
    }

    let Some(elem_size) = lhs.ty.base().map(Type::size) else {
      return Err(SemanticError::InvalidOperands);
    };

    if rhs.ty.is_integer() {
      let scaled = Self::scale(rhs, &lhs.ty);
      return Ok(Self::binary(BinaryOp::Sub, lhs, scaled));
    }

    if rhs.ty.base().is_some() {
      let mut bytes = Self::binary(BinaryOp::Sub, lhs, rhs);
      bytes.ty = Type::Int;
      return Ok(Self::binary(
        BinaryOp::Div,
        bytes,
        Self::number(elem_size),
      ));
    }

    Err(SemanticError::InvalidOperands)
  }

  fn scale(int: Expr, ptr_ty: &Type) -> Self {
    let elem_size = ptr_ty.base().map_or(1, Type::size);
    Self::binary(BinaryOp::Mul, int, Self::number(elem_size))
  }

  /// Whether the code generator can compute an address for this node.
  pub fn is_addressable(&self) -> bool {
    matches!(self.kind, ExprKind::Var(_) | ExprKind::Deref(_))
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
  Expr(Expr),
  Return(Expr),
  Block(Vec<Stmt>),
  If {
    cond: Expr,
    then: Box<Stmt>,
    els: Option<Box<Stmt>>,
  },
  /// Both `for` and `while`; a `while` loop only has a condition.
  For {
    init: Option<Box<Stmt>>,
    cond: Option<Expr>,
    inc: Option<Expr>,
    body: Box<Stmt>,
  },
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ty::array_of;

  fn int_ptr() -> Expr {
    Expr::var(0, pointer_to(Type::Int))
  }

  #[test]
  fn integer_add_is_unscaled() {
    let node = Expr::add(Expr::number(1), Expr::number(2)).unwrap();
    assert_eq!(
      node,
      Expr::binary(BinaryOp::Add, Expr::number(1), Expr::number(2))
    );
    assert_eq!(node.ty, Type::Int);
  }

  #[test]
  fn int_plus_pointer_is_canonicalised_and_scaled() {
    let node = Expr::add(Expr::number(3), int_ptr()).unwrap();
    let ExprKind::Binary { op, lhs, rhs } = &node.kind else {
      panic!("expected binary node, got {node:?}");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert_eq!(**lhs, int_ptr());
    assert_eq!(
      **rhs,
      Expr::binary(BinaryOp::Mul, Expr::number(3), Expr::number(8))
    );
    assert_eq!(node.ty, pointer_to(Type::Int));
  }

  #[test]
  fn char_array_offsets_scale_by_one() {
    let arr = Expr::var(0, array_of(Type::Char, 4));
    let node = Expr::add(arr, Expr::number(2)).unwrap();
    let ExprKind::Binary { rhs, .. } = &node.kind else {
      panic!("expected binary node");
    };
    assert_eq!(
      **rhs,
      Expr::binary(BinaryOp::Mul, Expr::number(2), Expr::number(1))
    );
  }

  #[test]
  fn pointer_plus_pointer_is_rejected() {
    assert_eq!(
      Expr::add(int_ptr(), int_ptr()),
      Err(SemanticError::InvalidOperands)
    );
  }

  #[test]
  fn pointer_difference_is_element_count() {
    let node = Expr::sub(int_ptr(), Expr::var(1, pointer_to(Type::Int))).unwrap();
    assert_eq!(node.ty, Type::Int);
    let ExprKind::Binary { op, lhs, rhs } = &node.kind else {
      panic!("expected binary node");
    };
    assert_eq!(*op, BinaryOp::Div);
    assert_eq!(lhs.ty, Type::Int);
    assert_eq!(**rhs, Expr::number(8));
  }

  #[test]
  fn pointer_minus_int_scales_and_int_minus_pointer_fails() {
    let node = Expr::sub(int_ptr(), Expr::number(1)).unwrap();
    assert_eq!(node.ty, pointer_to(Type::Int));
    assert_eq!(
      Expr::sub(Expr::number(1), int_ptr()),
      Err(SemanticError::InvalidOperands)
    );
  }

  #[test]
  fn address_of_array_decays_to_element_pointer() {
    let arr = Expr::var(0, array_of(Type::Int, 3));
    let node = Expr::addr(arr).unwrap();
    assert_eq!(node.ty, pointer_to(Type::Int));

    let scalar = Expr::addr(Expr::var(1, Type::Char)).unwrap();
    assert_eq!(scalar.ty, pointer_to(Type::Char));
  }

  #[test]
  fn deref_requires_a_pointee() {
    assert_eq!(Expr::deref(int_ptr()).unwrap().ty, Type::Int);
    let arr = Expr::var(0, array_of(Type::Char, 2));
    assert_eq!(Expr::deref(arr).unwrap().ty, Type::Char);
    assert_eq!(
      Expr::deref(Expr::number(1)),
      Err(SemanticError::InvalidDeref)
    );
  }

  #[test]
  fn assignment_targets_must_be_scalar_lvalues() {
    let arr = Expr::var(0, array_of(Type::Int, 2));
    assert_eq!(
      Expr::assign(arr, Expr::number(1)),
      Err(SemanticError::NotAnLvalue)
    );
    assert_eq!(
      Expr::assign(Expr::number(1), Expr::number(2)),
      Err(SemanticError::NotAnLvalue)
    );
    let ok = Expr::assign(Expr::var(1, Type::Char), Expr::number(65)).unwrap();
    assert_eq!(ok.ty, Type::Char);
  }

  #[test]
  fn comparisons_are_int_and_arithmetic_follows_lhs() {
    let cmp = Expr::binary(BinaryOp::Lt, int_ptr(), int_ptr());
    assert_eq!(cmp.ty, Type::Int);
    let neg = Expr::neg(Expr::var(0, Type::Char));
    assert_eq!(neg.ty, Type::Char);
  }
}
