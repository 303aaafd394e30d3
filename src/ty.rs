//! C types and the size rules between them.
//!
//! `Int` is word sized on this target. Pointer, array and function types own
//! their component types; no interning takes place.

/// Size in bytes of a machine word, and therefore of `int` and pointers.
pub const WORD_SIZE: i64 = 8;

/// Largest object a declaration may create, so frame arithmetic cannot overflow.
pub const MAX_OBJECT_SIZE: i64 = i32::MAX as i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
  Char,
  Int,
  Ptr(Box<Type>),
  Array {
    base: Box<Type>,
    len: i64,
  },
  Func {
    return_ty: Box<Type>,
    params: Vec<Type>,
  },
}

impl Type {
  pub fn pointer_to(base: Type) -> Self {
    Self::Ptr(Box::new(base))
  }

  pub fn array_of(base: Type, len: i64) -> Self {
    Self::Array {
      base: Box::new(base),
      len,
    }
  }

  pub fn func_of(return_ty: Type, params: Vec<Type>) -> Self {
    Self::Func {
      return_ty: Box::new(return_ty),
      params,
    }
  }

  pub fn is_integer(&self) -> bool {
    matches!(self, Self::Char | Self::Int)
  }

  pub fn is_array(&self) -> bool {
    matches!(self, Self::Array { .. })
  }

  pub fn is_func(&self) -> bool {
    matches!(self, Self::Func { .. })
  }

  /// The pointee of a pointer or the element type of an array.
  pub fn base(&self) -> Option<&Type> {
    match self {
      Self::Ptr(base) | Self::Array { base, .. } => Some(base),
      _ => None,
    }
  }

  pub fn size(&self) -> i64 {
    match self {
      Self::Char => 1,
      Self::Int | Self::Ptr(_) => WORD_SIZE,
      Self::Array { base, len } => base.size() * len,
      // Functions are never stored in a frame slot.
      Self::Func { .. } => 0,
    }
  }
}

pub fn pointer_to(base: Type) -> Type {
  Type::pointer_to(base)
}

pub fn array_of(base: Type, len: i64) -> Type {
  Type::array_of(base, len)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scalar_sizes() {
    assert_eq!(Type::Char.size(), 1);
    assert_eq!(Type::Int.size(), 8);
    assert_eq!(pointer_to(Type::Char).size(), 8);
  }

  #[test]
  fn array_size_is_len_times_element() {
    let row = array_of(Type::Int, 3);
    assert_eq!(row.size(), 24);
    let grid = array_of(row.clone(), 2);
    assert_eq!(grid.size(), 48);
    assert_eq!(grid.base(), Some(&row));
    assert_eq!(array_of(Type::Char, 5).size(), 5);
  }

  #[test]
  fn only_char_and_int_are_integers() {
    assert!(Type::Char.is_integer());
    assert!(Type::Int.is_integer());
    assert!(!pointer_to(Type::Int).is_integer());
    assert!(!array_of(Type::Int, 1).is_integer());
    assert!(!Type::func_of(Type::Int, vec![]).is_integer());
  }

  #[test]
  fn base_exists_for_pointers_and_arrays_only() {
    assert_eq!(pointer_to(Type::Char).base(), Some(&Type::Char));
    assert_eq!(array_of(Type::Int, 4).base(), Some(&Type::Int));
    assert_eq!(Type::Int.base(), None);
    assert_eq!(Type::func_of(Type::Int, vec![Type::Int]).base(), None);
  }
}
