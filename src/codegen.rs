//! Code generation: lower the typed AST into RV64 assembly.
//!
//! The emitter is a simple stack machine. Every expression leaves its value
//! in `a0`; binary operators park the right operand on the stack while the
//! left one is computed, then pop it into `a1`. Locals live in the frame and
//! are addressed relative to `fp`.
//!
//! Frame layout after the prologue:
//!
//! ```text
//!  fp+8   saved ra
//!  fp+0   saved fp
//!  fp-..  locals, each at a negative offset
//!  sp     fp - stack_size (16-byte aligned)
//! ```

use crate::ast::{BinaryOp, Expr, ExprKind, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::symbol::{Function, Program};
use crate::ty::Type;

/// Argument registers in calling-convention order.
const ARG_REGS: [&str; 8] = ["a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7"];

/// Assign frame offsets to every local and emit assembly for the program.
pub fn generate(program: &mut Program) -> CompileResult<String> {
  assign_lvar_offsets(program);

  let mut codegen = Codegen::default();
  for func in &program.functions {
    codegen.emit_function(func)?;
    log::trace!("emitted `{}`", func.name);
  }
  Ok(codegen.asm)
}

/// Lay out locals downwards from `fp`, each taking its type's size, and
/// round the frame up to 16 bytes.
pub fn assign_lvar_offsets(program: &mut Program) {
  for func in &mut program.functions {
    let mut offset = 0;
    for obj in &mut func.locals {
      offset += obj.ty.size();
      obj.offset = -offset;
    }
    func.stack_size = align_to(offset, 16);
    log::debug!(
      "frame of `{}`: {} locals, {} bytes",
      func.name,
      func.locals.len(),
      func.stack_size
    );
  }
}

/// Round `n` up to the nearest multiple of `align`.
pub fn align_to(n: i64, align: i64) -> i64 {
  (n + align - 1) / align * align
}

fn fits_imm12(value: i64) -> bool {
  (-2048..=2047).contains(&value)
}

#[derive(Default)]
struct Codegen {
  asm: String,
  /// Values currently pushed on the operand stack.
  depth: usize,
  /// Source of unique label suffixes for the whole compilation.
  label_count: usize,
}

impl Codegen {
  fn emit(&mut self, line: &str) {
    self.asm.push_str("  ");
    self.asm.push_str(line);
    self.asm.push('\n');
  }

  fn label(&mut self, name: &str) {
    self.asm.push_str(name);
    self.asm.push_str(":\n");
  }

  fn next_label(&mut self) -> usize {
    self.label_count += 1;
    self.label_count
  }

  /// `rd = rs + imm`, going through `t0` when `imm` does not fit an `addi`.
  fn emit_add_imm(&mut self, rd: &str, rs: &str, imm: i64) {
    if fits_imm12(imm) {
      self.emit(&format!("addi {rd}, {rs}, {imm}"));
    } else {
      self.emit(&format!("li t0, {imm}"));
      self.emit(&format!("add {rd}, {rs}, t0"));
    }
  }

  fn push(&mut self) {
    self.emit("addi sp, sp, -8");
    self.emit("sd a0, 0(sp)");
    self.depth += 1;
  }

  fn pop(&mut self, reg: &str) {
    self.emit(&format!("ld {reg}, 0(sp)"));
    self.emit("addi sp, sp, 8");
    self.depth -= 1;
  }

  /// Load the value `a0` points at. Arrays stay as their address.
  fn load(&mut self, ty: &Type) {
    match ty {
      Type::Array { .. } => {}
      Type::Char => self.emit("lb a0, 0(a0)"),
      _ => self.emit("ld a0, 0(a0)"),
    }
  }

  /// Store `a0` to the address on top of the operand stack.
  fn store(&mut self, ty: &Type) {
    self.pop("a1");
    match ty {
      Type::Char => self.emit("sb a0, 0(a1)"),
      _ => self.emit("sd a0, 0(a1)"),
    }
  }

  fn emit_function(&mut self, func: &Function) -> CompileResult<()> {
    self.emit(&format!(".globl {}", func.name));
    self.emit(".text");
    self.label(&func.name);

    // Prologue
    self.emit("addi sp, sp, -16");
    self.emit("sd ra, 8(sp)");
    self.emit("sd fp, 0(sp)");
    self.emit("mv fp, sp");
    self.emit_add_imm("sp", "sp", -func.stack_size);

    for (reg, param) in ARG_REGS.iter().zip(func.params()) {
      self.emit_add_imm("t1", "fp", param.offset);
      match param.ty {
        Type::Char => self.emit(&format!("sb {reg}, 0(t1)")),
        _ => self.emit(&format!("sd {reg}, 0(t1)")),
      }
    }

    for stmt in &func.body {
      self.check_depth(func)?;
      self.emit_stmt(stmt, func)?;
      self.check_depth(func)?;
    }

    // Epilogue
    self.label(&format!(".L.return.{}", func.name));
    self.emit("mv sp, fp");
    self.emit("ld fp, 0(sp)");
    self.emit("ld ra, 8(sp)");
    self.emit("addi sp, sp, 16");
    self.emit("ret");
    Ok(())
  }

  fn check_depth(&self, func: &Function) -> CompileResult<()> {
    if self.depth != 0 {
      return Err(CompileError::internal(format!(
        "operand stack depth is {} at a statement boundary in `{}`",
        self.depth, func.name
      )));
    }
    Ok(())
  }

  fn emit_stmt(&mut self, stmt: &Stmt, func: &Function) -> CompileResult<()> {
    match stmt {
      Stmt::Expr(expr) => self.emit_expr(expr, func),
      Stmt::Return(expr) => {
        self.emit_expr(expr, func)?;
        self.emit(&format!("j .L.return.{}", func.name));
        Ok(())
      }
      Stmt::Block(stmts) => stmts
        .iter()
        .try_for_each(|stmt| self.emit_stmt(stmt, func)),
      Stmt::If { cond, then, els } => {
        let c = self.next_label();
        self.emit_expr(cond, func)?;
        self.emit(&format!("beqz a0, .L.else.{c}"));
        self.emit_stmt(then, func)?;
        self.emit(&format!("j .L.end.{c}"));
        self.label(&format!(".L.else.{c}"));
        if let Some(els) = els {
          self.emit_stmt(els, func)?;
        }
        self.label(&format!(".L.end.{c}"));
        Ok(())
      }
      Stmt::For {
        init,
        cond,
        inc,
        body,
      } => {
        let c = self.next_label();
        if let Some(init) = init {
          self.emit_stmt(init, func)?;
        }
        self.label(&format!(".L.begin.{c}"));
        match cond {
          Some(cond) => self.emit_expr(cond, func)?,
          None => self.emit("li a0, 1"),
        }
        self.emit(&format!("beqz a0, .L.end.{c}"));
        self.emit_stmt(body, func)?;
        if let Some(inc) = inc {
          self.emit_expr(inc, func)?;
        }
        self.emit(&format!("j .L.begin.{c}"));
        self.label(&format!(".L.end.{c}"));
        Ok(())
      }
    }
  }

  /// Leave the address of an lvalue in `a0`.
  fn emit_addr(&mut self, node: &Expr, func: &Function) -> CompileResult<()> {
    match &node.kind {
      ExprKind::Var(obj) => {
        let offset = func.locals[*obj].offset;
        self.emit_add_imm("a0", "fp", offset);
        Ok(())
      }
      ExprKind::Deref(operand) => self.emit_expr(operand, func),
      _ => Err(CompileError::internal("not an lvalue")),
    }
  }

  /// Leave the value of an expression in `a0`.
  fn emit_expr(&mut self, node: &Expr, func: &Function) -> CompileResult<()> {
    match &node.kind {
      ExprKind::Num(value) => {
        self.emit(&format!("li a0, {value}"));
      }
      ExprKind::Var(_) => {
        self.emit_addr(node, func)?;
        self.load(&node.ty);
      }
      ExprKind::Neg(operand) => {
        self.emit_expr(operand, func)?;
        self.emit("neg a0, a0");
      }
      ExprKind::Addr(operand) => {
        self.emit_addr(operand, func)?;
      }
      ExprKind::Deref(operand) => {
        self.emit_expr(operand, func)?;
        self.load(&node.ty);
      }
      ExprKind::Assign { lhs, rhs } => {
        self.emit_addr(lhs, func)?;
        self.push();
        self.emit_expr(rhs, func)?;
        self.store(&node.ty);
      }
      ExprKind::Call { name, args } => self.emit_call(name, args, func)?,
      ExprKind::Binary { op, lhs, rhs } => {
        self.emit_expr(rhs, func)?;
        self.push();
        self.emit_expr(lhs, func)?;
        self.pop("a1");
        self.emit_binary(*op);
      }
    }
    Ok(())
  }

  /// Left operand in `a0`, right operand in `a1`.
  fn emit_binary(&mut self, op: BinaryOp) {
    match op {
      BinaryOp::Add => self.emit("add a0, a0, a1"),
      BinaryOp::Sub => self.emit("sub a0, a0, a1"),
      BinaryOp::Mul => self.emit("mul a0, a0, a1"),
      BinaryOp::Div => self.emit("div a0, a0, a1"),
      BinaryOp::Eq => {
        self.emit("xor a0, a0, a1");
        self.emit("seqz a0, a0");
      }
      BinaryOp::Ne => {
        self.emit("xor a0, a0, a1");
        self.emit("snez a0, a0");
      }
      BinaryOp::Lt => self.emit("slt a0, a0, a1"),
      // a <= b is !(b < a)
      BinaryOp::Le => {
        self.emit("slt a0, a1, a0");
        self.emit("xori a0, a0, 1");
      }
    }
  }

  fn emit_call(&mut self, name: &str, args: &[Expr], func: &Function) -> CompileResult<()> {
    if args.len() > ARG_REGS.len() {
      return Err(CompileError::internal(format!(
        "call to `{name}` passes {} arguments",
        args.len()
      )));
    }

    for arg in args {
      self.emit_expr(arg, func)?;
      self.push();
    }
    for reg in ARG_REGS[..args.len()].iter().rev() {
      self.pop(reg);
    }

    // Keep sp 16-byte aligned across the call.
    let pad = self.depth % 2 == 1;
    if pad {
      self.emit("addi sp, sp, -8");
    }
    self.emit(&format!("call {name}"));
    if pad {
      self.emit("addi sp, sp, 8");
    }
    Ok(())
  }
}
