//! A tiny RV64 interpreter for the instruction subset the code generator
//! emits, so compiled programs can be run without a cross toolchain.

#![allow(dead_code)]

use std::collections::HashMap;

const MEMORY_SIZE: usize = 1 << 20;
const MEMORY_BASE: i64 = 0x1000_0000;
/// Return address handed to `main`; returning to it halts the machine.
const HALT: i64 = -1;
const STEP_LIMIT: usize = 10_000_000;

#[derive(Debug, Clone)]
enum Inst {
  Li(usize, i64),
  Addi(usize, usize, i64),
  Xori(usize, usize, i64),
  Op(&'static str, usize, usize, usize),
  Seqz(usize, usize),
  Snez(usize, usize),
  Neg(usize, usize),
  Mv(usize, usize),
  Load { width: u8, rd: usize, base: usize, offset: i64 },
  Store { width: u8, rs: usize, base: usize, offset: i64 },
  Beqz(usize, String),
  J(String),
  Call(String),
  Ret,
}

fn reg(name: &str) -> usize {
  match name {
    "zero" => 0,
    "ra" => 1,
    "sp" => 2,
    "t0" => 5,
    "t1" => 6,
    "t2" => 7,
    "fp" | "s0" => 8,
    "a0" => 10,
    "a1" => 11,
    "a2" => 12,
    "a3" => 13,
    "a4" => 14,
    "a5" => 15,
    "a6" => 16,
    "a7" => 17,
    other => panic!("unknown register {other}"),
  }
}

fn imm(text: &str) -> i64 {
  text
    .parse()
    .unwrap_or_else(|_| panic!("bad immediate {text}"))
}

/// Split `off(reg)` into its parts.
fn mem_operand(text: &str) -> (i64, usize) {
  let (offset, rest) = text.split_once('(').expect("memory operand");
  (imm(offset), reg(rest.trim_end_matches(')')))
}

fn decode(mnemonic: &str, ops: &[&str]) -> Inst {
  let op3 = |name: &'static str| Inst::Op(name, reg(ops[0]), reg(ops[1]), reg(ops[2]));
  match mnemonic {
    "li" => Inst::Li(reg(ops[0]), imm(ops[1])),
    "addi" => Inst::Addi(reg(ops[0]), reg(ops[1]), imm(ops[2])),
    "xori" => Inst::Xori(reg(ops[0]), reg(ops[1]), imm(ops[2])),
    "add" => op3("add"),
    "sub" => op3("sub"),
    "mul" => op3("mul"),
    "div" => op3("div"),
    "xor" => op3("xor"),
    "slt" => op3("slt"),
    "seqz" => Inst::Seqz(reg(ops[0]), reg(ops[1])),
    "snez" => Inst::Snez(reg(ops[0]), reg(ops[1])),
    "neg" => Inst::Neg(reg(ops[0]), reg(ops[1])),
    "mv" => Inst::Mv(reg(ops[0]), reg(ops[1])),
    "ld" | "lb" => {
      let (offset, base) = mem_operand(ops[1]);
      let width = if mnemonic == "ld" { 8 } else { 1 };
      Inst::Load {
        width,
        rd: reg(ops[0]),
        base,
        offset,
      }
    }
    "sd" | "sb" => {
      let (offset, base) = mem_operand(ops[1]);
      let width = if mnemonic == "sd" { 8 } else { 1 };
      Inst::Store {
        width,
        rs: reg(ops[0]),
        base,
        offset,
      }
    }
    "beqz" => Inst::Beqz(reg(ops[0]), ops[1].to_string()),
    "j" => Inst::J(ops[0].to_string()),
    "call" => Inst::Call(ops[0].to_string()),
    "ret" => Inst::Ret,
    other => panic!("unsupported instruction {other}"),
  }
}

pub struct Machine {
  code: Vec<Inst>,
  labels: HashMap<String, usize>,
  regs: [i64; 32],
  memory: Vec<u8>,
  /// Lowest stack pointer observed, for overflow checks.
  pub min_sp: i64,
  /// Whether every `call` happened with a 16-byte aligned `sp`.
  pub aligned_calls: bool,
}

impl Machine {
  pub fn load(asm: &str) -> Self {
    let mut code = Vec::new();
    let mut labels = HashMap::new();
    for line in asm.lines().map(str::trim).filter(|line| !line.is_empty()) {
      if let Some(label) = line.strip_suffix(':') {
        labels.insert(label.to_string(), code.len());
        continue;
      }
      if line.starts_with('.') {
        continue;
      }
      let (mnemonic, rest) = line.split_once(' ').unwrap_or((line, ""));
      let ops: Vec<&str> = rest
        .split(',')
        .map(str::trim)
        .filter(|op| !op.is_empty())
        .collect();
      code.push(decode(mnemonic, &ops));
    }

    Self {
      code,
      labels,
      regs: [0; 32],
      memory: vec![0; MEMORY_SIZE],
      min_sp: MEMORY_BASE + MEMORY_SIZE as i64,
      aligned_calls: true,
    }
  }

  fn target(&self, label: &str) -> usize {
    *self
      .labels
      .get(label)
      .unwrap_or_else(|| panic!("undefined label {label}"))
  }

  fn index(&self, addr: i64, width: u8) -> usize {
    let idx = addr - MEMORY_BASE;
    assert!(
      idx >= 0 && idx as usize + width as usize <= MEMORY_SIZE,
      "memory access out of bounds: {addr:#x}"
    );
    idx as usize
  }

  fn set(&mut self, rd: usize, value: i64) {
    if rd != 0 {
      self.regs[rd] = value;
    }
  }

  /// Run from `main` until it returns, yielding `a0`.
  pub fn run_main(&mut self) -> i64 {
    self.regs[reg("sp")] = MEMORY_BASE + MEMORY_SIZE as i64;
    self.regs[reg("ra")] = HALT;
    let mut pc = self.target("main");

    for _ in 0..STEP_LIMIT {
      let inst = self.code[pc].clone();
      pc += 1;
      match inst {
        Inst::Li(rd, value) => self.set(rd, value),
        Inst::Addi(rd, rs, value) => self.set(rd, self.regs[rs].wrapping_add(value)),
        Inst::Xori(rd, rs, value) => self.set(rd, self.regs[rs] ^ value),
        Inst::Op(name, rd, rs1, rs2) => {
          let (a, b) = (self.regs[rs1], self.regs[rs2]);
          let value = match name {
            "add" => a.wrapping_add(b),
            "sub" => a.wrapping_sub(b),
            "mul" => a.wrapping_mul(b),
            "div" if b == 0 => -1,
            "div" => a.wrapping_div(b),
            "xor" => a ^ b,
            "slt" => i64::from(a < b),
            _ => unreachable!(),
          };
          self.set(rd, value);
        }
        Inst::Seqz(rd, rs) => self.set(rd, i64::from(self.regs[rs] == 0)),
        Inst::Snez(rd, rs) => self.set(rd, i64::from(self.regs[rs] != 0)),
        Inst::Neg(rd, rs) => self.set(rd, self.regs[rs].wrapping_neg()),
        Inst::Mv(rd, rs) => self.set(rd, self.regs[rs]),
        Inst::Load {
          width,
          rd,
          base,
          offset,
        } => {
          let idx = self.index(self.regs[base] + offset, width);
          let value = if width == 8 {
            let mut bytes = [0; 8];
            bytes.copy_from_slice(&self.memory[idx..idx + 8]);
            i64::from_le_bytes(bytes)
          } else {
            i64::from(self.memory[idx] as i8)
          };
          self.set(rd, value);
        }
        Inst::Store {
          width,
          rs,
          base,
          offset,
        } => {
          let idx = self.index(self.regs[base] + offset, width);
          let bytes = self.regs[rs].to_le_bytes();
          self.memory[idx..idx + width as usize].copy_from_slice(&bytes[..width as usize]);
        }
        Inst::Beqz(rs, label) => {
          if self.regs[rs] == 0 {
            pc = self.target(&label);
          }
        }
        Inst::J(label) => pc = self.target(&label),
        Inst::Call(label) => {
          self.aligned_calls &= self.regs[reg("sp")] % 16 == 0;
          self.set(reg("ra"), pc as i64);
          pc = self.target(&label);
        }
        Inst::Ret => {
          let ra = self.regs[reg("ra")];
          if ra == HALT {
            return self.regs[reg("a0")];
          }
          pc = ra as usize;
        }
      }
      self.min_sp = self.min_sp.min(self.regs[reg("sp")]);
    }

    panic!("program did not halt within {STEP_LIMIT} steps");
  }

  pub fn stack_pointer(&self) -> i64 {
    self.regs[reg("sp")]
  }
}

/// Compile `source` and run its `main`.
pub fn run(source: &str) -> i64 {
  let asm = rv64cc::generate_assembly(source)
    .unwrap_or_else(|err| panic!("compilation failed:\n{err}"));
  Machine::load(&asm).run_main()
}

/// Compile `source`, expecting a diagnostic.
pub fn compile_error(source: &str) -> String {
  match rv64cc::generate_assembly(source) {
    Ok(asm) => panic!("expected a compile error, got:\n{asm}"),
    Err(err) => err.to_string(),
  }
}
