//! Recursive-descent parser producing typed function definitions.
//!
//! The parser mirrors the classic chibicc structure: a precedence-climbing
//! set of helpers for expressions, a statement layer on top, and declaration
//! handling that registers locals in the current function's scope as soon as
//! their declarator is seen. Expressions are typed as they are built, so
//! type errors surface at the operator that caused them.
//!
//! ```text
//! program       = (declspec declarator (";" | compound-stmt))*
//! compound-stmt = (declaration | stmt)* "}"
//! declaration   = declspec (declarator ("=" assign)? ("," declarator ("=" assign)?)*)? ";"
//! declarator    = "*"* ident type-suffix
//! type-suffix   = "(" func-params | "[" num "]" type-suffix | ε
//! stmt          = "return" expr ";" | "if" "(" expr ")" stmt ("else" stmt)?
//!               | "for" "(" expr-stmt expr? ";" expr? ")" stmt
//!               | "while" "(" expr ")" stmt | "{" compound-stmt | expr-stmt
//! expr          = assign
//! assign        = equality ("=" assign)?
//! equality      = relational ("==" relational | "!=" relational)*
//! relational    = add ("<" add | "<=" add | ">" add | ">=" add)*
//! add           = mul ("+" mul | "-" mul)*
//! mul           = unary ("*" unary | "/" unary)*
//! unary         = ("+" | "-" | "&" | "*") unary | postfix
//! postfix       = primary ("[" expr "]")*
//! primary       = "(" expr ")" | "sizeof" "(" type-name ")" | "sizeof" unary
//!               | ident func-args? | num
//! ```

use std::collections::HashMap;

use crate::ast::{BinaryOp, Expr, ExprResult, Stmt};
use crate::error::{CompileError, CompileResult};
use crate::symbol::{Function, Program, Scope};
use crate::tokenizer::{Token, TokenKind, describe_token, token_text};
use crate::ty::{MAX_OBJECT_SIZE, Type, array_of, pointer_to};

/// Number of integer argument registers available for passing parameters.
pub const MAX_ARGS: usize = 8;

/// A parsed declarator: the declared name (with its location) and its full type.
#[derive(Debug)]
struct Declarator {
  name: String,
  loc: usize,
  ty: Type,
  /// Parameter declarators when `ty` is a function type.
  params: Vec<Declarator>,
}

/// Parse a whole translation unit.
pub fn parse(tokens: Vec<Token>, source: &str) -> CompileResult<Program> {
  let mut parser = Parser {
    stream: TokenStream::new(tokens, source),
    scope: Scope::new(),
    signatures: HashMap::new(),
  };

  let mut program = Program::default();
  while !parser.stream.is_eof() {
    if let Some(function) = parser.parse_function()? {
      log::debug!(
        "parsed function `{}` with {} locals",
        function.name,
        function.locals.len()
      );
      program.functions.push(function);
    }
  }

  Ok(program)
}

struct Parser<'a> {
  stream: TokenStream<'a>,
  /// Locals of the function currently being parsed.
  scope: Scope,
  /// Function types from definitions and prototypes seen so far.
  signatures: HashMap<String, Type>,
}

impl Parser<'_> {
  fn error_at(&self, loc: usize, message: impl Into<String>) -> CompileError {
    CompileError::at(self.stream.source, loc, message)
  }

  /// Anchor a type error from an AST constructor at `loc`.
  fn typed(&self, loc: usize, node: ExprResult) -> CompileResult<Expr> {
    node.map_err(|err| self.error_at(loc, err.to_string()))
  }

  /// Parse one top-level function definition, or skip over a prototype.
  fn parse_function(&mut self) -> CompileResult<Option<Function>> {
    let base = self.parse_declspec()?;
    let decl = self.parse_declarator(base)?;
    if !decl.ty.is_func() {
      return Err(self.error_at(decl.loc, "expected a function definition"));
    }
    if let Some(previous) = self.signatures.get(&decl.name)
      && *previous != decl.ty
    {
      return Err(self.error_at(
        decl.loc,
        format!("conflicting types for '{}'", decl.name),
      ));
    }
    self.signatures.insert(decl.name.clone(), decl.ty.clone());

    if self.stream.equal(";") {
      return Ok(None);
    }

    if decl.params.len() > MAX_ARGS {
      return Err(self.error_at(
        decl.loc,
        format!("too many parameters (at most {MAX_ARGS})"),
      ));
    }

    self.scope = Scope::new();
    for param in &decl.params {
      self.scope.declare(&param.name, param.ty.clone());
    }

    self.stream.skip("{")?;
    let body = self.parse_compound_stmt()?;
    let scope = std::mem::take(&mut self.scope);

    Ok(Some(Function {
      name: decl.name,
      param_count: decl.params.len(),
      locals: scope.into_locals(),
      body,
      stack_size: 0,
    }))
  }

  /// declspec = "int" | "char"
  fn parse_declspec(&mut self) -> CompileResult<Type> {
    if self.stream.equal_keyword("char") {
      return Ok(Type::Char);
    }
    self.stream.skip_keyword("int")?;
    Ok(Type::Int)
  }

  fn parse_declarator(&mut self, mut ty: Type) -> CompileResult<Declarator> {
    while self.stream.equal("*") {
      ty = pointer_to(ty);
    }

    let (name, loc) = self.stream.get_ident()?;
    let mut params = Vec::new();
    let ty = self.parse_type_suffix(ty, Some(&mut params))?;
    Ok(Declarator {
      name,
      loc,
      ty,
      params,
    })
  }

  /// Declarator without a name, as used by `sizeof(type-name)`.
  fn parse_abstract_declarator(&mut self, mut ty: Type) -> CompileResult<Type> {
    while self.stream.equal("*") {
      ty = pointer_to(ty);
    }
    self.parse_type_suffix(ty, None)
  }

  /// Parameter lists are only accepted where `params` is provided.
  fn parse_type_suffix(
    &mut self,
    ty: Type,
    params: Option<&mut Vec<Declarator>>,
  ) -> CompileResult<Type> {
    if let Some(params) = params
      && self.stream.equal("(")
    {
      return self.parse_func_params(ty, params);
    }

    if self.stream.equal("[") {
      let (len, len_loc) = self.stream.get_number()?;
      self.stream.skip("]")?;
      let elem = self.parse_type_suffix(ty, None)?;
      let too_large = elem
        .size()
        .checked_mul(len)
        .is_none_or(|size| size > MAX_OBJECT_SIZE);
      if too_large {
        return Err(self.error_at(len_loc, "array too large"));
      }
      return Ok(array_of(elem, len));
    }

    Ok(ty)
  }

  fn parse_func_params(
    &mut self,
    return_ty: Type,
    params: &mut Vec<Declarator>,
  ) -> CompileResult<Type> {
    if !self.stream.equal(")") {
      loop {
        let base = self.parse_declspec()?;
        let mut param = self.parse_declarator(base)?;
        if param.ty.is_func() {
          return Err(self.error_at(param.loc, "parameter declared as a function"));
        }
        // `int a[N]` as a parameter receives a pointer to the caller's array.
        if param.ty.is_array()
          && let Some(elem) = param.ty.base().cloned()
        {
          param.ty = pointer_to(elem);
        }
        params.push(param);
        if self.stream.equal(")") {
          break;
        }
        self.stream.skip(",")?;
      }
    }

    let param_types = params.iter().map(|param| param.ty.clone()).collect();
    Ok(Type::func_of(return_ty, param_types))
  }

  fn is_typename(&self) -> bool {
    self.stream.is_keyword("int") || self.stream.is_keyword("char")
  }

  /// Statements up to and including the closing brace.
  fn parse_compound_stmt(&mut self) -> CompileResult<Vec<Stmt>> {
    let mut stmts = Vec::new();
    while !self.stream.equal("}") {
      if self.stream.is_eof() {
        return Err(self.stream.expected("\"}\""));
      }
      let stmt = if self.is_typename() {
        self.parse_declaration()?
      } else {
        self.parse_stmt()?
      };
      stmts.push(stmt);
    }
    Ok(stmts)
  }

  /// Declare each name and turn initializers into assignment statements.
  fn parse_declaration(&mut self) -> CompileResult<Stmt> {
    let base = self.parse_declspec()?;
    let mut inits = Vec::new();

    let mut first = true;
    while !self.stream.equal(";") {
      if !first {
        self.stream.skip(",")?;
      }
      first = false;

      let decl = self.parse_declarator(base.clone())?;
      if decl.ty.is_func() {
        return Err(self.error_at(decl.loc, "variable declared with a function type"));
      }
      let obj = self.scope.declare(&decl.name, decl.ty.clone());

      let Some(loc) = self.stream.consume("=") else {
        continue;
      };
      let lhs = Expr::var(obj, decl.ty);
      let rhs = self.parse_assign()?;
      let node = self.typed(loc, Expr::assign(lhs, rhs))?;
      inits.push(Stmt::Expr(node));
    }

    Ok(Stmt::Block(inits))
  }

  fn parse_stmt(&mut self) -> CompileResult<Stmt> {
    if self.stream.equal_keyword("return") {
      let expr = self.parse_expr()?;
      self.stream.skip(";")?;
      return Ok(Stmt::Return(expr));
    }

    if self.stream.equal_keyword("if") {
      self.stream.skip("(")?;
      let cond = self.parse_expr()?;
      self.stream.skip(")")?;
      let then = Box::new(self.parse_stmt()?);
      let els = if self.stream.equal_keyword("else") {
        Some(Box::new(self.parse_stmt()?))
      } else {
        None
      };
      return Ok(Stmt::If { cond, then, els });
    }

    if self.stream.equal_keyword("for") {
      self.stream.skip("(")?;
      let init = Some(Box::new(self.parse_expr_stmt()?));
      let cond = self.parse_optional_expr(";")?;
      let inc = self.parse_optional_expr(")")?;
      let body = Box::new(self.parse_stmt()?);
      return Ok(Stmt::For {
        init,
        cond,
        inc,
        body,
      });
    }

    if self.stream.equal_keyword("while") {
      self.stream.skip("(")?;
      let cond = self.parse_expr()?;
      self.stream.skip(")")?;
      let body = Box::new(self.parse_stmt()?);
      return Ok(Stmt::For {
        init: None,
        cond: Some(cond),
        inc: None,
        body,
      });
    }

    if self.stream.equal("{") {
      return Ok(Stmt::Block(self.parse_compound_stmt()?));
    }

    self.parse_expr_stmt()
  }

  /// expr? followed by `terminator`.
  fn parse_optional_expr(&mut self, terminator: &str) -> CompileResult<Option<Expr>> {
    if self.stream.equal(terminator) {
      return Ok(None);
    }
    let expr = self.parse_expr()?;
    self.stream.skip(terminator)?;
    Ok(Some(expr))
  }

  fn parse_expr_stmt(&mut self) -> CompileResult<Stmt> {
    match self.parse_optional_expr(";")? {
      Some(expr) => Ok(Stmt::Expr(expr)),
      None => Ok(Stmt::Block(Vec::new())),
    }
  }

  fn parse_expr(&mut self) -> CompileResult<Expr> {
    self.parse_assign()
  }

  fn parse_assign(&mut self) -> CompileResult<Expr> {
    let node = self.parse_equality()?;

    if let Some(loc) = self.stream.consume("=") {
      let rhs = self.parse_assign()?;
      return self.typed(loc, Expr::assign(node, rhs));
    }

    Ok(node)
  }

  fn parse_equality(&mut self) -> CompileResult<Expr> {
    let mut node = self.parse_relational()?;

    loop {
      let op = match self.stream.peek_punct() {
        Some("==") => BinaryOp::Eq,
        Some("!=") => BinaryOp::Ne,
        _ => break,
      };

      self.stream.advance();
      let rhs = self.parse_relational()?;
      node = Expr::binary(op, node, rhs);
    }

    Ok(node)
  }

  /// `>` and `>=` reuse `<` and `<=` with swapped operands.
  fn parse_relational(&mut self) -> CompileResult<Expr> {
    let mut node = self.parse_add()?;

    loop {
      let (op, swap) = match self.stream.peek_punct() {
        Some("<") => (BinaryOp::Lt, false),
        Some("<=") => (BinaryOp::Le, false),
        Some(">") => (BinaryOp::Lt, true),
        Some(">=") => (BinaryOp::Le, true),
        _ => break,
      };

      self.stream.advance();
      let rhs = self.parse_add()?;
      node = if swap {
        Expr::binary(op, rhs, node)
      } else {
        Expr::binary(op, node, rhs)
      };
    }

    Ok(node)
  }

  fn parse_add(&mut self) -> CompileResult<Expr> {
    let mut node = self.parse_mul()?;

    loop {
      let Some(op_str @ ("+" | "-")) = self.stream.peek_punct() else {
        break;
      };
      let loc = self.stream.advance();
      let rhs = self.parse_mul()?;
      node = if op_str == "+" {
        self.typed(loc, Expr::add(node, rhs))?
      } else {
        self.typed(loc, Expr::sub(node, rhs))?
      };
    }

    Ok(node)
  }

  fn parse_mul(&mut self) -> CompileResult<Expr> {
    let mut node = self.parse_unary()?;

    loop {
      let op = match self.stream.peek_punct() {
        Some("*") => BinaryOp::Mul,
        Some("/") => BinaryOp::Div,
        _ => break,
      };

      self.stream.advance();
      let rhs = self.parse_unary()?;
      node = Expr::binary(op, node, rhs);
    }

    Ok(node)
  }

  fn parse_unary(&mut self) -> CompileResult<Expr> {
    if self.stream.equal("+") {
      return self.parse_unary();
    }

    if self.stream.equal("-") {
      let operand = self.parse_unary()?;
      return Ok(Expr::neg(operand));
    }

    if let Some(loc) = self.stream.consume("&") {
      let operand = self.parse_unary()?;
      return self.typed(loc, Expr::addr(operand));
    }

    if let Some(loc) = self.stream.consume("*") {
      let operand = self.parse_unary()?;
      return self.typed(loc, Expr::deref(operand));
    }

    self.parse_postfix()
  }

  /// `a[b]` is sugar for `*(a + b)`.
  fn parse_postfix(&mut self) -> CompileResult<Expr> {
    let mut node = self.parse_primary()?;

    while let Some(loc) = self.stream.consume("[") {
      let index = self.parse_expr()?;
      self.stream.skip("]")?;
      let sum = self.typed(loc, Expr::add(node, index))?;
      node = self.typed(loc, Expr::deref(sum))?;
    }

    Ok(node)
  }

  fn parse_primary(&mut self) -> CompileResult<Expr> {
    if self.stream.equal("(") {
      let node = self.parse_expr()?;
      self.stream.skip(")")?;
      return Ok(node);
    }

    if self.stream.equal_keyword("sizeof") {
      return self.parse_sizeof();
    }

    if self.stream.peek_kind() == Some(TokenKind::Ident) {
      let (name, loc) = self.stream.get_ident()?;
      if self.stream.equal("(") {
        return self.parse_call(name, loc);
      }
      let Some((obj, var)) = self.scope.find(&name) else {
        return Err(self.error_at(loc, format!("undefined variable '{name}'")));
      };
      return Ok(Expr::var(obj, var.ty.clone()));
    }

    if self.stream.peek_kind() == Some(TokenKind::Num) {
      let (value, _) = self.stream.get_number()?;
      return Ok(Expr::number(value));
    }

    let loc = self.stream.loc();
    Err(self.error_at(loc, "expected an expression"))
  }

  /// The size is folded into a literal; the operand is never evaluated.
  fn parse_sizeof(&mut self) -> CompileResult<Expr> {
    if self.stream.is_punct("(") && self.stream.peek_is_typename(1) {
      self.stream.skip("(")?;
      let base = self.parse_declspec()?;
      let ty = self.parse_abstract_declarator(base)?;
      self.stream.skip(")")?;
      return Ok(Expr::number(ty.size()));
    }

    let operand = self.parse_unary()?;
    Ok(Expr::number(operand.ty.size()))
  }

  /// Arguments after the opening parenthesis of a call to `name`.
  fn parse_call(&mut self, name: String, loc: usize) -> CompileResult<Expr> {
    let mut args = Vec::new();
    if !self.stream.equal(")") {
      loop {
        args.push(self.parse_assign()?);
        if self.stream.equal(")") {
          break;
        }
        self.stream.skip(",")?;
      }
    }

    if args.len() > MAX_ARGS {
      return Err(self.error_at(
        loc,
        format!("too many arguments to '{name}' (at most {MAX_ARGS})"),
      ));
    }

    if let Some(Type::Func { params, .. }) = self.signatures.get(&name)
      && params.len() != args.len()
    {
      return Err(self.error_at(
        loc,
        format!(
          "wrong number of arguments to '{name}': expected {}, got {}",
          params.len(),
          args.len()
        ),
      ));
    }

    Ok(Expr::call(name, args))
  }
}

/// Lightweight cursor over the token vector.
struct TokenStream<'a> {
  tokens: Vec<Token>,
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  /// Take ownership of the token stream; the parser will advance `pos` as it consumes input.
  fn new(tokens: Vec<Token>, source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn peek_kind(&self) -> Option<TokenKind> {
    self.peek().map(|token| token.kind)
  }

  /// Text of the current token if it is a punctuator.
  fn peek_punct(&self) -> Option<&'a str> {
    let source = self.source;
    self
      .peek()
      .filter(|token| token.kind == TokenKind::Punctuator)
      .map(|token| token_text(token, source))
  }

  /// Whether the token `ahead` positions past the current one names a type.
  fn peek_is_typename(&self, ahead: usize) -> bool {
    self.tokens.get(self.pos + ahead).is_some_and(|token| {
      token.kind == TokenKind::Keyword
        && matches!(token_text(token, self.source), "int" | "char")
    })
  }

  /// Byte offset of the current token, or the end of input.
  fn loc(&self) -> usize {
    self.peek().map_or(self.source.len(), |token| token.loc)
  }

  /// Step past the current token and return where it started.
  fn advance(&mut self) -> usize {
    let loc = self.loc();
    self.pos += 1;
    loc
  }

  fn is_token(&self, kind: TokenKind, text: &str) -> bool {
    self.peek().is_some_and(|token| {
      token.kind == kind && token.len == text.len() && token_text(token, self.source) == text
    })
  }

  fn is_punct(&self, op: &str) -> bool {
    self.is_token(TokenKind::Punctuator, op)
  }

  fn is_keyword(&self, keyword: &str) -> bool {
    self.is_token(TokenKind::Keyword, keyword)
  }

  /// Consume the current token if it matches the provided punctuator.
  fn equal(&mut self, op: &str) -> bool {
    self.consume(op).is_some()
  }

  /// Like `equal`, but returns the location of the consumed token.
  fn consume(&mut self, op: &str) -> Option<usize> {
    self.is_punct(op).then(|| self.advance())
  }

  fn equal_keyword(&mut self, keyword: &str) -> bool {
    if self.is_keyword(keyword) {
      self.pos += 1;
      return true;
    }
    false
  }

  fn expected(&self, what: &str) -> CompileError {
    let got = describe_token(self.peek(), self.source);
    CompileError::at(
      self.source,
      self.loc(),
      format!("expected {what}, but got \"{got}\""),
    )
  }

  fn skip(&mut self, s: &str) -> CompileResult<()> {
    if self.equal(s) {
      Ok(())
    } else {
      Err(self.expected(&format!("\"{s}\"")))
    }
  }

  fn skip_keyword(&mut self, keyword: &str) -> CompileResult<()> {
    if self.equal_keyword(keyword) {
      Ok(())
    } else {
      Err(self.expected(&format!("\"{keyword}\"")))
    }
  }

  /// Parse the current token as an integer literal returning its value and location.
  fn get_number(&mut self) -> CompileResult<(i64, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Num
    {
      let loc = token.loc;
      let value = token.value.ok_or_else(|| {
        CompileError::at(
          self.source,
          loc,
          "internal error: numeric token missing value",
        )
      })?;
      self.pos += 1;
      return Ok((value, loc));
    }

    Err(self.expected("a number"))
  }

  /// Parse the current token as an identifier.
  fn get_ident(&mut self) -> CompileResult<(String, usize)> {
    if let Some(token) = self.peek()
      && token.kind == TokenKind::Ident
    {
      let ident = token_text(token, self.source).to_string();
      let loc = token.loc;
      self.pos += 1;
      return Ok((ident, loc));
    }

    Err(self.expected("an identifier"))
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek_kind(), Some(TokenKind::Eof) | None)
  }
}
