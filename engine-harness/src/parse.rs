//! Parser for the harness scripting subset.
//!
//! Grammar (whitespace-insensitive):
//!
//! ```text
//! module   := function+
//! function := "function" ident "(" params? ")" "{" body "}"
//! body     := ("return" | "throw") expr ";"
//! expr     := term ("+" term)*
//! term     := string | number | ident | ident "(" args? ")"
//! ```
//!
//! Small on purpose: just enough surface to exercise every boundary path (concatenation,
//! parameter passing, nested calls into native bindings, and throwing).

use crate::tree::{Body, Expr, FunctionTree, ModuleTree, Term};
use bridge_js::EngineError;

struct Parser<'a> {
  src: &'a [u8],
  pos: usize,
}

pub fn parse_module(source: &str) -> Result<ModuleTree, EngineError> {
  let mut parser = Parser {
    src: source.as_bytes(),
    pos: 0,
  };
  let mut functions = Vec::new();
  parser.skip_ws();
  while !parser.at_end() {
    functions.push(parser.function()?);
    parser.skip_ws();
  }
  if functions.is_empty() {
    return Err(EngineError::Parse("module defines no functions".to_string()));
  }
  Ok(ModuleTree { functions })
}

impl Parser<'_> {
  fn error(&self, message: &str) -> EngineError {
    EngineError::Parse(format!("{message} at byte {pos}", pos = self.pos))
  }

  fn at_end(&self) -> bool {
    self.pos >= self.src.len()
  }

  fn peek(&self) -> Option<u8> {
    self.src.get(self.pos).copied()
  }

  fn skip_ws(&mut self) {
    while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
      self.pos += 1;
    }
  }

  fn eat(&mut self, byte: u8) -> Result<(), EngineError> {
    self.skip_ws();
    if self.peek() == Some(byte) {
      self.pos += 1;
      Ok(())
    } else {
      Err(self.error(&format!("expected {:?}", byte as char)))
    }
  }

  fn try_eat(&mut self, byte: u8) -> bool {
    self.skip_ws();
    if self.peek() == Some(byte) {
      self.pos += 1;
      true
    } else {
      false
    }
  }

  fn ident(&mut self) -> Result<String, EngineError> {
    self.skip_ws();
    let start = self.pos;
    while matches!(self.peek(), Some(c) if c == b'_' || c.is_ascii_alphanumeric()) {
      self.pos += 1;
    }
    if self.pos == start || self.src[start].is_ascii_digit() {
      return Err(self.error("expected identifier"));
    }
    Ok(String::from_utf8_lossy(&self.src[start..self.pos]).into_owned())
  }

  fn keyword(&mut self, word: &str) -> Result<(), EngineError> {
    let ident = self.ident()?;
    if ident == word {
      Ok(())
    } else {
      Err(self.error(&format!("expected keyword {word:?}, found {ident:?}")))
    }
  }

  fn function(&mut self) -> Result<FunctionTree, EngineError> {
    self.keyword("function")?;
    let name = self.ident()?;
    self.eat(b'(')?;
    let mut params = Vec::new();
    if !self.try_eat(b')') {
      loop {
        params.push(self.ident()?);
        if self.try_eat(b')') {
          break;
        }
        self.eat(b',')?;
      }
    }
    self.eat(b'{')?;
    let keyword = self.ident()?;
    let expr = self.expr()?;
    let body = match keyword.as_str() {
      "return" => Body::Return(expr),
      "throw" => Body::Throw(expr),
      other => return Err(self.error(&format!("expected return or throw, found {other:?}"))),
    };
    self.eat(b';')?;
    self.eat(b'}')?;
    Ok(FunctionTree { name, params, body })
  }

  fn expr(&mut self) -> Result<Expr, EngineError> {
    let mut terms = vec![self.term()?];
    while self.try_eat(b'+') {
      terms.push(self.term()?);
    }
    Ok(Expr { terms })
  }

  fn term(&mut self) -> Result<Term, EngineError> {
    self.skip_ws();
    match self.peek() {
      Some(b'"') => self.string_literal(),
      Some(c) if c.is_ascii_digit() => self.number_literal(),
      Some(c) if c == b'_' || c.is_ascii_alphabetic() => {
        let name = self.ident()?;
        if self.try_eat(b'(') {
          let mut args = Vec::new();
          if !self.try_eat(b')') {
            loop {
              args.push(self.expr()?);
              if self.try_eat(b')') {
                break;
              }
              self.eat(b',')?;
            }
          }
          Ok(Term::Call { callee: name, args })
        } else {
          Ok(Term::Ident(name))
        }
      }
      _ => Err(self.error("expected term")),
    }
  }

  fn string_literal(&mut self) -> Result<Term, EngineError> {
    self.eat(b'"')?;
    let mut out = String::new();
    loop {
      match self.peek() {
        Some(b'"') => {
          self.pos += 1;
          return Ok(Term::Str(out));
        }
        Some(b'\\') => {
          self.pos += 1;
          match self.peek() {
            Some(b'"') => out.push('"'),
            Some(b'\\') => out.push('\\'),
            Some(b'n') => out.push('\n'),
            _ => return Err(self.error("unsupported escape")),
          }
          self.pos += 1;
        }
        Some(_) => {
          // Consume one UTF-8 character.
          let rest = &self.src[self.pos..];
          let s = std::str::from_utf8(rest).map_err(|_| self.error("invalid UTF-8"))?;
          let ch = s.chars().next().ok_or_else(|| self.error("unterminated string"))?;
          out.push(ch);
          self.pos += ch.len_utf8();
        }
        None => return Err(self.error("unterminated string")),
      }
    }
  }

  fn number_literal(&mut self) -> Result<Term, EngineError> {
    let start = self.pos;
    while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == b'.') {
      self.pos += 1;
    }
    let text = std::str::from_utf8(&self.src[start..self.pos])
      .map_err(|_| self.error("invalid number"))?;
    text
      .parse::<f64>()
      .map(Term::Num)
      .map_err(|_| self.error("invalid number"))
  }
}
