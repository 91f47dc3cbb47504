//! The serialized function-tree representation the harness engine produces from
//! [`parse`](crate::parse) and consumes from snapshots.
//!
//! Serialization goes through `bincode`, which is byte-deterministic for a given tree, so
//! identical sources always produce identical IR — the property the snapshot compiler's
//! reproducible-output guarantee rests on.

use serde::{Deserialize, Serialize};

/// IR format tag, bumped whenever the tree shape changes incompatibly.
pub const IR_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModuleTree {
  pub functions: Vec<FunctionTree>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionTree {
  pub name: String,
  pub params: Vec<String>,
  pub body: Body,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Body {
  Return(Expr),
  Throw(Expr),
}

/// Terms joined by `+` (string concatenation if either side is a string, numeric addition
/// otherwise).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Expr {
  pub terms: Vec<Term>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Term {
  Str(String),
  Num(f64),
  Ident(String),
  Call { callee: String, args: Vec<Expr> },
}

/// Versioned envelope around a serialized [`ModuleTree`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IrEnvelope {
  pub version: u32,
  pub module: ModuleTree,
}
