//! A deliberately tiny managed-engine implementation of the `bridge-js` embedding contract.
//!
//! This is a test double, not a JavaScript engine: it executes a micro-subset (function
//! definitions whose bodies `return` or `throw` one `+`-expression over strings, numbers,
//! parameters, and calls) that is just rich enough to exercise every boundary path — string
//! marshaling, re-entrant native calls, script exceptions, and snapshot compile/instantiate.
//!
//! Parsing is deterministic and the IR is versioned `bincode`, so snapshot blobs built from it
//! are byte-reproducible.

mod engine;
mod parse;
mod tree;

pub use crate::engine::ScriptedEngine;
pub use crate::parse::parse_module;
pub use crate::tree::Body;
pub use crate::tree::Expr;
pub use crate::tree::FunctionTree;
pub use crate::tree::IrEnvelope;
pub use crate::tree::ModuleTree;
pub use crate::tree::Term;
pub use crate::tree::IR_VERSION;
