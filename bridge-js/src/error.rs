use crate::engine::ManagedValue;
use std::fmt::Display;

/// Errors produced by the bridge.
///
/// The taxonomy matters to native callers:
/// - [`BridgeError::Exception`] is a script-level throw. It is recoverable and crosses any number
///   of nested boundary crossings value-for-value.
/// - [`BridgeError::Violation`] is a fatal misuse of the boundary itself (stale handle, arity
///   mismatch, scope misordering). It terminates the offending call and is never downgraded to a
///   script exception.
/// - [`BridgeError::CapacityExceeded`] is resource exhaustion; the host may release handles and
///   retry.
/// - [`BridgeError::Terminated`] is a cooperative cancellation observed at a boundary transition.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
  /// A value thrown by managed script code. Catchable by native callers.
  #[error("uncaught script exception")]
  Exception(ManagedValue),

  /// A fatal misuse of the native/managed boundary.
  #[error("boundary violation: {0}")]
  Violation(Violation),

  /// The handle table hit its configured hard limit.
  #[error("handle table capacity exceeded")]
  CapacityExceeded,

  /// Execution was cooperatively terminated at a boundary transition.
  #[error("{0}")]
  Terminated(Termination),

  /// The managed engine failed internally (parser bug, corrupt IR, ...).
  #[error("managed engine failure: {0}")]
  Engine(String),
}

impl BridgeError {
  /// True for errors the host may recover from without tearing down the isolate.
  pub fn is_recoverable(&self) -> bool {
    matches!(self, Self::Exception(_) | Self::CapacityExceeded)
  }
}

/// Fatal boundary violations.
///
/// These indicate a bug in the native caller (or in the bridge), never a scripting-level failure,
/// so they are kept strictly apart from [`BridgeError::Exception`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
  /// A handle was never issued, or its slot has since been invalidated.
  #[error("invalid handle")]
  InvalidHandle,

  /// A persistent handle was released twice.
  #[error("persistent handle released twice")]
  DoubleRelease,

  /// A handle scope was closed while an inner scope was still open, or closed twice.
  #[error("handle scopes must close in LIFO order")]
  ScopeOrderViolation,

  /// Handle allocation or a managed call was attempted with no open scope.
  #[error("no handle scope is open")]
  NoOpenScope,

  /// A native callback was invoked with the wrong number of arguments.
  #[error("arity mismatch: expected {expected}, got {got}")]
  ArityMismatch { expected: u32, got: u32 },

  /// String marshaling encountered invalid UTF-16 data.
  #[error("string encoding conversion failed")]
  EncodingFailure,

  /// A template was mutated after it was sealed by instantiation.
  #[error("template is sealed")]
  TemplateSealed,

  /// Template instantiation recursed past the nesting bound (almost always a template cycle).
  #[error("template nesting too deep")]
  TemplateCycle,

  /// `enter` was called on an isolate that is already entered on this thread.
  #[error("isolate is already entered")]
  AlreadyEntered,

  /// A function call was attempted through a handle that does not reference a callable.
  #[error("value is not callable")]
  NotCallable,

  /// An operation referenced an unregistered native callback id.
  #[error("unknown native callback")]
  UnknownCallback,

  /// An operation referenced an unknown template id.
  #[error("unknown template")]
  UnknownTemplate,

  /// The isolate was already disposed. Terminal.
  #[error("isolate is disposed")]
  IsolateDisposed,

  /// The operation requires the isolate to be entered on the current thread.
  #[error("isolate is not entered")]
  NotEntered,

  /// The isolate is entered on a different thread and no hand-off has happened.
  #[error("isolate is entered on another thread")]
  WrongThread,

  /// An operation required a current context but none was entered.
  #[error("no context is entered")]
  NoContext,
}

impl From<Violation> for BridgeError {
  fn from(violation: Violation) -> Self {
    BridgeError::Violation(violation)
  }
}

/// Why a call was cooperatively terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Termination {
  /// The host requested termination through a [`TerminationHandle`](crate::TerminationHandle).
  Requested,
}

impl Display for Termination {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Termination::Requested => f.write_str("execution terminated: host requested termination"),
    }
  }
}
