use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// A managed string as held by the engine: a sequence of UTF-16 code units.
///
/// Boundary marshaling performs exactly one encoding-conversion pass per crossing
/// (UTF-8 on the native side, code units on the managed side) and always carries explicit
/// lengths; neither side may assume NUL-termination.
#[derive(Clone)]
pub struct ManagedString {
  units: Arc<[u16]>,
}

impl ManagedString {
  pub fn from_code_units(units: &[u16]) -> Self {
    Self {
      units: Arc::from(units),
    }
  }

  pub fn from_utf8(s: &str) -> Self {
    let units: Vec<u16> = s.encode_utf16().collect();
    Self {
      units: units.into(),
    }
  }

  pub fn len_code_units(&self) -> usize {
    self.units.len()
  }

  pub fn is_empty(&self) -> bool {
    self.units.is_empty()
  }

  pub fn as_code_units(&self) -> &[u16] {
    &self.units
  }

  /// Converts back to UTF-8, failing on unpaired surrogates.
  pub fn to_utf8(&self) -> Result<String, std::string::FromUtf16Error> {
    String::from_utf16(&self.units)
  }

  pub fn to_utf8_lossy(&self) -> String {
    String::from_utf16_lossy(&self.units)
  }
}

impl PartialEq for ManagedString {
  fn eq(&self, other: &Self) -> bool {
    self.units == other.units
  }
}

impl Eq for ManagedString {}

impl PartialOrd for ManagedString {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for ManagedString {
  fn cmp(&self, other: &Self) -> Ordering {
    self.units.iter().cmp(other.units.iter())
  }
}

impl fmt::Debug for ManagedString {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}", self.to_utf8_lossy())
  }
}

/// An engine-internal reference to a managed object.
///
/// Opaque to native code; the bridge only ever moves it around or stores it in the handle table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct ObjectRef(pub u64);

/// An engine-internal reference to a managed callable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct FunctionRef(pub u64);

/// Identifier of a natively implemented callback registered with the dispatcher.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct NativeCallbackId(pub u32);

/// A managed value as seen by the bridge.
///
/// Primitives cross the boundary by value; strings are copied (one conversion pass); objects and
/// functions cross as handles only, never as raw pointers.
#[derive(Clone, Debug, PartialEq)]
pub enum ManagedValue {
  Undefined,
  Null,
  Bool(bool),
  /// Exact 32-bit signed integer. Bit-width and signedness are preserved across the boundary.
  I32(i32),
  /// Exact 32-bit unsigned integer.
  U32(u32),
  /// IEEE-754 double.
  F64(f64),
  Str(ManagedString),
  Object(ObjectRef),
  Function(FunctionRef),
}

impl ManagedValue {
  pub fn from_utf8(s: &str) -> Self {
    ManagedValue::Str(ManagedString::from_utf8(s))
  }

  /// True for values that cross the boundary by handle rather than by value.
  pub fn is_reference(&self) -> bool {
    matches!(
      self,
      ManagedValue::Str(_) | ManagedValue::Object(_) | ManagedValue::Function(_)
    )
  }
}

/// A failure reported by the managed engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
  /// Managed script code threw a value. Recoverable; crosses the boundary value-for-value.
  #[error("script threw")]
  Throw(ManagedValue),

  /// The source could not be parsed.
  #[error("parse error: {0}")]
  Parse(String),

  /// Serialized IR handed to `instantiate` was not produced by this engine/version.
  #[error("malformed function-tree IR: {0}")]
  MalformedIr(String),

  /// The callee is not callable, a reference is dangling, or the engine is otherwise broken.
  #[error("engine internal failure: {0}")]
  Internal(String),

  /// A fatal failure injected by the host boundary during a native call (violation, termination,
  /// resource exhaustion). Engines must propagate this uninterpreted and uncaught; scripts never
  /// observe it as an exception.
  #[error("fatal boundary failure")]
  Host(Box<crate::error::BridgeError>),
}

/// The dispatcher-side half of the boundary, handed to the engine during a managed call so that
/// managed code can invoke natively implemented functions.
///
/// The engine passes itself back through `engine` on every native call, which is what makes
/// re-entrant native → managed → native chains possible without interior mutability.
pub trait HostBoundary {
  fn call_native(
    &mut self,
    engine: &mut dyn ManagedEngine,
    callback: NativeCallbackId,
    this: &ManagedValue,
    args: &[ManagedValue],
  ) -> Result<ManagedValue, EngineError>;
}

/// The narrow embedding contract the bridge consumes.
///
/// The actual JavaScript engine lives behind this trait; the bridge never looks inside
/// [`ObjectRef`]/[`FunctionRef`] and never assumes anything about the engine's heap or GC.
///
/// `Send` because an isolate (and the engine it owns) may be handed off between threads; it is
/// still used by at most one thread at a time.
pub trait ManagedEngine: Send {
  /// Parses `source` into the engine's serialized function-tree IR.
  ///
  /// Must be deterministic: identical `(name, source)` inputs produce identical bytes. The
  /// snapshot compiler relies on this for reproducible blobs.
  fn parse(&mut self, name: &str, source: &str) -> Result<Vec<u8>, EngineError>;

  /// Instantiates IR produced by [`ManagedEngine::parse`] into a live callable.
  fn instantiate(&mut self, ir: &[u8]) -> Result<ManagedValue, EngineError>;

  /// Invokes a managed callable. `host` is called back for any native-function invocation made
  /// by the script, re-entrantly to any depth.
  fn call(
    &mut self,
    callee: FunctionRef,
    this: &ManagedValue,
    args: &[ManagedValue],
    host: &mut dyn HostBoundary,
  ) -> Result<ManagedValue, EngineError>;

  /// Creates a fresh plain object.
  fn make_object(&mut self) -> Result<ManagedValue, EngineError>;

  /// Creates a managed function whose invocation is forwarded to a native callback.
  fn make_native_function(
    &mut self,
    name: &str,
    callback: NativeCallbackId,
  ) -> Result<ManagedValue, EngineError>;

  /// Reads a property. `target` must be an object or function; anything else is an engine-level
  /// type error (a throw).
  fn get_property(&mut self, target: &ManagedValue, key: &str)
    -> Result<ManagedValue, EngineError>;

  fn set_property(
    &mut self,
    target: &ManagedValue,
    key: &str,
    value: ManagedValue,
  ) -> Result<(), EngineError>;

  /// Engine-defined string conversion, used for host-side exception reporting.
  fn to_managed_string(&mut self, value: &ManagedValue) -> Result<ManagedString, EngineError>;
}
