use crate::engine::{
  EngineError, FunctionRef, HostBoundary, ManagedEngine, ManagedValue, NativeCallbackId,
};
use crate::error::{BridgeError, Termination, Violation};
use crate::handle::{Local, ScopeId};
use crate::interrupt::TerminationToken;
use crate::profiler::{BoundaryProfiler, Direction};
use crate::table::HandleTable;
use std::time::Instant;
use tracing::trace_span;

/// A natively implemented function exposed to managed code.
///
/// Receives the boundary context, the `this` value, and the arguments, all as local handles
/// rooted in a scope the dispatcher opens for this call and closes when it returns.
pub type NativeCallbackFn =
  for<'a, 'b> fn(&mut BoundaryCx<'a, 'b>, this: Local, args: &[Local]) -> Result<Local, BridgeError>;

/// Registry metadata for a natively implemented callback.
#[derive(Clone, Copy)]
pub struct NativeCallbackMeta {
  pub name: &'static str,
  /// Declared arity. `None` is variadic; `Some(n)` rejects calls with a different argument count
  /// as a fatal [`Violation::ArityMismatch`].
  pub arity: Option<u32>,
  pub func: NativeCallbackFn,
}

/// Table of natively implemented callbacks, indexed by [`NativeCallbackId`].
#[derive(Default)]
pub struct NativeCallbackRegistry {
  callbacks: Vec<NativeCallbackMeta>,
}

impl NativeCallbackRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(&mut self, meta: NativeCallbackMeta) -> NativeCallbackId {
    let id = NativeCallbackId(self.callbacks.len() as u32);
    self.callbacks.push(meta);
    id
  }

  pub fn meta(&self, id: NativeCallbackId) -> Option<&NativeCallbackMeta> {
    self.callbacks.get(id.0 as usize)
  }
}

/// Mutable dispatcher state borrowed from the isolate for the duration of one boundary call
/// chain. Holds everything except the engine, which is threaded separately so the engine can pass
/// itself back on re-entrant native calls.
pub(crate) struct DispatchState<'a> {
  pub table: &'a mut HandleTable,
  pub registry: &'a NativeCallbackRegistry,
  pub profiler: &'a mut BoundaryProfiler,
  pub token: &'a TerminationToken,
  /// Current boundary-crossing depth, for diagnostics.
  pub depth: u32,
}

/// Converts an engine-reported failure into the bridge taxonomy.
pub(crate) fn engine_to_bridge(err: EngineError) -> BridgeError {
  match err {
    EngineError::Throw(value) => BridgeError::Exception(value),
    // A failure the dispatcher itself injected into the engine; unwrap it verbatim so violations
    // and terminations cross nested frames without being downgraded.
    EngineError::Host(inner) => *inner,
    other => BridgeError::Engine(other.to_string()),
  }
}

/// Converts a bridge failure into the form the engine contract propagates.
///
/// Script exceptions stay script exceptions (value-for-value); everything else is wrapped opaquely
/// so the engine cannot mistake a boundary violation for a scripting-level failure.
pub(crate) fn bridge_to_engine(err: BridgeError) -> EngineError {
  match err {
    BridgeError::Exception(value) => EngineError::Throw(value),
    other => EngineError::Host(Box::new(other)),
  }
}

/// One native → managed crossing. Synchronous round trip; re-entrant native callbacks are served
/// through `state` while the engine runs.
pub(crate) fn call_into_managed(
  engine: &mut dyn ManagedEngine,
  state: &mut DispatchState<'_>,
  callee: FunctionRef,
  this: &ManagedValue,
  args: &[ManagedValue],
  site: &str,
) -> Result<ManagedValue, BridgeError> {
  if state.token.is_requested() {
    return Err(BridgeError::Terminated(Termination::Requested));
  }
  let span = trace_span!("into_managed", site, depth = state.depth);
  let _entered = span.enter();

  let start = Instant::now();
  state.depth += 1;
  let result = engine.call(callee, this, args, state);
  state.depth -= 1;
  state.profiler.record(Direction::IntoManaged, site, start.elapsed());

  result.map_err(engine_to_bridge)
}

impl HostBoundary for DispatchState<'_> {
  /// One managed → native crossing.
  ///
  /// Opens a fresh handle scope for the callback, marshals `this`/`args` into local handles,
  /// invokes the callback, and copies the result out before the scope closes. On failure the
  /// scope (and anything the callback left open inside it) unwinds in reverse creation order.
  fn call_native(
    &mut self,
    engine: &mut dyn ManagedEngine,
    callback: NativeCallbackId,
    this: &ManagedValue,
    args: &[ManagedValue],
  ) -> Result<ManagedValue, EngineError> {
    if self.token.is_requested() {
      return Err(bridge_to_engine(BridgeError::Terminated(
        Termination::Requested,
      )));
    }
    let Some(meta) = self.registry.meta(callback).copied() else {
      return Err(bridge_to_engine(Violation::UnknownCallback.into()));
    };
    if let Some(expected) = meta.arity {
      if args.len() as u32 != expected {
        return Err(bridge_to_engine(
          Violation::ArityMismatch {
            expected,
            got: args.len() as u32,
          }
          .into(),
        ));
      }
    }

    let span = trace_span!("into_native", site = meta.name, depth = self.depth);
    let _entered = span.enter();
    let start = Instant::now();

    let scope = self.table.open_scope();
    let result = self.run_native_callback(engine, &meta, scope, this, args);

    self
      .profiler
      .record(Direction::IntoNative, meta.name, start.elapsed());

    match result {
      Ok(value) => Ok(value),
      Err(err) => {
        // Unwind the callback scope plus any nested scopes still open, innermost first.
        let _ = self.table.unwind_through(scope);
        Err(bridge_to_engine(err))
      }
    }
  }
}

impl DispatchState<'_> {
  fn run_native_callback(
    &mut self,
    engine: &mut dyn ManagedEngine,
    meta: &NativeCallbackMeta,
    scope: ScopeId,
    this: &ManagedValue,
    args: &[ManagedValue],
  ) -> Result<ManagedValue, BridgeError> {
    let this = self.table.allocate(this.clone())?;
    let mut arg_handles = Vec::with_capacity(args.len());
    for arg in args {
      arg_handles.push(self.table.allocate(arg.clone())?);
    }

    self.depth += 1;
    let out = {
      let mut cx = BoundaryCx {
        engine,
        state: self,
      };
      (meta.func)(&mut cx, this, &arg_handles)
    };
    self.depth -= 1;

    // Copy the result out while the callback's scope is still open, then close it strictly:
    // a callback that leaked an inner scope is detected here, not papered over.
    let value = self.table.resolve(out?)?.clone();
    self.table.close_scope(scope)?;
    Ok(value)
  }
}

/// The context handed to native callbacks: handle access, allocation, and re-entry into managed
/// code, all scoped to the callback's own handle scope.
pub struct BoundaryCx<'a, 'b> {
  pub(crate) engine: &'a mut dyn ManagedEngine,
  pub(crate) state: &'a mut DispatchState<'b>,
}

impl BoundaryCx<'_, '_> {
  /// Resolves a handle to a copy of its managed value.
  pub fn get(&self, handle: Local) -> Result<ManagedValue, BridgeError> {
    self.state.table.resolve(handle).cloned()
  }

  /// Allocates a value as a local handle in the callback's scope.
  pub fn alloc(&mut self, value: ManagedValue) -> Result<Local, BridgeError> {
    self.state.table.allocate(value)
  }

  /// Allocates a native UTF-8 string as a managed string handle (one conversion pass).
  pub fn alloc_str(&mut self, s: &str) -> Result<Local, BridgeError> {
    self.state.table.allocate(ManagedValue::from_utf8(s))
  }

  /// Materializes a managed string handle as native UTF-8.
  pub fn to_rust_string(&self, handle: Local) -> Result<String, BridgeError> {
    match self.state.table.resolve(handle)? {
      ManagedValue::Str(s) => s.to_utf8().map_err(|_| Violation::EncodingFailure.into()),
      _ => Err(Violation::EncodingFailure.into()),
    }
  }

  /// Re-enters managed code from inside a native callback. Nests to any depth.
  pub fn call_function(
    &mut self,
    callee: Local,
    this: Local,
    args: &[Local],
  ) -> Result<Local, BridgeError> {
    let callee = match self.state.table.resolve(callee)? {
      ManagedValue::Function(f) => *f,
      _ => return Err(Violation::NotCallable.into()),
    };
    let this = self.state.table.resolve(this)?.clone();
    let mut arg_values = Vec::with_capacity(args.len());
    for arg in args {
      arg_values.push(self.state.table.resolve(*arg)?.clone());
    }

    let result = call_into_managed(self.engine, self.state, callee, &this, &arg_values, "call")?;
    self.state.table.allocate(result)
  }

  /// Builds a script exception carrying a managed string, for `return Err(cx.throw_str(...))`.
  pub fn throw_str(&self, message: &str) -> BridgeError {
    BridgeError::Exception(ManagedValue::from_utf8(message))
  }

  /// Current boundary-crossing depth (the outermost native → managed call is depth 1).
  pub fn depth(&self) -> u32 {
    self.state.depth
  }
}
