use crate::dispatch::{self, DispatchState, NativeCallbackMeta, NativeCallbackRegistry};
use crate::engine::{
  FunctionRef, HostBoundary, ManagedEngine, ManagedValue, NativeCallbackId, ObjectRef,
};
use crate::error::{BridgeError, Violation};
use crate::handle::{HandleId, Local, Persistent, ScopeId};
use crate::interrupt::{TerminationHandle, TerminationToken};
use crate::modules::CoreModuleRegistry;
use crate::profiler::{BoundaryProfiler, ProfileRecord};
use crate::table::{HandleTable, HandleTableLimits};
use crate::template::{TemplateId, TemplateProperty, TemplateShape, TemplateStore, MAX_TEMPLATE_DEPTH};
use std::thread::{self, ThreadId};
use tracing::debug;

/// Construction-time isolate options.
#[derive(Debug, Clone, Default)]
pub struct IsolateOptions {
  pub table_limits: HandleTableLimits,
  /// Start with the boundary profiler enabled.
  pub profile_boundary: bool,
}

/// The isolate lifecycle: `Created → Entered ⇄ Exited → Disposed`.
///
/// Only `Entered` permits handle allocation or managed calls; `Disposed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolateState {
  Created,
  Entered,
  Exited,
  Disposed,
}

/// Identifier of a context created within an isolate.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct ContextId(u32);

#[derive(Debug)]
struct Context {
  global: ObjectRef,
}

/// An independent execution environment: one managed engine instance, one handle table, one
/// scope stack, and the contexts/templates/core modules created within it.
///
/// Exactly one native thread may be entered at a time. Hand-off between threads is explicit:
/// `exit` on one thread, then `enter` on the other. Handles never cross isolates.
pub struct Isolate {
  state: IsolateState,
  entered_thread: Option<ThreadId>,
  engine: Box<dyn ManagedEngine>,
  table: HandleTable,
  callbacks: NativeCallbackRegistry,
  templates: TemplateStore,
  modules: CoreModuleRegistry,
  profiler: BoundaryProfiler,
  token: TerminationToken,
  termination: TerminationHandle,
  contexts: Vec<Context>,
  context_stack: Vec<ContextId>,
}

impl Isolate {
  pub fn new(engine: Box<dyn ManagedEngine>, options: IsolateOptions) -> Self {
    let (token, termination) = TerminationToken::new();
    let mut profiler = BoundaryProfiler::new();
    profiler.set_enabled(options.profile_boundary);
    Self {
      state: IsolateState::Created,
      entered_thread: None,
      engine,
      table: HandleTable::new(options.table_limits),
      callbacks: NativeCallbackRegistry::new(),
      templates: TemplateStore::default(),
      modules: CoreModuleRegistry::new(),
      profiler,
      token,
      termination,
      contexts: Vec::new(),
      context_stack: Vec::new(),
    }
  }

  pub fn state(&self) -> IsolateState {
    self.state
  }

  // ---- lifecycle ----

  /// Enters the isolate on the current thread.
  pub fn enter(&mut self) -> Result<(), BridgeError> {
    match self.state {
      IsolateState::Disposed => Err(Violation::IsolateDisposed.into()),
      IsolateState::Entered => {
        if self.entered_thread == Some(thread::current().id()) {
          Err(Violation::AlreadyEntered.into())
        } else {
          Err(Violation::WrongThread.into())
        }
      }
      IsolateState::Created | IsolateState::Exited => {
        self.state = IsolateState::Entered;
        self.entered_thread = Some(thread::current().id());
        debug!("isolate entered");
        Ok(())
      }
    }
  }

  /// Exits the isolate, allowing another thread to enter it.
  pub fn exit(&mut self) -> Result<(), BridgeError> {
    self.check_entered()?;
    self.state = IsolateState::Exited;
    self.entered_thread = None;
    debug!("isolate exited");
    Ok(())
  }

  /// Disposes the isolate. Terminal: every subsequent operation fails with
  /// [`Violation::IsolateDisposed`]. An isolate entered on the current thread is exited first;
  /// one entered on another thread cannot be disposed out from under it.
  pub fn dispose(&mut self) -> Result<(), BridgeError> {
    match self.state {
      IsolateState::Disposed => Err(Violation::IsolateDisposed.into()),
      IsolateState::Entered if self.entered_thread != Some(thread::current().id()) => {
        Err(Violation::WrongThread.into())
      }
      _ => {
        self.state = IsolateState::Disposed;
        self.entered_thread = None;
        debug!("isolate disposed");
        Ok(())
      }
    }
  }

  fn check_not_disposed(&self) -> Result<(), BridgeError> {
    if self.state == IsolateState::Disposed {
      return Err(Violation::IsolateDisposed.into());
    }
    Ok(())
  }

  fn check_entered(&self) -> Result<(), BridgeError> {
    match self.state {
      IsolateState::Disposed => Err(Violation::IsolateDisposed.into()),
      IsolateState::Created | IsolateState::Exited => Err(Violation::NotEntered.into()),
      IsolateState::Entered => {
        if self.entered_thread == Some(thread::current().id()) {
          Ok(())
        } else {
          Err(Violation::WrongThread.into())
        }
      }
    }
  }

  // ---- termination ----

  /// A cloneable, thread-safe handle for requesting cooperative termination.
  pub fn termination_handle(&self) -> TerminationHandle {
    self.termination.clone()
  }

  /// Clears a pending termination request so the isolate is usable again.
  pub fn clear_termination(&self) {
    self.token.clear();
  }

  // ---- handle scopes ----

  pub fn open_handle_scope(&mut self) -> Result<ScopeId, BridgeError> {
    self.check_entered()?;
    Ok(self.table.open_scope())
  }

  pub fn close_handle_scope(&mut self, scope: ScopeId) -> Result<(), BridgeError> {
    self.check_entered()?;
    self.table.close_scope(scope)
  }

  /// Re-homes a local handle into the scope enclosing the innermost one.
  pub fn escape(&mut self, local: Local) -> Result<Local, BridgeError> {
    self.check_entered()?;
    self.table.escape(local)
  }

  pub fn persist(&mut self, local: Local) -> Result<Persistent, BridgeError> {
    self.check_entered()?;
    self.table.persist(local)
  }

  pub fn release(&mut self, persistent: Persistent) -> Result<(), BridgeError> {
    self.check_entered()?;
    self.table.release(persistent)
  }

  /// Allocates a fresh local handle referencing the same value as `persistent`.
  pub fn local_from_persistent(&mut self, persistent: Persistent) -> Result<Local, BridgeError> {
    self.check_entered()?;
    let value = self.table.resolve(persistent)?.clone();
    self.table.allocate(value)
  }

  // ---- value creation / inspection ----

  pub fn undefined(&mut self) -> Result<Local, BridgeError> {
    self.alloc(ManagedValue::Undefined)
  }

  pub fn null(&mut self) -> Result<Local, BridgeError> {
    self.alloc(ManagedValue::Null)
  }

  pub fn boolean(&mut self, value: bool) -> Result<Local, BridgeError> {
    self.alloc(ManagedValue::Bool(value))
  }

  pub fn integer(&mut self, value: i32) -> Result<Local, BridgeError> {
    self.alloc(ManagedValue::I32(value))
  }

  pub fn unsigned(&mut self, value: u32) -> Result<Local, BridgeError> {
    self.alloc(ManagedValue::U32(value))
  }

  pub fn number(&mut self, value: f64) -> Result<Local, BridgeError> {
    self.alloc(ManagedValue::F64(value))
  }

  /// Copies a native UTF-8 string into a managed string handle (one conversion pass).
  pub fn string(&mut self, value: &str) -> Result<Local, BridgeError> {
    self.alloc(ManagedValue::from_utf8(value))
  }

  fn alloc(&mut self, value: ManagedValue) -> Result<Local, BridgeError> {
    self.check_entered()?;
    self.table.allocate(value)
  }

  /// Resolves any handle to a copy of its managed value.
  pub fn value(&self, handle: impl Into<HandleId>) -> Result<ManagedValue, BridgeError> {
    self.check_entered()?;
    self.table.resolve(handle).cloned()
  }

  /// Materializes a managed string handle as native UTF-8; fails with
  /// [`Violation::EncodingFailure`] on unpaired surrogates or a non-string value.
  pub fn to_rust_string(&self, handle: impl Into<HandleId>) -> Result<String, BridgeError> {
    self.check_entered()?;
    match self.table.resolve(handle)? {
      ManagedValue::Str(s) => s.to_utf8().map_err(|_| Violation::EncodingFailure.into()),
      _ => Err(Violation::EncodingFailure.into()),
    }
  }

  // ---- contexts ----

  /// Creates a context with a fresh global object.
  pub fn create_context(&mut self) -> Result<ContextId, BridgeError> {
    self.check_entered()?;
    let global = match self.engine.make_object().map_err(dispatch::engine_to_bridge)? {
      ManagedValue::Object(global) => global,
      other => {
        return Err(BridgeError::Engine(format!(
          "engine returned non-object global: {other:?}"
        )))
      }
    };
    let id = ContextId(self.contexts.len() as u32);
    self.contexts.push(Context { global });
    Ok(id)
  }

  pub fn enter_context(&mut self, context: ContextId) -> Result<(), BridgeError> {
    self.check_entered()?;
    if self.contexts.get(context.0 as usize).is_none() {
      return Err(Violation::NoContext.into());
    }
    self.context_stack.push(context);
    Ok(())
  }

  pub fn exit_context(&mut self) -> Result<(), BridgeError> {
    self.check_entered()?;
    match self.context_stack.pop() {
      Some(_) => Ok(()),
      None => Err(Violation::NoContext.into()),
    }
  }

  pub fn current_context(&self) -> Result<ContextId, BridgeError> {
    self.check_entered()?;
    self
      .context_stack
      .last()
      .copied()
      .ok_or_else(|| Violation::NoContext.into())
  }

  /// The global object of `context`, as a local handle.
  pub fn global(&mut self, context: ContextId) -> Result<Local, BridgeError> {
    self.check_entered()?;
    let global = self
      .contexts
      .get(context.0 as usize)
      .ok_or(Violation::NoContext)?
      .global;
    self.table.allocate(ManagedValue::Object(global))
  }

  // ---- native callbacks and templates ----

  /// Registers a natively implemented callback; allowed in any non-disposed state.
  pub fn register_native_callback(
    &mut self,
    meta: NativeCallbackMeta,
  ) -> Result<NativeCallbackId, BridgeError> {
    self.check_not_disposed()?;
    Ok(self.callbacks.register(meta))
  }

  pub fn create_function_template(
    &mut self,
    name: &str,
    callback: NativeCallbackId,
  ) -> Result<TemplateId, BridgeError> {
    self.check_not_disposed()?;
    if self.callbacks.meta(callback).is_none() {
      return Err(Violation::UnknownCallback.into());
    }
    Ok(self.templates.define(TemplateShape::Function {
      name: name.to_string(),
      callback,
    }))
  }

  pub fn create_object_template(&mut self) -> Result<TemplateId, BridgeError> {
    self.check_not_disposed()?;
    Ok(self.templates.define(TemplateShape::Object))
  }

  /// Adds a property to a template; fails with [`Violation::TemplateSealed`] once the template
  /// has been instantiated.
  pub fn template_set(
    &mut self,
    template: TemplateId,
    key: &str,
    property: TemplateProperty,
  ) -> Result<(), BridgeError> {
    self.check_not_disposed()?;
    self.templates.set_property(template, key, property)
  }

  /// Instantiates a template into a live managed object/function, sealing it.
  pub fn instantiate_template(&mut self, template: TemplateId) -> Result<Local, BridgeError> {
    self.check_entered()?;
    let value = self.instantiate_template_value(template, 0)?;
    self.table.allocate(value)
  }

  fn instantiate_template_value(
    &mut self,
    template: TemplateId,
    depth: u32,
  ) -> Result<ManagedValue, BridgeError> {
    if depth >= MAX_TEMPLATE_DEPTH {
      return Err(Violation::TemplateCycle.into());
    }
    let template = self.templates.seal(template)?;
    let instance = match &template.shape {
      TemplateShape::Function { name, callback } => self
        .engine
        .make_native_function(name, *callback)
        .map_err(dispatch::engine_to_bridge)?,
      TemplateShape::Object => self.engine.make_object().map_err(dispatch::engine_to_bridge)?,
    };
    for (key, property) in &template.properties {
      let value = match property {
        TemplateProperty::Value(value) => value.clone(),
        TemplateProperty::Template(nested) => self.instantiate_template_value(*nested, depth + 1)?,
      };
      self
        .engine
        .set_property(&instance, key, value)
        .map_err(dispatch::engine_to_bridge)?;
    }
    Ok(instance)
  }

  // ---- property access ----

  pub fn get_property(&mut self, target: Local, key: &str) -> Result<Local, BridgeError> {
    self.check_entered()?;
    let target = self.table.resolve(target)?.clone();
    let value = self
      .engine
      .get_property(&target, key)
      .map_err(dispatch::engine_to_bridge)?;
    self.table.allocate(value)
  }

  pub fn set_property(
    &mut self,
    target: Local,
    key: &str,
    value: Local,
  ) -> Result<(), BridgeError> {
    self.check_entered()?;
    let target = self.table.resolve(target)?.clone();
    let value = self.table.resolve(value)?.clone();
    self
      .engine
      .set_property(&target, key, value)
      .map_err(dispatch::engine_to_bridge)
  }

  // ---- boundary calls ----

  /// Calls a managed function. The result — even a primitive — comes back as a new local handle
  /// in the caller's current scope.
  pub fn call_function(
    &mut self,
    callee: Local,
    this: Option<Local>,
    args: &[Local],
  ) -> Result<Local, BridgeError> {
    self.call_function_named("call", callee, this, args)
  }

  /// As [`Isolate::call_function`], with an explicit profiler call-site name.
  pub fn call_function_named(
    &mut self,
    site: &str,
    callee: Local,
    this: Option<Local>,
    args: &[Local],
  ) -> Result<Local, BridgeError> {
    self.check_entered()?;
    let callee = match self.table.resolve(callee)? {
      ManagedValue::Function(f) => *f,
      _ => return Err(Violation::NotCallable.into()),
    };
    self.call_function_ref(site, callee, this, args)
  }

  fn call_function_ref(
    &mut self,
    site: &str,
    callee: FunctionRef,
    this: Option<Local>,
    args: &[Local],
  ) -> Result<Local, BridgeError> {
    let this = match this {
      Some(handle) => self.table.resolve(handle)?.clone(),
      None => ManagedValue::Undefined,
    };
    let mut arg_values = Vec::with_capacity(args.len());
    for arg in args {
      arg_values.push(self.table.resolve(*arg)?.clone());
    }

    let Self {
      engine,
      table,
      callbacks,
      profiler,
      token,
      ..
    } = self;
    let mut state = DispatchState {
      table,
      registry: callbacks,
      profiler,
      token,
      depth: 0,
    };
    let result =
      dispatch::call_into_managed(engine.as_mut(), &mut state, callee, &this, &arg_values, site)?;
    self.table.allocate(result)
  }

  /// Invokes a natively implemented callback through the same dispatch path managed code uses
  /// (scope per call, arity check, profiling). This is how the host drives module bindings.
  pub fn call_native(
    &mut self,
    callback: NativeCallbackId,
    this: Option<Local>,
    args: &[Local],
  ) -> Result<Local, BridgeError> {
    self.check_entered()?;
    let this = match this {
      Some(handle) => self.table.resolve(handle)?.clone(),
      None => ManagedValue::Undefined,
    };
    let mut arg_values = Vec::with_capacity(args.len());
    for arg in args {
      arg_values.push(self.table.resolve(*arg)?.clone());
    }

    let Self {
      engine,
      table,
      callbacks,
      profiler,
      token,
      ..
    } = self;
    let mut state = DispatchState {
      table,
      registry: callbacks,
      profiler,
      token,
      depth: 0,
    };
    let result = state
      .call_native(engine.as_mut(), callback, &this, &arg_values)
      .map_err(dispatch::engine_to_bridge)?;
    self.table.allocate(result)
  }

  // ---- core modules ----

  /// Instantiates snapshot IR and registers the resulting callable under `name`.
  pub fn register_core_module(&mut self, name: &str, ir: &[u8]) -> Result<(), BridgeError> {
    self.check_entered()?;
    match self.engine.instantiate(ir).map_err(dispatch::engine_to_bridge)? {
      ManagedValue::Function(entry) => {
        self.modules.insert(name, entry);
        Ok(())
      }
      other => Err(BridgeError::Engine(format!(
        "core module {name:?} did not instantiate to a callable: {other:?}"
      ))),
    }
  }

  /// Looks up a core module entry point by logical name; a miss is `Ok(None)`.
  pub fn lookup_core_module(&mut self, name: &str) -> Result<Option<Local>, BridgeError> {
    self.check_entered()?;
    match self.modules.lookup(name) {
      Some(entry) => Ok(Some(self.table.allocate(ManagedValue::Function(entry))?)),
      None => Ok(None),
    }
  }

  /// Calls a core module entry point by name; the name doubles as the profiler call site.
  pub fn call_core_module(&mut self, name: &str, args: &[Local]) -> Result<Local, BridgeError> {
    self.check_entered()?;
    let Some(entry) = self.modules.lookup(name) else {
      return Err(BridgeError::Engine(format!("unknown core module: {name:?}")));
    };
    self.call_function_ref(name, entry, None, args)
  }

  pub fn core_module_names(&self) -> Vec<&str> {
    self.modules.names()
  }

  // ---- diagnostics ----

  pub fn set_boundary_profiling(&mut self, enabled: bool) {
    self.profiler.set_enabled(enabled);
  }

  /// Accumulated profiler records in deterministic order. Off the startup-critical path.
  pub fn profiler_records(&self) -> Vec<ProfileRecord> {
    self.profiler.records()
  }

  /// Number of live handles in the table (local + persistent), for leak diagnostics.
  pub fn live_handles(&self) -> usize {
    self.table.live_handles()
  }

  /// Formats a bridge error into a host-visible string, using the engine's string conversion for
  /// thrown script values.
  pub fn format_error(&mut self, err: &BridgeError) -> String {
    match err {
      BridgeError::Exception(value) => match self.engine.to_managed_string(value) {
        Ok(s) => s.to_utf8_lossy(),
        Err(_) => format!("{value:?}"),
      },
      other => other.to_string(),
    }
  }
}
