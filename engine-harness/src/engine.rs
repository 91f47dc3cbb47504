use crate::parse::parse_module;
use crate::tree::{Body, Expr, FunctionTree, IrEnvelope, Term, IR_VERSION};
use ahash::AHashMap;
use bridge_js::{
  EngineError, FunctionRef, HostBoundary, ManagedEngine, ManagedString, ManagedValue,
  NativeCallbackId, ObjectRef,
};
use std::sync::Arc;

/// Recursion bound for scripted evaluation (mutually recursive module functions).
const MAX_EVAL_DEPTH: u32 = 128;

#[derive(Clone)]
enum FunctionImpl {
  Scripted {
    tree: Arc<FunctionTree>,
    /// Sibling functions from the same instantiated module, resolvable by identifier.
    module: Arc<AHashMap<String, FunctionRef>>,
  },
  Native {
    callback: NativeCallbackId,
  },
}

/// The harness engine: object/function stores keyed by opaque references.
#[derive(Default)]
pub struct ScriptedEngine {
  functions: AHashMap<u64, FunctionImpl>,
  objects: AHashMap<u64, AHashMap<String, ManagedValue>>,
  function_properties: AHashMap<u64, AHashMap<String, ManagedValue>>,
  next_ref: u64,
}

impl ScriptedEngine {
  pub fn new() -> Self {
    Self::default()
  }

  fn fresh_ref(&mut self) -> u64 {
    let id = self.next_ref;
    self.next_ref += 1;
    id
  }

  fn function_impl(&self, callee: FunctionRef) -> Result<FunctionImpl, EngineError> {
    self
      .functions
      .get(&callee.0)
      .cloned()
      .ok_or_else(|| EngineError::Internal(format!("dangling function reference {callee:?}")))
  }

  fn throw_str(message: String) -> EngineError {
    EngineError::Throw(ManagedValue::from_utf8(&message))
  }

  fn value_to_string(value: &ManagedValue) -> ManagedString {
    match value {
      ManagedValue::Undefined => ManagedString::from_utf8("undefined"),
      ManagedValue::Null => ManagedString::from_utf8("null"),
      ManagedValue::Bool(true) => ManagedString::from_utf8("true"),
      ManagedValue::Bool(false) => ManagedString::from_utf8("false"),
      ManagedValue::I32(n) => ManagedString::from_utf8(&n.to_string()),
      ManagedValue::U32(n) => ManagedString::from_utf8(&n.to_string()),
      ManagedValue::F64(n) => ManagedString::from_utf8(&format_number(*n)),
      ManagedValue::Str(s) => s.clone(),
      ManagedValue::Object(_) => ManagedString::from_utf8("[object Object]"),
      ManagedValue::Function(_) => ManagedString::from_utf8("function"),
    }
  }

  fn as_number(value: &ManagedValue) -> Result<f64, EngineError> {
    match value {
      ManagedValue::I32(n) => Ok(*n as f64),
      ManagedValue::U32(n) => Ok(*n as f64),
      ManagedValue::F64(n) => Ok(*n),
      other => Err(Self::throw_str(format!(
        "TypeError: {other:?} is not a number"
      ))),
    }
  }

  /// `a + b`: string concatenation if either side is a string, numeric addition otherwise.
  fn add(a: ManagedValue, b: ManagedValue) -> Result<ManagedValue, EngineError> {
    if matches!(a, ManagedValue::Str(_)) || matches!(b, ManagedValue::Str(_)) {
      let mut units = Self::value_to_string(&a).as_code_units().to_vec();
      units.extend_from_slice(Self::value_to_string(&b).as_code_units());
      Ok(ManagedValue::Str(ManagedString::from_code_units(&units)))
    } else {
      Ok(ManagedValue::F64(Self::as_number(&a)? + Self::as_number(&b)?))
    }
  }

  fn eval_function(
    &mut self,
    tree: &FunctionTree,
    module: &AHashMap<String, FunctionRef>,
    args: &[ManagedValue],
    host: &mut dyn HostBoundary,
    depth: u32,
  ) -> Result<ManagedValue, EngineError> {
    if depth >= MAX_EVAL_DEPTH {
      return Err(EngineError::Internal(
        "scripted evaluation recursion limit".to_string(),
      ));
    }
    let mut bindings: AHashMap<&str, ManagedValue> = AHashMap::new();
    for (i, param) in tree.params.iter().enumerate() {
      let value = args.get(i).cloned().unwrap_or(ManagedValue::Undefined);
      bindings.insert(param.as_str(), value);
    }

    match &tree.body {
      Body::Return(expr) => self.eval_expr(expr, &bindings, module, host, depth),
      Body::Throw(expr) => {
        let value = self.eval_expr(expr, &bindings, module, host, depth)?;
        Err(EngineError::Throw(value))
      }
    }
  }

  fn eval_expr(
    &mut self,
    expr: &Expr,
    bindings: &AHashMap<&str, ManagedValue>,
    module: &AHashMap<String, FunctionRef>,
    host: &mut dyn HostBoundary,
    depth: u32,
  ) -> Result<ManagedValue, EngineError> {
    let mut acc: Option<ManagedValue> = None;
    for term in &expr.terms {
      let value = self.eval_term(term, bindings, module, host, depth)?;
      acc = Some(match acc {
        None => value,
        Some(prev) => Self::add(prev, value)?,
      });
    }
    acc.ok_or_else(|| EngineError::Internal("empty expression".to_string()))
  }

  fn eval_term(
    &mut self,
    term: &Term,
    bindings: &AHashMap<&str, ManagedValue>,
    module: &AHashMap<String, FunctionRef>,
    host: &mut dyn HostBoundary,
    depth: u32,
  ) -> Result<ManagedValue, EngineError> {
    match term {
      Term::Str(s) => Ok(ManagedValue::from_utf8(s)),
      Term::Num(n) => Ok(ManagedValue::F64(*n)),
      Term::Ident(name) => self.resolve_ident(name, bindings, module),
      Term::Call { callee, args } => {
        let callee = match self.resolve_ident(callee, bindings, module)? {
          ManagedValue::Function(f) => f,
          other => {
            return Err(Self::throw_str(format!(
              "TypeError: {other:?} is not callable"
            )))
          }
        };
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
          arg_values.push(self.eval_expr(arg, bindings, module, host, depth)?);
        }
        self.call_ref(callee, &ManagedValue::Undefined, &arg_values, host, depth + 1)
      }
    }
  }

  fn resolve_ident(
    &self,
    name: &str,
    bindings: &AHashMap<&str, ManagedValue>,
    module: &AHashMap<String, FunctionRef>,
  ) -> Result<ManagedValue, EngineError> {
    if let Some(value) = bindings.get(name) {
      return Ok(value.clone());
    }
    if let Some(sibling) = module.get(name) {
      return Ok(ManagedValue::Function(*sibling));
    }
    Err(Self::throw_str(format!(
      "ReferenceError: {name} is not defined"
    )))
  }

  fn call_ref(
    &mut self,
    callee: FunctionRef,
    this: &ManagedValue,
    args: &[ManagedValue],
    host: &mut dyn HostBoundary,
    depth: u32,
  ) -> Result<ManagedValue, EngineError> {
    match self.function_impl(callee)? {
      FunctionImpl::Scripted { tree, module } => {
        self.eval_function(&tree, &module, args, host, depth)
      }
      FunctionImpl::Native { callback } => host.call_native(self, callback, this, args),
    }
  }
}

fn format_number(n: f64) -> String {
  if n.is_nan() {
    "NaN".to_string()
  } else if n.is_infinite() {
    if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
  } else if n == n.trunc() && n.abs() < 1e15 {
    format!("{}", n as i64)
  } else {
    format!("{n}")
  }
}

impl ManagedEngine for ScriptedEngine {
  fn parse(&mut self, _name: &str, source: &str) -> Result<Vec<u8>, EngineError> {
    let module = parse_module(source)?;
    let envelope = IrEnvelope {
      version: IR_VERSION,
      module,
    };
    bincode::serialize(&envelope)
      .map_err(|err| EngineError::Internal(format!("IR serialization failed: {err}")))
  }

  fn instantiate(&mut self, ir: &[u8]) -> Result<ManagedValue, EngineError> {
    let envelope: IrEnvelope = bincode::deserialize(ir)
      .map_err(|err| EngineError::MalformedIr(err.to_string()))?;
    if envelope.version != IR_VERSION {
      return Err(EngineError::MalformedIr(format!(
        "IR version {found} unsupported (expected {IR_VERSION})",
        found = envelope.version
      )));
    }

    // Two passes so sibling functions can reference each other by name.
    let mut by_name: AHashMap<String, FunctionRef> = AHashMap::new();
    let mut refs = Vec::with_capacity(envelope.module.functions.len());
    for tree in &envelope.module.functions {
      let id = self.fresh_ref();
      by_name.insert(tree.name.clone(), FunctionRef(id));
      refs.push(id);
    }
    let module = Arc::new(by_name);
    let mut entry = None;
    for (tree, id) in envelope.module.functions.into_iter().zip(refs) {
      entry.get_or_insert(FunctionRef(id));
      self.functions.insert(
        id,
        FunctionImpl::Scripted {
          tree: Arc::new(tree),
          module: module.clone(),
        },
      );
    }
    entry
      .map(ManagedValue::Function)
      .ok_or_else(|| EngineError::MalformedIr("module defines no functions".to_string()))
  }

  fn call(
    &mut self,
    callee: FunctionRef,
    this: &ManagedValue,
    args: &[ManagedValue],
    host: &mut dyn HostBoundary,
  ) -> Result<ManagedValue, EngineError> {
    self.call_ref(callee, this, args, host, 0)
  }

  fn make_object(&mut self) -> Result<ManagedValue, EngineError> {
    let id = self.fresh_ref();
    self.objects.insert(id, AHashMap::new());
    Ok(ManagedValue::Object(ObjectRef(id)))
  }

  fn make_native_function(
    &mut self,
    name: &str,
    callback: NativeCallbackId,
  ) -> Result<ManagedValue, EngineError> {
    let id = self.fresh_ref();
    self.functions.insert(id, FunctionImpl::Native { callback });
    self
      .function_properties
      .entry(id)
      .or_default()
      .insert("name".to_string(), ManagedValue::from_utf8(name));
    Ok(ManagedValue::Function(FunctionRef(id)))
  }

  fn get_property(
    &mut self,
    target: &ManagedValue,
    key: &str,
  ) -> Result<ManagedValue, EngineError> {
    let properties = match target {
      ManagedValue::Object(obj) => self.objects.get(&obj.0),
      ManagedValue::Function(f) => self.function_properties.get(&f.0),
      other => {
        return Err(Self::throw_str(format!(
          "TypeError: cannot read {key:?} of {other:?}"
        )))
      }
    };
    let properties =
      properties.ok_or_else(|| EngineError::Internal("dangling reference".to_string()))?;
    Ok(properties.get(key).cloned().unwrap_or(ManagedValue::Undefined))
  }

  fn set_property(
    &mut self,
    target: &ManagedValue,
    key: &str,
    value: ManagedValue,
  ) -> Result<(), EngineError> {
    let properties = match target {
      ManagedValue::Object(obj) => self.objects.get_mut(&obj.0),
      ManagedValue::Function(f) => Some(self.function_properties.entry(f.0).or_default()),
      other => {
        return Err(Self::throw_str(format!(
          "TypeError: cannot set {key:?} on {other:?}"
        )))
      }
    };
    let properties =
      properties.ok_or_else(|| EngineError::Internal("dangling reference".to_string()))?;
    properties.insert(key.to_string(), value);
    Ok(())
  }

  fn to_managed_string(&mut self, value: &ManagedValue) -> Result<ManagedString, EngineError> {
    Ok(Self::value_to_string(value))
  }
}
