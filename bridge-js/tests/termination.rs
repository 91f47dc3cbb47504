use bridge_js::{
  BoundaryCx, BridgeError, Isolate, IsolateOptions, IsolateState, Local, ManagedEngine,
  ManagedValue, NativeCallbackMeta, Termination, TerminationHandle,
};
use engine_harness::ScriptedEngine;
use std::sync::OnceLock;

fn isolate() -> Isolate {
  Isolate::new(Box::new(ScriptedEngine::new()), IsolateOptions::default())
}

fn compile(source: &str) -> Vec<u8> {
  let mut engine = ScriptedEngine::new();
  engine.parse("test", source).unwrap()
}

#[test]
fn pending_termination_stops_the_next_call() {
  let mut iso = isolate();
  let ir = compile(r#"function f(){ return 1; }"#);
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("f", &ir).unwrap();

  iso.termination_handle().terminate();
  let err = iso.call_core_module("f", &[]).unwrap_err();
  assert!(matches!(
    err,
    BridgeError::Terminated(Termination::Requested)
  ));
  assert!(!err.is_recoverable());

  // The isolate itself is unharmed; clearing the request makes it usable again.
  assert_eq!(iso.state(), IsolateState::Entered);
  iso.clear_termination();
  iso.call_core_module("f", &[]).unwrap();

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn termination_handle_works_from_another_thread() {
  let mut iso = isolate();
  let ir = compile(r#"function f(){ return 1; }"#);
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("f", &ir).unwrap();

  let handle = iso.termination_handle();
  std::thread::spawn(move || handle.terminate())
    .join()
    .unwrap();

  assert!(matches!(
    iso.call_core_module("f", &[]),
    Err(BridgeError::Terminated(Termination::Requested))
  ));

  iso.clear_termination();
  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn termination_requested_mid_chain_unwinds_to_the_host() {
  static HANDLE: OnceLock<TerminationHandle> = OnceLock::new();

  // Terminates its own isolate, then tries to re-enter managed code; the dispatcher
  // must refuse the crossing.
  fn saboteur(cx: &mut BoundaryCx, _this: Local, args: &[Local]) -> Result<Local, BridgeError> {
    HANDLE.get().unwrap().terminate();
    let undefined = cx.alloc(ManagedValue::Undefined)?;
    let zero = cx.alloc(ManagedValue::I32(0))?;
    let err = cx
      .call_function(args[0], undefined, &[args[1], zero])
      .unwrap_err();
    Err(err)
  }

  let mut iso = isolate();
  let id = iso
    .register_native_callback(NativeCallbackMeta {
      name: "saboteur",
      arity: Some(3),
      func: saboteur,
    })
    .unwrap();
  let template = iso.create_function_template("saboteur", id).unwrap();
  let ir = compile("function step(f, n){ return f(step, f, n); }");
  HANDLE.set(iso.termination_handle()).unwrap();

  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("step", &ir).unwrap();

  let f = iso.instantiate_template(template).unwrap();
  let n = iso.integer(1).unwrap();
  let live_before = iso.live_handles();

  let err = iso.call_core_module("step", &[f, n]).unwrap_err();
  assert!(matches!(
    err,
    BridgeError::Terminated(Termination::Requested)
  ));
  // The aborted chain released its callback scopes.
  assert_eq!(iso.live_handles(), live_before);

  iso.clear_termination();
  iso.close_handle_scope(scope).unwrap();
}
