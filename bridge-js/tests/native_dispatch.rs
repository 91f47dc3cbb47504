use bridge_js::{
  BoundaryCx, BridgeError, Isolate, IsolateOptions, Local, ManagedEngine, ManagedValue,
  NativeCallbackId, NativeCallbackMeta, Violation,
};
use engine_harness::ScriptedEngine;

fn isolate() -> Isolate {
  Isolate::new(Box::new(ScriptedEngine::new()), IsolateOptions::default())
}

fn compile(source: &str) -> Vec<u8> {
  let mut engine = ScriptedEngine::new();
  engine.parse("test", source).unwrap()
}

fn upcase(cx: &mut BoundaryCx, _this: Local, args: &[Local]) -> Result<Local, BridgeError> {
  let s = cx.to_rust_string(args[0])?;
  cx.alloc_str(&s.to_uppercase())
}

const UPCASE: NativeCallbackMeta = NativeCallbackMeta {
  name: "upcase",
  arity: Some(1),
  func: upcase,
};

#[test]
fn host_driven_native_call_round_trips() {
  let mut iso = isolate();
  let id = iso.register_native_callback(UPCASE).unwrap();
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();

  let arg = iso.string("quiet").unwrap();
  let out = iso.call_native(id, None, &[arg]).unwrap();
  assert_eq!(iso.to_rust_string(out).unwrap(), "QUIET");

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn arity_mismatch_is_fatal_and_unrecoverable() {
  let mut iso = isolate();
  let id = iso.register_native_callback(UPCASE).unwrap();
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();

  let err = iso.call_native(id, None, &[]).unwrap_err();
  assert!(matches!(
    err,
    BridgeError::Violation(Violation::ArityMismatch {
      expected: 1,
      got: 0
    })
  ));
  assert!(!err.is_recoverable());

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn unknown_callback_id_is_a_violation() {
  let mut iso = isolate();
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();

  assert!(matches!(
    iso.call_native(NativeCallbackId(99), None, &[]),
    Err(BridgeError::Violation(Violation::UnknownCallback))
  ));

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn callback_scratch_handles_die_with_the_call() {
  fn wasteful(cx: &mut BoundaryCx, _this: Local, _args: &[Local]) -> Result<Local, BridgeError> {
    for i in 0..16 {
      cx.alloc(ManagedValue::I32(i))?;
    }
    cx.alloc_str("done")
  }

  let mut iso = isolate();
  let id = iso
    .register_native_callback(NativeCallbackMeta {
      name: "wasteful",
      arity: None,
      func: wasteful,
    })
    .unwrap();
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();

  let before = iso.live_handles();
  let out = iso.call_native(id, None, &[]).unwrap();
  // Only the copied-out result survives the callback's own scope.
  assert_eq!(iso.live_handles(), before + 1);
  assert_eq!(iso.to_rust_string(out).unwrap(), "done");

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn managed_script_invokes_a_native_function() {
  let mut iso = isolate();
  let id = iso.register_native_callback(UPCASE).unwrap();
  let template = iso.create_function_template("upcase", id).unwrap();
  let ir = compile(r#"function shout(f, s){ return f(s) + "!"; }"#);

  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("shout", &ir).unwrap();

  let f = iso.instantiate_template(template).unwrap();
  let s = iso.string("hey").unwrap();
  let out = iso.call_core_module("shout", &[f, s]).unwrap();
  assert_eq!(iso.to_rust_string(out).unwrap(), "HEY!");

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn native_throw_crosses_as_a_script_exception() {
  fn refuse(cx: &mut BoundaryCx, _this: Local, _args: &[Local]) -> Result<Local, BridgeError> {
    Err(cx.throw_str("nope"))
  }

  let mut iso = isolate();
  let id = iso
    .register_native_callback(NativeCallbackMeta {
      name: "refuse",
      arity: None,
      func: refuse,
    })
    .unwrap();
  let template = iso.create_function_template("refuse", id).unwrap();
  let ir = compile(r#"function run(f){ return f(); }"#);

  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("run", &ir).unwrap();

  let f = iso.instantiate_template(template).unwrap();
  let err = iso.call_core_module("run", &[f]).unwrap_err();
  assert!(err.is_recoverable());
  match err {
    BridgeError::Exception(ManagedValue::Str(s)) => assert_eq!(s.to_utf8().unwrap(), "nope"),
    other => panic!("expected exception, got {other:?}"),
  }

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn calling_a_non_function_handle_is_a_violation() {
  let mut iso = isolate();
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();

  let not_callable = iso.integer(3).unwrap();
  assert!(matches!(
    iso.call_function(not_callable, None, &[]),
    Err(BridgeError::Violation(Violation::NotCallable))
  ));

  iso.close_handle_scope(scope).unwrap();
}
