use bridge_js::{BridgeError, Isolate, IsolateOptions, Violation};
use engine_harness::ScriptedEngine;

fn isolate() -> Isolate {
  Isolate::new(Box::new(ScriptedEngine::new()), IsolateOptions::default())
}

#[test]
fn contexts_nest_and_unwind() {
  let mut iso = isolate();
  iso.enter().unwrap();

  assert!(matches!(
    iso.current_context(),
    Err(BridgeError::Violation(Violation::NoContext))
  ));

  let a = iso.create_context().unwrap();
  let b = iso.create_context().unwrap();

  iso.enter_context(a).unwrap();
  assert_eq!(iso.current_context().unwrap(), a);
  iso.enter_context(b).unwrap();
  assert_eq!(iso.current_context().unwrap(), b);
  iso.exit_context().unwrap();
  assert_eq!(iso.current_context().unwrap(), a);
  iso.exit_context().unwrap();

  assert!(matches!(
    iso.exit_context(),
    Err(BridgeError::Violation(Violation::NoContext))
  ));
}

#[test]
fn each_context_has_its_own_global() {
  let mut iso = isolate();
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();

  let a = iso.create_context().unwrap();
  let b = iso.create_context().unwrap();

  let global_a = iso.global(a).unwrap();
  let global_b = iso.global(b).unwrap();
  assert_ne!(iso.value(global_a).unwrap(), iso.value(global_b).unwrap());

  let greeting = iso.string("only in a").unwrap();
  iso.set_property(global_a, "greeting", greeting).unwrap();

  let from_a = iso.get_property(global_a, "greeting").unwrap();
  assert_eq!(iso.to_rust_string(from_a).unwrap(), "only in a");
  let from_b = iso.get_property(global_b, "greeting").unwrap();
  assert!(iso.to_rust_string(from_b).is_err());

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn global_handles_follow_scope_lifetime() {
  let mut iso = isolate();
  iso.enter().unwrap();
  let context = iso.create_context().unwrap();

  let outer = iso.open_handle_scope().unwrap();
  let inner = iso.open_handle_scope().unwrap();
  let global = iso.global(context).unwrap();
  iso.close_handle_scope(inner).unwrap();

  // The handle died with its scope; the context and its global did not.
  assert!(matches!(
    iso.value(global),
    Err(BridgeError::Violation(Violation::InvalidHandle))
  ));
  let again = iso.global(context).unwrap();
  assert!(iso.value(again).is_ok());

  iso.close_handle_scope(outer).unwrap();
}
