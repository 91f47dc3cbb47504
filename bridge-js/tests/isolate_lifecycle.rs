use bridge_js::{BridgeError, Isolate, IsolateOptions, IsolateState, Violation};
use engine_harness::ScriptedEngine;

fn isolate() -> Isolate {
  Isolate::new(Box::new(ScriptedEngine::new()), IsolateOptions::default())
}

#[test]
fn operations_require_an_entered_isolate() {
  let mut iso = isolate();
  assert_eq!(iso.state(), IsolateState::Created);
  assert!(matches!(
    iso.open_handle_scope(),
    Err(BridgeError::Violation(Violation::NotEntered))
  ));

  iso.enter().unwrap();
  assert_eq!(iso.state(), IsolateState::Entered);
  let scope = iso.open_handle_scope().unwrap();
  iso.close_handle_scope(scope).unwrap();

  iso.exit().unwrap();
  assert_eq!(iso.state(), IsolateState::Exited);
  assert!(matches!(
    iso.string("late"),
    Err(BridgeError::Violation(Violation::NotEntered))
  ));
}

#[test]
fn double_enter_on_the_same_thread_is_a_violation() {
  let mut iso = isolate();
  iso.enter().unwrap();
  assert!(matches!(
    iso.enter(),
    Err(BridgeError::Violation(Violation::AlreadyEntered))
  ));
}

#[test]
fn exit_without_enter_is_a_violation() {
  let mut iso = isolate();
  assert!(matches!(
    iso.exit(),
    Err(BridgeError::Violation(Violation::NotEntered))
  ));
}

#[test]
fn dispose_is_terminal() {
  let mut iso = isolate();
  iso.enter().unwrap();
  // Dispose exits the current thread's entry implicitly.
  iso.dispose().unwrap();
  assert_eq!(iso.state(), IsolateState::Disposed);

  assert!(matches!(
    iso.enter(),
    Err(BridgeError::Violation(Violation::IsolateDisposed))
  ));
  assert!(matches!(
    iso.dispose(),
    Err(BridgeError::Violation(Violation::IsolateDisposed))
  ));
  assert!(matches!(
    iso.open_handle_scope(),
    Err(BridgeError::Violation(Violation::IsolateDisposed))
  ));
}

#[test]
fn entered_isolate_rejects_other_threads() {
  let mut iso = isolate();
  iso.enter().unwrap();

  std::thread::scope(|s| {
    s.spawn(|| {
      assert!(matches!(
        iso.enter(),
        Err(BridgeError::Violation(Violation::WrongThread))
      ));
      assert!(matches!(
        iso.open_handle_scope(),
        Err(BridgeError::Violation(Violation::WrongThread))
      ));
      assert!(matches!(
        iso.dispose(),
        Err(BridgeError::Violation(Violation::WrongThread))
      ));
    });
  });
}

#[test]
fn explicit_hand_off_moves_the_isolate_between_threads() {
  let mut iso = isolate();
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  let pinned_local = iso.string("carried across").unwrap();
  let pinned = iso.persist(pinned_local).unwrap();
  iso.close_handle_scope(scope).unwrap();
  iso.exit().unwrap();

  std::thread::scope(|s| {
    s.spawn(|| {
      iso.enter().unwrap();
      let scope = iso.open_handle_scope().unwrap();
      let local = iso.local_from_persistent(pinned).unwrap();
      assert_eq!(iso.to_rust_string(local).unwrap(), "carried across");
      iso.close_handle_scope(scope).unwrap();
      iso.release(pinned).unwrap();
      iso.exit().unwrap();
    });
  });

  iso.enter().unwrap();
  assert_eq!(iso.live_handles(), 0);
}
