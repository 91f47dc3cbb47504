use bridge_js::{
  BoundaryCx, BridgeError, Direction, Isolate, IsolateOptions, Local, ManagedEngine,
  NativeCallbackMeta,
};
use engine_harness::ScriptedEngine;

fn profiled_isolate() -> Isolate {
  Isolate::new(
    Box::new(ScriptedEngine::new()),
    IsolateOptions {
      profile_boundary: true,
      ..IsolateOptions::default()
    },
  )
}

fn compile(source: &str) -> Vec<u8> {
  let mut engine = ScriptedEngine::new();
  engine.parse("test", source).unwrap()
}

fn echo(cx: &mut BoundaryCx, _this: Local, args: &[Local]) -> Result<Local, BridgeError> {
  Ok(args[0])
}

const ECHO: NativeCallbackMeta = NativeCallbackMeta {
  name: "echo",
  arity: Some(1),
  func: echo,
};

#[test]
fn both_directions_are_recorded_per_site() {
  let mut iso = profiled_isolate();
  let id = iso.register_native_callback(ECHO).unwrap();
  let template = iso.create_function_template("echo", id).unwrap();
  let ir = compile(r#"function relay(f, x){ return f(x); }"#);

  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("relay", &ir).unwrap();

  let f = iso.instantiate_template(template).unwrap();
  for i in 0..3 {
    let x = iso.integer(i).unwrap();
    iso.call_core_module("relay", &[f, x]).unwrap();
  }
  iso.close_handle_scope(scope).unwrap();

  let records = iso.profiler_records();
  let relay = records
    .iter()
    .find(|r| r.site.direction == Direction::IntoManaged && r.site.name == "relay")
    .expect("into-managed site");
  assert_eq!(relay.histogram.count, 3);
  assert!(relay.histogram.max_ns > 0);

  let echo = records
    .iter()
    .find(|r| r.site.direction == Direction::IntoNative && r.site.name == "echo")
    .expect("into-native site");
  assert_eq!(echo.histogram.count, 3);
  assert!(echo.histogram.buckets().iter().sum::<u64>() == 3);
}

#[test]
fn disabled_profiler_stays_empty() {
  let mut iso = Isolate::new(Box::new(ScriptedEngine::new()), IsolateOptions::default());
  let ir = compile(r#"function f(){ return 1; }"#);
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("f", &ir).unwrap();
  iso.call_core_module("f", &[]).unwrap();
  iso.close_handle_scope(scope).unwrap();

  assert!(iso.profiler_records().is_empty());
}

#[test]
fn profiling_toggles_at_runtime() {
  let mut iso = Isolate::new(Box::new(ScriptedEngine::new()), IsolateOptions::default());
  let ir = compile(r#"function f(){ return 1; }"#);
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("f", &ir).unwrap();

  iso.call_core_module("f", &[]).unwrap();
  assert!(iso.profiler_records().is_empty());

  iso.set_boundary_profiling(true);
  iso.call_core_module("f", &[]).unwrap();
  assert_eq!(iso.profiler_records().len(), 1);

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn records_export_as_json() {
  let mut iso = profiled_isolate();
  let ir = compile(r#"function f(){ return "ok"; }"#);
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("f", &ir).unwrap();
  iso.call_core_module("f", &[]).unwrap();
  iso.close_handle_scope(scope).unwrap();

  let json = serde_json::to_string(&iso.profiler_records()).unwrap();
  assert!(json.contains(r#""direction":"into_managed""#));
  assert!(json.contains(r#""name":"f""#));
}
