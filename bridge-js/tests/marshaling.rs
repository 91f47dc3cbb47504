use bridge_js::{
  BridgeError, Isolate, IsolateOptions, ManagedEngine, ManagedString, ManagedValue, Violation,
};
use engine_harness::ScriptedEngine;

fn isolate() -> Isolate {
  Isolate::new(Box::new(ScriptedEngine::new()), IsolateOptions::default())
}

fn compile(source: &str) -> Vec<u8> {
  let mut engine = ScriptedEngine::new();
  engine.parse("test", source).unwrap()
}

#[test]
fn non_ascii_strings_round_trip_through_the_boundary() {
  let mut iso = isolate();
  let ir = compile(r#"function id(x){ return x; }"#);
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("id", &ir).unwrap();

  let original = "héllo ☃ 日本語 𝄞";
  let arg = iso.string(original).unwrap();
  let out = iso.call_core_module("id", &[arg]).unwrap();
  assert_eq!(iso.to_rust_string(out).unwrap(), original);

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn concatenation_preserves_supplementary_plane_characters() {
  let mut iso = isolate();
  let ir = compile(r#"function greet(n){ return "hi " + n; }"#);
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("greet", &ir).unwrap();

  let arg = iso.string("𝄞-clef").unwrap();
  let out = iso.call_core_module("greet", &[arg]).unwrap();
  assert_eq!(iso.to_rust_string(out).unwrap(), "hi 𝄞-clef");

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn integer_width_and_signedness_survive_a_managed_call() {
  let mut iso = isolate();
  let ir = compile(r#"function id(x){ return x; }"#);
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();
  iso.register_core_module("id", &ir).unwrap();

  let neg = iso.integer(-5).unwrap();
  let out = iso.call_core_module("id", &[neg]).unwrap();
  assert_eq!(iso.value(out).unwrap(), ManagedValue::I32(-5));

  let big = iso.unsigned(u32::MAX).unwrap();
  let out = iso.call_core_module("id", &[big]).unwrap();
  assert_eq!(iso.value(out).unwrap(), ManagedValue::U32(u32::MAX));

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn to_rust_string_on_a_non_string_is_an_encoding_failure() {
  let mut iso = isolate();
  iso.enter().unwrap();
  let scope = iso.open_handle_scope().unwrap();

  let n = iso.integer(7).unwrap();
  assert!(matches!(
    iso.to_rust_string(n),
    Err(BridgeError::Violation(Violation::EncodingFailure))
  ));

  iso.close_handle_scope(scope).unwrap();
}

#[test]
fn unpaired_surrogates_fail_strict_conversion_only() {
  let lone = ManagedString::from_code_units(&[0x0068, 0xD800, 0x0069]);
  assert!(lone.to_utf8().is_err());
  assert_eq!(lone.to_utf8_lossy(), "h\u{FFFD}i");
}

#[test]
fn managed_string_is_explicit_length_not_nul_terminated() {
  let with_nul = ManagedString::from_code_units(&[0x0061, 0x0000, 0x0062]);
  assert_eq!(with_nul.len_code_units(), 3);
  assert_eq!(with_nul.to_utf8().unwrap(), "a\0b");
}
