use crate::engine::FunctionRef;
use ahash::AHashMap;
use tracing::debug;

/// Core module registry: logical module name → managed callable.
///
/// Populated from snapshot entry points at startup and queried by name during native module
/// resolution. An unknown name is a lookup miss, not an error; the host decides what missing
/// modules mean.
#[derive(Default, Debug)]
pub struct CoreModuleRegistry {
  modules: AHashMap<String, FunctionRef>,
}

impl CoreModuleRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers (or replaces) a core module entry point.
  pub fn insert(&mut self, name: &str, entry: FunctionRef) {
    debug!(module = name, "core module registered");
    self.modules.insert(name.to_string(), entry);
  }

  pub fn lookup(&self, name: &str) -> Option<FunctionRef> {
    self.modules.get(name).copied()
  }

  pub fn len(&self) -> usize {
    self.modules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.modules.is_empty()
  }

  /// Registered module names, sorted for deterministic iteration.
  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.modules.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }
}
