use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A token observed by the dispatcher to detect cooperative termination requests.
///
/// The flag is checked at every boundary transition, never mid-script: a long managed computation
/// is only interrupted at the next native/managed crossing, so dispatcher-crossed frames are never
/// forcibly unwound.
#[derive(Debug, Clone)]
pub struct TerminationToken {
  requested: Arc<AtomicBool>,
}

impl TerminationToken {
  /// Create a new token + handle pair.
  pub fn new() -> (Self, TerminationHandle) {
    let requested = Arc::new(AtomicBool::new(false));
    (
      Self {
        requested: requested.clone(),
      },
      TerminationHandle { requested },
    )
  }

  pub fn is_requested(&self) -> bool {
    self.requested.load(Ordering::Relaxed)
  }

  /// Clears a pending request, so the isolate is usable again after the terminated call returns.
  pub fn clear(&self) {
    self.requested.store(false, Ordering::Relaxed);
  }
}

/// A host handle used to request termination of the owning isolate's current call chain.
///
/// Cloneable and sendable across threads, so a watchdog can interrupt an isolate it does not
/// own.
#[derive(Debug, Clone)]
pub struct TerminationHandle {
  requested: Arc<AtomicBool>,
}

impl TerminationHandle {
  /// Request that the dispatcher terminates at the next boundary transition.
  pub fn terminate(&self) {
    self.requested.store(true, Ordering::Relaxed);
  }
}
