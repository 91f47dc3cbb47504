use crate::engine::ManagedValue;
use crate::error::{BridgeError, Violation};
use crate::handle::{HandleId, Local, Persistent, ScopeId};

/// Construction-time handle table limits.
#[derive(Debug, Clone, Copy)]
pub struct HandleTableLimits {
  /// Hard cap on live handles (local + persistent). Exceeding it is
  /// [`BridgeError::CapacityExceeded`], which is recoverable: the host may release handles and
  /// retry.
  pub max_handles: usize,
}

impl Default for HandleTableLimits {
  fn default() -> Self {
    Self {
      max_handles: 1 << 20,
    }
  }
}

#[derive(Debug)]
enum SlotState {
  Free { next_free: Option<u32> },
  Local { value: ManagedValue },
  Persistent { value: ManagedValue, refs: u32 },
}

#[derive(Debug)]
struct Slot {
  generation: u32,
  state: SlotState,
}

#[derive(Debug, Clone, Copy)]
struct ScopeFrame {
  id: ScopeId,
  arena_start: usize,
}

/// The isolate's handle table: a flat slot arena with generation-checked handles and
/// stack-disciplined local-handle scopes.
///
/// Native code written against the host's embedding API assumes deterministic, stack-like handle
/// lifetime. The table reproduces that exactly:
/// - every local handle is owned by the innermost open scope at allocation time,
/// - closing a scope truncates the local arena back to the scope's entry watermark and bumps the
///   generation of every freed slot, so stale handles are detectable,
/// - persistent handles live outside the arena and are reference counted.
///
/// The table is exclusively owned by its isolate; handles never cross isolates.
#[derive(Debug)]
pub struct HandleTable {
  limits: HandleTableLimits,
  slots: Vec<Slot>,
  free_head: Option<u32>,
  live: usize,
  /// Slot indices of live locals, in allocation order. Scope frames are watermarks into this.
  arena: Vec<u32>,
  scopes: Vec<ScopeFrame>,
  next_scope_id: u32,
}

impl HandleTable {
  pub fn new(limits: HandleTableLimits) -> Self {
    Self {
      limits,
      slots: Vec::new(),
      free_head: None,
      live: 0,
      arena: Vec::new(),
      scopes: Vec::new(),
      next_scope_id: 0,
    }
  }

  /// Number of live handles (local + persistent).
  pub fn live_handles(&self) -> usize {
    self.live
  }

  /// Number of currently open scopes.
  pub fn scope_depth(&self) -> usize {
    self.scopes.len()
  }

  /// Opens a new innermost handle scope.
  pub fn open_scope(&mut self) -> ScopeId {
    let id = ScopeId(self.next_scope_id);
    self.next_scope_id = self.next_scope_id.wrapping_add(1);
    self.scopes.push(ScopeFrame {
      id,
      arena_start: self.arena.len(),
    });
    id
  }

  /// Closes `scope`, invalidating every local handle allocated within it.
  ///
  /// Scopes are strictly LIFO: closing anything other than the innermost open scope is a
  /// [`Violation::ScopeOrderViolation`]. (Error-path unwinding that closes nested scopes in bulk
  /// goes through [`HandleTable::unwind_through`] instead.)
  pub fn close_scope(&mut self, scope: ScopeId) -> Result<(), BridgeError> {
    match self.scopes.last().copied() {
      Some(frame) if frame.id == scope => {
        self.scopes.pop();
        self.truncate_arena(frame.arena_start);
        Ok(())
      }
      _ => Err(Violation::ScopeOrderViolation.into()),
    }
  }

  /// Closes `scope` and every still-open scope nested inside it, innermost first.
  ///
  /// This is the bulk-unwind path used by the dispatcher when a call terminates abnormally; it
  /// guarantees scopes unwind in exact reverse creation order.
  pub fn unwind_through(&mut self, scope: ScopeId) -> Result<(), BridgeError> {
    let position = self
      .scopes
      .iter()
      .rposition(|frame| frame.id == scope)
      .ok_or(Violation::ScopeOrderViolation)?;
    let arena_start = self.scopes[position].arena_start;
    self.scopes.truncate(position);
    self.truncate_arena(arena_start);
    Ok(())
  }

  /// Registers `value` under the innermost open scope.
  pub fn allocate(&mut self, value: ManagedValue) -> Result<Local, BridgeError> {
    if self.scopes.is_empty() {
      return Err(Violation::NoOpenScope.into());
    }
    let (index, generation) = self.take_slot(SlotState::Local { value })?;
    self.arena.push(index);
    Ok(Local(HandleId::from_parts(index, generation)))
  }

  /// Resolves any handle to the managed value it references.
  ///
  /// Fails with [`Violation::InvalidHandle`] if the handle was never issued or has been
  /// invalidated; it must never return an unrelated value that happens to reuse the slot.
  pub fn resolve(&self, handle: impl Into<HandleId>) -> Result<&ManagedValue, BridgeError> {
    let id: HandleId = handle.into();
    match self.slot(id) {
      Some(Slot {
        state: SlotState::Local { value },
        ..
      }) => Ok(value),
      Some(Slot {
        state: SlotState::Persistent { value, .. },
        ..
      }) => Ok(value),
      _ => Err(Violation::InvalidHandle.into()),
    }
  }

  /// Promotes a local handle into a reference-counted persistent handle that survives its
  /// originating scope's closure. The local itself stays valid until its scope closes.
  pub fn persist(&mut self, local: Local) -> Result<Persistent, BridgeError> {
    let value = self.resolve(local)?.clone();
    let (index, generation) = self.take_slot(SlotState::Persistent { value, refs: 1 })?;
    Ok(Persistent(HandleId::from_parts(index, generation)))
  }

  /// Increments the reference count of a live persistent handle.
  pub fn persist_again(&mut self, persistent: Persistent) -> Result<Persistent, BridgeError> {
    match self.slot_mut(persistent.0) {
      Some(Slot {
        state: SlotState::Persistent { refs, .. },
        ..
      }) => {
        *refs += 1;
        Ok(persistent)
      }
      _ => Err(Violation::InvalidHandle.into()),
    }
  }

  /// Decrements a persistent handle's reference count, freeing the slot at zero.
  ///
  /// Releasing a handle whose slot is already dead is [`Violation::DoubleRelease`]; unrelated
  /// handles are unaffected either way.
  pub fn release(&mut self, persistent: Persistent) -> Result<(), BridgeError> {
    let id = persistent.0;
    let index = id.index() as usize;
    match self.slots.get_mut(index) {
      Some(slot) if slot.generation == id.generation() => match &mut slot.state {
        SlotState::Persistent { refs, .. } => {
          *refs -= 1;
          if *refs == 0 {
            self.free_slot(id.index());
          }
          Ok(())
        }
        // A live local slot under this id means the handle was never a persistent one.
        SlotState::Local { .. } => Err(Violation::InvalidHandle.into()),
        SlotState::Free { .. } => Err(Violation::DoubleRelease.into()),
      },
      // Generation mismatch: the persistent slot was already released and possibly reused.
      Some(_) => Err(Violation::DoubleRelease.into()),
      None => Err(Violation::InvalidHandle.into()),
    }
  }

  /// Re-homes `local` into the scope enclosing the innermost one, so it survives the innermost
  /// scope's closure. Returns the new handle; the original stays valid until its scope closes.
  pub fn escape(&mut self, local: Local) -> Result<Local, BridgeError> {
    if self.scopes.len() < 2 {
      return Err(Violation::ScopeOrderViolation.into());
    }
    let value = self.resolve(local)?.clone();
    let (index, generation) = self.take_slot(SlotState::Local { value })?;
    // Insert just below the innermost scope's watermark so the new handle belongs to the parent.
    let Some(innermost) = self.scopes.last_mut() else {
      return Err(Violation::ScopeOrderViolation.into());
    };
    let at = innermost.arena_start;
    innermost.arena_start += 1;
    self.arena.insert(at, index);
    Ok(Local(HandleId::from_parts(index, generation)))
  }

  fn slot(&self, id: HandleId) -> Option<&Slot> {
    self
      .slots
      .get(id.index() as usize)
      .filter(|slot| slot.generation == id.generation())
  }

  fn slot_mut(&mut self, id: HandleId) -> Option<&mut Slot> {
    self
      .slots
      .get_mut(id.index() as usize)
      .filter(|slot| slot.generation == id.generation())
  }

  fn take_slot(&mut self, state: SlotState) -> Result<(u32, u32), BridgeError> {
    if self.live >= self.limits.max_handles {
      return Err(BridgeError::CapacityExceeded);
    }
    self.live += 1;
    match self.free_head {
      Some(index) => {
        let slot = &mut self.slots[index as usize];
        let SlotState::Free { next_free } = slot.state else {
          unreachable!("free list points at an occupied slot");
        };
        self.free_head = next_free;
        slot.state = state;
        Ok((index, slot.generation))
      }
      None => {
        let index = u32::try_from(self.slots.len()).map_err(|_| BridgeError::CapacityExceeded)?;
        self.slots.push(Slot {
          generation: 0,
          state,
        });
        Ok((index, 0))
      }
    }
  }

  fn free_slot(&mut self, index: u32) {
    let slot = &mut self.slots[index as usize];
    debug_assert!(!matches!(slot.state, SlotState::Free { .. }));
    // Bumping the generation is what makes every outstanding handle to this slot stale.
    slot.generation = slot.generation.wrapping_add(1);
    slot.state = SlotState::Free {
      next_free: self.free_head,
    };
    self.free_head = Some(index);
    self.live -= 1;
  }

  fn truncate_arena(&mut self, arena_start: usize) {
    while self.arena.len() > arena_start {
      if let Some(index) = self.arena.pop() {
        self.free_slot(index);
      }
    }
  }
}

impl From<Local> for HandleId {
  fn from(local: Local) -> Self {
    local.0
  }
}

impl From<Persistent> for HandleId {
  fn from(persistent: Persistent) -> Self {
    persistent.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slot_reuse_bumps_generation() {
    let mut table = HandleTable::new(HandleTableLimits::default());
    let scope = table.open_scope();
    let a = table.allocate(ManagedValue::I32(1)).unwrap();
    table.close_scope(scope).unwrap();

    let scope = table.open_scope();
    let b = table.allocate(ManagedValue::I32(2)).unwrap();
    // Same slot, newer generation: the stale handle must not resolve.
    assert_eq!(a.id().index(), b.id().index());
    assert_ne!(a.id().generation(), b.id().generation());
    assert!(matches!(
      table.resolve(a),
      Err(BridgeError::Violation(Violation::InvalidHandle))
    ));
    assert_eq!(table.resolve(b).unwrap(), &ManagedValue::I32(2));
    table.close_scope(scope).unwrap();
  }

  #[test]
  fn capacity_is_recoverable() {
    let mut table = HandleTable::new(HandleTableLimits { max_handles: 2 });
    let scope = table.open_scope();
    table.allocate(ManagedValue::Null).unwrap();
    table.allocate(ManagedValue::Null).unwrap();
    assert!(matches!(
      table.allocate(ManagedValue::Null),
      Err(BridgeError::CapacityExceeded)
    ));
    table.close_scope(scope).unwrap();

    // After releasing, allocation works again.
    let scope = table.open_scope();
    table.allocate(ManagedValue::Null).unwrap();
    table.close_scope(scope).unwrap();
  }
}
