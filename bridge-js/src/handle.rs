use core::fmt;

/// A stable identifier for a slot in the [`HandleTable`](crate::HandleTable).
///
/// This is a packed `{ index: u32, generation: u32 }`.
/// - `index` selects a slot in the table's slot vector.
/// - `generation` is incremented each time that slot is invalidated.
///
/// A `HandleId` resolves only if the slot at `index` is live and its generation matches. Anything
/// else is a detectable use-after-invalidate, reported as
/// [`Violation::InvalidHandle`](crate::Violation::InvalidHandle) — never silently tolerated.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct HandleId(pub(crate) u64);

impl HandleId {
  pub(crate) fn from_parts(index: u32, generation: u32) -> Self {
    Self((index as u64) | ((generation as u64) << 32))
  }

  /// The slot index within the table.
  #[inline]
  pub fn index(self) -> u32 {
    self.0 as u32
  }

  /// The generation of the slot when this handle was issued.
  #[inline]
  pub fn generation(self) -> u32 {
    (self.0 >> 32) as u32
  }
}

impl fmt::Debug for HandleId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HandleId")
      .field("index", &self.index())
      .field("generation", &self.generation())
      .finish()
  }
}

/// A local handle: valid only while the handle scope it was allocated in is open.
///
/// Closing that scope bulk-invalidates every local allocated within it (and within any nested
/// scopes), unless the handle was escaped to the enclosing scope first.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct Local(pub(crate) HandleId);

impl Local {
  /// The underlying [`HandleId`].
  #[inline]
  pub fn id(self) -> HandleId {
    self.0
  }
}

/// A persistent handle: survives scope closure until explicitly released.
///
/// Reference counted; [`persist`](crate::HandleTable::persist) increments, and
/// [`release`](crate::HandleTable::release) decrements. Releasing an already-dead persistent
/// handle is [`Violation::DoubleRelease`](crate::Violation::DoubleRelease).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct Persistent(pub(crate) HandleId);

impl Persistent {
  /// The underlying [`HandleId`].
  #[inline]
  pub fn id(self) -> HandleId {
    self.0
  }
}

/// Identifier for an open handle scope, used by the embedding API's explicit
/// open/close surface. Scopes are strictly LIFO.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(transparent)]
pub struct ScopeId(pub(crate) u32);
