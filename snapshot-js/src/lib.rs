//! Startup-script snapshots for `bridge-js`.
//!
//! Re-parsing a fixed set of startup scripts on every process launch is the dominant
//! startup-latency cost; this crate compiles them once — through the managed engine's parser —
//! into a versioned binary blob that is loaded read-only at every subsequent start.
//!
//! # Blob layout (all integers little-endian)
//!
//! ```text
//! [format-version: u32]
//! [checksum: u64]            FNV-1a over every byte after this field
//! [entry-count: u32]
//! entry * N:
//!   [name-len: u32][name bytes (UTF-8)][offset: u32][length: u32]
//! [payload bytes]            offsets are relative to payload start
//! ```
//!
//! Compilation is deterministic: entries are sorted by module name and the layout contains no
//! timestamps, so identical sources and compiler version produce byte-identical blobs.
//! Loading validates the version tag first, then the checksum, then the entry table — and
//! rejects the blob outright rather than attempting partial interpretation.

use bridge_js::{BridgeError, EngineError, Isolate, ManagedEngine};
use serde::Serialize;
use tracing::debug;

/// Current snapshot format version. Loaders reject any other value rather than guessing
/// compatibility.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Bytes before the entry table: version (4) + checksum (8).
const HEADER_LEN: usize = 12;

/// Errors from snapshot compilation, loading, or installation.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
  /// The blob's format-version tag is not one this loader understands. Fails fast, before any
  /// script executes.
  #[error("incompatible snapshot: format version {found} (supported: {supported})")]
  IncompatibleSnapshot { found: u32, supported: u32 },

  /// The content checksum does not match; the blob is corrupt or was mutated.
  #[error("snapshot checksum mismatch")]
  ChecksumMismatch,

  /// The blob ends before its declared structure does.
  #[error("snapshot truncated")]
  Truncated,

  /// An entry's name is not UTF-8 or its payload range is out of bounds.
  #[error("malformed snapshot entry {index}")]
  MalformedEntry { index: u32 },

  /// Two sources were given the same logical module name.
  #[error("duplicate module name {0:?}")]
  DuplicateModule(String),

  /// The engine failed to parse a source during compilation.
  #[error("engine failed to compile module {name:?}")]
  Compile {
    name: String,
    #[source]
    source: EngineError,
  },

  /// Installing an entry into an isolate failed.
  #[error(transparent)]
  Bridge(#[from] BridgeError),
}

/// One entry-point record: logical module name plus its IR's location in the payload.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotEntry {
  pub name: String,
  pub offset: u32,
  pub length: u32,
}

/// A validated, loaded snapshot. Read-only; never mutated after load.
#[derive(Debug)]
pub struct Snapshot {
  entries: Vec<SnapshotEntry>,
  payload: Vec<u8>,
}

impl Snapshot {
  /// Entry points, in the (name-sorted) order the compiler wrote them.
  pub fn entries(&self) -> &[SnapshotEntry] {
    &self.entries
  }

  /// The serialized function-tree IR for `name`, if present.
  pub fn ir(&self, name: &str) -> Option<&[u8]> {
    let entry = self.entries.iter().find(|entry| entry.name == name)?;
    self
      .payload
      .get(entry.offset as usize..(entry.offset + entry.length) as usize)
  }

  /// Instantiates every entry through the isolate's engine and registers it in the isolate's
  /// core-module registry. The isolate must be entered.
  pub fn install(&self, isolate: &mut Isolate) -> Result<(), SnapshotError> {
    for entry in &self.entries {
      let range = entry.offset as usize..(entry.offset + entry.length) as usize;
      let ir = self.payload.get(range).ok_or(SnapshotError::Truncated)?;
      isolate.register_core_module(&entry.name, ir)?;
    }
    debug!(modules = self.entries.len(), "snapshot installed");
    Ok(())
  }
}

/// Compiles `sources` (logical module name, source text) into a snapshot blob.
///
/// Parsing goes through the managed engine so the blob holds exactly the function-tree IR that
/// engine will instantiate at load time.
pub fn compile(
  engine: &mut dyn ManagedEngine,
  sources: &[(&str, &str)],
) -> Result<Vec<u8>, SnapshotError> {
  let mut sorted: Vec<(&str, &str)> = sources.to_vec();
  sorted.sort_by_key(|(name, _)| *name);
  for pair in sorted.windows(2) {
    if pair[0].0 == pair[1].0 {
      return Err(SnapshotError::DuplicateModule(pair[0].0.to_string()));
    }
  }

  let mut payload = Vec::new();
  let mut entries = Vec::with_capacity(sorted.len());
  for (name, source) in &sorted {
    let ir = engine
      .parse(name, source)
      .map_err(|source| SnapshotError::Compile {
        name: name.to_string(),
        source,
      })?;
    let offset = u32::try_from(payload.len()).map_err(|_| SnapshotError::Truncated)?;
    let length = u32::try_from(ir.len()).map_err(|_| SnapshotError::Truncated)?;
    payload.extend_from_slice(&ir);
    entries.push(SnapshotEntry {
      name: name.to_string(),
      offset,
      length,
    });
  }

  // Body = everything the checksum covers: entry table + payload.
  let mut body = Vec::new();
  body.extend_from_slice(&u32::try_from(entries.len()).map_err(|_| SnapshotError::Truncated)?.to_le_bytes());
  for entry in &entries {
    let name = entry.name.as_bytes();
    body.extend_from_slice(&u32::try_from(name.len()).map_err(|_| SnapshotError::Truncated)?.to_le_bytes());
    body.extend_from_slice(name);
    body.extend_from_slice(&entry.offset.to_le_bytes());
    body.extend_from_slice(&entry.length.to_le_bytes());
  }
  body.extend_from_slice(&payload);

  let mut blob = Vec::with_capacity(HEADER_LEN + body.len());
  blob.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
  blob.extend_from_slice(&fnv1a64(&body).to_le_bytes());
  blob.extend_from_slice(&body);
  debug!(modules = entries.len(), bytes = blob.len(), "snapshot compiled");
  Ok(blob)
}

/// Loads and validates a snapshot blob.
pub fn load(bytes: &[u8]) -> Result<Snapshot, SnapshotError> {
  let version = read_u32(bytes, 0).ok_or(SnapshotError::Truncated)?;
  if version != SNAPSHOT_VERSION {
    return Err(SnapshotError::IncompatibleSnapshot {
      found: version,
      supported: SNAPSHOT_VERSION,
    });
  }
  let checksum = read_u64(bytes, 4).ok_or(SnapshotError::Truncated)?;
  let body = bytes.get(HEADER_LEN..).ok_or(SnapshotError::Truncated)?;
  if fnv1a64(body) != checksum {
    return Err(SnapshotError::ChecksumMismatch);
  }

  let entry_count = read_u32(body, 0).ok_or(SnapshotError::Truncated)?;
  let mut pos = 4usize;
  let mut entries = Vec::with_capacity(entry_count as usize);
  for index in 0..entry_count {
    let name_len = read_u32(body, pos).ok_or(SnapshotError::Truncated)? as usize;
    pos += 4;
    let name_bytes = body
      .get(pos..pos + name_len)
      .ok_or(SnapshotError::Truncated)?;
    let name = std::str::from_utf8(name_bytes)
      .map_err(|_| SnapshotError::MalformedEntry { index })?
      .to_string();
    pos += name_len;
    let offset = read_u32(body, pos).ok_or(SnapshotError::Truncated)?;
    let length = read_u32(body, pos + 4).ok_or(SnapshotError::Truncated)?;
    pos += 8;
    entries.push(SnapshotEntry {
      name,
      offset,
      length,
    });
  }

  let payload = body.get(pos..).ok_or(SnapshotError::Truncated)?.to_vec();
  for (index, entry) in entries.iter().enumerate() {
    let end = entry.offset.checked_add(entry.length).map(|end| end as usize);
    if end.is_none() || end.unwrap_or(usize::MAX) > payload.len() {
      return Err(SnapshotError::MalformedEntry {
        index: index as u32,
      });
    }
  }

  Ok(Snapshot { entries, payload })
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
  bytes
    .get(at..at + 4)
    .and_then(|b| b.try_into().ok())
    .map(u32::from_le_bytes)
}

fn read_u64(bytes: &[u8], at: usize) -> Option<u64> {
  bytes
    .get(at..at + 8)
    .and_then(|b| b.try_into().ok())
    .map(u64::from_le_bytes)
}

/// FNV-1a, 64-bit. Stable across platforms and releases; the checksum is part of the wire
/// format, so it must never change behind a dependency bump.
fn fnv1a64(bytes: &[u8]) -> u64 {
  let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
  for byte in bytes {
    hash ^= *byte as u64;
    hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
  }
  hash
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fnv_vectors() {
    // Standard FNV-1a test vectors.
    assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
    assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
  }

  #[test]
  fn load_rejects_short_input() {
    assert!(matches!(load(&[1, 0]), Err(SnapshotError::Truncated)));
  }

  #[test]
  fn load_rejects_unknown_version_before_checksum() {
    // Version check fires first even though everything after it is garbage.
    let mut blob = Vec::new();
    blob.extend_from_slice(&99u32.to_le_bytes());
    blob.extend_from_slice(&[0u8; 16]);
    assert!(matches!(
      load(&blob),
      Err(SnapshotError::IncompatibleSnapshot {
        found: 99,
        supported: SNAPSHOT_VERSION
      })
    ));
  }

  #[test]
  fn load_rejects_corrupt_checksum() {
    let mut blob = Vec::new();
    blob.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    blob.extend_from_slice(&0u64.to_le_bytes());
    blob.extend_from_slice(&0u32.to_le_bytes());
    assert!(matches!(load(&blob), Err(SnapshotError::ChecksumMismatch)));
  }
}
