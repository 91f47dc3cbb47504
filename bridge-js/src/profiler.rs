use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Which way a boundary transition crossed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
  /// Native host code calling into managed script.
  IntoManaged,
  /// Managed script calling a natively implemented function.
  IntoNative,
}

/// Identifies one instrumented call site: a direction plus the callee name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct CallSite {
  pub direction: Direction,
  pub name: String,
}

/// Number of log2 latency buckets; bucket `i` counts durations in `[2^i, 2^(i+1))` nanoseconds.
/// Fixed size, so per-site overhead is constant regardless of call volume.
const BUCKETS: usize = 32;

/// A constant-size log2-bucketed latency histogram.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LatencyHistogram {
  pub count: u64,
  pub total_ns: u64,
  pub max_ns: u64,
  buckets: Vec<u64>,
}

impl Default for LatencyHistogram {
  fn default() -> Self {
    Self {
      count: 0,
      total_ns: 0,
      max_ns: 0,
      buckets: vec![0; BUCKETS],
    }
  }
}

impl LatencyHistogram {
  fn record(&mut self, elapsed: Duration) {
    let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
    self.count += 1;
    self.total_ns = self.total_ns.saturating_add(ns);
    self.max_ns = self.max_ns.max(ns);
    let bucket = (63 - ns.max(1).leading_zeros() as usize).min(BUCKETS - 1);
    self.buckets[bucket] += 1;
  }

  pub fn buckets(&self) -> &[u64] {
    &self.buckets
  }

  pub fn mean_ns(&self) -> f64 {
    if self.count == 0 {
      0.0
    } else {
      self.total_ns as f64 / self.count as f64
    }
  }
}

/// One exported profiler record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileRecord {
  pub site: CallSite,
  pub histogram: LatencyHistogram,
}

/// Accumulates per-call-site latency histograms for boundary transitions.
///
/// A conditional observer, not a control-flow dependency: the dispatcher behaves identically
/// whether the profiler is enabled, disabled, or absent. Disabled recording is a single branch.
#[derive(Debug, Default)]
pub struct BoundaryProfiler {
  enabled: bool,
  sites: BTreeMap<CallSite, LatencyHistogram>,
}

impl BoundaryProfiler {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set_enabled(&mut self, enabled: bool) {
    self.enabled = enabled;
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// Records one transition. No-op while disabled.
  pub fn record(&mut self, direction: Direction, name: &str, elapsed: Duration) {
    if !self.enabled {
      return;
    }
    let site = CallSite {
      direction,
      name: name.to_string(),
    };
    self.sites.entry(site).or_default().record(elapsed);
  }

  /// Exports the accumulated records in deterministic (site-sorted) order.
  ///
  /// Off the startup-critical path; intended for external inspection.
  pub fn records(&self) -> Vec<ProfileRecord> {
    self
      .sites
      .iter()
      .map(|(site, histogram)| ProfileRecord {
        site: site.clone(),
        histogram: histogram.clone(),
      })
      .collect()
  }
}
