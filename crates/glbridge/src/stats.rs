use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for bridge activity.
///
/// Updated on the bridge thread; readable from the runner after the session for reporting.
#[derive(Debug, Default)]
pub struct BridgeStats {
    calls: AtomicU64,
    invalid_handles: AtomicU64,
    memory_faults: AtomicU64,
    invalid_arguments: AtomicU64,
    host_errors: AtomicU64,
    double_releases: AtomicU64,

    completions_applied: AtomicU64,
    completions_abandoned: AtomicU64,
    decode_failures: AtomicU64,
    dimension_writes_skipped: AtomicU64,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_calls(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_invalid_handles(&self) {
        self.invalid_handles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_memory_faults(&self) {
        self.memory_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_invalid_arguments(&self) {
        self.invalid_arguments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_host_errors(&self) {
        self.host_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_double_releases(&self) {
        self.double_releases.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_completions_applied(&self) {
        self.completions_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_completions_abandoned(&self) {
        self.completions_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_decode_failures(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dimension_writes_skipped(&self) {
        self.dimension_writes_skipped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            invalid_handles: self.invalid_handles.load(Ordering::Relaxed),
            memory_faults: self.memory_faults.load(Ordering::Relaxed),
            invalid_arguments: self.invalid_arguments.load(Ordering::Relaxed),
            host_errors: self.host_errors.load(Ordering::Relaxed),
            double_releases: self.double_releases.load(Ordering::Relaxed),
            completions_applied: self.completions_applied.load(Ordering::Relaxed),
            completions_abandoned: self.completions_abandoned.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            dimension_writes_skipped: self
                .dimension_writes_skipped
                .load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStatsSnapshot {
    pub calls: u64,
    pub invalid_handles: u64,
    pub memory_faults: u64,
    /// Negative counts, unknown pixel formats or types, and images too large to address.
    pub invalid_arguments: u64,
    pub host_errors: u64,
    pub double_releases: u64,

    pub completions_applied: u64,
    pub completions_abandoned: u64,
    pub decode_failures: u64,
    pub dimension_writes_skipped: u64,
}

impl BridgeStatsSnapshot {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_json_contains_counters() {
        let stats = BridgeStats::new();
        stats.inc_calls();
        stats.inc_calls();
        stats.inc_invalid_handles();
        stats.inc_completions_abandoned();
        let json = stats.snapshot().to_json();
        assert!(json.contains("\"calls\":2"));
        assert!(json.contains("\"invalid_handles\":1"));
        assert!(json.contains("\"completions_abandoned\":1"));
        assert!(json.contains("\"decode_failures\":0"));
    }
}
