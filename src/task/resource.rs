//! System resource detection and adaptive tuning for the task runner.
//!
//! Detects available RAM and CPU cores, then computes how many worker
//! threads map-reduce tasks use and how many rows a freshly built segment
//! holds. Stateless: each call to `ResourceManager::auto_tune()` re-probes
//! the system.

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

// ── Constants ───────────────────────────────────────────────────────

const GB: u64 = 1024 * 1024 * 1024;

/// Estimated bytes per row of one column (f64 value plus bitmap share).
const BYTES_PER_ROW: usize = 9;

/// Segment floor (rows).
const SEGMENT_ROWS_MIN: usize = 1_024;

/// Segment ceiling (rows).
const SEGMENT_ROWS_MAX: usize = 1_048_576;

/// Fraction of available memory one segment may occupy.
const SEGMENT_FRACTION: f64 = 0.000_5;

/// Upper bound on worker threads.
const WORKER_THREADS_MAX: usize = 64;

// ── SystemResources ─────────────────────────────────────────────────

/// Snapshot of detected hardware resources.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total physical RAM in bytes.
    pub total_memory_bytes: u64,
    /// Available (re-usable) RAM in bytes.
    pub available_memory_bytes: u64,
    /// Logical CPU count.
    pub cpu_count: usize,
}

impl SystemResources {
    /// Probe the current system for RAM and CPU information.
    pub fn detect() -> Self {
        let mut sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        sys.refresh_memory();

        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            total_memory_bytes: sys.total_memory(),
            available_memory_bytes: sys.available_memory(),
            cpu_count,
        }
    }

    /// Memory pressure indicator (0.0 = no pressure, 1.0 = critical).
    pub fn memory_pressure(&self) -> f64 {
        if self.total_memory_bytes == 0 {
            return 1.0;
        }
        let ratio = self.available_memory_bytes as f64 / self.total_memory_bytes as f64;
        (1.0 - ratio).clamp(0.0, 1.0)
    }
}

// ── TuningProfile ───────────────────────────────────────────────────

/// Adaptive parameters computed from system resources.
#[derive(Debug, Clone)]
pub struct TuningProfile {
    /// Threads in the map-reduce worker pool.
    pub worker_threads: usize,
    /// Rows per segment for newly built tables.
    pub rows_per_segment: usize,
    /// Memory pressure at detection time (0.0 = no pressure, 1.0 = critical).
    pub memory_pressure: f64,
}

impl TuningProfile {
    /// Compute a tuning profile from detected resources.
    ///
    /// Heuristics:
    /// - `worker_threads`: RAM < 2 GB -> `min(cpu, 2)`, else `clamp(cpu, 1, 64)`.
    /// - `rows_per_segment`: `clamp(available * 0.0005 / 9, 1024, 1M)`.
    pub fn from_resources(res: &SystemResources) -> Self {
        let worker_threads = if res.total_memory_bytes < 2 * GB {
            res.cpu_count.clamp(1, 2)
        } else {
            res.cpu_count.clamp(1, WORKER_THREADS_MAX)
        };

        let segment_bytes = (res.available_memory_bytes as f64 * SEGMENT_FRACTION) as usize;
        let rows_per_segment = (segment_bytes / BYTES_PER_ROW).clamp(SEGMENT_ROWS_MIN, SEGMENT_ROWS_MAX);

        Self {
            worker_threads,
            rows_per_segment,
            memory_pressure: res.memory_pressure(),
        }
    }
}

impl Default for TuningProfile {
    /// Conservative defaults suitable for tests and unknown environments.
    fn default() -> Self {
        Self {
            worker_threads: 1,
            rows_per_segment: 65_536,
            memory_pressure: 0.0,
        }
    }
}

// ── ResourceManager ─────────────────────────────────────────────────

/// Stateless utility: detect system resources and compute tuning profile.
pub struct ResourceManager;

impl ResourceManager {
    /// Probe the system and return an adaptive tuning profile.
    pub fn auto_tune() -> TuningProfile {
        let resources = SystemResources::detect();
        TuningProfile::from_resources(&resources)
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper: build `SystemResources` with explicit values (bypasses detection).
    fn make_resources(total_gb: f64, available_gb: f64, cpus: usize) -> SystemResources {
        SystemResources {
            total_memory_bytes: (total_gb * GB as f64) as u64,
            available_memory_bytes: (available_gb * GB as f64) as u64,
            cpu_count: cpus,
        }
    }

    #[test]
    fn test_system_resources_detection() {
        let res = SystemResources::detect();
        assert!(res.cpu_count >= 1, "cpu count must be at least 1");
    }

    #[test]
    fn test_low_memory_caps_threads() {
        let res = make_resources(1.0, 0.5, 8);
        let profile = TuningProfile::from_resources(&res);
        assert_eq!(profile.worker_threads, 2);
    }

    #[test]
    fn test_threads_follow_cpu_count() {
        let res = make_resources(16.0, 8.0, 12);
        assert_eq!(TuningProfile::from_resources(&res).worker_threads, 12);

        let res = make_resources(512.0, 256.0, 256);
        assert_eq!(TuningProfile::from_resources(&res).worker_threads, 64);
    }

    #[test]
    fn test_segment_rows_bounded() {
        let tiny = make_resources(1.0, 0.001, 1);
        assert_eq!(TuningProfile::from_resources(&tiny).rows_per_segment, SEGMENT_ROWS_MIN);

        let huge = make_resources(1024.0, 1024.0, 32);
        assert_eq!(TuningProfile::from_resources(&huge).rows_per_segment, SEGMENT_ROWS_MAX);
    }

    #[test]
    fn test_tuning_profile_default() {
        let profile = TuningProfile::default();
        assert_eq!(profile.worker_threads, 1);
        assert_eq!(profile.rows_per_segment, 65_536);
    }

    #[test]
    fn test_memory_pressure() {
        let res = make_resources(1.0, 0.25, 2);
        let pressure = res.memory_pressure();
        assert!(
            (pressure - 0.75).abs() < 1e-9,
            "expected pressure ~0.75, got {pressure}"
        );
    }
}
