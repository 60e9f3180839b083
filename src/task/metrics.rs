//! Task metrics for the map-reduce runner.
//!
//! Lock-free counters per task kind plus a bounded window of the slowest
//! recent tasks. One collector is shared (behind `Arc`) by a runner and
//! everything that issues tasks through it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use crate::task::TaskKind;

/// Maximum number of slow tasks to retain for reporting.
const MAX_SLOW_TASKS: usize = 10;

/// Tasks taking at least this long are recorded as slow.
pub const SLOW_TASK_THRESHOLD_MS: u64 = 100;

/// A recorded slow task.
#[derive(Clone, Debug, PartialEq)]
pub struct SlowTask {
    pub name: String,
    pub kind: TaskKind,
    pub duration_ms: u64,
    pub segments: u64,
}

/// Thread-safe task metrics collector.
pub struct TaskMetrics {
    reduce_count: AtomicU64,
    transform_count: AtomicU64,
    produce_count: AtomicU64,
    failed_count: AtomicU64,
    segments_processed: AtomicU64,
    total_ms: AtomicU64,
    slow_tasks: Mutex<VecDeque<SlowTask>>,
    started_at: Instant,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub reduce_count: u64,
    pub transform_count: u64,
    pub produce_count: u64,
    pub failed_count: u64,
    pub segments_processed: u64,
    pub total_ms: u64,
    pub uptime_secs: u64,
    pub slow_tasks: Vec<SlowTask>,
}

impl MetricsSnapshot {
    pub fn task_count(&self) -> u64 {
        self.reduce_count + self.transform_count + self.produce_count
    }
}

impl Default for TaskMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskMetrics {
    pub fn new() -> Self {
        Self {
            reduce_count: AtomicU64::new(0),
            transform_count: AtomicU64::new(0),
            produce_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            segments_processed: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            slow_tasks: Mutex::new(VecDeque::with_capacity(MAX_SLOW_TASKS)),
            started_at: Instant::now(),
        }
    }

    /// Record one finished task, successful or not.
    pub fn record_task(&self, name: &str, kind: TaskKind, segments: usize, duration_ms: u64, ok: bool) {
        let counter = match kind {
            TaskKind::Reduce => &self.reduce_count,
            TaskKind::TransformInPlace => &self.transform_count,
            TaskKind::Produce => &self.produce_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.failed_count.fetch_add(1, Ordering::Relaxed);
        }
        self.segments_processed
            .fetch_add(segments as u64, Ordering::Relaxed);
        self.total_ms.fetch_add(duration_ms, Ordering::Relaxed);

        if duration_ms >= SLOW_TASK_THRESHOLD_MS {
            let mut slow = self.slow_tasks.lock().unwrap();
            if slow.len() >= MAX_SLOW_TASKS {
                slow.pop_front();
            }
            slow.push_back(SlowTask {
                name: name.to_string(),
                kind,
                duration_ms,
                segments: segments as u64,
            });
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reduce_count: self.reduce_count.load(Ordering::Relaxed),
            transform_count: self.transform_count.load(Ordering::Relaxed),
            produce_count: self.produce_count.load(Ordering::Relaxed),
            failed_count: self.failed_count.load(Ordering::Relaxed),
            segments_processed: self.segments_processed.load(Ordering::Relaxed),
            total_ms: self.total_ms.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
            slow_tasks: self.slow_tasks.lock().unwrap().iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counts_per_kind() {
        let m = TaskMetrics::new();
        m.record_task("sum", TaskKind::Reduce, 4, 1, true);
        m.record_task("noise", TaskKind::TransformInPlace, 4, 1, true);
        m.record_task("filter", TaskKind::Produce, 2, 1, false);

        let s = m.snapshot();
        assert_eq!(s.reduce_count, 1);
        assert_eq!(s.transform_count, 1);
        assert_eq!(s.produce_count, 1);
        assert_eq!(s.failed_count, 1);
        assert_eq!(s.segments_processed, 10);
        assert_eq!(s.task_count(), 3);
    }

    #[test]
    fn test_slow_task_window_is_bounded() {
        let m = TaskMetrics::new();
        for i in 0..(MAX_SLOW_TASKS + 5) {
            m.record_task(&format!("t{}", i), TaskKind::Produce, 1, SLOW_TASK_THRESHOLD_MS, true);
        }
        m.record_task("fast", TaskKind::Produce, 1, 0, true);

        let s = m.snapshot();
        assert_eq!(s.slow_tasks.len(), MAX_SLOW_TASKS);
        assert_eq!(s.slow_tasks.last().unwrap().name, format!("t{}", MAX_SLOW_TASKS + 4));
    }

    #[test]
    fn test_concurrent_recording() {
        let m = Arc::new(TaskMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = Arc::clone(&m);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_task("r", TaskKind::Reduce, 1, 0, true);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(m.snapshot().reduce_count, 800);
    }
}
