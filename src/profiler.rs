//! Scoped timing and memory sampling for one extraction.

use crate::schema::PerformanceMetrics;
use std::time::Instant;
use sysinfo::{Pid, System};

/// Measures wall time and resident-memory growth between `start` and `finish`.
///
/// Memory is sampled, not traced: call [`Profiler::sample`] at points of
/// interest; `finish` takes a final sample.
pub struct Profiler {
    started: Instant,
    system: System,
    pid: Option<Pid>,
    baseline: u64,
    peak: u64,
}

impl Profiler {
    pub fn start() -> Self {
        let mut profiler = Self {
            started: Instant::now(),
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
            baseline: 0,
            peak: 0,
        };
        profiler.baseline = profiler.resident_bytes();
        profiler.peak = profiler.baseline;
        profiler
    }

    /// Record the current resident set size.
    pub fn sample(&mut self) {
        let current = self.resident_bytes();
        self.peak = self.peak.max(current);
    }

    pub fn finish(mut self) -> PerformanceMetrics {
        self.sample();
        let elapsed = self.started.elapsed().as_secs_f64();
        let growth = self.peak.saturating_sub(self.baseline);
        PerformanceMetrics {
            execution_time_seconds: format!("{:.4}", elapsed),
            peak_memory_usage_mb: format!("{:.2}", growth as f64 / 1_000_000.0),
        }
    }

    fn resident_bytes(&mut self) -> u64 {
        let Some(pid) = self.pid else {
            return 0;
        };
        self.system.refresh_process(pid);
        self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_formatted() {
        let mut profiler = Profiler::start();
        let buffer = vec![0u8; 4 * 1024 * 1024];
        profiler.sample();
        drop(buffer);
        let metrics = profiler.finish();

        let seconds: f64 = metrics.execution_time_seconds.parse().unwrap();
        assert!(seconds >= 0.0);
        assert_eq!(metrics.execution_time_seconds.split('.').nth(1).map(str::len), Some(4));

        let mb: f64 = metrics.peak_memory_usage_mb.parse().unwrap();
        assert!(mb >= 0.0);
        assert_eq!(metrics.peak_memory_usage_mb.split('.').nth(1).map(str::len), Some(2));
    }
}
