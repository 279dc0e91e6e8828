//! Process resource sampling for `run_pure --monitor`.

use crate::core::local_cluster::ClusterStats;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessSample {
    pub cpu_usage: f32,
    pub memory_mb: u64,
    pub peak_memory_mb: u64,
    pub elapsed: Duration,
}

/// Tuples emitted per second over `elapsed`.
pub fn throughput(stats: &ClusterStats, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    stats.total_emitted() as f64 / secs
}

#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: sysinfo::System,
    pid: Option<sysinfo::Pid>,
    started: Instant,
    peak_memory_mb: u64,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    /// `None` when monitoring is off.
    pub fn new(enabled: bool) -> Option<Self> {
        if !enabled {
            return None;
        }
        let pid = sysinfo::get_current_pid()
            .map_err(|e| tracing::warn!("Cannot determine current PID, no process stats: {}", e))
            .ok();

        Some(Self {
            system: sysinfo::System::new(),
            pid,
            started: Instant::now(),
            peak_memory_mb: 0,
        })
    }

    pub fn sample(&mut self) -> Option<ProcessSample> {
        let pid = self.pid?;
        self.system.refresh_processes(
            sysinfo::ProcessesToUpdate::Some(&[pid]),
            true,
        );
        let process = self.system.process(pid)?;

        let memory_mb = process.memory() / 1024 / 1024;
        self.peak_memory_mb = self.peak_memory_mb.max(memory_mb);
        Some(ProcessSample {
            cpu_usage: process.cpu_usage(),
            memory_mb,
            peak_memory_mb: self.peak_memory_mb,
            elapsed: self.started.elapsed(),
        })
    }

    pub fn log_sample(&mut self, phase: &str) {
        if let Some(sample) = self.sample() {
            tracing::info!(
                "{} - CPU: {:.1}%, Memory: {}MB, Peak: {}MB, Time: {:?}",
                phase,
                sample.cpu_usage,
                sample.memory_mb,
                sample.peak_memory_mb,
                sample.elapsed
            );
        }
    }

    pub fn log_summary(&mut self, stats: &ClusterStats) {
        self.log_sample("End");
        let elapsed = self.started.elapsed();
        tracing::info!(
            "Emitted {} tuples in {:?} ({:.0} tuples/s), peak memory {}MB",
            stats.total_emitted(),
            elapsed,
            throughput(stats, elapsed),
            self.peak_memory_mb
        );
    }
}

// without the cli feature there is nothing to sample with
#[cfg(not(feature = "cli"))]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Option<Self> {
        None
    }

    pub fn sample(&mut self) -> Option<ProcessSample> {
        None
    }

    pub fn log_sample(&mut self, _phase: &str) {}

    pub fn log_summary(&mut self, _stats: &ClusterStats) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_of_empty_run() {
        let stats = ClusterStats::default();
        assert_eq!(throughput(&stats, Duration::ZERO), 0.0);
        assert_eq!(throughput(&stats, Duration::from_secs(2)), 0.0);
    }

    #[test]
    fn test_disabled_monitor() {
        assert!(SystemMonitor::new(false).is_none());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_sample_tracks_peak_memory() {
        let mut monitor = SystemMonitor::new(true).unwrap();
        if let Some(sample) = monitor.sample() {
            assert!(sample.peak_memory_mb >= sample.memory_mb);
        }
    }
}
