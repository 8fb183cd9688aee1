//! Rolling load gauges and the elapsed-time counter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

/// Samples kept per gauge.
pub const GAUGE_HISTORY: usize = 15;

/// Source of machine load samples, in percent.
pub trait LoadSource {
    fn cpu_percent(&mut self) -> f64;
    fn memory_percent(&mut self) -> f64;
}

/// Load of the local machine, read through `sysinfo`.
pub struct SystemLoad {
    sys: System,
}

impl SystemLoad {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new()
                .with_cpu(CpuRefreshKind::everything())
                .with_memory(MemoryRefreshKind::everything()),
        );
        Self { sys }
    }
}

impl Default for SystemLoad {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSource for SystemLoad {
    fn cpu_percent(&mut self) -> f64 {
        self.sys.refresh_cpu();
        self.sys.global_cpu_info().cpu_usage() as f64
    }

    fn memory_percent(&mut self) -> f64 {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return 0.0;
        }
        self.sys.used_memory() as f64 * 100.0 / total as f64
    }
}

/// Fixed-width history of percentage samples; the oldest falls off the left.
#[derive(Debug, Clone)]
pub struct RollingGauge {
    history: VecDeque<u64>,
    width: usize,
}

impl RollingGauge {
    pub fn new(width: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(width),
            width,
        }
    }

    pub fn push(&mut self, percent: f64) {
        let sample = if percent.is_finite() {
            percent.clamp(0.0, 100.0).round() as u64
        } else {
            0
        };
        if self.history.len() == self.width {
            self.history.pop_front();
        }
        self.history.push_back(sample);
    }

    pub fn history(&self) -> Vec<u64> {
        self.history.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<u64> {
        self.history.back().copied()
    }
}

/// Wall-clock time since the dashboard came up, refreshed on each tick.
#[derive(Debug, Clone)]
pub struct ElapsedTimer {
    started: Instant,
    elapsed: Duration,
}

impl ElapsedTimer {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn update(&mut self) {
        self.elapsed = self.started.elapsed();
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// `HH:MM:SS`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_keeps_fixed_width() {
        let mut gauge = RollingGauge::new(3);
        for v in [10.0, 20.0, 30.0, 40.0] {
            gauge.push(v);
        }
        assert_eq!(gauge.history(), vec![20, 30, 40]);
        assert_eq!(gauge.latest(), Some(40));
    }

    #[test]
    fn test_gauge_clamps_samples() {
        let mut gauge = RollingGauge::new(GAUGE_HISTORY);
        gauge.push(-5.0);
        gauge.push(250.0);
        gauge.push(f64::NAN);
        assert_eq!(gauge.history(), vec![0, 100, 0]);
    }

    #[test]
    fn test_elapsed_format() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_secs(3725)), "01:02:05");
    }
}
