//! Metrics read from the running machine
//!
//! Memory and disks come from `sysinfo`. CPU times are accumulated counters,
//! which `sysinfo` does not expose, so they are read from `/proc/stat`.

use sysinfo::{Disks, System};
use tracing::{instrument, trace};

use super::error::{MetricsError, MetricsResult};
use super::MetricsProvider;
use crate::{CpuTimes, DiskUsage, MemoryUsage, percent_of};

/// Kernel clock ticks per second used by `/proc/stat` (USER_HZ)
const CLOCK_TICKS: f64 = 100.0;

/// Label of the aggregate counter, matching the per-core `cpuN` naming
const TOTAL_CPU_LABEL: &str = "cpu-total";

#[derive(Debug, Default)]
pub struct SystemMetrics;

impl SystemMetrics {
    pub fn new() -> Self {
        Self
    }
}

impl MetricsProvider for SystemMetrics {
    #[instrument(skip_all)]
    fn memory(&self) -> MetricsResult<MemoryUsage> {
        let mut sys = System::new();
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            return Err(MetricsError::Unavailable(
                "system reports no memory".to_string(),
            ));
        }

        let used = sys.used_memory();
        let memory = MemoryUsage {
            total,
            available: sys.available_memory(),
            used,
            percent: percent_of(used, total),
        };
        trace!("memory: {memory:?}");
        Ok(memory)
    }

    #[instrument(skip_all)]
    fn cpu_times(&self) -> MetricsResult<Vec<CpuTimes>> {
        read_cpu_times()
    }

    #[instrument(skip_all)]
    fn disk_usage(&self) -> MetricsResult<Vec<DiskUsage>> {
        let disks = Disks::new_with_refreshed_list();

        let usage: Vec<DiskUsage> = disks
            .list()
            .iter()
            .map(|disk| {
                let total = disk.total_space();
                let free = disk.available_space();
                let used = total.saturating_sub(free);
                DiskUsage {
                    path: disk.mount_point().to_string_lossy().to_string(),
                    fstype: disk.file_system().to_string_lossy().to_string(),
                    total,
                    free,
                    used,
                    percent: percent_of(used, total),
                }
            })
            .collect();

        trace!("found {} mounted partitions", usage.len());
        Ok(usage)
    }
}

#[cfg(target_os = "linux")]
fn read_cpu_times() -> MetricsResult<Vec<CpuTimes>> {
    let raw = std::fs::read_to_string("/proc/stat")?;
    parse_proc_stat(&raw)
}

#[cfg(not(target_os = "linux"))]
fn read_cpu_times() -> MetricsResult<Vec<CpuTimes>> {
    Err(MetricsError::Unsupported("cpu times"))
}

/// Parse the aggregate `cpu` line of `/proc/stat`
pub fn parse_proc_stat(raw: &str) -> MetricsResult<Vec<CpuTimes>> {
    let Some(rest) = raw.lines().find_map(|line| line.strip_prefix("cpu ")) else {
        return Err(MetricsError::ParseFailed(
            "no aggregate cpu line found".to_string(),
        ));
    };

    let ticks = rest
        .split_whitespace()
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|e| MetricsError::ParseFailed(format!("invalid counter {field:?}: {e}")))
        })
        .collect::<MetricsResult<Vec<f64>>>()?;

    if ticks.len() < 4 {
        return Err(MetricsError::ParseFailed(format!(
            "expected at least 4 cpu counters, got {}",
            ticks.len()
        )));
    }

    let seconds = |index: usize| ticks.get(index).copied().unwrap_or(0.0) / CLOCK_TICKS;

    Ok(vec![CpuTimes {
        cpu: TOTAL_CPU_LABEL.to_string(),
        user: seconds(0),
        nice: seconds(1),
        system: seconds(2),
        idle: seconds(3),
        iowait: seconds(4),
        irq: seconds(5),
        softirq: seconds(6),
        steal: seconds(7),
        guest: seconds(8),
        guest_nice: seconds(9),
    }])
}
