//! Point-in-time machine metrics
//!
//! Each resource is queried independently and may fail on its own. The
//! session collector treats any failure as fatal for the snapshot it is
//! building.

pub mod error;
pub mod system;

pub use error::{MetricsError, MetricsResult};
pub use system::SystemMetrics;

use crate::{CpuTimes, DiskUsage, MemoryUsage};

pub trait MetricsProvider: Send + Sync {
    fn memory(&self) -> MetricsResult<MemoryUsage>;

    /// Accumulated CPU times since boot (aggregated over all cores)
    fn cpu_times(&self) -> MetricsResult<Vec<CpuTimes>>;

    /// Usage of every mounted partition
    fn disk_usage(&self) -> MetricsResult<Vec<DiskUsage>>;
}
