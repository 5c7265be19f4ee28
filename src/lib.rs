pub mod config;
pub mod directory;
pub mod metrics;
pub mod session;
pub mod storage;
pub mod transport;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// One snapshot of local machine state as it travels over the wire.
///
/// Encoded as a single line of JSON; the field names are part of the protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub stats: StreamStat,
    pub addresses: Vec<String>,
    pub memory: Option<MemoryUsage>,
    pub cpu: Vec<CpuTimes>,
    pub disk: Vec<DiskUsage>,
    pub records: Vec<Record>,
}

impl Snapshot {
    /// Serialize into a single line (without the trailing terminator)
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(line: &str) -> serde_json::Result<Snapshot> {
        serde_json::from_str(line)
    }
}

/// Metadata of the stream a snapshot was collected for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStat {
    pub direction: Direction,
    pub opened: DateTime<Utc>,
    pub transient: bool,
}

impl StreamStat {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            opened: Utc::now(),
            transient: false,
        }
    }
}

/// Which side opened the stream. Travels as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Direction {
    Unknown,
    Inbound,
    Outbound,
}

impl From<Direction> for u8 {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Unknown => 0,
            Direction::Inbound => 1,
            Direction::Outbound => 2,
        }
    }
}

impl TryFrom<u8> for Direction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Direction::Unknown),
            1 => Ok(Direction::Inbound),
            2 => Ok(Direction::Outbound),
            _ => Err(format!("unknown stream direction: {value}")),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Unknown => write!(f, "unknown"),
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    #[serde(serialize_with = "finite")]
    pub percent: f64,
}

/// Accumulated CPU time per counter since boot, in seconds
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuTimes {
    pub cpu: String,
    #[serde(serialize_with = "finite")]
    pub user: f64,
    #[serde(serialize_with = "finite")]
    pub system: f64,
    #[serde(serialize_with = "finite")]
    pub idle: f64,
    #[serde(serialize_with = "finite")]
    pub nice: f64,
    #[serde(serialize_with = "finite")]
    pub iowait: f64,
    #[serde(serialize_with = "finite")]
    pub irq: f64,
    #[serde(serialize_with = "finite")]
    pub softirq: f64,
    #[serde(serialize_with = "finite")]
    pub steal: f64,
    #[serde(serialize_with = "finite")]
    pub guest: f64,
    #[serde(serialize_with = "finite")]
    pub guest_nice: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub path: String,
    pub fstype: String,
    pub total: u64,
    pub free: u64,
    pub used: u64,
    #[serde(serialize_with = "finite")]
    pub percent: f64,
}

/// A persisted named record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub name: String,
}

impl Record {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// JSON has no NaN or infinity; refuse them instead of writing `null`
fn finite<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if !value.is_finite() {
        return Err(serde::ser::Error::custom(format!(
            "cannot encode non-finite number {value}"
        )));
    }
    serializer.serialize_f64(*value)
}

/// Usage ratio in percent, zero when nothing is available
pub(crate) fn percent_of(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    used as f64 / total as f64 * 100.0
}
