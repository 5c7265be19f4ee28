//! Message and outcome types shared by the session roles

use chrono::{DateTime, Utc};

use crate::Snapshot;

/// Event published when a snapshot was decoded from a peer
///
/// Broadcast to every subscriber of the node context. Slow subscribers may
/// lag and miss events; the receiver never waits for them.
#[derive(Debug, Clone)]
pub struct SnapshotEvent {
    /// Remote identity of the stream the snapshot arrived on
    pub peer: String,

    pub snapshot: Snapshot,

    pub received_at: DateTime<Utc>,
}

/// How the collector finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorOutcome {
    /// The snapshot was taken by the sender
    Delivered,

    /// A metrics query or serialization failed; nothing was enqueued and the
    /// stream must be reset
    Aborted(String),

    /// The sender was gone before it took the snapshot
    Undelivered,

    /// Torn down by the coordinator before finishing
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverExit {
    /// The peer closed its write side
    Closed,

    ReadFailed(String),

    /// A frame did not decode as a snapshot
    Malformed(String),

    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverSummary {
    /// Snapshots decoded before the receiver exited
    pub decoded: usize,
    pub exit: ReceiverExit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderExit {
    /// The queue closed with nothing pending
    Drained,

    WriteFailed(String),

    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderSummary {
    /// Frames written and flushed
    pub written: usize,
    pub exit: SenderExit,
}

impl ReceiverExit {
    /// Whether this exit should tear the rest of the session down
    pub fn is_failure(&self) -> bool {
        matches!(self, ReceiverExit::ReadFailed(_) | ReceiverExit::Malformed(_))
    }
}

impl SenderExit {
    pub fn is_failure(&self) -> bool {
        matches!(self, SenderExit::WriteFailed(_))
    }
}

/// Everything that happened on one stream
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub peer: String,
    pub collector: CollectorOutcome,
    pub receiver: ReceiverSummary,
    pub sender: SenderSummary,

    /// The stream was closed abortively
    pub reset: bool,
}
