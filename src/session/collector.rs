//! Collector - assembles the one snapshot a session sends
//!
//! ## Steps
//!
//! ```text
//! stream stat → addresses → memory → cpu → disk → records → encode → handoff
//!                           └──── any failure aborts ────┘            │
//!                                                    encode failure aborts
//! ```
//!
//! Metrics and serialization are all-or-nothing: a single failure discards
//! the snapshot and the coordinator resets the stream. Record store failures
//! only cost the records.

use std::sync::Arc;

use tracing::{debug, error, instrument, trace, warn};

use super::NodeContext;
use super::handoff::HandoffSender;
use super::messages::CollectorOutcome;
use crate::metrics::MetricsError;
use crate::{Record, Snapshot, StreamStat};

pub struct Collector {
    peer: String,
    stat: StreamStat,
    ctx: Arc<NodeContext>,
    queue: HandoffSender<String>,
}

impl Collector {
    pub fn new(
        peer: String,
        stat: StreamStat,
        ctx: Arc<NodeContext>,
        queue: HandoffSender<String>,
    ) -> Self {
        Self {
            peer,
            stat,
            ctx,
            queue,
        }
    }

    #[instrument(skip(self), fields(peer = %self.peer))]
    pub async fn run(self) -> CollectorOutcome {
        debug!("collecting snapshot");

        let line = match self.collect().await {
            Ok(snapshot) => match snapshot.encode() {
                Ok(line) => line,
                Err(e) => {
                    error!("failed to encode snapshot: {e}");
                    return CollectorOutcome::Aborted(format!("encode: {e}"));
                }
            },
            Err(reason) => return CollectorOutcome::Aborted(reason),
        };

        trace!("handing off {} bytes", line.len());

        match self.queue.send(line).await {
            Ok(()) => {
                debug!("snapshot handed to sender");
                CollectorOutcome::Delivered
            }
            Err(e) => {
                warn!("snapshot not delivered: {e}");
                CollectorOutcome::Undelivered
            }
        }
    }

    async fn collect(&self) -> Result<Snapshot, String> {
        let addresses = self.ctx.directory.local_addresses();
        let metrics = &self.ctx.metrics;

        let memory = metrics.memory().map_err(|e| abort("memory", e))?;
        let cpu = metrics.cpu_times().map_err(|e| abort("cpu", e))?;
        let disk = metrics.disk_usage().map_err(|e| abort("disk", e))?;

        let records = self.load_records().await;

        Ok(Snapshot {
            stats: self.stat,
            addresses,
            memory: Some(memory),
            cpu,
            disk,
            records,
        })
    }

    async fn load_records(&self) -> Vec<Record> {
        match self.ctx.store.list_all().await {
            Ok(records) => {
                if records.is_empty() {
                    debug!("record store is empty");
                }
                records
            }
            Err(e) => {
                warn!("failed to list records, sending none: {e}");
                Vec::new()
            }
        }
    }
}

fn abort(resource: &str, err: MetricsError) -> String {
    error!("{resource} query failed: {err}");
    format!("{resource}: {err}")
}
