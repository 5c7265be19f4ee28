//! Stream session protocol
//!
//! Every stream between two nodes runs one session: three concurrent roles
//! bound to the stream, supervised by a coordinator task.
//!
//! ## Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │ Coordinator (start)  │  owns the stream, joins the roles
//!                 └──────────┬───────────┘
//!                            │ spawns
//!        ┌───────────────────┼────────────────────┐
//!        │                   │                    │
//! ┌──────▼──────┐     ┌──────▼──────┐      ┌──────▼──────┐
//! │  Receiver   │     │  Collector  │─────▶│   Sender    │
//! │ (read half) │     │ (runs once) │handoff│(write half) │
//! └─────────────┘     └─────────────┘      └─────────────┘
//! ```
//!
//! - **Receiver**: decodes inbound snapshots and publishes them as events
//! - **Collector**: builds this node's snapshot and hands it over
//! - **Sender**: writes handed-over snapshots as lines
//!
//! ## Teardown
//!
//! The session ends once Receiver and Sender have both exited. A clean
//! sender exit shuts the write half down so the peer sees end of stream. A
//! collector abort, a transport error, or a malformed frame stops the other
//! roles; a collector abort additionally resets the stream.

pub mod collector;
pub mod handoff;
pub mod messages;
pub mod receiver;
pub mod sender;
pub mod stream;

use std::sync::Arc;

use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, instrument, warn};

use crate::config::SessionConfig;
use crate::directory::Directory;
use crate::metrics::MetricsProvider;
use crate::storage::RecordStore;

use self::collector::Collector;
use self::handoff::Shutdown;
use self::receiver::Receiver;
use self::sender::Sender;

pub use self::messages::{
    CollectorOutcome, ReceiverExit, ReceiverSummary, SenderExit, SenderSummary, SessionReport,
    SnapshotEvent,
};
pub use self::stream::{MemoryStream, SessionStream};

/// Capacity of the snapshot event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Local node state every session draws from
pub struct NodeContext {
    pub directory: Arc<dyn Directory>,
    pub metrics: Arc<dyn MetricsProvider>,
    pub store: Arc<dyn RecordStore>,
    pub config: SessionConfig,
    events: broadcast::Sender<SnapshotEvent>,
}

impl NodeContext {
    pub fn new(
        directory: Arc<dyn Directory>,
        metrics: Arc<dyn MetricsProvider>,
        store: Arc<dyn RecordStore>,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            directory,
            metrics,
            store,
            config,
            events,
        }
    }

    /// Snapshots decoded by any session of this node
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotEvent> {
        self.events.subscribe()
    }
}

/// Handle of a running session
///
/// Dropping it detaches the session; it keeps running to completion.
pub struct SessionHandle {
    pub peer: String,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    /// Wait for the session to end
    pub async fn join(self) -> anyhow::Result<SessionReport> {
        Ok(self.task.await?)
    }
}

/// Start a session on `stream`
///
/// Spawns the receiver, collector and sender and returns immediately.
pub fn start<S: SessionStream>(stream: S, ctx: Arc<NodeContext>) -> SessionHandle {
    let peer = stream.remote();
    let task = tokio::spawn(supervise(stream, ctx));
    SessionHandle { peer, task }
}

#[instrument(skip_all, fields(peer = %stream.remote(), direction = %stream.stat().direction))]
async fn supervise<S: SessionStream>(stream: S, ctx: Arc<NodeContext>) -> SessionReport {
    let peer = stream.remote();
    let stat = stream.stat();
    debug!("session started");

    let (read_half, write_half) = tokio::io::split(stream);
    let (trigger, shutdown) = Shutdown::new();
    let (queue_tx, queue_rx) = handoff::channel();

    let mut receiver = tokio::spawn(
        Receiver::new(
            peer.clone(),
            read_half,
            ctx.events.clone(),
            ctx.config.receive_throttle(),
            shutdown.clone(),
        )
        .run(),
    );
    let mut collector = tokio::spawn(Collector::new(peer.clone(), stat, ctx, queue_tx).run());
    let mut sender = tokio::spawn(Sender::new(peer.clone(), write_half, queue_rx, shutdown).run());

    let mut teardown = Teardown::new(trigger);
    let mut collector_outcome: Option<CollectorOutcome> = None;
    let mut receiver_done: Option<(ReceiverSummary, Option<ReadHalf<S>>)> = None;
    let mut sender_done: Option<(SenderSummary, Option<WriteHalf<S>>)> = None;

    let ((receiver_summary, read_half), (sender_summary, write_half)) = loop {
        match (receiver_done.take(), sender_done.take()) {
            (Some(receiver), Some(sender)) => break (receiver, sender),
            (receiver, sender) => {
                receiver_done = receiver;
                sender_done = sender;
            }
        }

        tokio::select! {
            result = &mut collector, if collector_outcome.is_none() => {
                collector_outcome = Some(settle_collector(result, &mut teardown));
            }

            result = &mut receiver, if receiver_done.is_none() => {
                let done = match result {
                    Ok((summary, half)) => (summary, Some(half)),
                    Err(e) => {
                        error!("receiver task failed: {e}");
                        let summary = ReceiverSummary {
                            decoded: 0,
                            exit: ReceiverExit::ReadFailed(e.to_string()),
                        };
                        (summary, None)
                    }
                };
                if done.0.exit.is_failure() {
                    teardown.stop();
                }
                receiver_done = Some(done);
            }

            result = &mut sender, if sender_done.is_none() => {
                let done = match result {
                    Ok((summary, mut half)) => {
                        if summary.exit == SenderExit::Drained {
                            // a drained queue means the collector has returned
                            if collector_outcome.is_none() {
                                collector_outcome =
                                    Some(settle_collector((&mut collector).await, &mut teardown));
                            }
                            if !teardown.stopped() {
                                // the peer's receiver sees end of stream after our snapshot
                                if let Err(e) = half.shutdown().await {
                                    debug!("failed to shut down write half: {e}");
                                }
                            }
                        }
                        (summary, Some(half))
                    }
                    Err(e) => {
                        error!("sender task failed: {e}");
                        let summary = SenderSummary {
                            written: 0,
                            exit: SenderExit::WriteFailed(e.to_string()),
                        };
                        (summary, None)
                    }
                };
                if done.0.exit.is_failure() {
                    teardown.stop();
                }
                sender_done = Some(done);
            }
        }

        if teardown.stopped() && collector_outcome.is_none() {
            collector.abort();
            collector_outcome = Some(CollectorOutcome::Cancelled);
        }
    };

    let collector_outcome = match collector_outcome {
        Some(outcome) => outcome,
        // both directions finished before the collector
        None => {
            collector.abort();
            CollectorOutcome::Cancelled
        }
    };

    let reset = teardown.should_reset();
    if reset {
        if let (Some(read_half), Some(write_half)) = (read_half, write_half) {
            let stream = read_half.unsplit(write_half);
            stream.reset();
        }
    }

    let report = SessionReport {
        peer,
        collector: collector_outcome,
        receiver: receiver_summary,
        sender: sender_summary,
        reset,
    };
    info!(
        "session ended: sent {}, received {}{}",
        report.sender.written,
        report.receiver.decoded,
        if reset { " (reset)" } else { "" }
    );
    report
}

fn settle_collector(
    result: Result<CollectorOutcome, JoinError>,
    teardown: &mut Teardown,
) -> CollectorOutcome {
    let outcome = result.unwrap_or_else(|e| {
        error!("collector task failed: {e}");
        CollectorOutcome::Aborted(e.to_string())
    });
    if let CollectorOutcome::Aborted(reason) = &outcome {
        warn!("snapshot aborted, resetting stream: {reason}");
        teardown.reset();
    }
    outcome
}

/// Tracks whether the session was stopped early and how the stream closes
struct Teardown {
    trigger: watch::Sender<bool>,
    reset: bool,
}

impl Teardown {
    fn new(trigger: watch::Sender<bool>) -> Self {
        Self {
            trigger,
            reset: false,
        }
    }

    /// Stop every remaining role
    fn stop(&mut self) {
        self.trigger.send_replace(true);
    }

    /// Stop every remaining role and close the stream abortively
    fn reset(&mut self) {
        self.reset = true;
        self.stop();
    }

    fn stopped(&self) -> bool {
        *self.trigger.borrow()
    }

    fn should_reset(&self) -> bool {
        self.reset
    }
}
