//! Receiver - decodes inbound snapshots from the read half of a stream
//!
//! ## Message Flow
//!
//! ```text
//! read line → skip blank → decode Snapshot → publish SnapshotEvent → throttle
//!     ↑                                                                │
//!     └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The loop ends on end of stream, a read error, a malformed frame, or a
//! session shutdown. A frame cut off by the end of the stream counts as a
//! failed read and is never decoded.

use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, trace, warn};

use super::handoff::Shutdown;
use super::messages::{ReceiverExit, ReceiverSummary, SnapshotEvent};
use crate::Snapshot;

/// Classification of one line read from the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Nothing was read
    Empty,

    /// A lone `\n` or `\r\n`
    Terminator,

    /// Text cut off by the end of the stream before its terminator
    Partial(&'a str),

    /// Candidate snapshot text, terminator stripped
    Payload(&'a str),
}

impl<'a> Frame<'a> {
    pub fn classify(line: &'a str) -> Frame<'a> {
        if line.is_empty() {
            return Frame::Empty;
        }
        if line == "\n" || line == "\r\n" {
            return Frame::Terminator;
        }
        match line.strip_suffix('\n') {
            Some(body) => Frame::Payload(body.strip_suffix('\r').unwrap_or(body)),
            None => Frame::Partial(line),
        }
    }
}

pub struct Receiver<R> {
    peer: String,
    reader: BufReader<R>,
    events: broadcast::Sender<SnapshotEvent>,
    throttle: Duration,
    shutdown: Shutdown,
}

impl<R> Receiver<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        peer: String,
        reader: R,
        events: broadcast::Sender<SnapshotEvent>,
        throttle: Duration,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            peer,
            reader: BufReader::new(reader),
            events,
            throttle,
            shutdown,
        }
    }

    /// Read until the stream ends; hands the read half back for teardown
    #[instrument(skip(self), fields(peer = %self.peer))]
    pub async fn run(mut self) -> (ReceiverSummary, R) {
        debug!("starting receiver");

        let mut decoded = 0;
        let mut line = String::new();

        let exit = loop {
            line.clear();

            let read = tokio::select! {
                biased;
                _ = self.shutdown.requested() => break ReceiverExit::Cancelled,
                read = self.reader.read_line(&mut line) => read,
            };

            match read {
                Ok(0) => {
                    debug!("stream closed by peer");
                    break ReceiverExit::Closed;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("error reading from stream: {e}");
                    break ReceiverExit::ReadFailed(e.to_string());
                }
            }

            let payload = match Frame::classify(&line) {
                Frame::Empty | Frame::Terminator => {
                    trace!("skipping blank line");
                    continue;
                }
                Frame::Partial(rest) => {
                    warn!("stream closed mid-frame, dropping {} bytes", rest.len());
                    break ReceiverExit::ReadFailed(
                        "unterminated frame at end of stream".to_string(),
                    );
                }
                Frame::Payload(payload) => payload,
            };

            let snapshot = match Snapshot::decode(payload) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!("failed to decode snapshot: {e}");
                    break ReceiverExit::Malformed(e.to_string());
                }
            };

            decoded += 1;
            info!(
                "received snapshot: {} addresses, {} cpu counters, {} disks, {} records",
                snapshot.addresses.len(),
                snapshot.cpu.len(),
                snapshot.disk.len(),
                snapshot.records.len()
            );
            trace!("snapshot: {snapshot:?}");

            let event = SnapshotEvent {
                peer: self.peer.clone(),
                snapshot,
                received_at: Utc::now(),
            };
            if self.events.send(event).is_err() {
                trace!("no subscribers for snapshot event");
            }

            tokio::select! {
                biased;
                _ = self.shutdown.requested() => break ReceiverExit::Cancelled,
                _ = tokio::time::sleep(self.throttle) => {}
            }
        };

        debug!("receiver stopped: {exit:?}");
        (ReceiverSummary { decoded, exit }, self.reader.into_inner())
    }
}
