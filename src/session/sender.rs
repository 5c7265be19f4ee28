//! Sender - drains the handoff queue onto the write half of a stream

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, instrument};

use super::handoff::{HandoffReceiver, Shutdown};
use super::messages::{SenderExit, SenderSummary};

pub struct Sender<W>
where
    W: AsyncWrite,
{
    peer: String,
    writer: BufWriter<W>,
    queue: HandoffReceiver<String>,
    shutdown: Shutdown,
}

impl<W> Sender<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(
        peer: String,
        writer: W,
        queue: HandoffReceiver<String>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            peer,
            writer: BufWriter::new(writer),
            queue,
            shutdown,
        }
    }

    /// Write every queued message as one line; hands the write half back
    #[instrument(skip(self), fields(peer = %self.peer))]
    pub async fn run(mut self) -> (SenderSummary, W) {
        debug!("starting sender");

        let mut written = 0;

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.requested() => break SenderExit::Cancelled,
                next = self.queue.recv() => next,
            };

            let Some(message) = next else {
                debug!("queue closed");
                break SenderExit::Drained;
            };

            let frame = format!("{message}\n");

            if let Err(e) = self.writer.write_all(frame.as_bytes()).await {
                error!("error writing to stream: {e}");
                break SenderExit::WriteFailed(e.to_string());
            }

            if let Err(e) = self.writer.flush().await {
                error!("error flushing stream: {e}");
                break SenderExit::WriteFailed(e.to_string());
            }

            written += 1;
            debug!("sent snapshot ({} bytes)", frame.len());
        };

        debug!("sender stopped: {exit:?}");
        (SenderSummary { written, exit }, self.writer.into_inner())
    }
}
