//! Zero-capacity handoff between collector and sender
//!
//! `send` completes only once the receiving side has taken the value, so a
//! producer never runs ahead of its consumer. Built from a single-slot mpsc
//! channel plus a oneshot acknowledgement per item. A value whose `send` was
//! cancelled before it was taken is discarded, never delivered late.
//!
//! [`Shutdown`] is the other half of the roles' plumbing: a session-wide stop
//! signal the coordinator fires on teardown.

use std::fmt;

use tokio::sync::{mpsc, oneshot, watch};

pub fn channel<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { tx }, HandoffReceiver { rx })
}

/// The receiving side went away before taking the value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffClosed;

impl fmt::Display for HandoffClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handoff receiver closed")
    }
}

impl std::error::Error for HandoffClosed {}

pub struct HandoffSender<T> {
    tx: mpsc::Sender<(T, oneshot::Sender<()>)>,
}

impl<T> HandoffSender<T> {
    /// Wait until the receiver has taken `value`
    pub async fn send(&self, value: T) -> Result<(), HandoffClosed> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((value, ack_tx))
            .await
            .map_err(|_| HandoffClosed)?;
        ack_rx.await.map_err(|_| HandoffClosed)
    }
}

pub struct HandoffReceiver<T> {
    rx: mpsc::Receiver<(T, oneshot::Sender<()>)>,
}

impl<T> HandoffReceiver<T> {
    /// Next value, or `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            let (value, ack) = self.rx.recv().await?;
            if ack.send(()).is_ok() {
                return Some(value);
            }
            // the sender stopped waiting; the value was never handed over
        }
    }
}

/// Session-wide stop signal observed by the long-running roles
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (watch::Sender<bool>, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (tx, Shutdown { rx })
    }

    /// Resolves once shutdown was requested. Never resolves if the trigger
    /// was dropped without firing.
    pub async fn requested(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
