//! Streams a session can run on

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

use crate::{Direction, StreamStat};

/// Buffer size of each direction of an in-process stream pair
const MEMORY_STREAM_BUFFER: usize = 64 * 1024;

/// A live duplex byte stream bound to one remote peer
pub trait SessionStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {
    fn stat(&self) -> StreamStat;

    /// Remote identity, used for logging and events
    fn remote(&self) -> String;

    /// Make the next close abortive, so the peer observes a reset rather
    /// than an orderly end of stream
    fn reset(&self);
}

/// In-process stream, one end of a connected pair
#[derive(Debug)]
pub struct MemoryStream {
    inner: DuplexStream,
    stat: StreamStat,
    remote: String,
}

impl MemoryStream {
    /// Connected pair: the first end is outbound (the dialer), the second inbound
    pub fn pair(dialer: &str, listener: &str) -> (MemoryStream, MemoryStream) {
        let (a, b) = tokio::io::duplex(MEMORY_STREAM_BUFFER);
        (
            MemoryStream {
                inner: a,
                stat: StreamStat::new(Direction::Outbound),
                remote: listener.to_string(),
            },
            MemoryStream {
                inner: b,
                stat: StreamStat::new(Direction::Inbound),
                remote: dialer.to_string(),
            },
        )
    }
}

impl SessionStream for MemoryStream {
    fn stat(&self) -> StreamStat {
        self.stat
    }

    fn remote(&self) -> String {
        self.remote.clone()
    }

    // dropping a duplex end already fails the peer's pending writes
    fn reset(&self) {}
}

impl AsyncRead for MemoryStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
