//! TCP transport
//!
//! Listens for and dials peer streams, negotiates the protocol label on each
//! one and hands negotiated streams to [`session::start`].
//!
//! ## Negotiation
//!
//! ```text
//! dialer                         listener
//!   │── "<label>\n" ───────────────▶│
//!   │◀─────────────── "<label>\n" ──│  label supported
//!   │◀────────────────────── "na\n" ─│  otherwise, then close
//! ```

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use futures::future::join_all;
use socket2::SockRef;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, instrument, warn};

use crate::config::NodeConfig;
use crate::directory::Directory;
use crate::session::{self, NodeContext, SessionStream};
use crate::{Direction, StreamStat};

const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest protocol label accepted during negotiation, terminator included
const MAX_LABEL_LEN: usize = 256;

const NOT_AVAILABLE: &str = "na";

/// Back-off after a failed accept, so a persistent error doesn't spin
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// A host and port, parsed from either endpoint notation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parse `/ip4/<ip>/tcp/<port>` (also `ip6`, `dns`, `dns4`, `dns6`, with an
/// optional trailing `/p2p/<id>`) or plain `host:port`
pub fn parse_endpoint(text: &str) -> anyhow::Result<Endpoint> {
    let text = text.trim();
    if text.starts_with('/') {
        parse_multiaddr(text)
    } else {
        parse_host_port(text)
    }
}

fn parse_multiaddr(text: &str) -> anyhow::Result<Endpoint> {
    let parts: Vec<&str> = text.split('/').skip(1).collect();

    let (proto, host, port) = match parts.as_slice() {
        [proto, host, "tcp", port] => (*proto, *host, *port),
        [proto, host, "tcp", port, "p2p", id] if !id.is_empty() => (*proto, *host, *port),
        _ => bail!("unsupported endpoint '{text}'"),
    };

    match proto {
        "ip4" => {
            host.parse::<Ipv4Addr>()
                .with_context(|| format!("invalid ip4 address in '{text}'"))?;
        }
        "ip6" => {
            host.parse::<Ipv6Addr>()
                .with_context(|| format!("invalid ip6 address in '{text}'"))?;
        }
        "dns" | "dns4" | "dns6" if !host.is_empty() => {}
        _ => bail!("unsupported endpoint '{text}'"),
    }

    let port = port
        .parse()
        .with_context(|| format!("invalid port in '{text}'"))?;

    Ok(Endpoint {
        host: host.to_string(),
        port,
    })
}

fn parse_host_port(text: &str) -> anyhow::Result<Endpoint> {
    let (host, port) = text
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("endpoint '{text}' is missing a port"))?;

    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        bail!("endpoint '{text}' is missing a host");
    }

    let port = port
        .parse()
        .with_context(|| format!("invalid port in '{text}'"))?;

    Ok(Endpoint {
        host: host.to_string(),
        port,
    })
}

/// Render a socket address as `/ip4/<ip>/tcp/<port>` or `/ip6/<ip>/tcp/<port>`
pub fn format_endpoint(addr: SocketAddr) -> String {
    match addr.ip() {
        IpAddr::V4(ip) => format!("/ip4/{ip}/tcp/{}", addr.port()),
        IpAddr::V6(ip) => format!("/ip6/{ip}/tcp/{}", addr.port()),
    }
}

/// A negotiated TCP stream to one peer
#[derive(Debug)]
pub struct PeerStream {
    inner: TcpStream,
    stat: StreamStat,
    remote: String,
}

impl PeerStream {
    fn new(inner: TcpStream, remote: SocketAddr, direction: Direction) -> Self {
        Self {
            inner,
            stat: StreamStat::new(direction),
            remote: format_endpoint(remote),
        }
    }
}

impl SessionStream for PeerStream {
    fn stat(&self) -> StreamStat {
        self.stat
    }

    fn remote(&self) -> String {
        self.remote.clone()
    }

    fn reset(&self) {
        // linger 0: the close that follows sends RST instead of FIN
        if let Err(e) = SockRef::from(&self.inner).set_linger(Some(Duration::ZERO)) {
            warn!("failed to mark stream to {} for reset: {e}", self.remote);
        }
    }
}

impl AsyncRead for PeerStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for PeerStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// A bound node: its listeners and the protocol label it speaks
pub struct Node {
    listeners: Vec<TcpListener>,
    addresses: Vec<String>,
    protocol: String,
}

impl Node {
    /// Bind one listener per configured listen address
    pub async fn bind(config: &NodeConfig) -> anyhow::Result<Node> {
        if config.listen.is_empty() {
            bail!("no listen addresses configured");
        }

        let mut listeners = Vec::with_capacity(config.listen.len());
        let mut addresses = Vec::with_capacity(config.listen.len());

        for listen in &config.listen {
            let endpoint = parse_endpoint(listen)?;
            let listener = TcpListener::bind((endpoint.host.as_str(), endpoint.port))
                .await
                .with_context(|| format!("failed to listen on {endpoint}"))?;
            let local = listener.local_addr()?;

            debug!("listening on {local}");
            addresses.push(format_endpoint(local));
            listeners.push(listener);
        }

        Ok(Node {
            listeners,
            addresses,
            protocol: config.protocol.clone(),
        })
    }

    /// Bound endpoints in `/ip4/../tcp/..` notation
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Accept streams on every listener, starting a session on each one that
    /// negotiates successfully. Runs until the task is dropped.
    pub async fn serve(&self, ctx: Arc<NodeContext>) {
        let loops = self
            .listeners
            .iter()
            .map(|listener| self.accept_loop(listener, ctx.clone()));
        join_all(loops).await;
    }

    #[instrument(skip_all, fields(local = ?listener.local_addr().ok()))]
    async fn accept_loop(&self, listener: &TcpListener, ctx: Arc<NodeContext>) {
        loop {
            let (socket, remote) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("failed to accept connection: {e}");
                    tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                    continue;
                }
            };
            debug!("accepted connection from {remote}");

            let protocol = self.protocol.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                match accept_stream(socket, remote, &protocol).await {
                    Ok(stream) => {
                        info!("inbound stream from {}", stream.remote);
                        session::start(stream, ctx);
                    }
                    Err(e) => warn!("rejected stream from {remote}: {e:#}"),
                }
            });
        }
    }

    /// Connect to `target` and negotiate an outbound stream
    #[instrument(skip(self))]
    pub async fn dial(&self, target: &str) -> anyhow::Result<PeerStream> {
        let endpoint = parse_endpoint(target)?;
        let mut socket = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .with_context(|| format!("failed to connect to {endpoint}"))?;
        let remote = socket.peer_addr()?;

        negotiate_outbound(&mut socket, &self.protocol)
            .await
            .with_context(|| format!("negotiation with {endpoint} failed"))?;

        info!("outbound stream to {remote}");
        Ok(PeerStream::new(socket, remote, Direction::Outbound))
    }
}

impl Directory for Node {
    fn local_addresses(&self) -> Vec<String> {
        self.addresses.clone()
    }
}

async fn accept_stream(
    mut socket: TcpStream,
    remote: SocketAddr,
    protocol: &str,
) -> anyhow::Result<PeerStream> {
    negotiate_inbound(&mut socket, protocol).await?;
    Ok(PeerStream::new(socket, remote, Direction::Inbound))
}

/// Propose `protocol` and wait for the listener to confirm it
pub async fn negotiate_outbound<S>(io: &mut S, protocol: &str) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(NEGOTIATION_TIMEOUT, async {
        write_label(io, protocol).await?;
        let answer = read_label(io).await?;

        if answer == protocol {
            Ok::<_, anyhow::Error>(())
        } else if answer == NOT_AVAILABLE {
            Err(anyhow!("peer does not support protocol '{protocol}'"))
        } else {
            Err(anyhow!("unexpected negotiation answer '{answer}'"))
        }
    })
    .await
    .context("protocol negotiation timed out")?
}

/// Read the dialer's proposal and confirm it if it matches `protocol`
pub async fn negotiate_inbound<S>(io: &mut S, protocol: &str) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::time::timeout(NEGOTIATION_TIMEOUT, async {
        let proposed = read_label(io).await?;

        if proposed == protocol {
            write_label(io, protocol).await?;
            return Ok::<_, anyhow::Error>(());
        }

        write_label(io, NOT_AVAILABLE).await?;
        let _ = io.shutdown().await;
        Err(anyhow!("unsupported protocol '{proposed}'"))
    })
    .await
    .context("protocol negotiation timed out")?
}

async fn write_label<S>(io: &mut S, label: &str) -> anyhow::Result<()>
where
    S: AsyncWrite + Unpin,
{
    if label.len() + 1 > MAX_LABEL_LEN || label.contains('\n') {
        bail!("invalid protocol label '{label}'");
    }
    io.write_all(format!("{label}\n").as_bytes()).await?;
    io.flush().await?;
    Ok(())
}

/// Read one label byte by byte, so nothing past the terminator is consumed
async fn read_label<S>(io: &mut S) -> anyhow::Result<String>
where
    S: AsyncRead + Unpin,
{
    let mut raw = Vec::new();
    loop {
        let byte = io
            .read_u8()
            .await
            .context("stream closed during negotiation")?;
        if byte == b'\n' {
            break;
        }
        raw.push(byte);
        if raw.len() >= MAX_LABEL_LEN {
            bail!("protocol label exceeds {MAX_LABEL_LEN} bytes");
        }
    }
    Ok(String::from_utf8(raw)?)
}
