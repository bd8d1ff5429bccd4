//! Socket layer: one UDP socket (plus an optional TCP listener) served by a
//! current-thread tokio runtime on its own thread.
//!
//! Outbound packets are queued and written by a separate send thread with
//! its own blocking socket. [`OscSender::send`] never touches the network, so
//! it is safe to call with engine locks held.

use crate::config::OscConfig;
use crate::message::{decode_packet, read_frame, OscMessage};
use crate::url::{OscUrl, Protocol};
use crate::{OscError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::Write;
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const MAX_DATAGRAM: usize = 65536;

/// Packets waiting for the send thread. A full dump of a large plugin fits.
const SEND_QUEUE_SIZE: usize = 4096;

/// How long stopping the server waits for queued packets to leave.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Receives every decoded inbound message, on the server thread.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle(&self, message: OscMessage, source: SocketAddr);
}

impl<F> MessageHandler for F
where
    F: Fn(OscMessage, SocketAddr) + Send + Sync + 'static,
{
    fn handle(&self, message: OscMessage, source: SocketAddr) {
        self(message, source)
    }
}

enum Outbound {
    Packet {
        addr: SocketAddr,
        protocol: Protocol,
        packet: Vec<u8>,
    },
    Flush(Sender<()>),
}

/// Sends packets to peers. Usable from any thread.
///
/// The send thread lives as long as any clone of the owning `Arc`, and
/// drains its queue before exiting.
#[derive(Debug)]
pub struct OscSender {
    queue: Sender<Outbound>,
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Packet { addr, protocol, .. } => write!(f, "Packet({}, {:?})", addr, protocol),
            Self::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl OscSender {
    /// Spawn the send thread. Its UDP socket binds an ephemeral port on
    /// `host`.
    fn spawn(host: &str) -> Result<Self> {
        let udp = UdpSocket::bind((host, 0))?;
        let (queue, rx) = bounded(SEND_QUEUE_SIZE);
        std::thread::Builder::new()
            .name("consort-osc-send".into())
            .spawn(move || run_sender(udp, rx))?;
        Ok(Self { queue })
    }

    /// Queue `message` for `url`. Fails only on a bad URL or a full queue;
    /// delivery errors are logged by the send thread.
    pub fn send(&self, url: &OscUrl, message: &OscMessage) -> Result<()> {
        let addr = url.socket_addr()?;
        let outbound = Outbound::Packet {
            addr,
            protocol: url.protocol,
            packet: message.encode(),
        };
        match self.queue.try_send(outbound) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(OscError::SendQueueFull),
            Err(TrySendError::Disconnected(_)) => Err(OscError::NotRunning),
        }
    }

    /// Wait until everything queued so far has been written. Returns false
    /// on timeout.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (ack_tx, ack_rx) = bounded(1);
        if self
            .queue
            .send_timeout(Outbound::Flush(ack_tx), timeout)
            .is_err()
        {
            return false;
        }
        ack_rx
            .recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .is_ok()
    }
}

fn run_sender(udp: UdpSocket, rx: Receiver<Outbound>) {
    let mut streams: HashMap<SocketAddr, TcpStream> = HashMap::new();
    for outbound in rx.iter() {
        match outbound {
            Outbound::Packet {
                addr,
                protocol,
                packet,
            } => {
                let sent = match protocol {
                    Protocol::Udp => udp.send_to(&packet, addr).map(|_| ()),
                    Protocol::Tcp => send_tcp(&mut streams, addr, &packet),
                };
                if let Err(e) = sent {
                    tracing::warn!(%addr, ?protocol, "OSC send failed: {}", e);
                }
            }
            Outbound::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("OSC send thread stopped");
}

fn send_tcp(
    streams: &mut HashMap<SocketAddr, TcpStream>,
    addr: SocketAddr,
    packet: &[u8],
) -> std::io::Result<()> {
    let stream = match streams.entry(addr) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => {
            let stream = TcpStream::connect_timeout(&addr, TCP_CONNECT_TIMEOUT)?;
            stream.set_nodelay(true)?;
            entry.insert(stream)
        }
    };
    let written = stream
        .write_all(&(packet.len() as u32).to_be_bytes())
        .and_then(|()| stream.write_all(packet));
    if written.is_err() {
        streams.remove(&addr);
    }
    written
}

pub struct ControlServer {
    host: String,
    udp_addr: SocketAddr,
    tcp_addr: Option<SocketAddr>,
    sender: Arc<OscSender>,
    sockets: Option<(std::net::UdpSocket, Option<std::net::TcpListener>)>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ControlServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlServer")
            .field("udp_addr", &self.udp_addr)
            .field("tcp_addr", &self.tcp_addr)
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl ControlServer {
    /// Bind the sockets. Nothing is received until [`start`](Self::start).
    pub fn bind(config: &OscConfig) -> Result<Self> {
        config.validate()?;
        let udp = std::net::UdpSocket::bind((config.host.as_str(), config.udp_port))?;
        udp.set_nonblocking(true)?;
        let udp_addr = udp.local_addr()?;

        let tcp = match config.tcp_port {
            Some(port) => {
                let listener = std::net::TcpListener::bind((config.host.as_str(), port))?;
                listener.set_nonblocking(true)?;
                Some(listener)
            }
            None => None,
        };
        let tcp_addr = tcp.as_ref().map(|l| l.local_addr()).transpose()?;

        let host = match udp_addr.ip() {
            ip if ip.is_unspecified() => "127.0.0.1".to_string(),
            ip => ip.to_string(),
        };
        tracing::debug!(%udp_addr, ?tcp_addr, "control server bound");

        Ok(Self {
            host,
            udp_addr,
            tcp_addr,
            sender: Arc::new(OscSender::spawn(&config.host)?),
            sockets: Some((udp, tcp)),
            shutdown: None,
            thread: None,
        })
    }

    /// Spawn the server thread. Handlers run on it, one message at a time.
    pub fn start(&mut self, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let (udp, tcp) = self.sockets.take().ok_or(OscError::NotRunning)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("consort-osc".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!("failed to build OSC runtime: {}", e);
                        return;
                    }
                };
                runtime.block_on(serve(udp, tcp, handler, shutdown_rx));
            })?;

        self.shutdown = Some(shutdown_tx);
        self.thread = Some(thread);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    /// Where peers reach us over UDP.
    pub fn url(&self) -> OscUrl {
        OscUrl::new(Protocol::Udp, self.host.clone(), self.udp_addr.port(), "")
    }

    pub fn tcp_url(&self) -> Option<OscUrl> {
        self.tcp_addr
            .map(|addr| OscUrl::new(Protocol::Tcp, self.host.clone(), addr.port(), ""))
    }

    pub fn sender(&self) -> &Arc<OscSender> {
        &self.sender
    }

    /// Stop receiving. Packets already queued are flushed first, within a
    /// bounded wait; the sender stays usable afterwards.
    pub fn stop(&mut self) {
        if self.thread.is_some() && !self.sender.flush(FLUSH_TIMEOUT) {
            tracing::warn!("OSC send queue did not drain before shutdown");
        }
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("OSC server thread panicked");
            }
        }
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve(
    udp: std::net::UdpSocket,
    tcp: Option<std::net::TcpListener>,
    handler: Arc<dyn MessageHandler>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let udp = match tokio::net::UdpSocket::from_std(udp) {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!("failed to register UDP socket: {}", e);
            return;
        }
    };
    let tcp = match tcp.map(tokio::net::TcpListener::from_std).transpose() {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to register TCP listener: {}", e);
            return;
        }
    };

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = udp.recv_from(&mut buf) => match received {
                Ok((len, source)) => deliver(handler.as_ref(), &buf[..len], source),
                // ICMP port-unreachable from an earlier send shows up here on
                // some platforms.
                Err(e) => tracing::debug!("UDP receive failed: {}", e),
            },
            accepted = accept(tcp.as_ref()) => match accepted {
                Ok((stream, source)) => {
                    tokio::spawn(serve_stream(stream, source, handler.clone()));
                }
                Err(e) => tracing::warn!("TCP accept failed: {}", e),
            },
        }
    }
    tracing::debug!("control server stopped");
}

async fn accept(
    listener: Option<&tokio::net::TcpListener>,
) -> std::io::Result<(tokio::net::TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

async fn serve_stream(
    mut stream: tokio::net::TcpStream,
    source: SocketAddr,
    handler: Arc<dyn MessageHandler>,
) {
    loop {
        match read_frame(&mut stream).await {
            Ok(packet) => deliver(handler.as_ref(), &packet, source),
            Err(OscError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                tracing::warn!(%source, "closing TCP peer: {}", e);
                break;
            }
        }
    }
}

fn deliver(handler: &dyn MessageHandler, packet: &[u8], source: SocketAddr) {
    match decode_packet(packet) {
        Ok(messages) => {
            for message in messages {
                handler.handle(message, source);
            }
        }
        Err(e) => tracing::warn!(%source, "dropping packet: {}", e),
    }
}
