//! Acceptor: owns the stream listener and the shared datagram socket,
//! drives the per-connection handshake state machine, and routes inbound
//! datagrams (§4.6).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::gatekeeper::GateKeeper;
use crate::session::{self, Vessel};
use crate::watcher::Watcher;

const HANDSHAKE_DATAGRAM_TIMEOUT: Duration = Duration::from_secs(10);
const UDP_RECV_BUF_LEN: usize = 2048;

type PendingHandshakes = DashMap<Uuid, oneshot::Sender<SocketAddr>>;

/// Owns both transports' listeners and binds new streams to datagram
/// endpoints before handing them to the authenticator.
pub struct Sentinel {
    tcp_listener: TcpListener,
    udp_socket: Arc<UdpSocket>,
    stream_local_addr: SocketAddr,
    watcher: Arc<Watcher>,
    gatekeeper: Arc<GateKeeper>,
    pending: Arc<PendingHandshakes>,
    max_sessions: usize,
}

impl Sentinel {
    pub async fn bind(
        stream_addr: SocketAddr,
        datagram_addr: SocketAddr,
        watcher: Arc<Watcher>,
        gatekeeper: Arc<GateKeeper>,
        max_sessions: usize,
    ) -> std::io::Result<Self> {
        let tcp_listener = TcpListener::bind(stream_addr).await?;
        let udp_socket = Arc::new(UdpSocket::bind(datagram_addr).await?);
        let stream_local_addr = tcp_listener.local_addr()?;

        info!(%stream_local_addr, datagram_addr = %udp_socket.local_addr()?, "sentinel bound");

        Ok(Self {
            tcp_listener,
            udp_socket,
            stream_local_addr,
            watcher,
            gatekeeper,
            pending: Arc::new(DashMap::new()),
            max_sessions,
        })
    }

    pub fn stream_local_addr(&self) -> SocketAddr {
        self.stream_local_addr
    }

    pub fn datagram_local_addr(&self) -> std::io::Result<SocketAddr> {
        self.udp_socket.local_addr()
    }

    /// Runs the stream listener and datagram listener until `shutdown` is
    /// tripped. Each accepted stream spawns its own handshake driver task.
    pub async fn run(&self, shutdown: CancellationToken) {
        let datagram_loop = self.run_datagram_loop(shutdown.clone());
        let stream_loop = self.run_stream_loop(shutdown.clone());
        tokio::join!(datagram_loop, stream_loop);
    }

    async fn run_stream_loop(&self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("stream listener stopping");
                    return;
                }
                accepted = self.tcp_listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr)) => self.handle_accepted_stream(stream, peer_addr, shutdown.clone()),
                        Err(err) => {
                            debug!(%err, "stream accept error");
                        }
                    }
                }
            }
        }
    }

    fn handle_accepted_stream(&self, stream: TcpStream, peer_addr: SocketAddr, shutdown: CancellationToken) {
        if self.watcher.session_count() >= self.max_sessions {
            debug!(%peer_addr, "rejecting connection: max sessions reached");
            drop(stream);
            return;
        }

        self.watcher.register_raw(peer_addr);
        let watcher = Arc::clone(&self.watcher);
        let gatekeeper = Arc::clone(&self.gatekeeper);
        let pending = Arc::clone(&self.pending);
        let udp_socket = Arc::clone(&self.udp_socket);
        let stream_local_addr = self.stream_local_addr;
        let datagram_port = match self.udp_socket.local_addr() {
            Ok(addr) => addr.port(),
            Err(_) => 0,
        };

        tokio::spawn(async move {
            drive_handshake(
                stream,
                peer_addr,
                stream_local_addr,
                datagram_port,
                watcher,
                gatekeeper,
                pending,
                udp_socket,
                shutdown,
            )
            .await;
        });
    }

    async fn run_datagram_loop(&self, shutdown: CancellationToken) {
        let mut buf = [0u8; UDP_RECV_BUF_LEN];
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("datagram listener stopping");
                    return;
                }
                received = self.udp_socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, sender)) => self.handle_datagram(&buf[..len], sender),
                        Err(err) => {
                            debug!(%err, "datagram recv error");
                        }
                    }
                }
            }
        }
    }

    fn handle_datagram(&self, datagram: &[u8], sender: SocketAddr) {
        if let Ok(text) = std::str::from_utf8(datagram) {
            if let Some(nonce_str) = text.strip_prefix("HANDSHAKE|") {
                self.handle_handshake_datagram(nonce_str, sender);
                return;
            }
        }

        match self.watcher.session_by_datagram_addr(&sender) {
            Some(session) => {
                session::accept_inbound_datagram(&session, datagram, |payload| {
                    trace!(session_id = session.id(), len = payload.len(), "inbound game datagram");
                });
            }
            None => {
                debug!(%sender, "datagram from unknown endpoint dropped");
            }
        }
    }

    fn handle_handshake_datagram(&self, nonce_str: &str, sender: SocketAddr) {
        let Ok(nonce) = Uuid::parse_str(nonce_str) else {
            debug!(%sender, "malformed handshake datagram dropped");
            return;
        };

        match self.pending.remove(&nonce) {
            Some((_, resolver)) => {
                let socket = Arc::clone(&self.udp_socket);
                tokio::spawn(async move {
                    if let Err(err) = socket.send_to(b"HANDSHAKE_ACK", sender).await {
                        debug!(%err, "failed to send handshake ack");
                    }
                });
                let _ = resolver.send(sender);
            }
            None => {
                debug!(%nonce, %sender, "no pending handshake for nonce, dropping");
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive_handshake(
    stream: TcpStream,
    peer_addr: SocketAddr,
    stream_local_addr: SocketAddr,
    datagram_port: u16,
    watcher: Arc<Watcher>,
    gatekeeper: Arc<GateKeeper>,
    pending: Arc<PendingHandshakes>,
    udp_socket: Arc<UdpSocket>,
    shutdown: CancellationToken,
) {
    let nonce = Uuid::new_v4();
    let (resolver, awaiting) = oneshot::channel();
    pending.insert(nonce, resolver);

    let (reader, mut writer) = crate::tcpio::split(stream);

    let handshake_line = format!(
        "HANDSHAKE|{nonce}|{}|{datagram_port}",
        stream_local_addr.ip()
    );
    if let Err(err) = writer.write_line(&handshake_line).await {
        debug!(%peer_addr, %err, "failed to send handshake line");
        pending.remove(&nonce);
        watcher.unregister_raw(peer_addr);
        return;
    }

    let remote_datagram_addr = tokio::select! {
        _ = shutdown.cancelled() => {
            pending.remove(&nonce);
            watcher.unregister_raw(peer_addr);
            return;
        }
        result = tokio::time::timeout(HANDSHAKE_DATAGRAM_TIMEOUT, awaiting) => {
            match result {
                Ok(Ok(addr)) => addr,
                Ok(Err(_)) => {
                    debug!(%peer_addr, "handshake sender dropped before resolution");
                    watcher.unregister_raw(peer_addr);
                    return;
                }
                Err(_) => {
                    debug!(%peer_addr, "handshake datagram timed out");
                    pending.remove(&nonce);
                    watcher.unregister_raw(peer_addr);
                    return;
                }
            }
        }
    };

    watcher.unregister_raw(peer_addr);

    let session_id = watcher.next_session_id();
    let session = Vessel::new(
        session_id,
        nonce,
        reader,
        writer,
        udp_socket,
        remote_datagram_addr,
        Arc::clone(&watcher),
    );
    watcher.register_session(Arc::clone(&session));

    if let Err(err) = gatekeeper.authenticate(&session).await {
        debug!(session_id, %err, "authentication failed, dropping session");
        session.disconnect().await;
        return;
    }

    info!(session_id, %peer_addr, %remote_datagram_addr, "session authenticated");

    {
        let mut writer = session.writer().lock().await;
        if let Err(err) = writer.write_line("Welcome to the server.").await {
            debug!(session_id, %err, "failed to send welcome line");
        }
    }

    run_stream_read_loop(session, shutdown).await;
}

async fn run_stream_read_loop(session: Arc<Vessel>, shutdown: CancellationToken) {
    loop {
        if session.is_disconnecting() {
            return;
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                session.disconnect().await;
                return;
            }
            line = async { session.reader().lock().await.read_line().await } => {
                match line {
                    Ok(line) => {
                        session.touch_stream_activity();
                        trace!(session_id = session.id(), %line, "stream line received");
                    }
                    Err(err) => {
                        debug!(session_id = session.id(), %err, "stream read error");
                        session.disconnect().await;
                        return;
                    }
                }
            }
        }
    }
}
