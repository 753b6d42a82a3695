//! The Session: a client's bound stream plus datagram endpoint, its
//! sequence/auth flags, and its metrics (§4.1, §3).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::tcpio::{TcpReader, TcpWriter};
use crate::udpio::DatagramIo;
use crate::watcher::Watcher;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// One client's bound session: a stream connection and a datagram endpoint,
/// plus the flags and metrics that gate and describe its traffic.
pub struct Vessel {
    id: u64,
    nonce: Uuid,
    reader: Mutex<TcpReader>,
    writer: Mutex<TcpWriter>,
    datagram: DatagramIo,
    authenticated: AtomicBool,
    disconnecting: AtomicBool,
    last_stream_activity_millis: AtomicU64,
    last_datagram_activity_millis: AtomicU64,
    login_timestamp_millis: AtomicU64,
    watcher: Arc<Watcher>,
}

impl Vessel {
    pub fn new(
        id: u64,
        nonce: Uuid,
        reader: TcpReader,
        writer: TcpWriter,
        datagram_socket: Arc<UdpSocket>,
        remote_datagram_addr: SocketAddr,
        watcher: Arc<Watcher>,
    ) -> Arc<Self> {
        let now = now_millis() as u64;
        Arc::new(Self {
            id,
            nonce,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            datagram: DatagramIo::new(datagram_socket, remote_datagram_addr),
            authenticated: AtomicBool::new(false),
            disconnecting: AtomicBool::new(false),
            last_stream_activity_millis: AtomicU64::new(now),
            last_datagram_activity_millis: AtomicU64::new(now),
            login_timestamp_millis: AtomicU64::new(0),
            watcher,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn nonce(&self) -> Uuid {
        self.nonce
    }

    pub fn remote_datagram_addr(&self) -> SocketAddr {
        self.datagram.remote()
    }

    pub fn datagram(&self) -> &DatagramIo {
        &self.datagram
    }

    pub fn reader(&self) -> &Mutex<TcpReader> {
        &self.reader
    }

    pub fn writer(&self) -> &Mutex<TcpWriter> {
        &self.writer
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::Acquire)
    }

    /// Sets `authenticated = true` and records the login timestamp. Called
    /// exactly once, by the authenticator, on success.
    pub fn mark_authenticated(&self) {
        self.authenticated.store(true, Ordering::Release);
        self.login_timestamp_millis
            .store(now_millis() as u64, Ordering::Relaxed);
    }

    pub fn touch_stream_activity(&self) {
        self.last_stream_activity_millis
            .store(now_millis() as u64, Ordering::Relaxed);
    }

    pub fn touch_datagram_activity(&self) {
        self.last_datagram_activity_millis
            .store(now_millis() as u64, Ordering::Relaxed);
    }

    pub fn last_datagram_activity_millis(&self) -> u64 {
        self.last_datagram_activity_millis.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        // Lock-free read would require a blocking try_lock; metrics are
        // best-effort diagnostics, not invariants, so a sync try_lock is fine.
        self.writer
            .try_lock()
            .map(|w| w.bytes_sent())
            .unwrap_or(0)
    }

    pub fn bytes_received(&self) -> u64 {
        self.reader
            .try_lock()
            .map(|r| r.bytes_received())
            .unwrap_or(0)
    }

    /// Idempotent teardown: sets `disconnecting`, closes the stream, and
    /// unregisters from the registry. Safe to call from any failure path,
    /// any number of times.
    pub async fn disconnect(self: &Arc<Self>) {
        if self.disconnecting.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!(session_id = self.id, "disconnecting session");
        {
            let mut writer = self.writer.lock().await;
            if let Err(err) = writer.shutdown().await {
                debug!(session_id = self.id, %err, "stream shutdown error during disconnect");
            }
        }
        self.watcher.unregister_session(self.id, self.remote_datagram_addr());
    }
}

impl std::fmt::Debug for Vessel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vessel")
            .field("id", &self.id)
            .field("nonce", &self.nonce)
            .field("remote_datagram_addr", &self.remote_datagram_addr())
            .field("authenticated", &self.is_authenticated())
            .field("disconnecting", &self.is_disconnecting())
            .finish()
    }
}

/// Receives a datagram addressed to this session and hands the payload off
/// once accepted. `on_payload` runs only for strictly-newer sequences;
/// duplicates and reorderings below the watermark are dropped silently.
pub fn accept_inbound_datagram(session: &Vessel, datagram: &[u8], on_payload: impl FnOnce(&[u8])) {
    session.touch_datagram_activity();
    match session.datagram().accept(datagram) {
        Ok(Some((accepted, payload))) => {
            if accepted.loss_count > 0 {
                debug!(
                    session_id = session.id(),
                    loss_count = accepted.loss_count,
                    "datagram sequence gap"
                );
            }
            on_payload(payload);
        }
        Ok(None) => {
            debug!(session_id = session.id(), "dropped stale or duplicate datagram");
        }
        Err(err) => {
            debug!(session_id = session.id(), %err, "malformed datagram");
        }
    }
}
