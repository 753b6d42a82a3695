//! Session Registry: two concurrent collections — raw pre-handshake stream
//! connections and bound Sessions — tolerant of concurrent mutation and
//! able to produce consistent snapshots without blocking mutators (§4.4).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::session::Vessel;

/// Thread-safe registry of raw (pre-handshake) stream connections and
/// fully-bound Sessions.
#[derive(Default)]
pub struct Watcher {
    raw_connections: DashMap<SocketAddr, ()>,
    sessions: DashMap<u64, Arc<Vessel>>,
    by_datagram_addr: DashMap<SocketAddr, u64>,
    next_session_id: AtomicU64,
}

impl Watcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Allocates the next monotonic, process-unique session id.
    pub fn next_session_id(&self) -> u64 {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register_raw(&self, addr: SocketAddr) {
        self.raw_connections.insert(addr, ());
    }

    pub fn unregister_raw(&self, addr: SocketAddr) {
        self.raw_connections.remove(&addr);
    }

    pub fn raw_count(&self) -> usize {
        self.raw_connections.len()
    }

    /// Number of concurrent bound Sessions. This is the figure the
    /// max-clients cap is measured against, not `raw_count` (see the
    /// max-clients accounting note in the acceptor module).
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn register_session(&self, session: Arc<Vessel>) {
        let datagram_addr = session.remote_datagram_addr();
        let id = session.id();
        self.sessions.insert(id, session);
        self.by_datagram_addr.insert(datagram_addr, id);
    }

    pub fn unregister_session(&self, id: u64, datagram_addr: SocketAddr) {
        self.sessions.remove(&id);
        self.by_datagram_addr.remove(&datagram_addr);
    }

    pub fn session_by_datagram_addr(&self, addr: &SocketAddr) -> Option<Arc<Vessel>> {
        let id = *self.by_datagram_addr.get(addr)?;
        self.sessions.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// A point-in-time snapshot of every bound Session, safe to iterate
    /// while other tasks register or unregister concurrently.
    pub fn snapshot_sessions(&self) -> Vec<Arc<Vessel>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Vessel;
    use std::sync::Arc;
    use tokio::net::{TcpListener, TcpStream, UdpSocket};
    use uuid::Uuid;

    async fn make_session(watcher: Arc<Watcher>, id: u64) -> Arc<Vessel> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();

        let udp = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let remote: SocketAddr = "127.0.0.1:1".parse().unwrap();
        drop(client);

        let (reader, writer) = crate::tcpio::split(server);
        Vessel::new(id, Uuid::new_v4(), reader, writer, udp, remote, watcher)
    }

    #[tokio::test]
    async fn snapshot_reflects_registered_sessions() {
        let watcher = Watcher::new();
        let session = make_session(Arc::clone(&watcher), 1).await;
        watcher.register_session(Arc::clone(&session));

        let snapshot = watcher.snapshot_sessions();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), 1);
    }

    #[tokio::test]
    async fn lookup_by_datagram_addr_finds_the_session() {
        let watcher = Watcher::new();
        let session = make_session(Arc::clone(&watcher), 7).await;
        let remote = session.remote_datagram_addr();
        watcher.register_session(Arc::clone(&session));

        let found = watcher.session_by_datagram_addr(&remote).unwrap();
        assert_eq!(found.id(), 7);
    }

    #[tokio::test]
    async fn unregister_removes_from_both_indices() {
        let watcher = Watcher::new();
        let session = make_session(Arc::clone(&watcher), 3).await;
        let remote = session.remote_datagram_addr();
        watcher.register_session(Arc::clone(&session));
        watcher.unregister_session(3, remote);

        assert_eq!(watcher.session_count(), 0);
        assert!(watcher.session_by_datagram_addr(&remote).is_none());
    }

    #[test]
    fn raw_connections_track_independently_of_sessions() {
        let watcher = Watcher::new();
        let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
        watcher.register_raw(addr);
        assert_eq!(watcher.raw_count(), 1);
        watcher.unregister_raw(addr);
        assert_eq!(watcher.raw_count(), 0);
    }
}
