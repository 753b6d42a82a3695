//! Datagram I/O: per-session sender and receive-dispatch target over a
//! shared UDP socket (§4.3).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::serial;

/// Outbound datagram payloads above this size are rejected outright; there
/// is no silent truncation.
pub const MAX_PAYLOAD_LEN: usize = 1024;

#[derive(Error, Debug)]
pub enum DatagramError {
    #[error("datagram I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload of {0} bytes exceeds the {MAX_PAYLOAD_LEN}-byte outbound limit")]
    PayloadTooLarge(usize),

    #[error("datagram shorter than the 4-byte sequence prefix: {0} bytes")]
    TooShort(usize),
}

/// Result of accepting an inbound datagram.
pub struct Accepted {
    pub payload_len: usize,
    /// Count of sequence numbers skipped between the previous accepted
    /// sequence and this one, for diagnostic logging. Zero for in-order,
    /// contiguous delivery.
    pub loss_count: u32,
}

/// A session's view of the shared datagram socket: its bound remote
/// endpoint and its own send/receive sequence counters.
pub struct DatagramIo {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    last_sent: AtomicU32,
    last_received: AtomicU32,
}

impl DatagramIo {
    pub fn new(socket: Arc<UdpSocket>, remote: SocketAddr) -> Self {
        Self {
            socket,
            remote,
            last_sent: AtomicU32::new(0),
            last_received: AtomicU32::new(0),
        }
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn last_sent(&self) -> u32 {
        self.last_sent.load(Ordering::Relaxed)
    }

    pub fn last_received(&self) -> u32 {
        self.last_received.load(Ordering::Relaxed)
    }

    /// Sends `payload` with the next sequence number prepended. The first
    /// call after construction sends sequence 1.
    pub async fn send(&self, payload: &[u8]) -> Result<usize, DatagramError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(DatagramError::PayloadTooLarge(payload.len()));
        }

        let seq = self.last_sent.fetch_add(1, Ordering::Relaxed) + 1;
        let mut framed = Vec::with_capacity(4 + payload.len());
        framed.extend_from_slice(&seq.to_le_bytes());
        framed.extend_from_slice(payload);

        let sent = self.socket.send_to(&framed, self.remote).await?;
        Ok(sent)
    }

    /// Validates and unwraps an inbound datagram addressed to this session.
    /// Returns `None` if the sequence is not strictly newer than the last
    /// one accepted, in which case the datagram is dropped silently.
    pub fn accept<'a>(&self, datagram: &'a [u8]) -> Result<Option<(Accepted, &'a [u8])>, DatagramError> {
        if datagram.len() < 4 {
            return Err(DatagramError::TooShort(datagram.len()));
        }

        let seq = u32::from_le_bytes(datagram[..4].try_into().expect("checked length"));
        let baseline = self.last_received.load(Ordering::Relaxed);

        if !serial::is_newer(seq, baseline) {
            return Ok(None);
        }

        let loss_count = serial::gap(baseline, seq);
        if loss_count > 0 {
            debug!(remote = %self.remote, loss_count, "datagram gap detected");
        }

        self.last_received.store(seq, Ordering::Relaxed);
        let payload = &datagram[4..];
        Ok(Some((
            Accepted {
                payload_len: payload.len(),
                loss_count,
            },
            payload,
        )))
    }
}
