//! Stream I/O: text and binary framing multiplexed over one TCP connection
//! (§4.2).

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use vessel_wire::frame;

use crate::error::SessionError;

/// Read half of a session's stream, buffered for line-based reads.
pub struct TcpReader {
    inner: BufReader<OwnedReadHalf>,
    bytes_received: AtomicU64,
}

/// Write half of a session's stream. Callers must serialize writes
/// themselves; this type does not add an internal mutex (§5).
pub struct TcpWriter {
    inner: OwnedWriteHalf,
    bytes_sent: AtomicU64,
}

/// Splits an accepted connection into independent read/write halves.
pub fn split(stream: TcpStream) -> (TcpReader, TcpWriter) {
    let (read_half, write_half) = stream.into_split();
    (
        TcpReader {
            inner: BufReader::new(read_half),
            bytes_received: AtomicU64::new(0),
        },
        TcpWriter {
            inner: write_half,
            bytes_sent: AtomicU64::new(0),
        },
    )
}

impl TcpReader {
    /// Reads one newline-terminated UTF-8 line, with the trailing `\n`
    /// (and any `\r`) stripped.
    pub async fn read_line(&mut self) -> Result<String, SessionError> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line).await?;
        if n == 0 {
            return Err(SessionError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream closed before a line was received",
            )));
        }
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }

    /// Reads one length-prefixed binary frame, enforcing the 10 MiB bound
    /// (§4.2).
    pub async fn read_frame(&mut self) -> Result<Vec<u8>, SessionError> {
        let mut len_buf = [0u8; 4];
        self.inner.read_exact(&mut len_buf).await?;
        let len = frame::validate_len(u32::from_le_bytes(len_buf))?;

        let mut payload = vec![0u8; len];
        self.inner.read_exact(&mut payload).await?;
        self.bytes_received
            .fetch_add((4 + len) as u64, Ordering::Relaxed);
        Ok(payload)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }
}

impl TcpWriter {
    /// Writes `line` followed by a single `\n`.
    pub async fn write_line(&mut self, line: &str) -> Result<(), SessionError> {
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await?;
        self.bytes_sent
            .fetch_add((line.len() + 1) as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Writes `payload` as a length-prefixed binary frame.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), SessionError> {
        let framed = frame::encode(payload)?;
        self.inner.write_all(&framed).await?;
        self.inner.flush().await?;
        self.bytes_sent
            .fetch_add(framed.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted, connected) = tokio::join!(listener.accept(), TcpStream::connect(addr));
        let (server, _) = accepted.unwrap();
        (server, connected.unwrap())
    }

    #[tokio::test]
    async fn round_trips_a_text_line() {
        let (server, client) = connected_pair().await;
        let (_, mut server_writer) = split(server);
        let (mut client_reader, _) = split(client);

        server_writer.write_line("HANDSHAKE|abc").await.unwrap();
        let line = client_reader.read_line().await.unwrap();
        assert_eq!(line, "HANDSHAKE|abc");
    }

    #[tokio::test]
    async fn round_trips_a_binary_frame() {
        let (server, client) = connected_pair().await;
        let (_, mut server_writer) = split(server);
        let (mut client_reader, _) = split(client);

        server_writer.write_frame(b"payload").await.unwrap();
        let payload = client_reader.read_frame().await.unwrap();
        assert_eq!(payload, b"payload");
    }

    #[tokio::test]
    async fn rejects_oversized_frame_length_prefix() {
        let (server, client) = connected_pair().await;
        let (_, mut server_writer) = split(server);
        let (mut client_reader, _) = split(client);

        let oversized_len = (10 * 1024 * 1024 + 1u32).to_le_bytes();
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut raw = server_writer;
            let _ = raw.inner.write_all(&oversized_len).await;
        });

        assert!(client_reader.read_frame().await.is_err());
    }
}
