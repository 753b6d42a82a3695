use std::net::SocketAddr;
use thiserror::Error;

/// Errors surfaced while driving a session's stream or datagram I/O.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire framing error: {0}")]
    Wire(#[from] vessel_wire::WireError),

    #[error("session already disconnecting")]
    AlreadyDisconnecting,
}

/// Errors raised by the challenge-response authenticator.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("authentication response timed out")]
    Timeout,

    #[error("response line missing the AUTH_RESPONSE| prefix")]
    BadPrefix,

    #[error("response did not match the expected HMAC")]
    Mismatch,

    #[error("response was not valid base64: {0}")]
    BadEncoding(#[from] base64::DecodeError),
}

/// Errors raised while driving the handshake state machine for a single
/// accepted stream.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("datagram rendezvous timed out waiting for the client's HANDSHAKE datagram")]
    DatagramTimeout,

    #[error("the pending handshake entry was already resolved or cancelled")]
    AlreadyResolved,

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),
}

/// Errors a [`crate::conductor::Component`] may report from `start`/`stop`.
#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("component {0} failed to start: {1}")]
    StartFailed(String, String),

    #[error("component {0} did not stop within its grace window")]
    StopTimedOut(String),

    #[error("component {0} stop failed: {1}")]
    StopFailed(String, String),
}

/// Errors raised while looking up or registering a session by its
/// datagram endpoint.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("no session is bound to datagram endpoint {0}")]
    UnknownEndpoint(SocketAddr),
}
