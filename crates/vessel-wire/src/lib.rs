//! Binary framing primitives shared by the stream and datagram transports.
//!
//! This crate knows nothing about sockets or sessions: it only defines how
//! bytes on the wire are shaped. [`BinaryReader`]/[`BinaryWriter`] are thin
//! little-endian extension traits over `bytes::Buf`/`BufMut`; [`frame`]
//! implements the length-prefixed binary frame used on the stream transport.

pub mod error;
mod reader;
mod writer;

pub mod frame;

pub use error::{Result, WireError};
pub use reader::BinaryReader;
pub use writer::BinaryWriter;
