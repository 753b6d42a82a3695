use thiserror::Error;

/// Errors raised while reading or writing the wire formats used by the core:
/// the length-prefixed binary frame and the fixed-layout tick datagram.
#[derive(Error, Debug)]
pub enum WireError {
    #[error("not enough bytes in buffer: needed {needed}, remaining {remaining}")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("frame length {0} exceeds the maximum of {1} bytes")]
    FrameTooLarge(u32, u32),

    #[error("frame length must be positive, got {0}")]
    EmptyFrame(u32),

    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, WireError>;
