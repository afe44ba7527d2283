/// Errors that can occur during framing, decoding, or enqueueing messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x524c \"RL\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream at a message boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The peer closed the stream partway through a message.
    #[error("connection closed mid-message after {received} bytes")]
    Truncated { received: usize },

    /// `handle` was called before the handler was bound to a stream.
    #[error("handler not initialized with an input stream")]
    NotInitialized,

    /// The handler that owned this outbox is gone.
    #[error("link handler disconnected")]
    Disconnected,

    /// A delimited payload contains the delimiter byte itself.
    #[error("payload contains the delimiter byte 0x{0:02x}")]
    DelimiterInPayload(u8),
}

pub type Result<T> = std::result::Result<T, FrameError>;
