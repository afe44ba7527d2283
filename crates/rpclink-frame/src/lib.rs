//! Protocol handlers for duplex links.
//!
//! Two message formats plug into [`rpclink_core::DuplexLink`]:
//! - [`FramedHandler`]: length-prefixed frames carrying a correlation id;
//! - [`LineHandler`]: payloads separated by a delimiter byte.
//!
//! Frame layout:
//! - A 2-byte magic number ("RL") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 4-byte little-endian message id

pub mod codec;
pub mod error;
pub mod framed;
pub mod line;
pub mod outbox;

pub use codec::{
    decode_message, encode_message, parse_header, FrameConfig, Header, Message,
    DEFAULT_DELIMITER, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
pub use framed::FramedHandler;
pub use line::LineHandler;
pub use outbox::{LineOutbox, Outbox};
