//! Duplex stream links with pluggable protocol handlers.
//!
//! rpclink pairs one live stream connection with one protocol handler and
//! runs a read loop and a write loop for it. Any I/O failure tears down both
//! directions of that link.
//!
//! # Crate Structure
//!
//! - [`transport`]: stream connections (TCP, Unix sockets) and connect/listen helpers
//! - [`link`]: the duplex link, write requests with acks, handler and reporter traits
//! - [`frame`]: length-prefixed and delimiter-based protocol handlers

/// Re-export transport types.
pub mod transport {
    pub use rpclink_transport::*;
}

/// Re-export link types.
pub mod link {
    pub use rpclink_core::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rpclink_frame::*;
}

pub use rpclink_core::{DuplexLink, LinkError, ProtocolHandler, WriteRequest};
pub use rpclink_frame::{FramedHandler, LineHandler, Message};
pub use rpclink_transport::{LinkStream, TcpTransport};
