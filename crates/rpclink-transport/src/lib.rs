//! Byte-stream connections for rpclink.
//!
//! Provides the stream type a duplex link runs over:
//! - TCP streams (all platforms)
//! - Unix domain stream sockets (Linux/macOS)
//!
//! This is the lowest layer of rpclink. Only plain TCP listen/connect
//! helpers live here; the link itself needs nothing beyond the
//! [`Connection`] capabilities.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::TcpTransport;
pub use traits::{Connection, LinkStream};
