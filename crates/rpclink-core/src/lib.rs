//! Duplex link: one stream connection, one protocol handler, two I/O loops.
//!
//! The link owns nothing about message formats. A [`ProtocolHandler`]
//! decodes inbound messages and produces outbound [`WriteRequest`]s; the
//! link drives both directions on dedicated threads:
//! - the write loop drains the handler's outbound requests in FIFO order and
//!   acknowledges each one without ever blocking on the ack;
//! - the read loop asks the handler to consume one inbound message at a time.
//!
//! The first failure in either direction closes the connection, which ends
//! the other direction on its next blocking call.

pub mod config;
pub mod error;
pub mod gate;
pub mod handler;
pub mod link;
pub mod report;
pub mod request;

pub use config::{LinkConfig, DEFAULT_READ_BUFFER_CAPACITY};
pub use error::{LinkError, Result, WriteError};
pub use gate::{CloseHandle, LinkState};
pub use handler::ProtocolHandler;
pub use link::DuplexLink;
pub use report::{Direction, ErrorReporter, TracingReporter};
pub use request::{ack_pair, Ack, AckSender, WriteOutcome, WriteRequest};

pub use rpclink_transport::{Connection, LinkStream};
