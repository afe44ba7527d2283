use std::io::Read;

use bytes::BytesMut;
use crossbeam_channel::Receiver;

use crate::request::WriteRequest;

/// Framing and multiplexing logic bound to a duplex link.
///
/// The link never looks inside messages. It hands the handler the readable
/// side of the connection once, asks it to consume one inbound unit per read
/// loop iteration, and drains the outbound requests it produces.
pub trait ProtocolHandler: Send + 'static {
    /// Handler-defined failure, including end-of-stream.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Bind the readable side of the connection. Called exactly once.
    fn init(&mut self, input: Box<dyn Read + Send>) -> Result<(), Self::Error>;

    /// Read and handle exactly one inbound unit.
    ///
    /// `buf` is cleared by the link before every call and reused across
    /// calls; its capacity is kept.
    fn handle(&mut self, buf: &mut BytesMut) -> Result<(), Self::Error>;

    /// Source of requests to transmit, in FIFO order.
    fn outbound_requests(&self) -> Receiver<WriteRequest>;
}
