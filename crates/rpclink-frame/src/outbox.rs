use bytes::{BufMut, BytesMut};
use crossbeam_channel::Sender;
use rpclink_core::{Ack, WriteRequest};
use tracing::trace;

use crate::codec::encode_message;
use crate::error::{FrameError, Result};

/// Cloneable producer of length-prefixed outbound messages.
///
/// Every call encodes one complete frame and enqueues it as a single
/// [`WriteRequest`], so frames from different producers never interleave on
/// the wire.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: Sender<WriteRequest>,
    max_payload_size: usize,
}

impl Outbox {
    pub(crate) fn new(tx: Sender<WriteRequest>, max_payload_size: usize) -> Self {
        Self {
            tx,
            max_payload_size,
        }
    }

    /// Enqueue a message and return an [`Ack`] for its write outcome.
    pub fn send(&self, id: u32, payload: &[u8]) -> Result<Ack> {
        let (request, ack) = WriteRequest::with_ack(self.encode(id, payload)?);
        self.enqueue(request)?;
        Ok(ack)
    }

    /// Enqueue a message without observing the outcome.
    pub fn post(&self, id: u32, payload: &[u8]) -> Result<()> {
        self.enqueue(WriteRequest::new(self.encode(id, payload)?))
    }

    fn encode(&self, id: u32, payload: &[u8]) -> Result<BytesMut> {
        if payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size,
            });
        }
        let mut buf = BytesMut::new();
        encode_message(id, payload, &mut buf)?;
        trace!(id, size = payload.len(), "frame enqueued");
        Ok(buf)
    }

    fn enqueue(&self, request: WriteRequest) -> Result<()> {
        self.tx.send(request).map_err(|_| FrameError::Disconnected)
    }
}

/// Cloneable producer of delimiter-terminated outbound messages.
#[derive(Debug, Clone)]
pub struct LineOutbox {
    tx: Sender<WriteRequest>,
    delimiter: u8,
    max_payload_size: usize,
}

impl LineOutbox {
    pub(crate) fn new(tx: Sender<WriteRequest>, delimiter: u8, max_payload_size: usize) -> Self {
        Self {
            tx,
            delimiter,
            max_payload_size,
        }
    }

    /// Enqueue `payload` followed by the delimiter, returning an [`Ack`].
    pub fn send(&self, payload: &[u8]) -> Result<Ack> {
        let (request, ack) = WriteRequest::with_ack(self.encode(payload)?);
        self.enqueue(request)?;
        Ok(ack)
    }

    /// Enqueue `payload` followed by the delimiter.
    pub fn post(&self, payload: &[u8]) -> Result<()> {
        self.enqueue(WriteRequest::new(self.encode(payload)?))
    }

    fn encode(&self, payload: &[u8]) -> Result<BytesMut> {
        if payload.contains(&self.delimiter) {
            return Err(FrameError::DelimiterInPayload(self.delimiter));
        }
        if payload.len() > self.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: self.max_payload_size,
            });
        }
        let mut buf = BytesMut::with_capacity(payload.len() + 1);
        buf.put_slice(payload);
        buf.put_u8(self.delimiter);
        Ok(buf)
    }

    fn enqueue(&self, request: WriteRequest) -> Result<()> {
        self.tx.send(request).map_err(|_| FrameError::Disconnected)
    }
}
