use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use crate::error::WriteError;

/// Result delivered through an ack sink.
pub type WriteOutcome = std::result::Result<(), WriteError>;

/// One outbound payload plus an optional acknowledgment sink.
///
/// Consumed exactly once by the write loop.
#[derive(Debug)]
pub struct WriteRequest {
    payload: Bytes,
    ack: Option<AckSender>,
}

impl WriteRequest {
    /// Create a request whose outcome nobody observes.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            ack: None,
        }
    }

    /// Create a request and the receiving end of its ack sink.
    pub fn with_ack(payload: impl Into<Bytes>) -> (Self, Ack) {
        let (sender, ack) = ack_pair();
        let request = Self {
            payload: payload.into(),
            ack: Some(sender),
        };
        (request, ack)
    }

    /// The bytes to transmit.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Whether an ack sink is attached.
    pub fn has_ack(&self) -> bool {
        self.ack.is_some()
    }

    pub(crate) fn into_parts(self) -> (Bytes, Option<AckSender>) {
        (self.payload, self.ack)
    }
}

/// Sending side of an ack sink. Single slot, never blocks.
#[derive(Debug)]
pub struct AckSender {
    tx: Sender<WriteOutcome>,
}

impl AckSender {
    /// Offer the outcome. Returns `false` when it was dropped because nobody
    /// can receive it.
    pub fn deliver(self, outcome: WriteOutcome) -> bool {
        match self.tx.try_send(outcome) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Receiving side of an ack sink.
///
/// Resolves at most once. An ack that never resolves means the link went
/// away before writing the request; callers apply their own timeout.
#[derive(Debug)]
pub struct Ack {
    rx: Receiver<WriteOutcome>,
}

impl Ack {
    /// Block until the outcome arrives. `None` if the request was discarded
    /// without being written.
    pub fn wait(self) -> Option<WriteOutcome> {
        self.rx.recv().ok()
    }

    /// Block up to `timeout` for the outcome.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<WriteOutcome> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Non-blocking check for the outcome.
    pub fn try_result(&self) -> Option<WriteOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

/// Create a connected ack sink pair.
pub fn ack_pair() -> (AckSender, Ack) {
    let (tx, rx) = crossbeam_channel::bounded(1);
    (AckSender { tx }, Ack { rx })
}
