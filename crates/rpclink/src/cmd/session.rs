use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rpclink_core::{Ack, CloseHandle, Direction, DuplexLink, LinkConfig, LinkError};
use rpclink_frame::{FrameConfig, FrameError, FramedHandler, LineHandler, LineOutbox, Message, Outbox};
use rpclink_transport::{Connection, LinkStream};

use crate::exit::{frame_error, link_error, transport_error, CliError, CliResult, TIMEOUT};

/// One inbound message, with its id when the wire format carries one.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub id: Option<u32>,
    pub payload: Bytes,
}

enum Wire {
    Framed {
        link: DuplexLink<FramedHandler>,
        inbound: Receiver<Message>,
        outbox: Outbox,
    },
    Line {
        link: DuplexLink<LineHandler>,
        inbound: Receiver<Bytes>,
        outbox: LineOutbox,
    },
}

/// A started link plus the producer and consumer ends of its handler.
///
/// Dropping the session stops and closes the link, then waits for both loops.
pub struct Session {
    wire: Wire,
    peer: String,
}

impl Session {
    pub fn open(stream: LinkStream, line: bool, frame: FrameConfig, role: &str) -> CliResult<Self> {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| stream.transport_name().to_string());
        stream
            .set_nodelay(true)
            .map_err(|err| transport_error("socket setup failed", err))?;
        let config = LinkConfig::default().with_name(format!("{role}-{peer}"));

        let wire = if line {
            let (handler, inbound) = LineHandler::new(frame);
            let outbox = handler.outbox();
            let mut link = DuplexLink::with_config(handler, config).with_reporter(report);
            link.bind(stream)
                .map_err(|err| link_error("link setup failed", err))?;
            link.start()
                .map_err(|err| link_error("link setup failed", err))?;
            Wire::Line {
                link,
                inbound,
                outbox,
            }
        } else {
            let (handler, inbound) = FramedHandler::new(frame);
            let outbox = handler.outbox();
            let mut link = DuplexLink::with_config(handler, config).with_reporter(report);
            link.bind(stream)
                .map_err(|err| link_error("link setup failed", err))?;
            link.start()
                .map_err(|err| link_error("link setup failed", err))?;
            Wire::Framed {
                link,
                inbound,
                outbox,
            }
        };

        tracing::debug!(peer = %peer, line, "session opened");
        Ok(Self { wire, peer })
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Handle that closes this session's connection from another thread.
    pub fn close_handle(&self) -> Option<CloseHandle> {
        match &self.wire {
            Wire::Framed { link, .. } => link.close_handle(),
            Wire::Line { link, .. } => link.close_handle(),
        }
    }

    /// Block for the next message. `None` once the read side has ended.
    pub fn recv(&self) -> Option<Incoming> {
        match &self.wire {
            Wire::Framed { inbound, .. } => inbound.recv().ok().map(Incoming::from),
            Wire::Line { inbound, .. } => inbound.recv().ok().map(Incoming::line),
        }
    }

    /// Enqueue a message and return its write acknowledgement. Line mode
    /// ignores `id`.
    pub fn send(&self, id: u32, payload: &[u8]) -> CliResult<Ack> {
        let sent = match &self.wire {
            Wire::Framed { outbox, .. } => outbox.send(id, payload),
            Wire::Line { outbox, .. } => outbox.send(payload),
        };
        sent.map_err(|err| frame_error("send failed", err))
    }

    /// Enqueue a message without waiting on its outcome.
    pub fn post(&self, id: u32, payload: &[u8]) -> CliResult<()> {
        let posted = match &self.wire {
            Wire::Framed { outbox, .. } => outbox.post(id, payload),
            Wire::Line { outbox, .. } => outbox.post(payload),
        };
        posted.map_err(|err| frame_error("send failed", err))
    }
}

impl super::ReplySource for Session {
    fn recv_timeout(&self, timeout: Duration) -> CliResult<Option<Incoming>> {
        let received = match &self.wire {
            Wire::Framed { inbound, .. } => inbound.recv_timeout(timeout).map(Incoming::from),
            Wire::Line { inbound, .. } => inbound.recv_timeout(timeout).map(Incoming::line),
        };
        match received {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
            Err(RecvTimeoutError::Timeout) => Err(CliError::new(
                TIMEOUT,
                format!("no response within {timeout:?}"),
            )),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        match &mut self.wire {
            Wire::Framed { link, .. } => {
                link.stop();
                link.close();
                link.join();
            }
            Wire::Line { link, .. } => {
                link.stop();
                link.close();
                link.join();
            }
        }
        tracing::debug!(peer = %self.peer, "session closed");
    }
}

/// Peers hanging up at a message boundary is routine for a CLI session.
fn report(link: &str, direction: Direction, err: &LinkError) {
    if is_peer_hangup(err) {
        tracing::debug!(link, %direction, "peer closed the connection");
    } else {
        tracing::warn!(link, %direction, error = %err, "link failed");
    }
}

fn is_peer_hangup(err: &LinkError) -> bool {
    match err {
        LinkError::Handler(source) => matches!(
            source.downcast_ref::<FrameError>(),
            Some(FrameError::ConnectionClosed)
        ),
        _ => false,
    }
}

impl From<Message> for Incoming {
    fn from(message: Message) -> Self {
        Self {
            id: Some(message.id),
            payload: message.payload,
        }
    }
}

impl Incoming {
    fn line(payload: Bytes) -> Self {
        Self { id: None, payload }
    }
}
