use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{Receiver, Sender};
use rpclink_core::{ProtocolHandler, WriteRequest};
use tracing::{debug, trace};

use crate::codec::{parse_header, FrameConfig, Message, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::outbox::Outbox;

/// Length-prefixed protocol handler.
///
/// Each `handle` call reads exactly one frame (header, then payload) into the
/// link's buffer and dispatches the decoded [`Message`] to the inbound
/// receiver returned by [`FramedHandler::new`]. Outbound messages go through
/// [`Outbox`] handles.
pub struct FramedHandler {
    input: Option<Box<dyn Read + Send>>,
    config: FrameConfig,
    inbound: Sender<Message>,
    outbound: Receiver<WriteRequest>,
    outbox: Outbox,
}

impl FramedHandler {
    /// Create a handler and the receiver its decoded messages are sent to.
    pub fn new(config: FrameConfig) -> (Self, Receiver<Message>) {
        let (inbound, inbound_rx) = crossbeam_channel::unbounded();
        let (outbound_tx, outbound) = crossbeam_channel::unbounded();
        let handler = Self {
            input: None,
            outbox: Outbox::new(outbound_tx, config.max_payload_size),
            config,
            inbound,
            outbound,
        };
        (handler, inbound_rx)
    }

    /// Producer handle for outbound messages.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Current handler configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn dispatch(&self, message: Message) {
        trace!(id = message.id, size = message.payload.len(), "frame received");
        if self.inbound.send(message).is_err() {
            debug!("inbound receiver dropped; discarding frame");
        }
    }
}

impl ProtocolHandler for FramedHandler {
    type Error = FrameError;

    fn init(&mut self, input: Box<dyn Read + Send>) -> Result<()> {
        self.input = Some(input);
        Ok(())
    }

    fn handle(&mut self, buf: &mut BytesMut) -> Result<()> {
        let input = self.input.as_mut().ok_or(FrameError::NotInitialized)?;

        buf.resize(HEADER_SIZE, 0);
        let got = read_full(input, &mut buf[..])?;
        if got == 0 {
            return Err(FrameError::ConnectionClosed);
        }
        if got < HEADER_SIZE {
            return Err(FrameError::Truncated { received: got });
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&buf[..HEADER_SIZE]);
        let header = parse_header(&header, self.config.max_payload_size)?;

        buf.resize(HEADER_SIZE + header.payload_len, 0);
        let got = read_full(input, &mut buf[HEADER_SIZE..])?;
        if got < header.payload_len {
            return Err(FrameError::Truncated {
                received: HEADER_SIZE + got,
            });
        }

        let payload = Bytes::copy_from_slice(&buf[HEADER_SIZE..]);
        self.dispatch(Message {
            id: header.id,
            payload,
        });
        Ok(())
    }

    fn outbound_requests(&self) -> Receiver<WriteRequest> {
        self.outbound.clone()
    }
}

/// Fill `dst` from `input`, stopping early only at end-of-stream.
///
/// Returns the number of bytes read.
fn read_full(input: &mut (dyn Read + Send), dst: &mut [u8]) -> Result<usize> {
    let mut filled = 0usize;
    while filled < dst.len() {
        match input.read(&mut dst[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use bytes::BufMut;

    use super::*;
    use crate::codec::{encode_message, MAGIC};

    fn handler_over(bytes: Vec<u8>, config: FrameConfig) -> (FramedHandler, Receiver<Message>) {
        let (mut handler, inbound) = FramedHandler::new(config);
        handler.init(Box::new(Cursor::new(bytes))).unwrap();
        (handler, inbound)
    }

    fn wire(messages: &[(u32, &[u8])]) -> Vec<u8> {
        let mut wire = BytesMut::new();
        for (id, payload) in messages {
            encode_message(*id, payload, &mut wire).unwrap();
        }
        wire.to_vec()
    }

    #[test]
    fn reads_one_frame_per_call() {
        let bytes = wire(&[(1, b"one"), (2, b"two")]);
        let (mut handler, inbound) = handler_over(bytes, FrameConfig::default());
        let mut buf = BytesMut::new();

        handler.handle(&mut buf).unwrap();
        assert_eq!(inbound.try_recv().unwrap(), Message::new(1, &b"one"[..]));
        assert!(inbound.try_recv().is_err());

        buf.clear();
        handler.handle(&mut buf).unwrap();
        assert_eq!(inbound.try_recv().unwrap(), Message::new(2, &b"two"[..]));

        buf.clear();
        assert!(matches!(
            handler.handle(&mut buf),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn byte_by_byte_input() {
        let bytes = wire(&[(4, b"slow")]);
        let (mut handler, inbound) = FramedHandler::new(FrameConfig::default());
        handler
            .init(Box::new(ByteByByteReader { bytes, pos: 0 }))
            .unwrap();

        let mut buf = BytesMut::new();
        handler.handle(&mut buf).unwrap();
        assert_eq!(inbound.try_recv().unwrap(), Message::new(4, &b"slow"[..]));
    }

    #[test]
    fn empty_payload_frame() {
        let (mut handler, inbound) = handler_over(wire(&[(9, b"")]), FrameConfig::default());
        let mut buf = BytesMut::new();
        handler.handle(&mut buf).unwrap();

        let message = inbound.try_recv().unwrap();
        assert_eq!(message.id, 9);
        assert!(message.payload.is_empty());
    }

    #[test]
    fn truncated_header() {
        let (mut handler, _inbound) = handler_over(vec![0x52, 0x4C, 0x01], FrameConfig::default());
        let err = handler.handle(&mut BytesMut::new()).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { received: 3 }));
    }

    #[test]
    fn truncated_payload() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(16);
        partial.put_u32_le(2);
        partial.put_slice(b"only-part");

        let (mut handler, _inbound) = handler_over(partial.to_vec(), FrameConfig::default());
        let err = handler.handle(&mut BytesMut::new()).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated { received } if received == HEADER_SIZE + 9
        ));
    }

    #[test]
    fn invalid_magic_in_stream() {
        let (mut handler, _inbound) = handler_over(vec![0u8; HEADER_SIZE], FrameConfig::default());
        let err = handler.handle(&mut BytesMut::new()).unwrap_err();
        assert!(matches!(err, FrameError::InvalidMagic));
    }

    #[test]
    fn oversized_frame_rejected_before_payload_read() {
        let cfg = FrameConfig {
            max_payload_size: 4,
            ..FrameConfig::default()
        };
        let (mut handler, _inbound) = handler_over(wire(&[(1, b"oversized")]), cfg);
        let err = handler.handle(&mut BytesMut::new()).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 4 }));
    }

    #[test]
    fn handle_before_init_fails() {
        let (mut handler, _inbound) = FramedHandler::new(FrameConfig::default());
        let err = handler.handle(&mut BytesMut::new()).unwrap_err();
        assert!(matches!(err, FrameError::NotInitialized));
    }

    #[test]
    fn dropped_inbound_receiver_is_not_an_error() {
        let (mut handler, inbound) = handler_over(wire(&[(1, b"x")]), FrameConfig::default());
        drop(inbound);
        handler.handle(&mut BytesMut::new()).unwrap();
    }

    #[test]
    fn interrupted_read_retries() {
        let bytes = wire(&[(8, b"ok")]);
        let (mut handler, inbound) = FramedHandler::new(FrameConfig::default());
        handler
            .init(Box::new(InterruptedThenData {
                interrupted: false,
                inner: Cursor::new(bytes),
            }))
            .unwrap();

        handler.handle(&mut BytesMut::new()).unwrap();
        assert_eq!(inbound.try_recv().unwrap(), Message::new(8, &b"ok"[..]));
    }

    #[cfg(unix)]
    #[test]
    fn request_response_over_duplex_links() {
        use rpclink_core::{DuplexLink, LinkStream};

        let (left, right) = LinkStream::pair().unwrap();

        let (server_handler, server_inbound) = FramedHandler::new(FrameConfig::default());
        let server_outbox = server_handler.outbox();
        let mut server = DuplexLink::new(server_handler);
        server.bind(right).unwrap();
        server.start().unwrap();

        let (client_handler, client_inbound) = FramedHandler::new(FrameConfig::default());
        let client_outbox = client_handler.outbox();
        let mut client = DuplexLink::new(client_handler);
        client.bind(left).unwrap();
        client.start().unwrap();

        let echo = std::thread::spawn(move || {
            for _ in 0..3 {
                let message = server_inbound.recv().unwrap();
                server_outbox.post(message.id, &message.payload).unwrap();
            }
        });

        let acks: Vec<_> = (1..=3u32)
            .map(|id| {
                client_outbox
                    .send(id, format!("call-{id}").as_bytes())
                    .unwrap()
            })
            .collect();
        for ack in acks {
            assert!(matches!(ack.wait_timeout(Duration::from_secs(2)), Some(Ok(()))));
        }

        for id in 1..=3u32 {
            let reply = client_inbound.recv_timeout(Duration::from_secs(2)).unwrap();
            assert_eq!(reply.id, id);
            assert_eq!(reply.payload.as_ref(), format!("call-{id}").as_bytes());
        }
        echo.join().unwrap();

        for link in [&mut client, &mut server] {
            link.stop();
            link.close();
            link.join();
        }
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }
}
