use std::io::{BufRead, BufReader, ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use crossbeam_channel::{Receiver, Sender};
use rpclink_core::{ProtocolHandler, WriteRequest};
use tracing::{debug, trace};

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::outbox::LineOutbox;

/// Delimiter-separated protocol handler.
///
/// Each `handle` call consumes one line, delimiter included, and dispatches
/// the line without its delimiter.
pub struct LineHandler {
    input: Option<BufReader<Box<dyn Read + Send>>>,
    config: FrameConfig,
    inbound: Sender<Bytes>,
    outbound: Receiver<WriteRequest>,
    outbox: LineOutbox,
}

impl LineHandler {
    /// Create a handler and the receiver its lines are sent to.
    pub fn new(config: FrameConfig) -> (Self, Receiver<Bytes>) {
        let (inbound, inbound_rx) = crossbeam_channel::unbounded();
        let (outbound_tx, outbound) = crossbeam_channel::unbounded();
        let handler = Self {
            input: None,
            outbox: LineOutbox::new(outbound_tx, config.delimiter, config.max_payload_size),
            config,
            inbound,
            outbound,
        };
        (handler, inbound_rx)
    }

    pub fn outbox(&self) -> LineOutbox {
        self.outbox.clone()
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl ProtocolHandler for LineHandler {
    type Error = FrameError;

    fn init(&mut self, input: Box<dyn Read + Send>) -> Result<()> {
        self.input = Some(BufReader::new(input));
        Ok(())
    }

    fn handle(&mut self, buf: &mut BytesMut) -> Result<()> {
        let input = self.input.as_mut().ok_or(FrameError::NotInitialized)?;
        let delimiter = self.config.delimiter;
        let max = self.config.max_payload_size;

        loop {
            let available = match input.fill_buf() {
                Ok(available) => available,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };
            if available.is_empty() {
                if buf.is_empty() {
                    return Err(FrameError::ConnectionClosed);
                }
                return Err(FrameError::Truncated {
                    received: buf.len(),
                });
            }

            let (chunk, done) = match available.iter().position(|b| *b == delimiter) {
                Some(at) => (&available[..at], true),
                None => (available, false),
            };
            if buf.len() + chunk.len() > max {
                return Err(FrameError::PayloadTooLarge {
                    size: buf.len() + chunk.len(),
                    max,
                });
            }
            buf.extend_from_slice(chunk);
            let consumed = chunk.len() + usize::from(done);
            input.consume(consumed);

            if done {
                break;
            }
        }

        let line = Bytes::copy_from_slice(buf);
        trace!(size = line.len(), "line received");
        if self.inbound.send(line).is_err() {
            debug!("inbound receiver dropped; discarding line");
        }
        Ok(())
    }

    fn outbound_requests(&self) -> Receiver<WriteRequest> {
        self.outbound.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn handler_over(bytes: &[u8], config: FrameConfig) -> (LineHandler, Receiver<Bytes>) {
        let (mut handler, inbound) = LineHandler::new(config);
        handler
            .init(Box::new(Cursor::new(bytes.to_vec())))
            .unwrap();
        (handler, inbound)
    }

    fn next_line(handler: &mut LineHandler) -> Result<()> {
        let mut buf = BytesMut::new();
        handler.handle(&mut buf)
    }

    #[test]
    fn splits_on_delimiter() {
        let (mut handler, inbound) = handler_over(b"alpha\nbeta\n\n", FrameConfig::default());

        next_line(&mut handler).unwrap();
        next_line(&mut handler).unwrap();
        next_line(&mut handler).unwrap();
        assert_eq!(inbound.try_recv().unwrap().as_ref(), b"alpha");
        assert_eq!(inbound.try_recv().unwrap().as_ref(), b"beta");
        assert!(inbound.try_recv().unwrap().is_empty());

        assert!(matches!(
            next_line(&mut handler),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn custom_delimiter() {
        let cfg = FrameConfig {
            delimiter: 0,
            ..FrameConfig::default()
        };
        let (mut handler, inbound) = handler_over(b"a\nb\0c\0", cfg);
        next_line(&mut handler).unwrap();
        next_line(&mut handler).unwrap();
        assert_eq!(inbound.try_recv().unwrap().as_ref(), b"a\nb");
        assert_eq!(inbound.try_recv().unwrap().as_ref(), b"c");
    }

    #[test]
    fn partial_line_at_eof_is_truncated() {
        let (mut handler, inbound) = handler_over(b"done\npart", FrameConfig::default());
        next_line(&mut handler).unwrap();
        assert_eq!(inbound.try_recv().unwrap().as_ref(), b"done");

        let err = next_line(&mut handler).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { received: 4 }));
    }

    #[test]
    fn overlong_line_is_rejected() {
        let cfg = FrameConfig {
            max_payload_size: 3,
            ..FrameConfig::default()
        };
        let (mut handler, _inbound) = handler_over(b"abcdef\n", cfg);
        let err = next_line(&mut handler).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 6, max: 3 }));
    }

    #[test]
    fn line_of_exactly_max_is_accepted() {
        let cfg = FrameConfig {
            max_payload_size: 3,
            ..FrameConfig::default()
        };
        let (mut handler, inbound) = handler_over(b"abc\n", cfg);
        next_line(&mut handler).unwrap();
        assert_eq!(inbound.try_recv().unwrap().as_ref(), b"abc");
    }

    #[test]
    fn line_spanning_buffer_refills() {
        let long = vec![b'x'; 20_000];
        let mut bytes = long.clone();
        bytes.push(b'\n');
        let (mut handler, inbound) = handler_over(&bytes, FrameConfig::default());
        next_line(&mut handler).unwrap();
        assert_eq!(inbound.try_recv().unwrap().as_ref(), long.as_slice());
    }

    #[test]
    fn handle_before_init_fails() {
        let (mut handler, _inbound) = LineHandler::new(FrameConfig::default());
        assert!(matches!(
            next_line(&mut handler),
            Err(FrameError::NotInitialized)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn lines_over_duplex_link() {
        use std::io::Write;
        use std::time::Duration;

        use rpclink_core::{DuplexLink, LinkStream};

        let (local, mut peer) = LinkStream::pair().unwrap();
        let (handler, inbound) = LineHandler::new(FrameConfig::default());
        let outbox = handler.outbox();
        let mut link = DuplexLink::new(handler);
        link.bind(local).unwrap();
        link.start().unwrap();

        peer.write_all(b"ping\n").unwrap();
        let line = inbound.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(line.as_ref(), b"ping");

        let ack = outbox.send(b"pong").unwrap();
        assert!(matches!(ack.wait_timeout(Duration::from_secs(2)), Some(Ok(()))));
        peer.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        let mut reply = [0u8; 5];
        peer.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, b"pong\n");

        link.stop();
        link.close();
        link.join();
    }
}
