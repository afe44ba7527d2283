//! Minimal echo server: accepts one TCP peer and echoes framed messages back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:7070 \
//!     --id 1 --json '{"hello":"world"}' --wait --wait-timeout 3

use rpclink::frame::FrameConfig;
use rpclink::{DuplexLink, FramedHandler, TcpTransport};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpTransport::bind("127.0.0.1:7070")?;
    eprintln!("Listening on {}", listener.local_addr());

    let stream = listener.accept()?;
    eprintln!("Peer connected: {:?}", stream.peer_addr());

    let (handler, inbound) = FramedHandler::new(FrameConfig::default());
    let outbox = handler.outbox();
    let mut link = DuplexLink::new(handler);
    link.bind(stream)?;
    link.start()?;

    // The inbound channel closes when the read loop ends.
    for message in inbound {
        eprintln!(
            "Received {} bytes with id {}",
            message.payload.len(),
            message.id
        );
        outbox.post(message.id, &message.payload)?;
    }

    eprintln!("Peer disconnected");
    link.stop();
    link.close();
    link.join();
    Ok(())
}
