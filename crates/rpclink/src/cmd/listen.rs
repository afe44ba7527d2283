use rpclink_transport::TcpTransport;

use crate::cmd::interrupt::Interrupt;
use crate::cmd::session::Session;
use crate::cmd::ListenArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat, Received};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = TcpTransport::bind(args.addr.as_str())
        .map_err(|err| transport_error("bind failed", err))?;
    tracing::info!(addr = %listener.local_addr(), line = args.wire.line, "listening");

    let interrupt = Interrupt::install(listener.local_addr())?;

    let frame_config = args.wire.frame_config();
    let mut printed = 0usize;

    while interrupt.is_running() {
        let stream = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        if !interrupt.is_running() {
            break;
        }
        let session = Session::open(stream, args.wire.line, frame_config.clone(), "listen")?;
        tracing::info!(peer = session.peer(), "peer connected");
        if let Some(handle) = session.close_handle() {
            interrupt.track(handle);
        }

        while let Some(message) = session.recv() {
            print_message(
                &Received {
                    id: message.id,
                    payload: &message.payload,
                    peer: session.peer(),
                },
                format,
            );
            printed = printed.saturating_add(1);

            if args.count.is_some_and(|count| printed >= count) {
                return Ok(SUCCESS);
            }
        }
        tracing::info!(peer = session.peer(), "peer disconnected");
    }

    Ok(SUCCESS)
}
