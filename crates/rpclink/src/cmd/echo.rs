use std::thread::JoinHandle;

use rpclink_transport::TcpTransport;

use crate::cmd::interrupt::Interrupt;
use crate::cmd::session::Session;
use crate::cmd::EchoArgs;
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let listener = TcpTransport::bind(args.addr.as_str())
        .map_err(|err| transport_error("bind failed", err))?;
    tracing::info!(addr = %listener.local_addr(), line = args.wire.line, "echo server listening");

    let interrupt = Interrupt::install(listener.local_addr())?;

    let frame_config = args.wire.frame_config();
    let mut sessions: Vec<JoinHandle<()>> = Vec::new();
    let mut served = 0usize;

    while interrupt.is_running() {
        let stream = listener
            .accept()
            .map_err(|err| transport_error("accept failed", err))?;
        if !interrupt.is_running() {
            break;
        }

        let session = match Session::open(stream, args.wire.line, frame_config.clone(), "echo") {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(error = %err, "dropping connection");
                continue;
            }
        };
        tracing::info!(peer = session.peer(), "peer connected");
        if let Some(handle) = session.close_handle() {
            interrupt.track(handle);
        }
        sessions.retain(|handle| !handle.is_finished());
        let spawned = std::thread::Builder::new()
            .name(format!("echo-{}", session.peer()))
            .spawn(move || echo_session(session))
            .map_err(|err| crate::exit::io_error("session spawn failed", err))?;
        sessions.push(spawned);

        served = served.saturating_add(1);
        if args.max_connections.is_some_and(|max| served >= max) {
            break;
        }
    }

    for handle in sessions {
        if handle.join().is_err() {
            tracing::warn!("echo session panicked");
        }
    }
    Ok(SUCCESS)
}

fn echo_session(session: Session) {
    while let Some(message) = session.recv() {
        tracing::info!(
            peer = session.peer(),
            id = ?message.id,
            size = message.payload.len(),
            "echoing message"
        );
        if let Err(err) = session.post(message.id.unwrap_or_default(), &message.payload) {
            tracing::warn!(peer = session.peer(), error = %err, "echo reply failed");
            break;
        }
    }
    tracing::info!(peer = session.peer(), "peer disconnected");
}
