use std::fs;

use rpclink_transport::TcpTransport;

use crate::cmd::session::Session;
use crate::cmd::{parse_duration, wait_for_reply, SendArgs};
use crate::exit::{transport_error, write_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_message, OutputFormat, Received};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let connect_timeout = parse_duration(&args.connect_timeout)?;
    let payload = resolve_payload(&args)?;

    let stream = TcpTransport::connect_timeout(args.addr.as_str(), connect_timeout)
        .map_err(|err| transport_error("connect failed", err))?;
    let session = Session::open(stream, args.wire.line, args.wire.frame_config(), "send")?;

    let ack = session.send(args.id, &payload)?;
    match ack.wait_timeout(wait_timeout) {
        Some(Ok(())) => {
            tracing::debug!(id = args.id, size = payload.len(), "message written");
        }
        Some(Err(err)) => return Err(write_error("send failed", err)),
        None => {
            return Err(CliError::new(
                TIMEOUT,
                format!("write not acknowledged within {wait_timeout:?}"),
            ))
        }
    }

    if args.wait {
        let reply = wait_for_reply(&session, args.id, wait_timeout)?.ok_or_else(|| {
            CliError::new(FAILURE, "connection closed before a response arrived")
        })?;
        print_message(
            &Received {
                id: reply.id,
                payload: &reply.payload,
                peer: session.peer(),
            },
            format,
        );
    }

    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::WireArgs;

    fn args() -> SendArgs {
        SendArgs {
            addr: "127.0.0.1:1".to_string(),
            wire: WireArgs {
                line: false,
                max_payload: 1024,
            },
            id: 1,
            json: None,
            data: None,
            file: None,
            wait: false,
            wait_timeout: "1s".to_string(),
            connect_timeout: "1s".to_string(),
        }
    }

    #[test]
    fn invalid_json_payload_is_usage_error() {
        let args = SendArgs {
            json: Some("{nope".to_string()),
            ..args()
        };
        let err = resolve_payload(&args).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn data_payload_passes_through() {
        let args = SendArgs {
            data: Some("hello".to_string()),
            ..args()
        };
        assert_eq!(resolve_payload(&args).unwrap(), b"hello");
    }

    #[test]
    fn missing_payload_is_empty() {
        assert!(resolve_payload(&args()).unwrap().is_empty());
    }
}
