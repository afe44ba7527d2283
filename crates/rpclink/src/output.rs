use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// A received message as the CLI presents it. Line-mode messages have no id.
pub struct Received<'a> {
    pub id: Option<u32>,
    pub payload: &'a [u8],
    pub peer: &'a str,
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u32>,
    payload_size: usize,
    payload: String,
    peer: &'a str,
    timestamp: String,
}

pub fn print_message(message: &Received<'_>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{}", render_json(message));
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "SIZE", "PEER", "PAYLOAD"])
                .add_row(vec![
                    id_label(message.id),
                    message.payload.len().to_string(),
                    message.peer.to_string(),
                    payload_preview(message.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "id={} size={} peer={} payload={}",
                id_label(message.id),
                message.payload.len(),
                message.peer,
                payload_preview(message.payload)
            );
        }
        OutputFormat::Raw => {
            print_raw(message.payload);
        }
    }
}

fn render_json(message: &Received<'_>) -> String {
    let out = MessageOutput {
        kind: "message",
        id: message.id,
        payload_size: message.payload.len(),
        payload: payload_preview(message.payload),
        peer: message.peer,
        timestamp: now_unix_seconds(),
    };
    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn id_label(id: Option<u32>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_includes_id_when_present() {
        let json = render_json(&Received {
            id: Some(7),
            payload: b"hi",
            peer: "127.0.0.1:9000",
        });
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["kind"], "message");
        assert_eq!(value["id"], 7);
        assert_eq!(value["payload"], "hi");
        assert_eq!(value["payload_size"], 2);
    }

    #[test]
    fn json_omits_missing_id() {
        let json = render_json(&Received {
            id: None,
            payload: b"line",
            peer: "peer",
        });
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("id").is_none());
    }

    #[test]
    fn binary_payload_is_summarized() {
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }
}
