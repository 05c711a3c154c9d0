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

/// One line of command output: a packet, a response, or a write.
#[derive(Serialize)]
pub struct Record<'a> {
    pub event: &'a str,
    pub device: &'a str,
    /// Descriptor or request label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<&'a str>,
    pub size: usize,
    pub data: String,
    pub timestamp: String,
}

impl<'a> Record<'a> {
    pub fn new(event: &'a str, device: &'a str, data: &[u8]) -> Self {
        Self {
            event,
            device,
            label: None,
            size: data.len(),
            data: payload_preview(data),
            timestamp: now_unix_seconds(),
        }
    }

    pub fn with_label(mut self, label: &'a str) -> Self {
        self.label = Some(label);
        self
    }
}

/// Print `record`; in raw mode `data` is written to stdout unchanged.
pub fn print_record(record: &Record<'_>, data: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "LABEL", "SIZE", "DATA"])
                .add_row(vec![
                    record.event.to_string(),
                    record.label.unwrap_or("-").to_string(),
                    record.size.to_string(),
                    record.data.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} label={} size={} data={}",
                record.event,
                record.label.unwrap_or("-"),
                record.size,
                record.data
            );
        }
        OutputFormat::Raw => {
            print_raw(data);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Text with control characters escaped, or a size note for binary data.
pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.escape_debug().to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
