//! Rendering of relayed diagnostics
//!
//! Plain terminal output goes straight through the library sinks. When the
//! output is decorated (timestamps, JSON lines, or a file), the stdout and
//! stderr sinks are replaced by writers that render each message first.

use crate::config::{AppConfig, OutputConfig, OutputFormat};
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use diag_relay::{Callback, HostRelay, NativeChar, SinkKind, Stream};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{self, Write};

/// Turns one relayed message into the bytes written to a sink
#[derive(Debug, Clone)]
pub struct LineFormatter {
    format: OutputFormat,
    timestamps: bool,
    strip_trailing_newline: bool,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    stream: Stream,
    message: &'a str,
}

impl LineFormatter {
    pub fn new(output: &OutputConfig, strip_trailing_newline: bool) -> Self {
        Self {
            format: output.format,
            timestamps: output.timestamps,
            strip_trailing_newline,
        }
    }

    pub fn render(&self, stream: Stream, message: &str) -> String {
        let message = if self.strip_trailing_newline || self.format == OutputFormat::Json {
            message.trim_end_matches(['\r', '\n'])
        } else {
            message
        };
        let timestamp = self
            .timestamps
            .then(|| Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));

        match self.format {
            OutputFormat::Text => match timestamp {
                Some(timestamp) => format!("[{} {}] {}", timestamp, stream, message),
                None => message.to_string(),
            },
            OutputFormat::Json => {
                let record = JsonRecord {
                    timestamp,
                    stream,
                    message,
                };
                // Serializing strings and a unit enum cannot fail
                let mut line = serde_json::to_string(&record).unwrap_or_default();
                line.push('\n');
                line
            }
        }
    }
}

/// Build the host relay described by `config`
pub fn build_relay<C: NativeChar>(config: &AppConfig) -> Result<HostRelay<C>> {
    let mut relay = HostRelay::from_config(&config.relay);
    if !config.output.is_decorated() {
        return Ok(relay);
    }

    let formatter = LineFormatter::new(&config.output, config.relay.strip_trailing_newline);
    let file = match &config.output.file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open output file: {:?}", path))?,
        ),
        None => None,
    };

    for stream in [Stream::Print, Stream::Error] {
        let writer: Box<dyn Write> = match (config.relay.sink(stream), &file) {
            (SinkKind::Stdout | SinkKind::Stderr, Some(file)) => Box::new(
                file.try_clone()
                    .context("Failed to share output file between streams")?,
            ),
            (SinkKind::Stdout, None) => Box::new(io::stdout()),
            (SinkKind::Stderr, None) => Box::new(io::stderr()),
            // log and discard are unaffected by output decoration
            _ => continue,
        };
        relay.set_callback(stream, Some(line_callback(writer, stream, formatter.clone())));
    }

    Ok(relay)
}

fn line_callback(mut writer: Box<dyn Write>, stream: Stream, formatter: LineFormatter) -> Callback {
    Box::new(move |message: &str| {
        let line = formatter.render(stream, message);
        if let Err(e) = writer.write_all(line.as_bytes()).and_then(|_| writer.flush()) {
            log::warn!("Failed to write {} diagnostic: {}", stream, e);
        }
    })
}
