//! Relay configuration types
//!
//! This module describes where each diagnostic stream should go. It is the
//! serializable half of [`HostRelay`](crate::HostRelay); the closures are
//! built from it by [`SinkKind::callback`].

use crate::host::Callback;
use crate::types::Stream;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};

/// Log target used by the `log` sink
pub const VM_LOG_TARGET: &str = "diag_relay::vm";

/// Configuration for a host relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Destination of print diagnostics
    #[serde(default = "default_print_sink")]
    pub print: SinkKind,

    /// Destination of error diagnostics
    #[serde(default = "default_error_sink")]
    pub error: SinkKind,

    /// Remove trailing line breaks before handing messages to the sink
    #[serde(default)]
    pub strip_trailing_newline: bool,
}

fn default_print_sink() -> SinkKind {
    SinkKind::Stdout
}

fn default_error_sink() -> SinkKind {
    SinkKind::Stderr
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            print: default_print_sink(),
            error: default_error_sink(),
            strip_trailing_newline: false,
        }
    }
}

impl RelayConfig {
    /// Create a configuration with default settings (stdout/stderr)
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the print sink
    pub fn with_print(mut self, sink: SinkKind) -> Self {
        self.print = sink;
        self
    }

    /// Builder method: set the error sink
    pub fn with_error(mut self, sink: SinkKind) -> Self {
        self.error = sink;
        self
    }

    /// Builder method: enable or disable trailing newline stripping
    pub fn with_strip_trailing_newline(mut self, enabled: bool) -> Self {
        self.strip_trailing_newline = enabled;
        self
    }

    /// Sink configured for `stream`
    pub fn sink(&self, stream: Stream) -> SinkKind {
        match stream {
            Stream::Print => self.print,
            Stream::Error => self.error,
        }
    }
}

/// Built-in destinations for relayed diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Stdout,
    Stderr,
    /// Forward to the `log` facade (print at info, error at error)
    Log,
    /// Leave the callback unset so the relay drops the message
    Discard,
}

impl SinkKind {
    /// Build the closure for this sink, `None` for `Discard`
    pub fn callback(self, stream: Stream, strip_trailing_newline: bool) -> Option<Callback> {
        let write: Callback = match self {
            SinkKind::Stdout => Box::new(|message: &str| {
                let mut out = io::stdout().lock();
                let _ = out.write_all(message.as_bytes());
                let _ = out.flush();
            }),
            SinkKind::Stderr => Box::new(|message: &str| {
                let _ = io::stderr().lock().write_all(message.as_bytes());
            }),
            SinkKind::Log => Box::new(move |message: &str| match stream {
                Stream::Print => log::info!(target: VM_LOG_TARGET, "{}", message),
                Stream::Error => log::error!(target: VM_LOG_TARGET, "{}", message),
            }),
            SinkKind::Discard => return None,
        };

        if strip_trailing_newline {
            let mut write = write;
            Some(Box::new(move |message: &str| {
                write(message.trim_end_matches(['\r', '\n']))
            }))
        } else {
            Some(write)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_builder() {
        let config = RelayConfig::new()
            .with_print(SinkKind::Log)
            .with_error(SinkKind::Discard)
            .with_strip_trailing_newline(true);

        assert_eq!(config.sink(Stream::Print), SinkKind::Log);
        assert_eq!(config.sink(Stream::Error), SinkKind::Discard);
        assert!(config.strip_trailing_newline);
    }

    #[test]
    fn test_defaults_match_terminal() {
        let config = RelayConfig::default();
        assert_eq!(config.print, SinkKind::Stdout);
        assert_eq!(config.error, SinkKind::Stderr);
        assert!(!config.strip_trailing_newline);
    }

    #[test]
    fn test_discard_has_no_callback() {
        assert!(SinkKind::Discard.callback(Stream::Print, false).is_none());
        assert!(SinkKind::Log.callback(Stream::Error, true).is_some());
    }
}
