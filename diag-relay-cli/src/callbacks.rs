//! C callbacks loaded from a shared library
//!
//! A host library exports functions with the relay callback signature:
//!
//! ```c
//! void on_print(void *context, const SQChar *message);
//! void on_error(void *context, const SQChar *message);
//! ```
//!
//! They are installed directly into the host context, bypassing the Rust
//! sinks for their stream.

use crate::config::CallbacksConfig;
use anyhow::{Context, Result};
use diag_relay::{HostRelay, NativeChar, RawCallback, Stream};
use libloading::{Library, Symbol};

/// Callback symbols resolved from a loaded library
///
/// The library stays loaded for as long as this value lives, which must be
/// longer than any VM the callbacks are installed in.
pub struct NativeCallbacks<C: NativeChar> {
    print: Option<RawCallback<C>>,
    error: Option<RawCallback<C>>,
    _library: Library,
}

impl<C: NativeChar> NativeCallbacks<C> {
    /// Load the configured library, `None` if no library is configured
    pub fn load(config: &CallbacksConfig) -> Result<Option<Self>> {
        let path = match &config.library {
            Some(path) => path,
            None => return Ok(None),
        };

        log::info!("Loading callback library: {:?}", path);
        // SAFETY: running the library's initializers is the point of loading it
        let library = unsafe { Library::new(path) }
            .with_context(|| format!("Failed to load callback library: {:?}", path))?;

        let print = resolve::<C>(&library, config.print.as_deref())?;
        let error = resolve::<C>(&library, config.error.as_deref())?;

        Ok(Some(Self {
            print,
            error,
            _library: library,
        }))
    }

    /// Route the resolved streams of `relay` to the native callbacks
    pub fn apply(&self, relay: &mut HostRelay<C>) {
        for (stream, callback) in [(Stream::Print, self.print), (Stream::Error, self.error)] {
            if let Some(callback) = callback {
                relay.set_raw_callback(stream, callback);
                log::debug!("{} diagnostics routed to native callback", stream);
            }
        }
    }
}

fn resolve<C: NativeChar>(library: &Library, symbol: Option<&str>) -> Result<Option<RawCallback<C>>> {
    let symbol = match symbol {
        Some(symbol) => symbol,
        None => return Ok(None),
    };

    // SAFETY: the configured symbol is declared to have the callback signature
    let callback: Symbol<RawCallback<C>> = unsafe { library.get(symbol.as_bytes()) }
        .with_context(|| format!("Callback symbol not found: {}", symbol))?;

    log::debug!("Resolved callback symbol {}", symbol);
    Ok(Some(*callback))
}
