//! Diagnostic Relay Library
//!
//! Routes the print and error output of an embedded scripting VM to host
//! callbacks, using the VM's single foreign-pointer slot as the only link
//! between the two. No global state is involved, so every VM instance relays
//! to its own host context.
//!
//! # Architecture
//!
//! - [`HostContext`]: `#[repr(C)]` table of two nullable C callbacks
//! - [`ForeignSlot`]: the VM's per-instance opaque pointer
//! - [`relay_print`] / [`relay_error`]: format into a bounded native buffer
//!   and forward to the callback, or do nothing if none is attached
//! - [`HostRelay`]: owned context whose callbacks are Rust closures
//! - `squirrel` (feature): Squirrel 3 VM with the variadic C entry points
//!
//! The relay never fails. An unattached VM or a missing callback drops the
//! message; an oversized message is truncated.
//!
//! # Example Usage
//!
//! ```no_run
//! use diag_relay::{ForeignSlot, HostRelay};
//! use std::ffi::c_void;
//!
//! struct MyVm {
//!     foreign: *mut c_void,
//! }
//!
//! impl ForeignSlot for MyVm {
//!     type Char = u8;
//!     fn foreign_ptr(&self) -> *mut c_void {
//!         self.foreign
//!     }
//!     fn set_foreign_ptr(&mut self, ptr: *mut c_void) {
//!         self.foreign = ptr;
//!     }
//! }
//!
//! let relay = HostRelay::<u8>::silent()
//!     .with_print(|message| println!("vm: {}", message))
//!     .with_error(|message| eprintln!("vm error: {}", message));
//!
//! let mut vm = MyVm { foreign: std::ptr::null_mut() };
//! relay.attach(&mut vm).unwrap();
//!
//! // What the VM does when a script prints
//! unsafe { diag_relay::relay_print!(&vm, "{} + {} = {}", 1, 2, 3) };
//! ```

// Public modules
pub mod buffer;
pub mod config;
pub mod context;
pub mod host;
pub mod relay;
pub mod types;

#[cfg(feature = "squirrel")]
pub mod squirrel;

// Re-export main types for convenience
pub use buffer::{MessageBuffer, DEFAULT_BUFFER_LEN};
pub use config::{RelayConfig, SinkKind, VM_LOG_TARGET};
pub use context::{ForeignSlot, HostContext, RawCallback};
pub use host::{Callback, HostRelay};
pub use relay::{relay_bounded, relay_error, relay_print};
pub use types::{native_from_str, string_from_native, NativeChar, RelayError, Result, Stream};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
