//! Host Context and the VM foreign-pointer slot
//!
//! The embedded VM reserves exactly one opaque, per-instance word for host
//! data. The host stores the address of a [`HostContext`] there; the relay
//! reads it back on every diagnostic and calls whichever callback is set.
//!
//! `HostContext` is `#[repr(C)]` and shared with the C relay shim, so the
//! field order is part of the ABI.

use crate::types::{NativeChar, Stream};
use std::ffi::c_void;

/// Host callback receiving a NUL-terminated native message.
///
/// `context` is the same pointer that was stored in the VM's foreign slot,
/// so callbacks can recover their own state from it. `message` is only valid
/// for the duration of the call.
pub type RawCallback<C> = unsafe extern "C" fn(context: *mut HostContext<C>, message: *const C);

/// Host-owned callback table attached to a VM
///
/// Hosts that need more state than the two callbacks embed this struct as the
/// first field of their own `#[repr(C)]` struct and cast `context` back in
/// the callback.
#[repr(C)]
#[derive(Debug)]
pub struct HostContext<C: NativeChar = u8> {
    /// Called for regular script output
    pub print_callback: Option<RawCallback<C>>,
    /// Called for error output
    pub error_callback: Option<RawCallback<C>>,
}

impl<C: NativeChar> HostContext<C> {
    pub fn new(print_callback: Option<RawCallback<C>>, error_callback: Option<RawCallback<C>>) -> Self {
        Self {
            print_callback,
            error_callback,
        }
    }

    /// A context with no callbacks; every diagnostic is dropped
    pub fn empty() -> Self {
        Self::new(None, None)
    }

    /// Callback registered for `stream`, if any
    pub fn callback(&self, stream: Stream) -> Option<RawCallback<C>> {
        match stream {
            Stream::Print => self.print_callback,
            Stream::Error => self.error_callback,
        }
    }

    pub fn set_callback(&mut self, stream: Stream, callback: Option<RawCallback<C>>) {
        match stream {
            Stream::Print => self.print_callback = callback,
            Stream::Error => self.error_callback = callback,
        }
    }

    /// Check if a diagnostic on `stream` would reach the host
    pub fn is_configured(&self, stream: Stream) -> bool {
        self.callback(stream).is_some()
    }

    /// The opaque word to store in a VM's foreign slot
    pub fn as_foreign_ptr(&mut self) -> *mut c_void {
        self as *mut Self as *mut c_void
    }
}

impl<C: NativeChar> Default for HostContext<C> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Access to a VM's per-instance foreign pointer
///
/// The VM never inspects the pointer; it only stores it and hands it back.
pub trait ForeignSlot {
    /// Character unit of the VM build (narrow or wide)
    type Char: NativeChar;

    /// Current slot value, null if nothing is attached
    fn foreign_ptr(&self) -> *mut c_void;

    /// Replace the slot value
    fn set_foreign_ptr(&mut self, ptr: *mut c_void);
}

impl<V: ForeignSlot + ?Sized> ForeignSlot for &mut V {
    type Char = V::Char;

    fn foreign_ptr(&self) -> *mut c_void {
        (**self).foreign_ptr()
    }

    fn set_foreign_ptr(&mut self, ptr: *mut c_void) {
        (**self).set_foreign_ptr(ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    unsafe extern "C" fn noop(_context: *mut HostContext<u8>, _message: *const u8) {}

    #[test]
    fn test_empty_context_is_unconfigured() {
        let context = HostContext::<u8>::empty();
        assert!(!context.is_configured(Stream::Print));
        assert!(!context.is_configured(Stream::Error));
    }

    #[test]
    fn test_set_callback_per_stream() {
        let mut context = HostContext::<u8>::default();
        context.set_callback(Stream::Error, Some(noop));
        assert!(!context.is_configured(Stream::Print));
        assert!(context.is_configured(Stream::Error));

        context.set_callback(Stream::Error, None);
        assert!(!context.is_configured(Stream::Error));
    }

    #[test]
    fn test_callback_fields_are_nullable_pointers() {
        // Option<fn> keeps the C layout of two plain function pointers
        assert_eq!(
            std::mem::size_of::<HostContext<u8>>(),
            2 * std::mem::size_of::<*const c_void>()
        );
    }
}
