//! The diagnostic relay
//!
//! `relay_print` and `relay_error` are what the VM calls when it wants to
//! print a line or report an error. Each call is forwarded synchronously to
//! the host callback found through the VM's foreign slot:
//!
//! 1. Read the foreign pointer; null means no relay is configured.
//! 2. Read the callback for the stream; null means the same.
//! 3. Render the message into a bounded, NUL-terminated buffer.
//! 4. Call `callback(context, buffer)` and return.
//!
//! Nothing is buffered across calls and no state is kept between them.

use crate::buffer::{MessageBuffer, DEFAULT_BUFFER_LEN};
use crate::context::{ForeignSlot, HostContext};
use crate::types::Stream;
use std::fmt;

/// Forward a print diagnostic from `vm` to its host
///
/// # Safety
/// The foreign pointer of `vm` must be null or point to a live
/// `HostContext<V::Char>` (or a `#[repr(C)]` struct starting with one).
pub unsafe fn relay_print<V>(vm: &V, args: fmt::Arguments<'_>)
where
    V: ForeignSlot + ?Sized,
{
    relay_bounded::<V, DEFAULT_BUFFER_LEN>(vm, Stream::Print, args)
}

/// Forward an error diagnostic from `vm` to its host
///
/// # Safety
/// Same contract as [`relay_print`].
pub unsafe fn relay_error<V>(vm: &V, args: fmt::Arguments<'_>)
where
    V: ForeignSlot + ?Sized,
{
    relay_bounded::<V, DEFAULT_BUFFER_LEN>(vm, Stream::Error, args)
}

/// Forward a diagnostic using a buffer of `N` native units
///
/// # Safety
/// Same contract as [`relay_print`].
pub unsafe fn relay_bounded<V, const N: usize>(vm: &V, stream: Stream, args: fmt::Arguments<'_>)
where
    V: ForeignSlot + ?Sized,
{
    let context = vm.foreign_ptr() as *mut HostContext<V::Char>;
    if context.is_null() {
        log::trace!("No host context attached, dropping {} diagnostic", stream);
        return;
    }

    let callback = match (*context).callback(stream) {
        Some(callback) => callback,
        None => {
            log::trace!("No {} callback installed, dropping diagnostic", stream);
            return;
        }
    };

    let buffer = MessageBuffer::<V::Char, N>::format(args);
    if buffer.is_truncated() {
        log::debug!(
            "{} diagnostic truncated to {} units",
            stream,
            MessageBuffer::<V::Char, N>::CAPACITY
        );
    }

    callback(context, buffer.as_ptr());
}

/// Forward a formatted print diagnostic: `relay_print!(vm, "{}", value)`
///
/// Expands to a call of [`relay_print`](crate::relay_print) and must be used
/// inside `unsafe`.
#[macro_export]
macro_rules! relay_print {
    ($vm:expr, $($arg:tt)+) => {
        $crate::relay_print($vm, ::std::format_args!($($arg)+))
    };
}

/// Forward a formatted error diagnostic: `relay_error!(vm, "{}", value)`
///
/// Expands to a call of [`relay_error`](crate::relay_error) and must be used
/// inside `unsafe`.
#[macro_export]
macro_rules! relay_error {
    ($vm:expr, $($arg:tt)+) => {
        $crate::relay_error($vm, ::std::format_args!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::string_from_native;
    use std::ffi::c_void;
    use std::ptr;

    struct TestVm {
        foreign: *mut c_void,
    }

    impl ForeignSlot for TestVm {
        type Char = u8;

        fn foreign_ptr(&self) -> *mut c_void {
            self.foreign
        }

        fn set_foreign_ptr(&mut self, ptr: *mut c_void) {
            self.foreign = ptr;
        }
    }

    #[repr(C)]
    struct Recorder {
        context: HostContext<u8>,
        lines: Vec<(Stream, String)>,
    }

    unsafe extern "C" fn record_print(context: *mut HostContext<u8>, message: *const u8) {
        let recorder = &mut *(context as *mut Recorder);
        recorder.lines.push((Stream::Print, string_from_native(message)));
    }

    unsafe extern "C" fn record_error(context: *mut HostContext<u8>, message: *const u8) {
        let recorder = &mut *(context as *mut Recorder);
        recorder.lines.push((Stream::Error, string_from_native(message)));
    }

    fn recorder() -> Box<Recorder> {
        Box::new(Recorder {
            context: HostContext::new(Some(record_print), Some(record_error)),
            lines: Vec::new(),
        })
    }

    #[test]
    fn test_print_reaches_callback_once() {
        let mut recorder = recorder();
        let vm = TestVm {
            foreign: &mut *recorder as *mut Recorder as *mut c_void,
        };

        unsafe { relay_print(&vm, format_args!("{}", "hello")) };

        assert_eq!(recorder.lines, vec![(Stream::Print, "hello".to_string())]);
    }

    #[test]
    fn test_streams_route_to_their_callbacks() {
        let mut recorder = recorder();
        let vm = TestVm {
            foreign: &mut *recorder as *mut Recorder as *mut c_void,
        };

        unsafe {
            relay_print!(&vm, "x = {}", 1);
            relay_error!(&vm, "bad {}", "thing");
        }

        assert_eq!(
            recorder.lines,
            vec![
                (Stream::Print, "x = 1".to_string()),
                (Stream::Error, "bad thing".to_string()),
            ]
        );
    }

    #[test]
    fn test_null_context_is_noop() {
        let vm = TestVm {
            foreign: ptr::null_mut(),
        };
        unsafe {
            relay_print(&vm, format_args!("dropped"));
            relay_error(&vm, format_args!("dropped"));
        }
    }

    #[test]
    fn test_bounded_relay_truncates() {
        let mut recorder = recorder();
        let vm = TestVm {
            foreign: &mut *recorder as *mut Recorder as *mut c_void,
        };

        unsafe { relay_bounded::<_, 6>(&vm, Stream::Error, format_args!("{}", "overflowing")) };

        assert_eq!(recorder.lines, vec![(Stream::Error, "overf".to_string())]);
    }
}
