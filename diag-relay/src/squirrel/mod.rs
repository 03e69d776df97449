//! Squirrel 3 embedding
//!
//! [`SquirrelVm`] owns a Squirrel VM and, optionally, the [`HostRelay`] its
//! print and error output is routed to. The relay is dropped after the VM is
//! closed, so the foreign pointer never dangles while the VM can still
//! print.
//!
//! Compile errors are reported through a compiler error handler that relays
//! the usual `file line = (..) column = (..) : error ..` line and keeps the
//! position for [`RelayError::Compile`]. The handler reaches its storage
//! through the VM's shared foreign pointer; the per-thread foreign pointer
//! stays reserved for the relay.

pub mod ffi;

use crate::context::ForeignSlot;
use crate::host::HostRelay;
use crate::relay::relay_error;
use crate::types::{native_from_str, string_from_native, RelayError, Result};
use ffi::*;
use std::ffi::c_void;
use std::ptr::{self, NonNull};

pub use ffi::SQChar;

/// Default initial stack size in slots
pub const DEFAULT_STACK_SIZE: SQInteger = 1024;

/// Last compile error seen by [`compile_error_handler`]
struct CompileFailure {
    message: String,
    line: i64,
    column: i64,
}

/// An owned Squirrel VM with an attachable diagnostic relay
pub struct SquirrelVm {
    raw: HSQUIRRELVM,
    compile_failure: NonNull<Option<CompileFailure>>,
    relay: Option<HostRelay<SQChar>>,
}

impl SquirrelVm {
    /// Open a VM with the given initial stack size
    pub fn new(initial_stack_size: SQInteger) -> Result<Self> {
        let raw = unsafe { sq_open(initial_stack_size) };
        if raw.is_null() {
            return Err(RelayError::Vm(format!(
                "sq_open({}) returned null",
                initial_stack_size
            )));
        }

        let compile_failure: NonNull<Option<CompileFailure>> = NonNull::from(Box::leak(Box::new(None)));
        unsafe {
            sq_setsharedforeignptr(raw, compile_failure.as_ptr().cast());
            sq_setcompilererrorhandler(raw, Some(compile_error_handler));
        }

        log::debug!("Squirrel VM opened with stack size {}", initial_stack_size);
        Ok(Self {
            raw,
            compile_failure,
            relay: None,
        })
    }

    /// Route this VM's print and error output through `relay`
    ///
    /// Any previously installed relay is detached and returned. If the
    /// foreign pointer was set to something else through [`as_raw`](Self::as_raw)
    /// or [`ForeignSlot`], this fails with [`RelayError::SlotOccupied`] and the
    /// current relay stays installed.
    pub fn install_relay(&mut self, relay: HostRelay<SQChar>) -> Result<Option<HostRelay<SQChar>>> {
        let current = self.foreign_ptr();
        let installed = self
            .relay
            .as_ref()
            .map_or(ptr::null_mut(), |relay| relay.context_ptr().cast::<c_void>());
        if !current.is_null() && current != installed {
            return Err(RelayError::SlotOccupied);
        }

        let previous = self.take_relay();
        relay.attach(self)?;
        unsafe { sq_setprintfunc(self.raw, Some(diag_relay_print), Some(diag_relay_error)) };
        self.relay = Some(relay);
        log::debug!("Diagnostic relay installed");
        Ok(previous)
    }

    /// Detach and return the installed relay
    ///
    /// The print functions stay registered; with a null foreign pointer they
    /// drop everything.
    pub fn take_relay(&mut self) -> Option<HostRelay<SQChar>> {
        let relay = self.relay.take()?;
        relay.detach(self);
        Some(relay)
    }

    pub fn relay(&self) -> Option<&HostRelay<SQChar>> {
        self.relay.as_ref()
    }

    pub fn relay_mut(&mut self) -> Option<&mut HostRelay<SQChar>> {
        self.relay.as_mut()
    }

    /// Register the standard libraries and the stdlib error handlers
    ///
    /// The runtime error handler prints the call stack through the error
    /// print function, i.e. through the relay.
    pub fn register_stdlib(&mut self) -> Result<()> {
        let registrations: [(&str, unsafe extern "C" fn(HSQUIRRELVM) -> SQRESULT); 5] = [
            ("blob", sqstd_register_bloblib),
            ("io", sqstd_register_iolib),
            ("math", sqstd_register_mathlib),
            ("string", sqstd_register_stringlib),
            ("system", sqstd_register_systemlib),
        ];

        unsafe {
            let top = sq_gettop(self.raw);
            sq_pushroottable(self.raw);
            for (name, register) in registrations {
                if sq_failed(register(self.raw)) {
                    sq_settop(self.raw, top);
                    return Err(RelayError::Vm(format!("failed to register {} library", name)));
                }
            }
            sq_settop(self.raw, top);
            sqstd_seterrorhandlers(self.raw);
            // The stdlib replaced the compiler handler; ours relays the same line
            sq_setcompilererrorhandler(self.raw, Some(compile_error_handler));
        }
        Ok(())
    }

    /// Compile `source` and run it with the root table as `this`
    pub fn run_source(&mut self, source: &str, source_name: &str) -> Result<()> {
        let native_source = native_from_str::<SQChar>(source)?;
        let native_name = native_from_str::<SQChar>(source_name)?;
        // Length in units, terminator excluded
        let size = (native_source.len() - 1) as SQInteger;

        unsafe {
            let top = sq_gettop(self.raw);
            *self.compile_failure.as_ptr() = None;
            if sq_failed(sq_compilebuffer(
                self.raw,
                native_source.as_ptr(),
                size,
                native_name.as_ptr(),
                SQ_TRUE,
            )) {
                let (message, line, column) = match (*self.compile_failure.as_ptr()).take() {
                    Some(failure) => (failure.message, failure.line, failure.column),
                    None => (
                        last_error_message(self.raw).unwrap_or_else(|| "unknown compile error".to_string()),
                        0,
                        0,
                    ),
                };
                sq_settop(self.raw, top);
                return Err(RelayError::Compile {
                    source_name: source_name.to_string(),
                    message,
                    line,
                    column,
                });
            }

            sq_pushroottable(self.raw);
            let result = sq_call(self.raw, 1, SQ_FALSE, SQ_TRUE);
            if sq_failed(result) {
                let message = last_error_message(self.raw).unwrap_or_else(|| "unknown error".to_string());
                sq_settop(self.raw, top);
                return Err(RelayError::Runtime {
                    source_name: source_name.to_string(),
                    message,
                });
            }
            sq_settop(self.raw, top);
        }

        log::debug!("Ran {}", source_name);
        Ok(())
    }

    pub fn as_raw(&self) -> HSQUIRRELVM {
        self.raw
    }
}

impl ForeignSlot for SquirrelVm {
    type Char = SQChar;

    fn foreign_ptr(&self) -> *mut c_void {
        unsafe { sq_getforeignptr(self.raw) }
    }

    fn set_foreign_ptr(&mut self, ptr: *mut c_void) {
        unsafe { sq_setforeignptr(self.raw, ptr) }
    }
}

impl Drop for SquirrelVm {
    fn drop(&mut self) {
        unsafe {
            sq_close(self.raw);
            drop(Box::from_raw(self.compile_failure.as_ptr()));
        }
        log::debug!("Squirrel VM closed");
        // `relay` drops after this, once the VM can no longer print
    }
}

/// A VM handle seen from inside a native handler
struct RawVm(HSQUIRRELVM);

impl ForeignSlot for RawVm {
    type Char = SQChar;

    fn foreign_ptr(&self) -> *mut c_void {
        unsafe { sq_getforeignptr(self.0) }
    }

    fn set_foreign_ptr(&mut self, ptr: *mut c_void) {
        unsafe { sq_setforeignptr(self.0, ptr) }
    }
}

unsafe extern "C" fn compile_error_handler(
    v: HSQUIRRELVM,
    desc: *const SQChar,
    source: *const SQChar,
    line: SQInteger,
    column: SQInteger,
) {
    let message = string_from_native(desc);
    let source = string_from_native(source);
    relay_error(
        &RawVm(v),
        format_args!("{} line = ({}) column = ({}) : error {}\n", source, line, column, message),
    );

    let slot = sq_getsharedforeignptr(v) as *mut Option<CompileFailure>;
    if !slot.is_null() {
        *slot = Some(CompileFailure {
            message,
            line: line as i64,
            column: column as i64,
        });
    }
}

/// Text of the VM's last error, converted like `tostring()`
unsafe fn last_error_message(v: HSQUIRRELVM) -> Option<String> {
    sq_getlasterror(v);
    let mut message = None;
    if !sq_failed(sq_tostring(v, -1)) {
        let mut text: *const SQChar = ptr::null();
        if !sq_failed(sq_getstring(v, -1, &mut text)) {
            message = Some(string_from_native(text));
        }
        sq_pop(v, 1);
    }
    sq_pop(v, 1);
    message
}
