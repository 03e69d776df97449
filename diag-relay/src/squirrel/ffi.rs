//! FFI bindings to the Squirrel 3 C API
//!
//! Only the calls the relay and `SquirrelVm` need are declared. Type widths
//! follow `squirrel.h` on LP64/Win64 targets (`_SQ64`).

#![allow(non_camel_case_types)]

use std::os::raw::c_void;

/// Opaque VM handle
pub type HSQUIRRELVM = *mut c_void;

pub type SQInteger = isize;
pub type SQUnsignedInteger = usize;
pub type SQBool = SQUnsignedInteger;
pub type SQRESULT = SQInteger;
pub type SQUserPointer = *mut c_void;

/// Narrow build
#[cfg(not(feature = "utf-16"))]
pub type SQChar = u8;
/// Wide build: `wchar_t`
#[cfg(all(feature = "utf-16", windows))]
pub type SQChar = u16;
#[cfg(all(feature = "utf-16", not(windows)))]
pub type SQChar = u32;

pub const SQ_TRUE: SQBool = 1;
pub const SQ_FALSE: SQBool = 0;

/// printf-style print function installed with `sq_setprintfunc`
pub type SQPRINTFUNCTION = Option<unsafe extern "C" fn(v: HSQUIRRELVM, format: *const SQChar, ...)>;

/// Called by the compiler with the error description, source name, line and column
pub type SQCOMPILERERROR = Option<
    unsafe extern "C" fn(v: HSQUIRRELVM, desc: *const SQChar, source: *const SQChar, line: SQInteger, column: SQInteger),
>;

#[inline]
pub fn sq_failed(res: SQRESULT) -> bool {
    res < 0
}

extern "C" {
    pub fn sq_open(initial_stack_size: SQInteger) -> HSQUIRRELVM;
    pub fn sq_close(v: HSQUIRRELVM);

    pub fn sq_setforeignptr(v: HSQUIRRELVM, p: SQUserPointer);
    pub fn sq_getforeignptr(v: HSQUIRRELVM) -> SQUserPointer;
    pub fn sq_setprintfunc(v: HSQUIRRELVM, printfunc: SQPRINTFUNCTION, errfunc: SQPRINTFUNCTION);
    pub fn sq_setcompilererrorhandler(v: HSQUIRRELVM, f: SQCOMPILERERROR);

    // Shared by every thread of the VM; the per-thread slot belongs to the relay
    pub fn sq_setsharedforeignptr(v: HSQUIRRELVM, p: SQUserPointer);
    pub fn sq_getsharedforeignptr(v: HSQUIRRELVM) -> SQUserPointer;

    pub fn sq_compilebuffer(
        v: HSQUIRRELVM,
        s: *const SQChar,
        size: SQInteger,
        sourcename: *const SQChar,
        raiseerror: SQBool,
    ) -> SQRESULT;
    pub fn sq_call(v: HSQUIRRELVM, params: SQInteger, retval: SQBool, raiseerror: SQBool) -> SQRESULT;

    pub fn sq_pushroottable(v: HSQUIRRELVM);
    pub fn sq_pop(v: HSQUIRRELVM, nelemstopop: SQInteger);
    pub fn sq_gettop(v: HSQUIRRELVM) -> SQInteger;
    pub fn sq_settop(v: HSQUIRRELVM, newtop: SQInteger);

    pub fn sq_getlasterror(v: HSQUIRRELVM);
    pub fn sq_tostring(v: HSQUIRRELVM, idx: SQInteger) -> SQRESULT;
    pub fn sq_getstring(v: HSQUIRRELVM, idx: SQInteger, c: *mut *const SQChar) -> SQRESULT;

    // sqstdlib
    pub fn sqstd_seterrorhandlers(v: HSQUIRRELVM);
    pub fn sqstd_register_bloblib(v: HSQUIRRELVM) -> SQRESULT;
    pub fn sqstd_register_iolib(v: HSQUIRRELVM) -> SQRESULT;
    pub fn sqstd_register_mathlib(v: HSQUIRRELVM) -> SQRESULT;
    pub fn sqstd_register_stringlib(v: HSQUIRRELVM) -> SQRESULT;
    pub fn sqstd_register_systemlib(v: HSQUIRRELVM) -> SQRESULT;

    // csrc/relay.c
    pub fn diag_relay_print(v: HSQUIRRELVM, format: *const SQChar, ...);
    pub fn diag_relay_error(v: HSQUIRRELVM, format: *const SQChar, ...);
}
