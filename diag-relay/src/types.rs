//! Core types for the diagnostic relay
//!
//! This module defines the character abstraction used for VM-native strings,
//! the two diagnostic streams, and the error type of the host-facing API.
//! The relay itself never returns errors - these are for attaching relays and
//! driving the VM.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// A VM-native character unit.
///
/// Embedded VMs are built either narrow (8-bit units) or wide (`wchar_t`),
/// so every buffer and callback in this crate is parameterized over the
/// unit type instead of assuming one.
///
/// - `u8`: UTF-8
/// - `u16`: UTF-16 (wide build on Windows)
/// - `u32`: UTF-32 (wide build on Unix)
pub trait NativeChar: Copy + Default + PartialEq + fmt::Debug + 'static {
    /// Terminator unit
    const NUL: Self;

    /// Number of units needed to encode `ch`
    fn units(ch: char) -> usize;

    /// Encode `ch` into `dst`, which is exactly `Self::units(ch)` long
    fn encode(ch: char, dst: &mut [Self]);

    /// Decode a run of units, replacing invalid sequences with U+FFFD
    fn decode_lossy(units: &[Self]) -> String;
}

impl NativeChar for u8 {
    const NUL: Self = 0;

    fn units(ch: char) -> usize {
        ch.len_utf8()
    }

    fn encode(ch: char, dst: &mut [Self]) {
        ch.encode_utf8(dst);
    }

    fn decode_lossy(units: &[Self]) -> String {
        String::from_utf8_lossy(units).into_owned()
    }
}

impl NativeChar for u16 {
    const NUL: Self = 0;

    fn units(ch: char) -> usize {
        ch.len_utf16()
    }

    fn encode(ch: char, dst: &mut [Self]) {
        ch.encode_utf16(dst);
    }

    fn decode_lossy(units: &[Self]) -> String {
        String::from_utf16_lossy(units)
    }
}

impl NativeChar for u32 {
    const NUL: Self = 0;

    fn units(_ch: char) -> usize {
        1
    }

    fn encode(ch: char, dst: &mut [Self]) {
        dst[0] = ch as u32;
    }

    fn decode_lossy(units: &[Self]) -> String {
        units
            .iter()
            .map(|&u| char::from_u32(u).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

/// Read a NUL-terminated native string into an owned `String`.
///
/// A null pointer reads as the empty string.
///
/// # Safety
/// `ptr` must be null or point to a readable, NUL-terminated run of `C` units.
pub unsafe fn string_from_native<C: NativeChar>(ptr: *const C) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *ptr.add(len) != C::NUL {
        len += 1;
    }
    C::decode_lossy(std::slice::from_raw_parts(ptr, len))
}

/// Encode `s` as a NUL-terminated native string.
///
/// Fails if `s` already contains a NUL, since the VM would silently cut the
/// string there.
pub fn native_from_str<C: NativeChar>(s: &str) -> Result<Vec<C>> {
    if let Some(position) = s.find('\0') {
        return Err(RelayError::InteriorNul { position });
    }
    let mut out = Vec::with_capacity(s.len() + 1);
    for ch in s.chars() {
        let start = out.len();
        out.resize(start + C::units(ch), C::NUL);
        C::encode(ch, &mut out[start..]);
    }
    out.push(C::NUL);
    Ok(out)
}

/// The two diagnostic streams a VM reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    /// Regular script output (`print`)
    Print,
    /// Error output (compile errors, runtime errors, call stacks)
    Error,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Print => write!(f, "print"),
            Stream::Error => write!(f, "error"),
        }
    }
}

/// Errors from the host-facing API
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("String contains a NUL at byte {position}")]
    InteriorNul { position: usize },

    #[error("VM foreign pointer is already in use by another context")]
    SlotOccupied,

    #[error("{source_name}:{line}:{column}: {message}")]
    Compile {
        source_name: String,
        message: String,
        /// Position reported by the compiler, 0 if unknown
        line: i64,
        column: i64,
    },

    #[error("Script {source_name} raised an error: {message}")]
    Runtime { source_name: String, message: String },

    #[error("VM error: {0}")]
    Vm(String),
}
