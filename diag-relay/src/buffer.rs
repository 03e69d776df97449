//! Bounded message buffer
//!
//! Diagnostics are rendered into a fixed array of native units before they
//! are handed to the host. The buffer is always NUL-terminated and silently
//! truncates on overflow, cutting only at character boundaries so the host
//! never receives half of a UTF-8 sequence or a lone surrogate.

use crate::types::NativeChar;
use std::fmt;

/// Default buffer length in native units, terminator included
pub const DEFAULT_BUFFER_LEN: usize = 4096;

/// Fixed-size, NUL-terminated formatting target
pub struct MessageBuffer<C: NativeChar = u8, const N: usize = DEFAULT_BUFFER_LEN> {
    units: [C; N],
    len: usize,
    truncated: bool,
}

impl<C: NativeChar, const N: usize> MessageBuffer<C, N> {
    /// Text units that fit before the terminator
    pub const CAPACITY: usize = {
        assert!(N > 0, "message buffer needs room for the terminator");
        N - 1
    };

    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            units: [C::NUL; N],
            len: 0,
            truncated: false,
        }
    }

    /// Render `args` into a fresh buffer, truncating if needed
    pub fn format(args: fmt::Arguments<'_>) -> Self {
        let mut buffer = Self::new();
        // write_str never fails, truncation is recorded instead
        let _ = fmt::Write::write_fmt(&mut buffer, args);
        buffer
    }

    /// Number of text units stored (terminator excluded)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True if some of the formatted text did not fit
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Stored text units, without the terminator
    pub fn as_units(&self) -> &[C] {
        &self.units[..self.len]
    }

    /// Stored text units followed by the terminator
    pub fn as_units_with_nul(&self) -> &[C] {
        &self.units[..=self.len]
    }

    /// Pointer to the NUL-terminated text, valid while the buffer lives
    pub fn as_ptr(&self) -> *const C {
        self.units.as_ptr()
    }

    /// Decode the stored text
    pub fn to_string_lossy(&self) -> String {
        C::decode_lossy(self.as_units())
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.truncated = false;
        self.units[0] = C::NUL;
    }
}

impl<C: NativeChar, const N: usize> Default for MessageBuffer<C, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: NativeChar, const N: usize> fmt::Write for MessageBuffer<C, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.truncated {
            return Ok(());
        }
        for ch in s.chars() {
            let needed = C::units(ch);
            if self.len + needed > Self::CAPACITY {
                self.truncated = true;
                break;
            }
            C::encode(ch, &mut self.units[self.len..self.len + needed]);
            self.len += needed;
        }
        self.units[self.len] = C::NUL;
        Ok(())
    }
}

impl<C: NativeChar, const N: usize> fmt::Debug for MessageBuffer<C, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuffer")
            .field("text", &self.to_string_lossy())
            .field("len", &self.len)
            .field("capacity", &Self::CAPACITY)
            .field("truncated", &self.truncated)
            .finish()
    }
}
