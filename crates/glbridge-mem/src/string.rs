//! Text decoding from guest memory.
//!
//! Invalid UTF-8 is replaced with U+FFFD rather than rejected, matching what a browser
//! `TextDecoder` does for the same bytes.

use std::borrow::Cow;

use crate::{ElementType, GuestMemory, MemoryError};

/// Decode exactly `len` bytes at `ptr`.
pub fn read_str<'m>(mem: &'m GuestMemory<'_>, ptr: u32, len: u32) -> Result<Cow<'m, str>, MemoryError> {
    if len == 0 {
        return Ok(Cow::Borrowed(""));
    }
    match mem.view(ptr, len, ElementType::U8)? {
        Some(view) => Ok(String::from_utf8_lossy(view.as_bytes())),
        None => Ok(Cow::Borrowed("")),
    }
}

/// Decode the NUL-terminated string at `ptr`.
///
/// The scan stops at the end of guest memory; a string that runs off the end is an error.
pub fn read_cstr<'m>(mem: &'m GuestMemory<'_>, ptr: u32) -> Result<Cow<'m, str>, MemoryError> {
    if ptr == 0 {
        return Ok(Cow::Borrowed(""));
    }
    let tail = mem.tail(ptr)?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(MemoryError::MissingTerminator { ptr })?;
    Ok(String::from_utf8_lossy(&tail[..len]))
}

/// Join `count` length-prefixed fragments into one source string.
///
/// `strings_ptr` and `lengths_ptr` each address `count` little-endian u32 values. Every fragment
/// is followed by a newline.
pub fn read_sources(
    mem: &GuestMemory<'_>,
    count: u32,
    strings_ptr: u32,
    lengths_ptr: u32,
) -> Result<String, MemoryError> {
    let (Some(strings), Some(lengths)) = (
        mem.view(strings_ptr, count, ElementType::U32)?,
        mem.view(lengths_ptr, count, ElementType::U32)?,
    ) else {
        return Ok(String::new());
    };

    let mut source = String::new();
    for (&ptr, &len) in strings.to_u32s().iter().zip(lengths.to_u32s().iter()) {
        source.push_str(&read_str(mem, ptr, len)?);
        source.push('\n');
    }
    Ok(source)
}
