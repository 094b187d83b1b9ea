#![forbid(unsafe_code)]

//! Bounds-checked access to a guest module's linear memory.
//!
//! The guest hands the bridge plain integers: byte offsets into its linear memory plus element
//! counts. [`GuestMemory`] wraps the memory slice that is current *for the duration of one bridge
//! call* and turns `(ptr, count, element type)` triples into typed windows over it. Nothing here
//! copies guest data unless a caller explicitly asks for an owned decode.
//!
//! A view borrows the slice it was built from, so it cannot outlive the call that produced it.
//! That is the same rule the guest-side contract states in prose: views are invalidated by
//! anything that can grow (and therefore reallocate) guest memory.
//!
//! Pointer `0` is treated as "no data" by [`GuestMemory::view`]; allocation calls use that to size
//! a resource without uploading contents.

mod string;
mod view;

use std::ops::Range;

pub use string::{read_cstr, read_sources, read_str};
pub use view::{ElementType, TypedView, TypedViewMut};

/// Errors produced while resolving a guest pointer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("guest memory access out of bounds: ptr=0x{ptr:x}, len=0x{len:x}, memory_len=0x{memory_len:x}")]
    OutOfBounds {
        ptr: u32,
        len: usize,
        memory_len: usize,
    },
    #[error("guest memory range overflows: ptr=0x{ptr:x}, count={count}, element_width={width}")]
    Overflow { ptr: u32, count: u32, width: usize },
    #[error("no NUL terminator found after guest ptr=0x{ptr:x}")]
    MissingTerminator { ptr: u32 },
}

/// The guest's linear memory as seen during a single bridge call.
#[derive(Debug)]
pub struct GuestMemory<'a> {
    bytes: &'a mut [u8],
}

impl<'a> GuestMemory<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    /// Current byte length of guest memory.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns `true` if `[ptr, ptr + len)` lies inside guest memory.
    pub fn contains(&self, ptr: u32, len: usize) -> bool {
        (ptr as usize)
            .checked_add(len)
            .is_some_and(|end| end <= self.bytes.len())
    }

    fn range(&self, ptr: u32, count: u32, element: ElementType) -> Result<Range<usize>, MemoryError> {
        let width = element.byte_width();
        let len = (count as usize)
            .checked_mul(width)
            .ok_or(MemoryError::Overflow { ptr, count, width })?;
        let start = ptr as usize;
        let end = start
            .checked_add(len)
            .ok_or(MemoryError::Overflow { ptr, count, width })?;
        if end > self.bytes.len() {
            return Err(MemoryError::OutOfBounds {
                ptr,
                len,
                memory_len: self.bytes.len(),
            });
        }
        Ok(start..end)
    }

    /// Raw bytes at `[ptr, ptr + len)`. Unlike [`Self::view`], pointer `0` is an ordinary address.
    pub fn bytes(&self, ptr: u32, len: u32) -> Result<&[u8], MemoryError> {
        let range = self.range(ptr, len, ElementType::U8)?;
        Ok(&self.bytes[range])
    }

    /// Everything from `ptr` to the end of guest memory.
    pub fn tail(&self, ptr: u32) -> Result<&[u8], MemoryError> {
        self.bytes.get(ptr as usize..).ok_or(MemoryError::OutOfBounds {
            ptr,
            len: 0,
            memory_len: self.bytes.len(),
        })
    }

    /// Build a read-only window of `count` elements of `element` starting at `ptr`.
    ///
    /// Returns `Ok(None)` for a null pointer. The bounds check happens before any byte is read.
    pub fn view(
        &self,
        ptr: u32,
        count: u32,
        element: ElementType,
    ) -> Result<Option<TypedView<'_>>, MemoryError> {
        if ptr == 0 {
            return Ok(None);
        }
        let range = self.range(ptr, count, element)?;
        Ok(Some(TypedView::new(ptr, &self.bytes[range], element)))
    }

    /// Writable counterpart of [`Self::view`].
    pub fn view_mut(
        &mut self,
        ptr: u32,
        count: u32,
        element: ElementType,
    ) -> Result<Option<TypedViewMut<'_>>, MemoryError> {
        if ptr == 0 {
            return Ok(None);
        }
        let range = self.range(ptr, count, element)?;
        Ok(Some(TypedViewMut::new(ptr, &mut self.bytes[range], element)))
    }

    pub fn read_u32(&self, ptr: u32) -> Result<u32, MemoryError> {
        let range = self.range(ptr, 1, ElementType::U32)?;
        Ok(u32::from_le_bytes(bytemuck::pod_read_unaligned(
            &self.bytes[range],
        )))
    }

    pub fn write_bytes(&mut self, ptr: u32, data: &[u8]) -> Result<(), MemoryError> {
        let len = u32::try_from(data.len()).map_err(|_| MemoryError::Overflow {
            ptr,
            count: u32::MAX,
            width: 1,
        })?;
        let range = self.range(ptr, len, ElementType::U8)?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    pub fn write_u32(&mut self, ptr: u32, value: u32) -> Result<(), MemoryError> {
        self.write_bytes(ptr, &value.to_le_bytes())
    }

    pub fn write_i32(&mut self, ptr: u32, value: i32) -> Result<(), MemoryError> {
        self.write_bytes(ptr, &value.to_le_bytes())
    }

    pub fn write_u16(&mut self, ptr: u32, value: u16) -> Result<(), MemoryError> {
        self.write_bytes(ptr, &value.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_matches_direct_reads() {
        let mut buf: Vec<u8> = (0..64u8).collect();
        let expected = buf.clone();
        let mem = GuestMemory::new(&mut buf);

        let view = mem.view(8, 4, ElementType::U32).unwrap().unwrap();
        assert_eq!(view.as_bytes(), &expected[8..24]);
        assert_eq!(view.len(), 4);
        assert_eq!(
            view.to_u32s()[1],
            u32::from_le_bytes([12, 13, 14, 15])
        );
    }

    #[test]
    fn null_pointer_is_no_data() {
        let mut buf = vec![0u8; 16];
        let mem = GuestMemory::new(&mut buf);
        assert!(mem.view(0, 1024, ElementType::F32).unwrap().is_none());
    }

    #[test]
    fn out_of_bounds_view_is_rejected() {
        let mut buf = vec![0u8; 16];
        let mem = GuestMemory::new(&mut buf);

        let err = mem.view(12, 2, ElementType::U32).unwrap_err();
        assert_eq!(
            err,
            MemoryError::OutOfBounds {
                ptr: 12,
                len: 8,
                memory_len: 16
            }
        );
        // Exactly at the end is fine.
        assert!(mem.view(12, 1, ElementType::U32).unwrap().is_some());
    }

    #[test]
    fn huge_counts_do_not_wrap() {
        let mut buf = vec![0u8; 16];
        let mem = GuestMemory::new(&mut buf);
        let err = mem.view(u32::MAX, u32::MAX, ElementType::F32).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::OutOfBounds { .. } | MemoryError::Overflow { .. }
        ));
    }

    #[test]
    fn scalar_writes_are_little_endian_and_checked() {
        let mut buf = vec![0u8; 8];
        let mut mem = GuestMemory::new(&mut buf);
        mem.write_u32(0, 0x0403_0201).unwrap();
        mem.write_u16(4, 0x0605).unwrap();
        assert!(mem.write_u32(6, 1).is_err());
        assert_eq!(mem.read_u32(0).unwrap(), 0x0403_0201);
        drop(mem);
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 0, 0]);
    }
}
