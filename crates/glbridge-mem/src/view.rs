use std::borrow::Cow;

use bytemuck::Pod;

/// Element interpretation of a guest memory window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    U8,
    U16,
    U32,
    F32,
}

impl ElementType {
    pub const fn byte_width(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 | Self::F32 => 4,
        }
    }

    /// Element type used to view pixel data of the given GL component `type`.
    ///
    /// Packed 16-bit formats (`UNSIGNED_SHORT_5_6_5` and friends) and half floats are viewed as
    /// `U16`, packed 32-bit formats as `U32`. Returns `None` for constants that are not pixel
    /// component types.
    pub fn for_pixel_type(ty: u32) -> Option<Self> {
        match ty {
            // BYTE, UNSIGNED_BYTE
            0x1400 | 0x1401 => Some(Self::U8),
            // SHORT, UNSIGNED_SHORT, HALF_FLOAT, HALF_FLOAT_OES, 4_4_4_4, 5_5_5_1, 5_6_5
            0x1402 | 0x1403 | 0x140B | 0x8D61 | 0x8033 | 0x8034 | 0x8363 => Some(Self::U16),
            // INT, UNSIGNED_INT, 2_10_10_10_REV, 10F_11F_11F_REV, 5_9_9_9_REV, 24_8
            0x1404 | 0x1405 | 0x8368 | 0x8C3B | 0x8C3E | 0x84FA => Some(Self::U32),
            // FLOAT
            0x1406 => Some(Self::F32),
            _ => None,
        }
    }
}

/// Reinterpret `bytes` as `[T]`, borrowing when the host layout allows it.
fn cast_or_decode<T: Pod, const N: usize>(bytes: &[u8], decode: fn([u8; N]) -> T) -> Cow<'_, [T]> {
    if cfg!(target_endian = "little") {
        if let Ok(slice) = bytemuck::try_cast_slice(bytes) {
            return Cow::Borrowed(slice);
        }
    }
    Cow::Owned(
        bytes
            .chunks_exact(N)
            .filter_map(|chunk| <[u8; N]>::try_from(chunk).ok())
            .map(decode)
            .collect(),
    )
}

/// Read-only typed window over guest memory.
#[derive(Debug, Clone, Copy)]
pub struct TypedView<'a> {
    ptr: u32,
    bytes: &'a [u8],
    element: ElementType,
}

impl<'a> TypedView<'a> {
    pub(crate) fn new(ptr: u32, bytes: &'a [u8], element: ElementType) -> Self {
        Self {
            ptr,
            bytes,
            element,
        }
    }

    /// Guest byte offset the window starts at.
    pub fn ptr(&self) -> u32 {
        self.ptr
    }

    pub fn element(&self) -> ElementType {
        self.element
    }

    /// Number of elements in the window.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.element.byte_width()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn to_u16s(&self) -> Cow<'a, [u16]> {
        cast_or_decode(self.bytes, u16::from_le_bytes)
    }

    pub fn to_u32s(&self) -> Cow<'a, [u32]> {
        cast_or_decode(self.bytes, u32::from_le_bytes)
    }

    pub fn to_f32s(&self) -> Cow<'a, [f32]> {
        cast_or_decode(self.bytes, f32::from_le_bytes)
    }
}

/// Writable typed window over guest memory.
#[derive(Debug)]
pub struct TypedViewMut<'a> {
    ptr: u32,
    bytes: &'a mut [u8],
    element: ElementType,
}

impl<'a> TypedViewMut<'a> {
    pub(crate) fn new(ptr: u32, bytes: &'a mut [u8], element: ElementType) -> Self {
        Self {
            ptr,
            bytes,
            element,
        }
    }

    pub fn ptr(&self) -> u32 {
        self.ptr
    }

    pub fn element(&self) -> ElementType {
        self.element
    }

    pub fn len(&self) -> usize {
        self.bytes.len() / self.element.byte_width()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.bytes
    }

    /// Store `value` as element `index`. Out-of-range indices are ignored and reported as `false`.
    pub fn set_u32(&mut self, index: usize, value: u32) -> bool {
        let start = index * 4;
        match self.bytes.get_mut(start..start + 4) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    pub fn set_i32(&mut self, index: usize, value: i32) -> bool {
        self.set_u32(index, value as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GuestMemory;

    #[test]
    fn pixel_types_select_element_width() {
        assert_eq!(ElementType::for_pixel_type(0x1401), Some(ElementType::U8));
        assert_eq!(ElementType::for_pixel_type(0x1406), Some(ElementType::F32));
        assert_eq!(ElementType::for_pixel_type(0x140B), Some(ElementType::U16));
        assert_eq!(ElementType::for_pixel_type(0x8363), Some(ElementType::U16));
        assert_eq!(ElementType::for_pixel_type(0x1908), None);
    }

    #[test]
    fn unaligned_float_views_decode_correctly() {
        let mut buf = vec![0u8; 32];
        buf[5..9].copy_from_slice(&1.5f32.to_le_bytes());
        buf[9..13].copy_from_slice(&(-2.0f32).to_le_bytes());
        let mem = GuestMemory::new(&mut buf);

        let view = mem.view(5, 2, ElementType::F32).unwrap().unwrap();
        assert_eq!(&*view.to_f32s(), &[1.5, -2.0]);
    }

    #[test]
    fn mutable_view_writes_within_window_only() {
        let mut buf = vec![0u8; 16];
        let mut mem = GuestMemory::new(&mut buf);
        let mut view = mem.view_mut(4, 2, ElementType::U32).unwrap().unwrap();
        assert!(view.set_u32(0, 7));
        assert!(view.set_u32(1, 9));
        assert!(!view.set_u32(2, 11));
        assert_eq!(mem.read_u32(4).unwrap(), 7);
        assert_eq!(mem.read_u32(8).unwrap(), 9);
        assert_eq!(mem.read_u32(12).unwrap(), 0);
    }
}
