//! Byte sizes of client-side pixel rectangles.

use crate::consts::*;

/// Pixel-store state tracked on behalf of the host so upload/readback lengths can be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelStore {
    pub unpack_alignment: u32,
    pub pack_alignment: u32,
}

impl Default for PixelStore {
    fn default() -> Self {
        Self {
            unpack_alignment: 4,
            pack_alignment: 4,
        }
    }
}

impl PixelStore {
    /// Record a `pixelStorei` call. Returns `false` for alignments GL would reject.
    pub fn apply(&mut self, pname: u32, param: i32) -> bool {
        let slot = match pname {
            UNPACK_ALIGNMENT => &mut self.unpack_alignment,
            PACK_ALIGNMENT => &mut self.pack_alignment,
            _ => return true,
        };
        match param {
            1 | 2 | 4 | 8 => {
                *slot = param as u32;
                true
            }
            _ => false,
        }
    }
}

/// Number of components per pixel for `format`.
pub fn components(format: u32) -> Option<u32> {
    Some(match format {
        ALPHA | LUMINANCE | RED | RED_INTEGER | DEPTH_COMPONENT => 1,
        LUMINANCE_ALPHA | RG | RG_INTEGER | DEPTH_STENCIL => 2,
        RGB | RGB_INTEGER => 3,
        RGBA | RGBA_INTEGER => 4,
        _ => return None,
    })
}

/// Bytes per pixel for a `(format, type)` pair. Packed types describe the whole pixel.
pub fn bytes_per_pixel(format: u32, ty: u32) -> Option<u32> {
    match ty {
        UNSIGNED_SHORT_4_4_4_4 | UNSIGNED_SHORT_5_5_5_1 | UNSIGNED_SHORT_5_6_5 => Some(2),
        UNSIGNED_INT_2_10_10_10_REV
        | UNSIGNED_INT_10F_11F_11F_REV
        | UNSIGNED_INT_5_9_9_9_REV
        | UNSIGNED_INT_24_8 => Some(4),
        BYTE | UNSIGNED_BYTE => components(format),
        SHORT | UNSIGNED_SHORT | HALF_FLOAT | HALF_FLOAT_OES => components(format).map(|c| c * 2),
        INT | UNSIGNED_INT | FLOAT => components(format).map(|c| c * 4),
        _ => None,
    }
}

fn align_up(value: u64, alignment: u64) -> Option<u64> {
    debug_assert!(alignment.is_power_of_two());
    Some(value.checked_add(alignment - 1)? & !(alignment - 1))
}

/// Total byte length of a `width x height` rectangle with rows padded to `alignment`.
///
/// The last row is not padded, matching GL's client memory layout rules.
pub fn image_byte_len(width: u32, height: u32, bytes_per_pixel: u32, alignment: u32) -> Option<u64> {
    if width == 0 || height == 0 {
        return Some(0);
    }
    let row = u64::from(width).checked_mul(u64::from(bytes_per_pixel))?;
    let stride = align_up(row, u64::from(alignment.max(1)))?;
    stride.checked_mul(u64::from(height) - 1)?.checked_add(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_rows_are_padded_except_the_last() {
        let bpp = bytes_per_pixel(RGB, UNSIGNED_BYTE).unwrap();
        assert_eq!(bpp, 3);
        // 3 pixels * 3 bytes = 9 -> stride 12.
        assert_eq!(image_byte_len(3, 2, bpp, 4), Some(12 + 9));
        assert_eq!(image_byte_len(3, 2, bpp, 1), Some(18));
    }

    #[test]
    fn packed_and_float_types() {
        assert_eq!(bytes_per_pixel(RGB, UNSIGNED_SHORT_5_6_5), Some(2));
        assert_eq!(bytes_per_pixel(RGBA, FLOAT), Some(16));
        assert_eq!(bytes_per_pixel(RGBA, HALF_FLOAT), Some(8));
        assert_eq!(bytes_per_pixel(0xDEAD, UNSIGNED_BYTE), None);
        assert_eq!(bytes_per_pixel(RGBA, 0xBEEF), None);
    }

    #[test]
    fn empty_rectangles_need_no_bytes() {
        assert_eq!(image_byte_len(0, 100, 4, 4), Some(0));
        assert_eq!(image_byte_len(100, 0, 4, 4), Some(0));
    }

    #[test]
    fn alignment_rejects_non_power_of_two() {
        let mut store = PixelStore::default();
        assert!(store.apply(UNPACK_ALIGNMENT, 1));
        assert!(!store.apply(PACK_ALIGNMENT, 3));
        assert_eq!(store.unpack_alignment, 1);
        assert_eq!(store.pack_alignment, 4);
    }
}
