#![cfg(not(target_arch = "wasm32"))]

use glbridge::pixels::image_byte_len;
use proptest::prelude::*;

fn alignment() -> impl Strategy<Value = u32> {
    prop_oneof![Just(1u32), Just(2), Just(4), Just(8)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn padded_len_lies_between_tight_and_fully_padded(
        width in 1u32..512,
        height in 1u32..512,
        bpp in prop_oneof![Just(1u32), Just(2), Just(3), Just(4), Just(8), Just(16)],
        align in alignment(),
    ) {
        let len = image_byte_len(width, height, bpp, align).unwrap();
        let row = u64::from(width) * u64::from(bpp);
        let tight = row * u64::from(height);
        let stride = row.div_ceil(u64::from(align)) * u64::from(align);
        prop_assert!(len >= tight);
        prop_assert!(len <= stride * u64::from(height));
        prop_assert_eq!(len, stride * u64::from(height - 1) + row);
    }

    #[test]
    fn byte_alignment_is_tightly_packed(
        width in 0u32..1024,
        height in 0u32..1024,
        bpp in 1u32..17,
    ) {
        let len = image_byte_len(width, height, bpp, 1).unwrap();
        prop_assert_eq!(len, u64::from(width) * u64::from(height) * u64::from(bpp));
    }
}

#[test]
fn overflowing_dimensions_are_rejected() {
    assert_eq!(image_byte_len(u32::MAX, u32::MAX, 16, 8), None);
    assert!(image_byte_len(u32::MAX, 1, 16, 8).is_some());
}
