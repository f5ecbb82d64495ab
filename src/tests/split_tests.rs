// SPDX-License-Identifier: Apache-2.0

#[cfg(test)]
mod tests {
    use half::bf16;

    #[allow(unused_imports)]
    use crate::test_utils::config_test_logger;
    use crate::{split_pack, split_unpack};

    const SAMPLES: &[f32] = &[
        0.0,
        -0.0,
        1.0,
        -1.0,
        0.5,
        -2.5,
        3.141_592_7,
        1e-8,
        -1e-8,
        1e30,
        -1e30,
        f32::MAX,
        f32::MIN,
        f32::MIN_POSITIVE,
        1.0e-40, // subnormal
        f32::INFINITY,
        f32::NEG_INFINITY,
    ];

    #[test]
    fn test_split_round_trip_is_exact() {
        config_test_logger();
        for &v in SAMPLES {
            let (top, trail) = split_pack(v);
            let back = split_unpack(top, trail);
            assert_eq!(
                back.to_bits(),
                v.to_bits(),
                "split round trip changed bits for {}: {:#010x} -> {:#010x}",
                v,
                v.to_bits(),
                back.to_bits()
            );
        }
    }

    #[test]
    fn test_split_round_trip_preserves_nan_payload() {
        let v = f32::from_bits(0x7FC0_1234);
        let (top, trail) = split_pack(v);
        assert_eq!(split_unpack(top, trail).to_bits(), 0x7FC0_1234);
    }

    #[test]
    fn test_split_top_is_bit_truncation() {
        // the top half is the f32's high 16 bits, NOT a rounded bf16 conversion
        let v = f32::from_bits(0x3F80_C000); // rounds up under RNE
        let (top, _) = split_pack(v);
        assert_eq!(top.to_bits(), (v.to_bits() >> 16) as u16);
        assert_ne!(top, bf16::from_f32(v));
    }

    #[test]
    fn test_split_trail_is_low_bits() {
        let v = f32::from_bits(0x4049_0FDB); // pi
        let (top, trail) = split_pack(v);
        assert_eq!(top.to_bits(), 0x4049);
        assert_eq!(trail.to_bits(), 0x0FDB);
    }

    #[test]
    fn test_unpack_zero_trail_matches_bf16_widening() {
        // with a zero trailing half, unpack degenerates to plain bf16 -> f32
        for &v in SAMPLES {
            let top = bf16::from_f32(v);
            let widened = split_unpack(top, bf16::from_bits(0));
            assert_eq!(widened.to_bits(), top.to_f32().to_bits());
        }
    }

    #[test]
    fn test_split_exhaustive_bit_patterns_low_word() {
        // exercise every trailing pattern against a fixed top half
        let top = bf16::from_bits(0x3F80); // 1.0
        for lo in (0u32..=0xFFFF).step_by(257) {
            let trail = bf16::from_bits(lo as u16);
            let v = split_unpack(top, trail);
            assert_eq!(v.to_bits(), 0x3F80_0000 | lo);
            let (t2, l2) = split_pack(v);
            assert_eq!(t2.to_bits(), 0x3F80);
            assert_eq!(l2.to_bits(), lo as u16);
        }
    }
}
