use engine_core::color::{byte_to_float, float_to_byte, Color};
use engine_core::image::ColorType;
use glam::Vec4;
use proptest::prelude::*;

proptest! {
    #[test]
    fn byte_channels_round_trip(r in any::<u8>(), g in any::<u8>(), b in any::<u8>(), a in any::<u8>()) {
        let c = Color::rgb(r, g, b, a);
        prop_assert_eq!(c.r_byte(), r);
        prop_assert_eq!(c.g_byte(), g);
        prop_assert_eq!(c.b_byte(), b);
        prop_assert_eq!(c.a_byte(), a);
    }

    #[test]
    fn packed_round_trip(r in any::<u8>(), g in any::<u8>(), b in any::<u8>(), a in any::<u8>()) {
        let packed = Color::rgb(r, g, b, a).to_uint32();
        prop_assert_eq!(packed, u32::from_be_bytes([r, g, b, a]));
        prop_assert_eq!(Color::from_uint32(packed).to_rgba8(), [r, g, b, a]);
    }

    #[test]
    fn hex_string_matches_hex(value in 0u32..=0xFF_FFFF, upper in any::<bool>(), hash in any::<bool>()) {
        let digits = if upper { format!("{:06X}", value) } else { format!("{:06x}", value) };
        let text = if hash { format!("#{}", digits) } else { digits };
        prop_assert_eq!(
            Color::hex_string(&text, 1.0).to_uint32(),
            Color::hex(value, 1.0).to_uint32()
        );
    }

    #[test]
    fn float_to_byte_stays_in_range(v in -10.0f32..10.0) {
        let byte = float_to_byte(v);
        if v <= 0.0 {
            prop_assert_eq!(byte, 0);
        }
        if v >= 1.0 {
            prop_assert_eq!(byte, 255);
        }
    }
}

#[test]
fn hex_string_rejects_other_lengths_and_digits() {
    for bad in ["", "#", "fff", "#fff", "12345", "1234567", "#1234567", "zzzzzz", "#12345g", "x123456"] {
        assert_eq!(Color::hex_string(bad, 1.0), Color::default(), "accepted {:?}", bad);
    }
}

#[test]
fn hex_ignores_high_bits_and_keeps_alpha() {
    let c = Color::hex(0xAB_FF8000, 0.25);
    assert_eq!(c.a, 0.25);
    assert_eq!(c.to_rgba8(), [0xFF, 0x80, 0x00, 64]);
}

#[test]
fn byte_conversion_rounds() {
    assert_eq!(float_to_byte(0.5), 128);
    assert_eq!(float_to_byte(0.2), 51);
    assert_eq!(float_to_byte(1.0 / 255.0 * 0.49), 0);
    assert_eq!(byte_to_float(255), 1.0);
    assert_eq!(byte_to_float(0), 0.0);
}

#[test]
fn named_constants() {
    assert_eq!(Color::RED.to_uint32(), 0xFF0000FF);
    assert_eq!(Color::TRANSPARENT.to_uint32(), 0xFFFFFF00);
    assert_eq!(Color::GRAY.r_byte(), 128);
    assert_eq!(Color::NAMED.len(), 10);
    assert!(Color::NAMED.iter().any(|(name, c)| *name == "PURPLE" && *c == Color::PURPLE));
}

#[test]
fn vec4_conversion() {
    let c = Color::rgb_float(0.1, 0.2, 0.3, 0.4);
    let v: Vec4 = c.into();
    assert_eq!(v, Vec4::new(0.1, 0.2, 0.3, 0.4));
    assert_eq!(Color::from(v), c);
}

#[test]
fn rows_convert_between_layouts() {
    let rgba = [10u8, 20, 30, 40, 50, 60, 70, 80];
    let mut alpha = [0u8; 2];
    ColorType::Rgba8.convert_row(&rgba, ColorType::Alpha, &mut alpha);
    assert_eq!(alpha, [40, 80]);

    let mut expanded = [9u8; 8];
    ColorType::Alpha.convert_row(&alpha, ColorType::Rgba8, &mut expanded);
    assert_eq!(expanded, [9, 9, 9, 40, 9, 9, 9, 80]);

    // the shorter row wins
    let mut wide = [0u8; 12];
    ColorType::Rgba8.convert_row(&rgba, ColorType::Rgba8, &mut wide);
    assert_eq!(wide[..8], rgba);
    assert_eq!(wide[8..], [0, 0, 0, 0]);
}
