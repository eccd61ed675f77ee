use super::Rgb;

const HEX_OFFSET: i64 = 0x100_0000;

/// Encode a triple as `#RRGGBB`.
///
/// The channels are packed on top of a 24-bit offset and the leading digit the
/// offset introduces is dropped. In-range triples always yield six uppercase
/// digits; out-of-range channels are not clamped and produce whatever the
/// packed value renders to (e.g. `-1,0,0` gives `#F0000`).
pub fn encode_hex(r: i32, g: i32, b: i32) -> String {
    let packed = HEX_OFFSET + ((r as i64) << 16) + ((g as i64) << 8) + b as i64;

    let rendered = if packed < 0 {
        format!("-{:X}", packed.unsigned_abs())
    } else {
        format!("{packed:X}")
    };

    let mut digits = rendered.chars();
    digits.next();
    format!("#{}", digits.as_str())
}

/// Decode `#RRGGBB` (the `#` is optional). Anything that is not exactly six
/// hex digits yields `None`.
pub fn decode_hex(hex: &str) -> Option<Rgb> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let channel = |range: std::ops::Range<usize>| i32::from_str_radix(&digits[range], 16).ok();

    Some(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_primary_colors() {
        assert_eq!(encode_hex(255, 0, 0), "#FF0000");
        assert_eq!(encode_hex(0, 0, 0), "#000000");
        assert_eq!(encode_hex(0, 255, 0), "#00FF00");
        assert_eq!(encode_hex(0, 0, 255), "#0000FF");
    }

    #[test]
    fn encodes_uppercase_with_leading_zeros() {
        assert_eq!(encode_hex(10, 20, 30), "#0A141E");
        assert_eq!(encode_hex(171, 205, 239), "#ABCDEF");
    }

    #[test]
    fn out_of_range_channels_are_reproduced_not_clamped() {
        // 0x1000000 + 0x1000000 renders as "2000000"; the first digit is dropped.
        assert_eq!(encode_hex(256, 0, 0), "#000000");
        // 0x1000000 - 0x10000 = 0xFF0000, one digit short after the drop.
        assert_eq!(encode_hex(-1, 0, 0), "#F0000");
        assert_eq!(encode_hex(0, 0, 300), "#00012C");
    }

    #[test]
    fn decodes_with_and_without_hash() {
        assert_eq!(decode_hex("#FF8000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(decode_hex("ff8000"), Some(Rgb::new(255, 128, 0)));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert_eq!(decode_hex("#F0000"), None);
        assert_eq!(decode_hex("#GG0000"), None);
        assert_eq!(decode_hex(""), None);
    }

    #[test]
    fn decode_inverts_encode_for_valid_triples() {
        for (r, g, b) in [(0, 0, 0), (255, 255, 255), (1, 2, 3), (128, 64, 250)] {
            assert_eq!(decode_hex(&encode_hex(r, g, b)), Some(Rgb::new(r, g, b)));
        }
    }
}
