pub mod hex;
pub mod names;

pub use hex::{decode_hex, encode_hex};
pub use names::{nearest_name, NAMED_COLORS, UNKNOWN_COLOR_NAME};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw RGB triple as reported by the sensor board.
///
/// Channels are signed and unbounded on purpose: inbound reports are not
/// clamped, so a channel may sit outside 0..=255 until a rule validates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: i32,
    pub g: i32,
    pub b: i32,
}

impl Rgb {
    pub const fn new(r: i32, g: i32, b: i32) -> Self {
        Self { r, g, b }
    }

    pub fn is_in_range(&self) -> bool {
        [self.r, self.g, self.b]
            .iter()
            .all(|channel| (0..=255).contains(channel))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RGB:{},{},{}", self.r, self.g, self.b)
    }
}

/// A normalized color observation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorSample {
    pub rgb: Rgb,
    pub hex: String,
    pub name: &'static str,
}

impl ColorSample {
    /// Derive hex and name from the raw triple. The name is looked up from the
    /// decoded hex, so a triple whose hex is malformed is named `Unknown`.
    pub fn from_rgb(rgb: Rgb) -> Self {
        let hex = encode_hex(rgb.r, rgb.g, rgb.b);
        let name = decode_hex(&hex)
            .map(|decoded| nearest_name(decoded.r, decoded.g, decoded.b))
            .unwrap_or(UNKNOWN_COLOR_NAME);

        Self { rgb, hex, name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_derives_hex_and_name() {
        let sample = ColorSample::from_rgb(Rgb::new(255, 0, 0));
        assert_eq!(sample.hex, "#FF0000");
        assert_eq!(sample.name, "Red");
    }

    #[test]
    fn sample_is_deterministic() {
        let first = ColorSample::from_rgb(Rgb::new(12, 200, 77));
        let second = ColorSample::from_rgb(Rgb::new(12, 200, 77));
        assert_eq!(first, second);
    }

    #[test]
    fn out_of_range_sample_keeps_raw_channels() {
        let sample = ColorSample::from_rgb(Rgb::new(-1, 0, 0));
        assert_eq!(sample.rgb, Rgb::new(-1, 0, 0));
        assert_eq!(sample.hex, "#F0000");
        assert_eq!(sample.name, UNKNOWN_COLOR_NAME);
    }

    #[test]
    fn range_check() {
        assert!(Rgb::new(0, 255, 128).is_in_range());
        assert!(!Rgb::new(0, 256, 128).is_in_range());
        assert!(!Rgb::new(-1, 0, 0).is_in_range());
    }

    #[test]
    fn display_uses_wire_format() {
        assert_eq!(Rgb::new(10, 20, 30).to_string(), "RGB:10,20,30");
    }
}
