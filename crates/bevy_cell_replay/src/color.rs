//! Packed 12-bit cell colors.
//!
//! Logs store a color as an integer with one nibble per channel: red in bits
//! 0..4, green in 4..8, blue in 8..12. Each nibble is scaled by 15, so the
//! brightest channel value is 225.

use palette::Srgb;

/// Color of a cell entity.
pub type CellColor = Srgb<u8>;

const NIBBLE: u32 = 0xF;
const SCALE: u8 = 15;

/// Decodes a packed log color. Bits above the low 12 are ignored.
pub fn decode_packed(packed: u32) -> CellColor {
  let channel = |shift: u32| ((packed >> shift) & NIBBLE) as u8 * SCALE;
  Srgb::new(channel(0), channel(4), channel(8))
}

/// Packs a color back into the 12-bit log representation.
///
/// Channels are quantized to the nearest nibble.
pub fn encode_packed(color: CellColor) -> u32 {
  let nibble = |c: u8| ((c as u32 + SCALE as u32 / 2) / SCALE as u32).min(NIBBLE);
  nibble(color.red) | nibble(color.green) << 4 | nibble(color.blue) << 8
}
