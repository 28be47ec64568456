//! Packed ARGB color helpers
//!
//! Canonical pixels are `u32` values laid out as `0xAARRGGBB` with straight
//! (non-premultiplied) alpha.

use serde::{Deserialize, Serialize};

/// A straight-alpha RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    #[inline]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    #[inline]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Pack into `0xAARRGGBB`
    #[inline]
    pub const fn to_argb(self) -> u32 {
        pack(self.r as u32, self.g as u32, self.b as u32, self.a as u32)
    }

    /// Unpack from `0xAARRGGBB`
    #[inline]
    pub const fn from_argb(argb: u32) -> Self {
        Self {
            r: red(argb) as u8,
            g: green(argb) as u8,
            b: blue(argb) as u8,
            a: alpha(argb) as u8,
        }
    }

    #[inline]
    pub fn is_white(self) -> bool {
        self == Self::WHITE
    }

    #[inline]
    pub fn is_opaque(self) -> bool {
        self.a == 255
    }
}

impl From<u32> for Color {
    fn from(argb: u32) -> Self {
        Self::from_argb(argb)
    }
}

impl From<Color> for u32 {
    fn from(color: Color) -> Self {
        color.to_argb()
    }
}

// ============================================================================
// Channel access
// ============================================================================

#[inline]
pub const fn alpha(argb: u32) -> u32 {
    argb >> 24
}

#[inline]
pub const fn red(argb: u32) -> u32 {
    (argb >> 16) & 0xFF
}

#[inline]
pub const fn green(argb: u32) -> u32 {
    (argb >> 8) & 0xFF
}

#[inline]
pub const fn blue(argb: u32) -> u32 {
    argb & 0xFF
}

/// Pack channels (each already in 0..=255) into `0xAARRGGBB`
#[inline]
pub const fn pack(r: u32, g: u32, b: u32, a: u32) -> u32 {
    (a << 24) | (r << 16) | (g << 8) | b
}

/// Replace the alpha byte of a packed pixel
#[inline]
pub const fn with_alpha(argb: u32, a: u32) -> u32 {
    (argb & 0x00FF_FFFF) | (a << 24)
}

/// Reorder an RGBA8888 byte quad (decoder order) into packed ARGB
#[inline]
pub const fn from_rgba_bytes(bytes: [u8; 4]) -> u32 {
    pack(bytes[0] as u32, bytes[1] as u32, bytes[2] as u32, bytes[3] as u32)
}

/// Multiply every channel of `argb` by the matching tint channel.
/// A white tint returns the pixel untouched.
#[inline]
pub const fn modulate(argb: u32, tint: u32) -> u32 {
    if tint == 0xFFFF_FFFF {
        return argb;
    }
    pack(
        red(argb) * red(tint) / 255,
        green(argb) * green(tint) / 255,
        blue(argb) * blue(tint) / 255,
        alpha(argb) * alpha(tint) / 255,
    )
}

// ============================================================================
// Additive saturation table
// ============================================================================

const fn build_add_table() -> [u8; 512] {
    let mut table = [255u8; 512];
    let mut i = 0;
    while i < 256 {
        table[i] = i as u8;
        i += 1;
    }
    table
}

/// Saturating lookup for `dest + src` where both are 8-bit channels:
/// entries 0..=255 map to themselves, 256..=511 clamp to 255.
pub static ADD_MAX_TABLE: [u8; 512] = build_add_table();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_roundtrip() {
        let c = Color::rgba(12, 34, 56, 78);
        assert_eq!(c.to_argb(), 0x4E0C2238);
        assert_eq!(Color::from_argb(c.to_argb()), c);
    }

    #[test]
    fn test_add_table_saturates() {
        assert_eq!(ADD_MAX_TABLE[0], 0);
        assert_eq!(ADD_MAX_TABLE[255], 255);
        assert_eq!(ADD_MAX_TABLE[256], 255);
        assert_eq!(ADD_MAX_TABLE[511], 255);
        assert_eq!(ADD_MAX_TABLE[100 + 50], 150);
    }

    #[test]
    fn test_modulate_white_is_identity() {
        let p = 0x80FF4020;
        assert_eq!(modulate(p, Color::WHITE.to_argb()), p);
        assert_eq!(modulate(p, 0xFF000000), 0x80000000);
    }

    #[test]
    fn test_rgba_byte_order() {
        assert_eq!(from_rgba_bytes([1, 2, 3, 4]), 0x04010203);
    }
}
