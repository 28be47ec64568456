//! Display descriptor and backend boundary
//!
//! The rasterizer never talks to a window or GPU directly. A display only
//! contributes its channel layout (used to build premultiplied native pixel
//! data) and, through [`Backend`], the ability to hold an accelerated copy of
//! a buffer that can be read back after the software pixels were purged.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::color::{alpha, blue, green, red};
use crate::error::RasterError;
use crate::registry::BufferId;

// ============================================================================
// Channel Layout
// ============================================================================

/// Bit widths, shifts and masks of a display's color channels.
///
/// Alpha always lives in the top byte of native pixels, so color masks must
/// stay within the low 24 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub red_bits: u32,
    pub green_bits: u32,
    pub blue_bits: u32,
    pub red_shift: u32,
    pub green_shift: u32,
    pub blue_shift: u32,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
}

impl ChannelLayout {
    /// 8 bits per channel, `0x00RRGGBB`
    pub const ARGB8888: Self = Self {
        red_bits: 8,
        green_bits: 8,
        blue_bits: 8,
        red_shift: 16,
        green_shift: 8,
        blue_shift: 0,
        red_mask: 0xFF0000,
        green_mask: 0x00FF00,
        blue_mask: 0x0000FF,
    };

    /// 16-bit 5-6-5
    pub const RGB565: Self = Self {
        red_bits: 5,
        green_bits: 6,
        blue_bits: 5,
        red_shift: 11,
        green_shift: 5,
        blue_shift: 0,
        red_mask: 0xF800,
        green_mask: 0x07E0,
        blue_mask: 0x001F,
    };

    /// 15-bit 5-5-5
    pub const RGB555: Self = Self {
        red_bits: 5,
        green_bits: 5,
        blue_bits: 5,
        red_shift: 10,
        green_shift: 5,
        blue_shift: 0,
        red_mask: 0x7C00,
        green_mask: 0x03E0,
        blue_mask: 0x001F,
    };

    /// Derive bit widths and shifts from channel masks
    pub fn from_masks(red_mask: u32, green_mask: u32, blue_mask: u32) -> Result<Self, RasterError> {
        let (red_shift, red_bits) = mask_geometry("red", red_mask)?;
        let (green_shift, green_bits) = mask_geometry("green", green_mask)?;
        let (blue_shift, blue_bits) = mask_geometry("blue", blue_mask)?;
        Ok(Self {
            red_bits,
            green_bits,
            blue_bits,
            red_shift,
            green_shift,
            blue_shift,
            red_mask,
            green_mask,
            blue_mask,
        })
    }

    /// Check a layout that did not come through `from_masks` (e.g. config)
    pub fn validate(&self) -> Result<(), RasterError> {
        Self::from_masks(self.red_mask, self.green_mask, self.blue_mask).and_then(|derived| {
            if derived == *self {
                Ok(())
            } else {
                Err(RasterError::InvalidChannelMask {
                    channel: "layout",
                    mask: self.red_mask | self.green_mask | self.blue_mask,
                })
            }
        })
    }

    /// Straight ARGB -> premultiplied native pixel with alpha in the top byte
    #[inline]
    pub fn to_native(&self, argb: u32) -> u32 {
        let a = alpha(argb);
        let premul = |c: u32| (c * (a + 1)) >> 8;
        let pack = |c: u32, bits: u32, shift: u32, mask: u32| ((c >> (8 - bits)) << shift) & mask;

        pack(premul(red(argb)), self.red_bits, self.red_shift, self.red_mask)
            | pack(premul(green(argb)), self.green_bits, self.green_shift, self.green_mask)
            | pack(premul(blue(argb)), self.blue_bits, self.blue_shift, self.blue_mask)
            | (a << 24)
    }

    /// Premultiplied native pixel -> straight ARGB.
    ///
    /// Channels are divided by `alpha + 1` and clamped to 255, so alpha 0
    /// recovers black rather than dividing by zero.
    #[inline]
    pub fn from_native(&self, native: u32) -> u32 {
        let a = alpha(native);
        let unpack = |bits: u32, shift: u32, mask: u32| {
            let c = ((native & mask) >> shift) << (8 - bits);
            ((c << 8) / (a + 1)).min(255)
        };

        crate::color::pack(
            unpack(self.red_bits, self.red_shift, self.red_mask),
            unpack(self.green_bits, self.green_shift, self.green_mask),
            unpack(self.blue_bits, self.blue_shift, self.blue_mask),
            a,
        )
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self::ARGB8888
    }
}

/// (shift, bits) of a contiguous mask of at most 8 bits below the alpha byte
fn mask_geometry(channel: &'static str, mask: u32) -> Result<(u32, u32), RasterError> {
    let invalid = || RasterError::InvalidChannelMask { channel, mask };
    if mask == 0 || mask & 0xFF00_0000 != 0 {
        return Err(invalid());
    }
    let shift = mask.trailing_zeros();
    let bits = mask.count_ones();
    if bits > 8 || (mask >> shift) != (1 << bits) - 1 {
        return Err(invalid());
    }
    Ok((shift, bits))
}

#[cfg(feature = "sdl")]
impl TryFrom<sdl2::pixels::PixelFormatEnum> for ChannelLayout {
    type Error = RasterError;

    fn try_from(format: sdl2::pixels::PixelFormatEnum) -> Result<Self, Self::Error> {
        let masks = format
            .into_masks()
            .map_err(|_| RasterError::InvalidChannelMask {
                channel: "format",
                mask: 0,
            })?;
        Self::from_masks(masks.rmask, masks.gmask, masks.bmask)
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Rendering backend as seen from the rasterizer.
///
/// Accelerated backends may create their resource for a buffer on another
/// thread; until `has_resource` reports true the buffer keeps its software
/// pixels.
pub trait Backend: Debug + Send + Sync {
    /// True when buffers are mirrored into backend resources
    fn is_accelerated(&self) -> bool {
        false
    }

    /// Whether a backend resource currently exists for this buffer
    fn has_resource(&self, _id: BufferId) -> bool {
        false
    }

    /// Read pixels back from the backend resource (straight ARGB, row-major)
    fn recover_bits(&self, _id: BufferId, _width: u32, _height: u32) -> Option<Vec<u32>> {
        None
    }

    /// Drop the backend resource for this buffer, if any
    fn remove_resource(&self, _id: BufferId) {}
}

/// Pure software backend: nothing is ever mirrored
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareBackend;

impl Backend for SoftwareBackend {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_roundtrip_presets() {
        for layout in [ChannelLayout::ARGB8888, ChannelLayout::RGB565, ChannelLayout::RGB555] {
            let derived =
                ChannelLayout::from_masks(layout.red_mask, layout.green_mask, layout.blue_mask)
                    .unwrap();
            assert_eq!(derived, layout);
            assert!(layout.validate().is_ok());
        }
    }

    #[test]
    fn test_rejects_bad_masks() {
        assert!(ChannelLayout::from_masks(0, 0xFF00, 0xFF).is_err());
        assert!(ChannelLayout::from_masks(0xFF000000, 0xFF00, 0xFF).is_err());
        assert!(ChannelLayout::from_masks(0x0F0F00, 0xFF00, 0xFF).is_err());
        assert!(ChannelLayout::from_masks(0x1FF0000, 0xFF00, 0xFF).is_err());
    }

    #[test]
    fn test_native_opaque_is_lossless_at_8_bits() {
        let layout = ChannelLayout::ARGB8888;
        for argb in [0xFF000000, 0xFFFFFFFF, 0xFF123456, 0xFF80FF01] {
            assert_eq!(layout.to_native(argb), argb);
            assert_eq!(layout.from_native(layout.to_native(argb)), argb);
        }
    }

    #[test]
    fn test_native_premultiplies() {
        let layout = ChannelLayout::ARGB8888;
        // 200 * 129 >> 8 = 100
        assert_eq!(layout.to_native(0x80C80000), 0x80640000);
        // fully transparent pixels lose their color
        assert_eq!(layout.to_native(0x00FFFFFF), 0);
        assert_eq!(layout.from_native(0), 0);
    }

    #[test]
    fn test_native_565_packing() {
        let layout = ChannelLayout::RGB565;
        assert_eq!(layout.to_native(0xFFFFFFFF), 0xFF00FFFF);
        assert_eq!(layout.to_native(0xFFFF0000), 0xFF00F800);
    }
}
