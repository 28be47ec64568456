//! Per-pixel blend strategies and read-only views of source pixels
//!
//! Kernels in `draw`, `blit` and `triangle` are generic over a [`Blender`]
//! and a [`PixelSource`]; [`with_kernel!`] picks the monomorphized variant
//! from a runtime [`BlendMode`] and [`SourceView`].

use serde::{Deserialize, Serialize};

use crate::color::{alpha, blue, green, pack, red, ADD_MAX_TABLE};
use crate::quantize::PALETTE_SIZE;

// ============================================================================
// Blend Mode
// ============================================================================

/// Compositing mode of every draw and blit operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Source-over with alpha accumulation in the destination
    #[default]
    Normal,
    /// dst += src * (src_alpha / 255), saturating; result is opaque
    Additive,
}

/// Write one source pixel (straight alpha, tint and coverage already
/// applied) into a destination pixel
pub(crate) trait Blender {
    fn blend(dest: &mut u32, src: u32);
}

pub(crate) struct Normal;

pub(crate) struct Additive;

impl Blender for Normal {
    #[inline]
    fn blend(dest: &mut u32, src: u32) {
        match alpha(src) {
            0 => {},
            255 => *dest = src,
            _ => *dest = blend_normal(*dest, src),
        }
    }
}

impl Blender for Additive {
    #[inline]
    fn blend(dest: &mut u32, src: u32) {
        if let Some(out) = blend_additive(*dest, src) {
            *dest = out;
        }
    }
}

/// Source-over that also accumulates coverage in the destination alpha:
/// `nda = da + (255 - da) * a / 255`, source weight `a' = 255 * a / nda`.
#[inline]
pub(crate) fn blend_normal(dest: u32, src: u32) -> u32 {
    let a = alpha(src);
    let da = alpha(dest);
    let nda = da + (255 - da) * a / 255;
    if nda == 0 {
        return dest;
    }
    let na = 255 * a / nda;
    let oma = 256 - na;
    let mix = |d: u32, s: u32| (d * oma + s * na) >> 8;
    pack(
        mix(red(dest), red(src)),
        mix(green(dest), green(src)),
        mix(blue(dest), blue(src)),
        nda,
    )
}

/// Saturating add of the alpha-scaled source; None when it adds nothing
#[inline]
pub(crate) fn blend_additive(dest: u32, src: u32) -> Option<u32> {
    let a = alpha(src);
    let ar = red(src) * a / 255;
    let ag = green(src) * a / 255;
    let ab = blue(src) * a / 255;
    if ar | ag | ab == 0 {
        return None;
    }
    Some(pack(
        ADD_MAX_TABLE[(red(dest) + ar) as usize] as u32,
        ADD_MAX_TABLE[(green(dest) + ag) as usize] as u32,
        ADD_MAX_TABLE[(blue(dest) + ab) as usize] as u32,
        255,
    ))
}

/// Scale the alpha of `color` by an 8-bit coverage value
#[inline]
pub(crate) fn with_coverage(color: u32, coverage: u32) -> u32 {
    let a = alpha(color);
    let a = if a == 255 {
        coverage
    } else {
        (coverage * (a + 1)) >> 8
    };
    (color & 0x00FF_FFFF) | (a << 24)
}

// ============================================================================
// Pixel Sources
// ============================================================================

/// Random access to source pixels by row-major index
pub(crate) trait PixelSource {
    fn at(&self, index: usize) -> u32;
}

pub(crate) struct Dense<'a>(pub &'a [u32]);

pub(crate) struct Indexed<'a> {
    pub indices: &'a [u8],
    pub palette: &'a [u32; PALETTE_SIZE],
}

impl PixelSource for Dense<'_> {
    #[inline]
    fn at(&self, index: usize) -> u32 {
        self.0[index]
    }
}

impl PixelSource for Indexed<'_> {
    #[inline]
    fn at(&self, index: usize) -> u32 {
        self.palette[self.indices[index] as usize]
    }
}

pub(crate) enum SourcePixels<'a> {
    Dense(&'a [u32]),
    Indexed {
        indices: &'a [u8],
        palette: &'a [u32; PALETTE_SIZE],
    },
    /// Recovered from native data or a backend resource
    Reconstructed(Vec<u32>),
}

/// Software-readable pixels of a source buffer
pub struct SourceView<'a> {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) pixels: SourcePixels<'a>,
}

impl SourceView<'_> {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel at (x, y); callers stay in bounds
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        let i = y as usize * self.width as usize + x as usize;
        match &self.pixels {
            SourcePixels::Dense(p) => p[i],
            SourcePixels::Indexed { indices, palette } => palette[indices[i] as usize],
            SourcePixels::Reconstructed(p) => p[i],
        }
    }
}

/// Call `$kernel::<S, B>(source, args...)` with the source and blender
/// matching a runtime view and mode
macro_rules! with_kernel {
    ($view:expr, $mode:expr, $kernel:ident($($arg:expr),* $(,)?)) => {{
        use $crate::buffer::blend::{Additive, Dense, Indexed, Normal, SourcePixels};
        use $crate::buffer::BlendMode;
        match (&$view.pixels, $mode) {
            (SourcePixels::Dense(p), BlendMode::Normal) => {
                $kernel::<_, Normal>(&Dense(p), $($arg),*)
            },
            (SourcePixels::Dense(p), BlendMode::Additive) => {
                $kernel::<_, Additive>(&Dense(p), $($arg),*)
            },
            (SourcePixels::Reconstructed(p), BlendMode::Normal) => {
                $kernel::<_, Normal>(&Dense(p), $($arg),*)
            },
            (SourcePixels::Reconstructed(p), BlendMode::Additive) => {
                $kernel::<_, Additive>(&Dense(p), $($arg),*)
            },
            (SourcePixels::Indexed { indices, palette }, BlendMode::Normal) => {
                $kernel::<_, Normal>(&Indexed { indices, palette }, $($arg),*)
            },
            (SourcePixels::Indexed { indices, palette }, BlendMode::Additive) => {
                $kernel::<_, Additive>(&Indexed { indices, palette }, $($arg),*)
            },
        }
    }};
}

/// Call `$kernel::<B>(args...)` with the blender matching a runtime mode
macro_rules! with_blender {
    ($mode:expr, $kernel:ident($($arg:expr),* $(,)?)) => {{
        use $crate::buffer::blend::{Additive, Normal};
        use $crate::buffer::BlendMode;
        match $mode {
            BlendMode::Normal => $kernel::<Normal>($($arg),*),
            BlendMode::Additive => $kernel::<Additive>($($arg),*),
        }
    }};
}

pub(crate) use {with_blender, with_kernel};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Color;

    fn over(dest: u32, src: u32) -> u32 {
        let mut d = dest;
        Normal::blend(&mut d, src);
        d
    }

    #[test]
    fn test_normal_accumulates_alpha() {
        let white = Color::WHITE.to_argb();
        let blue = Color::rgba(0, 0, 255, 128).to_argb();
        let red = Color::rgba(255, 0, 0, 128).to_argb();

        let step = over(white, blue);
        assert_eq!(Color::from_argb(step), Color::rgba(127, 127, 255, 255));
        assert_eq!(Color::from_argb(over(step, red)), Color::rgba(191, 63, 127, 255));
    }

    #[test]
    fn test_normal_over_transparent() {
        let out = Color::from_argb(over(0, Color::rgba(255, 255, 255, 128).to_argb()));
        assert_eq!(out, Color::rgba(254, 254, 254, 128));
    }

    #[test]
    fn test_normal_shortcuts() {
        assert_eq!(over(0x12345678, 0x00FFFFFF), 0x12345678);
        assert_eq!(over(0x12345678, 0xFFABCDEF), 0xFFABCDEF);
    }

    #[test]
    fn test_additive_saturates_and_forces_opaque() {
        let mut d = Color::rgba(200, 10, 0, 0).to_argb();
        Additive::blend(&mut d, Color::rgba(100, 100, 0, 255).to_argb());
        assert_eq!(Color::from_argb(d), Color::rgba(255, 110, 0, 255));
    }

    #[test]
    fn test_additive_zero_contribution_is_noop() {
        let mut d = 0x00102030;
        Additive::blend(&mut d, 0x01010101);
        assert_eq!(d, 0x00102030);
    }

    #[test]
    fn test_coverage_scaling() {
        assert_eq!(alpha(with_coverage(0xFF000000, 77)), 77);
        // (255 * 129) >> 8
        assert_eq!(alpha(with_coverage(0x80000000, 255)), 128);
        assert_eq!(alpha(with_coverage(0x80000000, 0)), 0);
    }
}
