//! Error types for the rasterizer.

use crate::registry::BufferId;

/// Errors surfaced by buffer construction, quantization, configuration and
/// integrity checks.
///
/// Compositing operations never fail: degenerate input (empty clip regions,
/// zero alpha) is a silent no-op.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    /// Width or height cannot address a pixel array.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Supplied pixel data does not match the declared size.
    #[error("pixel count mismatch: expected {expected}, got {actual}")]
    PixelCountMismatch { expected: usize, actual: usize },

    /// A channel mask is empty, wider than 8 bits, not contiguous, or
    /// overlaps the alpha byte.
    #[error("invalid channel mask {mask:#010x} for {channel}")]
    InvalidChannelMask { channel: &'static str, mask: u32 },

    /// The quantizer could not produce a palette.
    #[error("quantization failed: {0}")]
    Quantize(String),

    /// The guard slot past the end of dense storage was overwritten.
    #[error("buffer {id:?} corrupted: sentinel {found:#010x} past end of pixel storage")]
    Corrupted { id: BufferId, found: u32 },

    /// File I/O error while loading or saving configuration.
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration JSON could not be parsed or written.
    #[error("config format error: {0}")]
    Config(#[from] serde_json::Error),
}
