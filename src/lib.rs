//! Software 2D rasterization and compositing
//!
//! [`PixelBuffer`] is an ARGB8888 image that can fill, draw lines, blit,
//! scale, rotate and rasterize textured triangles into itself. Alongside its
//! pixels it lazily derives the forms a display pipeline wants: premultiplied
//! native pixels for the context's [`ChannelLayout`], run-length opacity
//! maps, and an 8-bit palettized copy. Buffers can drop their software pixels
//! once an equivalent copy exists and recover them on the next read.
//!
//! ```no_run
//! use swraster::{BlendMode, Color, PixelBuffer, RasterContext, Rect};
//!
//! let ctx = RasterContext::software();
//! let mut canvas = PixelBuffer::with_size(ctx.clone(), 64, 64)?;
//! canvas.fill_rect(Rect::new(8, 8, 16, 16), Color::rgba(255, 0, 0, 128), BlendMode::Normal);
//!
//! let sprite = PixelBuffer::from_pixels(ctx, vec![0xFF00FF00; 16], 4, 4)?;
//! canvas.blt(&sprite, 30, 30, sprite.bounds(), Color::WHITE, BlendMode::Additive);
//! canvas.commit_bits();
//! # Ok::<(), swraster::RasterError>(())
//! ```

pub mod buffer;
pub mod color;
pub mod config;
pub mod context;
pub mod display;
pub mod error;
pub mod geometry;
pub mod quantize;
pub mod registry;

pub use buffer::{BlendMode, FormatCache, NativeData, PixelBuffer, RunLengths, SourceView, Storage, SENTINEL};
pub use color::Color;
pub use config::{RasterConfig, StretchQuality};
pub use context::RasterContext;
pub use display::{Backend, ChannelLayout, SoftwareBackend};
pub use error::RasterError;
pub use geometry::{FRect, Matrix3, Rect, Span, TriVertex};
pub use quantize::{quantize, Quantized};
pub use registry::{BufferId, BufferRegistry};
