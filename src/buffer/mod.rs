//! In-memory pixel buffer with lazy format conversion
//!
//! A [`PixelBuffer`] holds its content in exactly one of three software
//! forms (dense ARGB, 8-bit indexed, nothing at all) and may additionally
//! keep premultiplied native pixels and run-length opacity maps in a
//! [`FormatCache`]. Reading dense pixels materializes them from whichever
//! form is present; every write throws the cache away.

mod blend;
mod blit;
mod cache;
mod draw;
mod triangle;

use std::sync::Arc;

pub use blend::{BlendMode, SourceView};
pub use cache::{FormatCache, NativeData, RunLengths};

use crate::color::{alpha, from_rgba_bytes};
use crate::context::RasterContext;
use crate::error::RasterError;
use crate::geometry::Rect;
use crate::quantize::{quantize, PALETTE_SIZE};
use crate::registry::BufferId;

use blend::SourcePixels;
use cache::{encode_runs, native_image, native_palette, reconstruct};

/// Written into the guard slot past the last dense pixel
pub const SENTINEL: u32 = 0x4BEE_FADE;

// ============================================================================
// Storage
// ============================================================================

/// Software form of a buffer's content
#[derive(Debug, Clone, Default)]
pub enum Storage {
    /// Nothing allocated yet; reads as all zeros
    #[default]
    Empty,
    /// `width * height` ARGB pixels plus the sentinel slot
    Dense(Vec<u32>),
    /// One palette index per pixel
    Indexed {
        indices: Vec<u8>,
        palette: Box<[u32; PALETTE_SIZE]>,
    },
    /// Purged: content lives only in native data or a backend resource
    NativeOnly,
}

impl Storage {
    pub fn is_dense(&self) -> bool {
        matches!(self, Storage::Dense(_))
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, Storage::Indexed { .. })
    }

    pub fn is_purged(&self) -> bool {
        matches!(self, Storage::NativeOnly)
    }
}

// ============================================================================
// PixelBuffer
// ============================================================================

/// ARGB8888 image that draws, blends and converts itself on demand
#[derive(Debug)]
pub struct PixelBuffer {
    ctx: Arc<RasterContext>,
    id: BufferId,
    width: u32,
    height: u32,
    storage: Storage,
    cache: FormatCache,
    has_trans: bool,
    has_alpha: bool,
    bits_changed: bool,
    bits_changed_count: u64,
    forced_mode: bool,
    volatile: bool,
    purge_requested: bool,
    want_pal: bool,
}

fn check_dimensions(width: u32, height: u32) -> Result<usize, RasterError> {
    let invalid = || RasterError::InvalidDimensions { width, height };
    if width > i32::MAX as u32 || height > i32::MAX as u32 {
        return Err(invalid());
    }
    (width as usize)
        .checked_mul(height as usize)
        .filter(|&n| n < usize::MAX / 4)
        .ok_or_else(invalid)
}

fn scan_alpha(pixels: &[u32]) -> (bool, bool) {
    pixels.iter().fold((false, false), |(trans, partial), &p| match alpha(p) {
        0 => (true, partial),
        255 => (trans, partial),
        _ => (trans, true),
    })
}

impl PixelBuffer {
    /// Empty 0x0 buffer
    pub fn new(ctx: Arc<RasterContext>) -> Self {
        let id = ctx.registry().register(0, 0);
        Self {
            ctx,
            id,
            width: 0,
            height: 0,
            storage: Storage::Empty,
            cache: FormatCache::default(),
            has_trans: false,
            has_alpha: false,
            bits_changed: false,
            bits_changed_count: 0,
            forced_mode: false,
            volatile: false,
            purge_requested: false,
            want_pal: false,
        }
    }

    /// Transparent buffer of the given size
    pub fn with_size(ctx: Arc<RasterContext>, width: u32, height: u32) -> Result<Self, RasterError> {
        let mut buffer = Self::new(ctx);
        buffer.create(width, height)?;
        Ok(buffer)
    }

    /// Buffer holding `pixels` (row-major ARGB), analyzed immediately
    pub fn from_pixels(
        ctx: Arc<RasterContext>,
        pixels: Vec<u32>,
        width: u32,
        height: u32,
    ) -> Result<Self, RasterError> {
        let mut buffer = Self::new(ctx);
        buffer.replace_dense(pixels, width, height)?;
        buffer.commit_bits();
        Ok(buffer)
    }

    /// Buffer from RGBA8888 bytes as produced by image decoders
    pub fn from_rgba_bytes(
        ctx: Arc<RasterContext>,
        bytes: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Self, RasterError> {
        let count = check_dimensions(width, height)?;
        if bytes.len() != count * 4 {
            return Err(RasterError::PixelCountMismatch {
                expected: count * 4,
                actual: bytes.len(),
            });
        }
        let pixels = bytes
            .chunks_exact(4)
            .map(|px| from_rgba_bytes([px[0], px[1], px[2], px[3]]))
            .collect();
        Self::from_pixels(ctx, pixels, width, height)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn context(&self) -> &Arc<RasterContext> {
        &self.ctx
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn cache(&self) -> &FormatCache {
        &self.cache
    }

    /// Whole-buffer rectangle
    #[inline]
    pub fn bounds(&self) -> Rect {
        Rect::of_size(self.width, self.height)
    }

    #[inline]
    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Any fully transparent pixel (valid after `commit_bits`)
    pub fn has_trans(&self) -> bool {
        self.has_trans
    }

    /// Any partially transparent pixel (valid after `commit_bits`)
    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Content changed since the last analysis
    pub fn is_dirty(&self) -> bool {
        self.bits_changed
    }

    pub fn bits_changed_count(&self) -> u64 {
        self.bits_changed_count
    }

    pub fn is_volatile(&self) -> bool {
        self.volatile
    }

    /// Hint that the content changes every frame; volatile buffers are never
    /// purged
    pub fn set_volatile(&mut self, volatile: bool) {
        self.volatile = volatile;
    }

    pub fn wants_palette(&self) -> bool {
        self.want_pal
    }

    pub fn purge_requested(&self) -> bool {
        self.purge_requested
    }

    /// Fix the transparency flags; `commit_bits` stops analyzing
    pub fn set_image_mode(&mut self, has_trans: bool, has_alpha: bool) {
        self.forced_mode = true;
        self.has_trans = has_trans;
        self.has_alpha = has_alpha;
    }

    // ========================================================================
    // Content lifecycle
    // ========================================================================

    /// Record a content mutation: drop derived data, mark dirty.
    ///
    /// A purged buffer is materialized first; its native data may be the
    /// only copy of the content.
    pub fn bits_changed(&mut self) {
        if self.storage.is_purged() {
            self.materialize();
        }
        self.bits_changed = true;
        self.bits_changed_count += 1;
        self.cache.invalidate();
    }

    /// Drop the current content and resize; reads as transparent black
    pub fn create(&mut self, width: u32, height: u32) -> Result<(), RasterError> {
        check_dimensions(width, height)?;
        self.storage = Storage::Empty;
        self.width = width;
        self.height = height;
        self.has_trans = true;
        self.has_alpha = true;
        self.ctx.registry().update_size(self.id, width, height);
        self.bits_changed();
        Ok(())
    }

    /// Replace the content with a copy of `pixels`
    pub fn set_bits(
        &mut self,
        pixels: &[u32],
        width: u32,
        height: u32,
        commit: bool,
    ) -> Result<(), RasterError> {
        self.replace_dense(pixels.to_vec(), width, height)?;
        if commit {
            self.commit_bits();
        }
        Ok(())
    }

    fn replace_dense(&mut self, mut pixels: Vec<u32>, width: u32, height: u32) -> Result<(), RasterError> {
        let count = check_dimensions(width, height)?;
        if pixels.len() != count {
            return Err(RasterError::PixelCountMismatch {
                expected: count,
                actual: pixels.len(),
            });
        }
        pixels.push(SENTINEL);
        self.storage = Storage::Dense(pixels);
        if width != self.width || height != self.height {
            self.width = width;
            self.height = height;
            self.ctx.registry().update_size(self.id, width, height);
        }
        self.bits_changed();
        Ok(())
    }

    /// Analyze the content for transparency when it changed and the flags
    /// are not forced
    pub fn commit_bits(&mut self) {
        if !self.bits_changed || self.forced_mode {
            return;
        }
        let count = self.pixel_count();
        let (trans, partial) = match &self.storage {
            Storage::Dense(pixels) => scan_alpha(&pixels[..count]),
            Storage::Indexed { palette, .. } => scan_alpha(&palette[..]),
            Storage::NativeOnly => match &self.cache.native {
                // alpha survives premultiplication untouched
                Some(NativeData::Image(native)) => scan_alpha(native),
                _ => (true, false),
            },
            Storage::Empty => (true, false),
        };
        self.has_trans = trans;
        self.has_alpha = partial;
        self.bits_changed = false;
    }

    // ========================================================================
    // Materialization
    // ========================================================================

    /// Make dense storage the current form
    fn materialize(&mut self) {
        if self.storage.is_dense() {
            return;
        }
        let count = self.pixel_count();
        let mut pixels = match std::mem::take(&mut self.storage) {
            Storage::Indexed { indices, palette } => {
                // native palette no longer describes the content form
                self.cache.native = None;
                indices.iter().map(|&i| palette[i as usize]).collect()
            },
            _ => self.recover_pixels(count),
        };
        pixels.push(SENTINEL);
        self.storage = Storage::Dense(pixels);
    }

    /// Pixels of a buffer without software storage
    fn recover_pixels(&self, count: usize) -> Vec<u32> {
        if let Some(NativeData::Image(native)) = &self.cache.native {
            if native.len() == count {
                return reconstruct(native, self.ctx.layout());
            }
        }
        self.recover_from_backend(count).unwrap_or_else(|| vec![0; count])
    }

    fn recover_from_backend(&self, count: usize) -> Option<Vec<u32>> {
        let backend = self.ctx.backend();
        if !backend.is_accelerated() || !backend.has_resource(self.id) {
            return None;
        }
        let pixels = backend.recover_bits(self.id, self.width, self.height)?;
        if pixels.len() != count {
            log::warn!(
                "backend returned {} pixels for {:?}, expected {}",
                pixels.len(),
                self.id,
                count
            );
            return None;
        }
        log::debug!("recovered {:?} ({}x{}) from backend", self.id, self.width, self.height);
        Some(pixels)
    }

    /// Dense ARGB pixels, materialized on demand
    pub fn pixels(&mut self) -> &[u32] {
        self.dense_mut()
    }

    /// Writable dense pixels; the buffer is marked changed up front
    pub fn pixels_mut(&mut self) -> &mut [u32] {
        self.materialize();
        self.bits_changed();
        self.dense_mut()
    }

    /// Dense slice without invalidation, for compositor kernels that
    /// invalidate once they are done
    pub(crate) fn dense_mut(&mut self) -> &mut [u32] {
        self.materialize();
        let count = self.pixel_count();
        match &mut self.storage {
            Storage::Dense(pixels) => &mut pixels[..count],
            _ => &mut [],
        }
    }

    /// Read one pixel without changing the storage form
    pub fn pixel(&self, x: i32, y: i32) -> Option<u32> {
        if !self.bounds().contains(x, y) {
            return None;
        }
        let i = y as usize * self.width as usize + x as usize;
        match &self.storage {
            Storage::Dense(pixels) => Some(pixels[i]),
            Storage::Indexed { indices, palette } => Some(palette[indices[i] as usize]),
            Storage::Empty => Some(0),
            Storage::NativeOnly => match &self.cache.native {
                Some(NativeData::Image(native)) => Some(self.ctx.layout().from_native(native[i])),
                _ => self
                    .recover_from_backend(self.pixel_count())
                    .map(|pixels| pixels[i]),
            },
        }
    }

    /// Overwrite one pixel; out-of-bounds writes are ignored
    pub fn set_pixel(&mut self, x: i32, y: i32, argb: u32) {
        if !self.bounds().contains(x, y) {
            return;
        }
        let i = y as usize * self.width as usize + x as usize;
        self.dense_mut()[i] = argb;
        self.bits_changed();
    }

    /// Read access for use as a blit source.
    ///
    /// Dense and indexed storage are borrowed; purged buffers are
    /// reconstructed from native data or the backend. None when no
    /// software-readable content exists.
    pub fn source_view(&self) -> Option<SourceView<'_>> {
        let count = self.pixel_count();
        let pixels = match &self.storage {
            Storage::Dense(pixels) => SourcePixels::Dense(&pixels[..count]),
            Storage::Indexed { indices, palette } => SourcePixels::Indexed { indices, palette },
            Storage::NativeOnly => match &self.cache.native {
                Some(NativeData::Image(native)) if native.len() == count => {
                    SourcePixels::Reconstructed(reconstruct(native, self.ctx.layout()))
                },
                _ => SourcePixels::Reconstructed(self.recover_from_backend(count)?),
            },
            Storage::Empty => return None,
        };
        Some(SourceView {
            width: self.width,
            height: self.height,
            pixels,
        })
    }

    /// Zero every pixel
    pub fn clear(&mut self) {
        self.dense_mut().fill(0);
        self.bits_changed();
    }

    /// Zero the pixels of `rect` (clipped to the buffer)
    pub fn clear_rect(&mut self, rect: Rect) {
        let r = rect.intersection(&self.bounds());
        let w = self.width as usize;
        let pixels = self.dense_mut();
        for y in r.y..r.bottom() {
            let row = y as usize * w;
            pixels[row + r.x as usize..row + r.right() as usize].fill(0);
        }
        self.bits_changed();
    }

    // ========================================================================
    // Derived formats
    // ========================================================================

    /// Premultiplied native pixels for the context's display layout
    pub fn native_data(&mut self) -> &NativeData {
        let native = match self.cache.native.take() {
            Some(native) => native,
            None => self.build_native(),
        };
        self.cache.native.insert(native)
    }

    fn build_native(&mut self) -> NativeData {
        if !self.storage.is_dense() && !self.storage.is_indexed() {
            self.materialize();
        }
        self.commit_bits();
        let layout = self.ctx.layout();
        match &self.storage {
            Storage::Indexed { palette, .. } => NativeData::Palette(native_palette(palette, layout)),
            Storage::Dense(pixels) => NativeData::Image(native_image(&pixels[..self.pixel_count()], layout)),
            Storage::Empty | Storage::NativeOnly => NativeData::Image(Vec::new()),
        }
    }

    /// Runs over "alpha != 0"
    pub fn rl_alpha_data(&mut self) -> &RunLengths {
        let runs = match self.cache.rl_alpha.take() {
            Some(runs) => runs,
            None => self.build_rl_alpha(),
        };
        self.cache.rl_alpha.insert(runs)
    }

    fn build_rl_alpha(&mut self) -> RunLengths {
        if self.storage.is_purged() && self.cache.native.is_none() {
            self.materialize();
        }
        let (w, h) = (self.width, self.height);
        match (&self.storage, &self.cache.native) {
            (Storage::Dense(p), _) => encode_runs(w, h, |i| alpha(p[i]) != 0),
            (Storage::Indexed { indices, palette }, _) => {
                encode_runs(w, h, |i| alpha(palette[indices[i] as usize]) != 0)
            },
            (Storage::NativeOnly, Some(NativeData::Image(n))) => encode_runs(w, h, |i| alpha(n[i]) != 0),
            _ => encode_runs(w, h, |_| false),
        }
    }

    /// Runs over "native color bits != 0" (pixels that add something)
    pub fn rl_additive_data(&mut self) -> &RunLengths {
        let runs = match self.cache.rl_additive.take() {
            Some(runs) => runs,
            None => self.build_rl_additive(),
        };
        self.cache.rl_additive.insert(runs)
    }

    fn build_rl_additive(&mut self) -> RunLengths {
        self.native_data();
        let (w, h) = (self.width, self.height);
        match (&self.storage, &self.cache.native) {
            (_, Some(NativeData::Image(n))) => encode_runs(w, h, |i| n[i] & 0x00FF_FFFF != 0),
            (Storage::Indexed { indices, .. }, Some(NativeData::Palette(np))) => {
                encode_runs(w, h, |i| np[indices[i] as usize] & 0x00FF_FFFF != 0)
            },
            _ => encode_runs(w, h, |_| false),
        }
    }

    // ========================================================================
    // Palette and purge
    // ========================================================================

    /// Switch to 8-bit indexed storage. False (and no further attempts from
    /// `reinit`) when quantization fails.
    pub fn palletize(&mut self) -> bool {
        self.commit_bits();
        if self.storage.is_indexed() {
            return true;
        }

        let (w, h) = (self.width, self.height);
        let result = quantize(self.dense_mut(), w, h);
        match result {
            Ok(q) => {
                self.storage = Storage::Indexed {
                    indices: q.indices,
                    palette: q.palette,
                };
                self.cache.native = None;
                if !q.exact {
                    self.bits_changed();
                }
                self.want_pal = true;
                true
            },
            Err(err) => {
                log::warn!("palletize {:?} failed: {}", self.id, err);
                self.want_pal = false;
                false
            },
        }
    }

    /// Drop software pixels while an equivalent copy survives elsewhere.
    ///
    /// Accelerated backends must already hold a resource for this buffer,
    /// otherwise the request is remembered for `reinit`. In software mode the
    /// native image replaces dense storage only when it reconstructs every
    /// pixel exactly; indexed storage is kept as is.
    pub fn purge_bits(&mut self) {
        self.purge_requested = true;
        if self.volatile {
            return;
        }

        let backend = self.ctx.backend();
        if backend.is_accelerated() {
            if !backend.has_resource(self.id) {
                log::debug!("purge of {:?} deferred until the backend resource exists", self.id);
                return;
            }
            self.storage = Storage::NativeOnly;
            return;
        }

        if self.storage.is_indexed() {
            self.native_data();
        } else if self.storage.is_dense() {
            self.native_data();
            let layout = self.ctx.layout();
            let count = self.pixel_count();
            let lossless = match (&self.storage, &self.cache.native) {
                (Storage::Dense(pixels), Some(NativeData::Image(native))) => pixels[..count]
                    .iter()
                    .zip(native)
                    .all(|(&p, &n)| layout.from_native(n) == p),
                _ => false,
            };
            if lossless {
                self.storage = Storage::NativeOnly;
            } else {
                log::debug!("keeping dense pixels of {:?}: native form is lossy", self.id);
            }
        }
    }

    /// Restore requested forms after the display or backend changed
    pub fn reinit(&mut self) {
        if self.want_pal {
            self.palletize();
        }
        if self.purge_requested {
            self.purge_bits();
        }
    }

    // ========================================================================
    // Teardown helpers
    // ========================================================================

    /// Make sure software content exists before derived data is dropped
    fn keep_software_content(&mut self) {
        if !self.storage.is_dense() && !self.storage.is_indexed() {
            self.materialize();
        }
    }

    /// Drop native data and both run-length maps
    pub fn delete_sw_buffers(&mut self) {
        self.keep_software_content();
        self.cache.invalidate();
    }

    /// Drop native data and the additive runs
    pub fn delete_native_data(&mut self) {
        self.keep_software_content();
        self.cache.native = None;
        self.cache.rl_additive = None;
    }

    /// Ask the backend to drop its resource for this buffer
    pub fn delete_3d_buffers(&mut self) {
        self.ctx.backend().remove_resource(self.id);
    }

    pub fn delete_extra_buffers(&mut self) {
        self.delete_sw_buffers();
        self.delete_3d_buffers();
    }

    /// Check the guard slot past the dense pixels
    pub fn verify_integrity(&self) -> Result<(), RasterError> {
        if let Storage::Dense(pixels) = &self.storage {
            let found = pixels.get(self.pixel_count()).copied().unwrap_or(0);
            if found != SENTINEL {
                return Err(RasterError::Corrupted { id: self.id, found });
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn guard_slot_mut(&mut self) -> Option<&mut u32> {
        let count = self.pixel_count();
        match &mut self.storage {
            Storage::Dense(pixels) => pixels.get_mut(count),
            _ => None,
        }
    }
}

impl Clone for PixelBuffer {
    fn clone(&self) -> Self {
        let id = self.ctx.registry().register(self.width, self.height);
        let storage = match &self.storage {
            Storage::NativeOnly => match self.source_view() {
                Some(view) => {
                    let mut pixels = match view.pixels {
                        SourcePixels::Reconstructed(p) => p,
                        _ => Vec::new(),
                    };
                    pixels.push(SENTINEL);
                    Storage::Dense(pixels)
                },
                None => Storage::NativeOnly,
            },
            other => other.clone(),
        };
        Self {
            ctx: Arc::clone(&self.ctx),
            id,
            width: self.width,
            height: self.height,
            storage,
            cache: self.cache.clone(),
            has_trans: self.has_trans,
            has_alpha: self.has_alpha,
            bits_changed: self.bits_changed,
            bits_changed_count: self.bits_changed_count,
            forced_mode: self.forced_mode,
            volatile: self.volatile,
            purge_requested: self.purge_requested,
            want_pal: self.want_pal,
        }
    }
}

impl Drop for PixelBuffer {
    fn drop(&mut self) {
        let integrity = if self.ctx.config().verify_sentinel_on_drop {
            self.verify_integrity()
        } else {
            Ok(())
        };
        self.ctx.backend().remove_resource(self.id);
        self.ctx.registry().unregister(self.id);

        if let Err(err) = integrity {
            log::error!("{}", err);
            // storage was written past its end
            if !std::thread::panicking() {
                panic!("{}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;
    use crate::color::Color;
    use crate::config::RasterConfig;
    use crate::display::{Backend, ChannelLayout};

    pub(crate) fn buffer(width: u32, height: u32, fill: u32) -> PixelBuffer {
        let pixels = vec![fill; (width * height) as usize];
        PixelBuffer::from_pixels(RasterContext::software(), pixels, width, height).unwrap()
    }

    /// Accelerated backend whose resources appear on demand
    #[derive(Debug, Default)]
    struct MockBackend {
        resources: Mutex<HashSet<BufferId>>,
        fill: u32,
    }

    impl MockBackend {
        fn add(&self, id: BufferId) {
            self.resources.lock().unwrap().insert(id);
        }
    }

    impl Backend for MockBackend {
        fn is_accelerated(&self) -> bool {
            true
        }

        fn has_resource(&self, id: BufferId) -> bool {
            self.resources.lock().unwrap().contains(&id)
        }

        fn recover_bits(&self, id: BufferId, width: u32, height: u32) -> Option<Vec<u32>> {
            self.has_resource(id)
                .then(|| vec![self.fill; width as usize * height as usize])
        }

        fn remove_resource(&self, id: BufferId) {
            self.resources.lock().unwrap().remove(&id);
        }
    }

    #[test]
    fn test_dense_has_sentinel() {
        let mut b = buffer(3, 2, 0xFF00FF00);
        assert_eq!(b.pixels().len(), 6);
        assert!(b.verify_integrity().is_ok());
        match b.storage() {
            Storage::Dense(p) => assert_eq!(p[6], SENTINEL),
            other => panic!("unexpected storage {:?}", other),
        }
    }

    #[test_log::test]
    fn test_corruption_detected() {
        let mut b = buffer(2, 2, 0);
        *b.guard_slot_mut().unwrap() = 7;
        assert!(matches!(
            b.verify_integrity(),
            Err(RasterError::Corrupted { found: 7, .. })
        ));
        // restore so the drop check stays quiet
        *b.guard_slot_mut().unwrap() = SENTINEL;
    }

    #[test]
    fn test_rejects_bad_input() {
        let ctx = RasterContext::software();
        assert!(matches!(
            PixelBuffer::from_pixels(ctx.clone(), vec![0; 5], 2, 2),
            Err(RasterError::PixelCountMismatch {
                expected: 4,
                actual: 5
            })
        ));
        assert!(matches!(
            PixelBuffer::with_size(ctx, u32::MAX, 2),
            Err(RasterError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_rgba_bytes() {
        let b = PixelBuffer::from_rgba_bytes(RasterContext::software(), &[1, 2, 3, 4], 1, 1).unwrap();
        assert_eq!(b.pixel(0, 0), Some(0x04010203));
        assert!(b.has_alpha());
        assert!(!b.has_trans());
    }

    #[test]
    fn test_create_reads_as_zero() {
        let mut b = PixelBuffer::with_size(RasterContext::software(), 4, 3).unwrap();
        assert!(b.has_trans() && b.has_alpha());
        assert_eq!(b.pixel(3, 2), Some(0));
        assert!(b.pixels().iter().all(|&p| p == 0));
        b.commit_bits();
        assert!(b.has_trans());
        assert!(!b.has_alpha());
    }

    #[test]
    fn test_commit_is_idempotent() {
        let mut b = buffer(4, 4, 0xFFFFFFFF);
        b.pixels_mut()[5] = 0x80000000;
        b.commit_bits();
        assert!(!b.has_trans());
        assert!(b.has_alpha());
        let flags = (b.has_trans(), b.has_alpha(), b.bits_changed_count());
        b.commit_bits();
        assert_eq!((b.has_trans(), b.has_alpha(), b.bits_changed_count()), flags);
        assert!(!b.is_dirty());
    }

    #[test]
    fn test_forced_mode_skips_analysis() {
        let mut b = buffer(2, 2, 0xFFFFFFFF);
        b.set_image_mode(true, true);
        b.bits_changed();
        b.commit_bits();
        assert!(b.has_trans() && b.has_alpha());
    }

    #[test]
    fn test_mutation_invalidates_cache() {
        let mut b = buffer(2, 2, 0xFF102030);
        b.native_data();
        b.rl_alpha_data();
        b.rl_additive_data();
        assert!(!b.cache().is_empty());
        let before = b.bits_changed_count();
        b.set_pixel(0, 0, 0);
        assert!(b.cache().is_empty());
        assert_eq!(b.bits_changed_count(), before + 1);
    }

    #[test]
    fn test_rl_alpha_rows_sum_to_width() {
        for width in [1u32, 2, 7, 300] {
            let pixels: Vec<u32> = (0..width * 3)
                .map(|i| if i % 3 == 0 { 0 } else { 0xFF000000 })
                .collect();
            let mut b = PixelBuffer::from_pixels(RasterContext::software(), pixels, width, 3).unwrap();
            let runs = b.rl_alpha_data().clone();
            assert_eq!(runs.height(), 3);
            for y in 0..3 {
                let sum: usize = runs.row(y).iter().map(|&t| t as usize).sum();
                assert_eq!(sum, width as usize);
                assert!(runs.row(y).iter().all(|&t| t != 0));
            }
        }
    }

    #[test]
    fn test_rl_additive_classifies_color() {
        let mut b = PixelBuffer::from_pixels(
            RasterContext::software(),
            vec![0xFF000000, 0xFF000000, 0xFF010000, 0xFF000000],
            4,
            1,
        )
        .unwrap();
        assert_eq!(b.rl_additive_data().row(0), &[2, 1, 1]);
    }

    #[test]
    fn test_palletize_roundtrip_exact() {
        let pixels: Vec<u32> = (0..100u32).map(|i| 0xFF000000 | (i % 10) * 0x010203).collect();
        let mut b = PixelBuffer::from_pixels(RasterContext::software(), pixels.clone(), 10, 10).unwrap();
        let count = b.bits_changed_count();
        assert!(b.palletize());
        assert!(b.storage().is_indexed());
        assert!(b.wants_palette());
        assert_eq!(b.bits_changed_count(), count);
        assert_eq!(b.pixel(3, 0), Some(pixels[3]));
        assert_eq!(b.pixels(), &pixels[..]);
        assert!(b.storage().is_dense());
    }

    #[test_log::test]
    fn test_palletize_failure_keeps_storage() {
        let mut b = PixelBuffer::new(RasterContext::software());
        assert!(!b.palletize());
        assert!(!b.wants_palette());
        assert!(b.storage().is_dense());
    }

    #[test]
    fn test_indexed_rl_alpha_uses_palette() {
        let mut b = PixelBuffer::from_pixels(
            RasterContext::software(),
            vec![0, 0xFF0000FF, 0xFF0000FF, 0],
            4,
            1,
        )
        .unwrap();
        assert!(b.palletize());
        assert_eq!(b.rl_alpha_data().row(0), &[1, 2, 1]);
        assert!(matches!(b.native_data(), NativeData::Palette(_)));
        assert!(b.storage().is_indexed());
    }

    #[test]
    fn test_purge_roundtrip_is_bit_identical() {
        let pixels: Vec<u32> = (0..64u32).map(|i| 0xFF000000 | i * 0x030507).collect();
        let mut b = PixelBuffer::from_pixels(RasterContext::software(), pixels.clone(), 8, 8).unwrap();
        b.purge_bits();
        assert!(b.storage().is_purged());
        assert_eq!(b.pixel(7, 7), Some(pixels[63]));
        assert_eq!(b.pixels(), &pixels[..]);
    }

    #[test_log::test]
    fn test_purge_keeps_lossy_pixels() {
        let ctx = RasterContext::new(
            RasterConfig {
                layout: ChannelLayout::RGB565,
                ..RasterConfig::default()
            },
            Arc::new(crate::display::SoftwareBackend),
        );
        let pixels = vec![0xFF123456, 0x80FFFFFF];
        let mut b = PixelBuffer::from_pixels(ctx, pixels.clone(), 2, 1).unwrap();
        b.purge_bits();
        assert!(b.storage().is_dense());
        assert!(b.purge_requested());
        assert_eq!(b.pixels(), &pixels[..]);
    }

    #[test]
    fn test_volatile_never_purges() {
        let mut b = buffer(2, 2, 0xFFFFFFFF);
        b.set_volatile(true);
        b.purge_bits();
        assert!(b.storage().is_dense());
    }

    #[test_log::test]
    fn test_accelerated_purge_deferred_then_recovered() {
        let backend = Arc::new(MockBackend {
            fill: Color::rgb(1, 2, 3).to_argb(),
            ..MockBackend::default()
        });
        let ctx = RasterContext::new(RasterConfig::default(), backend.clone());
        let mut b = PixelBuffer::from_pixels(ctx, vec![0x80FFFFFF; 4], 2, 2).unwrap();

        b.purge_bits();
        assert!(b.storage().is_dense());
        assert!(b.purge_requested());

        backend.add(b.id());
        b.reinit();
        assert!(b.storage().is_purged());
        assert!(b.source_view().is_some());
        assert_eq!(b.pixels(), &[0xFF010203; 4]);

        let id = b.id();
        drop(b);
        assert!(!backend.has_resource(id));
    }

    #[test]
    fn test_registry_tracks_clone_and_drop() {
        let ctx = RasterContext::software();
        let a = PixelBuffer::from_pixels(ctx.clone(), vec![0xFF000000; 4], 2, 2).unwrap();
        let b = a.clone();
        assert_ne!(a.id(), b.id());
        assert_eq!(ctx.registry().live_count(), 2);
        drop(a);
        assert_eq!(ctx.registry().live_ids(), vec![b.id()]);
        assert_eq!(b.pixel(1, 1), Some(0xFF000000));
    }

    #[test]
    fn test_clear_rect_clips() {
        let mut b = buffer(3, 3, 0xFFFFFFFF);
        b.clear_rect(Rect::new(1, 1, 10, 10));
        assert_eq!(b.pixel(0, 0), Some(0xFFFFFFFF));
        assert_eq!(b.pixel(2, 2), Some(0));
        b.clear();
        assert!(b.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn test_noop_draws_keep_purged_content() {
        let mut b = buffer(2, 2, 0xFF445566);
        b.purge_bits();
        assert!(b.storage().is_purged());
        b.fill_rect(Rect::new(0, 0, 0, 0), Color::WHITE, crate::BlendMode::Normal);
        assert_eq!(b.pixels(), &[0xFF445566; 4]);

        let src = buffer(2, 2, 0xFF112233);
        let mut b = buffer(2, 2, 0xFF112233);
        b.purge_bits();
        b.blt(&src, 50, 50, src.bounds(), Color::WHITE, crate::BlendMode::Normal);
        assert!(b.is_dirty());
        assert_eq!(b.pixels(), &[0xFF112233; 4]);
    }

    #[test]
    fn test_invalidating_purged_buffer_keeps_content() {
        let mut b = buffer(3, 1, 0xFF010203);
        b.purge_bits();
        b.bits_changed();
        assert!(b.storage().is_dense());
        assert!(b.cache().is_empty());
        assert_eq!(b.pixel(2, 0), Some(0xFF010203));
    }

    #[test]
    #[should_panic(expected = "corrupted")]
    fn test_overwritten_sentinel_panics_on_drop() {
        let mut b = buffer(2, 2, 0);
        *b.guard_slot_mut().unwrap() = 0xDEAD;
        drop(b);
    }

    #[test]
    fn test_rl_additive_rows_sum_to_width() {
        for width in [1u32, 2, 7, 300] {
            let pixels: Vec<u32> = (0..width * 3)
                .map(|i| if i % 4 == 0 { 0xFF000000 } else { 0xFF102030 })
                .collect();
            let mut b = PixelBuffer::from_pixels(RasterContext::software(), pixels, width, 3).unwrap();
            let runs = b.rl_additive_data().clone();
            assert_eq!(runs.height(), 3);
            for y in 0..3 {
                let sum: usize = runs.row(y).iter().map(|&t| t as usize).sum();
                assert_eq!(sum, width as usize);
                assert!(runs.row(y).iter().all(|&t| t != 0));
            }
        }
    }

    #[test]
    fn test_delete_sw_buffers_keeps_content() {
        let mut b = buffer(2, 2, 0xFF445566);
        b.purge_bits();
        assert!(b.storage().is_purged());
        b.delete_sw_buffers();
        assert!(b.cache().is_empty());
        assert_eq!(b.pixel(1, 0), Some(0xFF445566));
    }
}
