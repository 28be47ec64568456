//! Image-to-image compositing: straight, scaled and transformed blits
//!
//! Unlike the solid primitives every blit clips itself against the
//! destination, and the source rectangle against the source image.

use crate::color::{modulate, Color};
use crate::config::StretchQuality;
use crate::geometry::{FRect, Matrix3, Rect, TriVertex};

use super::blend::{with_kernel, Blender, PixelSource};
use super::triangle::triangle_kernel;
use super::{BlendMode, PixelBuffer};

/// How a scaled blit picks source pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sampling {
    /// Nearest pixel at each destination pixel center
    Slow,
    /// 16.16 fixed-point increments from the clipped source origin
    Fast,
    /// Slow sampling, walking the source columns right to left
    Mirror,
}

impl PixelBuffer {
    /// Copy `src_rect` of `src` to (`x`, `y`), tinted by `color`.
    ///
    /// Sources without software-readable pixels draw nothing.
    pub fn blt(&mut self, src: &PixelBuffer, x: i32, y: i32, src_rect: Rect, color: Color, mode: BlendMode) {
        let src_r = src_rect.intersection(&src.bounds());
        let placed = Rect::new(
            x + src_r.x - src_rect.x,
            y + src_r.y - src_rect.y,
            src_r.width,
            src_r.height,
        );
        let dest = placed.intersection(&self.bounds());

        if !dest.is_empty() {
            if let Some(view) = src.source_view() {
                let sx = src_r.x + dest.x - placed.x;
                let sy = src_r.y + dest.y - placed.y;
                let tint = color.to_argb();
                let stride = self.width as usize;
                let pixels = self.dense_mut();
                with_kernel!(
                    view,
                    mode,
                    blt_kernel(view.width as usize, pixels, stride, dest, sx, sy, tint)
                );
            } else {
                log::debug!("blt from {:?} skipped: no readable pixels", src.id());
            }
        }
        self.bits_changed();
    }

    /// Scale `src_rect` of `src` onto `dest_rect`, limited to `clip`.
    ///
    /// `fast` steps through the source with fixed increments; it matches
    /// the slow path for integer ratios.
    pub fn stretch_blt(
        &mut self,
        src: &PixelBuffer,
        dest_rect: Rect,
        src_rect: Rect,
        clip: Rect,
        color: Color,
        mode: BlendMode,
        fast: bool,
    ) {
        let sampling = if fast { Sampling::Fast } else { Sampling::Slow };
        self.stretch_with(src, dest_rect, src_rect, clip, color, mode, sampling);
    }

    /// [`stretch_blt`](Self::stretch_blt) with the quality from the context
    /// configuration
    pub fn stretch_blt_preferred(
        &mut self,
        src: &PixelBuffer,
        dest_rect: Rect,
        src_rect: Rect,
        clip: Rect,
        color: Color,
        mode: BlendMode,
    ) {
        let fast = self.ctx.config().stretch_quality == StretchQuality::Fast;
        self.stretch_blt(src, dest_rect, src_rect, clip, color, mode, fast);
    }

    /// Scaled blit flipped horizontally
    pub fn stretch_blt_mirror(
        &mut self,
        src: &PixelBuffer,
        dest_rect: Rect,
        src_rect: Rect,
        clip: Rect,
        color: Color,
        mode: BlendMode,
    ) {
        self.stretch_with(src, dest_rect, src_rect, clip, color, mode, Sampling::Mirror);
    }

    fn stretch_with(
        &mut self,
        src: &PixelBuffer,
        dest_rect: Rect,
        src_rect: Rect,
        clip: Rect,
        color: Color,
        mode: BlendMode,
        sampling: Sampling,
    ) {
        let clip = clip.intersection(&self.bounds());
        let clipped = stretch_clip(src_rect, clip, dest_rect, sampling == Sampling::Mirror);

        let Some((dest, src_f)) = clipped else {
            self.bits_changed();
            return;
        };
        if let Some(view) = src.source_view().filter(|v| v.width > 0 && v.height > 0) {
            let step_x = src_rect.width as f64 / dest_rect.width as f64;
            let step_y = src_rect.height as f64 / dest_rect.height as f64;
            let cols = sample_axis(src_f.x as f64, step_x, dest.width, view.width, sampling);
            let row_sampling = if sampling == Sampling::Mirror {
                Sampling::Slow
            } else {
                sampling
            };
            let rows = sample_axis(src_f.y as f64, step_y, dest.height, view.height, row_sampling);

            let tint = color.to_argb();
            let stride = self.width as usize;
            let pixels = self.dense_mut();
            with_kernel!(
                view,
                mode,
                stretch_kernel(view.width as usize, pixels, stride, dest, &cols, &rows, tint)
            );
        }
        self.bits_changed();
    }

    /// Blit at a sub-pixel position
    pub fn blt_f(
        &mut self,
        src: &PixelBuffer,
        x: f32,
        y: f32,
        src_rect: Rect,
        clip: Rect,
        color: Color,
        mode: BlendMode,
    ) {
        self.blt_rotated(src, x, y, src_rect, clip, color, mode, 0.0, 0.0, 0.0);
    }

    /// Blit rotated by `rot` radians about (`cx`, `cy`), given relative to
    /// the unrotated top-left corner at (`x`, `y`).
    ///
    /// Draws nothing when the rotated bounds miss `clip`.
    pub fn blt_rotated(
        &mut self,
        src: &PixelBuffer,
        x: f32,
        y: f32,
        src_rect: Rect,
        clip: Rect,
        color: Color,
        mode: BlendMode,
        rot: f32,
        cx: f32,
        cy: f32,
    ) {
        let transform = Matrix3::translation(x, y) * Matrix3::rotation_about(rot, cx, cy);
        let corners = quad_corners(src, src_rect, 0.0, 0.0).map(|v| transformed(v, &transform));
        self.blt_quad(src, corners, clip, color, mode, false);
    }

    /// Blit `src_rect` centered on the origin, transformed by `matrix`, then
    /// moved to (`x`, `y`)
    pub fn blt_matrix(
        &mut self,
        src: &PixelBuffer,
        x: f32,
        y: f32,
        matrix: &Matrix3,
        clip: Rect,
        color: Color,
        mode: BlendMode,
        src_rect: Rect,
        smooth: bool,
    ) {
        let transform = Matrix3::translation(x, y) * *matrix;
        let (w2, h2) = (src_rect.width as f32 / 2.0, src_rect.height as f32 / 2.0);
        let corners = quad_corners(src, src_rect, -w2, -h2).map(|v| transformed(v, &transform));
        self.blt_quad(src, corners, clip, color, mode, smooth);
    }

    /// Rasterize a textured quad given as top-left, top-right, bottom-left,
    /// bottom-right corners
    fn blt_quad(
        &mut self,
        src: &PixelBuffer,
        corners: [TriVertex; 4],
        clip: Rect,
        color: Color,
        mode: BlendMode,
        smooth: bool,
    ) {
        let clip = bounding_rect(&corners)
            .intersection(&clip)
            .intersection(&self.bounds());

        if !clip.is_empty() {
            if let Some(view) = src.source_view() {
                let [a, b, c, d] = corners;
                let tris = [[a, b, c], [b, d, c]];
                let tint = color.to_argb();
                let stride = self.width as usize;
                let pixels = self.dense_mut();
                with_kernel!(
                    view,
                    mode,
                    triangle_kernel(view.width, view.height, pixels, stride, clip, &tris, tint, smooth)
                );
            }
        }
        self.bits_changed();
    }
}

/// Corners of `src_rect` placed with their top-left at (`x0`, `y0`), UVs
/// normalized to the size of `src`
fn quad_corners(src: &PixelBuffer, src_rect: Rect, x0: f32, y0: f32) -> [TriVertex; 4] {
    let (tw, th) = (src.width().max(1) as f32, src.height().max(1) as f32);
    let (w, h) = (src_rect.width as f32, src_rect.height as f32);
    let u0 = src_rect.x as f32 / tw;
    let v0 = src_rect.y as f32 / th;
    let u1 = src_rect.right() as f32 / tw;
    let v1 = src_rect.bottom() as f32 / th;
    [
        TriVertex::new(x0, y0, u0, v0),
        TriVertex::new(x0 + w, y0, u1, v0),
        TriVertex::new(x0, y0 + h, u0, v1),
        TriVertex::new(x0 + w, y0 + h, u1, v1),
    ]
}

fn transformed(v: TriVertex, m: &Matrix3) -> TriVertex {
    let (x, y) = m.transform_point(v.x, v.y);
    TriVertex { x, y, ..v }
}

fn bounding_rect(corners: &[TriVertex; 4]) -> Rect {
    let (mut x0, mut y0) = (f32::MAX, f32::MAX);
    let (mut x1, mut y1) = (f32::MIN, f32::MIN);
    for v in corners {
        x0 = x0.min(v.x);
        y0 = y0.min(v.y);
        x1 = x1.max(v.x);
        y1 = y1.max(v.y);
    }
    if !(x0.is_finite() && y0.is_finite() && x1.is_finite() && y1.is_finite()) {
        return Rect::default();
    }
    FRect::new(x0, y0, x1 - x0, y1 - y0).enclosing()
}

/// Clip `dest_rect` to `clip` and map the result back to a fractional
/// source rectangle. Mirrored blits take their source offset from the
/// right-hand clip.
fn stretch_clip(src_rect: Rect, clip: Rect, dest_rect: Rect, mirror: bool) -> Option<(Rect, FRect)> {
    if dest_rect.is_empty() || src_rect.is_empty() {
        return None;
    }
    let dest = dest_rect.intersection(&clip);
    if dest.is_empty() {
        return None;
    }
    let fx = src_rect.width as f64 / dest_rect.width as f64;
    let fy = src_rect.height as f64 / dest_rect.height as f64;

    let left_clip = dest.x - dest_rect.x;
    let right_clip = dest_rect.width - dest.width - left_clip;
    let x_offset = if mirror { right_clip } else { left_clip };

    let src = FRect::new(
        (src_rect.x as f64 + x_offset as f64 * fx) as f32,
        (src_rect.y as f64 + (dest.y - dest_rect.y) as f64 * fy) as f32,
        (src_rect.width as f64 + (dest.width - dest_rect.width) as f64 * fx) as f32,
        (src_rect.height as f64 + (dest.height - dest_rect.height) as f64 * fy) as f32,
    );
    (src.width > 0.0 && src.height > 0.0).then_some((dest, src))
}

/// Source coordinate for each of `count` destination pixels along one axis,
/// clamped to `0..limit`
fn sample_axis(start: f64, step: f64, count: i32, limit: u32, sampling: Sampling) -> Vec<u32> {
    let max = limit as i64 - 1;
    let clamp = |v: i64| v.clamp(0, max) as u32;
    let count = count.max(0);
    match sampling {
        Sampling::Slow => (0..count)
            .map(|i| clamp((start + (i as f64 + 0.5) * step).floor() as i64))
            .collect(),
        Sampling::Fast => {
            let step = (step * 65536.0) as i64;
            let mut acc = (start * 65536.0) as i64;
            (0..count)
                .map(|_| {
                    let s = clamp(acc >> 16);
                    acc += step;
                    s
                })
                .collect()
        },
        Sampling::Mirror => {
            let end = start + count as f64 * step;
            (0..count)
                .map(|i| clamp((end - (i as f64 + 0.5) * step).floor() as i64))
                .collect()
        },
    }
}

fn blt_kernel<S: PixelSource, B: Blender>(
    src: &S,
    src_stride: usize,
    pixels: &mut [u32],
    stride: usize,
    dest: Rect,
    sx: i32,
    sy: i32,
    tint: u32,
) {
    let width = dest.width as usize;
    for y in 0..dest.height as usize {
        let src_row = (sy as usize + y) * src_stride + sx as usize;
        let row = (dest.y as usize + y) * stride + dest.x as usize;
        for (x, dst) in pixels[row..row + width].iter_mut().enumerate() {
            B::blend(dst, modulate(src.at(src_row + x), tint));
        }
    }
}

fn stretch_kernel<S: PixelSource, B: Blender>(
    src: &S,
    src_stride: usize,
    pixels: &mut [u32],
    stride: usize,
    dest: Rect,
    cols: &[u32],
    rows: &[u32],
    tint: u32,
) {
    for (y, &sy) in rows.iter().enumerate() {
        let src_row = sy as usize * src_stride;
        let row = (dest.y as usize + y) * stride + dest.x as usize;
        for (dst, &sx) in pixels[row..row + cols.len()].iter_mut().zip(cols) {
            B::blend(dst, modulate(src.at(src_row + sx as usize), tint));
        }
    }
}
