//! Solid-color primitives: rectangles, lines, coverage-masked spans
//!
//! These draw straight into the destination without clipping; callers pass
//! geometry that lies inside the buffer.

use crate::color::{alpha, with_alpha, Color};
use crate::geometry::{Rect, Span};

use super::blend::{with_blender, with_coverage, Blender};
use super::{BlendMode, PixelBuffer};

impl PixelBuffer {
    /// Fill `rect` with `color`. Opaque normal fills overwrite, everything
    /// else blends per pixel.
    pub fn fill_rect(&mut self, rect: Rect, color: Color, mode: BlendMode) {
        if !rect.is_empty() {
            let src = color.to_argb();
            let stride = self.width as usize;
            let pixels = self.dense_mut();
            if mode == BlendMode::Normal && alpha(src) == 255 {
                for y in rect.y..rect.bottom() {
                    let row = y as usize * stride;
                    pixels[row + rect.x as usize..row + rect.right() as usize].fill(src);
                }
            } else {
                with_blender!(mode, fill_rows(pixels, stride, rect, src));
            }
        }
        self.bits_changed();
    }

    /// One-pixel line between two points (Bresenham).
    ///
    /// Axis-aligned lines become a one-pixel-wide `fill_rect`. Sloped lines
    /// stop as soon as a step would leave the endpoints' bounding box.
    pub fn draw_line(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: Color, mode: BlendMode) {
        if let Some(rect) = axis_aligned_rect(x0, y0, x1, y1) {
            self.fill_rect(rect, color, mode);
            return;
        }
        let src = color.to_argb();
        let stride = self.width as usize;
        let pixels = self.dense_mut();
        with_blender!(mode, line_kernel(pixels, stride, (x0, y0, x1, y1), src));
        self.bits_changed();
    }

    /// Anti-aliased line (Wu) with the same bounding-box guarantee as
    /// [`draw_line`](Self::draw_line)
    pub fn draw_line_aa(&mut self, x0: f64, y0: f64, x1: f64, y1: f64, color: Color, mode: BlendMode) {
        if let Some(rect) = axis_aligned_rect(x0, y0, x1, y1) {
            self.fill_rect(rect, color, mode);
            return;
        }
        let src = color.to_argb();
        let stride = self.width as usize;
        let pixels = self.dense_mut();
        with_blender!(mode, line_aa_kernel(pixels, stride, (x0, y0, x1, y1), src));
        self.bits_changed();
    }

    /// Fill spans with `color` weighted by an 8-bit coverage mask.
    ///
    /// `coverage` is a `cover_rect.width` x `cover_rect.height` mask placed
    /// at `cover_rect`'s origin in buffer coordinates. Per pixel alpha is
    /// `((cover + 1) * color_alpha) >> 8`.
    pub fn fill_scan_lines_with_coverage(
        &mut self,
        spans: &[Span],
        color: Color,
        mode: BlendMode,
        coverage: &[u8],
        cover_rect: Rect,
    ) {
        let src = color.to_argb();
        let stride = self.width as usize;
        let pixels = self.dense_mut();
        with_blender!(mode, coverage_kernel(pixels, stride, spans, src, coverage, cover_rect));
        self.bits_changed();
    }
}

fn axis_aligned_rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Option<Rect> {
    if y0 == y1 {
        let start = x0.min(x1) as i32;
        let end = x0.max(x1) as i32;
        Some(Rect::new(start, y0 as i32, end - start + 1, 1))
    } else if x0 == x1 {
        let start = y0.min(y1) as i32;
        let end = y0.max(y1) as i32;
        Some(Rect::new(x0 as i32, start, 1, end - start + 1))
    } else {
        None
    }
}

#[inline]
fn at(stride: usize, x: i32, y: i32) -> usize {
    y as usize * stride + x as usize
}

fn fill_rows<B: Blender>(pixels: &mut [u32], stride: usize, rect: Rect, src: u32) {
    for y in rect.y..rect.bottom() {
        let row = y as usize * stride;
        for p in &mut pixels[row + rect.x as usize..row + rect.right() as usize] {
            B::blend(p, src);
        }
    }
}

fn line_kernel<B: Blender>(pixels: &mut [u32], stride: usize, line: (f64, f64, f64, f64), src: u32) {
    let (x0, y0, x1, y1) = line;
    step_line(x0, y0, x1, y1, |x, y| B::blend(&mut pixels[at(stride, x, y)], src));
}

fn line_aa_kernel<B: Blender>(pixels: &mut [u32], stride: usize, line: (f64, f64, f64, f64), src: u32) {
    let (x0, y0, x1, y1) = line;
    step_line_aa(x0, y0, x1, y1, |x, y, weight| {
        B::blend(&mut pixels[at(stride, x, y)], with_coverage(src, weight));
    });
}

fn coverage_kernel<B: Blender>(
    pixels: &mut [u32],
    stride: usize,
    spans: &[Span],
    src: u32,
    coverage: &[u8],
    cover_rect: Rect,
) {
    let color_alpha = alpha(src);
    let cover_stride = cover_rect.width as usize;
    for span in spans {
        let dest = at(stride, span.x, span.y);
        let cover = at(cover_stride, span.x - cover_rect.x, span.y - cover_rect.y);
        let width = span.width.max(0) as usize;
        let row = &mut pixels[dest..dest + width];
        for (p, &c) in row.iter_mut().zip(&coverage[cover..cover + width]) {
            let a = ((c as u32 + 1) * color_alpha) >> 8;
            B::blend(p, with_alpha(src, a));
        }
    }
}

/// Bresenham on the dominant axis. The first endpoint is always plotted;
/// the walk ends at the far endpoint or when a minor-axis step leaves the
/// bounding box.
fn step_line(mut x0: f64, mut y0: f64, mut x1: f64, mut y1: f64, mut plot: impl FnMut(i32, i32)) {
    let (min_x, max_x) = (x0.min(x1), x0.max(x1));
    let (min_y, max_y) = (y0.min(y1), y0.max(y1));
    let outside = |x: i32, y: i32| {
        let (x, y) = (x as f64, y as f64);
        x < min_x || y < min_y || x > max_x || y > max_y
    };

    let mut dv = y1 - y0;
    let mut dh = x1 - x0;

    if dv.abs() < dh.abs() {
        // mostly horizontal
        if dh < 0.0 {
            dh = -dh;
            dv = -dv;
            std::mem::swap(&mut x0, &mut x1);
            std::mem::swap(&mut y0, &mut y1);
        }
        let inc = if dv < 0.0 {
            dv = -dv;
            -1
        } else {
            1
        };

        let mut x = x0 as i32;
        let mut y = y0 as i32;
        plot(x, y);
        x += 1;

        let delta1 = (2.0 * (dv - dh)) as i32;
        let delta2 = (2.0 * dv) as i32;
        let mut g = (2.0 * dv - dh) as i32 + (delta2 as f64 * y0.fract()) as i32;

        while x as f64 <= x1 {
            if g > 0 {
                g += delta1;
                y += inc;
                if outside(x, y) {
                    break;
                }
            } else {
                g += delta2;
            }
            plot(x, y);
            x += 1;
        }
    } else {
        // mostly vertical
        if dv < 0.0 {
            dh = -dh;
            dv = -dv;
            std::mem::swap(&mut x0, &mut x1);
            std::mem::swap(&mut y0, &mut y1);
        }
        let inc = if dh < 0.0 {
            dh = -dh;
            -1
        } else {
            1
        };

        let mut x = x0 as i32;
        let mut y = y0 as i32;
        plot(x, y);
        y += 1;

        let delta1 = (2.0 * (dh - dv)) as i32;
        let delta2 = (2.0 * dh) as i32;
        let mut g = (2.0 * dh - dv) as i32 + (delta2 as f64 * x0.fract()) as i32;

        while y as f64 <= y1 {
            if g > 0 {
                g += delta1;
                x += inc;
                if outside(x, y) {
                    break;
                }
            } else {
                g += delta2;
            }
            plot(x, y);
            y += 1;
        }
    }
}

/// Wu line between integer-truncated endpoints with a 16-bit error
/// accumulator. `plot` receives the 0..=255 coverage of each pixel; pixels
/// outside the endpoints' bounding box are never plotted.
fn step_line_aa(x0: f64, y0: f64, x1: f64, y1: f64, mut plot: impl FnMut(i32, i32, u32)) {
    let (mut ax0, mut ay0, mut ax1, mut ay1) = (x0 as i32, y0 as i32, x1 as i32, y1 as i32);
    if ay0 > ay1 {
        std::mem::swap(&mut ax0, &mut ax1);
        std::mem::swap(&mut ay0, &mut ay1);
    }
    let (min_x, max_x) = (ax0.min(ax1), ax0.max(ax1));
    let mut plot = |x: i32, y: i32, weight: u32| {
        if x >= min_x && x <= max_x && y >= ay0 && y <= ay1 {
            plot(x, y, weight);
        }
    };

    let dy = ay1 - ay0;
    let mut dx = ax1 - ax0;
    let xinc = if dx < 0 {
        dx = -dx;
        -1
    } else {
        1
    };

    let (mut x, mut y) = (ax0, ay0);
    plot(x, y, 255);

    // straight and diagonal lines need no weighting
    if dx == 0 || dy == 0 || dx == dy {
        let steps = dx.max(dy);
        let sx = if dx == 0 { 0 } else { xinc };
        let sy = if dy == 0 { 0 } else { 1 };
        for _ in 0..steps {
            x += sx;
            y += sy;
            plot(x, y, 255);
        }
        return;
    }

    let mut acc: u32 = 0;
    if dy > dx {
        // y-major: the second pixel of each pair sits one step along x
        let adjust = ((dx as u32) << 16) / dy as u32;
        for _ in 1..dy {
            let prev = acc;
            acc = (acc + adjust) & 0xFFFF;
            if acc <= prev {
                x += xinc;
            }
            y += 1;
            let weight = acc >> 8;
            plot(x, y, weight ^ 0xFF);
            plot(x + xinc, y, weight);
        }
    } else {
        let adjust = ((dy as u32) << 16) / dx as u32;
        for _ in 1..dx {
            let prev = acc;
            acc = (acc + adjust) & 0xFFFF;
            if acc <= prev {
                y += 1;
            }
            x += xinc;
            let weight = acc >> 8;
            plot(x, y, weight ^ 0xFF);
            plot(x, y + 1, weight);
        }
    }
    plot(ax1, ay1, 255);
}
