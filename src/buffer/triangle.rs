//! Affine triangle scan conversion with texture and vertex-color shading
//!
//! Pixels are sampled at their centers against edge functions; shared edges
//! follow the top-left rule, so adjacent triangles of a quad cover every
//! pixel exactly once.

use crate::color::{alpha, blue, green, modulate, pack, red, Color};
use crate::geometry::{Rect, TriVertex};

use super::blend::{with_blender, with_kernel, Blender, PixelSource};
use super::{BlendMode, PixelBuffer};

impl PixelBuffer {
    /// Draw textured triangles, translated by (`tx`, `ty`).
    ///
    /// UVs are normalized to the texture size. Vertex colors shade a
    /// triangle only when at least one of its vertices has a non-zero color;
    /// otherwise `color` tints it. Without a texture triangles are filled
    /// with the shading color. `smooth` samples bilinearly.
    pub fn blt_triangles_tex(
        &mut self,
        texture: Option<&PixelBuffer>,
        triangles: &[[TriVertex; 3]],
        clip: Rect,
        color: Color,
        mode: BlendMode,
        tx: f32,
        ty: f32,
        smooth: bool,
    ) {
        let moved: Vec<[TriVertex; 3]> = triangles
            .iter()
            .map(|tri| {
                tri.map(|v| TriVertex {
                    x: v.x + tx,
                    y: v.y + ty,
                    ..v
                })
            })
            .collect();
        let clip = clip.intersection(&self.bounds());
        let tint = color.to_argb();
        let stride = self.width as usize;

        match texture {
            Some(texture) => {
                if let Some(view) = texture.source_view() {
                    let pixels = self.dense_mut();
                    with_kernel!(
                        view,
                        mode,
                        triangle_kernel(view.width, view.height, pixels, stride, clip, &moved, tint, smooth)
                    );
                }
            },
            None => {
                let pixels = self.dense_mut();
                with_blender!(mode, solid_kernel(pixels, stride, clip, &moved, tint));
            },
        }
        self.bits_changed();
    }
}

/// Stand-in texture for untextured triangles
struct Solid;

impl PixelSource for Solid {
    #[inline]
    fn at(&self, _index: usize) -> u32 {
        0xFFFF_FFFF
    }
}

fn solid_kernel<B: Blender>(pixels: &mut [u32], stride: usize, clip: Rect, tris: &[[TriVertex; 3]], tint: u32) {
    triangle_kernel::<Solid, B>(&Solid, 1, 1, pixels, stride, clip, tris, tint, false);
}

/// Texture lookup with clamped addressing
struct Sampler<'a, S> {
    src: &'a S,
    width: i32,
    height: i32,
    smooth: bool,
}

impl<S: PixelSource> Sampler<'_, S> {
    #[inline]
    fn texel(&self, x: i32, y: i32) -> u32 {
        let x = x.clamp(0, self.width - 1);
        let y = y.clamp(0, self.height - 1);
        self.src.at(y as usize * self.width as usize + x as usize)
    }

    fn sample(&self, u: f64, v: f64) -> u32 {
        let fu = u * self.width as f64;
        let fv = v * self.height as f64;
        if !self.smooth {
            return self.texel(fu.floor() as i32, fv.floor() as i32);
        }

        let (fu, fv) = (fu - 0.5, fv - 0.5);
        let (x0, y0) = (fu.floor(), fv.floor());
        let fx = ((fu - x0) * 256.0) as u32;
        let fy = ((fv - y0) * 256.0) as u32;
        let (x0, y0) = (x0 as i32, y0 as i32);

        let c00 = self.texel(x0, y0);
        let c10 = self.texel(x0 + 1, y0);
        let c01 = self.texel(x0, y0 + 1);
        let c11 = self.texel(x0 + 1, y0 + 1);

        let lerp = |a: u32, b: u32, t: u32| (a * (256 - t) + b * t) >> 8;
        let channel = |f: fn(u32) -> u32| {
            lerp(lerp(f(c00), f(c10), fx), lerp(f(c01), f(c11), fx), fy)
        };
        pack(channel(red), channel(green), channel(blue), channel(alpha))
    }
}

/// Vertex positions snap to 1/256 pixel so that shared edges evaluate
/// identically in both triangles
const SUBPIXEL: f64 = 256.0;

#[derive(Clone, Copy)]
struct Point {
    x: f64,
    y: f64,
}

impl Point {
    fn snapped(v: &TriVertex) -> Self {
        let snap = |c: f32| (c as f64 * SUBPIXEL).round() / SUBPIXEL;
        Self {
            x: snap(v.x),
            y: snap(v.y),
        }
    }
}

/// Signed doubled area of (a, b, p); positive when p is inside a triangle
/// whose vertices are ordered so that `edge(v0, v1, v2) > 0`
#[inline]
fn edge(a: Point, b: Point, px: f64, py: f64) -> f64 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Pixels exactly on a top or left edge belong to the triangle
#[inline]
fn is_top_left(a: Point, b: Point) -> bool {
    let dy = b.y - a.y;
    (dy == 0.0 && b.x > a.x) || dy < 0.0
}

#[inline]
fn covers(w: f64, top_left: bool) -> bool {
    w > 0.0 || (w == 0.0 && top_left)
}

fn interpolate_color(c: [u32; 3], l: [f64; 3]) -> u32 {
    let channel = |f: fn(u32) -> u32| {
        let v = l[0] * f(c[0]) as f64 + l[1] * f(c[1]) as f64 + l[2] * f(c[2]) as f64;
        (v + 0.5).clamp(0.0, 255.0) as u32
    };
    pack(channel(red), channel(green), channel(blue), channel(alpha))
}

pub(super) fn triangle_kernel<S: PixelSource, B: Blender>(
    src: &S,
    tex_width: u32,
    tex_height: u32,
    pixels: &mut [u32],
    stride: usize,
    clip: Rect,
    tris: &[[TriVertex; 3]],
    tint: u32,
    smooth: bool,
) {
    if clip.is_empty() || tex_width == 0 || tex_height == 0 {
        return;
    }
    let sampler = Sampler {
        src,
        width: tex_width as i32,
        height: tex_height as i32,
        smooth,
    };

    for tri in tris {
        let [v0, mut v1, mut v2] = *tri;
        let mut p = [Point::snapped(&v0), Point::snapped(&v1), Point::snapped(&v2)];
        let mut area = edge(p[0], p[1], p[2].x, p[2].y);
        if area == 0.0 || !area.is_finite() {
            continue;
        }
        if area < 0.0 {
            std::mem::swap(&mut v1, &mut v2);
            p.swap(1, 2);
            area = -area;
        }
        let vertex_color = tri.iter().any(|v| v.color != 0);

        let min_x = (p[0].x.min(p[1].x).min(p[2].x).floor() as i32).max(clip.x);
        let max_x = (p[0].x.max(p[1].x).max(p[2].x).ceil() as i32).min(clip.right());
        let min_y = (p[0].y.min(p[1].y).min(p[2].y).floor() as i32).max(clip.y);
        let max_y = (p[0].y.max(p[1].y).max(p[2].y).ceil() as i32).min(clip.bottom());

        let tl0 = is_top_left(p[1], p[2]);
        let tl1 = is_top_left(p[2], p[0]);
        let tl2 = is_top_left(p[0], p[1]);

        for y in min_y..max_y {
            let py = y as f64 + 0.5;
            let row = y as usize * stride;
            for x in min_x..max_x {
                let px = x as f64 + 0.5;
                let w0 = edge(p[1], p[2], px, py);
                let w1 = edge(p[2], p[0], px, py);
                let w2 = edge(p[0], p[1], px, py);
                if !(covers(w0, tl0) && covers(w1, tl1) && covers(w2, tl2)) {
                    continue;
                }

                let l = [w0 / area, w1 / area, w2 / area];
                let u = l[0] * v0.u as f64 + l[1] * v1.u as f64 + l[2] * v2.u as f64;
                let v = l[0] * v0.v as f64 + l[1] * v1.v as f64 + l[2] * v2.v as f64;
                let shade = if vertex_color {
                    interpolate_color([v0.color, v1.color, v2.color], l)
                } else {
                    tint
                };
                let texel = modulate(sampler.sample(u, v), shade);
                B::blend(&mut pixels[row + x as usize], texel);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::tests::buffer;

    fn quad(x0: f32, y0: f32, x1: f32, y1: f32) -> Vec<[TriVertex; 3]> {
        let a = TriVertex::new(x0, y0, 0.0, 0.0);
        let b = TriVertex::new(x1, y0, 1.0, 0.0);
        let c = TriVertex::new(x0, y1, 0.0, 1.0);
        let d = TriVertex::new(x1, y1, 1.0, 1.0);
        vec![[a, b, c], [b, d, c]]
    }

    #[test]
    fn test_quad_covers_each_pixel_once() {
        let mut b = buffer(6, 6, 0);
        let clip = b.bounds();
        b.blt_triangles_tex(
            None,
            &quad(1.0, 1.0, 5.0, 5.0),
            clip,
            Color::rgba(255, 0, 0, 128),
            BlendMode::Normal,
            0.0,
            0.0,
            false,
        );
        let px = b.pixels().to_vec();
        for y in 0..6 {
            for x in 0..6 {
                let inside = (1..5).contains(&x) && (1..5).contains(&y);
                let p = px[y * 6 + x];
                if inside {
                    // a second blend would push alpha above 128
                    assert_eq!(alpha(p), 128, "pixel ({}, {})", x, y);
                } else {
                    assert_eq!(p, 0, "pixel ({}, {})", x, y);
                }
            }
        }
    }

    #[test]
    fn test_winding_does_not_matter() {
        let mut cw = buffer(4, 4, 0);
        let mut ccw = buffer(4, 4, 0);
        let a = TriVertex::new(0.0, 0.0, 0.0, 0.0);
        let b = TriVertex::new(4.0, 0.0, 0.0, 0.0);
        let c = TriVertex::new(0.0, 4.0, 0.0, 0.0);
        let clip = cw.bounds();
        cw.blt_triangles_tex(None, &[[a, b, c]], clip, Color::WHITE, BlendMode::Normal, 0.0, 0.0, false);
        ccw.blt_triangles_tex(None, &[[a, c, b]], clip, Color::WHITE, BlendMode::Normal, 0.0, 0.0, false);
        assert_eq!(cw.pixels(), ccw.pixels());
        assert_eq!(cw.pixels().iter().filter(|&&p| p != 0).count(), 6);
    }

    #[test]
    fn test_vertex_colors_override_tint() {
        let mut b = buffer(4, 4, 0);
        let green = Color::rgb(0, 255, 0).to_argb();
        let tris: Vec<[TriVertex; 3]> = quad(0.0, 0.0, 4.0, 4.0)
            .into_iter()
            .map(|t| t.map(|v| v.with_color(green)))
            .collect();
        let clip = b.bounds();
        b.blt_triangles_tex(None, &tris, clip, Color::rgb(255, 0, 0), BlendMode::Normal, 0.0, 0.0, false);
        assert!(b.pixels().iter().all(|&p| p == green));
    }

    #[test]
    fn test_textured_quad_copies_texture() {
        let tex_pixels: Vec<u32> = (0..16u32).map(|i| 0xFF000000 | i * 0x111111).collect();
        let tex = PixelBuffer::from_pixels(crate::RasterContext::software(), tex_pixels.clone(), 4, 4).unwrap();
        let mut b = buffer(8, 8, 0);
        let clip = b.bounds();
        b.blt_triangles_tex(
            Some(&tex),
            &quad(0.0, 0.0, 4.0, 4.0),
            clip,
            Color::WHITE,
            BlendMode::Normal,
            2.0,
            3.0,
            false,
        );
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(b.pixel(x + 2, y + 3), Some(tex_pixels[(y * 4 + x) as usize]));
            }
        }
        assert_eq!(b.pixel(1, 3), Some(0));
    }

    #[test]
    fn test_clip_limits_output() {
        let mut b = buffer(4, 4, 0);
        b.blt_triangles_tex(
            None,
            &quad(-10.0, -10.0, 10.0, 10.0),
            Rect::new(1, 1, 2, 2),
            Color::WHITE,
            BlendMode::Normal,
            0.0,
            0.0,
            false,
        );
        assert_eq!(b.pixels().iter().filter(|&&p| p != 0).count(), 4);
        assert_eq!(b.pixel(0, 0), Some(0));
    }

    #[test]
    fn test_bilinear_blends_neighbours() {
        let tex = PixelBuffer::from_pixels(
            crate::RasterContext::software(),
            vec![0xFF000000, 0xFFFFFFFF],
            2,
            1,
        )
        .unwrap();
        let mut b = buffer(4, 1, 0);
        let clip = b.bounds();
        b.blt_triangles_tex(
            Some(&tex),
            &quad(0.0, 0.0, 4.0, 1.0),
            clip,
            Color::WHITE,
            BlendMode::Normal,
            0.0,
            0.0,
            true,
        );
        let reds: Vec<u32> = b.pixels().iter().map(|&p| red(p)).collect();
        assert_eq!(reds[0], 0);
        assert_eq!(reds[3], 255);
        assert!(reds[1] > 0 && reds[1] < reds[2] && reds[2] < 255);
    }
}
