//! Rectangles, affine matrices and vertex types used by the compositor

use serde::{Deserialize, Serialize};
use std::ops::Mul;

/// Integer rectangle (origin + size)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    #[inline]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width` x `height` surface
    #[inline]
    pub const fn of_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    #[inline]
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    #[inline]
    pub const fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    #[inline]
    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Overlap of two rectangles; empty rectangles have zero size
    pub fn intersection(&self, other: &Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            Rect::new(x0, y0, 0, 0)
        } else {
            Rect::new(x0, y0, x1 - x0, y1 - y0)
        }
    }
}

/// Floating point rectangle used for sub-pixel source regions
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FRect {
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn intersection(&self, other: &FRect) -> FRect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        if x1 <= x0 || y1 <= y0 {
            FRect::new(x0, y0, 0.0, 0.0)
        } else {
            FRect::new(x0, y0, x1 - x0, y1 - y0)
        }
    }

    /// Smallest integer rectangle containing this one, with edges clamped
    /// to +-2^29 so the size always fits an `i32`
    pub fn enclosing(&self) -> Rect {
        const LIMIT: f32 = (1 << 29) as f32;
        let edge = |v: f32| v.clamp(-LIMIT, LIMIT) as i32;
        let x0 = edge(self.x.floor());
        let y0 = edge(self.y.floor());
        let x1 = edge((self.x + self.width).ceil());
        let y1 = edge((self.y + self.height).ceil());
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

impl From<Rect> for FRect {
    fn from(r: Rect) -> Self {
        FRect::new(r.x as f32, r.y as f32, r.width as f32, r.height as f32)
    }
}

// ============================================================================
// Matrix3
// ============================================================================

/// Row-major 3x3 matrix for 2D affine transforms (points are column vectors)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3 {
    pub m: [[f32; 3]; 3],
}

impl Matrix3 {
    pub const fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    pub const fn translation(tx: f32, ty: f32) -> Self {
        Self {
            m: [[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]],
        }
    }

    pub const fn scale(sx: f32, sy: f32) -> Self {
        Self {
            m: [[sx, 0.0, 0.0], [0.0, sy, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Rotation by `angle` radians; positive angles turn counter-clockwise on
    /// screen (y grows downward)
    pub fn rotation(angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            m: [[cos, sin, 0.0], [-sin, cos, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Rotation about a pivot point
    pub fn rotation_about(angle: f32, cx: f32, cy: f32) -> Self {
        Self::translation(cx, cy) * Self::rotation(angle) * Self::translation(-cx, -cy)
    }

    #[inline]
    pub fn transform_point(&self, x: f32, y: f32) -> (f32, f32) {
        let m = &self.m;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }
}

impl Default for Matrix3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for Matrix3 {
    type Output = Matrix3;

    fn mul(self, rhs: Matrix3) -> Matrix3 {
        let mut out = [[0.0f32; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.m[i][k] * rhs.m[k][j]).sum();
            }
        }
        Matrix3 { m: out }
    }
}

// ============================================================================
// Spans and vertices
// ============================================================================

/// Horizontal run of pixels starting at (x, y)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub x: i32,
    pub y: i32,
    pub width: i32,
}

impl Span {
    pub const fn new(x: i32, y: i32, width: i32) -> Self {
        Self { x, y, width }
    }
}

/// Triangle vertex: screen position, normalized texture coordinates and an
/// optional packed ARGB diffuse color (0 means "no vertex color")
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TriVertex {
    pub x: f32,
    pub y: f32,
    pub u: f32,
    pub v: f32,
    pub color: u32,
}

impl TriVertex {
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self {
            x,
            y,
            u,
            v,
            color: 0,
        }
    }

    pub const fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }
}
