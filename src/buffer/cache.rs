//! Derived per-buffer data: native display pixels and opacity run lengths
//!
//! Everything here is a pure function of the buffer content and the display
//! layout, so any content mutation simply throws the whole cache away.

use crate::display::ChannelLayout;

use crate::quantize::PALETTE_SIZE;

/// Premultiplied pixels in the display's channel layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeData {
    /// One native value per pixel (built from dense storage)
    Image(Vec<u32>),
    /// One native value per palette entry (built from indexed storage)
    Palette(Box<[u32; PALETTE_SIZE]>),
}

impl NativeData {
    pub fn as_image(&self) -> Option<&[u32]> {
        match self {
            NativeData::Image(pixels) => Some(pixels),
            NativeData::Palette(_) => None,
        }
    }

    pub fn as_palette(&self) -> Option<&[u32; PALETTE_SIZE]> {
        match self {
            NativeData::Image(_) => None,
            NativeData::Palette(palette) => Some(palette),
        }
    }
}

/// Row-wise run-length tokens over a two-class pixel classification.
///
/// Each row is a sequence of run lengths in 1..=255 whose sum is the image
/// width. A run is closed by a class change or the row end; runs longer than
/// 255 continue in further tokens. The class of a token is the class of the
/// pixel it starts at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunLengths {
    tokens: Vec<u8>,
    /// Start of each row in `tokens`, plus one past the end
    row_offsets: Vec<usize>,
}

impl RunLengths {
    /// Number of encoded rows
    pub fn height(&self) -> usize {
        self.row_offsets.len().saturating_sub(1)
    }

    /// Tokens of row `y`
    pub fn row(&self, y: usize) -> &[u8] {
        &self.tokens[self.row_offsets[y]..self.row_offsets[y + 1]]
    }

    /// All tokens, row after row
    pub fn tokens(&self) -> &[u8] {
        &self.tokens
    }

    /// Iterate `(start_x, length)` runs of row `y`
    pub fn runs(&self, y: usize) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.row(y).iter().scan(0usize, |x, &len| {
            let start = *x;
            *x += len as usize;
            Some((start, len as usize))
        })
    }
}

/// Encode a `width` x `height` classification (`is_set(pixel_index)`)
pub(crate) fn encode_runs(width: u32, height: u32, is_set: impl Fn(usize) -> bool) -> RunLengths {
    let w = width as usize;
    let h = height as usize;
    let mut tokens = Vec::with_capacity(h * 2);
    let mut row_offsets = Vec::with_capacity(h + 1);

    for y in 0..h {
        row_offsets.push(tokens.len());
        if w == 0 {
            continue;
        }
        let base = y * w;
        let mut class = is_set(base);
        let mut run = 0usize;
        for x in 0..w {
            let c = is_set(base + x);
            if c != class {
                push_run(&mut tokens, run);
                run = 0;
                class = c;
            }
            run += 1;
        }
        push_run(&mut tokens, run);
    }
    row_offsets.push(tokens.len());

    RunLengths {
        tokens,
        row_offsets,
    }
}

fn push_run(tokens: &mut Vec<u8>, mut run: usize) {
    while run > 255 {
        tokens.push(255);
        run -= 255;
    }
    tokens.push(run as u8);
}

/// Native image for dense pixels
pub(crate) fn native_image(pixels: &[u32], layout: &ChannelLayout) -> Vec<u32> {
    pixels.iter().map(|&p| layout.to_native(p)).collect()
}

/// Native palette for indexed storage
pub(crate) fn native_palette(
    palette: &[u32; PALETTE_SIZE],
    layout: &ChannelLayout,
) -> Box<[u32; PALETTE_SIZE]> {
    let mut native = Box::new([0u32; PALETTE_SIZE]);
    for (dst, &src) in native.iter_mut().zip(palette.iter()) {
        *dst = layout.to_native(src);
    }
    native
}

/// Straight ARGB pixels recovered from a native image
pub(crate) fn reconstruct(native: &[u32], layout: &ChannelLayout) -> Vec<u32> {
    native.iter().map(|&n| layout.from_native(n)).collect()
}

/// Cached derivations of a buffer's content
#[derive(Debug, Clone, Default)]
pub struct FormatCache {
    pub(crate) native: Option<NativeData>,
    pub(crate) rl_alpha: Option<RunLengths>,
    pub(crate) rl_additive: Option<RunLengths>,
}

impl FormatCache {
    /// Free everything derived from content
    pub(crate) fn invalidate(&mut self) {
        self.native = None;
        self.rl_alpha = None;
        self.rl_additive = None;
    }

    pub fn native(&self) -> Option<&NativeData> {
        self.native.as_ref()
    }

    pub fn rl_alpha(&self) -> Option<&RunLengths> {
        self.rl_alpha.as_ref()
    }

    pub fn rl_additive(&self) -> Option<&RunLengths> {
        self.rl_additive.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.native.is_none() && self.rl_alpha.is_none() && self.rl_additive.is_none()
    }
}
