//! 8-bit palette quantization
//!
//! Images with at most 256 distinct colors get an exact palette. Larger color
//! sets go through median-cut over the four ARGB channels: the box with the
//! widest channel range is split at its population-weighted median until 256
//! boxes exist, and each box becomes the weighted mean of its colors.

use std::collections::HashMap;

use crate::error::RasterError;

pub const PALETTE_SIZE: usize = 256;

/// Palette + per-pixel indices produced by [`quantize`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantized {
    pub palette: Box<[u32; PALETTE_SIZE]>,
    pub indices: Vec<u8>,
    /// True when every pixel maps back to its exact original color
    pub exact: bool,
}

/// Convert packed ARGB pixels into a 256-entry palette and index array
pub fn quantize(pixels: &[u32], width: u32, height: u32) -> Result<Quantized, RasterError> {
    let expected = width as usize * height as usize;
    if pixels.len() != expected {
        return Err(RasterError::PixelCountMismatch {
            expected,
            actual: pixels.len(),
        });
    }
    if expected == 0 {
        return Err(RasterError::Quantize(format!(
            "no pixels to quantize ({}x{})",
            width, height
        )));
    }

    if let Some(exact) = exact_palette(pixels) {
        return Ok(exact);
    }
    Ok(median_cut(pixels))
}

/// Palette in first-seen order, or None once a 257th color shows up
fn exact_palette(pixels: &[u32]) -> Option<Quantized> {
    let mut palette = Box::new([0u32; PALETTE_SIZE]);
    let mut lookup: HashMap<u32, u8> = HashMap::with_capacity(PALETTE_SIZE);
    let mut indices = Vec::with_capacity(pixels.len());

    for &p in pixels {
        let index = match lookup.get(&p) {
            Some(&i) => i,
            None => {
                let next = lookup.len();
                if next == PALETTE_SIZE {
                    return None;
                }
                palette[next] = p;
                lookup.insert(p, next as u8);
                next as u8
            },
        };
        indices.push(index);
    }

    Some(Quantized {
        palette,
        indices,
        exact: true,
    })
}

// ============================================================================
// Median cut
// ============================================================================

const CHANNEL_SHIFTS: [u32; 4] = [24, 16, 8, 0];

#[inline]
fn channel(color: u32, ch: usize) -> u32 {
    (color >> CHANNEL_SHIFTS[ch]) & 0xFF
}

struct ColorBox {
    /// (color, pixel count)
    entries: Vec<(u32, u32)>,
    population: u64,
    widest: usize,
    span: u32,
}

impl ColorBox {
    fn new(entries: Vec<(u32, u32)>) -> Self {
        let population = entries.iter().map(|&(_, n)| n as u64).sum();
        let mut widest = 0;
        let mut span = 0;
        for ch in 0..4 {
            let (lo, hi) = entries.iter().fold((255, 0), |(lo, hi), &(c, _)| {
                let v = channel(c, ch);
                (v.min(lo), v.max(hi))
            });
            let range = hi.saturating_sub(lo);
            if range > span {
                span = range;
                widest = ch;
            }
        }
        Self {
            entries,
            population,
            widest,
            span,
        }
    }

    fn can_split(&self) -> bool {
        self.entries.len() > 1
    }

    /// Split at the population-weighted median of the widest channel
    fn split(mut self) -> (ColorBox, ColorBox) {
        let ch = self.widest;
        self.entries.sort_unstable_by_key(|&(c, _)| channel(c, ch));

        let mut cumulative = 0u64;
        let mut at = self.entries.len() - 1;
        for (i, &(_, n)) in self.entries.iter().enumerate() {
            cumulative += n as u64;
            if cumulative * 2 >= self.population {
                at = i + 1;
                break;
            }
        }
        let at = at.clamp(1, self.entries.len() - 1);

        let upper = self.entries.split_off(at);
        (ColorBox::new(self.entries), ColorBox::new(upper))
    }

    fn mean(&self) -> u32 {
        let mut sums = [0u64; 4];
        for &(c, n) in &self.entries {
            for (ch, sum) in sums.iter_mut().enumerate() {
                *sum += channel(c, ch) as u64 * n as u64;
            }
        }
        let half = self.population / 2;
        sums.iter()
            .enumerate()
            .map(|(ch, &sum)| (((sum + half) / self.population) as u32) << CHANNEL_SHIFTS[ch])
            .fold(0, |acc, v| acc | v)
    }
}

fn median_cut(pixels: &[u32]) -> Quantized {
    let mut histogram: HashMap<u32, u32> = HashMap::new();
    for &p in pixels {
        *histogram.entry(p).or_insert(0) += 1;
    }

    let mut boxes = vec![ColorBox::new(histogram.into_iter().collect())];
    while boxes.len() < PALETTE_SIZE {
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.can_split())
            .max_by_key(|(_, b)| (b.span, b.population))
            .map(|(i, _)| i);
        let Some(i) = candidate else { break };
        let (lo, hi) = boxes.swap_remove(i).split();
        boxes.push(lo);
        boxes.push(hi);
    }

    let mut palette = Box::new([0u32; PALETTE_SIZE]);
    let mut lookup: HashMap<u32, u8> = HashMap::new();
    for (i, b) in boxes.iter().enumerate() {
        palette[i] = b.mean();
        for &(c, _) in &b.entries {
            lookup.insert(c, i as u8);
        }
    }

    let indices = pixels
        .iter()
        .map(|p| lookup.get(p).copied().unwrap_or_default())
        .collect();

    Quantized {
        palette,
        indices,
        exact: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(q: &Quantized) -> Vec<u32> {
        q.indices.iter().map(|&i| q.palette[i as usize]).collect()
    }

    fn max_channel_error(a: u32, b: u32) -> u32 {
        (0..4)
            .map(|ch| channel(a, ch).abs_diff(channel(b, ch)))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn test_exact_when_few_colors() {
        let pixels: Vec<u32> = (0..64u32).map(|i| 0xFF000000 | (i % 7) * 0x102030).collect();
        let q = quantize(&pixels, 8, 8).unwrap();
        assert!(q.exact);
        assert_eq!(expand(&q), pixels);
    }

    #[test]
    fn test_exactly_256_colors_is_exact() {
        let pixels: Vec<u32> = (0..256u32).map(|i| 0x80000000 | i << 8).collect();
        let q = quantize(&pixels, 16, 16).unwrap();
        assert!(q.exact);
        assert_eq!(expand(&q), pixels);
    }

    #[test]
    fn test_median_cut_bounded_error() {
        // 512 distinct colors: a red ramp on two green levels
        let pixels: Vec<u32> = (0..512u32)
            .map(|i| 0xFF000000 | (i % 256) << 16 | if i < 256 { 0 } else { 0xFF00 })
            .collect();
        let q = quantize(&pixels, 32, 16).unwrap();
        assert!(!q.exact);
        for (orig, got) in pixels.iter().zip(expand(&q)) {
            assert!(
                max_channel_error(*orig, got) <= 2,
                "{:08x} -> {:08x}",
                orig,
                got
            );
        }
    }

    #[test]
    fn test_rejects_mismatched_length() {
        assert!(matches!(
            quantize(&[0; 3], 2, 2),
            Err(RasterError::PixelCountMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(matches!(quantize(&[], 0, 5), Err(RasterError::Quantize(_))));
    }
}
