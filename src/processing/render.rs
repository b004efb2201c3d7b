// src/processing/render.rs
use rayon::prelude::*;

use super::indices::IndexDefinition;
use super::stats::ViStatistics;

/// Blue → green → yellow → red ramp used for every index map.
pub const PALETTE: [[u8; 3]; 29] = [
    [0x04, 0x02, 0x74], [0x04, 0x02, 0x81], [0x05, 0x02, 0xa3], [0x05, 0x02, 0xb8],
    [0x05, 0x02, 0xce], [0x05, 0x02, 0xe6], [0x06, 0x02, 0xff], [0x23, 0x5c, 0xb1],
    [0x30, 0x7e, 0xf3], [0x26, 0x9d, 0xb1], [0x30, 0xc8, 0xe2], [0x32, 0xd3, 0xef],
    [0x3b, 0xe2, 0x85], [0x3f, 0xf3, 0x8f], [0x86, 0xe2, 0x6f], [0x3a, 0xe2, 0x37],
    [0xb5, 0xe2, 0x2e], [0xd6, 0xe2, 0x1f], [0xff, 0xf7, 0x05], [0xff, 0xd6, 0x11],
    [0xff, 0xb6, 0x13], [0xff, 0x8b, 0x13], [0xff, 0x6e, 0x08], [0xff, 0x50, 0x0d],
    [0xff, 0x00, 0x00], [0xde, 0x01, 0x01], [0xc2, 0x13, 0x01], [0xa7, 0x10, 0x01],
    [0x91, 0x10, 0x03],
];

/// Colour-scale bounds: the index's fixed display range where it has one,
/// the data extent otherwise.
pub fn display_range(def: &IndexDefinition, stats: &ViStatistics) -> Option<(f32, f32)> {
    let lo = def.display_range.0.or(stats.min)?;
    let hi = def.display_range.1.or(stats.max)?;
    Some((lo, hi))
}

/// Map values onto [`PALETTE`] as row-major RGBA. NaN pixels are fully
/// transparent; values outside `[lo, hi]` take the end colours.
pub fn colorize(data: &[f32], range: (f32, f32)) -> Vec<u8> {
    let (lo, hi) = range;
    let span = hi - lo + 1e-10;
    let last = PALETTE.len() - 1;
    let mut rgba = vec![0u8; data.len() * 4];
    rgba.par_chunks_mut(4).zip(data.par_iter()).for_each(|(px, &v)| {
        if v.is_nan() {
            return;
        }
        let norm = ((v - lo) / span).clamp(0.0, 1.0);
        let idx = ((norm * PALETTE.len() as f32) as usize).min(last);
        let [r, g, b] = PALETTE[idx];
        px.copy_from_slice(&[r, g, b, 255]);
    });
    rgba
}
