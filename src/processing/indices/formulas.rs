// src/processing/indices/formulas.rs
// Per-pixel closed forms. Inputs arrive as reflectance in the order of the
// index's `bands` list; every division carries `+ e` in its denominator.

/// Widest band list any registered index reads.
pub(crate) const MAX_BANDS: usize = 4;

// Atmospheric resistance weight for ARVI and GARI
const GAMMA: f32 = 1.0;

// [B02, B04, B08]
pub(super) fn arvi(px: &[f32], e: f32) -> f32 {
    let (blue, red, nir) = (px[0], px[1], px[2]);
    let rb = red - GAMMA * (blue - red);
    (nir - rb) / (nir + rb + e)
}

// [B04, B08]
pub(super) fn dvi(px: &[f32], _e: f32) -> f32 {
    px[1] - px[0]
}

// [B02, B04, B08]
pub(super) fn evi(px: &[f32], e: f32) -> f32 {
    let (blue, red, nir) = (px[0], px[1], px[2]);
    2.5 * ((nir - red) / (nir + 6.0 * red - 7.5 * blue + 1.0 + e))
}

// [B04, B08]
pub(super) fn evi2(px: &[f32], e: f32) -> f32 {
    let (red, nir) = (px[0], px[1]);
    2.5 * ((nir - red) / (nir + 2.4 * red + 1.0 + e))
}

// [B02, B03, B04, B08]
pub(super) fn gari(px: &[f32], e: f32) -> f32 {
    let (blue, green, red, nir) = (px[0], px[1], px[2], px[3]);
    let gb = green - GAMMA * (blue - red);
    (nir - gb) / (nir + gb + e)
}

// [B03, B08]
pub(super) fn gci(px: &[f32], e: f32) -> f32 {
    let (green, nir) = (px[0], px[1]);
    nir / (green + e) - 1.0
}

// [B04, B08]
pub(super) fn gdvi(px: &[f32], e: f32) -> f32 {
    let (red, nir) = (px[0], px[1]);
    let (r2, n2) = (red * red, nir * nir);
    (n2 - r2) / (n2 + r2 + e)
}

// [B03, B08]
pub(super) fn gndvi(px: &[f32], e: f32) -> f32 {
    let (green, nir) = (px[0], px[1]);
    (nir - green) / (nir + green + e)
}

// [B03, B04]
pub(super) fn grrvi(px: &[f32], e: f32) -> f32 {
    let (green, red) = (px[0], px[1]);
    (green - red) / (green + red + e)
}

// [B04, B08]
pub(super) fn ipvi(px: &[f32], e: f32) -> f32 {
    let (red, nir) = (px[0], px[1]);
    nir / (nir + red + e)
}

// [B04, B08]
pub(super) fn msavi(px: &[f32], e: f32) -> f32 {
    let (red, nir) = (px[0], px[1]);
    let a = 2.0 * nir + 1.0;
    let radicand = a * a - 8.0 * (nir - red) + e;
    // NaN compares false and is passed through
    let radicand = if radicand < 0.0 { 0.0 } else { radicand };
    (a - radicand.sqrt()) / 2.0
}

// [B04, B08]
pub(super) fn msr(px: &[f32], e: f32) -> f32 {
    let (red, nir) = (px[0], px[1]);
    let sr = nir / (red + e);
    (sr - 1.0) / ((sr + e).sqrt() + e)
}

// [B04, B08]
pub(super) fn ndvi(px: &[f32], e: f32) -> f32 {
    let (red, nir) = (px[0], px[1]);
    (nir - red) / (nir + red + e)
}

// [B03, B08]
pub(super) fn ndwi(px: &[f32], e: f32) -> f32 {
    let (green, nir) = (px[0], px[1]);
    (green - nir) / (green + nir + e)
}

// [B04, B08]
pub(super) fn osavi(px: &[f32], e: f32) -> f32 {
    let (red, nir) = (px[0], px[1]);
    (nir - red) / (nir + red + 0.16 + e)
}

// [B04, B08]
pub(super) fn rdvi(px: &[f32], e: f32) -> f32 {
    let (red, nir) = (px[0], px[1]);
    (nir - red) / ((nir + red + e).sqrt() + e)
}

// [B05, B07]
pub(super) fn reci(px: &[f32], e: f32) -> f32 {
    let (re1, re3) = (px[0], px[1]);
    re3 / (re1 + e) - 1.0
}

// [B04, B08]
pub(super) fn savi(px: &[f32], e: f32) -> f32 {
    let (red, nir) = (px[0], px[1]);
    ((nir - red) / (nir + red + 0.5 + e)) * 1.5
}

// [B02, B04, B08]
pub(super) fn sipi(px: &[f32], e: f32) -> f32 {
    let (blue, red, nir) = (px[0], px[1], px[2]);
    (nir - blue) / (nir - red + e)
}

// [B02, B04, B08]
pub(super) fn sipi2(px: &[f32], e: f32) -> f32 {
    let (blue, red, nir) = (px[0], px[1], px[2]);
    (nir - blue) / (nir + red + e)
}

// [B04, B08]
pub(super) fn sr(px: &[f32], e: f32) -> f32 {
    let (red, nir) = (px[0], px[1]);
    nir / (red + e)
}

// [B04, B08]
pub(super) fn wdrvi(px: &[f32], e: f32) -> f32 {
    let (red, nir) = (px[0], px[1]);
    (0.1 * nir - red) / (0.1 * nir + red + e)
}
