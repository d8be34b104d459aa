//! Rec. 709 luminance transform.
//!
//! The NTSC weights (0.30, 0.59, 0.11) used by older clients are not supported;
//! they produce different grayscale output for the same input.

use soulwave_types::vision::RGBA_CHANNELS;

pub const RED_WEIGHT: f64 = 0.2126;
pub const GREEN_WEIGHT: f64 = 0.7152;
pub const BLUE_WEIGHT: f64 = 0.0722;

/// Weighted luminance of one pixel, stored the way a clamped 8-bit buffer would.
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let y = RED_WEIGHT * f64::from(r) + GREEN_WEIGHT * f64::from(g) + BLUE_WEIGHT * f64::from(b);
    clamp_sample(y)
}

/// Round half to even, then clamp into `0..=255`.
pub fn clamp_sample(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round_ties_even().clamp(0.0, 255.0) as u8
}

/// Overwrite R, G and B of every RGBA pixel with its luminance. Alpha is untouched.
pub fn apply_grayscale(pixels: &mut [u8]) {
    for px in pixels.chunks_exact_mut(RGBA_CHANNELS) {
        let y = luminance(px[0], px[1], px[2]);
        px[0] = y;
        px[1] = y;
        px[2] = y;
    }
}
