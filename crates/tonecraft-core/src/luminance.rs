//! Luminance from normalized RGB using ITU-R BT.709 coefficients.
//!
//! Shared by the statistics analyzer, the histogram, and the built-in
//! luminance working space.

/// BT.709 red weight.
pub const LUMINANCE_R: f32 = 0.2126;

/// BT.709 green weight.
pub const LUMINANCE_G: f32 = 0.7152;

/// BT.709 blue weight.
pub const LUMINANCE_B: f32 = 0.0722;

/// Luminance of normalized RGB values.
///
/// Inputs are not clamped; out-of-range float samples give out-of-range
/// luminance.
#[inline]
pub fn calculate_luminance(r: f32, g: f32, b: f32) -> f32 {
    LUMINANCE_R * r + LUMINANCE_G * g + LUMINANCE_B * b
}

/// Luminance of a pixel with 1, 3 or 4 normalized channels.
///
/// A single channel is already luminance. Alpha is ignored.
#[inline]
pub fn pixel_luminance(pixel: &[f32]) -> f32 {
    match pixel {
        [gray] => *gray,
        [r, g, b, ..] => calculate_luminance(*r, *g, *b),
        _ => 0.0,
    }
}
