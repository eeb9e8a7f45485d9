//! Working-space transforms for non-RGB channel scopes.
//!
//! Curves bound to Luminance or Lab scopes are looked up in a working space:
//! the pixel is converted, one component is remapped through the LUT, and
//! the result is converted back. Lab and ICC math live with the caller; this
//! crate only ships the BT.709 luminance split.

use crate::luminance::{calculate_luminance, LUMINANCE_B, LUMINANCE_G, LUMINANCE_R};
use crate::ChannelScope;

/// Converts RGB pixels to and from a working space.
///
/// The component selected by [`ChannelScope::working_component`] must be
/// normalized to [0, 1] so it can index a LUT.
pub trait ColorTransform: Send + Sync {
    /// Whether the transform handles this scope.
    fn supports(&self, scope: ChannelScope) -> bool;

    fn to_working_space(&self, rgb: [f32; 3], scope: ChannelScope) -> [f32; 3];

    fn from_working_space(&self, working: [f32; 3], scope: ChannelScope) -> [f32; 3];
}

/// Luma plus blue and red differences, `[Y, B - Y, R - Y]`.
///
/// Only the Luminance scope is supported. Changing Y and converting back
/// shifts all three channels by the same amount, preserving chroma.
#[derive(Debug, Clone, Copy, Default)]
pub struct LumaTransform;

impl ColorTransform for LumaTransform {
    fn supports(&self, scope: ChannelScope) -> bool {
        scope == ChannelScope::Luminance
    }

    #[inline]
    fn to_working_space(&self, [r, g, b]: [f32; 3], _scope: ChannelScope) -> [f32; 3] {
        let y = calculate_luminance(r, g, b);
        [y, b - y, r - y]
    }

    #[inline]
    fn from_working_space(&self, [y, cb, cr]: [f32; 3], _scope: ChannelScope) -> [f32; 3] {
        let r = y + cr;
        let b = y + cb;
        let g = (y - LUMINANCE_R * r - LUMINANCE_B * b) / LUMINANCE_G;
        [r, g, b]
    }
}
