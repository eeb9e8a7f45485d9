//! Pixel applicator: remaps image samples through one or more LUTs.
//!
//! Bindings are resolved into a short list of stages before any pixel is
//! touched:
//!
//! - a binding whose scope is fully covered by a later binding is dropped
//!   (the later entry wins, nothing is composed);
//! - consecutive RGB-channel bindings merge into one direct stage, where
//!   later bindings overwrite earlier ones per channel;
//! - Luminance and Lab bindings become working-space stages, run in binding
//!   order;
//! - identity LUTs are removed.
//!
//! Integer samples are normalized by the format maximum, looked up with
//! linear interpolation, and rounded back. Float samples are looked up as
//! is and never clamped. Alpha (channel 3) is copied unchanged.

use std::ops::Range;

use crate::buffer::{
    copy_sample, read_sample, write_sample, ImageGeometry, PixelView, PixelViewMut, SampleFormat,
};
use crate::color::{ColorTransform, LumaTransform};
use crate::parallel::{for_each_band_mut, CancelToken};
use crate::{ChannelScope, Curve, CurveError, CurveResult, Lut};

static LUMA: LumaTransform = LumaTransform;

/// A LUT bound to the channels it remaps.
#[derive(Debug, Clone, Copy)]
pub struct LutBinding<'a> {
    pub lut: &'a Lut,
    pub scope: ChannelScope,
}

impl<'a> LutBinding<'a> {
    pub fn new(lut: &'a Lut, scope: ChannelScope) -> Self {
        Self { lut, scope }
    }
}

/// Collaborators for one apply call.
#[derive(Clone, Copy, Default)]
pub struct ApplyContext<'a> {
    /// Working-space transform for Luminance and Lab scopes. Luminance falls
    /// back to the built-in BT.709 split when this is `None` or does not
    /// support it.
    pub transform: Option<&'a dyn ColorTransform>,
    pub cancel: Option<&'a CancelToken>,
}

impl<'a> ApplyContext<'a> {
    pub fn with_transform(mut self, transform: &'a dyn ColorTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Build the curve's LUT and apply it to the curve's own scope.
pub fn apply_curve(
    curve: &Curve,
    input: &PixelView<'_>,
    output: &mut PixelViewMut<'_>,
    ctx: &ApplyContext<'_>,
) -> CurveResult<()> {
    let lut = Lut::build(curve)?;
    apply_lut(&lut, curve.scope(), input, output, ctx)
}

/// Build every curve's LUT and apply them with later curves overriding
/// earlier ones on shared channels.
pub fn apply_curves(
    curves: &[Curve],
    input: &PixelView<'_>,
    output: &mut PixelViewMut<'_>,
    ctx: &ApplyContext<'_>,
) -> CurveResult<()> {
    let luts = curves.iter().map(Lut::build).collect::<CurveResult<Vec<_>>>()?;
    let bindings: Vec<LutBinding<'_>> = luts
        .iter()
        .zip(curves)
        .map(|(lut, curve)| LutBinding::new(lut, curve.scope()))
        .collect();
    apply_luts(&bindings, input, output, ctx)
}

/// Apply one LUT to the channels selected by `scope`.
pub fn apply_lut(
    lut: &Lut,
    scope: ChannelScope,
    input: &PixelView<'_>,
    output: &mut PixelViewMut<'_>,
    ctx: &ApplyContext<'_>,
) -> CurveResult<()> {
    apply_luts(&[LutBinding::new(lut, scope)], input, output, ctx)
}

/// Apply an ordered set of LUT bindings.
///
/// # Errors
/// - `InvalidParams` if `bindings` is empty or the output's width, height or
///   channel count differs from the input's.
/// - `UnsupportedFormat` for 2-channel images, per-channel or Lab scopes on
///   single-channel images, and Lab scopes without a supporting transform.
/// - `Cancelled` if the context's token is set; the output is then
///   partially written.
pub fn apply_luts(
    bindings: &[LutBinding<'_>],
    input: &PixelView<'_>,
    output: &mut PixelViewMut<'_>,
    ctx: &ApplyContext<'_>,
) -> CurveResult<()> {
    let in_g = *input.geometry();
    let out_g = *output.geometry();
    if !in_g.same_shape(&out_g) {
        return Err(CurveError::InvalidParams(format!(
            "output {}x{}x{} does not match input {}x{}x{}",
            out_g.width, out_g.height, out_g.channels, in_g.width, in_g.height, in_g.channels
        )));
    }
    if bindings.is_empty() {
        return Err(CurveError::InvalidParams("no LUTs to apply".to_string()));
    }

    let plan = Plan::new(bindings, ctx.transform, &in_g, &out_g)?;
    tracing::debug!(
        width = in_g.width,
        height = in_g.height,
        channels = in_g.channels,
        bindings = bindings.len(),
        stages = plan.stages.len(),
        fast_u8 = plan.u8_tables.is_some(),
        "applying luts"
    );

    for_each_band_mut(output, ctx.cancel, |rows, band| {
        plan.remap_band(input, &out_g, rows, band);
        Ok(())
    })
}

enum Stage<'a> {
    /// Per-channel LUTs for R, G and B (gray images use slot 0).
    Direct([Option<&'a Lut>; 3]),
    Working {
        lut: &'a Lut,
        scope: ChannelScope,
        transform: &'a dyn ColorTransform,
    },
}

impl Stage<'_> {
    #[inline]
    fn apply(&self, px: &mut [f32; 3]) {
        match self {
            Stage::Direct(luts) => {
                for (v, slot) in px.iter_mut().zip(luts) {
                    if let Some(lut) = slot {
                        *v = lut.sample(*v);
                    }
                }
            }
            Stage::Working {
                lut,
                scope,
                transform,
            } => {
                let mut w = transform.to_working_space(*px, *scope);
                let k = scope.working_component();
                w[k] = lut.sample(w[k]);
                *px = transform.from_working_space(w, *scope);
            }
        }
    }
}

struct Plan<'a> {
    stages: Vec<Stage<'a>>,
    /// Channels written through the stages; others are copied.
    touched: [bool; 3],
    /// Byte tables when both buffers are 8-bit and a single direct stage runs.
    u8_tables: Option<[Option<[u8; 256]>; 3]>,
}

impl<'a> Plan<'a> {
    fn new(
        bindings: &'a [LutBinding<'a>],
        transform: Option<&'a dyn ColorTransform>,
        in_g: &ImageGeometry,
        out_g: &ImageGeometry,
    ) -> CurveResult<Self> {
        let gray = match in_g.channels {
            1 => true,
            3 | 4 => false,
            n => {
                return Err(CurveError::UnsupportedFormat(format!(
                    "{}-channel images are not supported",
                    n
                )))
            }
        };

        let mut stages: Vec<Stage<'a>> = Vec::with_capacity(bindings.len());
        for (i, binding) in bindings.iter().enumerate() {
            if bindings[i + 1..]
                .iter()
                .any(|later| later.scope.covers(binding.scope))
            {
                continue;
            }

            let slots: Option<&[usize]> = if gray {
                match binding.scope {
                    ChannelScope::Rgb | ChannelScope::Luminance => Some(&[0]),
                    other => {
                        return Err(CurveError::UnsupportedFormat(format!(
                            "{:?} scope on a single-channel image",
                            other
                        )))
                    }
                }
            } else {
                binding.scope.rgb_channels()
            };

            match slots {
                Some(channels) => {
                    if !matches!(stages.last(), Some(Stage::Direct(_))) {
                        stages.push(Stage::Direct([None; 3]));
                    }
                    if let Some(Stage::Direct(luts)) = stages.last_mut() {
                        for &c in channels {
                            luts[c] = Some(binding.lut);
                        }
                    }
                }
                None => stages.push(Stage::Working {
                    lut: binding.lut,
                    scope: binding.scope,
                    transform: resolve_transform(binding.scope, transform)?,
                }),
            }
        }

        for stage in &mut stages {
            if let Stage::Direct(luts) = stage {
                for slot in luts.iter_mut() {
                    if slot.is_some_and(|lut| lut.is_identity()) {
                        *slot = None;
                    }
                }
            }
        }
        stages.retain(|stage| match stage {
            Stage::Direct(luts) => luts.iter().any(Option::is_some),
            Stage::Working { lut, .. } => !lut.is_identity(),
        });

        let mut touched = [false; 3];
        for stage in &stages {
            match stage {
                Stage::Direct(luts) => {
                    for (t, slot) in touched.iter_mut().zip(luts) {
                        *t |= slot.is_some();
                    }
                }
                Stage::Working { .. } => touched = [true; 3],
            }
        }

        let u8_tables = match stages.as_slice() {
            [Stage::Direct(luts)]
                if in_g.format == SampleFormat::U8 && out_g.format == SampleFormat::U8 =>
            {
                Some(luts.map(|slot| slot.map(Lut::to_u8_table)))
            }
            _ => None,
        };

        Ok(Self {
            stages,
            touched,
            u8_tables,
        })
    }

    fn remap_band(
        &self,
        input: &PixelView<'_>,
        out_g: &ImageGeometry,
        rows: Range<u32>,
        band: &mut [u8],
    ) {
        let in_g = input.geometry();
        let channels = in_g.channels as usize;
        let color = channels.min(3);
        let row_bytes = out_g.row_bytes();

        for y in rows.clone() {
            let src = input.row(y);
            let start = (y - rows.start) as usize * out_g.row_stride;
            let dst = &mut band[start..start + row_bytes];

            if let Some(tables) = &self.u8_tables {
                remap_row_u8(tables, channels, src, dst);
                continue;
            }

            for x in 0..in_g.width as usize {
                let base = x * channels;
                let mut px = [0.0f32; 3];
                for (c, v) in px.iter_mut().enumerate().take(color) {
                    *v = read_sample(in_g.format, src, base + c);
                }
                for stage in &self.stages {
                    stage.apply(&mut px);
                }
                for c in 0..channels {
                    if c < color && self.touched[c] {
                        write_sample(out_g.format, dst, base + c, px[c]);
                    } else {
                        copy_sample(in_g.format, src, out_g.format, dst, base + c);
                    }
                }
            }
        }
    }
}

#[inline]
fn remap_row_u8(tables: &[Option<[u8; 256]>; 3], channels: usize, src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(channels).zip(dst.chunks_exact_mut(channels)) {
        for c in 0..channels {
            d[c] = match tables.get(c) {
                Some(Some(table)) => table[s[c] as usize],
                _ => s[c],
            };
        }
    }
}

fn resolve_transform<'a>(
    scope: ChannelScope,
    transform: Option<&'a dyn ColorTransform>,
) -> CurveResult<&'a dyn ColorTransform> {
    match transform {
        Some(t) if t.supports(scope) => Ok(t),
        _ if scope == ChannelScope::Luminance => Ok(&LUMA),
        _ => Err(CurveError::UnsupportedFormat(format!(
            "{:?} scope needs a color transform",
            scope
        ))),
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::buffer::PixelBuffer;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn linear_identity_preserves_u8(
            width in 1u32..12,
            height in 1u32..80,
            channels in prop::sample::select(vec![1u32, 3, 4]),
            pad in 0usize..5,
            seed in any::<u8>(),
        ) {
            let g = ImageGeometry::packed(width, height, channels, SampleFormat::U8);
            let g = g.with_stride(g.row_stride + pad);
            let len = g.required_len().unwrap();
            let data: Vec<u8> = (0..len)
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();
            let input = PixelView::new(&data, g).unwrap();

            let mut out = PixelBuffer::new(width, height, channels, SampleFormat::U8).unwrap();
            let ctx = ApplyContext::default();
            apply_curve(&Curve::linear(), &input, &mut out.view_mut(), &ctx).unwrap();

            for y in 0..height {
                prop_assert_eq!(out.view().row(y), input.row(y));
            }
        }

        #[test]
        fn later_binding_wins(a in 0.0f32..=1.0, b in 0.0f32..=1.0, v in any::<u8>()) {
            let first = Lut::from_values(vec![0.0, a]).unwrap();
            let second = Lut::from_values(vec![0.0, b]).unwrap();
            let input = PixelBuffer::from_samples(1, 1, 3, SampleFormat::U8, &[v, v, v]).unwrap();

            let mut both = PixelBuffer::new(1, 1, 3, SampleFormat::U8).unwrap();
            apply_luts(
                &[
                    LutBinding::new(&first, ChannelScope::Red),
                    LutBinding::new(&second, ChannelScope::Red),
                ],
                &input.view(),
                &mut both.view_mut(),
                &ApplyContext::default(),
            ).unwrap();

            let mut only = PixelBuffer::new(1, 1, 3, SampleFormat::U8).unwrap();
            let ctx = ApplyContext::default();
            let red = ChannelScope::Red;
            apply_lut(&second, red, &input.view(), &mut only.view_mut(), &ctx).unwrap();

            prop_assert_eq!(both.data(), only.data());
        }
    }
}
