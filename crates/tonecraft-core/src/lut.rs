//! Lookup tables sampled from a curve.
//!
//! Entry `i` of an `n`-entry table holds the curve value at `i / (n - 1)`.
//! Lookups interpolate linearly between the two nearest entries.

use crate::curve::{validate_lut_size, CurveEvaluator};
use crate::error::try_alloc;
use crate::{Curve, CurveError, CurveResult};

/// Discretized tone curve.
#[derive(Debug, Clone, PartialEq)]
pub struct Lut {
    values: Vec<f32>,
    identity: bool,
}

impl Lut {
    /// Build a table at the curve's own resolution.
    pub fn build(curve: &Curve) -> CurveResult<Self> {
        Self::build_with_size(curve, curve.lut_size())
    }

    /// Build a table at an explicit resolution.
    ///
    /// The curve is prepared once; every sample reuses the prepared form.
    pub fn build_with_size(curve: &Curve, size: usize) -> CurveResult<Self> {
        validate_lut_size(size)?;
        let evaluator = CurveEvaluator::new(curve)?;

        let mut values = try_alloc::<f32>(size)?;
        let last = (size - 1) as f32;
        for (i, v) in values.iter_mut().enumerate() {
            *v = evaluator.eval(i as f32 / last);
        }

        tracing::trace!(
            curve_type = ?curve.curve_type(),
            points = curve.points().len(),
            size,
            "built lut"
        );

        Ok(Self {
            values,
            identity: curve.is_identity(),
        })
    }

    /// Identity table with `size` entries.
    pub fn identity(size: usize) -> CurveResult<Self> {
        validate_lut_size(size)?;
        let mut values = try_alloc::<f32>(size)?;
        let last = (size - 1) as f32;
        for (i, v) in values.iter_mut().enumerate() {
            *v = i as f32 / last;
        }
        Ok(Self {
            values,
            identity: true,
        })
    }

    /// Wrap precomputed table values.
    ///
    /// # Errors
    /// `InvalidParams` if the length is outside [2, 65536] or a value is
    /// not finite.
    pub fn from_values(values: Vec<f32>) -> CurveResult<Self> {
        validate_lut_size(values.len())?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(CurveError::InvalidParams(
                "lut values must be finite".to_string(),
            ));
        }
        let last = (values.len() - 1) as f32;
        let identity = values
            .iter()
            .enumerate()
            .all(|(i, &v)| v == i as f32 / last);
        Ok(Self { values, identity })
    }

    /// Look up `x` with linear interpolation. `x` is clamped to [0, 1] and
    /// NaN reads as 0.
    #[inline]
    pub fn sample(&self, x: f32) -> f32 {
        let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
        let last = self.values.len() - 1;
        let pos = x * last as f32;
        let i = (pos as usize).min(last - 1);
        let frac = pos - i as f32;
        let lo = self.values[i];
        let hi = self.values[i + 1];
        lo + (hi - lo) * frac
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// True if the table maps every input to itself.
    ///
    /// Applying an identity table is skipped by the pixel applicator.
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Check that no entry is smaller than the one before it.
    pub fn is_monotonic(&self) -> bool {
        self.values.windows(2).all(|w| w[1] >= w[0])
    }

    /// Copy of the table with every entry raised to the running maximum.
    pub fn monotonic_clamped(&self) -> Self {
        let mut running = f32::MIN;
        let values: Vec<f32> = self
            .values
            .iter()
            .map(|&v| {
                running = running.max(v);
                running
            })
            .collect();
        Self {
            identity: self.identity,
            values,
        }
    }

    /// 256-entry table for 8-bit samples, clamped and rounded.
    pub fn to_u8_table(&self) -> [u8; 256] {
        let mut table = [0u8; 256];
        for (i, out) in table.iter_mut().enumerate() {
            let y = self.sample(i as f32 / 255.0);
            *out = (y.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
        table
    }

    /// Heap size of the table.
    pub fn memory_bytes(&self) -> usize {
        self.values.len() * std::mem::size_of::<f32>()
    }
}
