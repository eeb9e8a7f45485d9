//! Conversions to and from the host application's formats.
//!
//! The host stores a tone curve as a flat `[x0, y0, x1, y1, ...]` array and
//! exposes a Lightroom-style set of basic sliders. This module converts
//! curves into both.

use serde::{Deserialize, Serialize};

use crate::curve::{CurveEvaluator, MAX_CURVE_POINTS};
use crate::{ControlPoint, Curve, CurveError, CurveResult, CurveType};

/// Flatten a curve's control points into `[x0, y0, x1, y1, ...]`.
pub fn export_points(curve: &Curve) -> Vec<f32> {
    curve.points().iter().flat_map(|p| [p.x, p.y]).collect()
}

/// Build a curve from a flat `[x0, y0, x1, y1, ...]` array.
///
/// # Errors
/// `InvalidParams` for an odd length or a point count outside 2..=64, plus
/// anything [`Curve::new`] rejects.
pub fn import_points(flat: &[f32], curve_type: CurveType) -> CurveResult<Curve> {
    if flat.len() % 2 != 0 {
        return Err(CurveError::InvalidParams(format!(
            "flat point array has odd length {}",
            flat.len()
        )));
    }
    let count = flat.len() / 2;
    if !(2..=MAX_CURVE_POINTS).contains(&count) {
        return Err(CurveError::InvalidParams(format!(
            "expected 2 to {} points, got {}",
            MAX_CURVE_POINTS, count
        )));
    }

    let points: Vec<ControlPoint> = flat
        .chunks_exact(2)
        .map(|pair| ControlPoint::new(pair[0], pair[1]))
        .collect();
    Curve::new(&points, curve_type)
}

/// Basic adjustments for image editing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicAdjustments {
    /// Exposure adjustment (-5 to 5 stops)
    pub exposure: f32,
    /// Contrast (-100 to 100)
    pub contrast: f32,
    /// Highlights (-100 to 100)
    pub highlights: f32,
    /// Shadows (-100 to 100)
    pub shadows: f32,
    /// Whites (-100 to 100)
    pub whites: f32,
    /// Blacks (-100 to 100)
    pub blacks: f32,
}

impl BasicAdjustments {
    /// Create a new BasicAdjustments with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if all values are at their defaults
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> CurveResult<()> {
        let ranges = [
            ("exposure", self.exposure, 5.0),
            ("contrast", self.contrast, 100.0),
            ("highlights", self.highlights, 100.0),
            ("shadows", self.shadows, 100.0),
            ("whites", self.whites, 100.0),
            ("blacks", self.blacks, 100.0),
        ];
        for (name, value, limit) in ranges {
            if !(value.is_finite() && value.abs() <= limit) {
                return Err(CurveError::InvalidParams(format!(
                    "{} must be within ±{}, got {}",
                    name, limit, value
                )));
            }
        }
        Ok(())
    }
}

/// Slider units per unit of output offset at a quarter anchor.
const OFFSET_SCALE: f32 = 100.0 / 0.25;
const MAX_SLIDER: f32 = 100.0;
const MAX_EXPOSURE: f32 = 5.0;

/// Half-width of the window used to measure midtone slope.
const SLOPE_HALF_WIDTH: f32 = 0.05;

/// Estimate the slider settings a curve corresponds to.
///
/// The curve is sampled at 0, 0.25, 0.5, 0.75 and 1. Blacks, shadows,
/// highlights and whites come from the output offset at each anchor other
/// than the midpoint, exposure from the midpoint gain in stops, and contrast
/// from the midtone slope. An identity curve gives all-default adjustments.
pub fn derive_adjustments(curve: &Curve) -> CurveResult<BasicAdjustments> {
    let eval = CurveEvaluator::new(curve)?;
    let offset = |x: f32| ((eval.eval(x) - x) * OFFSET_SCALE).clamp(-MAX_SLIDER, MAX_SLIDER);

    let mid = eval.eval(0.5);
    let exposure = if mid > 0.0 {
        (mid / 0.5).log2().clamp(-MAX_EXPOSURE, MAX_EXPOSURE)
    } else {
        -MAX_EXPOSURE
    };

    let slope = eval.slope(0.5, SLOPE_HALF_WIDTH);
    let contrast = ((slope - 1.0) * 100.0).clamp(-MAX_SLIDER, MAX_SLIDER);

    Ok(BasicAdjustments {
        exposure: snap(exposure),
        contrast: snap(contrast),
        highlights: snap(offset(0.75)),
        shadows: snap(offset(0.25)),
        whites: snap(offset(1.0)),
        blacks: snap(offset(0.0)),
    })
}

// Float noise from evaluation should not show up as a tiny nonzero slider
fn snap(value: f32) -> f32 {
    if value.abs() < 1e-3 {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_flattens_in_order() {
        let curve = Curve::new(
            &[
                ControlPoint::new(0.0, 0.1),
                ControlPoint::new(0.5, 0.6),
                ControlPoint::new(1.0, 0.9),
            ],
            CurveType::Linear,
        )
        .unwrap();
        assert_eq!(export_points(&curve), vec![0.0, 0.1, 0.5, 0.6, 1.0, 0.9]);
    }

    #[test]
    fn test_import_rejects_bad_lengths() {
        assert!(matches!(
            import_points(&[0.0, 0.0, 1.0], CurveType::Linear),
            Err(CurveError::InvalidParams(_))
        ));
        assert!(matches!(
            import_points(&[0.5, 0.5], CurveType::Linear),
            Err(CurveError::InvalidParams(_))
        ));
        let too_many: Vec<f32> = (0..65).flat_map(|i| [i as f32 / 64.0, 0.5]).collect();
        assert!(matches!(
            import_points(&too_many, CurveType::Linear),
            Err(CurveError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_import_canonicalizes() {
        let curve = import_points(&[1.0, 1.0, 0.0, 0.0], CurveType::CubicSpline).unwrap();
        assert_eq!(export_points(&curve), vec![0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_basic_adjustments_default() {
        let adj = BasicAdjustments::new();
        assert!(adj.is_default());
        assert!(adj.validate().is_ok());
    }

    #[test]
    fn test_basic_adjustments_not_default() {
        let mut adj = BasicAdjustments::new();
        adj.exposure = 1.0;
        assert!(!adj.is_default());
    }

    #[test]
    fn test_basic_adjustments_validation() {
        let mut adj = BasicAdjustments::new();
        adj.exposure = 5.5;
        assert!(adj.validate().is_err());

        let mut adj = BasicAdjustments::new();
        adj.blacks = f32::NAN;
        assert!(adj.validate().is_err());
    }

    #[test]
    fn test_identity_curve_gives_defaults() {
        let adj = derive_adjustments(&Curve::linear()).unwrap();
        assert!(adj.is_default(), "{:?}", adj);
    }

    #[test]
    fn test_s_curve_adds_contrast() {
        let adj = derive_adjustments(&Curve::s_curve(1.0).unwrap()).unwrap();
        assert!(adj.contrast > 0.0);
        assert!(adj.shadows < 0.0);
        assert!(adj.highlights > 0.0);
        assert_eq!(adj.exposure, 0.0);
    }

    #[test]
    fn test_lifted_blacks() {
        let curve = Curve::new(
            &[ControlPoint::new(0.0, 0.1), ControlPoint::new(1.0, 0.9)],
            CurveType::Linear,
        )
        .unwrap();
        let adj = derive_adjustments(&curve).unwrap();
        assert!((adj.blacks - 40.0).abs() < 1e-3);
        assert!((adj.whites + 40.0).abs() < 1e-3);
        assert!(adj.contrast < 0.0);
        assert!(adj.validate().is_ok());
    }

    #[test]
    fn test_brightening_curve_has_positive_exposure() {
        let curve = Curve::parametric(2.0, 0.0, 1.0).unwrap();
        let adj = derive_adjustments(&curve).unwrap();
        // 0.5^(1/2) / 0.5 = sqrt(2), half a stop
        assert!((adj.exposure - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_black_midpoint_clamps_exposure() {
        let curve = Curve::new(
            &[
                ControlPoint::new(0.0, 0.0),
                ControlPoint::new(0.5, 0.0),
                ControlPoint::new(1.0, 1.0),
            ],
            CurveType::Linear,
        )
        .unwrap();
        let adj = derive_adjustments(&curve).unwrap();
        assert_eq!(adj.exposure, -5.0);
        assert!(adj.validate().is_ok());
    }
}
