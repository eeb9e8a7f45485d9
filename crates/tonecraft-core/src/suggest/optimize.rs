//! Refine an existing curve against a reference image's levels.
//!
//! The curve's input axis is remapped so that the reference black level
//! lands on 0 and the white level on 1, a levels stretch. Every control
//! point keeps its output value; only its input position moves.

use crate::stats::ImageStatistics;
use crate::{ControlPoint, Curve, CurveResult, CurveType};

/// Levels closer together than this are treated as a flat image and leave
/// the curve unchanged.
const MIN_LEVEL_RANGE: f32 = 0.05;

/// Stretch `curve` to the reference image's black and white levels.
///
/// Spline curves come back tagged [`CurveType::AiOptimized`]. Linear and
/// Bézier curves keep their type, since the tag implies spline evaluation.
pub fn optimize_curve(curve: &Curve, reference: &ImageStatistics) -> CurveResult<Curve> {
    let black = reference.black_level.clamp(0.0, 1.0);
    let white = reference.white_level.clamp(0.0, 1.0);
    let range = white - black;
    if range.is_nan() || range < MIN_LEVEL_RANGE {
        tracing::debug!(black, white, "level range too small, curve unchanged");
        return Ok(curve.clone());
    }

    let optimized = match curve.curve_type() {
        CurveType::Parametric => {
            // f((x - black) / range) folds into the curve's own levels
            let b = black + curve.black_point() * range;
            let w = black + curve.white_point() * range;
            curve.clone().with_levels(b, w)?
        }
        curve_type => {
            let points: Vec<ControlPoint> = curve
                .points()
                .iter()
                .map(|p| ControlPoint::new(black + p.x * range, p.y))
                .collect();
            let target_type = match curve_type {
                CurveType::CubicSpline | CurveType::AiOptimized => CurveType::AiOptimized,
                other => other,
            };
            Curve::new(&points, target_type)?
                .with_scope(curve.scope())
                .with_lut_size(curve.lut_size())?
        }
    };

    tracing::debug!(
        black,
        white,
        curve_type = ?optimized.curve_type(),
        "optimized curve"
    );
    Ok(optimized)
}
