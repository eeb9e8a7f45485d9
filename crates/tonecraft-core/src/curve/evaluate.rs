//! Curve evaluation.
//!
//! [`CurveEvaluator`] does the per-curve preparation (spline solve, Bézier
//! handles) once, so that sampling a LUT does not redo it per sample.

use super::bezier::BezierChain;
use super::spline::{segment_index, NaturalSpline};
use super::Curve;
use crate::{ControlPoint, CurveError, CurveResult, CurveType};

#[derive(Debug, Clone)]
enum Prepared {
    Linear(Vec<f64>),
    Spline(NaturalSpline),
    Bezier(BezierChain),
    Parametric {
        inv_gamma: f64,
        black: f64,
        white: f64,
    },
}

/// A curve prepared for repeated evaluation.
#[derive(Debug, Clone)]
pub struct CurveEvaluator<'a> {
    points: &'a [ControlPoint],
    prepared: Prepared,
}

impl<'a> CurveEvaluator<'a> {
    /// Prepare a curve for evaluation.
    ///
    /// # Errors
    /// `InvalidCurve` if a point-based curve has fewer than 2 points.
    pub fn new(curve: &'a Curve) -> CurveResult<Self> {
        let points = curve.points();
        let curve_type = curve.curve_type();
        if curve_type.uses_points() && points.len() < 2 {
            return Err(CurveError::InvalidCurve(format!(
                "{:?} curve needs at least 2 points, got {}",
                curve_type,
                points.len()
            )));
        }

        let prepared = match curve_type {
            CurveType::Linear => Prepared::Linear(points.iter().map(|p| p.x as f64).collect()),
            CurveType::CubicSpline | CurveType::AiOptimized => {
                Prepared::Spline(NaturalSpline::fit(points)?)
            }
            CurveType::Bezier => Prepared::Bezier(BezierChain::fit(points)?),
            CurveType::Parametric => Prepared::Parametric {
                inv_gamma: 1.0 / curve.gamma() as f64,
                black: curve.black_point() as f64,
                white: curve.white_point() as f64,
            },
        };

        Ok(Self { points, prepared })
    }

    /// Evaluate the curve at `x`. Inputs outside [0, 1] are clamped.
    ///
    /// Only parametric curves clamp their output; other types may return
    /// values outside [0, 1] if their control points overshoot.
    pub fn eval(&self, x: f32) -> f32 {
        let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) } as f64;
        let y = match &self.prepared {
            Prepared::Linear(knots) => linear(self.points, knots, x),
            Prepared::Spline(spline) => spline.eval(x),
            Prepared::Bezier(chain) => chain.eval(x),
            Prepared::Parametric {
                inv_gamma,
                black,
                white,
            } => parametric(x, *inv_gamma, *black, *white),
        };
        y as f32
    }

    /// Numerical slope around `x`, using a central difference of width `2h`.
    pub fn slope(&self, x: f32, h: f32) -> f32 {
        let lo = (x - h).max(0.0);
        let hi = (x + h).min(1.0);
        if hi <= lo {
            return 0.0;
        }
        (self.eval(hi) - self.eval(lo)) / (hi - lo)
    }
}

/// Evaluate a curve at a single `x`.
///
/// For more than a handful of samples, build a [`CurveEvaluator`] once and
/// reuse it.
pub fn evaluate(curve: &Curve, x: f32) -> CurveResult<f32> {
    Ok(CurveEvaluator::new(curve)?.eval(x))
}

/// Piecewise-linear interpolation with flat extrapolation.
fn linear(points: &[ControlPoint], knots: &[f64], x: f64) -> f64 {
    let n = points.len();
    let first = points[0];
    let last = points[n - 1];
    if x <= first.x as f64 {
        return first.y as f64;
    }
    if x >= last.x as f64 {
        return last.y as f64;
    }

    let i = segment_index(knots, x);
    let (x0, y0) = (points[i].x as f64, points[i].y as f64);
    let (x1, y1) = (points[i + 1].x as f64, points[i + 1].y as f64);
    let t = (x - x0) / (x1 - x0);
    y0 + t * (y1 - y0)
}

/// `((x - black) / (white - black))^(1/gamma)`, clamped to [0, 1].
fn parametric(x: f64, inv_gamma: f64, black: f64, white: f64) -> f64 {
    let range = white - black;
    let t = if range <= 0.0 {
        // Degenerate levels: hard threshold at the black point
        if x < black {
            0.0
        } else {
            1.0
        }
    } else {
        ((x - black) / range).clamp(0.0, 1.0)
    };
    t.powf(inv_gamma).clamp(0.0, 1.0)
}
