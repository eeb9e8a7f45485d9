//! Natural cubic spline interpolation.
//!
//! The second derivative is zero at both end knots. Coefficients are solved
//! once with the tridiagonal (Thomas) algorithm and then shared across every
//! evaluation, so building a LUT costs O(points) for the solve plus O(size)
//! for sampling.

use crate::{ControlPoint, CurveError, CurveResult};

/// Solved spline: one cubic `a + b·dx + c·dx² + d·dx³` per segment.
#[derive(Debug, Clone)]
pub struct NaturalSpline {
    knots: Vec<f64>,
    a: Vec<f64>,
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl NaturalSpline {
    /// Solve the spline through canonical (strictly increasing x) points.
    pub fn fit(points: &[ControlPoint]) -> CurveResult<Self> {
        let n = points.len();
        if n < 2 {
            return Err(CurveError::InvalidCurve(format!(
                "cubic spline needs at least 2 points, got {}",
                n
            )));
        }

        let x: Vec<f64> = points.iter().map(|p| p.x as f64).collect();
        let y: Vec<f64> = points.iter().map(|p| p.y as f64).collect();

        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        if h.iter().any(|&hi| hi <= 0.0) {
            return Err(CurveError::InvalidCurve(
                "spline knots must be strictly increasing".to_string(),
            ));
        }

        let mut alpha = vec![0.0; n];
        for i in 1..n - 1 {
            alpha[i] = 3.0 / h[i] * (y[i + 1] - y[i]) - 3.0 / h[i - 1] * (y[i] - y[i - 1]);
        }

        // Forward sweep
        let mut l = vec![1.0; n];
        let mut mu = vec![0.0; n];
        let mut z = vec![0.0; n];
        for i in 1..n - 1 {
            l[i] = 2.0 * (x[i + 1] - x[i - 1]) - h[i - 1] * mu[i - 1];
            mu[i] = h[i] / l[i];
            z[i] = (alpha[i] - h[i - 1] * z[i - 1]) / l[i];
        }

        // Back substitution
        let mut c = vec![0.0; n];
        let mut b = vec![0.0; n - 1];
        let mut d = vec![0.0; n - 1];
        for j in (0..n - 1).rev() {
            c[j] = z[j] - mu[j] * c[j + 1];
            b[j] = (y[j + 1] - y[j]) / h[j] - h[j] * (c[j + 1] + 2.0 * c[j]) / 3.0;
            d[j] = (c[j + 1] - c[j]) / (3.0 * h[j]);
        }
        c.truncate(n - 1);

        Ok(Self {
            knots: x,
            a: y,
            b,
            c,
            d,
        })
    }

    /// Evaluate with flat extrapolation outside the knot range.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.knots.len();
        if x <= self.knots[0] {
            return self.a[0];
        }
        if x >= self.knots[n - 1] {
            return self.a[n - 1];
        }

        let i = segment_index(&self.knots, x);
        let dx = x - self.knots[i];
        self.a[i] + dx * (self.b[i] + dx * (self.c[i] + dx * self.d[i]))
    }
}

/// Index of the segment whose left knot is the last one `<= x`.
#[inline]
pub(crate) fn segment_index(knots: &[f64], x: f64) -> usize {
    let last_segment = knots.len().saturating_sub(2);
    knots
        .partition_point(|&k| k <= x)
        .saturating_sub(1)
        .min(last_segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(f32, f32)]) -> Vec<ControlPoint> {
        raw.iter().map(|&p| p.into()).collect()
    }

    #[test]
    fn test_two_points_is_straight_line() {
        let spline = NaturalSpline::fit(&pts(&[(0.0, 0.0), (1.0, 1.0)])).unwrap();
        for i in 0..=10 {
            let x = i as f64 / 10.0;
            assert!((spline.eval(x) - x).abs() < 1e-12);
        }
    }

    #[test]
    fn test_passes_through_knots_exactly() {
        let points = pts(&[(0.0, 0.0), (0.3, 0.1), (0.5, 0.8), (1.0, 1.0)]);
        let spline = NaturalSpline::fit(&points).unwrap();
        for p in &points {
            assert_eq!(spline.eval(p.x as f64) as f32, p.y);
        }
    }

    #[test]
    fn test_flat_extrapolation() {
        let spline = NaturalSpline::fit(&pts(&[(0.2, 0.3), (0.8, 0.6)])).unwrap();
        assert_eq!(spline.eval(0.0), 0.3f32 as f64);
        assert_eq!(spline.eval(1.0), 0.6f32 as f64);
    }

    #[test]
    fn test_natural_boundary_second_derivative_zero() {
        let spline =
            NaturalSpline::fit(&pts(&[(0.0, 0.0), (0.4, 0.7), (0.7, 0.5), (1.0, 1.0)])).unwrap();
        assert_eq!(spline.c[0], 0.0);
        // Second derivative at the last knot: 2c + 6d·h of the last segment
        let last = spline.c.len() - 1;
        let h = spline.knots[last + 1] - spline.knots[last];
        let second = 2.0 * spline.c[last] + 6.0 * spline.d[last] * h;
        assert!(second.abs() < 1e-9, "second derivative at end was {}", second);
    }

    #[test]
    fn test_rejects_single_point() {
        let result = NaturalSpline::fit(&pts(&[(0.5, 0.5)]));
        assert!(matches!(result, Err(CurveError::InvalidCurve(_))));
    }

    #[test]
    fn test_rejects_unsorted_knots() {
        let result = NaturalSpline::fit(&pts(&[(0.5, 0.5), (0.2, 0.1)]));
        assert!(matches!(result, Err(CurveError::InvalidCurve(_))));
    }

    #[test]
    fn test_segment_index() {
        let knots = [0.0, 0.5, 1.0];
        assert_eq!(segment_index(&knots, 0.0), 0);
        assert_eq!(segment_index(&knots, 0.49), 0);
        assert_eq!(segment_index(&knots, 0.5), 1);
        assert_eq!(segment_index(&knots, 1.0), 1);
    }
}
