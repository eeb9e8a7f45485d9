//! Cubic Bézier segment chain.
//!
//! Every pair of consecutive control points is joined by one cubic Bézier
//! segment. Inner handles follow Catmull-Rom tangents, each a third of the
//! chord long, with their x coordinates clamped into the segment so that
//! `x(t)` is monotonic. A Bézier is not a function of x, so `y` is resolved by
//! bisecting `x(t)` to within [`X_TOLERANCE`].

use super::spline::segment_index;
use crate::{ControlPoint, CurveError, CurveResult};

/// Bisection stops once `|x(t) - x|` is below this.
pub const X_TOLERANCE: f64 = 1e-4;

/// Hard cap on bisection steps. 2^-40 is far below the tolerance.
const MAX_BISECTION_STEPS: usize = 40;

#[derive(Debug, Clone, Copy)]
struct Segment {
    p0: (f64, f64),
    p1: (f64, f64),
    p2: (f64, f64),
    p3: (f64, f64),
}

impl Segment {
    #[inline]
    fn point(&self, t: f64) -> (f64, f64) {
        let mt = 1.0 - t;
        let w0 = mt * mt * mt;
        let w1 = 3.0 * mt * mt * t;
        let w2 = 3.0 * mt * t * t;
        let w3 = t * t * t;
        (
            w0 * self.p0.0 + w1 * self.p1.0 + w2 * self.p2.0 + w3 * self.p3.0,
            w0 * self.p0.1 + w1 * self.p1.1 + w2 * self.p2.1 + w3 * self.p3.1,
        )
    }

    fn y_at(&self, x: f64) -> f64 {
        if x <= self.p0.0 {
            return self.p0.1;
        }
        if x >= self.p3.0 {
            return self.p3.1;
        }

        let (mut lo, mut hi) = (0.0f64, 1.0f64);
        let mut t = 0.5;
        for _ in 0..MAX_BISECTION_STEPS {
            t = 0.5 * (lo + hi);
            let (bx, _) = self.point(t);
            if (bx - x).abs() < X_TOLERANCE {
                break;
            }
            if bx < x {
                lo = t;
            } else {
                hi = t;
            }
        }
        self.point(t).1
    }
}

/// Prepared Bézier chain.
#[derive(Debug, Clone)]
pub struct BezierChain {
    knots: Vec<f64>,
    segments: Vec<Segment>,
}

impl BezierChain {
    pub fn fit(points: &[ControlPoint]) -> CurveResult<Self> {
        let n = points.len();
        if n < 2 {
            return Err(CurveError::InvalidCurve(format!(
                "bezier needs at least 2 points, got {}",
                n
            )));
        }

        let anchors: Vec<(f64, f64)> = points.iter().map(|p| (p.x as f64, p.y as f64)).collect();
        if anchors.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(CurveError::InvalidCurve(
                "bezier anchors must be strictly increasing in x".to_string(),
            ));
        }

        let tangents = catmull_rom_tangents(&anchors);
        let segments = anchors
            .windows(2)
            .zip(tangents.windows(2))
            .map(|(a, m)| {
                if n == 2 {
                    straight_segment(a[0], a[1])
                } else {
                    handle_segment(a[0], a[1], m[0], m[1])
                }
            })
            .collect();

        Ok(Self {
            knots: anchors.iter().map(|a| a.0).collect(),
            segments,
        })
    }

    /// Evaluate with flat extrapolation outside the anchor range.
    pub fn eval(&self, x: f64) -> f64 {
        let first = &self.segments[0];
        let last = &self.segments[self.segments.len() - 1];
        if x <= first.p0.0 {
            return first.p0.1;
        }
        if x >= last.p3.0 {
            return last.p3.1;
        }
        self.segments[segment_index(&self.knots, x)].y_at(x)
    }
}

/// Handles on the chord, which degrades the segment to a straight line.
fn straight_segment(a: (f64, f64), b: (f64, f64)) -> Segment {
    let lerp = |t: f64| (a.0 + (b.0 - a.0) * t, a.1 + (b.1 - a.1) * t);
    Segment {
        p0: a,
        p1: lerp(1.0 / 3.0),
        p2: lerp(2.0 / 3.0),
        p3: b,
    }
}

fn handle_segment(a: (f64, f64), b: (f64, f64), ma: f64, mb: f64) -> Segment {
    let chord = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
    let len = chord / 3.0;

    let offset = |m: f64| {
        let norm = (1.0 + m * m).sqrt();
        (len / norm, len * m / norm)
    };
    let (dxa, dya) = offset(ma);
    let (dxb, dyb) = offset(mb);

    let mut p1 = (a.0 + dxa, a.1 + dya);
    let mut p2 = (b.0 - dxb, b.1 - dyb);

    // Monotonize x: a.x <= p1.x <= p2.x <= b.x
    p1.0 = p1.0.clamp(a.0, b.0);
    p2.0 = p2.0.clamp(a.0, b.0);
    if p1.0 > p2.0 {
        let mid = 0.5 * (p1.0 + p2.0);
        p1.0 = mid;
        p2.0 = mid;
    }

    Segment { p0: a, p1, p2, p3: b }
}

/// Catmull-Rom tangents; end tangents use the adjacent secant.
fn catmull_rom_tangents(anchors: &[(f64, f64)]) -> Vec<f64> {
    let n = anchors.len();
    let secant = |i: usize, j: usize| (anchors[j].1 - anchors[i].1) / (anchors[j].0 - anchors[i].0);
    (0..n)
        .map(|i| {
            if i == 0 {
                secant(0, 1)
            } else if i == n - 1 {
                secant(n - 2, n - 1)
            } else {
                secant(i - 1, i + 1)
            }
        })
        .collect()
}
