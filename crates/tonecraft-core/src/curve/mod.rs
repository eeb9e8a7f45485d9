//! Tone curve model.
//!
//! A [`Curve`] is validated and canonicalized once at construction and is
//! read-only afterwards. Control points are clamped to [0, 1], sorted by x,
//! and duplicates by x collapse to the point supplied last.

mod bezier;
mod evaluate;
mod spline;

pub use bezier::X_TOLERANCE;
pub use evaluate::{evaluate, CurveEvaluator};

use serde::{Deserialize, Serialize};

use crate::{ChannelScope, ControlPoint, CurveError, CurveResult, CurveType};

/// Maximum number of control points in a curve.
pub const MAX_CURVE_POINTS: usize = 64;

/// LUT resolution used when none is given.
pub const DEFAULT_LUT_SIZE: usize = 4096;

/// Smallest allowed LUT resolution.
pub const MIN_LUT_SIZE: usize = 2;

/// Largest allowed LUT resolution.
pub const MAX_LUT_SIZE: usize = 65536;

/// Immutable tone curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CurveSpec", into = "CurveSpec")]
pub struct Curve {
    points: Vec<ControlPoint>,
    curve_type: CurveType,
    scope: ChannelScope,
    gamma: f32,
    black_point: f32,
    white_point: f32,
    lut_size: usize,
}

/// Unvalidated curve description, as found in presets and host payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveSpec {
    pub points: Vec<ControlPoint>,
    pub curve_type: CurveType,
    pub scope: ChannelScope,
    pub gamma: f32,
    pub black_point: f32,
    pub white_point: f32,
    pub lut_size: usize,
}

impl Default for CurveSpec {
    fn default() -> Self {
        Self {
            points: vec![ControlPoint::new(0.0, 0.0), ControlPoint::new(1.0, 1.0)],
            curve_type: CurveType::default(),
            scope: ChannelScope::default(),
            gamma: 1.0,
            black_point: 0.0,
            white_point: 1.0,
            lut_size: DEFAULT_LUT_SIZE,
        }
    }
}

impl TryFrom<CurveSpec> for Curve {
    type Error = CurveError;

    fn try_from(spec: CurveSpec) -> CurveResult<Self> {
        validate_gamma(spec.gamma)?;
        validate_levels(spec.black_point, spec.white_point)?;
        validate_lut_size(spec.lut_size)?;
        let points = canonicalize_points(&spec.points, spec.curve_type)?;
        Ok(Self {
            points,
            curve_type: spec.curve_type,
            scope: spec.scope,
            gamma: spec.gamma,
            black_point: spec.black_point,
            white_point: spec.white_point,
            lut_size: spec.lut_size,
        })
    }
}

impl From<Curve> for CurveSpec {
    fn from(curve: Curve) -> Self {
        Self {
            points: curve.points,
            curve_type: curve.curve_type,
            scope: curve.scope,
            gamma: curve.gamma,
            black_point: curve.black_point,
            white_point: curve.white_point,
            lut_size: curve.lut_size,
        }
    }
}

impl Curve {
    /// Create a curve from control points with default shaping parameters
    /// (RGB scope, gamma 1, levels 0..1, LUT size 4096).
    ///
    /// # Errors
    /// `InvalidParams` for non-finite points, more than 64 points, or fewer
    /// than 2 distinct points on a point-based curve type.
    pub fn new(points: &[ControlPoint], curve_type: CurveType) -> CurveResult<Self> {
        CurveSpec {
            points: points.to_vec(),
            curve_type,
            ..CurveSpec::default()
        }
        .try_into()
    }

    /// Identity curve: linear through (0,0) and (1,1).
    pub fn linear() -> Self {
        Self {
            points: vec![ControlPoint::new(0.0, 0.0), ControlPoint::new(1.0, 1.0)],
            curve_type: CurveType::Linear,
            scope: ChannelScope::Rgb,
            gamma: 1.0,
            black_point: 0.0,
            white_point: 1.0,
            lut_size: DEFAULT_LUT_SIZE,
        }
    }

    /// Gamma curve with black and white points.
    pub fn parametric(gamma: f32, black_point: f32, white_point: f32) -> CurveResult<Self> {
        CurveSpec {
            points: Vec::new(),
            curve_type: CurveType::Parametric,
            gamma,
            black_point,
            white_point,
            ..CurveSpec::default()
        }
        .try_into()
    }

    /// Symmetric contrast S-curve. `strength` is clamped to [0, 1].
    pub fn s_curve(strength: f32) -> CurveResult<Self> {
        if !strength.is_finite() {
            return Err(CurveError::InvalidParams(
                "s-curve strength must be finite".to_string(),
            ));
        }
        let s = strength.clamp(0.0, 1.0) * 0.1;
        Self::new(
            &[
                ControlPoint::new(0.0, 0.0),
                ControlPoint::new(0.25, 0.25 - s),
                ControlPoint::new(0.5, 0.5),
                ControlPoint::new(0.75, 0.75 + s),
                ControlPoint::new(1.0, 1.0),
            ],
            CurveType::CubicSpline,
        )
    }

    /// Film response curve from the built-in profile table.
    pub fn film(name: &str) -> CurveResult<Self> {
        crate::suggest::film::film_curve(name)
    }

    /// Bind the curve to a different channel scope.
    pub fn with_scope(mut self, scope: ChannelScope) -> Self {
        self.scope = scope;
        self
    }

    /// Change the LUT resolution.
    pub fn with_lut_size(mut self, lut_size: usize) -> CurveResult<Self> {
        validate_lut_size(lut_size)?;
        self.lut_size = lut_size;
        Ok(self)
    }

    /// Change the black and white points used by parametric curves.
    pub fn with_levels(mut self, black_point: f32, white_point: f32) -> CurveResult<Self> {
        validate_levels(black_point, white_point)?;
        self.black_point = black_point;
        self.white_point = white_point;
        Ok(self)
    }

    /// Same points and parameters under a different curve type.
    pub fn with_type(self, curve_type: CurveType) -> CurveResult<Self> {
        let mut spec = CurveSpec::from(self);
        spec.curve_type = curve_type;
        spec.try_into()
    }

    pub fn points(&self) -> &[ControlPoint] {
        &self.points
    }

    pub fn curve_type(&self) -> CurveType {
        self.curve_type
    }

    pub fn scope(&self) -> ChannelScope {
        self.scope
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn black_point(&self) -> f32 {
        self.black_point
    }

    pub fn white_point(&self) -> f32 {
        self.white_point
    }

    pub fn lut_size(&self) -> usize {
        self.lut_size
    }

    /// Check if the curve maps every input to itself.
    pub fn is_identity(&self) -> bool {
        match self.curve_type {
            CurveType::Parametric => {
                self.gamma == 1.0 && self.black_point == 0.0 && self.white_point == 1.0
            }
            _ => {
                self.points.len() == 2
                    && self.points[0] == ControlPoint::new(0.0, 0.0)
                    && self.points[1] == ControlPoint::new(1.0, 1.0)
            }
        }
    }

    /// Evaluate at a single `x`; see [`evaluate`].
    pub fn evaluate(&self, x: f32) -> CurveResult<f32> {
        evaluate(self, x)
    }

    /// Exact bit pattern of everything that influences the LUT.
    pub(crate) fn cache_key(&self, lut_size: usize) -> Vec<u32> {
        let mut key = Vec::with_capacity(6 + self.points.len() * 2);
        key.push(self.curve_type.code() as u32);
        key.push(self.gamma.to_bits());
        key.push(self.black_point.to_bits());
        key.push(self.white_point.to_bits());
        key.push(lut_size as u32);
        key.push(self.points.len() as u32);
        for p in &self.points {
            key.push(p.x.to_bits());
            key.push(p.y.to_bits());
        }
        key
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::linear()
    }
}

/// Clamp, sort and de-duplicate control points.
///
/// Points with equal x keep the one that appeared last in `points`.
pub fn canonicalize_points(
    points: &[ControlPoint],
    curve_type: CurveType,
) -> CurveResult<Vec<ControlPoint>> {
    if points.len() > MAX_CURVE_POINTS {
        return Err(CurveError::InvalidParams(format!(
            "at most {} control points allowed, got {}",
            MAX_CURVE_POINTS,
            points.len()
        )));
    }
    if let Some(bad) = points.iter().find(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(CurveError::InvalidParams(format!(
            "non-finite control point ({}, {})",
            bad.x, bad.y
        )));
    }

    let mut sorted: Vec<ControlPoint> = points
        .iter()
        .map(|p| ControlPoint::new(p.x.clamp(0.0, 1.0), p.y.clamp(0.0, 1.0)))
        .collect();
    // Stable: equal x keep input order, so the last of a run is the latest
    sorted.sort_by(|a, b| a.x.total_cmp(&b.x));

    let mut canonical: Vec<ControlPoint> = Vec::with_capacity(sorted.len());
    for p in sorted {
        match canonical.last_mut() {
            Some(last) if last.x == p.x => *last = p,
            _ => canonical.push(p),
        }
    }

    if curve_type.uses_points() && canonical.len() < 2 {
        return Err(CurveError::InvalidParams(format!(
            "{:?} curve needs at least 2 distinct control points, got {}",
            curve_type,
            canonical.len()
        )));
    }

    Ok(canonical)
}

fn validate_gamma(gamma: f32) -> CurveResult<()> {
    if gamma.is_finite() && gamma > 0.0 {
        Ok(())
    } else {
        Err(CurveError::InvalidParams(format!(
            "gamma must be positive, got {}",
            gamma
        )))
    }
}

fn validate_levels(black_point: f32, white_point: f32) -> CurveResult<()> {
    if !black_point.is_finite() || !white_point.is_finite() {
        return Err(CurveError::InvalidParams(
            "black and white points must be finite".to_string(),
        ));
    }
    if black_point > white_point {
        return Err(CurveError::InvalidParams(format!(
            "black point {} above white point {}",
            black_point, white_point
        )));
    }
    Ok(())
}

pub(crate) fn validate_lut_size(lut_size: usize) -> CurveResult<()> {
    if (MIN_LUT_SIZE..=MAX_LUT_SIZE).contains(&lut_size) {
        Ok(())
    } else {
        Err(CurveError::InvalidParams(format!(
            "lut size must be in [{}, {}], got {}",
            MIN_LUT_SIZE, MAX_LUT_SIZE, lut_size
        )))
    }
}
