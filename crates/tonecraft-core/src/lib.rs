//! Tonecraft Core - tone curve engine
//!
//! This crate provides curve evaluation, LUT generation and application over
//! pixel buffers, image statistics, and statistics-driven curve suggestions.
//!
//! # Data Flow
//!
//! control points → [`Curve`] → [`Lut`] → [`apply::apply_luts`] → output buffer
//!
//! Independently, an input buffer feeds [`stats::analyze`], whose
//! [`ImageStatistics`] drive [`suggest::synthesize`] to produce new curves.

pub mod apply;
pub mod buffer;
pub mod color;
pub mod curve;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod histogram;
pub mod host;
pub mod luminance;
pub mod lut;
pub mod parallel;
pub mod stats;
pub mod suggest;

pub use apply::{apply_curve, apply_curves, apply_lut, apply_luts, ApplyContext, LutBinding};
pub use buffer::{ImageGeometry, PixelBuffer, PixelView, PixelViewMut, SampleFormat};
pub use curve::{evaluate, Curve, CurveEvaluator, DEFAULT_LUT_SIZE, MAX_CURVE_POINTS};
pub use engine::{
    Accelerator, Engine, EngineOptions, FeatureSettings, PerformanceStats, ProcessingOptions,
};
pub use error::{CurveError, CurveResult};
pub use host::{derive_adjustments, export_points, import_points, BasicAdjustments};
pub use lut::Lut;
pub use parallel::CancelToken;
pub use stats::{analyze, AnalysisConfig, ImageStatistics};
pub use suggest::{synthesize, AiSuggestionParams, Suggestion};

use serde::{Deserialize, Serialize};

/// Get the version of the engine.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Tone curve control point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    /// Input value (0.0 to 1.0)
    pub x: f32,
    /// Output value (0.0 to 1.0)
    pub y: f32,
}

impl ControlPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl From<(f32, f32)> for ControlPoint {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Interpolation family of a curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CurveType {
    /// Piecewise-linear between control points.
    Linear,
    /// Natural cubic spline through all control points.
    #[default]
    CubicSpline,
    /// Chain of cubic Bézier segments between consecutive control points.
    Bezier,
    /// Gamma with black/white points; control points are ignored.
    Parametric,
    /// Produced by the suggestion synthesizer. Evaluated as a cubic spline.
    AiOptimized,
}

impl CurveType {
    /// Whether evaluation of this type depends on the control points.
    #[inline]
    pub fn uses_points(self) -> bool {
        !matches!(self, CurveType::Parametric)
    }

    /// Integer code used by the host plugin interface.
    pub fn code(self) -> i32 {
        match self {
            CurveType::Linear => 0,
            CurveType::CubicSpline => 1,
            CurveType::Bezier => 2,
            CurveType::Parametric => 3,
            CurveType::AiOptimized => 4,
        }
    }
}

impl TryFrom<i32> for CurveType {
    type Error = CurveError;

    fn try_from(value: i32) -> CurveResult<Self> {
        match value {
            0 => Ok(CurveType::Linear),
            1 => Ok(CurveType::CubicSpline),
            2 => Ok(CurveType::Bezier),
            3 => Ok(CurveType::Parametric),
            4 => Ok(CurveType::AiOptimized),
            other => Err(CurveError::InvalidParams(format!(
                "unknown curve type {}",
                other
            ))),
        }
    }
}

/// Which color channel(s) a curve or LUT applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ChannelScope {
    /// Red, green and blue identically.
    #[default]
    Rgb,
    Red,
    Green,
    Blue,
    /// Luminance in a working space supplied by a color transform.
    Luminance,
    LabL,
    LabA,
    LabB,
}

impl ChannelScope {
    /// RGB channel indices this scope remaps directly, or `None` for scopes
    /// that need a working-space transform.
    pub fn rgb_channels(self) -> Option<&'static [usize]> {
        match self {
            ChannelScope::Rgb => Some(&[0, 1, 2]),
            ChannelScope::Red => Some(&[0]),
            ChannelScope::Green => Some(&[1]),
            ChannelScope::Blue => Some(&[2]),
            _ => None,
        }
    }

    /// Whether the scope is looked up in a transformed working space.
    #[inline]
    pub fn needs_transform(self) -> bool {
        self.rgb_channels().is_none()
    }

    /// Component of the working-space triple that the LUT remaps.
    pub fn working_component(self) -> usize {
        match self {
            ChannelScope::LabA | ChannelScope::Green => 1,
            ChannelScope::LabB | ChannelScope::Blue => 2,
            _ => 0,
        }
    }

    /// True if a binding on `self` fully replaces an earlier binding on `other`.
    pub fn covers(self, other: ChannelScope) -> bool {
        self == other
            || (self == ChannelScope::Rgb
                && matches!(
                    other,
                    ChannelScope::Red | ChannelScope::Green | ChannelScope::Blue
                ))
    }

    /// Integer code used by the host plugin interface.
    pub fn code(self) -> i32 {
        match self {
            ChannelScope::Rgb => 0,
            ChannelScope::Red => 1,
            ChannelScope::Green => 2,
            ChannelScope::Blue => 3,
            ChannelScope::Luminance => 4,
            ChannelScope::LabL => 5,
            ChannelScope::LabA => 6,
            ChannelScope::LabB => 7,
        }
    }
}

impl TryFrom<i32> for ChannelScope {
    type Error = CurveError;

    fn try_from(value: i32) -> CurveResult<Self> {
        match value {
            0 => Ok(ChannelScope::Rgb),
            1 => Ok(ChannelScope::Red),
            2 => Ok(ChannelScope::Green),
            3 => Ok(ChannelScope::Blue),
            4 => Ok(ChannelScope::Luminance),
            5 => Ok(ChannelScope::LabL),
            6 => Ok(ChannelScope::LabA),
            7 => Ok(ChannelScope::LabB),
            other => Err(CurveError::InvalidParams(format!(
                "unknown channel scope {}",
                other
            ))),
        }
    }
}
