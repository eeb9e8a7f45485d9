//! Statistics-driven curve suggestions.
//!
//! [`synthesize`] is a deterministic heuristic: image statistics plus user
//! intent ([`AiSuggestionParams`]) produce an S-curve and, optionally,
//! per-channel color balance curves. Any other producer of curves (a learned
//! model, say) can stand in for it as long as it takes the same inputs and
//! returns a [`Suggestion`].

pub mod film;
mod optimize;

pub use film::{film_curve, film_profile, film_profile_names, FilmProfile};
pub use optimize::optimize_curve;

use serde::{Deserialize, Serialize};

use crate::buffer::PixelView;
use crate::stats::{analyze, AnalysisConfig, ImageStatistics};
use crate::{ChannelScope, ControlPoint, Curve, CurveError, CurveResult, CurveType};

/// Largest quarter-point offset, reached with full boost on a flat image.
const MAX_CONTRAST_OFFSET: f32 = 0.12;

/// Endpoint lift/drop per unit of shadow or highlight recovery.
const RECOVERY_STEP: f32 = 0.1;
const MAX_RECOVERY: f32 = 0.2;

/// Minimum vertical gap between an endpoint and its neighbouring quarter point.
const ENDPOINT_GAP: f32 = 0.02;

/// Midpoint outputs of color balance curves stay within this margin.
const BALANCE_MARGIN: f32 = 0.05;

/// User intent for a suggestion. Amounts are in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSuggestionParams {
    pub contrast_boost: f32,
    pub shadow_recovery: f32,
    pub highlight_recovery: f32,
    /// Also emit one curve per RGB channel that cancels the color cast.
    pub auto_color: bool,
    /// Replace the statistics-derived tone curve with a film profile.
    pub film_emulation: bool,
    /// Profile name, required when `film_emulation` is set.
    pub film_profile: Option<String>,
}

impl Default for AiSuggestionParams {
    fn default() -> Self {
        Self {
            contrast_boost: 0.5,
            shadow_recovery: 0.5,
            highlight_recovery: 0.5,
            auto_color: false,
            film_emulation: false,
            film_profile: None,
        }
    }
}

impl AiSuggestionParams {
    pub fn validate(&self) -> CurveResult<()> {
        for (name, v) in [
            ("contrast_boost", self.contrast_boost),
            ("shadow_recovery", self.shadow_recovery),
            ("highlight_recovery", self.highlight_recovery),
        ] {
            if !(v.is_finite() && (0.0..=1.0).contains(&v)) {
                return Err(CurveError::InvalidParams(format!(
                    "{} must be in [0, 1], got {}",
                    name, v
                )));
            }
        }
        if self.film_emulation && self.film_profile.is_none() {
            return Err(CurveError::InvalidParams(
                "film emulation needs a profile name".to_string(),
            ));
        }
        Ok(())
    }
}

/// Curves produced by the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Tone curve bound to all RGB channels.
    pub master: Curve,
    /// Red, green and blue balance curves, empty unless auto color was asked
    /// for. Each carries the master's shape, so applying them after the
    /// master keeps its tone.
    pub channel_curves: Vec<Curve>,
}

impl Suggestion {
    /// All curves in application order: master first.
    pub fn curves(&self) -> Vec<Curve> {
        std::iter::once(self.master.clone())
            .chain(self.channel_curves.iter().cloned())
            .collect()
    }
}

/// Build a suggestion from image statistics.
///
/// Low measured contrast and high `contrast_boost` give a steeper midtone.
/// Shadow recovery lifts the black endpoint and highlight recovery lowers
/// the white endpoint, more so when the image is clipped.
///
/// # Errors
/// `InvalidParams` for out-of-range params or film emulation without a
/// profile name; `UnknownFilmProfile` for an unknown name.
pub fn synthesize(stats: &ImageStatistics, params: &AiSuggestionParams) -> CurveResult<Suggestion> {
    params.validate()?;

    let master_points = match (params.film_emulation, &params.film_profile) {
        (true, Some(name)) => film_profile(name)?.control_points(),
        _ => tone_points(stats, params),
    };
    let master = Curve::new(&master_points, CurveType::AiOptimized)?;

    let channel_curves = if params.auto_color {
        balance_curves(&master, stats)?
    } else {
        Vec::new()
    };

    tracing::debug!(
        contrast = stats.contrast_score,
        boost = params.contrast_boost,
        film = params.film_emulation,
        channel_curves = channel_curves.len(),
        "synthesized curve"
    );

    Ok(Suggestion {
        master,
        channel_curves,
    })
}

/// Analyze an image, then synthesize from its statistics.
pub fn suggest_for_image(
    view: &PixelView<'_>,
    config: &AnalysisConfig,
    params: &AiSuggestionParams,
) -> CurveResult<Suggestion> {
    let stats = analyze(view, config)?;
    synthesize(&stats, params)
}

fn tone_points(stats: &ImageStatistics, params: &AiSuggestionParams) -> Vec<ControlPoint> {
    let score = stats.contrast_score.clamp(0.0, 1.0);
    let shadow_clip = stats.shadow_clip_fraction.clamp(0.0, 1.0);
    let highlight_clip = stats.highlight_clip_fraction.clamp(0.0, 1.0);

    let lift = (RECOVERY_STEP * params.shadow_recovery * (1.0 + shadow_clip)).min(MAX_RECOVERY);
    let drop = RECOVERY_STEP * params.highlight_recovery * (1.0 + highlight_clip);
    let gain = 1.0 - drop.min(MAX_RECOVERY);

    // Quarter points must stay clear of the endpoints
    let offset = (MAX_CONTRAST_OFFSET * params.contrast_boost * (1.0 - score))
        .min(0.25 - ENDPOINT_GAP - lift)
        .min(gain - 0.75 - ENDPOINT_GAP)
        .max(0.0);

    vec![
        ControlPoint::new(0.0, lift),
        ControlPoint::new(0.25, 0.25 - offset),
        ControlPoint::new(0.5, 0.5),
        ControlPoint::new(0.75, 0.75 + offset),
        ControlPoint::new(1.0, gain),
    ]
}

fn balance_curves(master: &Curve, stats: &ImageStatistics) -> CurveResult<Vec<Curve>> {
    let mid = master.evaluate(0.5)?;
    let scopes = [ChannelScope::Red, ChannelScope::Green, ChannelScope::Blue];

    scopes
        .iter()
        .zip(stats.color_cast)
        .map(|(&scope, cast)| {
            let target = (mid - cast).clamp(BALANCE_MARGIN, 1.0 - BALANCE_MARGIN);
            let mut points: Vec<ControlPoint> = master
                .points()
                .iter()
                .copied()
                .filter(|p| p.x != 0.5)
                .collect();
            points.push(ControlPoint::new(0.5, target));
            Ok(Curve::new(&points, CurveType::AiOptimized)?.with_scope(scope))
        })
        .collect()
}
