//! Image statistics analyzer.
//!
//! One pass over the image (or over a fixed grid of every `sample_step`-th
//! row and column) gathers luminance moments, clipping counts, per-channel
//! means and a luminance histogram. Row bands are folded independently and
//! merged in band order, so the result does not depend on thread count.

use serde::{Deserialize, Serialize};

use crate::buffer::{read_sample, PixelView};
use crate::histogram::Histogram;
use crate::luminance::pixel_luminance;
use crate::parallel::{fold_bands, CancelToken};
use crate::{CurveError, CurveResult};

/// Largest possible standard deviation of values in [0, 1].
const MAX_SPREAD: f64 = 0.5;

/// Percentiles used for black and white levels.
const BLACK_LEVEL_PERCENTILE: f64 = 0.005;
const WHITE_LEVEL_PERCENTILE: f64 = 0.995;

/// Analyzer settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Pixels with luminance strictly below this count as shadow-clipped.
    pub shadow_threshold: f32,
    /// Pixels with luminance strictly above this count as highlight-clipped.
    pub highlight_threshold: f32,
    /// Analyze every n-th row and column. 1 analyzes every pixel.
    pub sample_step: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            shadow_threshold: 0.01,
            highlight_threshold: 0.99,
            sample_step: 1,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> CurveResult<()> {
        let in_unit = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_unit(self.shadow_threshold) || !in_unit(self.highlight_threshold) {
            return Err(CurveError::InvalidParams(format!(
                "clip thresholds must be in [0, 1], got {} and {}",
                self.shadow_threshold, self.highlight_threshold
            )));
        }
        if self.shadow_threshold > self.highlight_threshold {
            return Err(CurveError::InvalidParams(format!(
                "shadow threshold {} above highlight threshold {}",
                self.shadow_threshold, self.highlight_threshold
            )));
        }
        if self.sample_step == 0 {
            return Err(CurveError::InvalidParams(
                "sample step must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Aggregate statistics of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageStatistics {
    /// Standard deviation of luminance over its largest possible value, in [0, 1].
    pub contrast_score: f32,
    pub shadow_clip_fraction: f32,
    pub highlight_clip_fraction: f32,
    /// Signed mean of each RGB channel minus the mean luminance.
    pub color_cast: [f32; 3],
    pub mean_luminance: f32,
    /// 0.5th luminance percentile.
    pub black_level: f32,
    /// 99.5th luminance percentile.
    pub white_level: f32,
    pub sampled_pixels: u64,
}

#[derive(Debug, Clone, Default)]
struct Accumulator {
    count: u64,
    sum_lum: f64,
    sum_lum_sq: f64,
    sum_rgb: [f64; 3],
    shadow: u64,
    highlight: u64,
    histogram: Histogram,
}

impl Accumulator {
    fn merge(mut self, other: Accumulator) -> Accumulator {
        self.count += other.count;
        self.sum_lum += other.sum_lum;
        self.sum_lum_sq += other.sum_lum_sq;
        for (a, b) in self.sum_rgb.iter_mut().zip(other.sum_rgb) {
            *a += b;
        }
        self.shadow += other.shadow;
        self.highlight += other.highlight;
        self.histogram.merge(&other.histogram);
        self
    }
}

/// Analyze an image.
///
/// # Errors
/// `InvalidParams` for a bad config, `UnsupportedFormat` for 2-channel
/// images.
pub fn analyze(view: &PixelView<'_>, config: &AnalysisConfig) -> CurveResult<ImageStatistics> {
    analyze_with_cancel(view, config, None)
}

/// [`analyze`] with a cancellation check between row bands.
pub fn analyze_with_cancel(
    view: &PixelView<'_>,
    config: &AnalysisConfig,
    cancel: Option<&CancelToken>,
) -> CurveResult<ImageStatistics> {
    config.validate()?;
    let g = *view.geometry();
    if g.channels == 2 {
        return Err(CurveError::UnsupportedFormat(
            "2-channel images are not supported".to_string(),
        ));
    }

    let channels = g.channels as usize;
    let step = config.sample_step;

    let total = fold_bands(
        g.height,
        cancel,
        Accumulator::default,
        |rows| {
            let mut acc = Accumulator::default();
            let mut px = [0.0f32; 4];
            for y in rows.filter(|y| y % step == 0) {
                let row = view.row(y);
                for x in (0..g.width as usize).step_by(step as usize) {
                    for (c, v) in px[..channels].iter_mut().enumerate() {
                        *v = read_sample(g.format, row, x * channels + c);
                    }
                    let pixel = &px[..channels];
                    let lum = pixel_luminance(pixel);

                    acc.count += 1;
                    acc.sum_lum += lum as f64;
                    acc.sum_lum_sq += (lum as f64) * (lum as f64);
                    for (c, sum) in acc.sum_rgb.iter_mut().enumerate() {
                        *sum += pixel[c.min(channels - 1)] as f64;
                    }
                    if lum < config.shadow_threshold {
                        acc.shadow += 1;
                    }
                    if lum > config.highlight_threshold {
                        acc.highlight += 1;
                    }
                    acc.histogram.add(lum);
                }
            }
            acc
        },
        Accumulator::merge,
    )?;

    let n = total.count.max(1) as f64;
    let mean = total.sum_lum / n;
    let variance = (total.sum_lum_sq / n - mean * mean).max(0.0);
    let contrast = (variance.sqrt() / MAX_SPREAD).clamp(0.0, 1.0);
    let color_cast = total.sum_rgb.map(|sum| (sum / n - mean) as f32);

    let stats = ImageStatistics {
        contrast_score: contrast as f32,
        shadow_clip_fraction: (total.shadow as f64 / n) as f32,
        highlight_clip_fraction: (total.highlight as f64 / n) as f32,
        color_cast,
        mean_luminance: mean as f32,
        black_level: total.histogram.percentile(BLACK_LEVEL_PERCENTILE),
        white_level: total.histogram.percentile(WHITE_LEVEL_PERCENTILE),
        sampled_pixels: total.count,
    };

    tracing::debug!(
        width = g.width,
        height = g.height,
        sampled = stats.sampled_pixels,
        contrast = stats.contrast_score,
        shadow_clip = stats.shadow_clip_fraction,
        highlight_clip = stats.highlight_clip_fraction,
        "analyzed image"
    );

    Ok(stats)
}
