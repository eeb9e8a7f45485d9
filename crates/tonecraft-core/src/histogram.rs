//! 256-bin luminance histogram over normalized values.
//!
//! Used by the statistics analyzer for black and white level percentiles.
//! Histograms of disjoint row bands merge by adding bins, so a parallel pass
//! gives the same counts as a sequential one.

/// Number of bins.
pub const BINS: usize = 256;

/// Luminance histogram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    pub bins: [u32; BINS],
}

impl Default for Histogram {
    fn default() -> Self {
        Self { bins: [0; BINS] }
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, luminance: f32) {
        self.bins[bin(luminance)] += 1;
    }

    /// Add another histogram's counts into this one.
    pub fn merge(&mut self, other: &Histogram) {
        for (d, s) in self.bins.iter_mut().zip(other.bins.iter()) {
            *d += s;
        }
    }

    /// Number of values binned.
    pub fn total(&self) -> u64 {
        self.bins.iter().map(|&n| n as u64).sum()
    }

    /// Normalized value below which a fraction `p` of the binned values fall.
    ///
    /// Returns the value of the first bin where the cumulative count reaches
    /// `p` of the total, or 0 for an empty histogram.
    pub fn percentile(&self, p: f64) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let target = (p.clamp(0.0, 1.0) * total as f64).max(1.0);
        let mut cumulative = 0u64;
        for (i, &n) in self.bins.iter().enumerate() {
            cumulative += n as u64;
            if cumulative as f64 >= target {
                return i as f32 / (BINS - 1) as f32;
            }
        }
        1.0
    }
}

/// Bin index of a normalized value. Out-of-range values land in the end bins.
#[inline]
fn bin(value: f32) -> usize {
    let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    (v * (BINS - 1) as f32).round() as usize
}
