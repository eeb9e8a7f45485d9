//! Row-band partitioning over rayon, with cooperative cancellation.
//!
//! Images are split into bands of [`BAND_ROWS`] consecutive rows. Bands never
//! share output bytes, so they run without locking. Images shorter than
//! [`PARALLEL_THRESHOLD_ROWS`] are processed on the calling thread with the
//! same banding, which keeps results identical between the two paths.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::buffer::PixelViewMut;
use crate::{CurveError, CurveResult};

/// Images with fewer rows than this run sequentially.
pub const PARALLEL_THRESHOLD_ROWS: u32 = 64;

/// Rows per band; cancellation is checked between bands.
pub const BAND_ROWS: u32 = 16;

/// Shared flag that asks a running pass to stop.
///
/// Checked before each band starts, never mid-row. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag so the token can be reused.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

#[inline]
pub(crate) fn check_cancel(cancel: Option<&CancelToken>) -> CurveResult<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(CurveError::Cancelled),
        _ => Ok(()),
    }
}

fn band_count(height: u32) -> u32 {
    height.div_ceil(BAND_ROWS)
}

fn band_rows(band: u32, height: u32) -> Range<u32> {
    let start = band * BAND_ROWS;
    start..(start + BAND_ROWS).min(height)
}

/// Run `f(rows, band_data)` over every band of `out`.
///
/// `band_data` starts at the first byte of the band's first row; row `y` of
/// the band sits at `(y - rows.start) * row_stride`.
pub(crate) fn for_each_band_mut<F>(
    out: &mut PixelViewMut<'_>,
    cancel: Option<&CancelToken>,
    f: F,
) -> CurveResult<()>
where
    F: Fn(Range<u32>, &mut [u8]) -> CurveResult<()> + Sync,
{
    let height = out.geometry().height;
    let chunk_len = out.geometry().row_stride.saturating_mul(BAND_ROWS as usize);
    let data = out.rows_data_mut();

    let run = |(band, chunk): (usize, &mut [u8])| -> CurveResult<()> {
        check_cancel(cancel)?;
        f(band_rows(band as u32, height), chunk)
    };

    if height >= PARALLEL_THRESHOLD_ROWS {
        data.par_chunks_mut(chunk_len).enumerate().try_for_each(run)
    } else {
        data.chunks_mut(chunk_len).enumerate().try_for_each(run)
    }
}

/// Fold each band to a partial result, then combine partials in band order.
///
/// Partials are reduced sequentially, so floating-point sums come out the
/// same whether the bands ran in parallel or not.
pub(crate) fn fold_bands<A, I, F, R>(
    height: u32,
    cancel: Option<&CancelToken>,
    init: I,
    fold: F,
    reduce: R,
) -> CurveResult<A>
where
    A: Send,
    I: Fn() -> A,
    F: Fn(Range<u32>) -> A + Sync,
    R: Fn(A, A) -> A,
{
    let run = |band: u32| -> CurveResult<A> {
        check_cancel(cancel)?;
        Ok(fold(band_rows(band, height)))
    };

    let partials: Vec<A> = if height >= PARALLEL_THRESHOLD_ROWS {
        (0..band_count(height))
            .into_par_iter()
            .map(run)
            .collect::<CurveResult<Vec<A>>>()?
    } else {
        (0..band_count(height))
            .map(run)
            .collect::<CurveResult<Vec<A>>>()?
    };

    Ok(partials.into_iter().fold(init(), reduce))
}
