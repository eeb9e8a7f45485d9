//! Error types shared by every curve, LUT and pixel operation.

use thiserror::Error;

/// Error types for curve processing operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurveError {
    /// Out-of-range point count, malformed geometry or a bad option value.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The curve cannot be evaluated (e.g. a spline with fewer than 2 points).
    #[error("Invalid curve: {0}")]
    InvalidCurve(String),

    /// Operation invoked before `initialize` or after `cleanup`.
    #[error("Curve engine is not initialized")]
    NotInitialized,

    /// Sample format / channel combination not handled.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Acceleration was demanded but no accelerator is present.
    #[error("Accelerator not available")]
    AcceleratorUnavailable,

    /// Allocation failure for a LUT or output buffer.
    #[error("Out of memory")]
    OutOfMemory,

    /// A full-image pass observed a cancellation request between bands.
    #[error("Operation cancelled")]
    Cancelled,

    /// Film emulation requested with a profile name that is not in the table.
    #[error("Unknown film profile: {0}")]
    UnknownFilmProfile(String),
}

impl CurveError {
    /// Integer result code used by the host plugin interface.
    pub fn code(&self) -> i32 {
        match self {
            CurveError::InvalidParams(_)
            | CurveError::InvalidCurve(_)
            | CurveError::UnknownFilmProfile(_) => -1,
            CurveError::OutOfMemory => -2,
            CurveError::NotInitialized => -3,
            CurveError::AcceleratorUnavailable => -4,
            CurveError::UnsupportedFormat(_) => -6,
            CurveError::Cancelled => -7,
        }
    }
}

/// Result type for curve processing operations.
pub type CurveResult<T> = Result<T, CurveError>;

/// Allocate a zeroed vector, reporting allocation failure instead of aborting.
pub(crate) fn try_alloc<T: Clone + Default>(len: usize) -> CurveResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len).map_err(|_| CurveError::OutOfMemory)?;
    v.resize(len, T::default());
    Ok(v)
}
