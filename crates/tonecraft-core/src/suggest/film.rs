//! Built-in film response profiles.
//!
//! Each profile is a fixed set of tone control points. Lookup by name is
//! case-insensitive; unknown names are an error.

use crate::{ControlPoint, Curve, CurveError, CurveResult, CurveType};

/// Named film response curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilmProfile {
    pub name: &'static str,
    pub manufacturer: &'static str,
    points: &'static [(f32, f32)],
}

impl FilmProfile {
    pub fn control_points(&self) -> Vec<ControlPoint> {
        self.points.iter().map(|&p| p.into()).collect()
    }

    /// The profile as a curve of the given type.
    pub fn curve(&self, curve_type: CurveType) -> CurveResult<Curve> {
        Curve::new(&self.control_points(), curve_type)
    }
}

const PROFILES: &[FilmProfile] = &[
    FilmProfile {
        name: "kodak",
        manufacturer: "Kodak",
        // Warm, lifted blacks, soft shoulder
        points: &[(0.0, 0.03), (0.2, 0.16), (0.5, 0.52), (0.8, 0.86), (1.0, 0.97)],
    },
    FilmProfile {
        name: "fuji",
        manufacturer: "Fujifilm",
        points: &[(0.0, 0.02), (0.25, 0.19), (0.5, 0.5), (0.75, 0.82), (1.0, 0.98)],
    },
    FilmProfile {
        name: "leica",
        manufacturer: "Leica",
        // Deep blacks, strong midtone contrast
        points: &[(0.0, 0.0), (0.2, 0.14), (0.5, 0.5), (0.8, 0.88), (1.0, 1.0)],
    },
    FilmProfile {
        name: "ilford",
        manufacturer: "Ilford",
        points: &[(0.0, 0.05), (0.3, 0.24), (0.5, 0.5), (0.7, 0.77), (1.0, 0.95)],
    },
    FilmProfile {
        name: "agfa",
        manufacturer: "Agfa",
        points: &[(0.0, 0.04), (0.25, 0.22), (0.5, 0.49), (0.75, 0.79), (1.0, 0.96)],
    },
];

/// Look up a profile by name, ignoring case and surrounding whitespace.
pub fn film_profile(name: &str) -> CurveResult<&'static FilmProfile> {
    let key = name.trim();
    PROFILES
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(key))
        .ok_or_else(|| CurveError::UnknownFilmProfile(name.to_string()))
}

/// Names of all built-in profiles.
pub fn film_profile_names() -> Vec<&'static str> {
    PROFILES.iter().map(|p| p.name).collect()
}

/// Film profile as a cubic spline curve.
pub fn film_curve(name: &str) -> CurveResult<Curve> {
    film_profile(name)?.curve(CurveType::CubicSpline)
}
