//! Measurement-plane tilt correction
//!
//! Modules sit on a jig that is never perfectly level with the CMM table, so
//! raw Z readings carry a planar gradient. The plane is fitted to the sensor
//! surface points and its height is removed from every reading, leaving
//! heights relative to the sensor.

use nalgebra::{Matrix3, Vector3};
use regex::Regex;
use thiserror::Error;

use super::{Point3, PointGroups};

#[derive(Debug, Error)]
pub enum TiltError {
    #[error("Tilt correction needs at least 3 reference points matching '{pattern}', found {found}")]
    InsufficientReference { pattern: String, found: usize },
    #[error("Reference points matching '{pattern}' are collinear; no plane can be fitted")]
    Degenerate { pattern: String },
    #[error("Invalid reference pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Removes systematic tilt from raw point groups.
///
/// Implementations must return a group for every input group with the same
/// name and the same number of points in the same order.
pub trait TiltCorrector: Send + Sync {
    fn name(&self) -> &str;
    fn correct(&self, raw: &PointGroups) -> Result<PointGroups, TiltError>;
}

/// Least-squares plane `z = a*x + b*y + c`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Plane {
    pub fn height_at(&self, x: f64, y: f64) -> f64 {
        self.a * x + self.b * y + self.c
    }
}

/// Fits a plane to the groups matching a reference pattern and subtracts it.
///
/// X and Y are left untouched; for the sub-milliradian tilts seen on a CMM
/// table the in-plane shift is far below the CMM resolution.
pub struct PlaneFitCorrector {
    reference: Regex,
}

impl PlaneFitCorrector {
    pub fn new(reference_pattern: &str) -> Result<Self, TiltError> {
        let reference = Regex::new(reference_pattern).map_err(|source| TiltError::Pattern {
            pattern: reference_pattern.to_string(),
            source,
        })?;
        Ok(Self { reference })
    }

    pub fn fit(&self, raw: &PointGroups) -> Result<Plane, TiltError> {
        let reference: Vec<&Point3> = raw
            .iter()
            .filter(|(name, _)| self.reference.is_match(name))
            .flat_map(|(_, points)| points.iter())
            .collect();

        if reference.len() < 3 {
            return Err(TiltError::InsufficientReference {
                pattern: self.reference.as_str().to_string(),
                found: reference.len(),
            });
        }

        // Normal equations of the least-squares system
        let mut ata = Matrix3::<f64>::zeros();
        let mut atz = Vector3::<f64>::zeros();
        for p in &reference {
            let row = Vector3::new(p.x, p.y, 1.0);
            ata += row * row.transpose();
            atz += row * p.z;
        }

        let degenerate = || TiltError::Degenerate {
            pattern: self.reference.as_str().to_string(),
        };

        let scale = ata.norm();
        let lu = ata.lu();
        if lu.determinant().abs() <= f64::EPSILON * scale * scale * scale {
            return Err(degenerate());
        }
        let solution = lu.solve(&atz).ok_or_else(degenerate)?;

        Ok(Plane {
            a: solution[0],
            b: solution[1],
            c: solution[2],
        })
    }
}

impl TiltCorrector for PlaneFitCorrector {
    fn name(&self) -> &str {
        "plane-fit"
    }

    fn correct(&self, raw: &PointGroups) -> Result<PointGroups, TiltError> {
        let plane = self.fit(raw)?;
        tracing::debug!(
            "Fitted measurement plane a={:.6} b={:.6} c={:.6}",
            plane.a,
            plane.b,
            plane.c
        );
        Ok(raw.map_points(|p| Point3::new(p.x, p.y, p.z - plane.height_at(p.x, p.y))))
    }
}

/// Passes readings through unchanged, for data already levelled by the CMM program.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCorrector;

impl TiltCorrector for IdentityCorrector {
    fn name(&self) -> &str {
        "identity"
    }

    fn correct(&self, raw: &PointGroups) -> Result<PointGroups, TiltError> {
        Ok(raw.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tilted(x: f64, y: f64, height: f64) -> Point3 {
        Point3::new(x, y, 0.002 * x - 0.001 * y + 0.5 + height)
    }

    fn sample_groups() -> PointGroups {
        let mut groups = PointGroups::new();
        groups.push("Sensor", tilted(0.0, 0.0, 0.0));
        groups.push("Sensor", tilted(90.0, 0.0, 0.0));
        groups.push("Sensor", tilted(0.0, 90.0, 0.0));
        groups.push("Sensor", tilted(90.0, 90.0, 0.0));
        groups.push("C1", tilted(40.0, 50.0, 0.15));
        groups.push("C1", tilted(41.0, 50.0, 0.15));
        groups
    }

    #[test]
    fn test_plane_fit_recovers_tilt() {
        let corrector = PlaneFitCorrector::new("Sensor").unwrap();
        let plane = corrector.fit(&sample_groups()).unwrap();
        assert!((plane.a - 0.002).abs() < 1e-9);
        assert!((plane.b + 0.001).abs() < 1e-9);
        assert!((plane.c - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_correction_leaves_heights_above_sensor() {
        let corrector = PlaneFitCorrector::new("Sensor").unwrap();
        let corrected = corrector.correct(&sample_groups()).unwrap();

        for p in corrected.get("Sensor").unwrap() {
            assert!(p.z.abs() < 1e-9);
        }
        let caps = corrected.get("C1").unwrap();
        assert_eq!(caps.len(), 2);
        for p in caps {
            assert!((p.z - 0.15).abs() < 1e-9);
        }
        assert_eq!(caps[0].x, 40.0);
        assert_eq!(caps[0].y, 50.0);
    }

    #[test]
    fn test_too_few_reference_points() {
        let mut groups = PointGroups::new();
        groups.push("Sensor", Point3::new(0.0, 0.0, 0.0));
        groups.push("Sensor", Point3::new(1.0, 0.0, 0.0));
        groups.push("C1", Point3::new(0.0, 0.0, 0.1));

        let corrector = PlaneFitCorrector::new("Sensor").unwrap();
        let err = corrector.correct(&groups).unwrap_err();
        assert!(matches!(err, TiltError::InsufficientReference { found: 2, .. }));
    }

    #[test]
    fn test_collinear_reference_points() {
        let mut groups = PointGroups::new();
        for i in 0..4 {
            groups.push("Sensor", Point3::new(i as f64, i as f64, 0.0));
        }

        let corrector = PlaneFitCorrector::new("Sensor").unwrap();
        assert!(matches!(
            corrector.correct(&groups),
            Err(TiltError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            PlaneFitCorrector::new("Sensor("),
            Err(TiltError::Pattern { .. })
        ));
    }

    #[test]
    fn test_identity_passes_through() {
        let groups = sample_groups();
        let corrected = IdentityCorrector.correct(&groups).unwrap();
        assert_eq!(corrected, groups);
    }
}
