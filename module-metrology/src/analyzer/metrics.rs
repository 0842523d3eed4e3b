//! Metrics Engine
//!
//! Turns a parsed report into the derived quantities that are uploaded and
//! checked against tolerances:
//!
//! - in-plane position deviations of hybrid and powerboard fiducials (µm)
//! - capacitor package heights (µm)
//! - hybrid and powerboard glue thickness (µm), measured height minus flex thickness
//! - shield box height (µm), the highest shield point
//!
//! All derived values are truncated toward zero, never rounded. Corrected Z
//! readings are first truncated to `z_decimals` (mm) so that floating noise
//! from the tilt fit does not leak into the µm values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::analyzer::classifier::{PatternError, PointCategory, PointClassifier};
use crate::analyzer::numeric::{mean, mm_to_um, truncate};
use crate::config::SiteConfig;
use crate::geometry::{PointGroups, TiltCorrector, TiltError};
use crate::parser::reference::{ReferenceError, ReferenceTable};
use crate::parser::report::{ParsedReport, PositionReading};

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("Tilt correction failed: {0}")]
    Tilt(#[from] TiltError),
}

/// Measured minus nominal position, µm. Serialized as `[dx, dy]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Deviation {
    pub dx: f64,
    pub dy: f64,
}

impl From<[f64; 2]> for Deviation {
    fn from([dx, dy]: [f64; 2]) -> Self {
        Self { dx, dy }
    }
}

impl From<Deviation> for [f64; 2] {
    fn from(d: Deviation) -> Self {
        [d.dx, d.dy]
    }
}

impl fmt::Display for Deviation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.dx, self.dy)
    }
}

/// Derived values for one report. Empty maps mean no matching points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub hybrid_positions: BTreeMap<String, Deviation>,
    pub pb_positions: BTreeMap<String, Deviation>,
    pub cap_heights: BTreeMap<String, f64>,
    pub hybrid_glue: BTreeMap<String, f64>,
    pub pb_glue: BTreeMap<String, f64>,
    pub shield_height: Option<f64>,
    /// Point groups that matched no category.
    pub unclassified: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionMetrics {
    pub hybrid: BTreeMap<String, Deviation>,
    pub powerboard: BTreeMap<String, Deviation>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeightMetrics {
    pub cap_heights: BTreeMap<String, f64>,
    pub hybrid_glue: BTreeMap<String, f64>,
    pub pb_glue: BTreeMap<String, f64>,
    pub shield_height: Option<f64>,
    pub unclassified: Vec<String>,
}

pub struct MetricsEngine {
    classifier: PointClassifier,
    hybrid_marker: String,
    hybrid_flex_thickness: f64,
    pb_flex_thickness: f64,
    decimals: u32,
    z_decimals: u32,
}

impl MetricsEngine {
    pub fn from_config(config: &SiteConfig) -> Result<Self, PatternError> {
        Ok(Self {
            classifier: PointClassifier::from_config(&config.classifier)?,
            hybrid_marker: config.hybrid_marker.clone(),
            hybrid_flex_thickness: config.hybrid_flex_thickness,
            pb_flex_thickness: config.pb_flex_thickness,
            decimals: config.decimals,
            z_decimals: config.z_decimals,
        })
    }

    /// Run the full computation: deviations, tilt correction, heights.
    ///
    /// Every position name is resolved against `table` before anything else
    /// is computed, so an unknown point aborts with no partial result.
    pub fn compute(
        &self,
        report: &ParsedReport,
        table: &ReferenceTable,
        corrector: &dyn TiltCorrector,
    ) -> Result<Metrics, MetricsError> {
        let positions = self.deviations(&report.positions, table)?;
        let corrected = corrector.correct(&report.raw_points)?;
        let heights = self.heights(&corrected);

        Ok(Metrics {
            hybrid_positions: positions.hybrid,
            pb_positions: positions.powerboard,
            cap_heights: heights.cap_heights,
            hybrid_glue: heights.hybrid_glue,
            pb_glue: heights.pb_glue,
            shield_height: heights.shield_height,
            unclassified: heights.unclassified,
        })
    }

    pub fn deviations(
        &self,
        readings: &[PositionReading],
        table: &ReferenceTable,
    ) -> Result<PositionMetrics, ReferenceError> {
        let mut metrics = PositionMetrics::default();

        for reading in readings {
            let expected = table.lookup(&reading.name, reading.line)?;
            let deviation = Deviation {
                dx: truncate(mm_to_um(reading.x - expected.x), self.decimals),
                dy: truncate(mm_to_um(reading.y - expected.y), self.decimals),
            };

            if reading.name.contains(self.hybrid_marker.as_str()) {
                metrics.hybrid.insert(reading.name.clone(), deviation);
            } else {
                metrics.powerboard.insert(reading.name.clone(), deviation);
            }
        }

        tracing::debug!(
            "Computed {} hybrid and {} powerboard deviations",
            metrics.hybrid.len(),
            metrics.powerboard.len()
        );
        Ok(metrics)
    }

    /// Heights and glue thickness from tilt-corrected groups.
    pub fn heights(&self, corrected: &PointGroups) -> HeightMetrics {
        let mut metrics = HeightMetrics::default();
        let mut shield_max: Option<f64> = None;

        for (name, points) in corrected.iter() {
            if points.is_empty() {
                continue;
            }
            let z: Vec<f64> = points
                .iter()
                .map(|p| truncate(p.z, self.z_decimals))
                .collect();

            match self.classifier.classify(name) {
                Some(PointCategory::Capacitor) => {
                    if let Some(height) = mean(&z) {
                        metrics
                            .cap_heights
                            .insert(name.to_string(), truncate(mm_to_um(height), self.decimals));
                    }
                }
                Some(PointCategory::HybridGlue) => {
                    metrics.hybrid_glue.insert(
                        name.to_string(),
                        self.glue_thickness(&z, self.hybrid_flex_thickness),
                    );
                }
                Some(PointCategory::PowerboardGlue) => {
                    metrics.pb_glue.insert(
                        name.to_string(),
                        self.glue_thickness(&z, self.pb_flex_thickness),
                    );
                }
                Some(PointCategory::Shield) => {
                    let group_max = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                    shield_max = Some(shield_max.map_or(group_max, |m| m.max(group_max)));
                }
                None => {
                    tracing::debug!("Point group '{}' matches no category", name);
                    metrics.unclassified.push(name.to_string());
                }
            }
        }

        metrics.shield_height = shield_max.map(|z| truncate(mm_to_um(z), self.decimals));
        metrics
    }

    /// The flex thickness is subtracted from every reading before averaging.
    fn glue_thickness(&self, z: &[f64], flex_thickness: f64) -> f64 {
        let total: f64 = z.iter().map(|&v| mm_to_um(v) - flex_thickness).sum();
        truncate(total / z.len() as f64, self.decimals)
    }
}
