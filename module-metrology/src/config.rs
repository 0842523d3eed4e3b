//! Site configuration
//!
//! Thickness constants and tolerance bands differ between assembly sites
//! (barrel vs. endcap flexes, shield box clearances). A deployment overrides
//! them with a JSON file; every field has a default so the file only needs
//! to name what changes.
//!
//! ```json
//! {
//!   "institute": "SCIPP",
//!   "site_type": "BARREL",
//!   "hybrid_flex_thickness": 235.0,
//!   "max_shield_height": 5650.0
//! }
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A (min, max) band. Checks against it exclude both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Strictly inside the band.
    pub fn contains_open(&self, value: f64) -> bool {
        self.min < value && value < self.max
    }
}

/// Regex patterns used to sort measured point groups into categories.
///
/// Patterns are unanchored searches, so `C[1-8]` matches `CAP_C3` as well as
/// `C3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub capacitor: String,
    pub hybrid_glue: String,
    pub pb_glue: String,
    pub shield: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            capacitor: "C[1-8]".to_string(),
            hybrid_glue: "_R[0-5]H[0-1]_[0-9]+".to_string(),
            pb_glue: "PB_[0-5]".to_string(),
            shield: "Shield".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiltConfig {
    /// Raw groups whose name matches this pattern define the measurement plane.
    pub reference_pattern: String,
}

impl Default for TiltConfig {
    fn default() -> Self {
        Self {
            reference_pattern: "Sensor".to_string(),
        }
    }
}

/// Per-site constants. Lengths are in µm unless stated otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub institute: String,
    pub instrument: String,
    pub site_type: String,
    pub program_version: String,
    pub hybrid_flex_thickness: f64,
    pub pb_flex_thickness: f64,
    pub max_shield_height: f64,
    pub x_limit: f64,
    pub y_limit: f64,
    pub glue_range: Range,
    /// Truncation precision for derived values.
    pub decimals: u32,
    /// Truncation precision for corrected Z readings (mm) before aggregation.
    pub z_decimals: u32,
    /// Deviation points whose name contains this marker belong to a hybrid.
    pub hybrid_marker: String,
    /// Directory holding `<MODULE_TYPE>_positions.csv` reference tables.
    pub positions_dir: PathBuf,
    pub classifier: ClassifierConfig,
    pub tilt: TiltConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            institute: "TRIUMF".to_string(),
            instrument: "Mitutoyo CMM".to_string(),
            site_type: "EC".to_string(),
            program_version: "v1".to_string(),
            hybrid_flex_thickness: 250.0,
            pb_flex_thickness: 270.0,
            max_shield_height: 5710.0,
            x_limit: 100.0,
            y_limit: 300.0,
            glue_range: Range::new(80.0, 160.0),
            decimals: 2,
            z_decimals: 4,
            hybrid_marker: "H".to_string(),
            positions_dir: PathBuf::from("metrology_position_files"),
            classifier: ClassifierConfig::default(),
            tilt: TiltConfig::default(),
        }
    }
}

impl SiteConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json_str(&content)?;
        tracing::debug!("Loaded site configuration for {} from {:?}", config.institute, path);
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SiteConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.glue_range.min < self.glue_range.max) {
            return Err(ConfigError::Invalid(format!(
                "glue_range min ({}) must be below max ({})",
                self.glue_range.min, self.glue_range.max
            )));
        }
        if self.x_limit <= 0.0 || self.y_limit <= 0.0 {
            return Err(ConfigError::Invalid(
                "x_limit and y_limit must be positive".to_string(),
            ));
        }
        if self.max_shield_height <= 0.0 {
            return Err(ConfigError::Invalid(
                "max_shield_height must be positive".to_string(),
            ));
        }
        // 10^d must stay exact in f64
        if self.decimals > 15 || self.z_decimals > 15 {
            return Err(ConfigError::Invalid(
                "decimals and z_decimals must be at most 15".to_string(),
            ));
        }
        if self.hybrid_marker.is_empty() {
            return Err(ConfigError::Invalid("hybrid_marker must not be empty".to_string()));
        }
        let patterns = [
            ("capacitor", &self.classifier.capacitor),
            ("hybrid_glue", &self.classifier.hybrid_glue),
            ("pb_glue", &self.classifier.pb_glue),
            ("shield", &self.classifier.shield),
            ("tilt reference", &self.tilt.reference_pattern),
        ];
        for (name, pattern) in patterns {
            if let Err(e) = Regex::new(pattern) {
                return Err(ConfigError::Invalid(format!(
                    "invalid {} pattern '{}': {}",
                    name, pattern, e
                )));
            }
        }
        Ok(())
    }
}
