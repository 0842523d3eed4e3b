//! Point name classification
//!
//! Measurement point groups are named by the CMM program (`C3`, `GT_R0H1_4`,
//! `GT_PB_2`, `Shield_1`, ...). An ordered rule list maps a name to the
//! category it feeds. The first rule that matches wins; names matching no
//! rule (sensor reference points, fiducials) carry no derived quantity.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClassifierConfig;

#[derive(Debug, Error)]
#[error("Invalid {category:?} pattern '{pattern}': {source}")]
pub struct PatternError {
    pub category: PointCategory,
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointCategory {
    Capacitor,
    HybridGlue,
    PowerboardGlue,
    Shield,
}

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub pattern: Regex,
    pub category: PointCategory,
}

#[derive(Debug, Clone)]
pub struct PointClassifier {
    rules: Vec<ClassificationRule>,
}

impl PointClassifier {
    /// Rules in precedence order: capacitor, hybrid glue, powerboard glue, shield.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self, PatternError> {
        let ordered = [
            (PointCategory::Capacitor, &config.capacitor),
            (PointCategory::HybridGlue, &config.hybrid_glue),
            (PointCategory::PowerboardGlue, &config.pb_glue),
            (PointCategory::Shield, &config.shield),
        ];

        let mut rules = Vec::with_capacity(ordered.len());
        for (category, pattern) in ordered {
            let regex = Regex::new(pattern).map_err(|source| PatternError {
                category,
                pattern: pattern.clone(),
                source,
            })?;
            rules.push(ClassificationRule {
                pattern: regex,
                category,
            });
        }
        Ok(Self { rules })
    }

    pub fn classify(&self, name: &str) -> Option<PointCategory> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(name))
            .map(|rule| rule.category)
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }
}

impl Default for PointClassifier {
    fn default() -> Self {
        // Built-in patterns always compile
        Self::from_config(&ClassifierConfig::default()).unwrap_or(Self { rules: Vec::new() })
    }
}
