//! Tolerance checks
//!
//! Every check runs on every record, even after an earlier one fails, so the
//! operator sees the full list of failures. A category absent from the record
//! passes its check vacuously.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

use crate::config::{Range, SiteConfig};
use crate::record::MetrologyResults;

pub const ALL_PASSED: &str = "All tests passed! Proceed to upload.";
pub const SOME_FAILED: &str = "One or more failures. Upload if you wish.";

/// A failed tolerance check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub check_id: String,
    pub message: String,
    /// Names of the points out of tolerance.
    pub points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    pub issues: Vec<Issue>,
}

impl Verdict {
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(|i| i.message.clone()).collect()
    }

    pub fn summary(&self) -> &'static str {
        if self.passed {
            ALL_PASSED
        } else {
            SOME_FAILED
        }
    }
}

pub trait ToleranceCheck: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    /// Band description for listings, e.g. `|dx| < 100 µm, |dy| < 300 µm`.
    fn describe(&self) -> String;
    /// `None` when the check passes.
    fn check(&self, results: &MetrologyResults) -> Option<Issue>;
}

fn failure(check_id: &str, message: &str, mut points: Vec<String>) -> Issue {
    let mut text = message.to_string();
    if !points.is_empty() {
        points.sort();
        let _ = write!(text, " ({})", points.join(", "));
    }
    Issue {
        check_id: check_id.to_string(),
        message: text,
        points,
    }
}

/// Every hybrid and powerboard deviation must satisfy `|dx| < x_limit` and `|dy| < y_limit`.
pub struct PositionCheck {
    pub x_limit: f64,
    pub y_limit: f64,
}

impl ToleranceCheck for PositionCheck {
    fn id(&self) -> &str {
        "position"
    }

    fn name(&self) -> &str {
        "Hybrid and powerboard position"
    }

    fn describe(&self) -> String {
        format!("|dx| < {} µm, |dy| < {} µm", self.x_limit, self.y_limit)
    }

    fn check(&self, results: &MetrologyResults) -> Option<Issue> {
        let offenders: Vec<String> = [&results.hybrid_position, &results.pb_position]
            .into_iter()
            .flatten()
            .flat_map(|category| category.iter())
            .filter(|(_, d)| !(d.dx.abs() < self.x_limit && d.dy.abs() < self.y_limit))
            .map(|(name, _)| name.clone())
            .collect();

        if offenders.is_empty() {
            None
        } else {
            Some(failure(
                self.id(),
                "Failure - Position exceeds tolerance in one or more dimensions.",
                offenders,
            ))
        }
    }
}

type GlueSelector = fn(&MetrologyResults) -> Option<&BTreeMap<String, f64>>;

/// Every glue thickness in the selected category must lie strictly inside the range.
pub struct GlueThicknessCheck {
    id: &'static str,
    name: &'static str,
    message: &'static str,
    range: Range,
    select: GlueSelector,
}

impl GlueThicknessCheck {
    pub fn hybrid(range: Range) -> Self {
        Self {
            id: "hybrid_glue_thickness",
            name: "Hybrid glue thickness",
            message: "Failure - Hybrid glue thickness exceeds tolerance.",
            range,
            select: |r| r.hybrid_glue_thickness.as_ref(),
        }
    }

    pub fn powerboard(range: Range) -> Self {
        Self {
            id: "pb_glue_thickness",
            name: "Powerboard glue thickness",
            message: "Failure - PB glue thickness exceeds tolerance.",
            range,
            select: |r| r.pb_glue_thickness.as_ref(),
        }
    }
}

impl ToleranceCheck for GlueThicknessCheck {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    fn describe(&self) -> String {
        format!("{} µm < thickness < {} µm", self.range.min, self.range.max)
    }

    fn check(&self, results: &MetrologyResults) -> Option<Issue> {
        let values = (self.select)(results)?;
        let offenders: Vec<String> = values
            .iter()
            .filter(|(_, &v)| !self.range.contains_open(v))
            .map(|(name, _)| name.clone())
            .collect();

        if offenders.is_empty() {
            None
        } else {
            Some(failure(self.id, self.message, offenders))
        }
    }
}

/// Shield box height must stay below the clearance.
pub struct ShieldHeightCheck {
    pub max_height: f64,
}

impl ToleranceCheck for ShieldHeightCheck {
    fn id(&self) -> &str {
        "shield_height"
    }

    fn name(&self) -> &str {
        "Shield box height"
    }

    fn describe(&self) -> String {
        format!("height < {} µm", self.max_height)
    }

    fn check(&self, results: &MetrologyResults) -> Option<Issue> {
        let height = results.shieldbox_height?;
        if height < self.max_height {
            None
        } else {
            Some(failure(
                self.id(),
                &format!(
                    "Failure - Shield is too high ({} µm, limit {} µm).",
                    height, self.max_height
                ),
                Vec::new(),
            ))
        }
    }
}

pub struct ToleranceEvaluator {
    checks: Vec<Arc<dyn ToleranceCheck>>,
}

impl ToleranceEvaluator {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        let mut evaluator = Self::new();
        evaluator.add_check(Arc::new(PositionCheck {
            x_limit: config.x_limit,
            y_limit: config.y_limit,
        }));
        evaluator.add_check(Arc::new(GlueThicknessCheck::hybrid(config.glue_range)));
        evaluator.add_check(Arc::new(GlueThicknessCheck::powerboard(config.glue_range)));
        evaluator.add_check(Arc::new(ShieldHeightCheck {
            max_height: config.max_shield_height,
        }));
        evaluator
    }

    pub fn add_check(&mut self, check: Arc<dyn ToleranceCheck>) {
        self.checks.push(check);
    }

    pub fn checks(&self) -> &[Arc<dyn ToleranceCheck>] {
        &self.checks
    }

    pub fn evaluate(&self, results: &MetrologyResults) -> Verdict {
        let mut issues = Vec::new();
        for check in &self.checks {
            if let Some(issue) = check.check(results) {
                tracing::warn!("{}", issue.message);
                issues.push(issue);
            }
        }

        let verdict = Verdict {
            passed: issues.is_empty(),
            issues,
        };
        tracing::info!("{}", verdict.summary());
        verdict
    }
}

impl Default for ToleranceEvaluator {
    fn default() -> Self {
        Self::from_config(&SiteConfig::default())
    }
}
