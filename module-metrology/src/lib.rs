//! Module Metrology - CMM report evaluation library
//!
//! This library turns the text report written by a coordinate measuring
//! machine for an assembled detector module into the derived metrics the
//! production database expects: hybrid and powerboard position deviations,
//! glue thickness, capacitor heights and shield box height. The metrics are
//! checked against the site's tolerance bands.
//!
//! # Quick Start
//!
//! ```no_run
//! use module_metrology::{MetrologyCore, ProcessOptions, SiteConfig};
//! use std::path::Path;
//!
//! let core = MetrologyCore::new(SiteConfig::default()).unwrap();
//! let outcome = core
//!     .process_file(Path::new("R0_20USEM00000042.txt"), &ProcessOptions::default())
//!     .unwrap();
//!
//! for issue in &outcome.verdict.issues {
//!     println!("{}", issue.message);
//! }
//! println!("{}", outcome.verdict.summary());
//! ```
//!
//! # Pipeline
//!
//! - **Report parser**: labeled header, position section, raw measurement section
//! - **Reference tables**: nominal positions per module type (CSV)
//! - **Tilt correction**: plane fit to the sensor surface
//! - **Metrics**: deviations, glue thickness, heights
//! - **Tolerance checks**: position, hybrid glue, powerboard glue, shield height
//! - **Result record**: upload-ready, empty categories as `null`

pub mod analyzer;
pub mod compliance;
pub mod config;
pub mod core;
pub mod geometry;
pub mod parser;
pub mod record;

// Re-export main types
pub use crate::core::{
    discover_report_files, BatchEntry, MetrologyCore, MetrologyError, MetrologyOutcome,
    ProcessOptions,
};
pub use analyzer::metrics::{Deviation, Metrics, MetricsEngine};
pub use compliance::tolerance::{Issue, ToleranceEvaluator, Verdict};
pub use config::SiteConfig;
pub use geometry::{IdentityCorrector, PlaneFitCorrector, TiltCorrector};
pub use parser::reference::{
    DirectoryReferenceSource, ReferenceSource, ReferenceTable, StaticReferenceSource,
};
pub use parser::report::{ParsedReport, ReportHeader, ReportParser};
pub use record::{MetrologyResults, ResultRecord, UploadPayload};

/// Parse a report file (convenience wrapper).
pub fn parse_report(path: &std::path::Path) -> Result<ParsedReport, MetrologyError> {
    Ok(ReportParser::new().parse_file(path)?)
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        Deviation, Issue, MetrologyCore, MetrologyError, MetrologyOutcome, ProcessOptions,
        ResultRecord, SiteConfig, ToleranceEvaluator, Verdict,
    };
}
