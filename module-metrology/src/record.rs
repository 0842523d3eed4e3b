//! Result record assembly
//!
//! The record mirrors the test-run payload accepted by the production
//! database: upper-case result keys, `null` for a category with no measured
//! points. Maps are ordered so the serialized record is identical across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::analyzer::metrics::{Deviation, Metrics};
use crate::compliance::tolerance::Verdict;
use crate::parser::report::ReportHeader;

pub const TEST_TYPE: &str = "MODULE_METROLOGY";
pub const ATTACHMENT_DESCRIPTION: &str = "Automatic Attachment of Original Data File";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Properties {
    pub machine: String,
    pub operator: String,
    pub script_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetrologyResults {
    #[serde(rename = "CAP_HEIGHT")]
    pub cap_height: Option<BTreeMap<String, f64>>,
    #[serde(rename = "PB_POSITION")]
    pub pb_position: Option<BTreeMap<String, Deviation>>,
    #[serde(rename = "PB_GLUE_THICKNESS")]
    pub pb_glue_thickness: Option<BTreeMap<String, f64>>,
    #[serde(rename = "HYBRID_POSITION")]
    pub hybrid_position: Option<BTreeMap<String, Deviation>>,
    #[serde(rename = "HYBRID_GLUE_THICKNESS")]
    pub hybrid_glue_thickness: Option<BTreeMap<String, f64>>,
    #[serde(rename = "SHIELDBOX_HEIGHT")]
    pub shieldbox_height: Option<f64>,
    #[serde(rename = "FILE")]
    pub file: String,
    pub passed: bool,
    /// Operator's answer to "were there problems during testing".
    pub problems: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub component: String,
    #[serde(rename = "testType")]
    pub test_type: String,
    pub institution: String,
    #[serde(rename = "runNumber")]
    pub run_number: String,
    pub date: String,
    pub properties: Properties,
    pub results: MetrologyResults,
}

impl ResultRecord {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Record the tolerance verdict.
    pub fn apply_verdict(&mut self, verdict: &Verdict) {
        self.results.passed = verdict.passed;
    }
}

fn non_empty<T>(map: BTreeMap<String, T>) -> Option<BTreeMap<String, T>> {
    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

pub struct ResultAssembler;

impl ResultAssembler {
    /// Build the record from header and metrics. `passed` starts false until
    /// a verdict is applied.
    pub fn assemble(
        header: &ReportHeader,
        metrics: &Metrics,
        file: &str,
        problems: bool,
    ) -> ResultRecord {
        ResultRecord {
            component: header.component.clone(),
            test_type: TEST_TYPE.to_string(),
            institution: header.institution.clone(),
            run_number: header.run_number.clone(),
            date: header.date.clone(),
            properties: Properties {
                machine: header.machine.clone(),
                operator: header.operator.clone(),
                script_version: header.script_version.clone(),
            },
            results: MetrologyResults {
                cap_height: non_empty(metrics.cap_heights.clone()),
                pb_position: non_empty(metrics.pb_positions.clone()),
                pb_glue_thickness: non_empty(metrics.pb_glue.clone()),
                hybrid_position: non_empty(metrics.hybrid_positions.clone()),
                hybrid_glue_thickness: non_empty(metrics.hybrid_glue.clone()),
                shieldbox_height: metrics.shield_height,
                file: file.to_string(),
                passed: false,
                problems,
            },
        }
    }
}

/// Metadata for attaching the original report to an uploaded test run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
}

impl AttachmentDescriptor {
    pub fn for_file(path: &Path) -> Self {
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            kind: "file".to_string(),
            title,
            description: ATTACHMENT_DESCRIPTION.to_string(),
        }
    }
}

/// What the upload client receives: the record and the file to attach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPayload {
    pub record: ResultRecord,
    pub attachment: AttachmentDescriptor,
}

impl UploadPayload {
    pub fn new(record: ResultRecord) -> Self {
        let attachment = AttachmentDescriptor::for_file(Path::new(&record.results.file));
        Self { record, attachment }
    }
}

/// One `name: value` line per entry, or `None` for an absent category.
pub fn format_category<T: fmt::Display>(category: Option<&BTreeMap<String, T>>) -> Option<String> {
    category.map(|values| {
        values
            .iter()
            .map(|(name, value)| format!("{}: {}\n", name, value))
            .collect()
    })
}
