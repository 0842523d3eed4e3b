//! CMM Report Parser
//!
//! Reads the fixed-layout text report written by the CMM measurement program:
//!
//! ```text
//! line  0-1   free text banner
//! line  2-9   labeled header fields ("Module Type: R0", "Operator: Jane Doe", ...)
//! line 10-11  free text
//! line 12..   position section, one "NAME X Y" line per point
//! #...        sentinel, ends the position section
//! ...         measurement section, "NAME TYPE X Y Z" per reading; '#' lines skipped
//! ```
//!
//! Any line that does not fit the layout aborts the whole parse, blank lines
//! included; only blank lines after the last reading are ignored. Errors carry
//! the 1-based line number so the operator can find the offending line.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::geometry::{Point3, PointGroups};

/// Marks the end of the position section and comment lines in the measurement section.
pub const SECTION_SENTINEL: char = '#';

#[derive(Debug, Error)]
pub enum ReportParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Line {line}: missing header field '{field}'")]
    MissingHeaderField { field: &'static str, line: usize },
    #[error("Line {line}: expected header label '{expected}', found '{found}'")]
    UnexpectedHeaderLabel {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("Line {line}: expected {expected} fields in {section} section, found {found}: '{content}'")]
    TokenCount {
        line: usize,
        section: &'static str,
        expected: usize,
        found: usize,
        content: String,
    },
    #[error("Line {line}: invalid number '{value}'")]
    InvalidNumber { line: usize, value: String },
    #[error("Line {line}: position for '{name}' already given on line {first_line}")]
    DuplicatePosition {
        name: String,
        line: usize,
        first_line: usize,
    },
    #[error("No '#' sentinel after the position section starting at line {start}")]
    MissingSentinel { start: usize },
}

/// Metadata read from the report header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHeader {
    pub module_type: String,
    pub component: String,
    pub date: String,
    pub institution: String,
    pub operator: String,
    pub machine: String,
    pub run_number: String,
    pub script_version: String,
}

/// An in-plane position reading from the position section (mm).
#[derive(Debug, Clone, PartialEq)]
pub struct PositionReading {
    pub name: String,
    pub x: f64,
    pub y: f64,
    /// 1-based line number in the report.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReport {
    pub header: ReportHeader,
    pub positions: Vec<PositionReading>,
    pub raw_points: PointGroups,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderFieldKind {
    ModuleType,
    Component,
    Date,
    Institution,
    Operator,
    Machine,
    RunNumber,
    ScriptVersion,
}

impl HeaderFieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            HeaderFieldKind::ModuleType => "module type",
            HeaderFieldKind::Component => "component",
            HeaderFieldKind::Date => "date",
            HeaderFieldKind::Institution => "institution",
            HeaderFieldKind::Operator => "operator",
            HeaderFieldKind::Machine => "machine",
            HeaderFieldKind::RunNumber => "run number",
            HeaderFieldKind::ScriptVersion => "script version",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    /// First token after the label.
    Token,
    /// Everything after the label, joined by single spaces.
    Rest,
}

#[derive(Debug, Clone)]
pub struct HeaderField {
    pub kind: HeaderFieldKind,
    /// 0-based line index.
    pub line: usize,
    pub label: &'static str,
    pub shape: ValueShape,
}

/// Where each header field lives and how it is labeled.
#[derive(Debug, Clone)]
pub struct HeaderLayout {
    pub fields: Vec<HeaderField>,
    /// 0-based index of the first position line.
    pub data_start: usize,
}

impl Default for HeaderLayout {
    fn default() -> Self {
        use HeaderFieldKind::*;
        let field = |kind, line, label, shape| HeaderField {
            kind,
            line,
            label,
            shape,
        };
        Self {
            fields: vec![
                field(ModuleType, 2, "Module Type:", ValueShape::Token),
                field(Component, 3, "Module Serial Number:", ValueShape::Token),
                field(Date, 4, "Date:", ValueShape::Token),
                field(Institution, 5, "Institute:", ValueShape::Token),
                field(Operator, 6, "Operator:", ValueShape::Rest),
                field(Machine, 7, "Measurement Machine:", ValueShape::Rest),
                field(RunNumber, 8, "Run Number:", ValueShape::Token),
                field(ScriptVersion, 9, "Measurement Script Version:", ValueShape::Token),
            ],
            data_start: 12,
        }
    }
}

fn normalize_label(token: &str) -> String {
    token.trim_end_matches(':').to_lowercase()
}

/// Parser for CMM module metrology reports
pub struct ReportParser {
    layout: HeaderLayout,
}

impl Default for ReportParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportParser {
    pub fn new() -> Self {
        Self {
            layout: HeaderLayout::default(),
        }
    }

    pub fn with_layout(layout: HeaderLayout) -> Self {
        Self { layout }
    }

    pub fn parse_file(&self, path: &Path) -> Result<ParsedReport, ReportParseError> {
        let content = std::fs::read_to_string(path)?;
        self.parse_str(&content)
    }

    pub fn parse_str(&self, content: &str) -> Result<ParsedReport, ReportParseError> {
        let lines: Vec<&str> = content.lines().collect();
        self.parse_lines(&lines)
    }

    pub fn parse_lines(&self, lines: &[&str]) -> Result<ParsedReport, ReportParseError> {
        let header = self.parse_header(lines)?;
        // Trailing blank lines are tolerated, blank lines inside a section are not
        let end = lines
            .iter()
            .rposition(|line| !line.trim().is_empty())
            .map_or(0, |idx| idx + 1);
        let body = &lines[..end];
        let (positions, sentinel) = Self::parse_positions(body, self.layout.data_start)?;
        let raw_points = Self::parse_measurements(body, sentinel)?;

        tracing::debug!(
            "Parsed report for {} ({}): {} positions, {} point groups, {} readings",
            header.component,
            header.module_type,
            positions.len(),
            raw_points.len(),
            raw_points.point_count()
        );

        Ok(ParsedReport {
            header,
            positions,
            raw_points,
        })
    }

    fn parse_header(&self, lines: &[&str]) -> Result<ReportHeader, ReportParseError> {
        let mut values: HashMap<HeaderFieldKind, String> = HashMap::new();

        for field in &self.layout.fields {
            let missing = || ReportParseError::MissingHeaderField {
                field: field.kind.name(),
                line: field.line + 1,
            };
            let line = lines.get(field.line).ok_or_else(missing)?;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let label: Vec<&str> = field.label.split_whitespace().collect();

            let matches = tokens.len() >= label.len()
                && tokens
                    .iter()
                    .zip(&label)
                    .all(|(found, expected)| normalize_label(found) == normalize_label(expected));
            if !matches {
                return Err(ReportParseError::UnexpectedHeaderLabel {
                    line: field.line + 1,
                    expected: field.label.to_string(),
                    found: line.trim().to_string(),
                });
            }

            let rest = &tokens[label.len()..];
            let value = match field.shape {
                ValueShape::Token => rest.first().map(|s| s.to_string()),
                ValueShape::Rest if !rest.is_empty() => Some(rest.join(" ")),
                ValueShape::Rest => None,
            };
            values.insert(field.kind, value.ok_or_else(missing)?);
        }

        let mut take = |kind: HeaderFieldKind| -> Result<String, ReportParseError> {
            values
                .remove(&kind)
                .ok_or(ReportParseError::MissingHeaderField {
                    field: kind.name(),
                    line: 0,
                })
        };

        Ok(ReportHeader {
            module_type: take(HeaderFieldKind::ModuleType)?,
            component: take(HeaderFieldKind::Component)?,
            date: take(HeaderFieldKind::Date)?,
            institution: take(HeaderFieldKind::Institution)?,
            operator: take(HeaderFieldKind::Operator)?,
            machine: take(HeaderFieldKind::Machine)?,
            run_number: take(HeaderFieldKind::RunNumber)?,
            script_version: take(HeaderFieldKind::ScriptVersion)?,
        })
    }

    /// Returns the readings and the index of the sentinel line.
    fn parse_positions(
        lines: &[&str],
        start: usize,
    ) -> Result<(Vec<PositionReading>, usize), ReportParseError> {
        let mut positions: Vec<PositionReading> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (idx, line) in lines.iter().enumerate().skip(start) {
            if line.contains(SECTION_SENTINEL) {
                return Ok((positions, idx));
            }

            let line_no = idx + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 3 {
                return Err(ReportParseError::TokenCount {
                    line: line_no,
                    section: "position",
                    expected: 3,
                    found: tokens.len(),
                    content: line.trim().to_string(),
                });
            }

            let name = tokens[0].to_string();
            if let Some(&first_line) = seen.get(&name) {
                return Err(ReportParseError::DuplicatePosition {
                    name,
                    line: line_no,
                    first_line,
                });
            }
            seen.insert(name.clone(), line_no);

            positions.push(PositionReading {
                name,
                x: parse_number(tokens[1], line_no)?,
                y: parse_number(tokens[2], line_no)?,
                line: line_no,
            });
        }

        Err(ReportParseError::MissingSentinel { start: start + 1 })
    }

    fn parse_measurements(lines: &[&str], start: usize) -> Result<PointGroups, ReportParseError> {
        let mut groups = PointGroups::new();

        for (idx, line) in lines.iter().enumerate().skip(start) {
            if line.contains(SECTION_SENTINEL) {
                continue;
            }

            let line_no = idx + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() != 5 {
                return Err(ReportParseError::TokenCount {
                    line: line_no,
                    section: "measurement",
                    expected: 5,
                    found: tokens.len(),
                    content: line.trim().to_string(),
                });
            }

            // tokens[1] is the measurement type tag; not used for any metric
            let point = Point3::new(
                parse_number(tokens[2], line_no)?,
                parse_number(tokens[3], line_no)?,
                parse_number(tokens[4], line_no)?,
            );
            groups.push(tokens[0], point);
        }

        Ok(groups)
    }
}

fn parse_number(token: &str, line: usize) -> Result<f64, ReportParseError> {
    token
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ReportParseError::InvalidNumber {
            line,
            value: token.to_string(),
        })
}
