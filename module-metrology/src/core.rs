//! Core pipeline shared by the CLI and embedding callers.
//! No presentation or upload client dependencies.

use std::path::{Path, PathBuf};

use crate::analyzer::classifier::PatternError;
use crate::analyzer::metrics::{Metrics, MetricsEngine, MetricsError};
use crate::compliance::tolerance::{ToleranceEvaluator, Verdict};
use crate::config::{ConfigError, SiteConfig};
use crate::geometry::{PlaneFitCorrector, TiltCorrector, TiltError};
use crate::parser::reference::{DirectoryReferenceSource, ReferenceError, ReferenceSource};
use crate::parser::report::{ReportHeader, ReportParseError, ReportParser};
use crate::record::{ResultAssembler, ResultRecord};

#[derive(Debug, thiserror::Error)]
pub enum MetrologyError {
    #[error("Corrupt input file: {0}")]
    Parse(#[from] ReportParseError),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error("Tilt correction failed: {0}")]
    Tilt(#[from] TiltError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Configuration error: {0}")]
    Pattern(#[from] PatternError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MetricsError> for MetrologyError {
    fn from(e: MetricsError) -> Self {
        match e {
            MetricsError::Reference(e) => MetrologyError::Reference(e),
            MetricsError::Tilt(e) => MetrologyError::Tilt(e),
        }
    }
}

/// Per-run options supplied by the operator.
#[derive(Clone, Debug, Default)]
pub struct ProcessOptions {
    /// Were there problems during testing.
    pub problems: bool,
}

/// Everything produced for one report.
#[derive(Debug, Clone)]
pub struct MetrologyOutcome {
    pub record: ResultRecord,
    pub metrics: Metrics,
    pub verdict: Verdict,
}

impl MetrologyOutcome {
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }
}

/// Result for one file of a directory run.
#[derive(Debug)]
pub struct BatchEntry {
    pub file: PathBuf,
    pub outcome: Result<MetrologyOutcome, MetrologyError>,
}

const REPORT_EXTENSIONS: &[&str] = &["txt", "dat", "rpt"];

/// Recursively discover CMM report files in a directory, sorted by path.
pub fn discover_report_files(dir: &Path) -> Result<Vec<PathBuf>, MetrologyError> {
    let mut files = Vec::new();
    walk_dir(dir, &mut files, 0)?;
    files.sort();
    Ok(files)
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>, depth: usize) -> Result<(), MetrologyError> {
    if depth > 20 {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with('.') || name == "target" || name == "build" {
                continue;
            }
            walk_dir(&path, files, depth + 1)?;
        } else if path.is_file() {
            if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
                if REPORT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                    files.push(path);
                }
            }
        }
    }
    Ok(())
}

/// Drives parse, reference lookup, tilt correction, metrics, tolerance checks
/// and record assembly for one report at a time.
///
/// Holds only immutable configuration; every call builds its state from
/// scratch, so nothing carries over between files.
pub struct MetrologyCore {
    config: SiteConfig,
    parser: ReportParser,
    engine: MetricsEngine,
    evaluator: ToleranceEvaluator,
    references: Box<dyn ReferenceSource>,
    corrector: Box<dyn TiltCorrector>,
}

impl MetrologyCore {
    /// Reference tables from `config.positions_dir`, plane-fit tilt correction.
    pub fn new(config: SiteConfig) -> Result<Self, MetrologyError> {
        config.validate()?;
        let references = DirectoryReferenceSource::new(config.positions_dir.clone());
        let corrector = PlaneFitCorrector::new(&config.tilt.reference_pattern)?;
        Ok(Self {
            parser: ReportParser::new(),
            engine: MetricsEngine::from_config(&config)?,
            evaluator: ToleranceEvaluator::from_config(&config),
            references: Box::new(references),
            corrector: Box::new(corrector),
            config,
        })
    }

    pub fn with_references(mut self, references: impl ReferenceSource + 'static) -> Self {
        self.references = Box::new(references);
        self
    }

    pub fn with_corrector(mut self, corrector: impl TiltCorrector + 'static) -> Self {
        self.corrector = Box::new(corrector);
        self
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &ToleranceEvaluator {
        &self.evaluator
    }

    pub fn process_file(
        &self,
        path: &Path,
        options: &ProcessOptions,
    ) -> Result<MetrologyOutcome, MetrologyError> {
        let content = std::fs::read_to_string(path)?;
        self.process_str(&content, &path.display().to_string(), options)
    }

    /// Run the pipeline on decoded report text. `file` is recorded as the
    /// report's identity in the result record.
    pub fn process_str(
        &self,
        content: &str,
        file: &str,
        options: &ProcessOptions,
    ) -> Result<MetrologyOutcome, MetrologyError> {
        let report = self.parser.parse_str(content)?;
        self.check_site(&report.header);

        let table = self.references.load(&report.header.module_type)?;
        tracing::debug!(
            "Using {} reference table ({} points), {} tilt correction",
            table.module_type(),
            table.len(),
            self.corrector.name()
        );
        // Resolve every position before any metric is computed
        for reading in &report.positions {
            table.lookup(&reading.name, reading.line)?;
        }

        let metrics = self.engine.compute(&report, &table, self.corrector.as_ref())?;
        if !metrics.unclassified.is_empty() {
            tracing::debug!("Unclassified point groups: {:?}", metrics.unclassified);
        }

        let mut record = ResultAssembler::assemble(&report.header, &metrics, file, options.problems);
        let verdict = self.evaluator.evaluate(&record.results);
        record.apply_verdict(&verdict);

        tracing::info!(
            "Processed {} for {}: {}",
            file,
            record.component,
            if verdict.passed { "passed" } else { "failed" }
        );

        Ok(MetrologyOutcome {
            record,
            metrics,
            verdict,
        })
    }

    /// Process every report under `dir`. Each file succeeds or fails on its own.
    pub fn process_directory(
        &self,
        dir: &Path,
        options: &ProcessOptions,
    ) -> Result<Vec<BatchEntry>, MetrologyError> {
        let files = discover_report_files(dir)?;
        tracing::info!("Found {} report files in {:?}", files.len(), dir);

        Ok(files
            .into_iter()
            .map(|file| {
                let outcome = self.process_file(&file, options);
                if let Err(ref e) = outcome {
                    tracing::warn!("Skipping {:?}: {}", file, e);
                }
                BatchEntry { file, outcome }
            })
            .collect())
    }

    fn check_site(&self, header: &ReportHeader) {
        if header.institution != self.config.institute {
            tracing::warn!(
                "Report institution '{}' differs from configured site '{}'",
                header.institution,
                self.config.institute
            );
        }
        if header.machine != self.config.instrument {
            tracing::warn!(
                "Report machine '{}' differs from configured instrument '{}'",
                header.machine,
                self.config.instrument
            );
        }
        if header.script_version != self.config.program_version {
            tracing::warn!(
                "Report script version '{}' differs from expected '{}'",
                header.script_version,
                self.config.program_version
            );
        }
    }
}
