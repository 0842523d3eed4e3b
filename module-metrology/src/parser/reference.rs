//! Reference position tables
//!
//! Each module type has a CSV table of nominal in-plane positions, one row per
//! measured point (`name,x,y`, header row skipped). Values use the same unit
//! convention as the report's position section.

use csv::ReaderBuilder;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Row {row}: expected 3 columns (name, x, y), found {found}")]
    Columns { row: usize, found: usize },
    #[error("Row {row}: invalid number '{value}'")]
    InvalidNumber { row: usize, value: String },
    #[error("Row {row}: duplicate reference point '{name}'")]
    Duplicate { row: usize, name: String },
    #[error("No reference table for module type '{0}'")]
    Missing(String),
    #[error("Line {line}: unknown point '{name}' for module type '{module_type}'")]
    UnknownPoint {
        name: String,
        line: usize,
        module_type: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePosition {
    pub x: f64,
    pub y: f64,
}

/// Nominal positions for one module type, keyed by point name.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTable {
    module_type: String,
    positions: HashMap<String, ReferencePosition>,
}

impl ReferenceTable {
    pub fn new(module_type: &str) -> Self {
        Self {
            module_type: module_type.to_string(),
            positions: HashMap::new(),
        }
    }

    pub fn from_csv_reader<R: Read>(module_type: &str, reader: R) -> Result<Self, ReferenceError> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut table = Self::new(module_type);
        for (row_idx, result) in rdr.records().enumerate() {
            let row = row_idx + 2; // +2 for 1-indexed and header row
            let record = result?;
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }
            if record.len() != 3 {
                return Err(ReferenceError::Columns {
                    row,
                    found: record.len(),
                });
            }

            let number = |value: &str| {
                value
                    .parse::<f64>()
                    .map_err(|_| ReferenceError::InvalidNumber {
                        row,
                        value: value.to_string(),
                    })
            };
            let position = ReferencePosition {
                x: number(&record[1])?,
                y: number(&record[2])?,
            };

            let name = record[0].to_string();
            if table.positions.contains_key(&name) {
                return Err(ReferenceError::Duplicate { row, name });
            }
            table.positions.insert(name, position);
        }

        Ok(table)
    }

    pub fn from_csv_str(module_type: &str, content: &str) -> Result<Self, ReferenceError> {
        Self::from_csv_reader(module_type, content.as_bytes())
    }

    pub fn insert(&mut self, name: &str, x: f64, y: f64) {
        self.positions
            .insert(name.to_string(), ReferencePosition { x, y });
    }

    pub fn module_type(&self) -> &str {
        &self.module_type
    }

    pub fn get(&self, name: &str) -> Option<ReferencePosition> {
        self.positions.get(name).copied()
    }

    /// Look up a point named on `line` of a report; a miss is fatal.
    pub fn lookup(&self, name: &str, line: usize) -> Result<ReferencePosition, ReferenceError> {
        self.get(name).ok_or_else(|| ReferenceError::UnknownPoint {
            name: name.to_string(),
            line,
            module_type: self.module_type.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// Supplies the reference table for a module type.
pub trait ReferenceSource {
    fn load(&self, module_type: &str) -> Result<ReferenceTable, ReferenceError>;
}

/// Reads `<dir>/<MODULE_TYPE>_positions.csv`.
#[derive(Debug, Clone)]
pub struct DirectoryReferenceSource {
    dir: PathBuf,
}

impl DirectoryReferenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn table_path(&self, module_type: &str) -> PathBuf {
        self.dir.join(format!("{}_positions.csv", module_type))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReferenceSource for DirectoryReferenceSource {
    fn load(&self, module_type: &str) -> Result<ReferenceTable, ReferenceError> {
        // Module types come from the report; keep them from escaping the directory
        if module_type.is_empty()
            || module_type.contains(['/', '\\'])
            || module_type.contains("..")
        {
            return Err(ReferenceError::Missing(module_type.to_string()));
        }

        let path = self.table_path(module_type);
        if !path.is_file() {
            return Err(ReferenceError::Missing(module_type.to_string()));
        }
        let file = std::fs::File::open(&path).map_err(|source| ReferenceError::Io {
            path: path.clone(),
            source,
        })?;
        let table = ReferenceTable::from_csv_reader(module_type, std::io::BufReader::new(file))?;
        tracing::debug!("Loaded {} reference positions from {:?}", table.len(), path);
        Ok(table)
    }
}

/// Tables held in memory, for embedding callers and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticReferenceSource {
    tables: BTreeMap<String, ReferenceTable>,
}

impl StaticReferenceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: ReferenceTable) -> Self {
        self.tables.insert(table.module_type().to_string(), table);
        self
    }
}

impl ReferenceSource for StaticReferenceSource {
    fn load(&self, module_type: &str) -> Result<ReferenceTable, ReferenceError> {
        self.tables
            .get(module_type)
            .cloned()
            .ok_or_else(|| ReferenceError::Missing(module_type.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "name,x,y\nR0H0_12, 100.0, 200.0\nPB_1,120.0,180.0\n";

    #[test]
    fn test_parse_table_skips_header() {
        let table = ReferenceTable::from_csv_str("R0", TABLE).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.module_type(), "R0");
        assert_eq!(
            table.get("R0H0_12"),
            Some(ReferencePosition { x: 100.0, y: 200.0 })
        );
        assert!(table.get("name").is_none());
    }

    #[test]
    fn test_unknown_point_names_line() {
        let table = ReferenceTable::from_csv_str("R0", TABLE).unwrap();
        let err = table.lookup("R9H9_99", 17).unwrap_err();
        assert!(matches!(err, ReferenceError::UnknownPoint { line: 17, .. }));
        let message = err.to_string();
        assert!(message.contains("R9H9_99"));
        assert!(message.contains("Line 17"));
    }

    #[test]
    fn test_duplicate_row_rejected() {
        let err = ReferenceTable::from_csv_str("R0", "name,x,y\nPB_1,1,2\nPB_1,3,4\n").unwrap_err();
        assert!(matches!(err, ReferenceError::Duplicate { row: 3, .. }));
    }

    #[test]
    fn test_bad_number_rejected() {
        let err = ReferenceTable::from_csv_str("R0", "name,x,y\nPB_1,1,two\n").unwrap_err();
        assert!(matches!(err, ReferenceError::InvalidNumber { row: 2, .. }));
    }

    #[test]
    fn test_short_row_rejected() {
        let err = ReferenceTable::from_csv_str("R0", "name,x,y\nPB_1,1\n").unwrap_err();
        assert!(matches!(err, ReferenceError::Columns { row: 2, found: 2 }));
    }

    #[test]
    fn test_directory_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("R3_positions.csv")).unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();

        let source = DirectoryReferenceSource::new(dir.path());
        let table = source.load("R3").unwrap();
        assert_eq!(table.len(), 2);

        assert!(matches!(source.load("R4"), Err(ReferenceError::Missing(_))));
        assert!(matches!(source.load("../R3"), Err(ReferenceError::Missing(_))));
    }

    #[test]
    fn test_static_source() {
        let source = StaticReferenceSource::new()
            .with_table(ReferenceTable::from_csv_str("R0", TABLE).unwrap());
        assert!(source.load("R0").is_ok());
        assert!(matches!(source.load("R1"), Err(ReferenceError::Missing(_))));
    }
}
