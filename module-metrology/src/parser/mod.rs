pub mod reference;
pub mod report;

// Re-export for convenience
pub use reference::{
    DirectoryReferenceSource, ReferenceError, ReferenceSource, ReferenceTable,
    StaticReferenceSource,
};
pub use report::{ParsedReport, PositionReading, ReportHeader, ReportParseError, ReportParser};
