//! Tolerance Compliance Module
//!
//! Position, glue thickness and shield height bands applied to an assembled
//! result record.

pub mod tolerance;

pub use tolerance::*;
