//! Derived metrics: point classification, truncation arithmetic and the
//! metrics engine.

pub mod classifier;
pub mod metrics;
pub mod numeric;

pub use classifier::{PointCategory, PointClassifier};
pub use metrics::{Deviation, Metrics, MetricsEngine, MetricsError};
