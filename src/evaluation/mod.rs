//! Threshold metrics, ROC sweep and dataset summaries

pub mod curve;
pub mod metrics;
pub mod summary;

pub use curve::{sweep, RocPoint, THRESHOLD_GRID_POINTS};
pub use metrics::{evaluate, MetricsSnapshot};
pub use summary::{summarize, AmountBin, DatasetSummary, HourBucket};
