//! Growth analytics for a speech and debate program: turns sparse attendance
//! ratings and rubric-scored speech feedback into a per-student growth report.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod error;
pub mod growth;
pub mod history;
pub mod milestone;
pub mod models;
pub mod patterns;
pub mod percentile;
pub mod report;
pub mod store;
pub mod taxonomy;
pub mod trend;
pub mod window;

pub use error::{GrowthError, StoreError};
pub use growth::GrowthEngine;
pub use report::GrowthReport;
pub use store::{AccessScope, MemoryStore, RecordStore};
pub use window::{Timeframe, TimeWindow};
