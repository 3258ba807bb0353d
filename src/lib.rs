//! Statistics over annual student fitness test results: pass rates,
//! per-item averages, distributions and multi-year trends.

pub mod classifier;
pub mod db;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod models;
pub mod report;
pub mod stats;
pub mod store;

pub use engine::ReportEngine;
pub use error::{FitnessError, Result};
pub use store::{MemoryStore, RecordStore};
