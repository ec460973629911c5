//! Compare IAM model output against reference timeseries.
//!
//! A [`Criterion`] holds reference data and a comparison function, a
//! [`TargetRange`] classifies the compared values, and an [`Aggregator`]
//! reduces them per group. The [`report`] module turns the results into sheets
//! for an external renderer.

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod report;

pub use data::model::{DimValue, Dims, Key, LabeledTable};
pub use engine::{
    Aggregator, BroadcastSpec, ComparisonFunction, ComparisonResult, Criterion, CriterionConfig,
    Reducer, RelativeRange, SummaryTable, TargetRange,
};
pub use error::{ConfigurationError, EngineError, TableError};
