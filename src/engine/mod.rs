//! Comparison and target-range engine.
//!
//! ```text
//!   reference ──► Criterion::new ──► Aligner (indexed once)
//!                                        │
//!   model ─────► Criterion::compare ─────┤ align: match dims, broadcast,
//!                                        │        unit check/convert
//!                                        ▼
//!                                 ComparisonFunction ──► ComparisonResult
//!                                                            │
//!                                 TargetRange::evaluate ◄────┘
//!                                   distances / in-range
//!                                        │
//!                                        ▼
//!                                 Aggregator ──► SummaryTable
//! ```
//!
//! Everything here is synchronous and I/O-free. Built criteria, target ranges
//! and aggregators are immutable and `Send + Sync`.

pub mod align;
pub mod comparison;
pub mod criterion;
pub mod summary;
pub mod target;
pub mod units;

pub use align::{align, AlignReport, AlignedPoint, Aligner, BroadcastSpec};
pub use comparison::{ComparisonFunction, ComparisonRegistry};
pub use criterion::{ComparisonResult, Criterion, CriterionConfig};
pub use summary::{summarize, Aggregator, Reducer, SummaryTable};
pub use target::{DistanceFunction, RangeSpec, RelativeRange, TargetEvaluation, TargetRange};
pub use units::{UnitPolicy, UnitRegistry};
