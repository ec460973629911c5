/// Data layer: labeled tables, loading, and filtering.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → LabeledTable
///   └──────────┘
///        │
///        ▼
///   ┌──────────────┐
///   │ LabeledTable  │  Key → f64, unique keys, insertion order
///   └──────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  apply dimension selections → restricted table
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
