use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    StringArray,
};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{DimValue, Dims, Key, LabeledTable, IAMC_DIMS};

/// Name of the value column in long-format files.
pub const VALUE_COLUMN: &str = "value";

/// Name given to the year dimension built from wide-format year columns.
pub const YEAR_DIM: &str = "year";

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load an IAMC-style timeseries table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – wide (`Model,Scenario,Region,Variable,Unit,2020,2025,...`)
///                or long (dimension columns plus a `value` column)
/// * `.json`    – `[{ "model": ..., "year": 2020, "value": 1.0 }, ...]`
/// * `.parquet` – long format, dimension columns plus a `value` column
///
/// Column names are lower-cased to become dimension names. Empty cells are
/// skipped; they never become rows.
pub fn load_file(path: &Path) -> Result<LabeledTable> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "csv" => load_csv(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    log::info!(
        "loaded {} rows with dimensions {} from {}",
        table.len(),
        table.dims(),
        path.display()
    );
    Ok(table)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names.
///
/// If one column is named `value` the file is long format and every other
/// column is a dimension. Otherwise columns whose header is an integer are
/// year columns, pivoted into a `year` dimension, and all other columns are
/// dimensions.
fn load_csv(path: &Path) -> Result<LabeledTable> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_ascii_lowercase())
        .collect();

    match headers.iter().position(|h| h == VALUE_COLUMN) {
        Some(value_idx) => read_long_csv(&mut reader, &headers, value_idx),
        None => read_wide_csv(&mut reader, &headers),
    }
}

fn read_long_csv<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    headers: &[String],
    value_idx: usize,
) -> Result<LabeledTable> {
    let dim_cols: Vec<usize> = (0..headers.len()).filter(|&i| i != value_idx).collect();
    let dims = Dims::new(dim_cols.iter().map(|&i| headers[i].clone()))?;
    let mut table = LabeledTable::new(dims);

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let raw = record.get(value_idx).unwrap_or("").trim();
        if raw.is_empty() {
            continue;
        }
        let value = parse_value(raw, row_no, VALUE_COLUMN)?;
        let key: Key = dim_cols
            .iter()
            .map(|&i| DimValue::parse(record.get(i).unwrap_or("")))
            .collect();
        table
            .insert(key, value)
            .with_context(|| format!("CSV row {row_no}"))?;
    }
    Ok(table)
}

fn read_wide_csv<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
    headers: &[String],
) -> Result<LabeledTable> {
    let mut dim_cols = Vec::new();
    let mut year_cols = Vec::new();
    for (i, h) in headers.iter().enumerate() {
        match h.parse::<i64>() {
            Ok(year) => year_cols.push((i, year)),
            Err(_) => dim_cols.push(i),
        }
    }
    if year_cols.is_empty() {
        bail!("CSV has neither a 'value' column nor any year columns");
    }

    let dims = Dims::new(
        dim_cols
            .iter()
            .map(|&i| headers[i].clone())
            .chain(std::iter::once(YEAR_DIM.to_string())),
    )?;
    let mut table = LabeledTable::new(dims);

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let labels: Vec<DimValue> = dim_cols
            .iter()
            .map(|&i| DimValue::parse(record.get(i).unwrap_or("")))
            .collect();

        for &(col_idx, year) in &year_cols {
            let raw = record.get(col_idx).unwrap_or("").trim();
            if raw.is_empty() {
                continue;
            }
            let value = parse_value(raw, row_no, &headers[col_idx])?;
            let mut key = labels.clone();
            key.push(DimValue::Integer(year));
            table
                .insert(Key::new(key), value)
                .with_context(|| format!("CSV row {row_no}"))?;
        }
    }
    Ok(table)
}

fn parse_value(s: &str, row: usize, col: &str) -> Result<f64> {
    s.parse::<f64>()
        .with_context(|| format!("Row {row}, column {col}: '{s}' is not a number"))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, long format):
///
/// ```json
/// [
///   { "model": "M", "scenario": "S", "region": "World",
///     "variable": "Primary Energy", "unit": "EJ/yr",
///     "year": 2020, "value": 550.0 },
///   ...
/// ]
/// ```
///
/// Every record must carry the same set of dimension fields. A `null` value
/// is skipped.
fn load_json(path: &Path) -> Result<LabeledTable> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;
    let Some(first) = records.first() else {
        bail!("JSON file contains no records");
    };
    let first = first.as_object().context("Row 0 is not a JSON object")?;
    let dims = Dims::new(order_dims(
        first
            .keys()
            .filter(|k| !k.eq_ignore_ascii_case(VALUE_COLUMN))
            .cloned(),
    ))?;
    let mut table = LabeledTable::new(dims.clone());

    for (i, rec) in records.iter().enumerate() {
        let obj: HashMap<String, &JsonValue> = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        if obj.len() != dims.len() + 1 {
            bail!("Row {i}: expected fields {dims} plus '{VALUE_COLUMN}'");
        }

        let value = match obj.get(VALUE_COLUMN) {
            Some(JsonValue::Null) => continue,
            Some(v) => v
                .as_f64()
                .with_context(|| format!("Row {i}: '{VALUE_COLUMN}' is not a number"))?,
            None => bail!("Row {i}: missing '{VALUE_COLUMN}'"),
        };

        let key: Key = dims
            .names()
            .iter()
            .map(|d| {
                obj.get(d.as_str())
                    .map(|v| json_to_dim(v))
                    .with_context(|| format!("Row {i}: missing dimension '{d}'"))
            })
            .collect::<Result<Vec<_>>>()
            .map(Key::new)?;
        table
            .insert(key, value)
            .with_context(|| format!("Row {i}"))?;
    }

    Ok(table)
}

fn json_to_dim(val: &JsonValue) -> DimValue {
    match val {
        JsonValue::String(s) => DimValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                DimValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                DimValue::Float(f)
            } else {
                DimValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => DimValue::Bool(*b),
        JsonValue::Null => DimValue::Null,
        other => DimValue::String(other.to_string()),
    }
}

/// IAMC dimensions first in canonical order, then any others by name.
fn order_dims(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut names: Vec<String> = names.map(|n| n.to_ascii_lowercase()).collect();
    names.sort_by_key(|n| {
        let rank = IAMC_DIMS
            .iter()
            .position(|d| d == n)
            .unwrap_or(IAMC_DIMS.len());
        (rank, n.clone())
    });
    names
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a long-format Parquet file.
///
/// Expected schema:
/// - `value`: Float64, Float32 or integer – the observation
/// - Any other columns are dimensions (strings, ints, floats, bools)
///
/// Rows with a null value are skipped.
fn load_parquet(path: &Path) -> Result<LabeledTable> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;

    let schema = builder.schema().clone();
    let value_idx = schema
        .index_of(VALUE_COLUMN)
        .map_err(|_| anyhow::anyhow!("Parquet file missing '{VALUE_COLUMN}' column"))?;
    let dim_cols: Vec<(usize, String)> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != value_idx)
        .map(|(i, f)| (i, f.name().to_ascii_lowercase()))
        .collect();
    let dims = Dims::new(dim_cols.iter().map(|(_, name)| name.clone()))?;

    let reader = builder.build().context("building parquet reader")?;
    let mut table = LabeledTable::new(dims);
    let mut row_no = 0usize;

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let value_col = batch.column(value_idx);

        for row in 0..batch.num_rows() {
            let current = row_no;
            row_no += 1;
            let Some(value) = extract_f64(value_col, row)
                .with_context(|| format!("Row {current}: failed to read '{VALUE_COLUMN}'"))?
            else {
                continue;
            };
            let key: Key = dim_cols
                .iter()
                .map(|(col_idx, _)| extract_dim_value(batch.column(*col_idx), row))
                .collect();
            table
                .insert(key, value)
                .with_context(|| format!("Row {current}"))?;
        }
    }

    Ok(table)
}

// -- Parquet / Arrow helpers --

/// Read a numeric cell as `f64`; `None` for a null cell.
fn extract_f64(col: &Arc<dyn Array>, row: usize) -> Result<Option<f64>> {
    if col.is_null(row) {
        return Ok(None);
    }
    let value = if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
        arr.value(row)
    } else if let Some(arr) = col.as_any().downcast_ref::<Float32Array>() {
        arr.value(row) as f64
    } else if let Some(arr) = col.as_any().downcast_ref::<Int64Array>() {
        arr.value(row) as f64
    } else if let Some(arr) = col.as_any().downcast_ref::<Int32Array>() {
        arr.value(row) as f64
    } else {
        bail!("value column has type {:?}, expected a numeric type", col.data_type())
    };
    Ok(Some(value))
}

/// Extract a single dimension label from an Arrow column at a given row.
fn extract_dim_value(col: &Arc<dyn Array>, row: usize) -> DimValue {
    if col.is_null(row) {
        return DimValue::Null;
    }
    match col.data_type() {
        DataType::Utf8 => match col.as_any().downcast_ref::<StringArray>() {
            Some(s) => DimValue::String(s.value(row).to_string()),
            None => DimValue::Null,
        },
        DataType::LargeUtf8 => {
            let s = col.as_string::<i64>();
            DimValue::String(s.value(row).to_string())
        }
        DataType::Int32 => match col.as_any().downcast_ref::<Int32Array>() {
            Some(arr) => DimValue::Integer(arr.value(row) as i64),
            None => DimValue::Null,
        },
        DataType::Int64 => match col.as_any().downcast_ref::<Int64Array>() {
            Some(arr) => DimValue::Integer(arr.value(row)),
            None => DimValue::Null,
        },
        DataType::Float32 => match col.as_any().downcast_ref::<Float32Array>() {
            Some(arr) => DimValue::Float(arr.value(row) as f64),
            None => DimValue::Null,
        },
        DataType::Float64 => match col.as_any().downcast_ref::<Float64Array>() {
            Some(arr) => DimValue::Float(arr.value(row)),
            None => DimValue::Null,
        },
        DataType::Boolean => match col.as_any().downcast_ref::<BooleanArray>() {
            Some(arr) => DimValue::Bool(arr.value(row)),
            None => DimValue::Null,
        },
        _ => DimValue::String(format!("{:?}", col.data_type())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;
    use std::io::Write;

    fn write_tmp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn wide_csv_pivots_year_columns() {
        let f = write_tmp(
            ".csv",
            "Model,Scenario,Region,Variable,Unit,2020,2025\n\
             M,S,World,Primary Energy,EJ/yr,550.5,\n\
             M,S,World,Final Energy,EJ/yr,400,410\n",
        );
        let t = load_file(f.path()).unwrap();
        assert_eq!(t.dims(), &Dims::iamc());
        assert_eq!(t.len(), 3);
        assert_eq!(
            t.get(&key!["M", "S", "World", "Primary Energy", "EJ/yr", 2020]),
            Some(&550.5)
        );
        assert_eq!(
            t.get(&key!["M", "S", "World", "Primary Energy", "EJ/yr", 2025]),
            None
        );
    }

    #[test]
    fn long_csv_uses_value_column() {
        let f = write_tmp(".csv", "region,year,value\nA,2020,1.1\nA,2021,\n");
        let t = load_file(f.path()).unwrap();
        assert_eq!(t.dims().names(), ["region", "year"]);
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&key!["A", 2020]), Some(&1.1));
    }

    #[test]
    fn duplicate_rows_are_an_error() {
        let f = write_tmp(".csv", "region,year,value\nA,2020,1.1\nA,2020,1.2\n");
        assert!(load_file(f.path()).is_err());
    }

    #[test]
    fn json_records_get_iamc_dimension_order() {
        let f = write_tmp(
            ".json",
            r#"[
                {"year": 2020, "region": "World", "variable": "X", "value": 2.0},
                {"year": 2021, "region": "World", "variable": "X", "value": null}
            ]"#,
        );
        let t = load_file(f.path()).unwrap();
        assert_eq!(t.dims().names(), ["region", "variable", "year"]);
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&key!["World", "X", 2020]), Some(&2.0));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let f = write_tmp(".xlsx", "");
        assert!(load_file(f.path()).is_err());
    }
}
