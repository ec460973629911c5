//! Report preparation: turns engine output into named sheets of styled
//! cells for an external renderer, and writes sheets as CSV.

pub mod style;

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::data::model::{DimValue, LabeledTable};
use crate::engine::summary::{Aggregator, SummaryTable};
use crate::engine::target::{TargetEvaluation, TargetRange};
use crate::error::{ConfigurationError, EngineError};
use style::{CellStyle, StylePalette};

pub const FULL_COMPARISON_KEY: &str = "Full comparison";
pub const SUMMARY_KEY: &str = "Summary metrics";

/// Summary column titles.
pub const DISTANCE_TITLE: &str = "Max deviation";
pub const IN_RANGE_TITLE: &str = "In range";
pub const POINTS_TITLE: &str = "Data points";

// ---------------------------------------------------------------------------
// Sheet model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Label(String),
    Number(f64),
    Flag(bool),
    Count(usize),
    Empty,
}

impl CellValue {
    fn render(&self) -> String {
        match self {
            CellValue::Label(s) => s.clone(),
            CellValue::Number(v) => v.to_string(),
            CellValue::Flag(b) => b.to_string(),
            CellValue::Count(n) => n.to_string(),
            CellValue::Empty => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: CellValue,
    pub style: CellStyle,
}

impl Cell {
    fn plain(value: CellValue) -> Self {
        Cell {
            value,
            style: CellStyle::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

fn label_cells(labels: &[DimValue]) -> impl Iterator<Item = Cell> + '_ {
    labels
        .iter()
        .map(|v| Cell::plain(CellValue::Label(v.to_string())))
}

// ---------------------------------------------------------------------------
// ComparisonReport
// ---------------------------------------------------------------------------

/// Full comparison and summary sheets for one target range.
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    target_range: TargetRange,
    aggregator: Aggregator,
    time_dim: String,
    full_comparison_key: String,
    summary_key: String,
    palette: StylePalette,
}

impl ComparisonReport {
    /// `time_dim` is pivoted into columns in the full comparison sheet. It and
    /// the aggregator's group dimensions must be model dimensions.
    pub fn new(
        target_range: TargetRange,
        aggregator: Aggregator,
        time_dim: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let time_dim = time_dim.into();
        if !target_range.criterion().model_dims().contains(&time_dim) {
            return Err(ConfigurationError::MissingDimension {
                dim: time_dim,
                side: "model",
            });
        }
        for dim in aggregator.group_dims().names() {
            if !target_range.criterion().model_dims().contains(dim) {
                return Err(ConfigurationError::MissingDimension {
                    dim: dim.clone(),
                    side: "model",
                });
            }
        }
        Ok(ComparisonReport {
            target_range,
            aggregator,
            time_dim,
            full_comparison_key: FULL_COMPARISON_KEY.to_string(),
            summary_key: SUMMARY_KEY.to_string(),
            palette: StylePalette::default(),
        })
    }

    pub fn with_sheet_names(
        mut self,
        full_comparison: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        self.full_comparison_key = full_comparison.into();
        self.summary_key = summary.into();
        self
    }

    pub fn with_palette(mut self, palette: StylePalette) -> Self {
        self.palette = palette;
        self
    }

    pub fn target_range(&self) -> &TargetRange {
        &self.target_range
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Both sheets from a single comparison pass: full comparison first,
    /// summary second.
    pub fn prepare_output(&self, model: &LabeledTable) -> Result<Vec<Sheet>, EngineError> {
        let evaluation = self.target_range.evaluate(model)?;
        let summary = self.aggregator.summarize_evaluation(&evaluation)?;
        log::info!(
            "'{}': {} points compared, {} of {} groups out of range",
            self.target_range.name(),
            evaluation.comparison.values.len(),
            summary.in_range.values().filter(|ok| !**ok).count(),
            summary.in_range.len()
        );
        Ok(vec![
            self.full_comparison_sheet(&evaluation)?,
            self.summary_sheet(&summary),
        ])
    }

    fn range_width(&self) -> f64 {
        let (low, high) = self.target_range.range();
        high - low
    }

    pub fn full_comparison_sheet(&self, evaluation: &TargetEvaluation) -> Result<Sheet, EngineError> {
        let wide = evaluation.comparison.values.unstack(&self.time_dim)?;
        let header: Vec<String> = wide
            .row_dims
            .names()
            .iter()
            .cloned()
            .chain(wide.columns.iter().map(|c| c.to_string()))
            .collect();
        let width = self.range_width();
        let rows: Vec<Vec<Cell>> = wide
            .rows
            .iter()
            .map(|(key, values)| {
                label_cells(key.values())
                    .chain(values.iter().map(|v| match v {
                        Some(v) => Cell {
                            value: CellValue::Number(*v),
                            style: self
                                .palette
                                .style_for(self.target_range.get_distance(*v), width),
                        },
                        None => Cell::plain(CellValue::Empty),
                    }))
                    .collect()
            })
            .collect();
        Ok(Sheet {
            name: self.full_comparison_key.clone(),
            header,
            rows,
        })
    }

    pub fn summary_sheet(&self, summary: &SummaryTable) -> Sheet {
        let header: Vec<String> = summary
            .distances
            .dims()
            .names()
            .iter()
            .cloned()
            .chain([DISTANCE_TITLE, IN_RANGE_TITLE, POINTS_TITLE].map(String::from))
            .collect();
        let width = self.range_width();
        let rows: Vec<Vec<Cell>> = summary
            .distances
            .iter()
            .map(|(key, &distance)| {
                let in_range = summary.in_range.get(key).copied().unwrap_or(false);
                let count = summary.counts.get(key).copied().unwrap_or(0);
                label_cells(key.values())
                    .chain([
                        Cell {
                            value: CellValue::Number(distance),
                            style: self.palette.style_for(distance, width),
                        },
                        Cell::plain(CellValue::Flag(in_range)),
                        Cell::plain(CellValue::Count(count)),
                    ])
                    .collect()
            })
            .collect();
        Sheet {
            name: self.summary_key.clone(),
            header,
            rows,
        }
    }
}

// ---------------------------------------------------------------------------
// CSV output
// ---------------------------------------------------------------------------

/// Write the values of `sheet` as CSV. Styles are not representable in CSV
/// and are dropped.
pub fn write_csv_to<W: Write>(sheet: &Sheet, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(&sheet.header)
        .context("writing CSV header")?;
    for (i, row) in sheet.rows.iter().enumerate() {
        csv.write_record(row.iter().map(|c| c.value.render()))
            .with_context(|| format!("writing CSV row {i}"))?;
    }
    csv.flush().context("flushing CSV")?;
    Ok(())
}

pub fn write_csv(sheet: &Sheet, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    write_csv_to(sheet, file).with_context(|| format!("writing sheet '{}'", sheet.name))
}

/// File name for a sheet: lower-case, spaces to underscores, `.csv`.
pub fn sheet_file_name(sheet: &Sheet) -> String {
    let stem: String = sheet
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!("{stem}.csv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Dims;
    use crate::engine::criterion::{Criterion, CriterionConfig};
    use crate::key;

    fn dims() -> Dims {
        Dims::new(["region", "year"]).unwrap()
    }

    fn report() -> ComparisonReport {
        let reference = LabeledTable::from_rows(
            dims(),
            vec![(key!["A", 2020], 1.0), (key!["A", 2021], 1.0)],
        )
        .unwrap();
        let criterion =
            Criterion::new(&reference, CriterionConfig::new("ratio").model_dims(dims())).unwrap();
        let target = TargetRange::new(criterion, 1.0, (0.95, 1.05)).unwrap();
        let aggregator = Aggregator::new(["region"], &dims()).unwrap();
        ComparisonReport::new(target, aggregator, "year").unwrap()
    }

    fn model() -> LabeledTable {
        LabeledTable::from_rows(dims(), vec![(key!["A", 2020], 1.0), (key!["A", 2021], 0.8)])
            .unwrap()
    }

    #[test]
    fn prepares_full_and_summary_sheets() {
        let sheets = report().prepare_output(&model()).unwrap();
        assert_eq!(sheets.len(), 2);

        let full = &sheets[0];
        assert_eq!(full.name, FULL_COMPARISON_KEY);
        assert_eq!(full.header, ["region", "2020", "2021"]);
        assert_eq!(full.rows.len(), 1);
        assert_eq!(full.rows[0][1].style, CellStyle::default());
        assert!(full.rows[0][2].style.background.is_some());

        let summary = &sheets[1];
        assert_eq!(summary.name, SUMMARY_KEY);
        assert_eq!(
            summary.header,
            ["region", DISTANCE_TITLE, IN_RANGE_TITLE, POINTS_TITLE]
        );
        assert_eq!(summary.rows[0][2].value, CellValue::Flag(false));
        assert_eq!(summary.rows[0][3].value, CellValue::Count(2));
    }

    #[test]
    fn time_dimension_must_exist() {
        let r = report();
        let err = ComparisonReport::new(r.target_range.clone(), r.aggregator.clone(), "period")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingDimension { .. }));
    }

    #[test]
    fn group_dimensions_must_exist_in_model() {
        let r = report();
        let other_schema = Dims::new(["variable", "year"]).unwrap();
        let aggregator = Aggregator::new(["variable"], &other_schema).unwrap();
        let err = ComparisonReport::new(r.target_range.clone(), aggregator, "year").unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingDimension {
                dim: "variable".into(),
                side: "model"
            }
        );
    }

    #[test]
    fn csv_output_drops_styles() {
        let sheets = report()
            .with_sheet_names("Ratios", "Worst")
            .prepare_output(&model())
            .unwrap();
        let mut buf = Vec::new();
        write_csv_to(&sheets[0], &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "region,2020,2021\nA,1,0.8\n");
        assert_eq!(sheet_file_name(&sheets[1]), "worst.csv");
    }

    #[test]
    fn sheet_file_names_are_slugged() {
        let sheet = Sheet {
            name: FULL_COMPARISON_KEY.into(),
            header: Vec::new(),
            rows: Vec::new(),
        };
        assert_eq!(sheet_file_name(&sheet), "full_comparison.csv");
    }
}
