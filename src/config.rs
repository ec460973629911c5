use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::model::{Dims, LabeledTable};
use crate::engine::align::BroadcastSpec;
use crate::engine::comparison::ComparisonRegistry;
use crate::engine::criterion::{Criterion, CriterionConfig};
use crate::engine::summary::{Aggregator, Reducer};
use crate::engine::target::{RangeSpec, RelativeRange, TargetRange};
use crate::engine::units::UnitPolicy;
use crate::error::ConfigurationError;
use crate::report::ComparisonReport;

/// On-disk validation setup, e.g.
///
/// ```json
/// {
///   "criterion": {
///     "name": "Reference data ratio comparison",
///     "comparison": "ratio",
///     "broadcast_dims": ["model", "scenario"]
///   },
///   "target": 1.0,
///   "range": { "relative": [0.95, 1.05] },
///   "summary": { "group_dims": ["model", "scenario", "region", "variable"] }
/// }
/// ```
///
/// Required fields are optional here so that a missing one surfaces as a
/// [`ConfigurationError::MissingField`] from [`ValidationConfig::build`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    pub criterion: Option<CriterionSection>,
    pub target: Option<f64>,
    pub range: Option<RangeSection>,
    #[serde(default)]
    pub summary: SummarySection,
    #[serde(default)]
    pub report: ReportSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CriterionSection {
    pub name: Option<String>,
    /// Comparison function name; `ratio` when absent.
    pub comparison: Option<String>,
    #[serde(default)]
    pub broadcast_dims: Vec<String>,
    /// Model schema; the IAMC dimensions when absent.
    pub model_dims: Option<Vec<String>>,
    /// Dimension holding units; `unit` when absent.
    pub unit_dim: Option<String>,
    #[serde(default)]
    pub convert_units: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSection {
    Absolute([f64; 2]),
    Relative([f64; 2]),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummarySection {
    /// Dimensions kept in the summary; every model dimension except the
    /// time dimension when absent.
    pub group_dims: Option<Vec<String>>,
    pub reducer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportSection {
    pub time_dim: Option<String>,
    pub full_comparison_sheet: Option<String>,
    pub summary_sheet: Option<String>,
}

impl ValidationConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid validation config")
    }

    /// Build the whole pipeline against `reference`. Every check runs here,
    /// before any model data is seen.
    pub fn build(
        &self,
        reference: &LabeledTable,
        registry: &ComparisonRegistry,
    ) -> Result<ComparisonReport, ConfigurationError> {
        let section = self
            .criterion
            .as_ref()
            .ok_or(ConfigurationError::MissingField("criterion"))?;
        let name = section
            .name
            .clone()
            .ok_or(ConfigurationError::MissingField("criterion.name"))?;
        let target = self.target.ok_or(ConfigurationError::MissingField("target"))?;
        let range: RangeSpec = match self.range.ok_or(ConfigurationError::MissingField("range"))? {
            RangeSection::Absolute([low, high]) => (low, high).into(),
            RangeSection::Relative([low, high]) => RelativeRange::new(low, high)?.into(),
        };

        let model_dims = match &section.model_dims {
            Some(dims) => Dims::new(dims.iter().cloned())?,
            None => Dims::iamc(),
        };
        let comparison = registry.resolve(section.comparison.as_deref().unwrap_or("ratio"))?;
        let units = UnitPolicy {
            dim: Some(section.unit_dim.clone().unwrap_or_else(|| "unit".to_string())),
            convert: section.convert_units,
            ..UnitPolicy::default()
        };

        let criterion = Criterion::new(
            reference,
            CriterionConfig::new(name)
                .comparison(comparison)
                .broadcast(BroadcastSpec::new(section.broadcast_dims.iter().cloned()))
                .model_dims(model_dims.clone())
                .units(units),
        )?;
        let target_range = TargetRange::new(criterion, target, range)?;

        let time_dim = self
            .report
            .time_dim
            .clone()
            .unwrap_or_else(|| "year".to_string());
        let group_dims: Vec<String> = match &self.summary.group_dims {
            Some(dims) => dims.clone(),
            None => model_dims.without(&time_dim).names().to_vec(),
        };
        let reducer: Reducer = match &self.summary.reducer {
            Some(name) => name.parse()?,
            None => Reducer::default(),
        };
        let aggregator = Aggregator::new(group_dims, &model_dims)?.with_reducer(reducer);

        let mut report = ComparisonReport::new(target_range, aggregator, time_dim)?;
        if self.report.full_comparison_sheet.is_some() || self.report.summary_sheet.is_some() {
            report = report.with_sheet_names(
                self.report
                    .full_comparison_sheet
                    .as_deref()
                    .unwrap_or(crate::report::FULL_COMPARISON_KEY),
                self.report
                    .summary_sheet
                    .as_deref()
                    .unwrap_or(crate::report::SUMMARY_KEY),
            );
        }
        Ok(report)
    }
}
