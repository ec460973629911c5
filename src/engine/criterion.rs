use crate::data::model::{Dims, LabeledTable};
use crate::engine::align::{AlignReport, Aligner, BroadcastSpec};
use crate::engine::comparison::ComparisonFunction;
use crate::engine::units::UnitPolicy;
use crate::error::{ConfigurationError, EngineError};

/// Settings for building a [`Criterion`].
#[derive(Debug, Clone)]
pub struct CriterionConfig {
    pub name: String,
    pub comparison: ComparisonFunction,
    pub broadcast: BroadcastSpec,
    /// Dimensions every model table passed to `compare` must have.
    pub model_dims: Dims,
    pub units: UnitPolicy,
}

impl CriterionConfig {
    /// IAMC model schema, ratio comparison, no broadcasting.
    pub fn new(name: impl Into<String>) -> Self {
        CriterionConfig {
            name: name.into(),
            comparison: ComparisonFunction::Ratio,
            broadcast: BroadcastSpec::none(),
            model_dims: Dims::iamc(),
            units: UnitPolicy::default(),
        }
    }

    pub fn comparison(mut self, comparison: ComparisonFunction) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn broadcast(mut self, broadcast: BroadcastSpec) -> Self {
        self.broadcast = broadcast;
        self
    }

    pub fn model_dims(mut self, dims: Dims) -> Self {
        self.model_dims = dims;
        self
    }

    pub fn units(mut self, units: UnitPolicy) -> Self {
        self.units = units;
        self
    }
}

/// Per-point comparison values plus the alignment counts that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonResult {
    /// Keyed like the model input, restricted to the overlap, sorted by key.
    pub values: LabeledTable,
    pub report: AlignReport,
}

/// Compares model data against reference data held since construction.
#[derive(Debug, Clone)]
pub struct Criterion {
    name: String,
    reference: LabeledTable,
    comparison: ComparisonFunction,
    broadcast: BroadcastSpec,
    aligner: Aligner,
}

impl Criterion {
    /// The reference table is copied; later changes to the caller's table do
    /// not reach the criterion.
    pub fn new(reference: &LabeledTable, config: CriterionConfig) -> Result<Self, ConfigurationError> {
        if config.name.trim().is_empty() {
            return Err(ConfigurationError::MissingField("name"));
        }
        let aligner = Aligner::new(&config.model_dims, reference, &config.broadcast, &config.units)?;
        log::debug!(
            "criterion '{}' built with {} comparison over {} reference rows",
            config.name,
            config.comparison.name(),
            reference.len()
        );
        Ok(Criterion {
            name: config.name,
            reference: reference.clone(),
            comparison: config.comparison,
            broadcast: config.broadcast,
            aligner,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reference(&self) -> &LabeledTable {
        &self.reference
    }

    pub fn comparison(&self) -> &ComparisonFunction {
        &self.comparison
    }

    pub fn broadcast_dims(&self) -> &[String] {
        self.broadcast.dims()
    }

    pub fn model_dims(&self) -> &Dims {
        self.aligner.model_dims()
    }

    pub fn match_dims(&self) -> &[String] {
        self.aligner.match_dims()
    }

    /// Apply the comparison function to every model row that has a
    /// reference counterpart.
    pub fn compare(&self, model: &LabeledTable) -> Result<ComparisonResult, EngineError> {
        let (points, report) = self.aligner.align(model)?;

        let mut values = LabeledTable::new(model.dims().clone());
        for point in points {
            let value = self
                .comparison
                .apply(point.model_value, point.reference_value)
                .map_err(|source| EngineError::ComparisonFunction {
                    function: self.comparison.name().to_string(),
                    key: point.key.clone(),
                    source,
                })?;
            values.insert(point.key, value)?;
        }

        if values.is_empty() && !model.is_empty() {
            log::warn!(
                "criterion '{}': none of {} model rows matched the reference on {:?}",
                self.name,
                model.len(),
                self.match_dims()
            );
        } else {
            log::debug!(
                "criterion '{}': {} values, {} model rows dropped",
                self.name,
                values.len(),
                report.dropped()
            );
        }
        Ok(ComparisonResult {
            values: values.sorted(),
            report,
        })
    }

    /// Same as [`Criterion::compare`].
    pub fn get_values(&self, model: &LabeledTable) -> Result<ComparisonResult, EngineError> {
        self.compare(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Key;
    use crate::key;

    fn dims() -> Dims {
        Dims::new(["region", "year"]).unwrap()
    }

    fn criterion(comparison: ComparisonFunction) -> Criterion {
        let reference = LabeledTable::from_rows(
            dims(),
            vec![
                (key!["A", 2020], 1.0),
                (key!["A", 2021], 1.0),
                (key!["B", 2020], 0.0),
            ],
        )
        .unwrap();
        let config = CriterionConfig::new("test")
            .model_dims(dims())
            .comparison(comparison);
        Criterion::new(&reference, config).unwrap()
    }

    #[test]
    fn results_are_sorted_by_key() {
        let model = LabeledTable::from_rows(
            dims(),
            vec![(key!["B", 2020], 2.0), (key!["A", 2021], 0.8), (key!["A", 2020], 1.1)],
        )
        .unwrap();
        let result = criterion(ComparisonFunction::Ratio).compare(&model).unwrap();
        let keys: Vec<&Key> = result.values.keys().collect();
        assert_eq!(keys, [&key!["A", 2020], &key!["A", 2021], &key!["B", 2020]]);
        assert_eq!(result.values.get(&key!["B", 2020]), Some(&f64::INFINITY));
    }

    #[test]
    fn model_with_reordered_columns_keeps_its_own_layout() {
        let model = LabeledTable::from_rows(
            Dims::new(["year", "region"]).unwrap(),
            vec![(key![2021, "A"], 0.8), (key![2020, "A"], 1.1)],
        )
        .unwrap();
        let result = criterion(ComparisonFunction::Ratio).compare(&model).unwrap();
        assert_eq!(result.values.dims().names(), ["year", "region"]);
        assert_eq!(result.values.get(&key![2020, "A"]), Some(&1.1));
        assert_eq!(result.values.get(&key![2021, "A"]), Some(&0.8));
        assert_eq!(result.report.matched, 2);
    }

    #[test]
    fn empty_name_is_rejected() {
        let reference = LabeledTable::new(dims());
        let err = Criterion::new(&reference, CriterionConfig::new(" ").model_dims(dims()))
            .unwrap_err();
        assert_eq!(err, ConfigurationError::MissingField("name"));
    }

    #[test]
    fn reference_is_copied_at_construction() {
        let mut reference = LabeledTable::from_rows(dims(), vec![(key!["A", 2020], 1.0)]).unwrap();
        let c = Criterion::new(&reference, CriterionConfig::new("copy").model_dims(dims())).unwrap();
        reference.insert(key!["A", 2021], 2.0).unwrap();
        assert_eq!(c.reference().len(), 1);
    }

    #[test]
    fn custom_function_failure_carries_key() {
        let strict = ComparisonFunction::custom("strict_ratio", |m: f64, r: f64| {
            if r == 0.0 {
                Err(format!("reference is zero for model value {m}").into())
            } else {
                Ok(m / r)
            }
        });
        let model = LabeledTable::from_rows(dims(), vec![(key!["B", 2020], 2.0)]).unwrap();
        match criterion(strict).compare(&model).unwrap_err() {
            EngineError::ComparisonFunction { function, key, source } => {
                assert_eq!(function, "strict_ratio");
                assert_eq!(key, key!["B", 2020]);
                assert!(source.to_string().contains("reference is zero"));
            }
            other => panic!("unexpected error {other}"),
        }
    }
}
