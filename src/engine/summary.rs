use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::data::model::{Dims, Key, LabeledTable};
use crate::engine::target::{TargetEvaluation, TargetRange};
use crate::error::{ConfigurationError, EngineError, FunctionError};

pub type ReducerFn = Arc<dyn Fn(&[f64]) -> Result<f64, FunctionError> + Send + Sync>;

/// Reduces the distances of one group to a single number.
///
/// Groups are never empty, and a group holding a NaN summarises to NaN
/// before any reducer runs.
#[derive(Clone, Default)]
pub enum Reducer {
    /// Largest magnitude with its sign kept; the first one wins a tie.
    #[default]
    SignedMaxMagnitude,
    MeanAbsolute,
    MaxAbsolute,
    Custom { name: String, func: ReducerFn },
}

impl Reducer {
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[f64]) -> Result<f64, FunctionError> + Send + Sync + 'static,
    {
        Reducer::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Reducer::SignedMaxMagnitude => "signed_max_magnitude",
            Reducer::MeanAbsolute => "mean_absolute",
            Reducer::MaxAbsolute => "max_absolute",
            Reducer::Custom { name, .. } => name,
        }
    }

    pub fn reduce(&self, values: &[f64]) -> Result<f64, FunctionError> {
        Ok(match self {
            Reducer::SignedMaxMagnitude => signed_max_magnitude(values),
            Reducer::MeanAbsolute => {
                values.iter().map(|v| v.abs()).sum::<f64>() / values.len() as f64
            }
            Reducer::MaxAbsolute => values.iter().fold(0.0, |acc: f64, v| acc.max(v.abs())),
            Reducer::Custom { func, .. } => return func(values),
        })
    }
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reducer({})", self.name())
    }
}

impl FromStr for Reducer {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signed_max_magnitude" | "worst" => Ok(Reducer::SignedMaxMagnitude),
            "mean_absolute" => Ok(Reducer::MeanAbsolute),
            "max_absolute" => Ok(Reducer::MaxAbsolute),
            other => Err(ConfigurationError::UnknownFunction {
                kind: "reducer",
                name: other.to_string(),
            }),
        }
    }
}

/// The value with the largest absolute value, sign preserved. Among equal
/// magnitudes the earliest value wins. NaN if `values` is empty or holds NaN.
pub fn signed_max_magnitude(values: &[f64]) -> f64 {
    let mut iter = values.iter().copied();
    let Some(mut best) = iter.next() else {
        return f64::NAN;
    };
    if best.is_nan() {
        return f64::NAN;
    }
    for v in iter {
        if v.is_nan() {
            return f64::NAN;
        }
        if v.abs() > best.abs() {
            best = v;
        }
    }
    best
}

/// Per-group summary of a target evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    /// Reduced distance per group.
    pub distances: LabeledTable<f64>,
    /// Whether every point of the group is in range.
    pub in_range: LabeledTable<bool>,
    /// Number of points in the group.
    pub counts: LabeledTable<usize>,
}

/// Groups distances by a subset of the model dimensions and reduces them.
#[derive(Debug, Clone)]
pub struct Aggregator {
    group_dims: Dims,
    reducer: Reducer,
}

impl Aggregator {
    /// `group_dims` must all be model dimensions; the rest are reduced away.
    pub fn new<I, S>(group_dims: I, model_dims: &Dims) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let group_dims = Dims::new(group_dims)?;
        for dim in group_dims.names() {
            if !model_dims.contains(dim) {
                return Err(ConfigurationError::MissingDimension {
                    dim: dim.clone(),
                    side: "model",
                });
            }
        }
        Ok(Aggregator {
            group_dims,
            reducer: Reducer::default(),
        })
    }

    pub fn with_reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn group_dims(&self) -> &Dims {
        &self.group_dims
    }

    pub fn reducer(&self) -> &Reducer {
        &self.reducer
    }

    pub fn summarize(
        &self,
        target_range: &TargetRange,
        model: &LabeledTable,
    ) -> Result<SummaryTable, EngineError> {
        let evaluation = target_range.evaluate(model)?;
        self.summarize_evaluation(&evaluation)
    }

    pub fn summarize_evaluation(
        &self,
        evaluation: &TargetEvaluation,
    ) -> Result<SummaryTable, EngineError> {
        self.summarize_distances(&evaluation.distances, &evaluation.in_range)
    }

    /// Group in the order of `distances`, so ties resolve by that order.
    pub fn summarize_distances(
        &self,
        distances: &LabeledTable<f64>,
        in_range: &LabeledTable<bool>,
    ) -> Result<SummaryTable, EngineError> {
        let idx = distances.dims().indices_of(self.group_dims.names())?;

        let mut groups: Vec<(Key, Vec<f64>, bool)> = Vec::new();
        let mut positions: HashMap<Key, usize> = HashMap::new();
        for (key, &distance) in distances.iter() {
            let group_key = key.project(&idx);
            let pos = *positions.entry(group_key.clone()).or_insert_with(|| {
                groups.push((group_key, Vec::new(), true));
                groups.len() - 1
            });
            let group = &mut groups[pos];
            group.1.push(distance);
            group.2 &= in_range.get(key).copied().unwrap_or(false);
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (key, values, all_in_range) in groups {
            let reduced = if values.iter().any(|v| v.is_nan()) {
                f64::NAN
            } else {
                self.reducer
                    .reduce(&values)
                    .map_err(|source| EngineError::ComparisonFunction {
                        function: self.reducer.name().to_string(),
                        key: key.clone(),
                        source,
                    })?
            };
            rows.push((key, reduced, all_in_range, values.len()));
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let mut summary = SummaryTable {
            distances: LabeledTable::new(self.group_dims.clone()),
            in_range: LabeledTable::new(self.group_dims.clone()),
            counts: LabeledTable::new(self.group_dims.clone()),
        };
        for (key, reduced, all_in_range, count) in rows {
            summary.distances.insert(key.clone(), reduced)?;
            summary.in_range.insert(key.clone(), all_in_range)?;
            summary.counts.insert(key, count)?;
        }
        log::debug!(
            "summarized {} points into {} groups by {}",
            distances.len(),
            summary.distances.len(),
            self.group_dims
        );
        Ok(summary)
    }
}

/// Summarise with the default reducer, grouping by `group_dims`.
pub fn summarize<S: AsRef<str>>(
    target_range: &TargetRange,
    model: &LabeledTable,
    group_dims: &[S],
) -> Result<SummaryTable, EngineError> {
    let aggregator = Aggregator::new(
        group_dims.iter().map(|d| d.as_ref().to_string()),
        target_range.criterion().model_dims(),
    )?;
    aggregator.summarize(target_range, model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;

    fn distances(rows: Vec<(Key, f64)>) -> (LabeledTable<f64>, LabeledTable<bool>) {
        let d = LabeledTable::from_rows(Dims::new(["variable", "year"]).unwrap(), rows).unwrap();
        let in_range = d.map_values(|_, &v| v == 0.0);
        (d, in_range)
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(["variable"], &Dims::new(["variable", "year"]).unwrap()).unwrap()
    }

    #[test]
    fn signed_max_magnitude_keeps_sign() {
        assert_eq!(signed_max_magnitude(&[0.0, -0.15, 0.1]), -0.15);
        assert_eq!(signed_max_magnitude(&[0.2, -0.15]), 0.2);
    }

    #[test]
    fn ties_prefer_first_value() {
        assert_eq!(signed_max_magnitude(&[-0.5, 0.5]), -0.5);
        assert_eq!(signed_max_magnitude(&[0.5, -0.5]), 0.5);
    }

    #[test]
    fn nan_poisons_group() {
        let (d, r) = distances(vec![
            (key!["X", 2020], 0.3),
            (key!["X", 2021], f64::NAN),
            (key!["Y", 2020], -0.1),
        ]);
        let s = aggregator().summarize_distances(&d, &r).unwrap();
        assert!(s.distances.get(&key!["X"]).unwrap().is_nan());
        assert_eq!(s.distances.get(&key!["Y"]), Some(&-0.1));
        assert_eq!(s.in_range.get(&key!["X"]), Some(&false));
        assert_eq!(s.counts.get(&key!["X"]), Some(&2));
    }

    #[test]
    fn groups_are_sorted_and_flag_all_in_range() {
        let (d, r) = distances(vec![
            (key!["Y", 2020], 0.0),
            (key!["X", 2020], 0.0),
            (key!["X", 2021], 0.2),
        ]);
        let s = aggregator().summarize_distances(&d, &r).unwrap();
        let keys: Vec<&Key> = s.distances.keys().collect();
        assert_eq!(keys, [&key!["X"], &key!["Y"]]);
        assert_eq!(s.in_range.get(&key!["X"]), Some(&false));
        assert_eq!(s.in_range.get(&key!["Y"]), Some(&true));
    }

    #[test]
    fn alternate_reducers() {
        let (d, r) = distances(vec![(key!["X", 2020], -0.2), (key!["X", 2021], 0.4)]);
        let mean = aggregator()
            .with_reducer(Reducer::MeanAbsolute)
            .summarize_distances(&d, &r)
            .unwrap();
        assert!((mean.distances.get(&key!["X"]).unwrap() - 0.3).abs() < 1e-12);

        let max = aggregator()
            .with_reducer("max_absolute".parse().unwrap())
            .summarize_distances(&d, &r)
            .unwrap();
        assert_eq!(max.distances.get(&key!["X"]), Some(&0.4));
    }

    #[test]
    fn failing_custom_reducer_reports_group() {
        let (d, r) = distances(vec![(key!["X", 2020], 1.0)]);
        let err = aggregator()
            .with_reducer(Reducer::custom("picky", |_| Err("no".into())))
            .summarize_distances(&d, &r)
            .unwrap_err();
        match err {
            EngineError::ComparisonFunction { function, key, .. } => {
                assert_eq!(function, "picky");
                assert_eq!(key, key!["X"]);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn group_dims_must_exist_in_model() {
        let err = Aggregator::new(["region"], &Dims::new(["variable", "year"]).unwrap()).unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingDimension { .. }));
    }

    #[test]
    fn unknown_reducer_name() {
        assert!("median".parse::<Reducer>().is_err());
    }
}
