use std::fmt;
use std::sync::Arc;

use crate::data::model::LabeledTable;
use crate::engine::criterion::{ComparisonResult, Criterion};
use crate::error::{ConfigurationError, EngineError};

/// Range bounds given as multipliers of the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeRange {
    low: f64,
    high: f64,
}

impl RelativeRange {
    /// The target must lie inside the range: `low <= 1 <= high`.
    pub fn new(low: f64, high: f64) -> Result<Self, ConfigurationError> {
        if !(low <= 1.0 && high >= 1.0) || !low.is_finite() || !high.is_finite() {
            return Err(ConfigurationError::InvalidRange(format!(
                "relative range ({low}, {high}) must satisfy low <= 1 <= high"
            )));
        }
        Ok(RelativeRange { low, high })
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeSpec {
    Absolute(f64, f64),
    Relative(RelativeRange),
}

impl From<(f64, f64)> for RangeSpec {
    fn from((low, high): (f64, f64)) -> Self {
        RangeSpec::Absolute(low, high)
    }
}

impl From<RelativeRange> for RangeSpec {
    fn from(r: RelativeRange) -> Self {
        RangeSpec::Relative(r)
    }
}

pub type DistanceFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// How far a value lies from the allowed range.
#[derive(Clone, Default)]
pub enum DistanceFunction {
    /// Negative below the range, positive above, 0 inside; magnitude is the
    /// gap to the nearest bound.
    #[default]
    SignedGap,
    Custom { name: String, func: DistanceFn },
}

impl DistanceFunction {
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        DistanceFunction::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DistanceFunction::SignedGap => "signed_gap",
            DistanceFunction::Custom { name, .. } => name,
        }
    }
}

impl fmt::Debug for DistanceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DistanceFunction({})", self.name())
    }
}

/// Comparison values, distances and in-range flags from one compare pass.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEvaluation {
    pub comparison: ComparisonResult,
    pub distances: LabeledTable<f64>,
    pub in_range: LabeledTable<bool>,
}

/// Classifies criterion values against a target and an allowed range.
#[derive(Debug, Clone)]
pub struct TargetRange {
    criterion: Criterion,
    name: String,
    target: f64,
    low: f64,
    high: f64,
    relative: Option<RelativeRange>,
    distance: DistanceFunction,
}

impl TargetRange {
    pub fn new(
        criterion: Criterion,
        target: f64,
        range: impl Into<RangeSpec>,
    ) -> Result<Self, ConfigurationError> {
        if !target.is_finite() {
            return Err(ConfigurationError::InvalidRange(format!(
                "target {target} is not finite"
            )));
        }
        let (low, high, relative) = match range.into() {
            RangeSpec::Absolute(low, high) => {
                if !(low <= target && target <= high) {
                    return Err(ConfigurationError::InvalidRange(format!(
                        "range ({low}, {high}) does not contain target {target}"
                    )));
                }
                (low, high, None)
            }
            RangeSpec::Relative(rel) => {
                let (low, high) = (target * rel.low(), target * rel.high());
                if low > high {
                    return Err(ConfigurationError::InvalidRange(format!(
                        "relative range ({}, {}) of target {target} gives low {low} > high {high}",
                        rel.low(),
                        rel.high()
                    )));
                }
                (low, high, Some(rel))
            }
        };
        Ok(TargetRange {
            name: criterion.name().to_string(),
            criterion,
            target,
            low,
            high,
            relative,
            distance: DistanceFunction::default(),
        })
    }

    pub fn with_distance(mut self, distance: DistanceFunction) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn criterion(&self) -> &Criterion {
        &self.criterion
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Absolute `(low, high)` bounds.
    pub fn range(&self) -> (f64, f64) {
        (self.low, self.high)
    }

    /// The multipliers the range was built from, if it was given relatively.
    pub fn relative_range(&self) -> Option<RelativeRange> {
        self.relative
    }

    /// Inclusive at both ends. NaN and infinities are never in range.
    pub fn is_in_range(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }

    pub fn is_below_range(&self, value: f64) -> bool {
        value < self.low
    }

    pub fn is_above_range(&self, value: f64) -> bool {
        value > self.high
    }

    pub fn get_distance(&self, value: f64) -> f64 {
        match &self.distance {
            DistanceFunction::SignedGap => {
                if value.is_nan() {
                    f64::NAN
                } else if value < self.low {
                    value - self.low
                } else if value > self.high {
                    value - self.high
                } else {
                    0.0
                }
            }
            DistanceFunction::Custom { func, .. } => func(value),
        }
    }

    pub fn get_values(&self, model: &LabeledTable) -> Result<ComparisonResult, EngineError> {
        self.criterion.compare(model)
    }

    pub fn get_in_range(&self, model: &LabeledTable) -> Result<LabeledTable<bool>, EngineError> {
        let result = self.criterion.compare(model)?;
        Ok(result.values.map_values(|_, &v| self.is_in_range(v)))
    }

    pub fn get_distances(&self, model: &LabeledTable) -> Result<LabeledTable<f64>, EngineError> {
        let result = self.criterion.compare(model)?;
        Ok(result.values.map_values(|_, &v| self.get_distance(v)))
    }

    /// Comparison, distances and in-range flags from a single compare call.
    pub fn evaluate(&self, model: &LabeledTable) -> Result<TargetEvaluation, EngineError> {
        let comparison = self.criterion.compare(model)?;
        let distances = comparison.values.map_values(|_, &v| self.get_distance(v));
        let in_range = comparison.values.map_values(|_, &v| self.is_in_range(v));
        Ok(TargetEvaluation {
            comparison,
            distances,
            in_range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Dims;
    use crate::engine::criterion::CriterionConfig;

    fn criterion() -> Criterion {
        let dims = Dims::new(["region", "year"]).unwrap();
        Criterion::new(
            &LabeledTable::new(dims.clone()),
            CriterionConfig::new("ratio").model_dims(dims),
        )
        .unwrap()
    }

    fn range() -> TargetRange {
        TargetRange::new(criterion(), 1.0, (0.95, 1.05)).unwrap()
    }

    #[test]
    fn bounds_are_inclusive() {
        let t = range();
        assert!(t.is_in_range(0.95));
        assert!(t.is_in_range(1.05));
        assert!(!t.is_in_range(1.05 + 1e-12));
        assert!(!t.is_in_range(0.95 - 1e-12));
    }

    #[test]
    fn distance_sign_follows_side() {
        let t = range();
        assert_eq!(t.get_distance(1.0), 0.0);
        assert!((t.get_distance(0.80) + 0.15).abs() < 1e-12);
        assert!((t.get_distance(1.25) - 0.20).abs() < 1e-12);
        assert!(t.is_below_range(0.80));
        assert!(t.is_above_range(1.25));
    }

    #[test]
    fn nan_and_infinity_are_out_of_range() {
        let t = range();
        assert!(!t.is_in_range(f64::NAN));
        assert!(t.get_distance(f64::NAN).is_nan());
        assert!(!t.is_below_range(f64::NAN) && !t.is_above_range(f64::NAN));
        assert!(!t.is_in_range(f64::INFINITY));
        assert_eq!(t.get_distance(f64::INFINITY), f64::INFINITY);
        assert_eq!(t.get_distance(f64::NEG_INFINITY), f64::NEG_INFINITY);
    }

    #[test]
    fn relative_range_scales_with_target() {
        let t = TargetRange::new(criterion(), 1.0, RelativeRange::new(0.95, 1.05).unwrap()).unwrap();
        assert_eq!(t.range(), (0.95, 1.05));
        assert_eq!(t.relative_range(), Some(RelativeRange::new(0.95, 1.05).unwrap()));

        let t = TargetRange::new(criterion(), 200.0, RelativeRange::new(0.5, 1.5).unwrap()).unwrap();
        assert_eq!(t.range(), (100.0, 300.0));
    }

    #[test]
    fn relative_range_must_contain_one() {
        assert!(matches!(
            RelativeRange::new(1.1, 1.2),
            Err(ConfigurationError::InvalidRange(_))
        ));
        assert!(RelativeRange::new(0.9, 0.95).is_err());
        assert!(RelativeRange::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn negative_target_inverts_relative_bounds() {
        let rel = RelativeRange::new(0.9, 1.1).unwrap();
        assert!(TargetRange::new(criterion(), -1.0, rel).is_err());
    }

    #[test]
    fn absolute_range_must_contain_target() {
        assert!(TargetRange::new(criterion(), 1.0, (1.01, 1.05)).is_err());
        assert!(TargetRange::new(criterion(), f64::NAN, (0.0, 1.0)).is_err());
    }

    #[test]
    fn custom_distance_replaces_signed_gap() {
        let t = range().with_distance(DistanceFunction::custom("from_target", |v| v - 1.0));
        assert!((t.get_distance(1.02) - 0.02).abs() < 1e-12);
        assert_eq!(t.name(), "ratio");
    }
}
