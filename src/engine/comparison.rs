use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ConfigurationError, FunctionError};

/// Typed signature of a custom per-point comparison.
pub type ComparisonFn = Arc<dyn Fn(f64, f64) -> Result<f64, FunctionError> + Send + Sync>;

/// Statistic computed from a `(model, reference)` value pair.
///
/// Built-ins follow IEEE semantics: a zero or NaN reference yields `±inf` or
/// NaN, which is passed through untouched.
#[derive(Clone, Default)]
pub enum ComparisonFunction {
    /// `model / reference`
    #[default]
    Ratio,
    /// `model - reference`
    Difference,
    /// `(model - reference) / reference`
    RelativeDifference,
    /// `100 * (model - reference) / reference`
    PercentageDifference,
    Custom { name: String, func: ComparisonFn },
}

impl ComparisonFunction {
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(f64, f64) -> Result<f64, FunctionError> + Send + Sync + 'static,
    {
        ComparisonFunction::Custom {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ComparisonFunction::Ratio => "ratio",
            ComparisonFunction::Difference => "difference",
            ComparisonFunction::RelativeDifference => "relative_difference",
            ComparisonFunction::PercentageDifference => "percentage_difference",
            ComparisonFunction::Custom { name, .. } => name,
        }
    }

    pub fn apply(&self, model: f64, reference: f64) -> Result<f64, FunctionError> {
        Ok(match self {
            ComparisonFunction::Ratio => model / reference,
            ComparisonFunction::Difference => model - reference,
            ComparisonFunction::RelativeDifference => (model - reference) / reference,
            ComparisonFunction::PercentageDifference => 100.0 * (model - reference) / reference,
            ComparisonFunction::Custom { func, .. } => return func(model, reference),
        })
    }

    fn builtin(name: &str) -> Option<Self> {
        match name {
            "ratio" => Some(ComparisonFunction::Ratio),
            "difference" | "diff" => Some(ComparisonFunction::Difference),
            "relative_difference" => Some(ComparisonFunction::RelativeDifference),
            "percentage_difference" | "pct_diff" => Some(ComparisonFunction::PercentageDifference),
            _ => None,
        }
    }
}

impl fmt::Debug for ComparisonFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComparisonFunction({})", self.name())
    }
}

impl FromStr for ComparisonFunction {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::builtin(s).ok_or_else(|| ConfigurationError::UnknownFunction {
            kind: "comparison",
            name: s.to_string(),
        })
    }
}

/// Named comparison functions: the built-ins plus any registered customs.
/// A custom function registered under a built-in name shadows it.
#[derive(Clone, Default, Debug)]
pub struct ComparisonRegistry {
    custom: BTreeMap<String, ComparisonFunction>,
}

impl ComparisonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, func: F) -> &mut Self
    where
        F: Fn(f64, f64) -> Result<f64, FunctionError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.custom
            .insert(name.clone(), ComparisonFunction::custom(name, func));
        self
    }

    pub fn resolve(&self, name: &str) -> Result<ComparisonFunction, ConfigurationError> {
        match self.custom.get(name) {
            Some(f) => Ok(f.clone()),
            None => name.parse(),
        }
    }

    /// All names this registry resolves.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = [
            "ratio",
            "difference",
            "relative_difference",
            "percentage_difference",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(self.custom.keys().cloned())
        .collect();
        names.sort();
        names.dedup();
        names
    }
}
