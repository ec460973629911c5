use std::collections::HashMap;

use crate::data::model::{DimValue, Dims, Key, LabeledTable};
use crate::engine::units::{normalize_unit, UnitPolicy};
use crate::error::{ConfigurationError, EngineError};

/// Dimensions present in the model data and absent from (or ignored in) the
/// reference data. One reference value is reused for every combination of
/// these dimensions found in the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastSpec {
    dims: Vec<String>,
}

impl BroadcastSpec {
    pub fn new<I, S>(dims: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for d in dims {
            let d = d.into();
            if !out.contains(&d) {
                out.push(d);
            }
        }
        BroadcastSpec { dims: out }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn contains(&self, dim: &str) -> bool {
        self.dims.iter().any(|d| d == dim)
    }
}

/// Counts from one alignment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignReport {
    /// Model rows paired with a reference row.
    pub matched: usize,
    /// Model rows without a reference row on the match dimensions.
    pub unmatched: usize,
    /// Model rows holding NaN, never matched.
    pub missing_values: usize,
}

impl AlignReport {
    /// Model rows left out of the comparison.
    pub fn dropped(&self) -> usize {
        self.unmatched + self.missing_values
    }
}

/// A model row paired with its reference value. The model value is already
/// expressed in the reference unit.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedPoint {
    pub key: Key,
    pub model_value: f64,
    pub reference_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct ReferenceEntry {
    value: f64,
    unit: Option<String>,
}

/// Reference data indexed by match key, built once and reused for every
/// model table with the declared schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Aligner {
    model_dims: Dims,
    match_dims: Vec<String>,
    model_match_idx: Vec<usize>,
    model_unit_idx: Option<usize>,
    reference: HashMap<Key, ReferenceEntry>,
    units: UnitPolicy,
}

impl Aligner {
    /// Validate the dimension layout and index the reference.
    ///
    /// Every broadcast dimension must exist in the model schema, every
    /// reference dimension must exist in the model schema, and every model
    /// dimension missing from the reference must be declared as broadcast.
    /// Broadcast dimensions carried by the reference are projected away; if
    /// that leaves two rows on the same match key the reference is ambiguous.
    pub fn new(
        model_dims: &Dims,
        reference: &LabeledTable,
        broadcast: &BroadcastSpec,
        units: &UnitPolicy,
    ) -> Result<Self, ConfigurationError> {
        let ref_dims = reference.dims();

        for dim in broadcast.dims() {
            if !model_dims.contains(dim) {
                return Err(ConfigurationError::MissingDimension {
                    dim: dim.clone(),
                    side: "model",
                });
            }
        }
        for dim in ref_dims.names() {
            if !broadcast.contains(dim) && !model_dims.contains(dim) {
                return Err(ConfigurationError::MissingDimension {
                    dim: dim.clone(),
                    side: "model",
                });
            }
        }
        for dim in model_dims.names() {
            if !broadcast.contains(dim) && !ref_dims.contains(dim) {
                return Err(ConfigurationError::MissingDimension {
                    dim: dim.clone(),
                    side: "reference",
                });
            }
        }

        let unit_dim = units
            .dim
            .as_deref()
            .filter(|u| !broadcast.contains(u) && model_dims.contains(u) && ref_dims.contains(u));

        let match_dims: Vec<String> = model_dims
            .names()
            .iter()
            .filter(|d| !broadcast.contains(d) && Some(d.as_str()) != unit_dim)
            .cloned()
            .collect();

        let model_match_idx = model_dims.indices_of(&match_dims)?;
        let ref_match_idx = ref_dims.indices_of(&match_dims)?;
        let model_unit_idx = unit_dim.and_then(|u| model_dims.index_of(u));
        let ref_unit_idx = unit_dim.and_then(|u| ref_dims.index_of(u));

        let mut index = HashMap::with_capacity(reference.len());
        for (key, &value) in reference.iter() {
            if value.is_nan() {
                continue;
            }
            let match_key = key.project(&ref_match_idx);
            let entry = ReferenceEntry {
                value,
                unit: ref_unit_idx.map(|i| unit_label(&key.values()[i])),
            };
            if index.insert(match_key.clone(), entry).is_some() {
                let ignored = ref_dims
                    .names()
                    .iter()
                    .filter(|d| !match_dims.contains(d))
                    .cloned()
                    .collect();
                return Err(ConfigurationError::AmbiguousReference {
                    key: match_key,
                    ignored,
                });
            }
        }

        log::debug!(
            "aligner ready: {} reference rows, matching on {:?}, broadcasting {:?}",
            index.len(),
            match_dims,
            broadcast.dims()
        );

        Ok(Aligner {
            model_dims: model_dims.clone(),
            match_dims,
            model_match_idx,
            model_unit_idx,
            reference: index,
            units: units.clone(),
        })
    }

    pub fn model_dims(&self) -> &Dims {
        &self.model_dims
    }

    /// Dimensions that must match exactly, in model order. The unit
    /// dimension is compared separately and is not listed.
    pub fn match_dims(&self) -> &[String] {
        &self.match_dims
    }

    /// Pair each model row with its reference value, in model row order.
    pub fn align(
        &self,
        model: &LabeledTable,
    ) -> Result<(Vec<AlignedPoint>, AlignReport), EngineError> {
        let (match_idx, unit_idx) = self.model_positions(model.dims())?;

        let mut report = AlignReport::default();
        let mut points = Vec::with_capacity(model.len().min(self.reference.len()));

        for (key, &value) in model.iter() {
            if value.is_nan() {
                report.missing_values += 1;
                continue;
            }
            let Some(entry) = self.reference.get(&key.project(&match_idx)) else {
                report.unmatched += 1;
                continue;
            };
            let model_value = match (unit_idx, &entry.unit) {
                (Some(idx), Some(ref_unit)) => {
                    let model_unit = unit_label(&key.values()[idx]);
                    value * self.unit_factor(key, &model_unit, ref_unit)?
                }
                _ => value,
            };
            report.matched += 1;
            points.push(AlignedPoint {
                key: key.clone(),
                model_value,
                reference_value: entry.value,
            });
        }

        if report.dropped() > 0 {
            log::debug!(
                "alignment dropped {} of {} model rows ({} unmatched, {} missing)",
                report.dropped(),
                model.len(),
                report.unmatched,
                report.missing_values
            );
        }
        Ok((points, report))
    }

    /// Match and unit positions in a model table. The table must carry the
    /// declared dimensions, in any column order.
    fn model_positions(&self, dims: &Dims) -> Result<(Vec<usize>, Option<usize>), EngineError> {
        if dims == &self.model_dims {
            return Ok((self.model_match_idx.clone(), self.model_unit_idx));
        }
        let same_set = dims.len() == self.model_dims.len()
            && self.model_dims.names().iter().all(|d| dims.contains(d));
        if !same_set {
            return Err(EngineError::SchemaMismatch {
                expected: self.model_dims.names().to_vec(),
                found: dims.names().to_vec(),
            });
        }
        let match_idx = dims.indices_of(&self.match_dims)?;
        let unit_idx = self
            .model_unit_idx
            .and_then(|i| dims.index_of(&self.model_dims.names()[i]));
        Ok((match_idx, unit_idx))
    }

    fn unit_factor(&self, key: &Key, model_unit: &str, ref_unit: &str) -> Result<f64, EngineError> {
        let mismatch = || EngineError::UnitMismatch {
            key: key.clone(),
            model_unit: model_unit.to_string(),
            reference_unit: ref_unit.to_string(),
        };
        if normalize_unit(model_unit) == normalize_unit(ref_unit) {
            return Ok(1.0);
        }
        if !self.units.convert {
            return Err(mismatch());
        }
        self.units
            .registry
            .conversion_factor(model_unit, ref_unit)
            .ok_or_else(mismatch)
    }
}

fn unit_label(v: &DimValue) -> String {
    match v {
        DimValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Align `model` against `reference` in one step, treating the model's own
/// dimensions as its schema.
pub fn align(
    model: &LabeledTable,
    reference: &LabeledTable,
    broadcast: &BroadcastSpec,
    units: &UnitPolicy,
) -> Result<(Vec<AlignedPoint>, AlignReport), EngineError> {
    Aligner::new(model.dims(), reference, broadcast, units)?.align(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key;

    fn dims(names: &[&str]) -> Dims {
        Dims::new(names.iter().copied()).unwrap()
    }

    fn reference() -> LabeledTable {
        LabeledTable::from_rows(
            dims(&["region", "unit", "year"]),
            vec![
                (key!["World", "EJ/yr", 2020], 500.0),
                (key!["World", "EJ/yr", 2030], 600.0),
            ],
        )
        .unwrap()
    }

    fn model(unit: &str) -> LabeledTable {
        LabeledTable::from_rows(
            dims(&["scenario", "region", "unit", "year"]),
            vec![
                (key!["S1", "World", unit, 2020], 550.0),
                (key!["S2", "World", unit, 2020], 450.0),
                (key!["S1", "World", unit, 2040], 700.0),
                (key!["S1", "World", unit, 2030], f64::NAN),
            ],
        )
        .unwrap()
    }

    #[test]
    fn broadcasts_reference_over_scenarios() {
        let (points, report) = align(
            &model("EJ/yr"),
            &reference(),
            &BroadcastSpec::new(["scenario"]),
            &UnitPolicy::default(),
        )
        .unwrap();
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.reference_value == 500.0));
        assert_eq!(
            report,
            AlignReport {
                matched: 2,
                unmatched: 1,
                missing_values: 1
            }
        );
        assert_eq!(report.dropped(), 2);
    }

    #[test]
    fn unit_mismatch_without_conversion_fails() {
        let err = align(
            &model("PJ/yr"),
            &reference(),
            &BroadcastSpec::new(["scenario"]),
            &UnitPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::UnitMismatch { .. }));
    }

    #[test]
    fn unit_mismatch_with_conversion_rescales_model() {
        let (points, _) = align(
            &model("PJ/yr"),
            &reference(),
            &BroadcastSpec::new(["scenario"]),
            &UnitPolicy::converting(),
        )
        .unwrap();
        assert!((points[0].model_value - 0.55).abs() < 1e-12);
        assert_eq!(
            points[0].key,
            key!["S1", "World", "PJ/yr", 2020],
            "keys stay in model units"
        );
    }

    #[test]
    fn inconvertible_units_fail_even_with_conversion() {
        let err = align(
            &model("Mt CO2/yr"),
            &reference(),
            &BroadcastSpec::new(["scenario"]),
            &UnitPolicy::converting(),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::UnitMismatch { .. }));
    }

    #[test]
    fn undeclared_model_only_dimension_is_rejected() {
        let err = Aligner::new(
            model("EJ/yr").dims(),
            &reference(),
            &BroadcastSpec::none(),
            &UnitPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::MissingDimension {
                dim: "scenario".into(),
                side: "reference"
            }
        );
    }

    #[test]
    fn reference_varying_over_broadcast_dimension_is_ambiguous() {
        let reference = LabeledTable::from_rows(
            dims(&["scenario", "region", "unit", "year"]),
            vec![
                (key!["Historical", "World", "EJ/yr", 2020], 500.0),
                (key!["Other", "World", "EJ/yr", 2020], 510.0),
            ],
        )
        .unwrap();
        let err = Aligner::new(
            model("EJ/yr").dims(),
            &reference,
            &BroadcastSpec::new(["scenario"]),
            &UnitPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::AmbiguousReference { .. }));
    }

    #[test]
    fn reference_with_single_broadcast_label_is_projected_away() {
        let reference = LabeledTable::from_rows(
            dims(&["scenario", "region", "unit", "year"]),
            vec![(key!["Historical", "World", "EJ/yr", 2020], 500.0)],
        )
        .unwrap();
        let aligner = Aligner::new(
            model("EJ/yr").dims(),
            &reference,
            &BroadcastSpec::new(["scenario"]),
            &UnitPolicy::default(),
        )
        .unwrap();
        assert_eq!(aligner.match_dims(), ["region", "year"]);
        let (points, _) = aligner.align(&model("EJ/yr")).unwrap();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn model_with_other_schema_is_rejected() {
        let aligner = Aligner::new(
            model("EJ/yr").dims(),
            &reference(),
            &BroadcastSpec::new(["scenario"]),
            &UnitPolicy::default(),
        )
        .unwrap();
        let err = aligner.align(&reference()).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMismatch { .. }));
    }

    #[test]
    fn model_columns_in_another_order_still_align() {
        let aligner = Aligner::new(
            model("EJ/yr").dims(),
            &reference(),
            &BroadcastSpec::new(["scenario"]),
            &UnitPolicy::default(),
        )
        .unwrap();
        let reordered = LabeledTable::from_rows(
            dims(&["region", "scenario", "year", "unit"]),
            vec![
                (key!["World", "S1", 2020, "EJ/yr"], 550.0),
                (key!["World", "S2", 2030, "EJ/yr"], 660.0),
            ],
        )
        .unwrap();
        let (points, report) = aligner.align(&reordered).unwrap();
        assert_eq!(report.matched, 2);
        assert_eq!(points[0].key, key!["World", "S1", 2020, "EJ/yr"]);
        assert_eq!(points[0].reference_value, 500.0);
        assert_eq!(points[1].reference_value, 600.0);
    }

    #[test]
    fn unit_labels_differing_in_spacing_are_the_same_unit() {
        let reference = LabeledTable::from_rows(
            dims(&["region", "unit", "year"]),
            vec![(key!["World", "Mt CO2/yr", 2020], 100.0)],
        )
        .unwrap();
        let (points, _) = align(
            &model("Mt  CO2/yr"),
            &reference,
            &BroadcastSpec::new(["scenario"]),
            &UnitPolicy::default(),
        )
        .unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].model_value, 550.0);
    }

    #[test]
    fn nan_reference_rows_never_match() {
        let reference = LabeledTable::from_rows(
            dims(&["region", "unit", "year"]),
            vec![(key!["World", "EJ/yr", 2020], f64::NAN)],
        )
        .unwrap();
        let (points, report) = align(
            &model("EJ/yr"),
            &reference,
            &BroadcastSpec::new(["scenario"]),
            &UnitPolicy::default(),
        )
        .unwrap();
        assert!(points.is_empty());
        assert_eq!(report.unmatched, 3);
    }
}
