use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};

use super::model::{DimValue, LabeledTable};
use crate::error::TableError;

// ---------------------------------------------------------------------------
// Filter predicate: which labels are selected per dimension
// ---------------------------------------------------------------------------

/// Per-dimension selection: maps dimension name → set of selected labels.
/// A dimension absent from the map is unconstrained.
pub type FilterState = BTreeMap<String, BTreeSet<DimValue>>;

/// Parse `dim=value` command-line selections into a [`FilterState`].
/// Repeating a dimension widens its selection.
pub fn parse_filters<S: AsRef<str>>(specs: &[S]) -> Result<FilterState> {
    let mut filters = FilterState::new();
    for spec in specs {
        let spec = spec.as_ref();
        let (dim, value) = spec
            .split_once('=')
            .with_context(|| format!("filter '{spec}' is not of the form dim=value"))?;
        filters
            .entry(dim.trim().to_ascii_lowercase())
            .or_default()
            .insert(DimValue::parse(value));
    }
    Ok(filters)
}

/// Return positions of rows that pass all filters.
///
/// A row passes a dimension filter when:
/// * The selection for that dimension is empty → nothing selected → fails
/// * The row's label for that dimension is in the selected set → passes
pub fn filtered_indices<T>(
    table: &LabeledTable<T>,
    filters: &FilterState,
) -> Result<Vec<usize>, TableError> {
    let active: Vec<(usize, &BTreeSet<DimValue>)> = filters
        .iter()
        .map(|(dim, selected)| {
            table
                .dims()
                .index_of(dim)
                .map(|idx| (idx, selected))
                .ok_or_else(|| TableError::UnknownDimension(dim.clone()))
        })
        .collect::<Result<_, _>>()?;

    Ok(table
        .keys()
        .enumerate()
        .filter(|(_, key)| {
            active
                .iter()
                .all(|(idx, selected)| selected.contains(&key.values()[*idx]))
        })
        .map(|(i, _)| i)
        .collect())
}

/// Copy of `table` restricted to the rows passing `filters`.
pub fn apply_filters<T: Clone>(
    table: &LabeledTable<T>,
    filters: &FilterState,
) -> Result<LabeledTable<T>, TableError> {
    if filters.is_empty() {
        return Ok(table.clone());
    }
    let keep = filtered_indices(table, filters)?;
    log::debug!("filter kept {} of {} rows", keep.len(), table.len());
    Ok(table.select(&keep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Dims;
    use crate::key;

    fn table() -> LabeledTable {
        LabeledTable::from_rows(
            Dims::new(["variable", "year"]).unwrap(),
            vec![
                (key!["Primary Energy", 2020], 1.0),
                (key!["Primary Energy", 2030], 2.0),
                (key!["Final Energy", 2020], 3.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn keeps_selected_labels_only() {
        let filters = parse_filters(&["variable=Final Energy"]).unwrap();
        let t = apply_filters(&table(), &filters).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&key!["Final Energy", 2020]), Some(&3.0));
    }

    #[test]
    fn repeated_dimension_widens_selection() {
        let filters = parse_filters(&["year=2020", "year=2030"]).unwrap();
        assert_eq!(filtered_indices(&table(), &filters).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn empty_selection_hides_everything() {
        let mut filters = FilterState::new();
        filters.insert("year".into(), BTreeSet::new());
        assert!(filtered_indices(&table(), &filters).unwrap().is_empty());
    }

    #[test]
    fn unknown_dimension_is_an_error() {
        let filters = parse_filters(&["region=World"]).unwrap();
        assert!(apply_filters(&table(), &filters).is_err());
    }

    #[test]
    fn malformed_spec_is_an_error() {
        assert!(parse_filters(&["World"]).is_err());
    }
}
