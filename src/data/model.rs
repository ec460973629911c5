use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::error::TableError;

/// Dimension names of the IAMC timeseries format, in canonical order.
pub const IAMC_DIMS: [&str; 6] = ["model", "scenario", "region", "variable", "unit", "year"];

// ---------------------------------------------------------------------------
// DimValue – a single label along one dimension
// ---------------------------------------------------------------------------

/// A dynamically-typed dimension label (a model name, a region, a year...).
/// Keys are used in hash maps and sorted for reports, so `DimValue` must be
/// both `Hash` and `Ord`.
#[derive(Debug, Clone)]
pub enum DimValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so floats can take part in keys --

impl PartialEq for DimValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for DimValue {}

impl PartialOrd for DimValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DimValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use DimValue::*;
        fn discriminant(v: &DimValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for DimValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            DimValue::String(s) => s.hash(state),
            DimValue::Integer(i) => i.hash(state),
            DimValue::Float(f) => f.to_bits().hash(state),
            DimValue::Bool(b) => b.hash(state),
            DimValue::Null => {}
        }
    }
}

impl fmt::Display for DimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimValue::String(s) => write!(f, "{s}"),
            DimValue::Integer(i) => write!(f, "{i}"),
            DimValue::Float(v) => write!(f, "{v}"),
            DimValue::Bool(b) => write!(f, "{b}"),
            DimValue::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for DimValue {
    fn from(s: &str) -> Self {
        DimValue::String(s.to_string())
    }
}

impl From<String> for DimValue {
    fn from(s: String) -> Self {
        DimValue::String(s)
    }
}

impl From<i64> for DimValue {
    fn from(i: i64) -> Self {
        DimValue::Integer(i)
    }
}

impl From<i32> for DimValue {
    fn from(i: i32) -> Self {
        DimValue::Integer(i as i64)
    }
}

impl DimValue {
    /// Interpret a raw text cell: integers first (years), then plain decimals
    /// such as `2.5`, then booleans, falling back to a string label. Text like
    /// `nan`, `inf` or `1e3` stays a label.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return DimValue::Null;
        }
        if let Ok(i) = s.parse::<i64>() {
            return DimValue::Integer(i);
        }
        if is_plain_decimal(s) {
            if let Ok(f) = s.parse::<f64>() {
                return DimValue::Float(f);
            }
        }
        if s == "true" || s == "false" {
            return DimValue::Bool(s == "true");
        }
        DimValue::String(s.to_string())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DimValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Optional sign, digits, at most one `.`, and at least one digit.
fn is_plain_decimal(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1
}

// ---------------------------------------------------------------------------
// Key – one observation's coordinates
// ---------------------------------------------------------------------------

/// Ordered tuple of dimension values. Ordering is lexicographic over the
/// tuple, which gives tables their deterministic report order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<DimValue>);

impl Key {
    pub fn new(values: Vec<DimValue>) -> Self {
        Key(values)
    }

    pub fn values(&self) -> &[DimValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&DimValue> {
        self.0.get(idx)
    }

    /// Pick the values at `indices`, in that order.
    pub fn project(&self, indices: &[usize]) -> Key {
        Key(indices.iter().map(|&i| self.0[i].clone()).collect())
    }
}

impl FromIterator<DimValue> for Key {
    fn from_iter<I: IntoIterator<Item = DimValue>>(iter: I) -> Self {
        Key(iter.into_iter().collect())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

/// Build a [`Key`] from a list of values convertible to [`DimValue`].
///
/// ```
/// use iam_validate::key;
/// let k = key!["A", 2020];
/// assert_eq!(k.len(), 2);
/// ```
#[macro_export]
macro_rules! key {
    ($($v:expr),* $(,)?) => {
        $crate::data::model::Key::new(vec![$($crate::data::model::DimValue::from($v)),*])
    };
}

// ---------------------------------------------------------------------------
// Dims – ordered dimension names of a table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dims(Vec<String>);

impl Dims {
    /// Dimension names must be unique.
    pub fn new<I, S>(names: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut seen = BTreeSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateDimension(name.clone()));
            }
        }
        Ok(Dims(names))
    }

    /// The IAMC schema: model, scenario, region, variable, unit, year.
    pub fn iamc() -> Self {
        Dims(IAMC_DIMS.iter().map(|s| s.to_string()).collect())
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|d| d == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|d| d == name)
    }

    /// Positions of `names` in this schema, in the order given.
    pub fn indices_of<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>, TableError> {
        names
            .iter()
            .map(|n| {
                let n = n.as_ref();
                self.index_of(n)
                    .ok_or_else(|| TableError::UnknownDimension(n.to_string()))
            })
            .collect()
    }

    /// Schema with `name` removed.
    pub fn without(&self, name: &str) -> Dims {
        Dims(self.0.iter().filter(|d| *d != name).cloned().collect())
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

// ---------------------------------------------------------------------------
// LabeledTable – key-indexed observations
// ---------------------------------------------------------------------------

/// Multi-dimensional, key-indexed observations. Rows keep insertion order and
/// keys are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable<T = f64> {
    dims: Dims,
    rows: Vec<(Key, T)>,
    index: HashMap<Key, usize>,
}

impl<T> LabeledTable<T> {
    pub fn new(dims: Dims) -> Self {
        LabeledTable {
            dims,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn from_rows<I>(dims: Dims, rows: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = (Key, T)>,
    {
        let mut table = LabeledTable::new(dims);
        for (key, value) in rows {
            table.insert(key, value)?;
        }
        Ok(table)
    }

    /// Append a row. Fails on a key of the wrong arity or an existing key.
    pub fn insert(&mut self, key: Key, value: T) -> Result<(), TableError> {
        if key.len() != self.dims.len() {
            return Err(TableError::KeyArity {
                key,
                expected: self.dims.len(),
            });
        }
        if self.index.contains_key(&key) {
            return Err(TableError::DuplicateKey(key));
        }
        self.index.insert(key.clone(), self.rows.len());
        self.rows.push((key, value));
        Ok(())
    }

    pub fn dims(&self) -> &Dims {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &Key) -> Option<&T> {
        self.index.get(key).map(|&i| &self.rows[i].1)
    }

    /// Position of `name` among the table's dimensions.
    pub fn dim_index(&self, name: &str) -> Result<usize, TableError> {
        self.dims
            .index_of(name)
            .ok_or_else(|| TableError::UnknownDimension(name.to_string()))
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &T)> {
        self.rows.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.rows.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.rows.iter().map(|(_, v)| v)
    }

    pub fn into_rows(self) -> Vec<(Key, T)> {
        self.rows
    }

    /// Sorted set of the labels found along `dim`.
    pub fn unique_values(&self, dim: &str) -> Result<BTreeSet<DimValue>, TableError> {
        let idx = self.dim_index(dim)?;
        Ok(self.rows.iter().map(|(k, _)| k.values()[idx].clone()).collect())
    }

    /// Rows reordered by key tuple. The sort is stable.
    pub fn sorted(mut self) -> Self {
        self.rows.sort_by(|a, b| a.0.cmp(&b.0));
        self.reindex();
        self
    }

    /// Same keys and order, values transformed.
    pub fn map_values<U>(&self, mut f: impl FnMut(&Key, &T) -> U) -> LabeledTable<U> {
        LabeledTable {
            dims: self.dims.clone(),
            rows: self.rows.iter().map(|(k, v)| (k.clone(), f(k, v))).collect(),
            index: self.index.clone(),
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, (k, _))| (k.clone(), i))
            .collect();
    }
}

impl<T: Clone> LabeledTable<T> {
    /// Keep the rows at the given positions, in that order.
    pub fn select(&self, indices: &[usize]) -> LabeledTable<T> {
        let mut table = LabeledTable::new(self.dims.clone());
        for &i in indices {
            let (k, v) = &self.rows[i];
            table.index.insert(k.clone(), table.rows.len());
            table.rows.push((k.clone(), v.clone()));
        }
        table
    }

    /// Rows for which `keep` returns true, in their current order.
    pub fn filter(&self, mut keep: impl FnMut(&Key, &T) -> bool) -> LabeledTable<T> {
        let indices: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, (k, v))| keep(k, v))
            .map(|(i, _)| i)
            .collect();
        self.select(&indices)
    }

    /// Pivot `dim` into columns. Rows appear in first-seen order of the
    /// remaining key; columns are sorted.
    pub fn unstack(&self, dim: &str) -> Result<WideTable<T>, TableError> {
        let col_idx = self.dim_index(dim)?;
        let row_idx: Vec<usize> = (0..self.dims.len()).filter(|&i| i != col_idx).collect();

        let columns: Vec<DimValue> = self.unique_values(dim)?.into_iter().collect();
        let col_pos: HashMap<&DimValue, usize> =
            columns.iter().enumerate().map(|(i, c)| (c, i)).collect();

        let mut rows: Vec<(Key, Vec<Option<T>>)> = Vec::new();
        let mut row_pos: HashMap<Key, usize> = HashMap::new();
        for (key, value) in &self.rows {
            let row_key = key.project(&row_idx);
            let pos = *row_pos.entry(row_key.clone()).or_insert_with(|| {
                rows.push((row_key, vec![None; columns.len()]));
                rows.len() - 1
            });
            rows[pos].1[col_pos[&key.values()[col_idx]]] = Some(value.clone());
        }

        Ok(WideTable {
            row_dims: self.dims.without(dim),
            columns,
            rows,
        })
    }
}

/// A table with one dimension pivoted into columns.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable<T> {
    pub row_dims: Dims,
    pub columns: Vec<DimValue>,
    pub rows: Vec<(Key, Vec<Option<T>>)>,
}
