//! Dense potential tables over the cross product of variable domains.
//!
//! A [`Table`] stores one `f64` per joint assignment of its headers in a flat,
//! row-major array (the last header varies fastest). Keys are partial: any
//! header missing from a [`Mapping`] is a wildcard, so reads marginalize over
//! it and writes broadcast across it. Whether values are log-potentials is
//! fixed per table and decides how aggregates are computed.
use core::hash::BuildHasherDefault;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bimap::BiMap;
use seahash::SeaHasher;

use crate::error::{RefgraphError, Result};
use crate::features::FeatureVector;
use crate::graph::NodeId;
use crate::logic::LogicalExpression;

pub type NodeHasher = BuildHasherDefault<SeaHasher>;
/// Partial key: the value chosen for some of the nodes.
pub type Mapping = HashMap<NodeId, LogicalExpression, NodeHasher>;

/// Log of the sum of exponentials, without overflowing on large inputs.
pub fn log_sum_exp(values: impl IntoIterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.into_iter().collect();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max.is_infinite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

// ------------- ColumnHeader -------------
/// A variable node and the stable value↔index bijection of its domain.
#[derive(Clone, Debug)]
pub struct ColumnHeader {
    node: NodeId,
    label: Arc<str>,
    values: Arc<BiMap<LogicalExpression, usize>>,
}

impl ColumnHeader {
    /// `domain` is expected to be free of duplicates; later repeats are ignored.
    pub fn new(node: NodeId, label: &str, domain: &[LogicalExpression]) -> Self {
        let mut values = BiMap::new();
        for value in domain {
            if !values.contains_left(value) {
                let index = values.len();
                values.insert(value.clone(), index);
            }
        }
        Self { node, label: Arc::from(label), values: Arc::new(values) }
    }
    pub fn node(&self) -> NodeId {
        self.node
    }
    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn num_values(&self) -> usize {
        self.values.len()
    }
    pub fn index_of(&self, value: &LogicalExpression) -> Option<usize> {
        self.values.get_by_left(value).copied()
    }
    pub fn value_at(&self, index: usize) -> Option<&LogicalExpression> {
        self.values.get_by_right(&index)
    }
    /// Domain values in index order.
    pub fn values(&self) -> impl Iterator<Item = &LogicalExpression> {
        (0..self.num_values()).filter_map(move |i| self.value_at(i))
    }
}

impl PartialEq for ColumnHeader {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node
    }
}
impl Eq for ColumnHeader {}
impl Hash for ColumnHeader {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}

// ------------- MappingPair -------------
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MappingPair {
    node: NodeId,
    value: LogicalExpression,
}

impl MappingPair {
    pub fn new(node: NodeId, value: LogicalExpression) -> Self {
        Self { node, value }
    }
    pub fn node(&self) -> NodeId {
        self.node
    }
    pub fn value(&self) -> &LogicalExpression {
        &self.value
    }
}

/// Fails when the same node is named twice.
pub fn pairs_to_mapping(pairs: &[MappingPair]) -> Result<Mapping> {
    let mut mapping = Mapping::default();
    for pair in pairs {
        if mapping.insert(pair.node, pair.value.clone()).is_some() {
            return Err(RefgraphError::MalformedKey(format!(
                "node {} appears twice in the key",
                pair.node
            )));
        }
    }
    Ok(mapping)
}

// ------------- Table -------------
#[derive(Clone, Debug)]
pub struct Table {
    headers: Arc<[ColumnHeader]>,
    strides: Arc<[usize]>,
    values: Vec<f64>,
    log_space: bool,
}

impl Table {
    pub fn new(log_space: bool, headers: Vec<ColumnHeader>) -> Result<Self> {
        for (i, header) in headers.iter().enumerate() {
            if headers[..i].contains(header) {
                return Err(RefgraphError::MalformedKey(format!(
                    "node {} used for two table headers",
                    header.node
                )));
            }
        }
        let mut strides = vec![1; headers.len()];
        for i in (0..headers.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * headers[i + 1].num_values();
        }
        let size = headers.iter().map(ColumnHeader::num_values).product();
        let identity = if log_space { 0.0 } else { 1.0 };
        Ok(Self {
            headers: headers.into(),
            strides: strides.into(),
            values: vec![identity; size],
            log_space,
        })
    }

    /// Copy of `other` with every value mapped into the requested space.
    pub fn with_space(other: &Table, log_space: bool) -> Self {
        let values = match (other.log_space, log_space) {
            (true, false) => other.values.iter().map(|v| v.exp()).collect(),
            (false, true) => other.values.iter().map(|v| v.ln()).collect(),
            _ => other.values.clone(),
        };
        Self {
            headers: other.headers.clone(),
            strides: other.strides.clone(),
            values,
            log_space,
        }
    }

    /// Same headers, every cell reset to the multiplicative identity.
    pub fn clone_empty(&self) -> Self {
        Self {
            headers: self.headers.clone(),
            strides: self.strides.clone(),
            values: vec![self.identity(); self.values.len()],
            log_space: self.log_space,
        }
    }

    pub fn identity(&self) -> f64 {
        if self.log_space { 0.0 } else { 1.0 }
    }
    pub fn is_log_space(&self) -> bool {
        self.log_space
    }
    pub fn headers(&self) -> &[ColumnHeader] {
        &self.headers
    }
    pub fn header(&self, node: NodeId) -> Option<&ColumnHeader> {
        self.headers.iter().find(|h| h.node == node)
    }
    pub fn size(&self) -> usize {
        self.values.len()
    }
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn is_mapping_complete(&self, mapping: &Mapping) -> bool {
        self.headers.iter().all(|h| mapping.contains_key(&h.node))
    }

    /// Domain index per header, `None` where the mapping leaves it open.
    /// Nodes the table has no header for are ignored.
    fn key(&self, mapping: &Mapping) -> Result<Vec<Option<usize>>> {
        self.headers
            .iter()
            .map(|header| match mapping.get(&header.node) {
                None => Ok(None),
                Some(value) => header.index_of(value).map(Some).ok_or_else(|| {
                    RefgraphError::UnknownAssignment(format!(
                        "{} is not in the domain of {}",
                        value, header.label
                    ))
                }),
            })
            .collect()
    }

    /// Visits every cell matching the key. Wildcards are enumerated with the
    /// first one changing fastest.
    fn for_each_index(&self, key: &[Option<usize>], mut f: impl FnMut(usize)) {
        let wildcards: Vec<usize> = (0..key.len()).filter(|&i| key[i].is_none()).collect();
        if wildcards.iter().any(|&i| self.headers[i].num_values() == 0) {
            return;
        }
        let base: usize = key
            .iter()
            .zip(self.strides.iter())
            .map(|(k, stride)| k.unwrap_or(0) * stride)
            .sum();
        let mut counters = vec![0usize; wildcards.len()];
        loop {
            let offset: usize = wildcards
                .iter()
                .zip(&counters)
                .map(|(&w, &c)| c * self.strides[w])
                .sum();
            f(base + offset);
            let mut position = 0;
            loop {
                if position == wildcards.len() {
                    return;
                }
                counters[position] += 1;
                if counters[position] < self.headers[wildcards[position]].num_values() {
                    break;
                }
                counters[position] = 0;
                position += 1;
            }
        }
    }

    /// Value of a fully specified cell, or the marginal over open headers.
    pub fn get(&self, mapping: &Mapping) -> Result<f64> {
        let key = self.key(mapping)?;
        let mut matched = Vec::new();
        self.for_each_index(&key, |i| matched.push(self.values[i]));
        if key.iter().all(Option::is_some) && matched.len() == 1 {
            return Ok(matched[0]);
        }
        Ok(if self.log_space {
            log_sum_exp(matched)
        } else {
            matched.iter().sum()
        })
    }

    pub fn get_pairs(&self, pairs: &[MappingPair]) -> Result<f64> {
        self.get(&pairs_to_mapping(pairs)?)
    }

    /// Applies `operator` to every cell matching the key.
    pub fn apply(&mut self, mapping: &Mapping, operator: impl Fn(f64) -> f64) -> Result<()> {
        let key = self.key(mapping)?;
        let mut matched = Vec::new();
        self.for_each_index(&key, |i| matched.push(i));
        for i in matched {
            self.values[i] = operator(self.values[i]);
        }
        Ok(())
    }

    pub fn set(&mut self, mapping: &Mapping, value: f64) -> Result<()> {
        self.apply(mapping, |_| value)
    }

    /// Adds to the stored values. In log space this multiplies potentials.
    pub fn add(&mut self, mapping: &Mapping, value: f64) -> Result<()> {
        self.apply(mapping, |v| v + value)
    }

    /// Multiplies the stored values as they are, whatever the space.
    pub fn multiply(&mut self, mapping: &Mapping, value: f64) -> Result<()> {
        self.apply(mapping, |v| v * value)
    }

    pub fn set_all(&mut self, value: f64) {
        self.values.iter_mut().for_each(|v| *v = value);
    }

    /// Rescales so that all cells aggregate to the identity. A table whose
    /// total is zero (or `-inf` in log space) is left untouched.
    pub fn normalize(&mut self) {
        if self.log_space {
            let total = log_sum_exp(self.values.iter().copied());
            if total.is_finite() {
                self.values.iter_mut().for_each(|v| *v -= total);
            }
        } else {
            let total: f64 = self.values.iter().sum();
            if total != 0.0 && total.is_finite() {
                self.values.iter_mut().for_each(|v| *v /= total);
            }
        }
    }

    /// Equal headers and every cell within `delta` once both are in normal space.
    pub fn approx_eq(&self, other: &Table, delta: f64) -> bool {
        if self.headers != other.headers || self.values.len() != other.values.len() {
            return false;
        }
        let normal = |table: &Table, v: f64| if table.log_space { v.exp() } else { v };
        self.values
            .iter()
            .zip(&other.values)
            .all(|(a, b)| (normal(self, *a) - normal(other, *b)).abs() <= delta)
    }

    /// Largest absolute cell difference in normal space, `inf` for unrelated tables.
    pub fn max_difference(&self, other: &Table) -> f64 {
        if self.headers != other.headers || self.values.len() != other.values.len() {
            return f64::INFINITY;
        }
        let normal = |table: &Table, v: f64| if table.log_space { v.exp() } else { v };
        self.values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (normal(self, *a) - normal(other, *b)).abs())
            .fold(0.0, f64::max)
    }

    /// Aggregate over everything but `node`, one entry per domain value.
    pub fn marginal(&self, node: NodeId) -> Result<Vec<f64>> {
        let header = self.header(node).cloned().ok_or_else(|| {
            RefgraphError::MalformedKey(format!("table has no header for node {}", node))
        })?;
        let mut mapping = Mapping::default();
        header
            .values()
            .map(|value| {
                mapping.insert(node, value.clone());
                self.get(&mapping)
            })
            .collect()
    }

    /// Adds `values[i]` to every cell where `node` takes its i-th value.
    pub fn add_along(&mut self, node: NodeId, values: &[f64]) -> Result<()> {
        let header = self.header(node).cloned().ok_or_else(|| {
            RefgraphError::MalformedKey(format!("table has no header for node {}", node))
        })?;
        let mut mapping = Mapping::default();
        for (value, amount) in header.values().zip(values) {
            mapping.insert(node, value.clone());
            self.add(&mapping, *amount)?;
        }
        Ok(())
    }

    /// Domain values of the cell at a flat index, in header order.
    pub fn assignment_at(&self, index: usize) -> Vec<LogicalExpression> {
        self.headers
            .iter()
            .zip(self.strides.iter())
            .filter_map(|(header, stride)| {
                header.value_at((index / stride) % header.num_values().max(1))
            })
            .cloned()
            .collect()
    }

    pub(crate) fn cell_index(&self, mapping: &Mapping) -> Result<usize> {
        let key = self.key(mapping)?;
        let mut index = 0;
        for (header, (k, stride)) in self.headers.iter().zip(key.iter().zip(self.strides.iter())) {
            match k {
                Some(k) => index += k * stride,
                None => {
                    return Err(RefgraphError::MalformedKey(format!(
                        "no value given for {}",
                        header.label
                    )));
                }
            }
        }
        if index >= self.values.len() {
            return Err(RefgraphError::MalformedKey("key addresses an empty table".to_string()));
        }
        Ok(index)
    }

    pub(crate) fn set_cell(&mut self, index: usize, value: f64) {
        self.values[index] = value;
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let labels: Vec<&str> = self.headers.iter().map(ColumnHeader::label).collect();
        writeln!(f, "[{}]{}", labels.join(" x "), if self.log_space { " (log)" } else { "" })?;
        for (index, value) in self.values.iter().enumerate() {
            let row: Vec<String> = self.assignment_at(index).iter().map(|v| v.to_string()).collect();
            writeln!(f, "  {} -> {:.4}", row.join(", "), value)?;
        }
        Ok(())
    }
}

// ------------- FactorTable -------------
/// A table whose cells also carry the feature vector that produced them.
#[derive(Clone, Debug)]
pub struct FactorTable {
    table: Table,
    features: Vec<Option<Arc<FeatureVector>>>,
}

impl FactorTable {
    pub fn new(log_space: bool, headers: Vec<ColumnHeader>) -> Result<Self> {
        let table = Table::new(log_space, headers)?;
        let features = vec![None; table.size()];
        Ok(Self { table, features })
    }
    pub fn table(&self) -> &Table {
        &self.table
    }
    pub fn headers(&self) -> &[ColumnHeader] {
        self.table.headers()
    }
    pub fn is_log_space(&self) -> bool {
        self.table.is_log_space()
    }
    pub fn size(&self) -> usize {
        self.table.size()
    }
    pub fn get(&self, mapping: &Mapping) -> Result<f64> {
        self.table.get(mapping)
    }
    pub fn is_mapping_complete(&self, mapping: &Mapping) -> bool {
        self.table.is_mapping_complete(mapping)
    }

    /// Always fails: every written cell needs its features.
    pub fn set(&mut self, _mapping: &Mapping, value: f64) -> Result<()> {
        Err(RefgraphError::MissingFeatures(format!(
            "value {} written to a factor table without features",
            value
        )))
    }

    pub fn set_with_features(
        &mut self,
        mapping: &Mapping,
        value: f64,
        features: FeatureVector,
    ) -> Result<()> {
        let index = self.table.cell_index(mapping)?;
        self.put(index, value, Arc::new(features));
        Ok(())
    }

    pub(crate) fn put(&mut self, index: usize, value: f64, features: Arc<FeatureVector>) {
        self.table.set_cell(index, value);
        self.features[index] = Some(features);
    }

    pub fn add(&mut self, mapping: &Mapping, value: f64) -> Result<()> {
        self.table.add(mapping, value)
    }
    pub fn multiply(&mut self, mapping: &Mapping, value: f64) -> Result<()> {
        self.table.multiply(mapping, value)
    }

    /// Features of a fully specified cell.
    pub fn features(&self, mapping: &Mapping) -> Result<Option<&Arc<FeatureVector>>> {
        let index = self.table.cell_index(mapping)?;
        Ok(self.features[index].as_ref())
    }

    /// `(value, features)` per cell in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, Option<&FeatureVector>)> {
        self.table
            .values()
            .iter()
            .copied()
            .zip(self.features.iter().map(|f| f.as_deref()))
    }
}
