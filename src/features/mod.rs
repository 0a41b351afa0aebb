//! Feature sets attach scoring factors to a built graph.
//!
//! A [`FeatureSet`] inspects the graph and returns deferred [`FactorJob`]s.
//! Each job scores one fixed set of nodes through [`add_factor`] and attaches
//! at most one factor. Jobs share nothing mutable but the graph's factor
//! arena, so [`run_jobs`] executes them on a worker pool.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RefgraphError, Result};
use crate::graph::{FactorGraph, LiteralNode, Node, NodeId};
use crate::logic::{LogicLanguage, LogicalExpression};
use crate::table::{ColumnHeader, FactorTable};

pub mod closure;
pub mod refctrl;
pub mod relpref;
pub mod surface;
pub mod unary;

pub use closure::ClosureFeature;
pub use refctrl::RefControlFeatureSet;
pub use relpref::RelationSelectionalPreference;
pub use surface::SurfaceFormFeature;
pub use unary::UnaryBiasFeatures;

// ------------- FeatureVector -------------
/// Sparse feature vector keyed by `#`-joined name parts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    entries: BTreeMap<String, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn key(parts: &[&str]) -> String {
        parts.join("#")
    }
    pub fn set(&mut self, parts: &[&str], value: f64) {
        self.entries.insert(Self::key(parts), value);
    }
    pub fn add(&mut self, parts: &[&str], value: f64) {
        *self.entries.entry(Self::key(parts)).or_insert(0.0) += value;
    }
    pub fn get(&self, parts: &[&str]) -> f64 {
        self.entries.get(&Self::key(parts)).copied().unwrap_or(0.0)
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
    /// `target += factor * self`
    pub fn add_times_into(&self, factor: f64, target: &mut FeatureVector) {
        for (key, value) in &self.entries {
            *target.entries.entry(key.clone()).or_insert(0.0) += factor * value;
        }
    }
}

// ------------- Model -------------
/// Linear weights over feature keys. Missing weights are zero.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Model {
    weights: BTreeMap<String, f64>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set(&mut self, parts: &[&str], weight: f64) {
        self.weights.insert(FeatureVector::key(parts), weight);
    }
    pub fn weight(&self, parts: &[&str]) -> f64 {
        self.weights.get(&FeatureVector::key(parts)).copied().unwrap_or(0.0)
    }
    pub fn score(&self, features: &FeatureVector) -> f64 {
        features
            .iter()
            .map(|(key, value)| self.weights.get(key).copied().unwrap_or(0.0) * value)
            .sum()
    }
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ------------- Jobs -------------
pub type FactorJob = Box<dyn FnOnce(&FactorGraph) -> Result<()> + Send>;

pub trait FeatureSet: Send + Sync {
    fn tag(&self) -> &str;
    fn create_factor_jobs(
        &self,
        graph: &FactorGraph,
        language: &Arc<LogicLanguage>,
        model: &Arc<Model>,
    ) -> Result<Vec<FactorJob>>;
}

/// Jobs of every feature set, in feature set order.
pub fn create_jobs(
    feature_sets: &[Box<dyn FeatureSet>],
    graph: &FactorGraph,
    language: &Arc<LogicLanguage>,
    model: &Arc<Model>,
) -> Result<Vec<FactorJob>> {
    let mut jobs = Vec::new();
    for feature_set in feature_sets {
        let created = feature_set.create_factor_jobs(graph, language, model)?;
        debug!(tag = feature_set.tag(), jobs = created.len(), "created factor jobs");
        jobs.extend(created);
    }
    Ok(jobs)
}

pub fn build_pool(threads: usize) -> Result<ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new().num_threads(threads).build()?)
}

/// Runs all jobs on the pool, then puts factors in label order.
pub fn run_jobs(graph: &mut FactorGraph, jobs: Vec<FactorJob>, pool: &ThreadPool) -> Result<()> {
    let started = Instant::now();
    let count = jobs.len();
    {
        let shared: &FactorGraph = graph;
        pool.install(|| jobs.into_par_iter().try_for_each(|job| job(shared)))?;
    }
    graph.sort_factors()?;
    debug!(
        jobs = count,
        factors = graph.num_factors()?,
        ms = started.elapsed().as_secs_f64() * 1000.0,
        "factor jobs complete"
    );
    Ok(())
}

/// Scores every joint assignment of the variable nodes among `nodes` and
/// attaches the resulting factor. Structural nodes pass their expression as
/// a fixed value and `None` entries pass `None`. The feature function sees
/// one value per entry of `nodes`. Returns `false` when every cell had empty
/// features, in which case nothing is attached.
pub fn add_factor<F>(
    graph: &FactorGraph,
    model: &Model,
    label: impl Into<String>,
    nodes: &[Option<NodeId>],
    feature_fn: F,
) -> Result<bool>
where
    F: Fn(&[Option<LogicalExpression>]) -> FeatureVector,
{
    let label = label.into();
    let started = Instant::now();
    let mut headers: Vec<ColumnHeader> = Vec::new();
    let mut positions: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut values: Vec<Option<LogicalExpression>> = vec![None; nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        let Some(id) = node else { continue };
        match graph.node(*id)? {
            Node::Variable(variable) => {
                let header = variable.header();
                let position = match headers.iter().position(|h| h == header) {
                    Some(position) => position,
                    None => {
                        headers.push(header.clone());
                        headers.len() - 1
                    }
                };
                positions[i] = Some(position);
            }
            other => values[i] = Some(other.expression().clone()),
        }
    }
    if headers.is_empty() {
        return Err(RefgraphError::DisconnectedFactor(format!(
            "{} has no variable node among its inputs",
            label
        )));
    }

    let mut table = FactorTable::new(true, headers)?;
    let mut features_set = false;
    for index in 0..table.size() {
        let assignment = table.table().assignment_at(index);
        for (i, position) in positions.iter().enumerate() {
            if let Some(p) = position {
                values[i] = assignment.get(*p).cloned();
            }
        }
        let features = feature_fn(&values);
        features_set |= !features.is_empty();
        table.put(index, model.score(&features), Arc::new(features));
    }
    if !features_set {
        debug!(factor = %label, "skipped creating an empty factor");
        return Ok(false);
    }
    let shape: Vec<String> = table.headers().iter().map(|h| h.num_values().to_string()).collect();
    let size = table.size();
    graph.attach(label.clone(), table)?;
    debug!(
        factor = %label,
        size,
        shape = %shape.join("x"),
        ms = started.elapsed().as_secs_f64() * 1000.0,
        "created factor"
    );
    Ok(true)
}

// ------------- Graph helpers shared by feature sets -------------
/// The unary literal typing the entity of a skolem term: the single unary
/// conjunct of the lambda body, or the body itself when it is unary.
pub fn typing_node<'g>(
    graph: &'g FactorGraph,
    language: &LogicLanguage,
    skolem_term: &LiteralNode,
) -> Result<Option<&'g LiteralNode>> {
    let Some(second) = skolem_term.args().get(1) else { return Ok(None) };
    let Some(lambda) = graph.node(*second)?.as_lambda() else { return Ok(None) };
    let body_node = graph.node(lambda.body())?;
    let Some(body) = body_node.as_literal() else { return Ok(None) };
    if !body_node.expression().ty().is_some_and(|t| t.is_truth_value()) {
        return Ok(None);
    }
    let predicate = graph.node(body.predicate())?;
    if language.is_conjunction(predicate.expression()) {
        let mut typing = None;
        for conjunct in body.args() {
            if let Some(literal) = graph.node(*conjunct)?.as_literal() {
                if literal.args().len() == 1 {
                    if typing.is_some() {
                        return Err(RefgraphError::Invariant(format!(
                            "multiple typing literals in {}",
                            skolem_term_expression(graph, skolem_term)
                        )));
                    }
                    typing = Some(literal);
                }
            }
        }
        Ok(typing)
    } else if body.args().len() == 1 {
        Ok(Some(body))
    } else {
        Ok(None)
    }
}

fn skolem_term_expression(graph: &FactorGraph, literal: &LiteralNode) -> String {
    graph
        .node(literal.predicate())
        .map(|p| p.expression().to_string())
        .unwrap_or_default()
}

/// `(typing predicate node, skolem ID node)` for every skolem term, in preorder.
pub fn instance_pairs(
    graph: &FactorGraph,
    language: &LogicLanguage,
) -> Result<Vec<(Option<NodeId>, NodeId)>> {
    let mut pairs = Vec::new();
    for id in graph.preorder() {
        let node = graph.node(id)?;
        let Some(literal) = node.as_literal() else { continue };
        if !language.is_skolem_term(node.expression()) {
            continue;
        }
        let instance = literal.args()[0];
        if graph.node(instance)?.expression().as_skolem_id().is_none() {
            return Err(RefgraphError::Invariant(format!(
                "unexpected skolem term ID: {}",
                node.expression()
            )));
        }
        let typing = typing_node(graph, language, literal)?.map(LiteralNode::predicate);
        if typing.is_none() {
            warn!(term = %node.expression(), "no typing literal found");
        }
        pairs.push((typing, instance));
    }
    Ok(pairs)
}

/// Feature string of an optional value: the head name, or `null`.
pub(crate) fn head(language: &LogicLanguage, value: &Option<LogicalExpression>) -> String {
    match value {
        Some(value) => language.head_string(value),
        None => "null".to_string(),
    }
}
