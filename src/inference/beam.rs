//! Beam search over joint assignments of the raw factor potentials.
//!
//! Variables are added one at a time. A factor is scored as soon as the
//! last of its neighbors has been assigned, so each factor contributes
//! exactly once per configuration. After every step only the `beam_size`
//! best configurations survive. The sort is stable, so equally scored
//! configurations keep their expansion order and all of them survive as
//! long as the beam has room.
use std::cmp::Reverse;
use std::sync::Arc;

use rayon::prelude::*;
use roaring::RoaringBitmap;
use tracing::debug;

use crate::error::{RefgraphError, Result};
use crate::features::FeatureVector;
use crate::graph::{Factor, FactorGraph, FactorKeeper, VariableNode};
use crate::logic::LogicalExpression;
use crate::result::EvaluationResult;
use crate::table::Mapping;
use crate::visit::expression_of;

#[derive(Clone, Debug, Default)]
struct Configuration {
    score: f64,
    mapping: Mapping,
    features: Vec<Arc<FeatureVector>>,
}

impl Configuration {
    fn expand(&self, variable: &VariableNode, value: &LogicalExpression, factors: &[&Factor]) -> Result<Self> {
        let mut next = self.clone();
        next.mapping.insert(variable.id(), value.clone());
        for factor in factors {
            let table = factor.table();
            let potential = table.get(&next.mapping)?;
            next.score += if table.is_log_space() { potential } else { potential.ln() };
            if let Some(features) = table.features(&next.mapping)? {
                next.features.push(features.clone());
            }
        }
        Ok(next)
    }
}

/// Singleton domains first, then fewer factors first, then node id.
fn variable_order(graph: &FactorGraph) -> Result<Vec<&VariableNode>> {
    let mut keyed = graph
        .variables()
        .map(|v| Ok(((v.num_assignments() != 1, v.num_edges()?, v.id()), v)))
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by_key(|(key, _)| *key);
    Ok(keyed.into_iter().map(|(_, v)| v).collect())
}

/// Factors of `variable` whose neighbors are all in `specified`.
fn completed_factors<'k>(
    keeper: &'k FactorKeeper,
    variable: &VariableNode,
    specified: &RoaringBitmap,
) -> Result<Vec<&'k Factor>> {
    let mut factors: Vec<&Factor> = Vec::new();
    for edge in variable.edges()? {
        let factor = keeper
            .edge(edge)
            .and_then(|e| keeper.factor(e.factor()))
            .ok_or_else(|| RefgraphError::Invariant(format!("dangling edge {}", edge)))?;
        let complete = factor.neighbors().iter().all(|n| specified.contains(n.0 as u32));
        if complete && !factors.iter().any(|f| f.id() == factor.id()) {
            factors.push(factor);
        }
    }
    Ok(factors)
}

/// The `beam_size` best joint assignments, best first, and whether the
/// search was exhaustive. With `sloppy`, a variable with an empty domain
/// keeps its own expression instead of ending the search.
pub fn top_k(graph: &FactorGraph, beam_size: usize, sloppy: bool) -> Result<(Vec<EvaluationResult>, bool)> {
    let guard = graph.factors()?;
    let keeper: &FactorKeeper = &guard;
    let mut specified = RoaringBitmap::new();
    let mut pending: RoaringBitmap = (0..keeper.len() as u32).collect();
    let mut configurations = vec![Configuration::default()];
    let mut exact = true;

    for variable in variable_order(graph)? {
        specified.insert(variable.id().0 as u32);
        let factors = completed_factors(keeper, variable, &specified)?;
        for factor in &factors {
            pending.remove(factor.id().0 as u32);
        }

        if variable.domain().is_empty() && sloppy {
            for configuration in configurations.iter_mut() {
                configuration.mapping.insert(variable.id(), variable.expression().clone());
            }
            continue;
        }
        let mut candidates = configurations
            .par_iter()
            .flat_map_iter(|configuration| {
                variable
                    .domain()
                    .iter()
                    .map(|value| configuration.expand(variable, value, &factors))
            })
            .collect::<Result<Vec<_>>>()?;
        candidates.sort_by_key(|c| Reverse(OrderedScore(c.score)));
        if candidates.len() > beam_size {
            exact = false;
            candidates.truncate(beam_size);
        }
        configurations = candidates;
    }
    if !pending.is_empty() {
        return Err(RefgraphError::Invariant(format!(
            "{} factors were never fully assigned",
            pending.len()
        )));
    }

    let mut results = Vec::with_capacity(configurations.len());
    for configuration in configurations {
        let mut features = FeatureVector::new();
        for factor_features in &configuration.features {
            factor_features.add_times_into(1.0, &mut features);
        }
        let expression = expression_of(graph, &configuration.mapping)?;
        results.push(EvaluationResult::new(configuration.score, features, expression, configuration.mapping));
    }
    debug!(beam = beam_size, results = results.len(), exact, "beam search finished");
    Ok((results, exact))
}

#[derive(Clone, Copy, PartialEq)]
struct OrderedScore(f64);

impl Eq for OrderedScore {}
impl PartialOrd for OrderedScore {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedScore {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}
