//! Maximum marginal assignments after belief propagation.
use tracing::{debug, warn};

use crate::error::{RefgraphError, Result};
use crate::features::Model;
use crate::graph::{FactorGraph, NodeId};
use crate::logic::LogicalExpression;
use crate::result::ProbEvaluationResult;
use crate::table::Mapping;
use crate::visit::{expression_of, features_of};

/// One result per combination of tied argmax values, as long as there are
/// at most `limit` of them. All results share the same log probability:
/// the sum of every variable's max log belief.
///
/// With `sloppy`, a variable whose argmax is tied keeps its own expression
/// and the result set does not multiply out over it.
pub fn max_evaluations(
    graph: &FactorGraph,
    limit: usize,
    model: &Model,
    sloppy: bool,
) -> Result<Vec<ProbEvaluationResult>> {
    if !graph.has_marginals() {
        return Err(RefgraphError::MissingMarginals(
            "max evaluations need belief propagation to run first".to_string(),
        ));
    }
    let mut choices: Vec<(NodeId, Vec<LogicalExpression>)> = Vec::new();
    let mut log_probability = 0.0;
    let mut count: usize = 1;
    for id in graph.preorder() {
        let Some(variable) = graph.node(id)?.as_variable() else { continue };
        let (argmax, max) = variable.max_assignments()?;
        log_probability += max;
        if sloppy && argmax.len() > 1 {
            continue;
        }
        count = count.saturating_mul(argmax.len());
        choices.push((variable.id(), argmax));
    }
    if count == 0 {
        debug!("a variable has no assignments, no max evaluation");
        return Ok(Vec::new());
    }
    if count > limit {
        warn!(count, limit, "too many max evaluations");
        return Ok(Vec::new());
    }

    let mut mappings = vec![Mapping::default()];
    for (id, values) in &choices {
        mappings = mappings
            .into_iter()
            .flat_map(|mapping| {
                values.iter().map(move |value| {
                    let mut mapping = mapping.clone();
                    mapping.insert(*id, value.clone());
                    mapping
                })
            })
            .collect();
    }

    let mut results = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let features = features_of(graph, &mapping)?;
        let expression = expression_of(graph, &mapping)?;
        results.push(ProbEvaluationResult::new(
            model.score(&features),
            features,
            expression,
            mapping,
            log_probability,
        ));
    }
    debug!(results = results.len(), log_probability, "max evaluations");
    Ok(results)
}
