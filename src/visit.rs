//! Walks over a factor graph: rebuilding expressions from assignments and
//! reading scores back for a given assignment.
use crate::error::{RefgraphError, Result};
use crate::features::FeatureVector;
use crate::graph::{FactorGraph, Node, NodeId};
use crate::logic::LogicalExpression;
use crate::table::Mapping;

/// The input expression with every mapped variable node replaced by its
/// value. Unmapped nodes keep their original expression.
pub fn expression_of(graph: &FactorGraph, mapping: &Mapping) -> Result<LogicalExpression> {
    Ok(rebuild(graph, graph.root(), mapping)?.0)
}

/// Returns the expression and whether anything below `id` changed, so
/// untouched subtrees are shared instead of copied.
fn rebuild(graph: &FactorGraph, id: NodeId, mapping: &Mapping) -> Result<(LogicalExpression, bool)> {
    let node = graph.node(id)?;
    match node {
        Node::Variable(variable) => Ok(match mapping.get(&variable.id()) {
            Some(value) if value != variable.expression() => (value.clone(), true),
            _ => (variable.expression().clone(), false),
        }),
        Node::Bound(_) => Ok((node.expression().clone(), false)),
        Node::Lambda(lambda) => {
            let (body, changed) = rebuild(graph, lambda.body(), mapping)?;
            if !changed {
                return Ok((node.expression().clone(), false));
            }
            let argument = graph
                .node(lambda.argument())?
                .expression()
                .as_variable()
                .cloned()
                .ok_or_else(|| RefgraphError::Invariant(format!("lambda argument of {} is not a variable", id)))?;
            Ok((LogicalExpression::lambda(argument, body), true))
        }
        Node::Literal(literal) => {
            let (predicate, mut changed) = rebuild(graph, literal.predicate(), mapping)?;
            let mut args = Vec::with_capacity(literal.args().len());
            for arg in literal.args() {
                let (arg, arg_changed) = rebuild(graph, *arg, mapping)?;
                changed |= arg_changed;
                args.push(arg);
            }
            if !changed {
                return Ok((node.expression().clone(), false));
            }
            Ok((LogicalExpression::literal(predicate, args), true))
        }
    }
}

/// Recovers the assignment that turns the graph's expression into
/// `expression`, or `None` when the two do not align.
pub fn mapping_of(graph: &FactorGraph, expression: &LogicalExpression) -> Result<Option<Mapping>> {
    let mut mapping = Mapping::default();
    Ok(align(graph, graph.root(), expression, &mut mapping)?.then_some(mapping))
}

fn align(graph: &FactorGraph, id: NodeId, expression: &LogicalExpression, mapping: &mut Mapping) -> Result<bool> {
    let node = graph.node(id)?;
    match node {
        Node::Variable(variable) => {
            if variable.domain().contains(expression) {
                mapping.insert(variable.id(), expression.clone());
                Ok(true)
            } else {
                Ok(expression == variable.expression())
            }
        }
        Node::Bound(_) => Ok(expression == node.expression()),
        Node::Lambda(lambda) => {
            let Some(other) = expression.as_lambda() else { return Ok(false) };
            if graph.node(lambda.argument())?.expression().as_variable() != Some(other.argument()) {
                return Ok(false);
            }
            align(graph, lambda.body(), other.body(), mapping)
        }
        Node::Literal(literal) => {
            let Some(other) = expression.as_literal() else { return Ok(false) };
            if other.num_args() != literal.args().len()
                || !align(graph, literal.predicate(), other.predicate(), mapping)?
            {
                return Ok(false);
            }
            for (arg, other_arg) in literal.args().iter().zip(other.args()) {
                if !align(graph, *arg, other_arg, mapping)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

/// Sum of the log beliefs of the mapped values.
pub fn marginals_product(graph: &FactorGraph, mapping: &Mapping) -> Result<f64> {
    if !graph.has_marginals() {
        return Err(RefgraphError::MissingMarginals("run belief propagation first".to_string()));
    }
    let mut total = 0.0;
    for (node, value) in mapping {
        let variable = graph.variable(*node)?;
        let belief = variable.belief().ok_or_else(|| {
            RefgraphError::MissingMarginals(format!("no belief for {}", variable.expression()))
        })?;
        let mut key = Mapping::default();
        key.insert(*node, value.clone());
        total += belief.get(&key)?;
    }
    Ok(total)
}

/// Features of every factor the mapping fully specifies.
pub fn features_of(graph: &FactorGraph, mapping: &Mapping) -> Result<FeatureVector> {
    let keeper = graph.factors()?;
    let mut total = FeatureVector::new();
    for factor in keeper.factors() {
        if factor.table().is_mapping_complete(mapping) {
            if let Some(features) = factor.table().features(mapping)? {
                features.add_times_into(1.0, &mut total);
            }
        }
    }
    Ok(total)
}
