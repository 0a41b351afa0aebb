//! Reference features modeled on verb control.
//!
//! Inside a nested instance (e.g. `buy-01` under `want-01`), a relation that
//! points at a reference is often controlled by one of the parent's
//! relations. For every such reference and every parent relation, a factor
//! fires when the reference resolves to the parent's related instance.
use std::sync::Arc;

use tracing::{debug, warn};

use super::{FactorJob, FeatureSet, FeatureVector, Model, add_factor};
use crate::error::Result;
use crate::graph::{FactorGraph, LiteralNode, Node, NodeId, VariableKind};
use crate::logic::{LogicLanguage, LogicalExpression};

pub const DEFAULT_TAG: &str = "REFCTRL";

pub struct RefControlFeatureSet {
    tag: String,
}

impl Default for RefControlFeatureSet {
    fn default() -> Self {
        Self::new(DEFAULT_TAG)
    }
}

impl RefControlFeatureSet {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_string() }
    }
}

/// Relations of one instance and whatever each points at: an instance ID,
/// a reference, or nothing for plain constants.
#[derive(Debug)]
struct InstanceSummary {
    typing: NodeId,
    instance: NodeId,
    relations: Vec<NodeId>,
    related: Vec<Option<NodeId>>,
    related_is_ref: Vec<bool>,
}

fn constant_node(graph: &FactorGraph, id: NodeId) -> Option<NodeId> {
    graph
        .node(id)
        .ok()
        .and_then(Node::as_variable)
        .filter(|v| v.kind() == VariableKind::Constant)
        .map(|v| v.id())
}

fn summarize(
    graph: &FactorGraph,
    language: &LogicLanguage,
    skolem_term: &LiteralNode,
) -> Result<Option<InstanceSummary>> {
    let instance = skolem_term.args()[0];
    if graph.node(instance)?.as_variable().is_none_or(|v| v.kind() != VariableKind::SkolemId) {
        debug!("expected a skolem ID as first argument");
        return Ok(None);
    }
    let Some(lambda) = graph.node(skolem_term.args()[1])?.as_lambda() else { return Ok(None) };
    let Some(body) = graph.node(lambda.body())?.as_literal() else { return Ok(None) };

    let mut typing = None;
    let mut relations = Vec::new();
    let mut related = Vec::new();
    let mut related_is_ref = Vec::new();
    if language.is_conjunction(graph.node(body.predicate())?.expression()) {
        for conjunct in body.args() {
            let Some(literal) = graph.node(*conjunct)?.as_literal() else { return Ok(None) };
            match literal.args().len() {
                1 => match constant_node(graph, literal.predicate()) {
                    Some(predicate) if typing.is_none() => typing = Some(predicate),
                    _ => {
                        debug!("multiple typing literals");
                        return Ok(None);
                    }
                },
                2 => {
                    let Some(relation) = constant_node(graph, literal.predicate()) else {
                        return Ok(None);
                    };
                    let target = graph.node(literal.args()[1])?;
                    let (id, is_ref) = match target {
                        Node::Literal(l) if language.is_ref_literal(target.expression()) => {
                            match graph.node(l.args()[0])?.as_variable() {
                                Some(v) => (Some(v.id()), true),
                                None => return Ok(None),
                            }
                        }
                        Node::Literal(l) if language.is_skolem_term(target.expression()) => {
                            match graph.node(l.args()[0])?.as_variable() {
                                Some(v) => (Some(v.id()), false),
                                None => return Ok(None),
                            }
                        }
                        Node::Variable(_) => (None, false),
                        _ => return Ok(None),
                    };
                    relations.push(relation);
                    related.push(id);
                    related_is_ref.push(is_ref);
                }
                _ => return Ok(None),
            }
        }
    } else if body.args().len() == 1 {
        typing = constant_node(graph, body.predicate());
    }
    Ok(typing.map(|typing| InstanceSummary { typing, instance, relations, related, related_is_ref }))
}

fn feature_string(value: &Option<LogicalExpression>) -> String {
    match value {
        Some(LogicalExpression::Constant(c)) => c.name().to_string(),
        Some(other) => other.to_string(),
        None => "null".to_string(),
    }
}

struct CreateFactors<'a> {
    tag: &'a str,
    graph: &'a FactorGraph,
    language: &'a LogicLanguage,
    model: &'a Arc<Model>,
    counter: usize,
    jobs: Vec<FactorJob>,
}

impl CreateFactors<'_> {
    fn visit(&mut self, id: NodeId, parent: Option<&InstanceSummary>) -> Result<()> {
        let (graph, language) = (self.graph, self.language);
        let node = graph.node(id)?;
        let skolem_term = node
            .as_literal()
            .filter(|_| language.is_skolem_term(node.expression()));
        let Some(literal) = skolem_term else {
            for child in node.children() {
                self.visit(child, parent)?;
            }
            return Ok(());
        };
        let summary = summarize(graph, language, literal)?;
        match (&summary, parent) {
            (Some(summary), Some(parent)) => self.control_jobs(parent, summary),
            (None, _) => warn!(term = %node.expression(), "failed to summarize skolem term"),
            _ => {}
        }
        let next = summary.as_ref();
        for child in node.children() {
            self.visit(child, next)?;
        }
        Ok(())
    }

    fn control_jobs(&mut self, parent: &InstanceSummary, summary: &InstanceSummary) {
        let Some(position) = parent.related.iter().position(|r| *r == Some(summary.instance)) else {
            warn!("no relation between parent and nested instance");
            return;
        };
        let parent_relation = parent.relations[position];
        for current in 0..summary.relations.len() {
            if !summary.related_is_ref[current] {
                continue;
            }
            for index in 0..parent.relations.len() {
                let nodes = vec![
                    Some(parent.typing),
                    Some(parent.relations[index]),
                    parent.related[index],
                    Some(parent_relation),
                    Some(summary.relations[current]),
                    summary.related[current],
                ];
                let label = format!("{}{}", self.tag, self.counter);
                self.counter += 1;
                let (tag, model) = (self.tag.to_string(), self.model.clone());
                self.jobs.push(Box::new(move |graph: &FactorGraph| {
                    add_factor(graph, &model, label, &nodes, |values| {
                        let mut features = FeatureVector::new();
                        if values[2].is_some() && values[2] == values[5] {
                            let parts = [
                                feature_string(&values[0]),
                                feature_string(&values[1]),
                                feature_string(&values[3]),
                                feature_string(&values[4]),
                            ];
                            features.add(
                                &[tag.as_str(), parts[0].as_str(), parts[1].as_str(), parts[2].as_str(), parts[3].as_str()],
                                1.0,
                            );
                            features.add(&[tag.as_str()], 1.0);
                        }
                        features
                    })
                    .map(|_| ())
                }));
            }
        }
    }
}

impl FeatureSet for RefControlFeatureSet {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn create_factor_jobs(
        &self,
        graph: &FactorGraph,
        language: &Arc<LogicLanguage>,
        model: &Arc<Model>,
    ) -> Result<Vec<FactorJob>> {
        let mut visitor = CreateFactors {
            tag: &self.tag,
            graph,
            language,
            model,
            counter: 0,
            jobs: Vec::new(),
        };
        visitor.visit(graph.root(), None)?;
        Ok(visitor.jobs)
    }
}
