//! Selectional preferences of binary relations.
//!
//! For every binary relation literal whose first argument is the entity
//! variable of a skolem term, a factor ties the typing predicate of that
//! entity, the relation, and the typing of the second argument. When the
//! second argument is a reference, one factor is created per candidate
//! instance, firing only when the reference resolves to that instance.
use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use super::{FactorJob, FeatureSet, FeatureVector, Model, add_factor, head, instance_pairs, typing_node};
use crate::error::Result;
use crate::graph::{FactorGraph, Node, NodeId, VariableKind};
use crate::logic::{LogicLanguage, LogicalExpression};
use crate::table::NodeHasher;

pub const DEFAULT_TAG: &str = "RELPREF";

pub struct RelationSelectionalPreference {
    tag: String,
}

impl Default for RelationSelectionalPreference {
    fn default() -> Self {
        Self::new(DEFAULT_TAG)
    }
}

impl RelationSelectionalPreference {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_string() }
    }
}

/// Trigram `arg1-relation-arg2` plus both bigrams. Passive relations are
/// recorded in active form with the arguments swapped.
fn relation_features(
    tag: &str,
    language: &LogicLanguage,
    first: &Option<LogicalExpression>,
    relation: &Option<LogicalExpression>,
    second: &Option<LogicalExpression>,
) -> FeatureVector {
    let passive = relation.as_ref().is_some_and(|r| language.is_passive_predicate(r));
    let (first, relation, second) = if passive {
        let active = relation.as_ref().map(|r| language.make_relation_active(r));
        (head(language, second), head(language, &active), head(language, first))
    } else {
        (head(language, first), head(language, relation), head(language, second))
    };
    let mut features = FeatureVector::new();
    features.set(&[tag, first.as_str(), relation.as_str(), second.as_str()], 1.0);
    features.set(&[tag, first.as_str(), relation.as_str()], 1.0);
    features.set(&[tag, relation.as_str(), second.as_str()], 1.0);
    features
}

impl FeatureSet for RelationSelectionalPreference {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn create_factor_jobs(
        &self,
        graph: &FactorGraph,
        language: &Arc<LogicLanguage>,
        model: &Arc<Model>,
    ) -> Result<Vec<FactorJob>> {
        let order = graph.preorder();

        // Lambda argument node of each skolem term -> its typing predicate node.
        let mut typing_of: HashMap<NodeId, NodeId, NodeHasher> = HashMap::default();
        for id in &order {
            let node = graph.node(*id)?;
            let Some(literal) = node.as_literal() else { continue };
            if !language.is_skolem_term(node.expression()) {
                continue;
            }
            if let Some(lambda) = graph.node(literal.args()[1])?.as_lambda() {
                if let Some(typing) = typing_node(graph, language, literal)? {
                    typing_of.insert(lambda.argument(), typing.predicate());
                }
            }
        }
        let pairs = instance_pairs(graph, language)?;

        let mut jobs: Vec<FactorJob> = Vec::new();
        let mut counter = 0;
        for id in &order {
            let node = graph.node(*id)?;
            let Some(literal) = node.as_literal() else { continue };
            if literal.args().len() != 2
                || language.is_skolem_term(node.expression())
                || language.is_coordination_predicate(graph.node(literal.predicate())?.expression())
            {
                continue;
            }
            let relation = literal.predicate();
            let Some(bound) = graph.node(literal.args()[0])?.as_bound() else {
                warn!(literal = %node.expression(), "unexpected first argument in a binary literal");
                continue;
            };
            let first_typing = bound.binder().and_then(|b| typing_of.get(&b).copied());
            let second = graph.node(literal.args()[1])?;

            match second {
                Node::Literal(argument) if language.is_ref_literal(second.expression()) => {
                    let reference = argument.args()[0];
                    if graph.node(reference)?.as_variable().is_none() {
                        warn!(literal = %node.expression(), "reference without a variable node");
                        continue;
                    }
                    for (instance_typing, instance) in &pairs {
                        counter += 1;
                        let nodes = vec![
                            first_typing,
                            Some(reference),
                            *instance_typing,
                            Some(*instance),
                            Some(relation),
                        ];
                        let label = format!("{}{}", self.tag, counter);
                        let (tag, language, model) = (self.tag.clone(), language.clone(), model.clone());
                        jobs.push(Box::new(move |graph: &FactorGraph| {
                            add_factor(graph, &model, label, &nodes, |values| {
                                // The reference and the instance must carry the same ID.
                                if values[1].is_some() && values[1] == values[3] {
                                    relation_features(&tag, &language, &values[0], &values[4], &values[2])
                                } else {
                                    FeatureVector::new()
                                }
                            })
                            .map(|_| ())
                        }));
                    }
                }
                Node::Literal(argument) if language.is_skolem_term(second.expression()) => {
                    let second_typing =
                        typing_node(graph, language, argument)?.map(|typing| typing.predicate());
                    counter += 1;
                    jobs.push(self.triple_job(counter, first_typing, relation, second_typing, language, model));
                }
                Node::Variable(constant) if constant.kind() == VariableKind::Constant => {
                    counter += 1;
                    jobs.push(self.triple_job(counter, first_typing, relation, Some(constant.id()), language, model));
                }
                _ => {
                    warn!(literal = %node.expression(), "unexpected second argument in a binary literal");
                }
            }
        }
        Ok(jobs)
    }
}

impl RelationSelectionalPreference {
    fn triple_job(
        &self,
        counter: usize,
        first: Option<NodeId>,
        relation: NodeId,
        second: Option<NodeId>,
        language: &Arc<LogicLanguage>,
        model: &Arc<Model>,
    ) -> FactorJob {
        let label = format!("{}{}", self.tag, counter);
        let nodes = vec![first, Some(relation), second];
        let (tag, language, model) = (self.tag.clone(), language.clone(), model.clone());
        Box::new(move |graph: &FactorGraph| {
            add_factor(graph, &model, label, &nodes, |values| {
                relation_features(&tag, &language, &values[0], &values[1], &values[2])
            })
            .map(|_| ())
        })
    }
}
