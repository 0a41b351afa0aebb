//! Marks graphs built from a closed-over family of parses.
use std::sync::Arc;

use super::{FactorJob, FeatureSet, FeatureVector, Model, add_factor};
use crate::error::Result;
use crate::graph::{FactorGraph, VariableKind};
use crate::logic::LogicLanguage;

pub const DEFAULT_TAG: &str = "CLOSURE";

pub struct ClosureFeature {
    tag: String,
}

impl Default for ClosureFeature {
    fn default() -> Self {
        Self::new(DEFAULT_TAG)
    }
}

impl ClosureFeature {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_string() }
    }
}

impl FeatureSet for ClosureFeature {
    fn tag(&self) -> &str {
        &self.tag
    }

    /// One factor on the root skolem ID, only when the graph is a closure.
    fn create_factor_jobs(
        &self,
        graph: &FactorGraph,
        language: &Arc<LogicLanguage>,
        model: &Arc<Model>,
    ) -> Result<Vec<FactorJob>> {
        if !graph.is_closure() {
            return Ok(Vec::new());
        }
        let root = graph.root_node()?;
        let Some(literal) = root.as_literal() else { return Ok(Vec::new()) };
        if !language.is_skolem_term(root.expression()) {
            return Ok(Vec::new());
        }
        let id = literal.args()[0];
        let is_skolem_id = graph
            .node(id)?
            .as_variable()
            .is_some_and(|v| v.kind() == VariableKind::SkolemId);
        if !is_skolem_id {
            return Ok(Vec::new());
        }
        let (tag, model) = (self.tag.clone(), model.clone());
        let job: FactorJob = Box::new(move |graph: &FactorGraph| {
            add_factor(graph, &model, tag.clone(), &[Some(id)], |_| {
                let mut features = FeatureVector::new();
                features.set(&[tag.as_str()], 1.0);
                features
            })
            .map(|_| ())
        });
        Ok(vec![job])
    }
}
