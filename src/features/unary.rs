//! Bias towards specific readings of underspecified constants.
use std::sync::Arc;

use super::{FactorJob, FeatureSet, FeatureVector, Model, add_factor, head};
use crate::error::Result;
use crate::graph::{FactorGraph, VariableKind};
use crate::logic::LogicLanguage;

pub const DEFAULT_TAG: &str = "UNARY";

pub struct UnaryBiasFeatures {
    tag: String,
}

impl Default for UnaryBiasFeatures {
    fn default() -> Self {
        Self::new(DEFAULT_TAG)
    }
}

impl UnaryBiasFeatures {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_string() }
    }
}

impl FeatureSet for UnaryBiasFeatures {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn create_factor_jobs(
        &self,
        graph: &FactorGraph,
        language: &Arc<LogicLanguage>,
        model: &Arc<Model>,
    ) -> Result<Vec<FactorJob>> {
        let mapping = language.specification_mapping();
        let mut jobs: Vec<FactorJob> = Vec::new();
        for variable in graph.variables() {
            if variable.kind() != VariableKind::Constant {
                continue;
            }
            let Some(constant) = variable.expression().as_constant() else { continue };
            if !mapping.is_underspecified(constant) {
                continue;
            }
            let label = format!("{}{}", self.tag, variable.id().0);
            let nodes = vec![Some(variable.id())];
            let general = language.head_string(variable.expression());
            let (tag, language, model) = (self.tag.clone(), language.clone(), model.clone());
            jobs.push(Box::new(move |graph: &FactorGraph| {
                add_factor(graph, &model, label, &nodes, |values| {
                    let mut features = FeatureVector::new();
                    let specific = head(&language, &values[0]);
                    features.set(&[tag.as_str(), general.as_str(), specific.as_str()], 1.0);
                    features
                })
                .map(|_| ())
            }));
        }
        Ok(jobs)
    }
}
