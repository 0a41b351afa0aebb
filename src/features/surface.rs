//! Pairs each reading of an overloaded constant with the surface form and
//! directionality the lexicon attached to it.
use std::sync::Arc;

use super::{FactorJob, FeatureSet, FeatureVector, Model, add_factor, head};
use crate::error::Result;
use crate::graph::{FactorGraph, VariableKind};
use crate::logic::LogicLanguage;

pub const DEFAULT_TAG: &str = "FACLEX";

pub struct SurfaceFormFeature {
    tag: String,
}

impl Default for SurfaceFormFeature {
    fn default() -> Self {
        Self::new(DEFAULT_TAG)
    }
}

impl SurfaceFormFeature {
    pub fn new(tag: &str) -> Self {
        Self { tag: tag.to_string() }
    }
}

impl FeatureSet for SurfaceFormFeature {
    fn tag(&self) -> &str {
        &self.tag
    }

    /// One single-variable factor per underspecified, overloaded constant.
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
            let Some(overload) = constant.overload() else { continue };
            let base = overload.base().to_string();
            let surface_form = overload.surface_form().to_string();
            let directionality = overload.directionality().map(str::to_string);
            let label = format!("{}{}", self.tag, variable.id().0);
            let nodes = vec![Some(variable.id())];
            let (tag, language, model) = (self.tag.clone(), language.clone(), model.clone());
            jobs.push(Box::new(move |graph: &FactorGraph| {
                add_factor(graph, &model, label, &nodes, |values| {
                    let mut features = FeatureVector::new();
                    let value = head(&language, &values[0]);
                    let (tag, base, value) = (tag.as_str(), base.as_str(), value.as_str());
                    features.set(&[tag, base, value, surface_form.as_str()], 1.0);
                    if let Some(directionality) = &directionality {
                        let directionality = directionality.as_str();
                        features.set(&[tag, base, value, surface_form.as_str(), directionality], 1.0);
                        features.set(&[tag, base, value, directionality], 1.0);
                    }
                    features
                })
                .map(|_| ())
            }));
        }
        Ok(jobs)
    }
}
