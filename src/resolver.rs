//! End to end resolution: assignments, graph, factors, inference.
use std::sync::Arc;
use std::time::Instant;

use rayon::ThreadPool;
use tracing::debug;

use crate::assignment::{AssignmentGeneratorFactory, ReferenceFactory};
use crate::builder::GraphBuilder;
use crate::error::Result;
use crate::features::{FeatureSet, Model, build_pool, create_jobs, run_jobs};
use crate::graph::FactorGraph;
use crate::inference::{max_evaluations, top_k};
use crate::logic::{LogicLanguage, LogicalExpression};
use crate::result::{EvaluationResult, ProbEvaluationResult};
use crate::settings::InferenceSettings;

pub struct Resolver {
    settings: InferenceSettings,
    language: Arc<LogicLanguage>,
    model: Arc<Model>,
    factory: Box<dyn AssignmentGeneratorFactory>,
    feature_sets: Vec<Box<dyn FeatureSet>>,
    pool: ThreadPool,
}

impl Resolver {
    /// Starts with reference assignments and no feature sets.
    pub fn new(settings: InferenceSettings, language: Arc<LogicLanguage>, model: Arc<Model>) -> Result<Self> {
        let pool = build_pool(settings.threads)?;
        Ok(Self {
            factory: Box::new(ReferenceFactory::new(language.clone())),
            settings,
            language,
            model,
            feature_sets: Vec::new(),
            pool,
        })
    }

    pub fn with_feature_set(mut self, feature_set: impl FeatureSet + 'static) -> Self {
        self.feature_sets.push(Box::new(feature_set));
        self
    }

    pub fn with_factory(mut self, factory: impl AssignmentGeneratorFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    pub fn settings(&self) -> &InferenceSettings {
        &self.settings
    }
    pub fn language(&self) -> &Arc<LogicLanguage> {
        &self.language
    }
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Builds the graph for `expression` and attaches the factors of every
    /// feature set. No inference has run on the result.
    pub fn graph(&self, expression: &LogicalExpression, closure: bool) -> Result<FactorGraph> {
        let started = Instant::now();
        let generator = self.factory.create(expression);
        let mut graph = GraphBuilder::new(generator.as_ref(), &self.language)
            .policy(self.settings.empty_domain)
            .build(expression, closure);
        let jobs = create_jobs(&self.feature_sets, &graph, &self.language, &self.model)?;
        run_jobs(&mut graph, jobs, &self.pool)?;
        debug!(ms = started.elapsed().as_secs_f64() * 1000.0, "graph ready");
        Ok(graph)
    }

    /// Max evaluations over the marginals of belief propagation.
    pub fn resolve(&self, expression: &LogicalExpression) -> Result<Vec<ProbEvaluationResult>> {
        self.resolve_graph(self.graph(expression, false)?)
    }

    /// Like [`Resolver::resolve`] for an expression standing for a closed
    /// family of parses, so closure features apply.
    pub fn resolve_closure(&self, expression: &LogicalExpression) -> Result<Vec<ProbEvaluationResult>> {
        self.resolve_graph(self.graph(expression, true)?)
    }

    /// Top assignments of the raw potentials and whether the beam was exact.
    pub fn beam(&self, expression: &LogicalExpression) -> Result<(Vec<EvaluationResult>, bool)> {
        self.beam_graph(&self.graph(expression, false)?)
    }

    pub fn beam_closure(&self, expression: &LogicalExpression) -> Result<(Vec<EvaluationResult>, bool)> {
        self.beam_graph(&self.graph(expression, true)?)
    }

    fn resolve_graph(&self, mut graph: FactorGraph) -> Result<Vec<ProbEvaluationResult>> {
        self.pool.install(|| self.settings.loopy_bp().run(&mut graph))?;
        max_evaluations(&graph, self.settings.max_limit, &self.model, self.settings.sloppy)
    }

    fn beam_graph(&self, graph: &FactorGraph) -> Result<(Vec<EvaluationResult>, bool)> {
        self.pool
            .install(|| top_k(graph, self.settings.beam_size, self.settings.sloppy))
    }
}
