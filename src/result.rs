use std::cmp::Ordering;

use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::features::FeatureVector;
use crate::logic::LogicalExpression;
use crate::table::Mapping;

fn as_text<S: Serializer>(expression: &LogicalExpression, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(expression)
}

// ------------- EvaluationResult -------------
/// One joint assignment, the expression it resolves to, and its score.
#[derive(Clone, Debug, Serialize)]
pub struct EvaluationResult {
    score: f64,
    features: FeatureVector,
    #[serde(serialize_with = "as_text")]
    result: LogicalExpression,
    #[serde(skip)]
    mapping: Mapping,
}

impl EvaluationResult {
    pub fn new(score: f64, features: FeatureVector, result: LogicalExpression, mapping: Mapping) -> Self {
        Self { score, features, result, mapping }
    }
    pub fn score(&self) -> f64 {
        self.score
    }
    pub fn features(&self) -> &FeatureVector {
        &self.features
    }
    pub fn result(&self) -> &LogicalExpression {
        &self.result
    }
    /// Chosen value per variable node. Nodes left unresolved are absent.
    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl PartialEq for EvaluationResult {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for EvaluationResult {}
impl PartialOrd for EvaluationResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for EvaluationResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.result.cmp(&other.result))
    }
}

// ------------- ProbEvaluationResult -------------
#[derive(Clone, Debug, Serialize)]
pub struct ProbEvaluationResult {
    #[serde(flatten)]
    evaluation: EvaluationResult,
    log_probability: f64,
}

impl ProbEvaluationResult {
    pub fn new(
        score: f64,
        features: FeatureVector,
        result: LogicalExpression,
        mapping: Mapping,
        log_probability: f64,
    ) -> Self {
        Self {
            evaluation: EvaluationResult::new(score, features, result, mapping),
            log_probability,
        }
    }
    pub fn evaluation(&self) -> &EvaluationResult {
        &self.evaluation
    }
    pub fn score(&self) -> f64 {
        self.evaluation.score
    }
    pub fn features(&self) -> &FeatureVector {
        &self.evaluation.features
    }
    pub fn result(&self) -> &LogicalExpression {
        &self.evaluation.result
    }
    pub fn mapping(&self) -> &Mapping {
        &self.evaluation.mapping
    }
    pub fn log_probability(&self) -> f64 {
        self.log_probability
    }
    pub fn probability(&self) -> f64 {
        self.log_probability.exp()
    }
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl PartialEq for ProbEvaluationResult {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for ProbEvaluationResult {}
impl PartialOrd for ProbEvaluationResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ProbEvaluationResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.evaluation
            .cmp(&other.evaluation)
            .then_with(|| self.log_probability.total_cmp(&other.log_probability))
    }
}
