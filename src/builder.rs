//! Builds the node skeleton of a factor graph from a logical expression.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assignment::AssignmentGenerator;
use crate::graph::{
    BoundNode, FactorGraph, LambdaNode, LiteralNode, Node, NodeId, VariableKind, VariableNode,
};
use crate::logic::{LogicLanguage, LogicalExpression, Variable};

/// What a placeholder becomes when the generator has nothing for it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyDomainPolicy {
    /// The placeholder is its own only value and survives into results.
    #[default]
    KeepPlaceholder,
    /// The node gets an empty domain and no joint assignment exists.
    Exclude,
}

/// Walks the expression once. Every constant and skolem ID becomes a
/// variable node; constants without generated candidates keep themselves as
/// their single value. No factors are created.
pub fn build(
    expression: &LogicalExpression,
    generator: &dyn AssignmentGenerator,
    language: &LogicLanguage,
    closure: bool,
) -> FactorGraph {
    GraphBuilder::new(generator, language).build(expression, closure)
}

pub struct GraphBuilder<'a> {
    generator: &'a dyn AssignmentGenerator,
    language: &'a LogicLanguage,
    policy: EmptyDomainPolicy,
    nodes: Vec<Node>,
    scope: Vec<(Variable, NodeId)>,
    potential_assignments: u128,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(generator: &'a dyn AssignmentGenerator, language: &'a LogicLanguage) -> Self {
        Self {
            generator,
            language,
            policy: EmptyDomainPolicy::default(),
            nodes: Vec::new(),
            scope: Vec::new(),
            potential_assignments: 1,
        }
    }

    pub fn policy(mut self, policy: EmptyDomainPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(mut self, expression: &LogicalExpression, closure: bool) -> FactorGraph {
        let root = self.visit(expression);
        debug!(
            nodes = self.nodes.len(),
            potential_assignments = self.potential_assignments as f64,
            "created factor graph"
        );
        FactorGraph::new(root, self.nodes, closure)
    }

    fn next_id(&self) -> NodeId {
        NodeId(self.nodes.len())
    }

    fn visit(&mut self, expression: &LogicalExpression) -> NodeId {
        match expression {
            LogicalExpression::Constant(_) => {
                let domain = self.domain_of(expression);
                if domain.len() > 1 {
                    self.potential_assignments =
                        self.potential_assignments.saturating_mul(domain.len() as u128);
                }
                let id = self.next_id();
                self.nodes.push(Node::Variable(VariableNode::new(
                    id,
                    expression.clone(),
                    VariableKind::Constant,
                    domain,
                )));
                id
            }
            LogicalExpression::SkolemId(_) => {
                let id = self.next_id();
                self.nodes.push(Node::Variable(VariableNode::new(
                    id,
                    expression.clone(),
                    VariableKind::SkolemId,
                    vec![expression.clone()],
                )));
                id
            }
            LogicalExpression::Variable(variable) => {
                let binder = self
                    .scope
                    .iter()
                    .rev()
                    .find(|(bound, _)| bound == variable)
                    .map(|(_, node)| *node);
                let id = self.next_id();
                self.nodes.push(Node::Bound(BoundNode::new(id, expression.clone(), binder)));
                id
            }
            LogicalExpression::Lambda(lambda) => {
                let argument = self.next_id();
                let mut argument_node = BoundNode::new(
                    argument,
                    LogicalExpression::Variable(lambda.argument().clone()),
                    None,
                );
                argument_node.set_binder(argument);
                self.nodes.push(Node::Bound(argument_node));
                self.scope.push((lambda.argument().clone(), argument));
                let body = self.visit(lambda.body());
                self.scope.pop();
                let id = self.next_id();
                self.nodes.push(Node::Lambda(LambdaNode::new(id, expression.clone(), argument, body)));
                id
            }
            LogicalExpression::Literal(literal) => {
                let predicate = self.visit(literal.predicate());
                let args = literal.args().iter().map(|arg| self.visit(arg)).collect();
                let id = self.next_id();
                self.nodes.push(Node::Literal(LiteralNode::new(id, expression.clone(), predicate, args)));
                id
            }
        }
    }

    /// Generated candidates without repeats, in the order first proposed.
    fn domain_of(&self, constant: &LogicalExpression) -> Vec<LogicalExpression> {
        let mut domain: Vec<LogicalExpression> = Vec::new();
        for candidate in self.generator.assignments(constant) {
            if !domain.contains(&candidate) {
                domain.push(candidate);
            }
        }
        if domain.is_empty() {
            if self.language.is_placeholder(constant) && self.policy == EmptyDomainPolicy::Exclude {
                debug!(placeholder = %constant, "placeholder left without candidates");
            } else {
                domain.push(constant.clone());
            }
        }
        domain
    }
}
