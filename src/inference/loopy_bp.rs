//! Loopy belief propagation in log space.
//!
//! Every round computes all variable→factor messages and then all
//! factor→variable messages from the previous round's messages only, so
//! the result does not depend on how the per-edge work is scheduled. The
//! run stops once no message moved by more than `epsilon` (in probability
//! space), after `max_iterations` rounds, or when the optional time bound
//! has elapsed. None of these is an error.
use std::collections::HashMap;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::graph::{Edge, EdgeId, Factor, FactorGraph, FactorId, Node, NodeId};
use crate::table::{NodeHasher, Table};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BpOutcome {
    pub iterations: usize,
    pub converged: bool,
    pub timed_out: bool,
    /// Largest message change of the last round.
    pub delta: f64,
}

#[derive(Clone, Debug)]
pub struct LoopyBp {
    epsilon: f64,
    max_iterations: usize,
    max_time: Option<Duration>,
}

impl LoopyBp {
    pub fn new(epsilon: f64, max_iterations: usize) -> Self {
        Self { epsilon, max_iterations, max_time: None }
    }
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }
    pub fn max_time(&self) -> Option<Duration> {
        self.max_time
    }

    /// Runs to termination, then stores variable beliefs, factor beliefs
    /// and the final messages on the graph and marks it as having marginals.
    pub fn run(&self, graph: &mut FactorGraph) -> Result<BpOutcome> {
        let started = Instant::now();
        let (nodes, keeper) = graph.parts_mut()?;

        let topology = Topology::new(nodes, keeper.edges(), keeper.factors())?;
        let potentials: Vec<Table> = keeper
            .factors()
            .iter()
            .map(|factor| Table::with_space(factor.table().table(), true))
            .collect();
        let uniform = |table: &Table| {
            let mut message = table.clone_empty();
            message.normalize();
            message
        };
        let mut to_factor: Vec<Table> =
            keeper.edges().iter().map(|e| uniform(e.to_factor_message())).collect();
        let mut to_variable: Vec<Table> =
            keeper.edges().iter().map(|e| uniform(e.to_variable_message())).collect();

        let mut outcome = BpOutcome { iterations: 0, converged: false, timed_out: false, delta: 0.0 };
        while outcome.iterations < self.max_iterations {
            let next_to_factor: Vec<Table> = (0..topology.edges.len())
                .into_par_iter()
                .map(|edge| topology.variable_message(edge, &to_factor, &to_variable))
                .collect::<Result<_>>()?;
            let next_to_variable: Vec<Table> = (0..topology.edges.len())
                .into_par_iter()
                .map(|edge| topology.factor_message(edge, &potentials, &to_factor, &to_variable))
                .collect::<Result<_>>()?;

            outcome.delta = next_to_factor
                .iter()
                .zip(&to_factor)
                .chain(next_to_variable.iter().zip(&to_variable))
                .map(|(next, previous)| next.max_difference(previous))
                .fold(0.0, f64::max);
            to_factor = next_to_factor;
            to_variable = next_to_variable;
            outcome.iterations += 1;

            if outcome.delta <= self.epsilon {
                outcome.converged = true;
                break;
            }
            if self.max_time.is_some_and(|limit| started.elapsed() >= limit) {
                outcome.timed_out = true;
                break;
            }
        }

        for node in nodes.iter_mut() {
            let Node::Variable(variable) = node else { continue };
            let mut belief = Table::new(true, vec![variable.header().clone()])?;
            for edge in topology.edges_of(variable.id()) {
                belief.add_along(variable.id(), to_variable[edge.0].values())?;
            }
            belief.normalize();
            variable.set_belief(belief);
        }
        for (index, factor) in keeper.factors_mut().iter_mut().enumerate() {
            let mut belief = potentials[index].clone();
            for edge in factor.edges() {
                let (variable, _) = topology.edges[edge.0];
                belief.add_along(variable, to_factor[edge.0].values())?;
            }
            belief.normalize();
            factor.set_belief(belief);
        }
        for (edge, (to_factor, to_variable)) in keeper
            .edges_mut()
            .iter_mut()
            .zip(to_factor.into_iter().zip(to_variable))
        {
            edge.set_messages(to_factor, to_variable);
        }
        graph.set_has_marginals(true);

        info!(
            iterations = outcome.iterations,
            converged = outcome.converged,
            timed_out = outcome.timed_out,
            delta = outcome.delta,
            ms = started.elapsed().as_secs_f64() * 1000.0,
            "belief propagation finished"
        );
        Ok(outcome)
    }
}

/// Shorthand for a run without a time bound.
pub fn run(graph: &mut FactorGraph, epsilon: f64, max_iterations: usize) -> Result<BpOutcome> {
    LoopyBp::new(epsilon, max_iterations).run(graph)
}

/// Read-only adjacency snapshot shared by the per-edge computations.
struct Topology {
    /// `(variable, factor)` per edge id.
    edges: Vec<(NodeId, FactorId)>,
    factor_edges: Vec<Vec<EdgeId>>,
    variable_edges: HashMap<NodeId, Vec<EdgeId>, NodeHasher>,
}

impl Topology {
    fn new(nodes: &[Node], edges: &[Edge], factors: &[Factor]) -> Result<Self> {
        let mut variable_edges: HashMap<NodeId, Vec<EdgeId>, NodeHasher> = HashMap::default();
        for variable in nodes.iter().filter_map(Node::as_variable) {
            variable_edges.insert(variable.id(), variable.edges()?);
        }
        Ok(Self {
            edges: edges.iter().map(|e| (e.variable(), e.factor())).collect(),
            factor_edges: factors.iter().map(|f| f.edges().to_vec()).collect(),
            variable_edges,
        })
    }

    fn edges_of(&self, variable: NodeId) -> &[EdgeId] {
        self.variable_edges.get(&variable).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Product of the messages from every other factor of the variable.
    fn variable_message(&self, edge: usize, to_factor: &[Table], to_variable: &[Table]) -> Result<Table> {
        let (variable, _) = self.edges[edge];
        let mut message = to_factor[edge].clone_empty();
        for other in self.edges_of(variable) {
            if other.0 != edge {
                message.add_along(variable, to_variable[other.0].values())?;
            }
        }
        message.normalize();
        Ok(message)
    }

    /// Factor potential times the messages from every other variable,
    /// summed out onto the target variable.
    fn factor_message(
        &self,
        edge: usize,
        potentials: &[Table],
        to_factor: &[Table],
        to_variable: &[Table],
    ) -> Result<Table> {
        let (variable, factor) = self.edges[edge];
        let mut product = potentials[factor.0].clone();
        for other in &self.factor_edges[factor.0] {
            if other.0 != edge {
                let (neighbor, _) = self.edges[other.0];
                product.add_along(neighbor, to_factor[other.0].values())?;
            }
        }
        let mut message = to_variable[edge].clone_empty();
        message.add_along(variable, &product.marginal(variable)?)?;
        message.normalize();
        Ok(message)
    }
}
