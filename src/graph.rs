//! Factor graph over the nodes of one logical expression.
//!
//! All nodes live in a flat arena indexed by [`NodeId`]; factors and edges
//! live in a second arena behind a mutex so feature jobs can attach factors
//! concurrently. Adjacency is stored as id lists on both sides, which keeps
//! cyclic reference structure free of ownership cycles.
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::error::{RefgraphError, Result};
use crate::logic::LogicalExpression;
use crate::table::{ColumnHeader, FactorTable, Table};

/// Beliefs closer than this are treated as tied.
pub const TIE_TOLERANCE: f64 = 1e-9;

// ------------- Ids -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FactorId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EdgeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}
impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "f{}", self.0)
    }
}
impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

// ------------- Nodes -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum VariableKind {
    Constant,
    SkolemId,
}

/// A constant or skolem ID occurrence that takes one value from its domain.
#[derive(Debug)]
pub struct VariableNode {
    id: NodeId,
    expression: LogicalExpression,
    kind: VariableKind,
    domain: Vec<LogicalExpression>,
    header: ColumnHeader,
    edges: Mutex<Vec<EdgeId>>,
    belief: Option<Table>,
    parent: Option<NodeId>,
}

impl VariableNode {
    pub(crate) fn new(
        id: NodeId,
        expression: LogicalExpression,
        kind: VariableKind,
        domain: Vec<LogicalExpression>,
    ) -> Self {
        let header = ColumnHeader::new(id, &expression.to_string(), &domain);
        Self {
            id,
            expression,
            kind,
            domain,
            header,
            edges: Mutex::new(Vec::new()),
            belief: None,
            parent: None,
        }
    }
    pub fn id(&self) -> NodeId {
        self.id
    }
    pub fn expression(&self) -> &LogicalExpression {
        &self.expression
    }
    pub fn kind(&self) -> VariableKind {
        self.kind
    }
    pub fn domain(&self) -> &[LogicalExpression] {
        &self.domain
    }
    pub fn num_assignments(&self) -> usize {
        self.domain.len()
    }
    pub fn header(&self) -> &ColumnHeader {
        &self.header
    }
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
    /// Normalized log-space marginal, set by belief propagation.
    pub fn belief(&self) -> Option<&Table> {
        self.belief.as_ref()
    }
    pub(crate) fn set_belief(&mut self, belief: Table) {
        self.belief = Some(belief);
    }
    pub fn edges(&self) -> Result<Vec<EdgeId>> {
        Ok(self.edges.lock()?.clone())
    }
    pub fn num_edges(&self) -> Result<usize> {
        Ok(self.edges.lock()?.len())
    }
    fn add_edge(&self, edge: EdgeId) -> Result<()> {
        self.edges.lock()?.push(edge);
        Ok(())
    }

    /// All values sharing the highest belief, and that belief. A single
    /// value domain is certain, so its log belief is 0.
    pub fn max_assignments(&self) -> Result<(Vec<LogicalExpression>, f64)> {
        let belief = self.belief.as_ref().ok_or_else(|| {
            RefgraphError::MissingMarginals(format!("no belief for {}", self.expression))
        })?;
        if self.domain.len() == 1 {
            return Ok((self.domain.clone(), 0.0));
        }
        let mut max = f64::NEG_INFINITY;
        let mut argmax = Vec::new();
        for (value, score) in self.domain.iter().zip(belief.values()) {
            if (score - max).abs() <= TIE_TOLERANCE {
                argmax.push(value.clone());
            } else if *score > max {
                max = *score;
                argmax = vec![value.clone()];
            }
        }
        Ok((argmax, max))
    }
}

/// Occurrence of a lambda-bound variable. `binder` is the argument node of
/// the lambda that binds it.
#[derive(Debug, Clone)]
pub struct BoundNode {
    id: NodeId,
    expression: LogicalExpression,
    binder: Option<NodeId>,
    parent: Option<NodeId>,
}

impl BoundNode {
    pub(crate) fn new(id: NodeId, expression: LogicalExpression, binder: Option<NodeId>) -> Self {
        Self { id, expression, binder, parent: None }
    }
    pub fn binder(&self) -> Option<NodeId> {
        self.binder
    }
    pub(crate) fn set_binder(&mut self, binder: NodeId) {
        self.binder = Some(binder);
    }
}

#[derive(Debug, Clone)]
pub struct LambdaNode {
    id: NodeId,
    expression: LogicalExpression,
    argument: NodeId,
    body: NodeId,
    parent: Option<NodeId>,
}

impl LambdaNode {
    pub(crate) fn new(id: NodeId, expression: LogicalExpression, argument: NodeId, body: NodeId) -> Self {
        Self { id, expression, argument, body, parent: None }
    }
    pub fn argument(&self) -> NodeId {
        self.argument
    }
    pub fn body(&self) -> NodeId {
        self.body
    }
}

#[derive(Debug, Clone)]
pub struct LiteralNode {
    id: NodeId,
    expression: LogicalExpression,
    predicate: NodeId,
    args: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl LiteralNode {
    pub(crate) fn new(
        id: NodeId,
        expression: LogicalExpression,
        predicate: NodeId,
        args: Vec<NodeId>,
    ) -> Self {
        Self { id, expression, predicate, args, parent: None }
    }
    pub fn predicate(&self) -> NodeId {
        self.predicate
    }
    pub fn args(&self) -> &[NodeId] {
        &self.args
    }
}

#[derive(Debug)]
pub enum Node {
    Variable(VariableNode),
    Bound(BoundNode),
    Lambda(LambdaNode),
    Literal(LiteralNode),
}

impl Node {
    pub fn id(&self) -> NodeId {
        match self {
            Node::Variable(n) => n.id,
            Node::Bound(n) => n.id,
            Node::Lambda(n) => n.id,
            Node::Literal(n) => n.id,
        }
    }
    /// The sub-expression this node stands for in the input.
    pub fn expression(&self) -> &LogicalExpression {
        match self {
            Node::Variable(n) => &n.expression,
            Node::Bound(n) => &n.expression,
            Node::Lambda(n) => &n.expression,
            Node::Literal(n) => &n.expression,
        }
    }
    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Variable(n) => n.parent,
            Node::Bound(n) => n.parent,
            Node::Lambda(n) => n.parent,
            Node::Literal(n) => n.parent,
        }
    }
    fn set_parent(&mut self, parent: NodeId) {
        match self {
            Node::Variable(n) => n.parent = Some(parent),
            Node::Bound(n) => n.parent = Some(parent),
            Node::Lambda(n) => n.parent = Some(parent),
            Node::Literal(n) => n.parent = Some(parent),
        }
    }
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            Node::Variable(_) | Node::Bound(_) => Vec::new(),
            Node::Lambda(n) => vec![n.argument, n.body],
            Node::Literal(n) => std::iter::once(n.predicate).chain(n.args.iter().copied()).collect(),
        }
    }
    pub fn as_variable(&self) -> Option<&VariableNode> {
        match self {
            Node::Variable(n) => Some(n),
            _ => None,
        }
    }
    pub fn as_bound(&self) -> Option<&BoundNode> {
        match self {
            Node::Bound(n) => Some(n),
            _ => None,
        }
    }
    pub fn as_lambda(&self) -> Option<&LambdaNode> {
        match self {
            Node::Lambda(n) => Some(n),
            _ => None,
        }
    }
    pub fn as_literal(&self) -> Option<&LiteralNode> {
        match self {
            Node::Literal(n) => Some(n),
            _ => None,
        }
    }
}

// ------------- Factors and edges -------------
#[derive(Debug, Clone)]
pub struct Factor {
    id: FactorId,
    label: String,
    table: FactorTable,
    edges: Vec<EdgeId>,
    belief: Option<Table>,
}

impl Factor {
    pub fn id(&self) -> FactorId {
        self.id
    }
    pub fn label(&self) -> &str {
        &self.label
    }
    pub fn table(&self) -> &FactorTable {
        &self.table
    }
    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }
    /// Neighboring variables in header order.
    pub fn neighbors(&self) -> Vec<NodeId> {
        self.table.headers().iter().map(ColumnHeader::node).collect()
    }
    pub fn belief(&self) -> Option<&Table> {
        self.belief.as_ref()
    }
    pub(crate) fn set_belief(&mut self, belief: Table) {
        self.belief = Some(belief);
    }
}

/// Connects one factor to one variable and carries the messages both ways,
/// each a log-space table over the variable's header.
#[derive(Debug, Clone)]
pub struct Edge {
    id: EdgeId,
    variable: NodeId,
    factor: FactorId,
    to_factor: Table,
    to_variable: Table,
}

impl Edge {
    fn new(id: EdgeId, header: &ColumnHeader, factor: FactorId) -> Result<Self> {
        let mut uniform = Table::new(true, vec![header.clone()])?;
        uniform.normalize();
        Ok(Self {
            id,
            variable: header.node(),
            factor,
            to_factor: uniform.clone(),
            to_variable: uniform,
        })
    }
    pub fn id(&self) -> EdgeId {
        self.id
    }
    pub fn variable(&self) -> NodeId {
        self.variable
    }
    pub fn factor(&self) -> FactorId {
        self.factor
    }
    pub fn to_factor_message(&self) -> &Table {
        &self.to_factor
    }
    pub fn to_variable_message(&self) -> &Table {
        &self.to_variable
    }
    pub(crate) fn set_messages(&mut self, to_factor: Table, to_variable: Table) {
        self.to_factor = to_factor;
        self.to_variable = to_variable;
    }
}

/// Owns every factor and edge of a graph.
#[derive(Debug, Default)]
pub struct FactorKeeper {
    factors: Vec<Factor>,
    edges: Vec<Edge>,
}

impl FactorKeeper {
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
    pub fn factor(&self, id: FactorId) -> Option<&Factor> {
        self.factors.get(id.0)
    }
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0)
    }
    pub(crate) fn factors_mut(&mut self) -> &mut [Factor] {
        &mut self.factors
    }
    pub(crate) fn edges_mut(&mut self) -> &mut [Edge] {
        &mut self.edges
    }
    pub fn len(&self) -> usize {
        self.factors.len()
    }
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

// ------------- FactorGraph -------------
#[derive(Debug)]
pub struct FactorGraph {
    root: NodeId,
    nodes: Vec<Node>,
    closure: bool,
    has_marginals: bool,
    keeper: Mutex<FactorKeeper>,
}

impl FactorGraph {
    /// `nodes` must be indexed by their ids; parents are derived here.
    pub(crate) fn new(root: NodeId, mut nodes: Vec<Node>, closure: bool) -> Self {
        let links: Vec<(NodeId, NodeId)> = nodes
            .iter()
            .flat_map(|node| node.children().into_iter().map(move |child| (child, node.id())))
            .collect();
        for (child, parent) in links {
            if let Some(node) = nodes.get_mut(child.0) {
                node.set_parent(parent);
            }
        }
        Self {
            root,
            nodes,
            closure,
            has_marginals: false,
            keeper: Mutex::new(FactorKeeper::default()),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }
    pub fn root_node(&self) -> Result<&Node> {
        self.node(self.root)
    }
    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| RefgraphError::Invariant(format!("no node {}", id)))
    }
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
    pub fn variable(&self, id: NodeId) -> Result<&VariableNode> {
        self.node(id)?
            .as_variable()
            .ok_or_else(|| RefgraphError::Invariant(format!("{} is not a variable node", id)))
    }
    pub fn variables(&self) -> impl Iterator<Item = &VariableNode> {
        self.nodes.iter().filter_map(Node::as_variable)
    }
    pub fn is_closure(&self) -> bool {
        self.closure
    }
    pub fn has_marginals(&self) -> bool {
        self.has_marginals
    }
    pub(crate) fn set_has_marginals(&mut self, has_marginals: bool) {
        self.has_marginals = has_marginals;
    }

    /// Node ids from the root, parents before children, predicates before arguments.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(node) = self.nodes.get(id.0) {
                stack.extend(node.children().into_iter().rev());
            }
        }
        order
    }

    pub fn factors(&self) -> Result<MutexGuard<'_, FactorKeeper>> {
        Ok(self.keeper.lock()?)
    }
    pub fn num_factors(&self) -> Result<usize> {
        Ok(self.keeper.lock()?.len())
    }

    /// Registers a factor and one edge per header. Safe to call from many
    /// jobs at once.
    pub fn attach(&self, label: impl Into<String>, table: FactorTable) -> Result<FactorId> {
        for header in table.headers() {
            self.variable(header.node())?;
        }
        let mut keeper = self.keeper.lock()?;
        let id = FactorId(keeper.factors.len());
        let mut edges = Vec::with_capacity(table.headers().len());
        for header in table.headers() {
            let edge_id = EdgeId(keeper.edges.len());
            keeper.edges.push(Edge::new(edge_id, header, id)?);
            self.variable(header.node())?.add_edge(edge_id)?;
            edges.push(edge_id);
        }
        keeper.factors.push(Factor { id, label: label.into(), table, edges, belief: None });
        Ok(id)
    }

    /// Renumbers factors by label, then neighbors, so results do not depend
    /// on the order in which concurrent jobs finished. Messages are reset.
    pub fn sort_factors(&mut self) -> Result<()> {
        let keeper = self.keeper.get_mut()?;
        let mut factors = std::mem::take(&mut keeper.factors);
        factors.sort_by_cached_key(|f| (f.label.clone(), f.neighbors()));
        keeper.edges.clear();
        for node in self.nodes.iter_mut() {
            if let Node::Variable(variable) = node {
                variable.edges.get_mut()?.clear();
            }
        }
        for (index, mut factor) in factors.into_iter().enumerate() {
            factor.id = FactorId(index);
            factor.edges.clear();
            for header in factor.table.headers() {
                let edge_id = EdgeId(keeper.edges.len());
                keeper.edges.push(Edge::new(edge_id, header, factor.id)?);
                factor.edges.push(edge_id);
                if let Some(Node::Variable(variable)) = self.nodes.get_mut(header.node().0) {
                    variable.edges.get_mut()?.push(edge_id);
                }
            }
            keeper.factors.push(factor);
        }
        Ok(())
    }

    /// Split borrow used by inference to update beliefs and messages together.
    pub(crate) fn parts_mut(&mut self) -> Result<(&mut [Node], &mut FactorKeeper)> {
        let keeper = self.keeper.get_mut()?;
        Ok((&mut self.nodes, keeper))
    }

    /// Like `Display`, plus every factor table.
    pub fn to_string_verbose(&self) -> String {
        let mut out = self.to_string();
        if let Ok(keeper) = self.keeper.lock() {
            for factor in keeper.factors() {
                out.push_str(&format!("{} {}:\n{}", factor.id, factor.label, factor.table.table()));
            }
        }
        out
    }
}

impl fmt::Display for FactorGraph {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "FactorGraph(root={}, closure={}, marginals={})",
            self.root, self.closure, self.has_marginals
        )?;
        for variable in self.variables() {
            let domain: Vec<String> = variable.domain.iter().map(|v| v.to_string()).collect();
            write!(f, "  {} {} {{{}}}", variable.id, variable.expression, domain.join(", "))?;
            if let Some(belief) = &variable.belief {
                let probs: Vec<String> = belief.values().iter().map(|v| format!("{:.4}", v.exp())).collect();
                write!(f, " belief=[{}]", probs.join(", "))?;
            }
            writeln!(f)?;
        }
        let keeper = self.keeper.lock().map_err(|_| fmt::Error)?;
        for factor in keeper.factors() {
            let neighbors: Vec<String> = factor.neighbors().iter().map(|n| n.to_string()).collect();
            writeln!(f, "  {} {} -> [{}]", factor.id, factor.label, neighbors.join(", "))?;
        }
        Ok(())
    }
}
