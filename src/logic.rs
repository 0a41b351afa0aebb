//! Typed lambda-calculus expressions and the language conventions around them.
//!
//! Expressions are immutable trees shared through `Arc`. Equality, ordering
//! and hashing are structural, so two separately read copies of the same
//! logical form compare equal.
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::assignment::SpecificationMapping;

// ------------- Type -------------
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    Primitive(Arc<str>),
    /// `t*`, consumed by a literal as any number of arguments.
    Array(Arc<Type>),
    Complex(Arc<Type>, Arc<Type>),
}

impl Type {
    pub fn primitive(name: &str) -> Self {
        Type::Primitive(Arc::from(name))
    }
    pub fn array(base: Type) -> Self {
        Type::Array(Arc::new(base))
    }
    pub fn complex(domain: Type, range: Type) -> Self {
        Type::Complex(Arc::new(domain), Arc::new(range))
    }
    pub fn is_complex(&self) -> bool {
        matches!(self, Type::Complex(..))
    }
    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }
    pub fn is_truth_value(&self) -> bool {
        matches!(self, Type::Primitive(name) if &**name == "t")
    }
    pub fn domain(&self) -> Option<&Type> {
        match self {
            Type::Complex(domain, _) => Some(domain),
            _ => None,
        }
    }
    pub fn range(&self) -> Option<&Type> {
        match self {
            Type::Complex(_, range) => Some(range),
            _ => None,
        }
    }
    /// The type left after applying a function of this type to `arity` arguments.
    pub fn apply(&self, arity: usize) -> Option<Type> {
        let mut current = self.clone();
        let mut consumed = 0;
        while consumed < arity {
            match current {
                Type::Complex(domain, range) => {
                    if domain.is_array() {
                        return Some((*range).clone());
                    }
                    current = (*range).clone();
                    consumed += 1;
                }
                _ => return None,
            }
        }
        Some(current)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Primitive(name) => write!(f, "{}", name),
            Type::Array(base) => write!(f, "{}*", base),
            Type::Complex(domain, range) => write!(f, "<{},{}>", domain, range),
        }
    }
}

// ------------- Expression parts -------------
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constant {
    name: Arc<str>,
    ty: Type,
}

impl Constant {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn ty(&self) -> &Type {
        &self.ty
    }
    /// Surface form and directionality carried in an overloaded name.
    pub fn overload(&self) -> Option<Overload<'_>> {
        let (base, rest) = self.name.split_once(OVERLOAD_SEPARATOR)?;
        let (surface_form, directionality) = match rest.split_once(DIRECTIONALITY_SEPARATOR) {
            Some((surface_form, directionality)) => (surface_form, Some(directionality)),
            None => (rest, None),
        };
        Some(Overload { base, surface_form, directionality })
    }
    /// The name with any overload stripped.
    pub fn wrapped_name(&self) -> &str {
        self.overload().map_or(self.name(), |o| o.base)
    }
}

const OVERLOAD_SEPARATOR: &str = "~~";
const DIRECTIONALITY_SEPARATOR: &str = "^^";

/// View of a constant named `base~~surface-form^^directionality`, the last
/// part optional. The lexicon overloads a constant this way with the tokens
/// it was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Overload<'c> {
    base: &'c str,
    surface_form: &'c str,
    directionality: Option<&'c str>,
}

impl<'c> Overload<'c> {
    pub fn base(&self) -> &'c str {
        self.base
    }
    pub fn surface_form(&self) -> &'c str {
        self.surface_form
    }
    pub fn directionality(&self) -> Option<&'c str> {
        self.directionality
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Variable {
    index: u32,
    ty: Type,
}

impl Variable {
    pub fn new(index: u32, ty: Type) -> Self {
        Self { index, ty }
    }
    pub fn index(&self) -> u32 {
        self.index
    }
    pub fn ty(&self) -> &Type {
        &self.ty
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SkolemId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lambda {
    argument: Variable,
    body: LogicalExpression,
}

impl Lambda {
    pub fn argument(&self) -> &Variable {
        &self.argument
    }
    pub fn body(&self) -> &LogicalExpression {
        &self.body
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    predicate: LogicalExpression,
    args: Vec<LogicalExpression>,
}

impl Literal {
    pub fn predicate(&self) -> &LogicalExpression {
        &self.predicate
    }
    pub fn args(&self) -> &[LogicalExpression] {
        &self.args
    }
    pub fn num_args(&self) -> usize {
        self.args.len()
    }
}

// ------------- LogicalExpression -------------
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LogicalExpression {
    Constant(Arc<Constant>),
    Variable(Variable),
    SkolemId(SkolemId),
    Lambda(Arc<Lambda>),
    Literal(Arc<Literal>),
}

impl LogicalExpression {
    pub fn constant(name: &str, ty: Type) -> Self {
        LogicalExpression::Constant(Arc::new(Constant { name: Arc::from(name), ty }))
    }
    pub fn variable(index: u32, ty: Type) -> Self {
        LogicalExpression::Variable(Variable::new(index, ty))
    }
    pub fn skolem_id(id: u32) -> Self {
        LogicalExpression::SkolemId(SkolemId(id))
    }
    pub fn lambda(argument: Variable, body: LogicalExpression) -> Self {
        LogicalExpression::Lambda(Arc::new(Lambda { argument, body }))
    }
    pub fn literal(predicate: LogicalExpression, args: Vec<LogicalExpression>) -> Self {
        LogicalExpression::Literal(Arc::new(Literal { predicate, args }))
    }
    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            LogicalExpression::Constant(c) => Some(c),
            _ => None,
        }
    }
    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            LogicalExpression::Variable(v) => Some(v),
            _ => None,
        }
    }
    pub fn as_skolem_id(&self) -> Option<SkolemId> {
        match self {
            LogicalExpression::SkolemId(id) => Some(*id),
            _ => None,
        }
    }
    pub fn as_lambda(&self) -> Option<&Lambda> {
        match self {
            LogicalExpression::Lambda(l) => Some(l),
            _ => None,
        }
    }
    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            LogicalExpression::Literal(l) => Some(l),
            _ => None,
        }
    }
    /// Name of a constant, `None` for every other variant.
    pub fn base_name(&self) -> Option<&str> {
        self.as_constant().map(Constant::name)
    }
    pub fn ty(&self) -> Option<Type> {
        match self {
            LogicalExpression::Constant(c) => Some(c.ty.clone()),
            LogicalExpression::Variable(v) => Some(v.ty.clone()),
            LogicalExpression::SkolemId(_) => Some(Type::primitive("id")),
            LogicalExpression::Lambda(l) => {
                Some(Type::complex(l.argument.ty.clone(), l.body.ty()?))
            }
            LogicalExpression::Literal(l) => l.predicate.ty()?.apply(l.args.len()),
        }
    }
    /// Every skolem ID occurring in the expression, in ascending order.
    pub fn skolem_ids(&self) -> BTreeSet<SkolemId> {
        let mut ids = BTreeSet::new();
        self.collect_skolem_ids(&mut ids);
        ids
    }
    fn collect_skolem_ids(&self, ids: &mut BTreeSet<SkolemId>) {
        match self {
            LogicalExpression::SkolemId(id) => {
                ids.insert(*id);
            }
            LogicalExpression::Lambda(l) => l.body.collect_skolem_ids(ids),
            LogicalExpression::Literal(l) => {
                l.predicate.collect_skolem_ids(ids);
                for arg in &l.args {
                    arg.collect_skolem_ids(ids);
                }
            }
            LogicalExpression::Constant(_) | LogicalExpression::Variable(_) => {}
        }
    }
}

impl fmt::Display for LogicalExpression {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LogicalExpression::Constant(c) => write!(f, "{}:{}", c.name, c.ty),
            LogicalExpression::Variable(v) => write!(f, "${}", v.index),
            LogicalExpression::SkolemId(id) => write!(f, "!{}", id.0),
            LogicalExpression::Lambda(l) => write!(
                f,
                "(lambda ${}:{} {})",
                l.argument.index, l.argument.ty, l.body
            ),
            LogicalExpression::Literal(l) => {
                write!(f, "({}", l.predicate)?;
                for arg in &l.args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

// ------------- LogicLanguage -------------
/// Naming conventions of the meaning representation, threaded explicitly
/// into the graph builder, the assignment generators and the feature sets.
#[derive(Clone, Debug)]
pub struct LogicLanguage {
    skolem_predicate: String,
    ref_predicate: String,
    conjunction: String,
    disjunction: String,
    passive_suffix: String,
    id_placeholder: LogicalExpression,
    specification_mapping: Arc<SpecificationMapping>,
}

impl Default for LogicLanguage {
    fn default() -> Self {
        Self {
            skolem_predicate: "a".to_string(),
            ref_predicate: "ref".to_string(),
            conjunction: "and".to_string(),
            disjunction: "or".to_string(),
            passive_suffix: "-of".to_string(),
            id_placeholder: LogicalExpression::constant("na", Type::primitive("id")),
            specification_mapping: Arc::new(SpecificationMapping::default()),
        }
    }
}

impl LogicLanguage {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_specification_mapping(mut self, mapping: SpecificationMapping) -> Self {
        self.specification_mapping = Arc::new(mapping);
        self
    }
    pub fn with_id_placeholder(mut self, placeholder: LogicalExpression) -> Self {
        self.id_placeholder = placeholder;
        self
    }
    pub fn id_placeholder(&self) -> &LogicalExpression {
        &self.id_placeholder
    }
    pub fn specification_mapping(&self) -> &Arc<SpecificationMapping> {
        &self.specification_mapping
    }
    pub fn is_placeholder(&self, exp: &LogicalExpression) -> bool {
        exp == &self.id_placeholder
    }
    fn literal_named<'e>(&self, exp: &'e LogicalExpression, name: &str) -> Option<&'e Literal> {
        exp.as_literal()
            .filter(|l| l.predicate.base_name() == Some(name))
    }
    /// `(a:<id,<<e,t>,e>> !n (lambda $x:e ...))`
    pub fn is_skolem_term(&self, exp: &LogicalExpression) -> bool {
        self.literal_named(exp, &self.skolem_predicate)
            .is_some_and(|l| l.num_args() == 2)
    }
    pub fn is_skolem_predicate(&self, exp: &LogicalExpression) -> bool {
        exp.base_name() == Some(self.skolem_predicate.as_str())
    }
    /// `(ref:<id,e> X)`
    pub fn is_ref_literal(&self, exp: &LogicalExpression) -> bool {
        self.literal_named(exp, &self.ref_predicate)
            .is_some_and(|l| l.num_args() == 1)
    }
    pub fn is_ref_predicate(&self, exp: &LogicalExpression) -> bool {
        exp.base_name() == Some(self.ref_predicate.as_str())
    }
    pub fn is_conjunction(&self, exp: &LogicalExpression) -> bool {
        exp.base_name() == Some(self.conjunction.as_str())
    }
    pub fn is_coordination_predicate(&self, exp: &LogicalExpression) -> bool {
        self.is_conjunction(exp) || exp.base_name() == Some(self.disjunction.as_str())
    }
    pub fn is_passive_predicate(&self, exp: &LogicalExpression) -> bool {
        exp.base_name().is_some_and(|name| {
            name.len() > self.passive_suffix.len() && name.ends_with(&self.passive_suffix)
        })
    }
    /// Strips the passive suffix from a relation, leaving anything else as is.
    pub fn make_relation_active(&self, exp: &LogicalExpression) -> LogicalExpression {
        match exp.as_constant() {
            Some(c) if self.is_passive_predicate(exp) => {
                let active = &c.name()[..c.name().len() - self.passive_suffix.len()];
                LogicalExpression::constant(active, c.ty().clone())
            }
            _ => exp.clone(),
        }
    }
    /// Short string used in feature keys.
    pub fn head_string(&self, exp: &LogicalExpression) -> String {
        match exp {
            LogicalExpression::Constant(c) => c.wrapped_name().to_string(),
            LogicalExpression::Literal(l) => self.head_string(&l.predicate),
            LogicalExpression::Lambda(l) => self.head_string(&l.body),
            other => other.to_string(),
        }
    }
}
