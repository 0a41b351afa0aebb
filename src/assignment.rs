//! Candidate domains for the variable nodes of a factor graph.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::BuildHasherDefault;
use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use seahash::SeaHasher;
use tracing::debug;

use crate::error::{RefgraphError, Result};
use crate::logic::{Constant, LogicLanguage, LogicalExpression, Type};

pub type NameHasher = BuildHasherDefault<SeaHasher>;

/// Maps an expression occurrence to the values its variable node may take.
/// An empty result means the occurrence is not a resolution site.
pub trait AssignmentGenerator: Send + Sync {
    fn assignments(&self, expression: &LogicalExpression) -> Vec<LogicalExpression>;
}

impl<F> AssignmentGenerator for F
where
    F: Fn(&LogicalExpression) -> Vec<LogicalExpression> + Send + Sync,
{
    fn assignments(&self, expression: &LogicalExpression) -> Vec<LogicalExpression> {
        self(expression)
    }
}

/// Creates one generator per input expression.
pub trait AssignmentGeneratorFactory: Send + Sync {
    fn create(&self, expression: &LogicalExpression) -> Box<dyn AssignmentGenerator>;
}

// ------------- Reference assignments -------------
/// The id placeholder may refer to any skolem ID in the whole expression,
/// including IDs introduced after it. Constants with an entry in the
/// specification mapping get the mapped constants.
#[derive(Debug, Clone)]
pub struct ReferenceAssignments {
    placeholder: LogicalExpression,
    skolem_ids: Vec<LogicalExpression>,
    specification_mapping: Arc<SpecificationMapping>,
}

impl ReferenceAssignments {
    pub fn new(expression: &LogicalExpression, language: &LogicLanguage) -> Self {
        let skolem_ids = expression
            .skolem_ids()
            .into_iter()
            .map(LogicalExpression::SkolemId)
            .collect();
        Self {
            placeholder: language.id_placeholder().clone(),
            skolem_ids,
            specification_mapping: language.specification_mapping().clone(),
        }
    }
    pub fn skolem_ids(&self) -> &[LogicalExpression] {
        &self.skolem_ids
    }
}

impl AssignmentGenerator for ReferenceAssignments {
    fn assignments(&self, expression: &LogicalExpression) -> Vec<LogicalExpression> {
        if expression == &self.placeholder {
            self.skolem_ids.clone()
        } else if let Some(constant) = expression.as_constant() {
            self.specification_mapping.assignments(constant)
        } else {
            Vec::new()
        }
    }
}

pub struct ReferenceFactory {
    language: Arc<LogicLanguage>,
}

impl ReferenceFactory {
    pub fn new(language: Arc<LogicLanguage>) -> Self {
        Self { language }
    }
}

impl AssignmentGeneratorFactory for ReferenceFactory {
    fn create(&self, expression: &LogicalExpression) -> Box<dyn AssignmentGenerator> {
        let generator = ReferenceAssignments::new(expression, &self.language);
        debug!(ids = generator.skolem_ids().len(), "created reference assignment generator");
        Box::new(generator)
    }
}

/// Produces generators that never propose anything.
pub struct StubFactory;

impl AssignmentGeneratorFactory for StubFactory {
    fn create(&self, _expression: &LogicalExpression) -> Box<dyn AssignmentGenerator> {
        Box::new(|_: &LogicalExpression| Vec::<LogicalExpression>::new())
    }
}

// ------------- SpecificationMapping -------------
lazy_static! {
    static ref MAPPING_LINE: Regex = Regex::new(r"^([^\t]+)\t(.+)$").unwrap();
}

/// Underspecified constant names and the fully specified names they stand for.
/// Files carry one entry per line: `name<TAB>specific1,specific2,...`.
#[derive(Debug, Clone, Default)]
pub struct SpecificationMapping {
    assignments: BTreeMap<String, BTreeSet<String>>,
    underspecified: HashMap<String, String, NameHasher>,
}

impl SpecificationMapping {
    pub fn new(assignments: BTreeMap<String, BTreeSet<String>>) -> Self {
        let mut underspecified = HashMap::default();
        for (general, specifics) in &assignments {
            for specific in specifics {
                underspecified.insert(specific.clone(), general.clone());
            }
        }
        Self { assignments, underspecified }
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut assignments = BTreeMap::new();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let captures = MAPPING_LINE.captures(line).ok_or_else(|| RefgraphError::Parse {
                message: format!("malformed specification mapping line: {}", line),
                line: Some(number + 1),
                col: None,
            })?;
            let specifics = captures[2]
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>();
            assignments.insert(captures[1].trim().to_string(), specifics);
        }
        Ok(Self::new(assignments))
    }

    pub fn read(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Constants of the same type for every specific name mapped from this one.
    pub fn assignments(&self, constant: &Constant) -> Vec<LogicalExpression> {
        self.assignments
            .get(constant.wrapped_name())
            .map(|names| {
                names
                    .iter()
                    .map(|name| LogicalExpression::constant(name, constant.ty().clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_underspecified(&self, constant: &Constant) -> bool {
        self.assignments.contains_key(constant.wrapped_name())
    }

    /// Replaces a specific binary relation `<?,<?,t>>` with its general name.
    pub fn underspecify(&self, constant: &Constant) -> LogicalExpression {
        let binary_relation = constant
            .ty()
            .range()
            .and_then(Type::range)
            .is_some_and(Type::is_truth_value);
        match self.underspecified.get(constant.name()) {
            Some(general) if binary_relation => {
                LogicalExpression::constant(general, constant.ty().clone())
            }
            _ => LogicalExpression::Constant(Arc::new(constant.clone())),
        }
    }
}
