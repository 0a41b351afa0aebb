//! Reads logical forms from their textual notation. Grammar details live in `logic.pest`.
use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest_derive::Parser;

use crate::error::{RefgraphError, Result};
use crate::logic::{LogicalExpression, Type, Variable};

#[derive(Parser)]
#[grammar = "logic.pest"]
pub struct LogicParser;

/// Parses a single expression. Bound variables may omit their type after the
/// binder, e.g. `(lambda $0:e (boy:<e,t> $0))`.
pub fn read(text: &str) -> Result<LogicalExpression> {
    let mut pairs = LogicParser::parse(Rule::input, text)?;
    let input = next_pair(&mut pairs, "input")?;
    let mut inner = input.into_inner();
    let mut scope = Vec::new();
    build(next_pair(&mut inner, "expression")?, &mut scope)
}

/// Parses a type such as `<e,<e,t>>` or `t*`.
pub fn read_type(text: &str) -> Result<Type> {
    let mut pairs = LogicParser::parse(Rule::type_spec, text.trim())?;
    let pair = next_pair(&mut pairs, "type")?;
    if pair.as_str().len() != text.trim().len() {
        return Err(parse_error(format!("trailing input after type: {}", text), &pair));
    }
    build_type(pair)
}

fn next_pair<'i>(pairs: &mut Pairs<'i, Rule>, what: &str) -> Result<Pair<'i, Rule>> {
    pairs
        .next()
        .ok_or_else(|| RefgraphError::Invariant(format!("parser produced no {}", what)))
}

fn parse_error(message: String, pair: &Pair<Rule>) -> RefgraphError {
    let (line, col) = pair.as_span().start_pos().line_col();
    RefgraphError::Parse { message, line: Some(line), col: Some(col) }
}

fn index_of(pair: &Pair<Rule>) -> Result<u32> {
    pair.as_str()[1..]
        .parse()
        .map_err(|_| parse_error(format!("invalid index: {}", pair.as_str()), pair))
}

fn build(pair: Pair<Rule>, scope: &mut Vec<Variable>) -> Result<LogicalExpression> {
    match pair.as_rule() {
        Rule::lambda => {
            let mut inner = pair.into_inner();
            let mut binder = next_pair(&mut inner, "binder")?.into_inner();
            let index = index_of(&next_pair(&mut binder, "variable index")?)?;
            let ty = build_type(next_pair(&mut binder, "binder type")?)?;
            let argument = Variable::new(index, ty);
            scope.push(argument.clone());
            let body = build(next_pair(&mut inner, "lambda body")?, scope);
            scope.pop();
            Ok(LogicalExpression::lambda(argument, body?))
        }
        Rule::literal => {
            let mut inner = pair.into_inner();
            let predicate = build(next_pair(&mut inner, "predicate")?, scope)?;
            let args = inner
                .map(|arg| build(arg, scope))
                .collect::<Result<Vec<_>>>()?;
            Ok(LogicalExpression::literal(predicate, args))
        }
        Rule::skolem_id => Ok(LogicalExpression::skolem_id(index_of(&pair)?)),
        Rule::variable => {
            let mut inner = pair.clone().into_inner();
            let index = index_of(&next_pair(&mut inner, "variable index")?)?;
            match inner.next() {
                Some(ty) => Ok(LogicalExpression::variable(index, build_type(ty)?)),
                None => scope
                    .iter()
                    .rev()
                    .find(|v| v.index() == index)
                    .map(|v| LogicalExpression::Variable(v.clone()))
                    .ok_or_else(|| parse_error(format!("unbound untyped variable ${}", index), &pair)),
            }
        }
        Rule::constant => {
            let mut inner = pair.into_inner();
            let name = next_pair(&mut inner, "constant name")?.as_str().to_string();
            let ty = build_type(next_pair(&mut inner, "constant type")?)?;
            Ok(LogicalExpression::constant(&name, ty))
        }
        other => Err(RefgraphError::Invariant(format!("unexpected rule {:?}", other))),
    }
}

fn build_type(pair: Pair<Rule>) -> Result<Type> {
    match pair.as_rule() {
        Rule::type_spec => build_type(next_pair(&mut pair.into_inner(), "type")?),
        Rule::complex_type => {
            let mut inner = pair.into_inner();
            let domain = build_type(next_pair(&mut inner, "domain")?)?;
            let range = build_type(next_pair(&mut inner, "range")?)?;
            Ok(Type::complex(domain, range))
        }
        Rule::array_type => {
            let base = build_type(next_pair(&mut pair.into_inner(), "array base")?)?;
            Ok(Type::array(base))
        }
        Rule::primitive_type => Ok(Type::primitive(pair.as_str())),
        other => Err(RefgraphError::Invariant(format!("unexpected type rule {:?}", other))),
    }
}
