use std::sync::Arc;

use refgraph::builder::EmptyDomainPolicy;
use refgraph::features::{Model, RefControlFeatureSet};
use refgraph::inference::top_k;
use refgraph::logic::{LogicLanguage, LogicalExpression};
use refgraph::reader::read;
use refgraph::resolver::Resolver;
use refgraph::settings::InferenceSettings;

// "I want to buy a ticket"
const WANT: &str = "(a:<id,<<e,t>,e>> !1 (lambda $0:e (and:<t*,t> (want-01:<e,t> $0) \
    (c_ARG0:<e,<e,t>> $0 (a:<id,<<e,t>,e>> !2 (lambda $0:e (i:<e,t> $0)))) \
    (c_ARG1:<e,<e,t>> $0 (a:<id,<<e,t>,e>> !3 (lambda $0:e (and:<t*,t> (buy-01:<e,t> $0) \
    (c_ARG0:<e,<e,t>> $0 (ref:<id,e> na:id)) \
    (c_ARG1:<e,<e,t>> $0 (a:<id,<<e,t>,e>> !4 (lambda $0:e (ticket:<e,t> $0)))))))))))";

fn resolved(id: u32) -> LogicalExpression {
    read(&WANT.replace("(ref:<id,e> na:id)", &format!("(ref:<id,e> !{id})"))).expect("parse")
}

fn resolver(beam_size: usize) -> Resolver {
    let mut model = Model::new();
    model.set(&["REFCTRL", "want-01", "c_ARG0", "c_ARG1", "c_ARG0"], 1.0);
    let settings = InferenceSettings { beam_size, ..InferenceSettings::default() };
    Resolver::new(settings, Arc::new(LogicLanguage::default()), Arc::new(model))
        .expect("resolver")
        .with_feature_set(RefControlFeatureSet::default())
}

#[test]
fn control_resolves_to_the_wanter() {
    let resolver = resolver(100);
    let graph = resolver.graph(&read(WANT).expect("parse"), false).expect("graph");
    assert_eq!(graph.num_factors().expect("factors"), 2);

    let (results, exact) = top_k(&graph, 100, false).expect("beam");
    assert!(exact);
    assert_eq!(results.len(), 4);
    let max = results.iter().max().expect("a result");
    assert_eq!(max.result(), &resolved(2));
    assert!((max.score() - 1.0).abs() < 1e-9);
    assert_eq!(max.features().get(&["REFCTRL"]), 1.0);
    // Best first.
    assert_eq!(results[0].result(), &resolved(2));
    assert!(results[1..].iter().all(|r| r.score().abs() < 1e-9));
}

#[test]
fn narrow_beam_is_not_exact() {
    let resolver = resolver(2);
    let (results, exact) = resolver.beam(&read(WANT).expect("parse")).expect("beam");
    assert!(!exact);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].result(), &resolved(2));
    assert_eq!(results[1].result(), &resolved(1));
}

#[test]
fn beam_serializes_results() {
    let resolver = resolver(100);
    let (results, _) = resolver.beam(&read(WANT).expect("parse")).expect("beam");
    let json = results[0].to_json().expect("json");
    assert!(json.contains("(ref:<id,e> !2)"));
    assert!(json.contains("REFCTRL#want-01#c_ARG0#c_ARG1#c_ARG0"));
}

#[test]
fn without_factors_every_candidate_survives() {
    let resolver = Resolver::new(
        InferenceSettings::default(),
        Arc::new(LogicLanguage::default()),
        Arc::new(Model::new()),
    )
    .expect("resolver");
    let (results, exact) = resolver.beam(&read(WANT).expect("parse")).expect("beam");
    assert!(exact);
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|r| r.score() == 0.0 && r.features().is_empty()));
}

#[test]
fn empty_domains() {
    let exp = read("(boy:<e,t> (ref:<id,e> na:id))").expect("parse");
    let language = Arc::new(LogicLanguage::default());
    let with = |empty_domain, sloppy| {
        let settings = InferenceSettings { empty_domain, sloppy, ..InferenceSettings::default() };
        Resolver::new(settings, language.clone(), Arc::new(Model::new())).expect("resolver")
    };

    let (results, _) = with(EmptyDomainPolicy::KeepPlaceholder, false).beam(&exp).expect("beam");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result(), &exp);

    let (results, _) = with(EmptyDomainPolicy::Exclude, false).beam(&exp).expect("beam");
    assert!(results.is_empty());
    assert!(with(EmptyDomainPolicy::Exclude, false).resolve(&exp).expect("resolve").is_empty());

    let (results, _) = with(EmptyDomainPolicy::Exclude, true).beam(&exp).expect("beam");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result(), &exp);
}
