use std::sync::Arc;

use refgraph::assignment::SpecificationMapping;
use refgraph::error::RefgraphError;
use refgraph::features::{
    ClosureFeature, FeatureVector, Model, RelationSelectionalPreference, SurfaceFormFeature, UnaryBiasFeatures,
    add_factor,
};
use refgraph::graph::NodeId;
use refgraph::logic::LogicLanguage;
use refgraph::reader::read;
use refgraph::resolver::Resolver;
use refgraph::settings::InferenceSettings;

const BOY_AND_GIRL: &str = "(a:<id,<<e,t>,e>> !1 (lambda $0:e (and:<t*,t> (boy:<e,t> $0) \
    (c_ARG:<e,<e,t>> $0 (a:<id,<<e,t>,e>> !2 (lambda $1:e (girl:<e,t> $1)))))))";

#[test]
fn unary_bias_picks_a_specific_relation() {
    let mapping = SpecificationMapping::parse("c_ARG\tc_ARG0,c_ARG1\n").expect("mapping");
    let language = Arc::new(LogicLanguage::default().with_specification_mapping(mapping));
    let mut model = Model::new();
    model.set(&["UNARY", "c_ARG", "c_ARG1"], 2.0);
    let resolver = Resolver::new(InferenceSettings::default(), language, Arc::new(model))
        .expect("resolver")
        .with_feature_set(UnaryBiasFeatures::default());

    let results = resolver.resolve(&read(BOY_AND_GIRL).expect("parse")).expect("resolve");
    assert_eq!(results.len(), 1);
    let expected = read(&BOY_AND_GIRL.replace("c_ARG:", "c_ARG1:")).expect("parse");
    assert_eq!(results[0].result(), &expected);
    let p = 2f64.exp() / (1.0 + 2f64.exp());
    assert!((results[0].probability() - p).abs() < 1e-6);
    assert_eq!(results[0].features().get(&["UNARY", "c_ARG", "c_ARG1"]), 1.0);
}

#[test]
fn relation_preferences_use_active_form() {
    let passive = "(a:<id,<<e,t>,e>> !1 (lambda $0:e (and:<t*,t> (boy:<e,t> $0) \
        (c_ARG0-of:<e,<e,t>> $0 (a:<id,<<e,t>,e>> !2 (lambda $1:e (run-01:<e,t> $1)))))))";
    let resolver = Resolver::new(
        InferenceSettings::default(),
        Arc::new(LogicLanguage::default()),
        Arc::new(Model::new()),
    )
    .expect("resolver")
    .with_feature_set(RelationSelectionalPreference::default());
    let (results, _) = resolver.beam(&read(passive).expect("parse")).expect("beam");
    assert_eq!(results.len(), 1);
    let features = results[0].features();
    assert_eq!(features.get(&["RELPREF", "run-01", "c_ARG0", "boy"]), 1.0);
    assert_eq!(features.get(&["RELPREF", "run-01", "c_ARG0"]), 1.0);
    assert_eq!(features.get(&["RELPREF", "c_ARG0", "boy"]), 1.0);
}

#[test]
fn closure_feature_only_on_closures() {
    let mut model = Model::new();
    model.set(&["CLOSURE"], 0.5);
    let resolver = Resolver::new(
        InferenceSettings::default(),
        Arc::new(LogicLanguage::default()),
        Arc::new(model),
    )
    .expect("resolver")
    .with_feature_set(ClosureFeature::default());
    let exp = read(BOY_AND_GIRL).expect("parse");
    assert_eq!(resolver.graph(&exp, false).expect("graph").num_factors().expect("factors"), 0);
    let graph = resolver.graph(&exp, true).expect("graph");
    assert!(graph.is_closure());
    let keeper = graph.factors().expect("factors");
    assert_eq!(keeper.len(), 1);
    assert_eq!(keeper.factors()[0].label(), "CLOSURE");
    assert_eq!(keeper.factors()[0].table().size(), 1);
}

#[test]
fn closure_weight_reaches_resolver_results() {
    let mut model = Model::new();
    model.set(&["CLOSURE"], 0.5);
    let resolver = Resolver::new(
        InferenceSettings::default(),
        Arc::new(LogicLanguage::default()),
        Arc::new(model),
    )
    .expect("resolver")
    .with_feature_set(ClosureFeature::default());
    let exp = read(BOY_AND_GIRL).expect("parse");

    let (plain, _) = resolver.beam(&exp).expect("beam");
    assert_eq!(plain.len(), 1);
    assert_eq!(plain[0].score(), 0.0);
    let (closed, exact) = resolver.beam_closure(&exp).expect("beam");
    assert!(exact);
    assert_eq!(closed.len(), 1);
    assert!((closed[0].score() - 0.5).abs() < 1e-9);

    let results = resolver.resolve_closure(&exp).expect("resolve");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].result(), &exp);
    assert!((results[0].score() - 0.5).abs() < 1e-9);
    assert_eq!(results[0].features().get(&["CLOSURE"]), 1.0);
}

#[test]
fn surface_form_scores_overloaded_readings() {
    let overloaded = BOY_AND_GIRL.replace("c_ARG:", "c_ARG~~of^^right:");
    let mapping = SpecificationMapping::parse("c_ARG\tc_ARG0,c_ARG1\n").expect("mapping");
    let language = Arc::new(LogicLanguage::default().with_specification_mapping(mapping));
    let mut model = Model::new();
    model.set(&["FACLEX", "c_ARG", "c_ARG0", "of", "right"], 2.0);
    let resolver = Resolver::new(InferenceSettings::default(), language, Arc::new(model))
        .expect("resolver")
        .with_feature_set(SurfaceFormFeature::default());

    // Plain constants carry no surface form.
    let plain = resolver.graph(&read(BOY_AND_GIRL).expect("parse"), false).expect("graph");
    assert_eq!(plain.num_factors().expect("factors"), 0);

    let results = resolver.resolve(&read(&overloaded).expect("parse")).expect("resolve");
    assert_eq!(results.len(), 1);
    let expected = read(&BOY_AND_GIRL.replace("c_ARG:", "c_ARG0:")).expect("parse");
    assert_eq!(results[0].result(), &expected);
    let p = 2f64.exp() / (1.0 + 2f64.exp());
    assert!((results[0].probability() - p).abs() < 1e-6);
    let features = results[0].features();
    assert_eq!(features.len(), 3);
    assert_eq!(features.get(&["FACLEX", "c_ARG", "c_ARG0", "of"]), 1.0);
    assert_eq!(features.get(&["FACLEX", "c_ARG", "c_ARG0", "of", "right"]), 1.0);
    assert_eq!(features.get(&["FACLEX", "c_ARG", "c_ARG0", "right"]), 1.0);
}

#[test]
fn factor_order_ignores_attach_order() {
    let resolver = Resolver::new(
        InferenceSettings::default(),
        Arc::new(LogicLanguage::default()),
        Arc::new(Model::new()),
    )
    .expect("resolver");
    let mut graph = resolver.graph(&read(BOY_AND_GIRL).expect("parse"), false).expect("graph");
    let find = |name: &str| graph.variables().find(|v| v.expression().to_string() == name).expect("node").id();
    let (boy, girl) = (find("boy:<e,t>"), find("girl:<e,t>"));
    assert!(boy < girl);
    let model = Model::new();
    for node in [girl, boy] {
        add_factor(&graph, &model, "SAME", &[Some(node)], |_| {
            let mut features = FeatureVector::new();
            features.set(&["SAME"], 1.0);
            features
        })
        .expect("factor");
    }
    graph.sort_factors().expect("sort");
    let keeper = graph.factors().expect("factors");
    let neighbors: Vec<_> = keeper.factors().iter().map(|f| f.neighbors()).collect();
    assert_eq!(neighbors, vec![vec![boy], vec![girl]]);
}

#[test]
fn add_factor_contract() {
    let resolver = Resolver::new(
        InferenceSettings::default(),
        Arc::new(LogicLanguage::default()),
        Arc::new(Model::new()),
    )
    .expect("resolver");
    let exp = read(BOY_AND_GIRL).expect("parse");
    let graph = resolver.graph(&exp, false).expect("graph");
    let model = Model::new();

    // Structural nodes alone cannot carry a factor.
    let lambda = graph.nodes().iter().find(|n| n.as_lambda().is_some()).expect("lambda").id();
    let err = add_factor(&graph, &model, "T0", &[Some(lambda), None], |_| FeatureVector::new()).unwrap_err();
    assert!(matches!(err, RefgraphError::DisconnectedFactor(_)));

    let boy = graph.variables().find(|v| v.expression().to_string() == "boy:<e,t>").expect("boy").id();
    let attached = add_factor(&graph, &model, "T1", &[Some(boy)], |_| FeatureVector::new()).expect("factor");
    assert!(!attached);
    assert_eq!(graph.num_factors().expect("factors"), 0);

    let attached = add_factor(&graph, &model, "T2", &[Some(boy), Some(boy), Some(lambda)], |values| {
        let mut features = FeatureVector::new();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0], values[1]);
        assert!(values[2].as_ref().is_some_and(|v| v.as_lambda().is_some()));
        features.set(&["T2"], 1.0);
        features
    })
    .expect("factor");
    assert!(attached);
    let keeper = graph.factors().expect("factors");
    assert_eq!(keeper.factors()[0].neighbors(), vec![boy]);
    assert!(graph.node(NodeId(usize::MAX)).is_err());
}
