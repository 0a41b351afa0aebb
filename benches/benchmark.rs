use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use refgraph::features::{Model, RefControlFeatureSet, RelationSelectionalPreference};
use refgraph::graph::NodeId;
use refgraph::inference::{loopy_bp, top_k};
use refgraph::logic::{LogicLanguage, LogicalExpression, Type};
use refgraph::reader::read;
use refgraph::resolver::Resolver;
use refgraph::settings::InferenceSettings;
use refgraph::table::{ColumnHeader, Mapping, Table};

const BANANA: &str = "(a:<id,<<e,t>,e>> !1 (lambda $0:e (and:<t*,t> (eat-01:<e,t> $0) \
    (arg0:<e,<e,t>> $0 (a:<id,<<e,t>,e>> !3 (lambda $2:e (and:<t*,t> (person:<e,t> $2) (name:<e,<txt,t>> $2 john:txt))))) \
    (arg1:<e,<e,t>> $0 (a:<id,<<e,t>,e>> !2 (lambda $1:e (and:<t*,t> (banana:<e,t> $1) (poss:<e,<e,t>> $1 (ref:<id,e> na:id)))))))))";

fn header(node: usize, values: usize) -> ColumnHeader {
    let domain: Vec<LogicalExpression> = (0..values)
        .map(|i| LogicalExpression::constant(&format!("v{node}_{i}"), Type::primitive("e")))
        .collect();
    ColumnHeader::new(NodeId(node), &format!("n{node}"), &domain)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let headers: Vec<ColumnHeader> = (0..4).map(|n| header(n, 8)).collect();
    let mut table = Table::new(true, headers.clone()).expect("table");
    table.set_all(0.5);
    c.bench_function("marginal 8^4 log", |b| b.iter(|| table.marginal(black_box(NodeId(2)))));
    let mut mapping = Mapping::default();
    mapping.insert(NodeId(0), headers[0].value_at(3).cloned().expect("value"));
    c.bench_function("partial get 8^4 log", |b| b.iter(|| table.get(black_box(&mapping))));

    let mut model = Model::new();
    model.set(&["RELPREF", "banana", "poss", "person"], 1.1);
    model.set(&["RELPREF", "banana", "poss", "eat-01"], 1.0);
    let resolver = Resolver::new(
        InferenceSettings::default(),
        Arc::new(LogicLanguage::default()),
        Arc::new(model),
    )
    .expect("resolver")
    .with_feature_set(RelationSelectionalPreference::default())
    .with_feature_set(RefControlFeatureSet::default());
    let exp = read(BANANA).expect("parse");

    c.bench_function("graph with factors", |b| b.iter(|| resolver.graph(black_box(&exp), false)));
    c.bench_function("loopy bp", |b| {
        b.iter(|| {
            let mut graph = resolver.graph(&exp, false).expect("graph");
            loopy_bp::run(&mut graph, 0.01, 1000).expect("bp")
        })
    });
    let graph = resolver.graph(&exp, false).expect("graph");
    c.bench_function("beam 100", |b| b.iter(|| top_k(black_box(&graph), 100, false)));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
