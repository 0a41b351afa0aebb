use std::sync::Arc;

use refgraph::error::RefgraphError;
use refgraph::features::FeatureVector;
use refgraph::graph::NodeId;
use refgraph::logic::{LogicalExpression, Type};
use refgraph::table::{ColumnHeader, FactorTable, Mapping, MappingPair, Table, log_sum_exp};

fn e(name: &str) -> LogicalExpression {
    LogicalExpression::constant(name, Type::primitive("e"))
}

fn headers() -> (ColumnHeader, ColumnHeader) {
    let h1 = ColumnHeader::new(NodeId(1), "boo:e", &[e("boo1"), e("boo2")]);
    let h2 = ColumnHeader::new(NodeId(2), "bo:e", &[e("bo1"), e("bo2"), e("bo3")]);
    (h1, h2)
}

fn pair(header: &ColumnHeader, value: &str) -> MappingPair {
    MappingPair::new(header.node(), e(value))
}

#[test]
fn marginalizes_open_headers() {
    let (h1, h2) = headers();
    let mut table = Table::new(false, vec![h1.clone(), h2.clone()]).expect("table");
    table.set_all(1.0);
    assert_eq!(table.get_pairs(&[pair(&h1, "boo1")]).expect("get"), 3.0);
    assert_eq!(table.get_pairs(&[pair(&h1, "boo2")]).expect("get"), 3.0);
    assert_eq!(table.get_pairs(&[pair(&h2, "bo2")]).expect("get"), 2.0);
    assert_eq!(table.get(&Mapping::default()).expect("get"), 6.0);
    for a in ["boo1", "boo2"] {
        for b in ["bo1", "bo2", "bo3"] {
            assert_eq!(table.get_pairs(&[pair(&h1, a), pair(&h2, b)]).expect("get"), 1.0);
        }
    }

    let mut table2 = Table::new(false, vec![h1.clone()]).expect("table");
    table2.set_all(2.0);
    let boo1 = refgraph::table::pairs_to_mapping(&[pair(&h1, "boo1")]).expect("mapping");
    let boo2 = refgraph::table::pairs_to_mapping(&[pair(&h1, "boo2")]).expect("mapping");
    table2.set(&boo1, 10.0).expect("set");
    table2.set(&boo2, 3.0).expect("set");
    for mapping in [&boo1, &boo2] {
        let factor = table.get(mapping).expect("get");
        table2.multiply(mapping, factor).expect("multiply");
    }
    assert_eq!(table2.get(&boo1).expect("get"), 30.0);
    assert_eq!(table2.get(&boo2).expect("get"), 9.0);
}

#[test]
fn marginalizes_in_log_space() {
    let (h1, h2) = headers();
    let mut table = Table::new(true, vec![h1.clone(), h2.clone()]).expect("table");
    table.set_all(1.0);
    let expected = 1.0 + 3f64.ln();
    assert!((table.get_pairs(&[pair(&h1, "boo1")]).expect("get") - expected).abs() < 1e-9);
    assert!((table.get_pairs(&[pair(&h1, "boo2")]).expect("get") - expected).abs() < 1e-9);
    assert!((table.get_pairs(&[pair(&h2, "bo2")]).expect("get") - (1.0 + 2f64.ln())).abs() < 1e-9);
    assert_eq!(table.get_pairs(&[pair(&h1, "boo2"), pair(&h2, "bo3")]).expect("get"), 1.0);

    // Multiplication applies to the stored value whatever the space.
    let mut table2 = Table::new(true, vec![h1.clone()]).expect("table");
    table2.set_all(2.0);
    let boo1 = refgraph::table::pairs_to_mapping(&[pair(&h1, "boo1")]).expect("mapping");
    let boo2 = refgraph::table::pairs_to_mapping(&[pair(&h1, "boo2")]).expect("mapping");
    table2.set(&boo1, 10.0).expect("set");
    table2.set(&boo2, 3.0).expect("set");
    for mapping in [&boo1, &boo2] {
        let factor = table.get(mapping).expect("get");
        table2.multiply(mapping, factor).expect("multiply");
    }
    assert!((table2.get(&boo1).expect("get") - 10.0 * expected).abs() < 1e-9);
    assert!((table2.get(&boo2).expect("get") - 3.0 * expected).abs() < 1e-9);
}

#[test]
fn row_major_layout_last_header_fastest() {
    let (h1, h2) = headers();
    let mut table = Table::new(false, vec![h1.clone(), h2.clone()]).expect("table");
    let mapping = refgraph::table::pairs_to_mapping(&[pair(&h1, "boo2"), pair(&h2, "bo1")]).expect("mapping");
    table.set(&mapping, 7.0).expect("set");
    assert_eq!(table.values()[3], 7.0);
    assert_eq!(table.assignment_at(3), vec![e("boo2"), e("bo1")]);
    assert_eq!(table.assignment_at(1), vec![e("boo1"), e("bo2")]);
}

#[test]
fn normalize_and_compare() {
    let (h1, h2) = headers();
    let mut table = Table::new(false, vec![h1.clone(), h2.clone()]).expect("table");
    table.set_all(2.0);
    table.normalize();
    assert!((table.get(&Mapping::default()).expect("get") - 1.0).abs() < 1e-12);

    let mut log_table = Table::new(true, vec![h1.clone(), h2.clone()]).expect("table");
    log_table.set_all(5.0);
    log_table.normalize();
    assert!(log_table.get(&Mapping::default()).expect("get").abs() < 1e-12);
    assert!(table.approx_eq(&log_table, 1e-9));
    assert!(table.max_difference(&log_table) < 1e-9);

    let mut zeros = Table::new(false, vec![h1]).expect("table");
    zeros.set_all(0.0);
    zeros.normalize();
    assert!(zeros.values().iter().all(|v| *v == 0.0));
}

#[test]
fn log_sum_exp_is_stable() {
    assert!((log_sum_exp([1000.0, 1000.0]) - (1000.0 + 2f64.ln())).abs() < 1e-9);
    assert_eq!(log_sum_exp([f64::NEG_INFINITY, f64::NEG_INFINITY]), f64::NEG_INFINITY);
    assert_eq!(log_sum_exp(Vec::<f64>::new()), f64::NEG_INFINITY);
}

#[test]
fn rejects_bad_keys() {
    let (h1, h2) = headers();
    let duplicate = Table::new(false, vec![h1.clone(), h1.clone()]);
    assert!(matches!(duplicate, Err(RefgraphError::MalformedKey(_))));
    let twice = refgraph::table::pairs_to_mapping(&[pair(&h1, "boo1"), pair(&h1, "boo2")]);
    assert!(matches!(twice, Err(RefgraphError::MalformedKey(_))));

    let table = Table::new(false, vec![h1.clone(), h2]).expect("table");
    let unknown = table.get_pairs(&[pair(&h1, "nope")]);
    assert!(matches!(unknown, Err(RefgraphError::UnknownAssignment(_))));
    // Nodes without a header are ignored.
    let other = MappingPair::new(NodeId(9), e("x"));
    assert_eq!(table.get_pairs(&[other]).expect("get"), 6.0);
}

#[test]
fn factor_table_requires_features() {
    let (h1, h2) = headers();
    let mut table = FactorTable::new(true, vec![h1.clone(), h2.clone()]).expect("table");
    let full = refgraph::table::pairs_to_mapping(&[pair(&h1, "boo1"), pair(&h2, "bo3")]).expect("mapping");
    assert!(matches!(table.set(&full, 1.0), Err(RefgraphError::MissingFeatures(_))));

    let mut features = FeatureVector::new();
    features.set(&["TEST", "boo1", "bo3"], 1.0);
    table.set_with_features(&full, 0.5, features.clone()).expect("set");
    assert_eq!(table.get(&full).expect("get"), 0.5);
    assert_eq!(table.features(&full).expect("features").map(Arc::as_ref), Some(&features));

    let partial = refgraph::table::pairs_to_mapping(&[pair(&h1, "boo1")]).expect("mapping");
    let result = table.set_with_features(&partial, 0.5, FeatureVector::new());
    assert!(matches!(result, Err(RefgraphError::MalformedKey(_))));
    assert!(table.features(&partial).is_err());
}

#[test]
fn converts_between_spaces() {
    let (h1, _) = headers();
    let mut normal = Table::new(false, vec![h1]).expect("table");
    normal.set_all(2.0);
    let log = Table::with_space(&normal, true);
    assert!(log.is_log_space());
    assert!(log.values().iter().all(|v| (v - 2f64.ln()).abs() < 1e-12));
    assert!((log.get(&Mapping::default()).expect("get") - 4f64.ln()).abs() < 1e-12);
    assert!(log.approx_eq(&normal, 1e-9));
    let back = Table::with_space(&log, false);
    assert!(back.values().iter().all(|v| (v - 2.0).abs() < 1e-12));

    let empty_log = log.clone_empty();
    assert!(empty_log.is_log_space());
    assert_eq!(empty_log.values(), &[0.0, 0.0]);
    assert_eq!(normal.clone_empty().values(), &[1.0, 1.0]);
}
