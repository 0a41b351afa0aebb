use refgraph::assignment::{
    AssignmentGenerator, AssignmentGeneratorFactory, ReferenceAssignments, SpecificationMapping, StubFactory,
};
use refgraph::error::RefgraphError;
use refgraph::logic::{LogicLanguage, LogicalExpression};
use refgraph::reader::read;

const TWO_ENTITIES: &str = "(a:<id,<<e,t>,e>> !2 (lambda $0:e (and:<t*,t> (boy:<e,t> $0) \
    (c_ARG:<e,<e,t>> $0 (a:<id,<<e,t>,e>> !1 (lambda $1:e (and:<t*,t> (girl:<e,t> $1) \
    (poss:<e,<e,t>> $1 (ref:<id,e> na:id)))))))))";

#[test]
fn placeholder_gets_every_skolem_id() {
    let exp = read(TWO_ENTITIES).expect("parse");
    let language = LogicLanguage::default();
    let generator = ReferenceAssignments::new(&exp, &language);
    let candidates = generator.assignments(language.id_placeholder());
    assert_eq!(candidates, vec![LogicalExpression::skolem_id(1), LogicalExpression::skolem_id(2)]);
    assert!(generator.assignments(&read("boy:<e,t>").expect("parse")).is_empty());
    assert!(generator.assignments(&LogicalExpression::skolem_id(1)).is_empty());
}

#[test]
fn stub_factory_and_closures() {
    let exp = read(TWO_ENTITIES).expect("parse");
    let generator = StubFactory.create(&exp);
    assert!(generator.assignments(LogicLanguage::default().id_placeholder()).is_empty());

    let fixed = |_: &LogicalExpression| vec![LogicalExpression::skolem_id(7)];
    assert_eq!(fixed.assignments(&exp), vec![LogicalExpression::skolem_id(7)]);
}

#[test]
fn specification_mapping_expands_constants() {
    let mapping = SpecificationMapping::parse("c_ARG\tc_ARG1,c_ARG0\n\nc_OP\tc_op1\n").expect("mapping");
    assert_eq!(mapping.len(), 2);
    let general = read("c_ARG:<e,<e,t>>").expect("parse");
    let constant = general.as_constant().expect("constant");
    assert!(mapping.is_underspecified(constant));
    assert_eq!(
        mapping.assignments(constant),
        vec![read("c_ARG0:<e,<e,t>>").expect("parse"), read("c_ARG1:<e,<e,t>>").expect("parse")]
    );

    let specific = read("c_ARG1:<e,<e,t>>").expect("parse");
    assert_eq!(mapping.underspecify(specific.as_constant().expect("constant")), general);
    // Only binary relations are underspecified.
    let unary = read("c_ARG1:<e,t>").expect("parse");
    assert_eq!(mapping.underspecify(unary.as_constant().expect("constant")), unary);

    let language = LogicLanguage::default().with_specification_mapping(mapping);
    let exp = read(TWO_ENTITIES).expect("parse");
    let generator = ReferenceAssignments::new(&exp, &language);
    assert_eq!(generator.assignments(&general).len(), 2);
}

#[test]
fn malformed_mapping_lines() {
    let err = SpecificationMapping::parse("c_ARG c_ARG0\n").unwrap_err();
    assert!(matches!(err, RefgraphError::Parse { line: Some(1), .. }));
}
