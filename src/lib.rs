//! Refgraph – reference resolution in logical forms with factor graphs.
//!
//! A logical form is a lambda-calculus expression in which every entity is
//! introduced by a skolem term `(a:<id,<<e,t>,e>> !n (lambda $0:e ...))` and
//! unresolved references are written `(ref:<id,e> na:id)`. Refgraph turns
//! such an expression into a factor graph whose variable nodes are the
//! constants and skolem IDs of the expression:
//! * A variable node ranges over a *domain* proposed by an
//!   [`assignment::AssignmentGenerator`] (for the id placeholder: every skolem
//!   ID in the expression).
//! * [`features::FeatureSet`]s attach factors that score joint assignments of
//!   a few variable nodes with a log-linear [`features::Model`].
//! * [`inference`] either propagates beliefs ([`inference::LoopyBp`]) and
//!   reads off the maximum marginals, or beam searches the raw potentials.
//!
//! ## Modules
//! * [`logic`] – Types, expressions and the [`logic::LogicLanguage`] naming conventions.
//! * [`reader`] – A pest grammar (`logic.pest`) for the textual notation.
//! * [`assignment`] – Domain generators and the specification mapping.
//! * [`table`] – Dense potential tables with partial-key marginalization.
//! * [`graph`] / [`builder`] – The node arena and its construction.
//! * [`features`] – Factor jobs, feature vectors, model, and concrete feature sets.
//! * [`inference`] – Loopy BP, beam search and max evaluations.
//! * [`visit`] – Expression reconstruction and result alignment.
//! * [`settings`] / [`resolver`] – Configuration and the end-to-end pipeline.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use refgraph::{features::Model, logic::LogicLanguage, reader::read};
//! use refgraph::{resolver::Resolver, settings::InferenceSettings};
//! let expression = read(
//!     "(a:<id,<<e,t>,e>> !1 (lambda $0:e (and:<t*,t> (dog:<e,t> $0) (c_REF:<e,<e,t>> $0 (ref:<id,e> na:id)))))",
//! ).unwrap();
//! let resolver = Resolver::new(
//!     InferenceSettings::default(),
//!     Arc::new(LogicLanguage::default()),
//!     Arc::new(Model::new()),
//! ).unwrap();
//! let results = resolver.resolve(&expression).unwrap();
//! assert_eq!(results.len(), 1);
//! assert!(results[0].result().to_string().contains("(ref:<id,e> !1)"));
//! ```
//!
//! ## Logging
//! Everything is reported through `tracing`; install a subscriber (e.g.
//! `tracing-subscriber` with `RUST_LOG=refgraph=debug`) to see graph sizes,
//! factor creation and belief propagation progress.

pub mod assignment;
pub mod builder;
pub mod error;
pub mod features;
pub mod graph;
pub mod inference;
pub mod logic;
pub mod reader;
pub mod resolver;
pub mod result;
pub mod settings;
pub mod table;
pub mod visit;
