//! Inference over a built factor graph.
//!
//! * [`loopy_bp`] computes approximate marginals by synchronous message passing.
//! * [`beam`] extracts the top joint assignments from the raw potentials.
//! * [`max_evaluations`] reads the argmax assignments off the marginals.
pub mod beam;
pub mod loopy_bp;
pub mod max_evaluations;

pub use beam::top_k;
pub use loopy_bp::{BpOutcome, LoopyBp};
pub use max_evaluations::max_evaluations;
