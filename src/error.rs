
use std::sync::PoisonError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefgraphError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Parse error: {message}")]
    Parse { message: String, line: Option<usize>, col: Option<usize> },
    #[error("Malformed key: {0}")]
    MalformedKey(String),
    #[error("Missing features: {0}")]
    MissingFeatures(String),
    #[error("Unknown assignment: {0}")]
    UnknownAssignment(String),
    #[error("Disconnected factor: {0}")]
    DisconnectedFactor(String),
    #[error("Marginals missing: {0}")]
    MissingMarginals(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
    #[error("Worker pool error: {0}")]
    Pool(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, RefgraphError>;

// Helper conversions
impl From<config::ConfigError> for RefgraphError {
    fn from(e: config::ConfigError) -> Self { Self::Config(e.to_string()) }
}

impl From<pest::error::Error<crate::reader::Rule>> for RefgraphError {
    fn from(e: pest::error::Error<crate::reader::Rule>) -> Self {
        let (line, col) = match e.line_col {
            pest::error::LineColLocation::Pos((l, c)) => (l, c),
            pest::error::LineColLocation::Span((l, c), _) => (l, c),
        };
        Self::Parse { message: e.variant.message().to_string(), line: Some(line), col: Some(col) }
    }
}

impl From<serde_json::Error> for RefgraphError {
    fn from(e: serde_json::Error) -> Self { Self::Serialization(e.to_string()) }
}

impl From<rayon::ThreadPoolBuildError> for RefgraphError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self { Self::Pool(e.to_string()) }
}

impl From<std::io::Error> for RefgraphError {
    fn from(e: std::io::Error) -> Self { Self::Io(e.to_string()) }
}

impl<T> From<PoisonError<T>> for RefgraphError {
    fn from(e: PoisonError<T>) -> Self { Self::Lock(e.to_string()) }
}
