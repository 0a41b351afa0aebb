//! Inference settings, layered from defaults, an optional file and
//! `REFGRAPH_*` environment variables.
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::builder::EmptyDomainPolicy;
use crate::error::Result;
use crate::inference::LoopyBp;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub epsilon: f64,
    pub max_iterations: usize,
    pub max_time_ms: Option<u64>,
    pub beam_size: usize,
    pub max_limit: usize,
    pub sloppy: bool,
    /// Worker threads, 0 lets the pool decide.
    pub threads: usize,
    pub empty_domain: EmptyDomainPolicy,
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            epsilon: 0.01,
            max_iterations: 1000,
            max_time_ms: None,
            beam_size: 100,
            max_limit: 100,
            sloppy: false,
            threads: 0,
            empty_domain: EmptyDomainPolicy::default(),
        }
    }
}

impl InferenceSettings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix("REFGRAPH").try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn from_str(text: &str, format: FileFormat) -> Result<Self> {
        let config = Config::builder().add_source(File::from_str(text, format)).build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn loopy_bp(&self) -> LoopyBp {
        let bp = LoopyBp::new(self.epsilon, self.max_iterations);
        match self.max_time_ms {
            Some(ms) => bp.with_max_time(Duration::from_millis(ms)),
            None => bp,
        }
    }
}
