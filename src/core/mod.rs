//! Core engine plumbing — types, errors, configuration, and the facade that
//! wires the resolution components together.

pub mod config;
pub mod error;
pub mod types;

use crate::core::config::EngineConfig;
use crate::core::error::EngineError;
use crate::resolve::backref::BackrefResolver;
use crate::resolve::extract::IdExtractor;
use crate::resolve::fields::FieldResolver;
use crate::resolve::infer::ValueTypeInferrer;
use crate::resolve::matcher::PatternMatcher;
use crate::retrieval::{builtin, RetrievalRegistry};
use std::path::Path;
use std::sync::Arc;

/// One fully-wired resolution engine. Construction compiles every configured
/// pattern and registers every configured tool, so a bad table fails here
/// rather than mid-plan.
pub struct Engine {
    pub matcher: Arc<PatternMatcher>,
    pub fields: Arc<FieldResolver>,
    pub extractor: IdExtractor,
    pub inferrer: ValueTypeInferrer,
    pub backrefs: BackrefResolver,
    pub registry: RetrievalRegistry,
}

impl Engine {
    pub fn from_config(cfg: &EngineConfig) -> Result<Self, EngineError> {
        let matcher = Arc::new(PatternMatcher::new(&cfg.patterns)?);
        let fields = Arc::new(FieldResolver::new(&cfg.field_mappings));
        fields.set_pattern_matcher(Arc::clone(&matcher));

        let extractor = IdExtractor::new(&cfg.extraction, Arc::clone(&matcher))?;
        let inferrer = ValueTypeInferrer::new(&cfg.patterns)?;
        let backrefs = BackrefResolver::new(Arc::clone(&fields));

        let registry = RetrievalRegistry::new();
        builtin::register_builtins(&registry)?;

        Ok(Self {
            matcher,
            fields,
            extractor,
            inferrer,
            backrefs,
            registry,
        })
    }

    /// Load the configuration directory and build an engine from it.
    pub fn load(config_dir: &Path) -> Result<Self, EngineError> {
        let cfg = EngineConfig::load_dir(config_dir).map_err(EngineError::configuration)?;
        Self::from_config(&cfg)
    }
}
