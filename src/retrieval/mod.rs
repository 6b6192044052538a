//! TZ-009: Value retrieval registry.
//!
//! Data-returning steps resolve their declared value type through registered
//! retrieval functions. Lookup is exact name first, then ordered regex
//! patterns; a type nobody claims is answered with a synthesized placeholder
//! rather than a failure, so a plan can keep resolving while the gap is
//! reported through the log.

pub mod builtin;

use crate::core::error::EngineError;
use crate::core::types::{PlanStep, Record};
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

pub type RetrievalFn =
    Arc<dyn Fn(&RetrievalContext, &PlanStep) -> Result<RetrievalResult, EngineError> + Send + Sync>;

/// Outcome of one retrieval: the value, where it came from, and any
/// diagnostic detail the retriever wants surfaced.
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub value: Value,
    pub source: String,
    pub details: Record,
}

impl RetrievalResult {
    pub fn new(value: Value, source: impl Into<String>) -> Self {
        Self {
            value,
            source: source.into(),
            details: Record::new(),
        }
    }
}

/// Per-plan retrieval context: the records of already-executed steps and an
/// optional deadline after which retrieval stops.
#[derive(Default, Clone)]
pub struct RetrievalContext {
    records: BTreeMap<String, Record>,
    deadline: Option<Instant>,
}

impl RetrievalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }

    pub fn record_result(&mut self, step_id: &str, record: Record) {
        self.records.insert(step_id.to_string(), record);
    }

    pub fn result_for(&self, step_id: &str) -> Option<&Record> {
        self.records.get(step_id)
    }

    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

pub struct RetrievalRegistry {
    inner: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    exact: FxHashMap<String, RetrievalFn>,
    patterns: Vec<(Regex, RetrievalFn)>,
}

impl Default for RetrievalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrievalRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Tables::default()),
        }
    }

    /// Register a retriever for an exact value type. Re-registering a type
    /// replaces the previous retriever.
    pub fn register(&self, value_type: &str, retriever: RetrievalFn) {
        let mut tables = self.inner.write().expect("retrieval tables poisoned");
        tables.exact.insert(value_type.to_string(), retriever);
    }

    /// Register a pattern retriever. Patterns are consulted in registration
    /// order after exact names; the first match wins.
    pub fn register_pattern(&self, pattern: &str, retriever: RetrievalFn) -> Result<(), EngineError> {
        let compiled = Regex::new(pattern).map_err(|e| {
            EngineError::configuration(format!("invalid retrieval pattern '{pattern}': {e}"))
        })?;
        let mut tables = self.inner.write().expect("retrieval tables poisoned");
        tables.patterns.push((compiled, retriever));
        Ok(())
    }

    /// Resolve a value type for a step. Exact match, then patterns, then a
    /// synthesized placeholder carrying the type name itself.
    pub fn retrieve(
        &self,
        ctx: &RetrievalContext,
        value_type: &str,
        step: &PlanStep,
    ) -> Result<RetrievalResult, EngineError> {
        if ctx.expired() {
            return Err(EngineError::configuration(format!(
                "retrieval deadline exceeded before resolving '{value_type}' for step '{}'",
                step.id
            )));
        }

        let retriever = {
            let tables = self.inner.read().expect("retrieval tables poisoned");
            tables.exact.get(value_type).cloned().or_else(|| {
                tables
                    .patterns
                    .iter()
                    .find(|(p, _)| p.is_match(value_type))
                    .map(|(_, f)| Arc::clone(f))
            })
        };

        match retriever {
            Some(f) => f(ctx, step),
            None => {
                tracing::warn!(
                    value_type,
                    step = %step.id,
                    "no retriever registered, synthesizing placeholder"
                );
                let mut result =
                    RetrievalResult::new(Value::String(value_type.to_string()), "mock_fallback");
                result.details = json!({
                    "stepId": step.id,
                    "stepName": step.name,
                    "valueType": value_type,
                })
                .as_object()
                .cloned()
                .unwrap_or_default();
                Ok(result)
            }
        }
    }

    /// Whether any retriever, exact or pattern, claims this value type.
    pub fn supports(&self, value_type: &str) -> bool {
        let tables = self.inner.read().expect("retrieval tables poisoned");
        tables.exact.contains_key(value_type)
            || tables.patterns.iter().any(|(p, _)| p.is_match(value_type))
    }
}
