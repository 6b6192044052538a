//! TZ-006: Resource-identifier extraction from tool executions.
//!
//! Every tool is registered against exactly one action kind, and the kind
//! dictates which record the identifier lives in: creations and associations
//! report it in the tool result, modifications and deletions carry it in the
//! request parameters, queries and state reads accept either with the result
//! taking precedence. Extraction failures are hard errors that name the tool,
//! the resource type, and the classification.

use crate::core::config::{ExtractionConfig, ExtractionPattern};
use crate::core::error::EngineError;
use crate::core::types::{ActionKind, PlanStep, Record};
use crate::resolve::fields::{value_to_plain_string, walk_path};
use crate::resolve::matcher::PatternMatcher;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

pub struct IdExtractor {
    matcher: Arc<PatternMatcher>,
    inner: RwLock<Inner>,
}

struct Inner {
    tool_actions: BTreeMap<String, ActionKind>,
    patterns: BTreeMap<ActionKind, Vec<ExtractionPattern>>,
}

impl IdExtractor {
    /// Build the extractor from configuration. Every configured tool name is
    /// registered through the same single-registration path used at runtime.
    pub fn new(cfg: &ExtractionConfig, matcher: Arc<PatternMatcher>) -> Result<Self, EngineError> {
        let extractor = Self {
            matcher,
            inner: RwLock::new(Inner {
                tool_actions: BTreeMap::new(),
                patterns: cfg.resource_id_extraction.clone(),
            }),
        };
        for (tool, kind) in &cfg.tool_actions {
            extractor.register_tool(tool, *kind)?;
        }
        Ok(extractor)
    }

    /// Register a tool under an action kind. Each tool registers exactly
    /// once; a second registration is a configuration error even when the
    /// kind matches.
    pub fn register_tool(&self, tool: &str, kind: ActionKind) -> Result<(), EngineError> {
        if tool.is_empty() {
            return Err(EngineError::configuration("cannot register an empty tool name"));
        }
        let mut inner = self.inner.write().expect("extraction tables poisoned");
        if let Some(existing) = inner.tool_actions.get(tool) {
            return Err(EngineError::configuration(format!(
                "tool '{tool}' is already registered as {existing}"
            )));
        }
        inner.tool_actions.insert(tool.to_string(), kind);
        Ok(())
    }

    /// Classify a tool by its registration. An unregistered tool is an
    /// extraction failure with classification `unknown`, never a guess.
    pub fn classify(&self, tool: &str) -> Result<ActionKind, EngineError> {
        let inner = self.inner.read().expect("extraction tables poisoned");
        inner
            .tool_actions
            .get(tool)
            .copied()
            .ok_or_else(|| EngineError::Extraction {
                tool: tool.to_string(),
                resource_type: "unknown".to_string(),
                classification: "unknown".to_string(),
                message: "tool has no registered action kind".to_string(),
            })
    }

    /// Extract the resource identifier produced or targeted by a step.
    pub fn extract_resource_id(
        &self,
        step: &PlanStep,
        result: &Record,
    ) -> Result<String, EngineError> {
        let kind = self.classify(&step.tool_name)?;
        let resource_type = self
            .matcher
            .identify_resource_type(step)
            .unwrap_or_else(|| "unknown".to_string());

        let source = select_data_source(kind, step, result);
        let inner = self.inner.read().expect("extraction tables poisoned");

        let patterns = inner.patterns.get(&kind).map(Vec::as_slice).unwrap_or(&[]);
        for pattern in patterns {
            if !pattern_applies(pattern, &resource_type) {
                continue;
            }
            for path in &pattern.field_paths {
                if let Some(value) = walk_path(&source, path, true) {
                    if let Some(id) = scalar_id(value) {
                        return Ok(id);
                    }
                }
            }
        }

        Err(EngineError::extraction(
            &step.tool_name,
            &resource_type,
            kind,
            format!(
                "no configured field path yielded an identifier in the {} record",
                source_name(kind)
            ),
        ))
    }

    /// Best-effort extraction over a whole plan: failed steps are skipped, as
    /// are steps whose identifier is the literal wildcard `*`.
    pub fn extract_all_resource_ids(
        &self,
        executions: &[(PlanStep, Record)],
    ) -> BTreeMap<String, String> {
        let mut ids = BTreeMap::new();
        for (step, result) in executions {
            match self.extract_resource_id(step, result) {
                Ok(id) if id != "*" => {
                    ids.insert(step.id.clone(), id);
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(step = %step.id, %err, "skipping step without extractable id");
                }
            }
        }
        ids
    }
}

/// Merge the step parameters and the tool result into the record the action
/// kind designates.
fn select_data_source(kind: ActionKind, step: &PlanStep, result: &Record) -> Record {
    match kind {
        ActionKind::Creation | ActionKind::Association => result.clone(),
        ActionKind::Modification | ActionKind::Deletion => parameter_bag(step),
        ActionKind::Query | ActionKind::State => {
            let mut merged = parameter_bag(step);
            for (key, value) in result {
                merged.insert(key.clone(), value.clone());
            }
            merged
        }
    }
}

/// Union of the legacy `parameters` bag and the tool parameters. Steps from
/// older callers carry only `parameters`; when both name a key the tool
/// parameter wins.
fn parameter_bag(step: &PlanStep) -> Record {
    let mut merged = step.parameters.clone();
    for (key, value) in &step.tool_parameters {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

fn source_name(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Creation | ActionKind::Association => "result",
        ActionKind::Modification | ActionKind::Deletion => "parameter",
        ActionKind::Query | ActionKind::State => "merged",
    }
}

fn pattern_applies(pattern: &ExtractionPattern, resource_type: &str) -> bool {
    pattern
        .resource_types
        .iter()
        .any(|t| t == "*" || t == resource_type)
}

/// Identifiers must be scalars; containers at the end of a path are a miss.
fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value_to_plain_string(value)),
        _ => None,
    }
}
