//! TZ-004: Resource-type pattern matching.
//!
//! Classifies identifier/name/description/tool-name strings into resource
//! types using the four configured pattern families. Identifier patterns are
//! case-sensitive; the other families compile with `(?i)`. Pattern tables are
//! sorted by type name, so every lookup has a deterministic trial order.

use crate::core::config::PatternConfig;
use crate::core::error::EngineError;
use crate::core::types::PlanStep;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::RwLock;

type PatternFamily = BTreeMap<String, Vec<Regex>>;

/// Identifies resource types from plan-step signals. Read-mostly: the only
/// write path is `register_id_pattern`.
pub struct PatternMatcher {
    inner: RwLock<Tables>,
}

struct Tables {
    id: PatternFamily,
    name: PatternFamily,
    description: PatternFamily,
    tool: PatternFamily,
    children: BTreeMap<String, Vec<String>>,
    dependencies: BTreeMap<String, Vec<String>>,
}

impl PatternMatcher {
    /// Compile all four pattern families. Any malformed pattern is fatal.
    pub fn new(cfg: &PatternConfig) -> Result<Self, EngineError> {
        let ident = &cfg.resource_identification;
        Ok(Self {
            inner: RwLock::new(Tables {
                id: compile_family(&ident.id_patterns, false)?,
                name: compile_family(&ident.name_patterns, true)?,
                description: compile_family(&ident.description_patterns, true)?,
                tool: compile_family(&cfg.tool_resource_patterns, true)?,
                children: cfg.resource_relationships.children.clone(),
                dependencies: cfg.resource_relationships.dependencies.clone(),
            }),
        })
    }

    /// Identify the resource type of a plan step. Families are tried in fixed
    /// order — identifier, name, description, tool name — first match wins.
    pub fn identify_resource_type(&self, step: &PlanStep) -> Option<String> {
        let tables = self.inner.read().expect("pattern tables poisoned");

        if !step.resource_id.is_empty() {
            if let Some(t) = match_family(&tables.id, &step.resource_id) {
                return Some(t);
            }
        }
        if !step.name.is_empty() {
            if let Some(t) = match_family(&tables.name, &step.name) {
                return Some(t);
            }
        }
        if !step.description.is_empty() {
            if let Some(t) = match_family(&tables.description, &step.description) {
                return Some(t);
            }
        }
        if !step.tool_name.is_empty() {
            if let Some(t) = match_family(&tables.tool, &step.tool_name) {
                return Some(t);
            }
        }
        None
    }

    /// Identify a resource type from an identifier alone.
    pub fn identify_from_id(&self, resource_id: &str) -> Option<String> {
        let tables = self.inner.read().expect("pattern tables poisoned");
        match_family(&tables.id, resource_id)
    }

    /// Identify a resource type from a tool name alone.
    pub fn identify_from_tool_name(&self, tool_name: &str) -> Option<String> {
        let tables = self.inner.read().expect("pattern tables poisoned");
        match_family(&tables.tool, tool_name)
    }

    /// Scored inference over all description patterns. A matching pattern
    /// whose source mentions `create` or `provision` scores 3, a pattern
    /// source longer than 20 bytes scores 2, any other match scores 1.
    /// Ties break toward the lexicographically smaller type name.
    pub fn infer_from_description(&self, description: &str) -> Option<String> {
        let tables = self.inner.read().expect("pattern tables poisoned");
        let description = description.to_lowercase();

        let mut best: Option<(&str, u32)> = None;
        for (resource_type, patterns) in &tables.description {
            let mut score = 0u32;
            for pattern in patterns {
                if !pattern.is_match(&description) {
                    continue;
                }
                let source = pattern.as_str();
                score += if source.contains("create") || source.contains("provision") {
                    3
                } else if source.len() > 20 {
                    2
                } else {
                    1
                };
            }
            // Sorted iteration: strictly-greater keeps the first (smallest) name on ties
            if score > 0 && best.map_or(true, |(_, s)| score > s) {
                best = Some((resource_type, score));
            }
        }
        best.map(|(t, _)| t.to_string())
    }

    /// Child resource types a parent type may contain.
    pub fn children(&self, resource_type: &str) -> Vec<String> {
        let tables = self.inner.read().expect("pattern tables poisoned");
        tables.children.get(resource_type).cloned().unwrap_or_default()
    }

    /// Resource types that must exist before this type can be created.
    pub fn required_dependencies(&self, resource_type: &str) -> Vec<String> {
        let tables = self.inner.read().expect("pattern tables poisoned");
        tables.dependencies.get(resource_type).cloned().unwrap_or_default()
    }

    /// Whether any pattern family knows this resource type.
    pub fn is_known_type(&self, resource_type: &str) -> bool {
        let tables = self.inner.read().expect("pattern tables poisoned");
        tables.id.contains_key(resource_type)
            || tables.name.contains_key(resource_type)
            || tables.description.contains_key(resource_type)
            || tables.tool.contains_key(resource_type)
    }

    /// All configured resource types, sorted.
    pub fn supported_types(&self) -> Vec<String> {
        let tables = self.inner.read().expect("pattern tables poisoned");
        let mut types: Vec<String> = Vec::new();
        for key in tables
            .id
            .keys()
            .chain(tables.name.keys())
            .chain(tables.description.keys())
            .chain(tables.tool.keys())
        {
            if !types.contains(key) {
                types.push(key.clone());
            }
        }
        types.sort();
        types
    }

    /// Register one additional identifier pattern after construction.
    pub fn register_id_pattern(&self, resource_type: &str, pattern: &str) -> Result<(), EngineError> {
        let compiled = Regex::new(pattern).map_err(|e| {
            EngineError::configuration(format!(
                "id pattern '{}' for type '{}': {}",
                pattern, resource_type, e
            ))
        })?;
        let mut tables = self.inner.write().expect("pattern tables poisoned");
        tables.id.entry(resource_type.to_string()).or_default().push(compiled);
        Ok(())
    }
}

fn compile_family(
    patterns: &BTreeMap<String, Vec<String>>,
    case_insensitive: bool,
) -> Result<PatternFamily, EngineError> {
    let mut family = PatternFamily::new();
    for (resource_type, sources) in patterns {
        let mut compiled = Vec::with_capacity(sources.len());
        for source in sources {
            let full = if case_insensitive {
                format!("(?i){}", source)
            } else {
                source.clone()
            };
            let regex = Regex::new(&full).map_err(|e| {
                EngineError::configuration(format!(
                    "pattern '{}' for type '{}': {}",
                    source, resource_type, e
                ))
            })?;
            compiled.push(regex);
        }
        family.insert(resource_type.clone(), compiled);
    }
    Ok(family)
}

/// First type (in sorted order) with a matching pattern.
fn match_family(family: &PatternFamily, input: &str) -> Option<String> {
    for (resource_type, patterns) in family {
        if patterns.iter().any(|p| p.is_match(input)) {
            return Some(resource_type.clone());
        }
    }
    None
}
