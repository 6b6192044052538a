//! TZ-005: Field resolution across inconsistent record schemas.
//!
//! Cloud tool responses spell the same logical field a dozen ways (`vpcId`,
//! `VpcId`, `resource.id`, ...). The resolver probes an ordered candidate-key
//! list per resource type, falls back to global defaults, and normalizes the
//! value it finds. A missing field is a miss, never an error.

use crate::core::config::{FieldMappingConfig, FieldTransformations};
use crate::core::types::Record;
use crate::resolve::matcher::PatternMatcher;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Resolves logical fields from heterogeneous records.
pub struct FieldResolver {
    inner: RwLock<Inner>,
}

struct Inner {
    mappings: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    defaults: BTreeMap<String, Vec<String>>,
    transformations: FieldTransformations,
    matcher: Option<Arc<PatternMatcher>>,
}

impl FieldResolver {
    pub fn new(cfg: &FieldMappingConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                mappings: cfg.resource_fields.clone(),
                defaults: cfg.default_field_priorities.clone(),
                transformations: cfg.field_transformations.clone(),
                matcher: None,
            }),
        }
    }

    /// Attach the pattern matcher used for resource-type auto-detection.
    pub fn set_pattern_matcher(&self, matcher: Arc<PatternMatcher>) {
        let mut inner = self.inner.write().expect("field tables poisoned");
        inner.matcher = Some(matcher);
    }

    /// Resolve one logical field: type-specific candidate keys in configured
    /// order, then the global default ordering. The first present value is
    /// normalized and returned; absence is `None`.
    pub fn resolve_field(&self, resource_type: &str, field: &str, data: &Record) -> Option<Value> {
        let inner = self.inner.read().expect("field tables poisoned");
        inner.resolve_field(resource_type, field, data)
    }

    /// Resolve every field known for the type plus every globally-defaulted
    /// field into one normalized record.
    pub fn resolve_all_fields(&self, resource_type: &str, data: &Record) -> Record {
        let inner = self.inner.read().expect("field tables poisoned");
        let mut result = Record::new();

        if let Some(fields) = inner.mappings.get(resource_type) {
            for field in fields.keys() {
                if let Some(value) = inner.resolve_field(resource_type, field, data) {
                    result.insert(field.clone(), value);
                }
            }
        }
        for field in inner.defaults.keys() {
            if result.contains_key(field) {
                continue;
            }
            if let Some(value) = inner.resolve_field(resource_type, field, data) {
                result.insert(field.clone(), value);
            }
        }
        result
    }

    /// Walk a dotted path with optional numeric indices (`a.b[2].c`).
    /// Missing keys and out-of-range indices yield `None`. No wildcard
    /// support here.
    pub fn extract_from_path(&self, data: &Record, path: &str) -> Option<Value> {
        walk_path(data, path, false).cloned()
    }

    /// Detect the resource type of a record by probing the common
    /// `resource`/`result` envelopes for an embedded identifier.
    pub fn detect_resource_type(&self, data: &Record) -> Option<String> {
        let inner = self.inner.read().expect("field tables poisoned");
        let matcher = inner.matcher.as_ref()?;

        for envelope in ["resource", "result"] {
            if let Some(Value::Object(nested)) = data.get(envelope) {
                if let Some(Value::String(id)) = nested.get("id") {
                    if let Some(t) = matcher.identify_from_id(id) {
                        return Some(t);
                    }
                }
            }
        }
        None
    }

    /// Candidate keys to probe for a requested field: the detected resource
    /// type's mapping first, then the global defaults, then every type's
    /// mapping for that field in sorted type order, then the catch-all
    /// defaults and the field name itself. Deduplicated, order preserved.
    pub fn candidate_keys_for(&self, field: &str, data: &Record) -> Vec<String> {
        let detected = self.detect_resource_type(data);
        let inner = self.inner.read().expect("field tables poisoned");

        let mut keys: Vec<String> = Vec::new();
        let push = |candidates: &[String], keys: &mut Vec<String>| {
            for key in candidates {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        };

        if let Some(ref t) = detected {
            if let Some(candidates) = inner.mappings.get(t).and_then(|m| m.get(field)) {
                push(candidates, &mut keys);
            }
        }
        if let Some(candidates) = inner.defaults.get(field) {
            push(candidates, &mut keys);
        }
        for mapping in inner.mappings.values() {
            if let Some(candidates) = mapping.get(field) {
                push(candidates, &mut keys);
            }
        }
        if let Some(candidates) = inner.defaults.get("default") {
            push(candidates, &mut keys);
        }
        if !keys.contains(&field.to_string()) {
            keys.push(field.to_string());
        }
        keys
    }
}

impl Inner {
    fn resolve_field(&self, resource_type: &str, field: &str, data: &Record) -> Option<Value> {
        if let Some(candidates) = self.mappings.get(resource_type).and_then(|m| m.get(field)) {
            for key in candidates {
                if let Some(value) = data.get(key) {
                    return Some(transform_value(&self.transformations, field, value));
                }
            }
        }
        if let Some(candidates) = self.defaults.get(field) {
            for key in candidates {
                if let Some(value) = data.get(key) {
                    return Some(transform_value(&self.transformations, field, value));
                }
            }
        }
        None
    }
}

// ============================================================================
// Value transformation
// ============================================================================

/// Normalize a resolved value. Dispatch is an ordered lookup into three
/// configured name sets: boolean fields, then array fields, then the
/// `state`/`status` alias groups.
fn transform_value(rules: &FieldTransformations, field: &str, value: &Value) -> Value {
    if rules.boolean_fields.iter().any(|f| f.eq_ignore_ascii_case(field)) {
        return Value::Bool(to_boolean(value));
    }
    if rules.array_fields.iter().any(|f| f.eq_ignore_ascii_case(field)) {
        return Value::Array(to_array(value));
    }
    if field == "state" || field == "status" {
        return Value::String(to_canonical_state(rules, value));
    }
    value.clone()
}

/// Boolean coercion: `true/enabled/yes/1/on` and `false/disabled/no/0/off`
/// case-insensitively, nonzero numbers are true, everything else false.
fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(
            s.to_lowercase().as_str(),
            "true" | "enabled" | "yes" | "1" | "on"
        ),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

/// Sequence coercion: null becomes empty, sequences pass through, scalars
/// wrap as a single element.
fn to_array(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

/// State normalization through the configured alias table. Null maps to the
/// literal `unknown`; unmapped values are lower-cased.
fn to_canonical_state(rules: &FieldTransformations, value: &Value) -> String {
    if value.is_null() {
        return "unknown".to_string();
    }
    let raw = value_to_plain_string(value).to_lowercase();
    for (canonical, aliases) in &rules.state {
        if aliases.iter().any(|a| a.eq_ignore_ascii_case(&raw)) {
            return canonical.clone();
        }
    }
    raw
}

/// Render a scalar without JSON quoting; containers fall back to their JSON
/// rendering.
pub(crate) fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ============================================================================
// Path walking
// ============================================================================

pub(crate) enum PathIndex {
    Numeric(usize),
    Wildcard,
}

/// Walk a dotted path over a record. Each segment may carry one bracketed
/// index; the wildcard `[*]` (allowed only when `allow_wildcard` is set)
/// resolves to index 0. Any miss is `None`.
pub(crate) fn walk_path<'a>(data: &'a Record, path: &str, allow_wildcard: bool) -> Option<&'a Value> {
    let mut current = data;
    let segments: Vec<&str> = path.split('.').collect();

    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;

        if segment.contains('[') {
            let (name, index) = parse_indexed_segment(segment)?;
            let index = match index {
                PathIndex::Numeric(n) => n,
                PathIndex::Wildcard if allow_wildcard => 0,
                PathIndex::Wildcard => return None,
            };
            let Some(Value::Array(items)) = current.get(name) else {
                return None;
            };
            let element = items.get(index)?;
            if last {
                return Some(element);
            }
            let Value::Object(next) = element else {
                return None;
            };
            current = next;
            continue;
        }

        if last {
            return current.get(*segment);
        }
        let Some(Value::Object(next)) = current.get(*segment) else {
            return None;
        };
        current = next;
    }
    None
}

/// Parse `resources[0]` or `resources[*]` into a name and an index.
pub(crate) fn parse_indexed_segment(segment: &str) -> Option<(&str, PathIndex)> {
    let open = segment.find('[')?;
    let close = segment.find(']')?;
    if close <= open {
        return None;
    }
    let name = &segment[..open];
    let index_str = &segment[open + 1..close];
    if index_str == "*" {
        return Some((name, PathIndex::Wildcard));
    }
    index_str.parse::<usize>().ok().map(|n| (name, PathIndex::Numeric(n)))
}
