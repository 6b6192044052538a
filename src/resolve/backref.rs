//! TZ-008: Step back-reference resolution.
//!
//! Plan parameters may reference earlier steps with `{{step-1}}`,
//! `{{step-1.resourceId}}`, or an indexed form `{{step-1.subnets.0}}`. The
//! legacy bracket spelling `{{step-1.subnets}}[0]` is normalized to the
//! dotted form before lookup. References resolve against a value cache fed
//! by completed steps, then against the stored execution records, probing
//! the field resolver's candidate keys when the literal key is absent.

use crate::core::error::EngineError;
use crate::core::types::Record;
use crate::resolve::fields::{value_to_plain_string, walk_path, FieldResolver};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, RwLock};

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}(?:\[(\d+)\])?").expect("reference pattern is valid")
    })
}

pub struct BackrefResolver {
    fields: Arc<FieldResolver>,
    inner: RwLock<Store>,
}

#[derive(Default)]
struct Store {
    values: BTreeMap<String, Value>,
    records: BTreeMap<String, Record>,
}

impl BackrefResolver {
    pub fn new(fields: Arc<FieldResolver>) -> Self {
        Self {
            fields,
            inner: RwLock::new(Store::default()),
        }
    }

    /// Publish the value a completed step produced, addressable as
    /// `{{step-id}}` and as the exact key it was stored under.
    pub fn record_step_value(&self, key: &str, value: Value) {
        let mut store = self.inner.write().expect("backref store poisoned");
        store.values.insert(key.to_string(), value);
    }

    /// Publish a step's full execution record for field-level lookups.
    pub fn record_step_result(&self, step_id: &str, record: Record) {
        let mut store = self.inner.write().expect("backref store poisoned");
        store.records.insert(step_id.to_string(), record);
    }

    /// Resolve every reference in a parameter bag. Unresolvable references
    /// are an error naming the reference and the step it points at.
    pub fn resolve_parameters(&self, parameters: &Record) -> Result<Record, EngineError> {
        let mut resolved = Record::new();
        for (key, value) in parameters {
            resolved.insert(key.clone(), self.resolve_value(value)?);
        }
        Ok(resolved)
    }

    /// Resolve references recursively through strings, arrays, and objects.
    /// A string that is exactly one reference keeps the referent's type;
    /// references embedded in longer text are spliced in as plain strings.
    pub fn resolve_value(&self, value: &Value) -> Result<Value, EngineError> {
        match value {
            Value::String(s) => self.resolve_string(s),
            Value::Array(items) => items
                .iter()
                .map(|v| self.resolve_value(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve_value(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&self, text: &str) -> Result<Value, EngineError> {
        let pattern = reference_pattern();
        if !pattern.is_match(text) {
            return Ok(Value::String(text.to_string()));
        }

        // Whole-string reference: preserve the referent's JSON type.
        if let Some(caps) = pattern.captures(text) {
            if caps.get(0).map(|m| m.as_str()) == Some(text) {
                let key = normalize_key(&caps[1], caps.get(2).map(|m| m.as_str()));
                return self.resolve_key(&key).ok_or_else(|| unresolved(text, &key));
            }
        }

        let mut result = String::new();
        let mut last = 0;
        for caps in pattern.captures_iter(text) {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            let start = caps.get(0).map_or(0, |m| m.start());
            let key = normalize_key(&caps[1], caps.get(2).map(|m| m.as_str()));
            let value = self.resolve_key(&key).ok_or_else(|| unresolved(whole, &key))?;
            result.push_str(&text[last..start]);
            result.push_str(&value_to_plain_string(&value));
            last = start + whole.len();
        }
        result.push_str(&text[last..]);
        Ok(Value::String(result))
    }

    /// Look a normalized key up: value cache first, then the referenced
    /// step's execution record. Record hits are cached under the key.
    fn resolve_key(&self, key: &str) -> Option<Value> {
        {
            let store = self.inner.read().expect("backref store poisoned");
            if let Some(value) = store.values.get(key) {
                return Some(value.clone());
            }
        }

        let (step_id, field_path) = split_key(key);
        let record = {
            let store = self.inner.read().expect("backref store poisoned");
            store.records.get(step_id).cloned()?
        };

        let resolved = match field_path {
            // `resourceId` and `id` are the canonical spellings for "the id
            // this step produced" and go through identifier lookup.
            None | Some("resourceId") | Some("id") => self.lookup_identifier(&record),
            Some(path) => self.lookup_field(&record, path),
        }?;

        let mut store = self.inner.write().expect("backref store poisoned");
        store.values.insert(key.to_string(), resolved.clone());
        Some(resolved)
    }

    /// Bare `{{step-id}}`: the step's resource identifier, via the candidate
    /// keys for `id` and the `resource.id` envelope.
    fn lookup_identifier(&self, record: &Record) -> Option<Value> {
        for key in self.fields.candidate_keys_for("id", record) {
            if let Some(value) = record.get(&key) {
                return Some(value.clone());
            }
        }
        walk_path(record, "resource.id", false).cloned()
    }

    fn lookup_field(&self, record: &Record, path: &str) -> Option<Value> {
        let (field_path, index) = split_trailing_index(path);

        // Literal path first, bracketed when an index was requested.
        let literal = match index {
            Some(n) => format!("{field_path}[{n}]"),
            None => field_path.to_string(),
        };
        if let Some(value) = walk_path(record, &literal, false) {
            return Some(value.clone());
        }

        // Candidate keys for the leading field name, applying the index to
        // sequence values.
        let first_field = field_path.split('.').next()?;
        for key in self.fields.candidate_keys_for(first_field, record) {
            let Some(value) = record.get(&key) else { continue };
            return match (index, value) {
                (Some(n), Value::Array(items)) => items.get(n).cloned(),
                (Some(_), _) => None,
                (None, v) => Some(v.clone()),
            };
        }

        // Resource envelope as a last resort.
        walk_path(record, &format!("resource.{literal}"), false).cloned()
    }
}

fn unresolved(reference: &str, key: &str) -> EngineError {
    let step_id = split_key(key).0;
    EngineError::parse(format!(
        "unresolvable reference '{reference}': no recorded value or result for step '{step_id}'"
    ))
}

/// Fold the bracket spelling into the dotted key: `x.y` + `[0]` -> `x.y.0`.
fn normalize_key(inner: &str, bracket_index: Option<&str>) -> String {
    match bracket_index {
        Some(n) => format!("{inner}.{n}"),
        None => inner.to_string(),
    }
}

fn split_key(key: &str) -> (&str, Option<&str>) {
    match key.split_once('.') {
        Some((step_id, rest)) => (step_id, Some(rest)),
        None => (key, None),
    }
}

/// Split a dotted field path from a trailing numeric index, so `subnets.0`
/// addresses element 0 while a plain `subnets` stays whole. A path that is
/// nothing but a number is left alone.
fn split_trailing_index(path: &str) -> (&str, Option<usize>) {
    match path.rsplit_once('.') {
        Some((head, tail)) => match tail.parse::<usize>() {
            Ok(n) => (head, Some(n)),
            Err(_) => (path, None),
        },
        None => (path, None),
    }
}
