//! TZ-011: Recovery parsing of model responses.
//!
//! Model output is JSON buried in prose, fenced code blocks, or cut off
//! mid-object by a token limit. Recovery runs three strategies in order:
//! a balanced-brace scan over the raw text, fenced-block and rescan
//! extraction, and truncation repair. Whatever survives is decoded into a
//! [`ParsedDecision`]; only a total miss is an error.
//!
//! This module also owns plan ordering: a dependency-respecting total order
//! with lexicographic tie-breaking, so the same plan always schedules the
//! same way.

use crate::core::error::EngineError;
use crate::core::types::{ParsedDecision, PlanStep, Record};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// JSON extraction
// ============================================================================

/// Extract the first balanced JSON object from free text. The scan tracks
/// string and escape state, so braces inside string literals do not count.
pub fn extract_json(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Alternative extraction for responses the balanced scan cannot crack:
/// a ```json fence, then any fence (skipping its language line), then a
/// rescan that tries every `{`. Every candidate must decode; a fence that
/// does not decode falls through to the next strategy.
pub fn extract_json_alternative(text: &str) -> Option<String> {
    if let Some(block) = fenced_block(text, "```json") {
        if serde_json::from_str::<Value>(&block).is_ok() {
            return Some(block);
        }
    }
    if let Some(block) = fenced_block(text, "```") {
        let trimmed = block.trim();
        // The first line may be a language tag
        let candidate = if trimmed.starts_with('{') {
            Some(trimmed)
        } else {
            trimmed
                .split_once('\n')
                .map(|(_, rest)| rest.trim())
                .filter(|rest| rest.starts_with('{'))
        };
        if let Some(candidate) = candidate {
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Some(candidate.to_string());
            }
        }
    }

    for (offset, _) in text.match_indices('{') {
        if let Some(candidate) = extract_json(&text[offset..]) {
            if serde_json::from_str::<Value>(candidate).is_ok() {
                return Some(candidate.to_string());
            }
        }
    }
    None
}

fn fenced_block(text: &str, opener: &str) -> Option<String> {
    let start = text.find(opener)? + opener.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    let inner = rest[..end].trim();
    if inner.is_empty() {
        return None;
    }
    Some(inner.to_string())
}

/// Repair a JSON object that was cut off mid-stream. Tried in order: the
/// text as-is, closing the open string literal and exactly the unbalanced
/// braces, the same after dropping a dangling final clause, and finally
/// retreating to the last `}` that yields a decodable prefix.
pub fn attempt_truncated_json_parse(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return None;
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(value) = close_and_parse(trimmed) {
        return Some(value);
    }

    // A cut mid-key or after a colon leaves nothing closable; drop the
    // clause after the last comma and close what remains.
    if let Some(pos) = trimmed.rfind(',') {
        if let Some(value) = close_and_parse(&trimmed[..pos]) {
            return Some(value);
        }
    }

    for (i, _) in trimmed.rmatch_indices('}') {
        if let Ok(value) = serde_json::from_str(&trimmed[..=i]) {
            return Some(value);
        }
    }
    None
}

fn close_and_parse(fragment: &str) -> Option<Value> {
    let (in_string, depth) = scan_state(fragment);
    if !in_string && depth == 0 {
        return None;
    }
    let mut patched = fragment.to_string();
    if in_string {
        patched.push('"');
    }
    for _ in 0..depth {
        patched.push('}');
    }
    serde_json::from_str(&patched).ok()
}

/// Where a balanced-brace scan of the fragment ends up: whether a string
/// literal is still open, and how many objects are.
fn scan_state(fragment: &str) -> (bool, usize) {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for b in fragment.bytes() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    (in_string, depth)
}

// ============================================================================
// Decision decoding
// ============================================================================

/// Wire shape of a decision as the model emits it. The id and timestamp are
/// assigned here, not trusted from the response.
#[derive(Deserialize)]
struct DecisionWire {
    #[serde(default)]
    action: String,
    #[serde(default)]
    resource: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    parameters: Record,
    #[serde(rename = "executionPlan", default)]
    execution_plan: Vec<PlanStep>,
}

/// Parse a raw model response into a typed decision.
pub fn parse_decision(id: &str, raw: &str) -> Result<ParsedDecision, EngineError> {
    let value = recover_value(raw).ok_or_else(|| {
        EngineError::parse(format!(
            "no decodable JSON object in response ({} bytes)",
            raw.len()
        ))
    })?;
    decode_decision(id, value)
}

fn recover_value(raw: &str) -> Option<Value> {
    if let Some(candidate) = extract_json(raw) {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Some(value);
        }
    }
    if let Some(candidate) = extract_json_alternative(raw) {
        if let Ok(value) = serde_json::from_str(&candidate) {
            return Some(value);
        }
    }
    let from = raw.find('{')?;
    attempt_truncated_json_parse(&raw[from..])
}

fn decode_decision(id: &str, value: Value) -> Result<ParsedDecision, EngineError> {
    let wire: DecisionWire = match serde_json::from_value(value.clone()) {
        Ok(wire) => wire,
        Err(err) => {
            // A malformed plan should not sink the scalar judgment fields.
            let mut stripped = value;
            let had_plan = stripped
                .as_object_mut()
                .map(|o| o.remove("executionPlan").is_some())
                .unwrap_or(false);
            if !had_plan {
                return Err(EngineError::parse(format!("decision decode failed: {err}")));
            }
            tracing::warn!(%err, "execution plan undecodable, keeping decision without it");
            serde_json::from_value(stripped)
                .map_err(|e| EngineError::parse(format!("decision decode failed: {e}")))?
        }
    };

    let mut seen = BTreeSet::new();
    for step in &wire.execution_plan {
        if !seen.insert(step.id.as_str()) {
            return Err(EngineError::parse(format!(
                "duplicate step id '{}' in execution plan",
                step.id
            )));
        }
    }

    let mut execution_plan = wire.execution_plan;
    for step in &mut execution_plan {
        step.mirror_tool_parameters();
    }

    Ok(ParsedDecision {
        id: id.to_string(),
        action: wire.action,
        resource: wire.resource,
        reasoning: wire.reasoning,
        confidence: wire.confidence,
        parameters: wire.parameters,
        execution_plan,
        timestamp: chrono::Utc::now(),
    })
}

// ============================================================================
// Plan ordering
// ============================================================================

/// Order plan steps so every dependency precedes its dependents. Among the
/// steps ready at any point the lexicographically smallest id runs first,
/// making the order a pure function of the plan. Unknown dependencies and
/// cycles are errors naming the offending steps.
pub fn order_steps(steps: &[PlanStep]) -> Result<Vec<PlanStep>, EngineError> {
    let mut by_id: BTreeMap<&str, &PlanStep> = BTreeMap::new();
    for step in steps {
        if by_id.insert(step.id.as_str(), step).is_some() {
            return Err(EngineError::parse(format!(
                "duplicate step id '{}' in execution plan",
                step.id
            )));
        }
    }

    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for step in steps {
        in_degree.entry(step.id.as_str()).or_insert(0);
        for dep in &step.depends_on {
            if !by_id.contains_key(dep.as_str()) {
                return Err(EngineError::parse(format!(
                    "step '{}' depends on unknown step '{dep}'",
                    step.id
                )));
            }
            *in_degree.entry(step.id.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut ordered = Vec::with_capacity(steps.len());
    while let Some(id) = ready.pop_first() {
        ordered.push(by_id[id].clone());
        if let Some(next) = dependents.get(id) {
            for &dependent in next {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }
    }

    if ordered.len() != steps.len() {
        let stuck: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(id, _)| *id)
            .collect();
        return Err(EngineError::parse(format!(
            "dependency cycle involving steps: {}",
            stuck.join(", ")
        )));
    }
    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tz011_extract_from_prose() {
        let text = r#"Here is the plan: {"action": "create", "confidence": 0.9} hope it helps"#;
        assert_eq!(
            extract_json(text),
            Some(r#"{"action": "create", "confidence": 0.9}"#)
        );
        assert_eq!(
            extract_json(r#"hello {"a": {"b": 1}} world"#),
            Some(r#"{"a": {"b": 1}}"#)
        );
    }

    #[test]
    fn test_tz011_braces_inside_strings_ignored() {
        let text = r#"{"reasoning": "use {curly} braces \" carefully", "n": 1}"#;
        assert_eq!(extract_json(text), Some(text));
    }

    #[test]
    fn test_tz011_unbalanced_is_none() {
        assert_eq!(extract_json(r#"{"a": {"b": 1}"#), None);
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_tz011_fenced_json_block() {
        let text = "Sure!\n```json\n{\"action\": \"create\"}\n```\nDone.";
        assert_eq!(
            extract_json_alternative(text),
            Some("{\"action\": \"create\"}".to_string())
        );
    }

    #[test]
    fn test_tz011_generic_fence_skips_language_line() {
        let text = "```javascript\n{\"action\": \"create\"}\n```";
        assert_eq!(
            extract_json_alternative(text),
            Some("{\"action\": \"create\"}".to_string())
        );
    }

    #[test]
    fn test_tz011_undecodable_fence_falls_through_to_rescan() {
        let text = "```json\n{not valid json}\n```\nBut also: {\"action\": \"create\", \"confidence\": 0.9}";
        assert_eq!(
            extract_json_alternative(text),
            Some("{\"action\": \"create\", \"confidence\": 0.9}".to_string())
        );
        let decision = parse_decision("d-1", text).unwrap();
        assert_eq!(decision.action, "create");
    }

    #[test]
    fn test_tz011_rescan_skips_undecodable_prefix() {
        let text = "weird {not json} then {\"ok\": true} trailing";
        assert_eq!(extract_json_alternative(text), Some("{\"ok\": true}".to_string()));
    }

    #[test]
    fn test_tz011_truncated_open_string() {
        let text = r#"{"action": "create", "reasoning": "we should defi"#;
        let value = attempt_truncated_json_parse(text).unwrap();
        assert_eq!(value["action"], json!("create"));
    }

    #[test]
    fn test_tz011_truncated_open_braces() {
        let text = r#"{"a": {"b": {"c": 1}"#;
        let value = attempt_truncated_json_parse(text).unwrap();
        assert_eq!(value["a"]["b"]["c"], json!(1));
    }

    #[test]
    fn test_tz011_truncated_backward_scan() {
        let text = r#"{"a": 1} {"b":"#;
        // The whole text is not an object but a prefix ending at the first
        // close brace is.
        let value = attempt_truncated_json_parse(text).unwrap();
        assert_eq!(value["a"], json!(1));
    }

    #[test]
    fn test_tz011_parse_decision_full() {
        let raw = r#"I'll create the network.
{
  "action": "create",
  "resource": "make me a vpc",
  "reasoning": "a fresh vpc isolates the workload",
  "confidence": 0.92,
  "executionPlan": [
    {
      "id": "step-1",
      "name": "Create VPC",
      "mcpTool": "create-vpc",
      "toolParameters": {"cidrBlock": "10.0.0.0/16"}
    }
  ]
}"#;
        let decision = parse_decision("dec-1", raw).unwrap();
        assert_eq!(decision.id, "dec-1");
        assert_eq!(decision.action, "create");
        assert_eq!(decision.confidence, 0.92);
        assert_eq!(decision.execution_plan.len(), 1);
        let step = &decision.execution_plan[0];
        assert_eq!(step.tool_name, "create-vpc");
        // toolParameters are mirrored into the legacy bag
        assert_eq!(step.parameters["cidrBlock"], json!("10.0.0.0/16"));
    }

    #[test]
    fn test_tz011_parse_decision_without_plan() {
        let raw = r#"{"action": "query", "confidence": 0.5}"#;
        let decision = parse_decision("dec-2", raw).unwrap();
        assert!(decision.execution_plan.is_empty());
    }

    #[test]
    fn test_tz011_parse_decision_fenced_and_truncated() {
        let raw = "```json\n{\"action\": \"create\", \"reasoning\": \"beca";
        // The fence never closes, so recovery falls through to truncation
        // repair.
        let decision = parse_decision("dec-3", raw).unwrap();
        assert_eq!(decision.action, "create");
    }

    #[test]
    fn test_tz011_duplicate_step_ids_rejected() {
        let raw = r#"{"action": "create", "executionPlan": [
            {"id": "step-1"}, {"id": "step-1"}
        ]}"#;
        let err = parse_decision("dec-4", raw).unwrap_err();
        assert!(err.to_string().contains("duplicate step id 'step-1'"));
    }

    #[test]
    fn test_tz011_garbage_is_parse_error() {
        let err = parse_decision("dec-5", "no structure at all").unwrap_err();
        assert!(matches!(err, EngineError::Parse { .. }));
    }

    #[test]
    fn test_tz011_malformed_plan_keeps_decision() {
        let raw = r#"{"action": "create", "confidence": 0.7, "executionPlan": "oops"}"#;
        let decision = parse_decision("dec-6", raw).unwrap();
        assert_eq!(decision.action, "create");
        assert!(decision.execution_plan.is_empty());
    }

    fn step(id: &str, deps: &[&str]) -> PlanStep {
        PlanStep {
            id: id.to_string(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            ..PlanStep::default()
        }
    }

    #[test]
    fn test_tz011_order_respects_dependencies() {
        let steps = vec![
            step("step-3", &["step-1", "step-2"]),
            step("step-2", &["step-1"]),
            step("step-1", &[]),
        ];
        let ordered = order_steps(&steps).unwrap();
        let ids: Vec<&str> = ordered.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["step-1", "step-2", "step-3"]);
    }

    #[test]
    fn test_tz011_order_ties_break_lexicographically() {
        let steps = vec![step("step-c", &[]), step("step-a", &[]), step("step-b", &[])];
        let ordered = order_steps(&steps).unwrap();
        let ids: Vec<&str> = ordered.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["step-a", "step-b", "step-c"]);
    }

    #[test]
    fn test_tz011_order_unknown_dependency() {
        let steps = vec![step("step-1", &["step-0"])];
        let err = order_steps(&steps).unwrap_err();
        assert!(err.to_string().contains("unknown step 'step-0'"));
    }

    #[test]
    fn test_tz011_order_cycle_detected() {
        let steps = vec![step("step-1", &["step-2"]), step("step-2", &["step-1"])];
        let err = order_steps(&steps).unwrap_err();
        assert!(err.to_string().contains("cycle"));
        assert!(err.to_string().contains("step-1"));
    }

    #[test]
    fn test_tz011_order_duplicate_ids() {
        let steps = vec![step("step-1", &[]), step("step-1", &[])];
        assert!(order_steps(&steps).is_err());
    }
}
