//! TZ-007: Value-type inference for data-returning steps.
//!
//! A query step that feeds later steps declares what kind of value it yields
//! (an AMI id, a subnet list, ...). When the declaration is missing the type
//! is inferred from the step's name and description against configured rules.
//! Rules are tried in sorted name order; the `unknown` sentinel, when
//! configured, is always tried last so a catch-all cannot shadow a specific
//! type.

use crate::core::config::{PatternConfig, ValueTypePatternConfig};
use crate::core::error::EngineError;
use regex::Regex;
use std::collections::BTreeMap;

const UNKNOWN_SENTINEL: &str = "unknown";

pub struct ValueTypeInferrer {
    rules: BTreeMap<String, CompiledRule>,
}

struct CompiledRule {
    description: Vec<Regex>,
    name: Vec<Regex>,
    required: Vec<String>,
    optional: Vec<String>,
}

impl ValueTypeInferrer {
    pub fn new(cfg: &PatternConfig) -> Result<Self, EngineError> {
        let mut rules = BTreeMap::new();
        for (value_type, rule) in &cfg.value_type_inference {
            rules.insert(value_type.clone(), CompiledRule::compile(value_type, rule)?);
        }
        Ok(Self { rules })
    }

    /// Infer the value type of a step from its name and description. Every
    /// non-empty clause of a rule must hold for the rule to match.
    pub fn infer(&self, name: &str, description: &str) -> Result<String, EngineError> {
        let name_lower = name.to_lowercase();
        let description_lower = description.to_lowercase();

        for (value_type, rule) in &self.rules {
            if value_type == UNKNOWN_SENTINEL {
                continue;
            }
            if rule.matches(name, description, &name_lower, &description_lower) {
                return Ok(value_type.clone());
            }
        }
        // The sentinel participates only through its own patterns, never as
        // an implicit default.
        if let Some(rule) = self.rules.get(UNKNOWN_SENTINEL) {
            if rule.matches(name, description, &name_lower, &description_lower) {
                return Ok(UNKNOWN_SENTINEL.to_string());
            }
        }

        Err(EngineError::Inference {
            description: description.to_string(),
            name: name.to_string(),
        })
    }

    /// Infer, then fall back to the sentinel when no rule matched at all.
    /// Callers that treat an unclassifiable step as fatal use [`infer`].
    ///
    /// [`infer`]: ValueTypeInferrer::infer
    pub fn infer_or_unknown(&self, name: &str, description: &str) -> String {
        self.infer(name, description)
            .unwrap_or_else(|_| UNKNOWN_SENTINEL.to_string())
    }
}

impl CompiledRule {
    fn compile(value_type: &str, cfg: &ValueTypePatternConfig) -> Result<Self, EngineError> {
        Ok(Self {
            description: compile_family(value_type, &cfg.description_patterns)?,
            name: compile_family(value_type, &cfg.name_patterns)?,
            required: lowercase_all(&cfg.required_terms),
            optional: lowercase_all(&cfg.optional_terms),
        })
    }

    fn matches(
        &self,
        name: &str,
        description: &str,
        name_lower: &str,
        description_lower: &str,
    ) -> bool {
        if !self.description.is_empty() && !self.description.iter().any(|p| p.is_match(description))
        {
            return false;
        }
        if !self.name.is_empty() && !self.name.iter().any(|p| p.is_match(name)) {
            return false;
        }
        // Each term must sit wholly inside one field; a term never matches
        // across the name/description boundary.
        let hit = |t: &String| name_lower.contains(t.as_str()) || description_lower.contains(t.as_str());
        if !self.required.iter().all(hit) {
            return false;
        }
        if !self.optional.is_empty() && !self.optional.iter().any(hit) {
            return false;
        }
        true
    }
}

fn compile_family(value_type: &str, patterns: &[String]) -> Result<Vec<Regex>, EngineError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("(?i){p}")).map_err(|e| {
                EngineError::configuration(format!(
                    "invalid inference pattern '{p}' for value type '{value_type}': {e}"
                ))
            })
        })
        .collect()
}

fn lowercase_all(terms: &[String]) -> Vec<String> {
    terms.iter().map(|t| t.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;

    const PATTERNS: &str = r#"
value_type_inference:
  availability_zones:
    required_terms: ["availability zone"]
  latest_ami:
    description_patterns: ["latest.*(ami|image)", "amazon.*linux.*ami"]
    required_terms: ["ami"]
  subnet_list:
    description_patterns: ["list.*subnets", "available.*subnets"]
    name_patterns: ["subnet"]
  vpc_id:
    required_terms: ["vpc"]
    optional_terms: ["id", "identifier"]
  unknown:
    description_patterns: ["look.?up", "fetch"]
"#;

    fn make_inferrer() -> ValueTypeInferrer {
        let cfg = EngineConfig::from_yaml(PATTERNS, "{}", "{}").unwrap();
        ValueTypeInferrer::new(&cfg.patterns).unwrap()
    }

    #[test]
    fn test_tz007_ami_lookup_description() {
        let inferrer = make_inferrer();
        let vt = inferrer
            .infer("Get AMI", "Find the latest Amazon Linux AMI")
            .unwrap();
        assert_eq!(vt, "latest_ami");
    }

    #[test]
    fn test_tz007_all_clauses_must_hold() {
        let inferrer = make_inferrer();
        // Description matches subnet_list but the name clause does not
        let err = inferrer.infer("step two", "List available subnets here").unwrap_err();
        assert!(matches!(err, EngineError::Inference { .. }));

        let vt = inferrer
            .infer("query-subnets", "List available subnets here")
            .unwrap();
        assert_eq!(vt, "subnet_list");
    }

    #[test]
    fn test_tz007_optional_terms_need_one_hit() {
        let inferrer = make_inferrer();
        let vt = inferrer.infer("lookup", "resolve the default VPC identifier").unwrap();
        assert_eq!(vt, "vpc_id");

        // "vpc" is present but neither optional term is
        let err = inferrer.infer("lookup", "inspect the vpc").unwrap_err();
        assert!(matches!(err, EngineError::Inference { .. }));
    }

    #[test]
    fn test_tz007_terms_stay_within_one_field() {
        let inferrer = make_inferrer();
        // "availability" ends the name and "zone" opens the description; the
        // two-word term must not match through the gap between the fields
        let err = inferrer.infer("pick availability", "zone list for region").unwrap_err();
        assert!(matches!(err, EngineError::Inference { .. }));

        let vt = inferrer.infer("pick", "availability zone list for region").unwrap();
        assert_eq!(vt, "availability_zones");
    }

    #[test]
    fn test_tz007_sentinel_tried_last() {
        let inferrer = make_inferrer();
        // "fetch" matches the sentinel and "ami" satisfies latest_ami; the
        // specific type wins despite sorting after "latest_ami" being moot —
        // the sentinel is deferred unconditionally.
        let vt = inferrer.infer("s", "fetch the latest ami").unwrap();
        assert_eq!(vt, "latest_ami");

        let vt = inferrer.infer("s", "fetch the thing").unwrap();
        assert_eq!(vt, "unknown");
    }

    #[test]
    fn test_tz007_total_miss_carries_context() {
        let inferrer = make_inferrer();
        let err = inferrer.infer("step-9", "reticulate splines").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("step-9"));
        assert!(msg.contains("reticulate splines"));
    }

    #[test]
    fn test_tz007_infer_or_unknown_fallback() {
        let inferrer = make_inferrer();
        assert_eq!(inferrer.infer_or_unknown("s", "reticulate splines"), "unknown");
    }
}
