//! TZ-003: Configuration tables — loading and structural validation.
//!
//! All pattern and mapping tables are supplied at startup from three YAML
//! files (shipped defaults under `config/`) and are immutable after load.
//! Structural problems are reported as a list of validation errors; regex
//! validity is enforced later, when components compile their patterns.

use crate::core::types::ActionKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Aggregated engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Resource-type pattern families and relationships (patterns.yaml)
    pub patterns: PatternConfig,

    /// Field mapping and transformation tables (field_mappings.yaml)
    pub field_mappings: FieldMappingConfig,

    /// ID extraction patterns and tool classifications (extraction.yaml)
    pub extraction: ExtractionConfig,
}

// ============================================================================
// patterns.yaml
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Per-type identifier/name/description pattern families
    #[serde(default)]
    pub resource_identification: ResourceIdentification,

    /// Per-type tool-name patterns
    #[serde(default)]
    pub tool_resource_patterns: BTreeMap<String, Vec<String>>,

    /// Parent/child graph and required dependencies
    #[serde(default)]
    pub resource_relationships: ResourceRelationships,

    /// Per value-type inference predicates
    #[serde(default)]
    pub value_type_inference: BTreeMap<String, ValueTypePatternConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceIdentification {
    /// Identifier patterns, matched case-sensitively (e.g. `^vpc-[0-9a-f]+$`)
    #[serde(default)]
    pub id_patterns: BTreeMap<String, Vec<String>>,

    /// Name patterns, matched case-insensitively
    #[serde(default)]
    pub name_patterns: BTreeMap<String, Vec<String>>,

    /// Description patterns, matched case-insensitively
    #[serde(default)]
    pub description_patterns: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRelationships {
    /// Parent type -> child types it may contain
    #[serde(default)]
    pub children: BTreeMap<String, Vec<String>>,

    /// Resource type -> types it requires before creation
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
}

/// Predicates for inferring one value type. All four must hold: description
/// matches one of its regexes (vacuously when none), name likewise, every
/// required term is present, and at least one optional term (when any are
/// configured).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValueTypePatternConfig {
    #[serde(default)]
    pub description_patterns: Vec<String>,

    #[serde(default)]
    pub name_patterns: Vec<String>,

    #[serde(default)]
    pub required_terms: Vec<String>,

    #[serde(default)]
    pub optional_terms: Vec<String>,
}

impl ValueTypePatternConfig {
    /// True when no predicate is configured at all, which would match any
    /// input vacuously.
    pub fn is_vacuous(&self) -> bool {
        self.description_patterns.is_empty()
            && self.name_patterns.is_empty()
            && self.required_terms.is_empty()
            && self.optional_terms.is_empty()
    }
}

// ============================================================================
// field_mappings.yaml
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMappingConfig {
    /// Per resource type, per logical field, ordered candidate keys to probe
    #[serde(default)]
    pub resource_fields: BTreeMap<String, BTreeMap<String, Vec<String>>>,

    /// Global candidate-key ordering per field name
    #[serde(default)]
    pub default_field_priorities: BTreeMap<String, Vec<String>>,

    /// Value transformation rule sets
    #[serde(default)]
    pub field_transformations: FieldTransformations,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldTransformations {
    /// Canonical state -> accepted aliases
    #[serde(default)]
    pub state: BTreeMap<String, Vec<String>>,

    /// Field names coerced to boolean
    #[serde(default)]
    pub boolean_fields: Vec<String>,

    /// Field names coerced to sequences
    #[serde(default)]
    pub array_fields: Vec<String>,
}

// ============================================================================
// extraction.yaml
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Ordered extraction patterns per action classification
    #[serde(default)]
    pub resource_id_extraction: BTreeMap<ActionKind, Vec<ExtractionPattern>>,

    /// Tool name -> action classification, registered exactly once
    #[serde(default)]
    pub tool_actions: BTreeMap<String, ActionKind>,
}

/// One extraction rule: which resource types it applies to (`*` = any) and
/// the ordered dotted/bracketed field paths to probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionPattern {
    #[serde(default)]
    pub resource_types: Vec<String>,

    #[serde(default)]
    pub field_paths: Vec<String>,
}

// ============================================================================
// Loading
// ============================================================================

impl EngineConfig {
    /// Load all three table files from a configuration directory.
    pub fn load_dir(dir: &Path) -> Result<Self, String> {
        Ok(Self {
            patterns: load_yaml(&dir.join("patterns.yaml"))?,
            field_mappings: load_yaml(&dir.join("field_mappings.yaml"))?,
            extraction: load_yaml(&dir.join("extraction.yaml"))?,
        })
    }

    /// Parse a full config from three YAML strings (tests, embedding).
    pub fn from_yaml(patterns: &str, field_mappings: &str, extraction: &str) -> Result<Self, String> {
        Ok(Self {
            patterns: parse_yaml(patterns, "patterns")?,
            field_mappings: parse_yaml(field_mappings, "field_mappings")?,
            extraction: parse_yaml(extraction, "extraction")?,
        })
    }

    /// Validate structural constraints. Returns a list of errors (empty = valid).
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let known = self.known_resource_types();

        let mut check_type = |context: &str, resource_type: &str| {
            if !known.contains(&resource_type.to_string()) {
                errors.push(ValidationError {
                    message: format!("{} references unknown resource type '{}'", context, resource_type),
                });
            }
        };

        for (parent, children) in &self.patterns.resource_relationships.children {
            check_type("relationship graph", parent);
            for child in children {
                check_type(&format!("children of '{}'", parent), child);
            }
        }
        for (resource_type, deps) in &self.patterns.resource_relationships.dependencies {
            check_type("dependency table", resource_type);
            for dep in deps {
                check_type(&format!("dependencies of '{}'", resource_type), dep);
            }
        }

        for (value_type, pattern) in &self.patterns.value_type_inference {
            if pattern.is_vacuous() {
                errors.push(ValidationError {
                    message: format!(
                        "value type '{}' has no predicates and would match anything",
                        value_type
                    ),
                });
            }
        }

        for (kind, patterns) in &self.extraction.resource_id_extraction {
            for (i, pattern) in patterns.iter().enumerate() {
                if pattern.field_paths.is_empty() {
                    errors.push(ValidationError {
                        message: format!("{} extraction pattern #{} has no field paths", kind, i),
                    });
                }
                if pattern.resource_types.is_empty() {
                    errors.push(ValidationError {
                        message: format!("{} extraction pattern #{} applies to no resource types", kind, i),
                    });
                }
            }
        }

        for tool in self.extraction.tool_actions.keys() {
            if tool.is_empty() {
                errors.push(ValidationError {
                    message: "tool classification with empty tool name".to_string(),
                });
            }
        }

        errors
    }

    /// All resource types mentioned by any pattern family.
    pub fn known_resource_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        let ident = &self.patterns.resource_identification;
        for key in ident
            .id_patterns
            .keys()
            .chain(ident.name_patterns.keys())
            .chain(ident.description_patterns.keys())
            .chain(self.patterns.tool_resource_patterns.keys())
        {
            if !types.contains(key) {
                types.push(key.clone());
            }
        }
        types.sort();
        types
    }
}

fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_yaml_ng::from_str(&content).map_err(|e| format!("{}: YAML parse error: {}", path.display(), e))
}

fn parse_yaml<T: serde::de::DeserializeOwned>(content: &str, what: &str) -> Result<T, String> {
    serde_yaml_ng::from_str(content).map_err(|e| format!("{}: YAML parse error: {}", what, e))
}

/// Structural validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATTERNS: &str = r#"
resource_identification:
  id_patterns:
    vpc: ["^vpc-[0-9a-f]+$"]
    subnet: ["^subnet-[0-9a-f]+$"]
  name_patterns:
    vpc: ["vpc", "virtual.private"]
  description_patterns:
    vpc: ["create.*vpc"]
tool_resource_patterns:
  vpc: ["create-vpc"]
resource_relationships:
  children:
    vpc: [subnet]
  dependencies:
    subnet: [vpc]
value_type_inference:
  latest_ami:
    description_patterns: ["latest.*ami"]
    required_terms: [ami]
"#;

    const FIELDS: &str = r#"
resource_fields:
  vpc:
    id: [vpcId, resourceId, id]
default_field_priorities:
  id: [resourceId, id]
field_transformations:
  state:
    active: [available, running]
  boolean_fields: [enabled]
  array_fields: [zones]
"#;

    const EXTRACTION: &str = r#"
resource_id_extraction:
  creation:
    - resource_types: [vpc]
      field_paths: [vpcId, "resource.id"]
tool_actions:
  create-vpc: creation
"#;

    #[test]
    fn test_tz003_parse_and_validate() {
        let config = EngineConfig::from_yaml(PATTERNS, FIELDS, EXTRACTION).unwrap();
        assert_eq!(
            config.patterns.resource_identification.id_patterns["vpc"],
            vec!["^vpc-[0-9a-f]+$"]
        );
        assert_eq!(config.extraction.tool_actions["create-vpc"], ActionKind::Creation);
        let errors = config.validate();
        assert!(
            errors.is_empty(),
            "unexpected errors: {:?}",
            errors.iter().map(|e| &e.message).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_tz003_unknown_relationship_type() {
        let patterns = r#"
resource_identification:
  id_patterns:
    vpc: ["^vpc-"]
resource_relationships:
  children:
    vpc: [ghost]
"#;
        let config = EngineConfig::from_yaml(patterns, "{}", "{}").unwrap();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.message.contains("ghost")));
    }

    #[test]
    fn test_tz003_vacuous_value_type() {
        let patterns = r#"
value_type_inference:
  anything: {}
"#;
        let config = EngineConfig::from_yaml(patterns, "{}", "{}").unwrap();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.message.contains("anything")));
    }

    #[test]
    fn test_tz003_extraction_pattern_missing_paths() {
        let extraction = r#"
resource_id_extraction:
  creation:
    - resource_types: [vpc]
      field_paths: []
"#;
        let config = EngineConfig::from_yaml("{}", "{}", extraction).unwrap();
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.message.contains("no field paths")));
    }

    #[test]
    fn test_tz003_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("patterns.yaml"), PATTERNS).unwrap();
        std::fs::write(dir.path().join("field_mappings.yaml"), FIELDS).unwrap();
        std::fs::write(dir.path().join("extraction.yaml"), EXTRACTION).unwrap();

        let config = EngineConfig::load_dir(dir.path()).unwrap();
        assert_eq!(config.field_mappings.default_field_priorities["id"], vec!["resourceId", "id"]);
    }

    #[test]
    fn test_tz003_load_dir_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = EngineConfig::load_dir(dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_tz003_known_resource_types_sorted_unique() {
        let config = EngineConfig::from_yaml(PATTERNS, FIELDS, EXTRACTION).unwrap();
        assert_eq!(config.known_resource_types(), vec!["subnet", "vpc"]);
    }

    #[test]
    fn test_tz003_shipped_defaults_are_valid() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("config");
        let config = EngineConfig::load_dir(&dir).unwrap();
        let errors = config.validate();
        assert!(
            errors.is_empty(),
            "shipped config invalid: {:?}",
            errors.iter().map(|e| &e.message).collect::<Vec<_>>()
        );
        assert!(config.known_resource_types().contains(&"vpc".to_string()));
    }
}
