//! TZ-001: Core types of the resolution engine.
//!
//! Defines the plan step schema decoded from AI responses, the parsed
//! decision wrapper, action classifications, and step status. All wire types
//! derive Serialize/Deserialize with the camelCase field names the upstream
//! model is prompted to emit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A heterogeneous string-keyed record, as returned by cloud tool calls.
pub type Record = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Plan steps
// ============================================================================

/// One unit of a deployment plan, decoded from the `executionPlan` array of
/// an AI response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanStep {
    /// Step identifier (referenced by `dependsOn` and back-references)
    #[serde(default)]
    pub id: String,

    /// Short human-readable name
    #[serde(default)]
    pub name: String,

    /// Free-text description of what the step does
    #[serde(default)]
    pub description: String,

    /// Action verb (create, update, delete, ...)
    #[serde(default)]
    pub action: String,

    /// Resource identifier, possibly empty until resolved
    #[serde(rename = "resourceId", default)]
    pub resource_id: String,

    /// Target tool name (native tool invocation)
    #[serde(rename = "mcpTool", default, skip_serializing_if = "String::is_empty")]
    pub tool_name: String,

    /// Tool-native parameters; take precedence over the legacy bag
    #[serde(rename = "toolParameters", default, skip_serializing_if = "Record::is_empty")]
    pub tool_parameters: Record,

    /// Legacy parameter bag, kept for backward compatibility
    #[serde(default)]
    pub parameters: Record,

    /// Step ids that must complete before this one
    #[serde(rename = "dependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Estimated duration, free-form (e.g. "30s")
    #[serde(rename = "estimatedDuration", default, skip_serializing_if = "String::is_empty")]
    pub estimated_duration: String,

    /// Execution status, mutated by the (external) executor
    #[serde(default)]
    pub status: StepStatus,

    /// Semantic tag describing what the step retrieves or produces
    #[serde(rename = "valueType", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

impl PlanStep {
    /// The step's value-type tag, checking the typed field first and the
    /// parameter bags second (older plans carry it as `value_type`).
    pub fn value_type_tag(&self) -> Option<String> {
        if let Some(ref vt) = self.value_type {
            return Some(vt.clone());
        }
        for bag in [&self.tool_parameters, &self.parameters] {
            if let Some(serde_json::Value::String(vt)) = bag.get("value_type") {
                return Some(vt.clone());
            }
        }
        None
    }

    /// Mirror tool-native parameters into the legacy bag. Tool parameters win
    /// on key collision.
    pub fn mirror_tool_parameters(&mut self) {
        if self.tool_parameters.is_empty() {
            return;
        }
        for (key, value) in &self.tool_parameters {
            self.parameters.insert(key.clone(), value.clone());
        }
    }
}

/// Step execution status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Parsed decisions
// ============================================================================

/// A fully-typed AI decision: the scalar judgment fields plus the recovered
/// execution plan. Produced only by the recovery parser; never fabricated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDecision {
    /// Caller-assigned decision id
    pub id: String,

    /// Top-level action the model chose
    pub action: String,

    /// The original user request this decision answers
    pub resource: String,

    /// Model-supplied reasoning
    pub reasoning: String,

    /// Model-supplied confidence in [0, 1]
    pub confidence: f64,

    /// Decision-level parameters
    #[serde(default)]
    pub parameters: Record,

    /// Recovered plan steps (may be empty when the response carried none)
    #[serde(default)]
    pub execution_plan: Vec<PlanStep>,

    /// When the decision was parsed
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

// ============================================================================
// Action classification
// ============================================================================

/// Category of effect a tool has. Determines which record the canonical
/// resource id lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Creation,
    Modification,
    Association,
    Deletion,
    Query,
    State,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        Self::Creation,
        Self::Modification,
        Self::Association,
        Self::Deletion,
        Self::Query,
        Self::State,
    ];
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creation => write!(f, "creation"),
            Self::Modification => write!(f, "modification"),
            Self::Association => write!(f, "association"),
            Self::Deletion => write!(f, "deletion"),
            Self::Query => write!(f, "query"),
            Self::State => write!(f, "state"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
