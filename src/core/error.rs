//! TZ-002: Error taxonomy.
//!
//! Only unrecoverable ambiguity is an error: a pattern that fails to compile,
//! an ID that no pattern can extract, a value type nothing matches, or AI
//! text no strategy can decode. A field or type that is simply absent is a
//! resolution miss and surfaces as `Option`/empty, never through this enum.

use crate::core::types::ActionKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Fatal at construction: malformed pattern or table.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// No extraction pattern produced a resource id.
    #[error(
        "no resource id extracted for tool '{tool}' (type '{resource_type}', \
         classification {classification}): {message}"
    )]
    Extraction {
        tool: String,
        resource_type: String,
        classification: String,
        message: String,
    },

    /// No value-type pattern matched the step text.
    #[error("unable to infer value type from description '{description}' and name '{name}'")]
    Inference { description: String, name: String },

    /// No recovery strategy produced decodable JSON.
    #[error("plan recovery failed: {message}")]
    Parse { message: String },
}

impl EngineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn extraction(
        tool: &str,
        resource_type: &str,
        classification: ActionKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Extraction {
            tool: tool.to_string(),
            resource_type: resource_type.to_string(),
            classification: classification.to_string(),
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tz002_extraction_error_names_context() {
        let err = EngineError::extraction("create-vpc", "vpc", ActionKind::Creation, "no match");
        let msg = err.to_string();
        assert!(msg.contains("create-vpc"));
        assert!(msg.contains("'vpc'"));
        assert!(msg.contains("creation"));
    }

    #[test]
    fn test_tz002_inference_error_carries_inputs() {
        let err = EngineError::Inference {
            description: "do something".to_string(),
            name: "mystery".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("do something"));
        assert!(msg.contains("mystery"));
    }
}
