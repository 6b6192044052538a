//! TZ-010: Built-in pattern retrievers.
//!
//! Two broad defaults keep unconfigured deployments resolving: any `*_id`
//! type answers with the step's own resource identifier, any `*_name` type
//! with the step's name. Specific exact-name retrievers registered by the
//! embedding application always take precedence.

use crate::core::error::EngineError;
use crate::retrieval::{RetrievalRegistry, RetrievalResult};
use serde_json::Value;
use std::sync::Arc;

pub fn register_builtins(registry: &RetrievalRegistry) -> Result<(), EngineError> {
    registry.register_pattern(
        ".*_id$",
        Arc::new(|_ctx, step| {
            Ok(RetrievalResult::new(
                Value::String(step.resource_id.clone()),
                "builtin_resource_id",
            ))
        }),
    )?;
    registry.register_pattern(
        ".*_name$",
        Arc::new(|_ctx, step| {
            Ok(RetrievalResult::new(
                Value::String(step.name.clone()),
                "builtin_step_name",
            ))
        }),
    )?;
    Ok(())
}
