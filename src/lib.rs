//! Trazar — the resolution layer between an AI planner and cloud tooling.
//!
//! Recovers structured plans from messy model output, identifies what
//! resources the steps touch, extracts the ids they produce, and resolves
//! cross-step references, deterministically.

pub mod cli;
pub mod core;
pub mod recovery;
pub mod resolve;
pub mod retrieval;

pub use crate::core::config::EngineConfig;
pub use crate::core::error::EngineError;
pub use crate::core::types::{ActionKind, ParsedDecision, PlanStep, Record, StepStatus};
pub use crate::core::Engine;
