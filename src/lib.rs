//! newpr — reactive PR stacking engine.
//!
//! Re-exports the pipeline entry point for integration tests and callers
//! that depend on the workspace root rather than `newpr-core` directly.
//! The primary interface is [`newpr_core::pipeline::run`]; this crate adds
//! no logic of its own.

pub use newpr_core::{
    cancel, classifier, config, coupling, delta, error, execute, feasibility, model, pipeline,
    plan, progress, session, verify,
};
pub use newpr_core::{run, EngineError, PipelineInput, PipelineOutcome};
pub use newpr_git::{GitRepo, GixRepo};
