// src/workflow/mod.rs
pub mod dispatcher;
pub mod orchestrator;

pub use dispatcher::StageDispatcher;
pub use orchestrator::{Orchestrator, OrchestratorConfig};
