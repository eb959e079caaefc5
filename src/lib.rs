// src/lib.rs
//! Blogsmith: a human-supervised blog content pipeline.
//!
//! A workflow moves a topic through research, outlining, drafting,
//! editing, and SEO optimization, pausing at an approval gate after the
//! outline. The orchestrator drives each stage through a pluggable
//! generation provider and persists every step.

pub mod db;
pub mod errors;
pub mod gemini_client;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod provider;
pub mod store;
pub mod topics;
pub mod workflow;

use provider::GenerationProvider;
use std::sync::Arc;
use std::time::Duration;
use workflow::Orchestrator;

pub use errors::{OrchestratorError, ProviderError, StoreError};
pub use models::workflow::{GateAction, Workflow, WorkflowState};

/// Shared state for all HTTP handlers.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub provider: Arc<dyn GenerationProvider>,
    pub generation_timeout: Duration,
}
