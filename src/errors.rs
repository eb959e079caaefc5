// src/errors.rs
//! Error taxonomy for the workflow engine.
//!
//! Expected caller mistakes (wrong gate state) are reported as boolean
//! results by the orchestrator, not as errors; everything here is either
//! invalid input, a missing workflow, an internal invariant violation, or
//! a failure of an external collaborator (generation API, database).

use crate::models::workflow::WorkflowState;
use thiserror::Error;
use uuid::Uuid;

/// Failures of the generation provider (Gemini API).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("generation call timed out after {0}s")]
    Timeout(u64),

    #[error("generation API returned no usable candidates")]
    Empty,
}

/// Failures of the workflow store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored workflow {id} is corrupt: {message}")]
    Corrupt { id: Uuid, message: String },
}

/// Failures surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("workflow {0} not found")]
    NotFound(Uuid),

    #[error("{field} is required")]
    Validation { field: &'static str },

    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: WorkflowState,
        to: WorkflowState,
    },

    /// A stage ran without its required input. The state machine should
    /// make this unreachable; hitting it is an internal error, never a
    /// silent skip.
    #[error("stage {stage:?} requires {field} but it is not set")]
    MissingStageInput {
        stage: WorkflowState,
        field: &'static str,
    },

    #[error("generation failed in {stage:?} stage: {source}")]
    Generation {
        stage: WorkflowState,
        #[source]
        source: ProviderError,
    },

    #[error("chat reply generation failed: {0}")]
    ChatFailed(#[source] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_carries_workflow_id() {
        let id = Uuid::new_v4();
        let err = OrchestratorError::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn validation_names_the_missing_field() {
        let err = OrchestratorError::Validation { field: "feedback" };
        assert_eq!(err.to_string(), "feedback is required");
    }

    #[test]
    fn generation_failure_preserves_stage_and_cause() {
        let err = OrchestratorError::Generation {
            stage: WorkflowState::Researching,
            source: ProviderError::Timeout(120),
        };
        assert!(err.to_string().contains("Researching"));
        match err {
            OrchestratorError::Generation { source, .. } => {
                assert!(matches!(source, ProviderError::Timeout(120)));
            }
            _ => panic!("expected Generation variant"),
        }
    }

    #[test]
    fn store_error_converts_into_orchestrator_error() {
        let err: OrchestratorError = StoreError::Corrupt {
            id: Uuid::new_v4(),
            message: "bad state".to_string(),
        }
        .into();
        assert!(matches!(err, OrchestratorError::Store(_)));
    }
}
