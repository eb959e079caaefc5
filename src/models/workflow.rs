// src/models/workflow.rs
//! Workflow entity and state machine for the content generation pipeline.
//!
//! A workflow moves through a fixed sequence of stages
//! (Idle → Researching → Outlining → WaitingApproval → Drafting → Editing →
//! Optimizing → Final) plus a small set of human gate edges. All state
//! changes go through `transition_to`, which consults the explicit edge
//! table below; nothing else assigns `state`.

use crate::errors::OrchestratorError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline stage of a content workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    Idle,
    Researching,
    Outlining,
    WaitingApproval,
    Drafting,
    Editing,
    Optimizing,
    Final,
}

impl WorkflowState {
    /// The single forward edge out of this state, if any.
    pub fn next_stage(&self) -> Option<WorkflowState> {
        match self {
            WorkflowState::Idle => Some(WorkflowState::Researching),
            WorkflowState::Researching => Some(WorkflowState::Outlining),
            WorkflowState::Outlining => Some(WorkflowState::WaitingApproval),
            WorkflowState::WaitingApproval => Some(WorkflowState::Drafting),
            WorkflowState::Drafting => Some(WorkflowState::Editing),
            WorkflowState::Editing => Some(WorkflowState::Optimizing),
            WorkflowState::Optimizing => Some(WorkflowState::Final),
            WorkflowState::Final => None,
        }
    }

    /// States requiring a human decision before autonomous advance continues.
    pub fn is_gate(&self) -> bool {
        matches!(self, WorkflowState::WaitingApproval)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Final)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "Idle",
            WorkflowState::Researching => "Researching",
            WorkflowState::Outlining => "Outlining",
            WorkflowState::WaitingApproval => "WaitingApproval",
            WorkflowState::Drafting => "Drafting",
            WorkflowState::Editing => "Editing",
            WorkflowState::Optimizing => "Optimizing",
            WorkflowState::Final => "Final",
        }
    }

    pub fn parse(s: &str) -> Option<WorkflowState> {
        match s {
            "Idle" => Some(WorkflowState::Idle),
            "Researching" => Some(WorkflowState::Researching),
            "Outlining" => Some(WorkflowState::Outlining),
            "WaitingApproval" => Some(WorkflowState::WaitingApproval),
            "Drafting" => Some(WorkflowState::Drafting),
            "Editing" => Some(WorkflowState::Editing),
            "Optimizing" => Some(WorkflowState::Optimizing),
            "Final" => Some(WorkflowState::Final),
            _ => None,
        }
    }
}

/// Human gate decisions applied from outside the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    Approve,
    Reject,
    Revise,
}

/// Gate edge table: which target state (if any) a gate action reaches
/// from a given source state. `None` means the action is disallowed there.
pub fn gate_target(from: WorkflowState, action: GateAction) -> Option<WorkflowState> {
    match (from, action) {
        (WorkflowState::WaitingApproval, GateAction::Approve) => Some(WorkflowState::Drafting),
        (WorkflowState::WaitingApproval, GateAction::Reject) => Some(WorkflowState::Outlining),
        (WorkflowState::Editing, GateAction::Revise)
        | (WorkflowState::Optimizing, GateAction::Revise)
        | (WorkflowState::Final, GateAction::Revise) => Some(WorkflowState::Drafting),
        _ => None,
    }
}

/// True if `from → to` is an edge of the state machine, either the forward
/// edge or one of the gate edges.
pub fn is_valid_transition(from: WorkflowState, to: WorkflowState) -> bool {
    if from.next_stage() == Some(to) {
        return true;
    }
    [GateAction::Approve, GateAction::Reject, GateAction::Revise]
        .iter()
        .any(|action| gate_target(from, *action) == Some(to))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry of a workflow's conversational history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// The persisted unit of work: one blog post moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: Uuid,
    pub topic: String,
    pub tone: Option<String>,
    pub state: WorkflowState,
    pub research_data: Option<String>,
    pub outline: Option<String>,
    pub draft_content: Option<String>,
    pub seo_report: Option<String>,
    pub feedback: Option<String>,
    pub chat_history: Vec<ChatEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(topic: String, tone: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            topic,
            tone,
            state: WorkflowState::Idle,
            research_data: None,
            outline: None,
            draft_content: None,
            seo_report: None,
            feedback: None,
            chat_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, failing if `state → next` is not an edge of the
    /// state machine. This is the only place `state` is assigned.
    pub fn transition_to(&mut self, next: WorkflowState) -> Result<(), OrchestratorError> {
        if !is_valid_transition(self.state, next) {
            return Err(OrchestratorError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.touch();
        Ok(())
    }

    pub fn set_research(&mut self, data: String) {
        self.research_data = Some(data);
        self.touch();
    }

    pub fn set_outline(&mut self, outline: String) {
        self.outline = Some(outline);
        self.touch();
    }

    pub fn set_draft(&mut self, draft: String) {
        self.draft_content = Some(draft);
        self.touch();
    }

    pub fn set_seo_report(&mut self, report: String) {
        self.seo_report = Some(report);
        self.touch();
    }

    pub fn set_feedback(&mut self, feedback: String) {
        self.feedback = Some(feedback);
        self.touch();
    }

    /// Append one message to the chat history. The history is insertion
    /// ordered and never truncated or rewritten.
    pub fn push_chat(&mut self, role: ChatRole, message: String) {
        self.chat_history.push(ChatEntry {
            role,
            message,
            timestamp: Utc::now(),
        });
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_edges_reach_final() {
        let mut state = WorkflowState::Idle;
        let mut visited = vec![state];
        while let Some(next) = state.next_stage() {
            state = next;
            visited.push(state);
        }
        assert_eq!(
            visited,
            vec![
                WorkflowState::Idle,
                WorkflowState::Researching,
                WorkflowState::Outlining,
                WorkflowState::WaitingApproval,
                WorkflowState::Drafting,
                WorkflowState::Editing,
                WorkflowState::Optimizing,
                WorkflowState::Final,
            ]
        );
        assert!(WorkflowState::Final.next_stage().is_none());
    }

    #[test]
    fn gate_table_matches_design() {
        assert_eq!(
            gate_target(WorkflowState::WaitingApproval, GateAction::Approve),
            Some(WorkflowState::Drafting)
        );
        assert_eq!(
            gate_target(WorkflowState::WaitingApproval, GateAction::Reject),
            Some(WorkflowState::Outlining)
        );
        for from in [
            WorkflowState::Editing,
            WorkflowState::Optimizing,
            WorkflowState::Final,
        ] {
            assert_eq!(
                gate_target(from, GateAction::Revise),
                Some(WorkflowState::Drafting)
            );
        }
        // Actions from states they are not defined for are disallowed.
        assert_eq!(gate_target(WorkflowState::Idle, GateAction::Approve), None);
        assert_eq!(gate_target(WorkflowState::Drafting, GateAction::Revise), None);
        assert_eq!(gate_target(WorkflowState::Final, GateAction::Approve), None);
        assert_eq!(gate_target(WorkflowState::Outlining, GateAction::Reject), None);
    }

    #[test]
    fn transition_rejects_skipped_states() {
        let mut workflow = Workflow::new("Rust async patterns".to_string(), None);
        let err = workflow.transition_to(WorkflowState::Drafting).unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidTransition {
                from: WorkflowState::Idle,
                to: WorkflowState::Drafting,
            }
        ));
        assert_eq!(workflow.state, WorkflowState::Idle);

        workflow.transition_to(WorkflowState::Researching).unwrap();
        assert_eq!(workflow.state, WorkflowState::Researching);
    }

    #[test]
    fn new_workflow_starts_idle_and_empty() {
        let workflow = Workflow::new("Intermittent Fasting".to_string(), Some("professional".to_string()));
        assert_eq!(workflow.state, WorkflowState::Idle);
        assert!(workflow.research_data.is_none());
        assert!(workflow.outline.is_none());
        assert!(workflow.draft_content.is_none());
        assert!(workflow.feedback.is_none());
        assert!(workflow.chat_history.is_empty());
        assert_eq!(workflow.created_at, workflow.updated_at);
    }

    #[test]
    fn chat_history_is_append_only_in_order() {
        let mut workflow = Workflow::new("topic".to_string(), None);
        workflow.push_chat(ChatRole::User, "first".to_string());
        workflow.push_chat(ChatRole::Assistant, "second".to_string());
        workflow.push_chat(ChatRole::User, "third".to_string());
        let messages: Vec<&str> = workflow
            .chat_history
            .iter()
            .map(|entry| entry.message.as_str())
            .collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(workflow.chat_history[1].role, ChatRole::Assistant);
    }

    #[test]
    fn mutations_refresh_updated_at() {
        let mut workflow = Workflow::new("topic".to_string(), None);
        let created = workflow.updated_at;
        workflow.set_research("notes".to_string());
        assert!(workflow.updated_at >= created);
        assert_eq!(workflow.created_at, created);
    }

    #[test]
    fn state_round_trips_through_text() {
        for state in [
            WorkflowState::Idle,
            WorkflowState::Researching,
            WorkflowState::Outlining,
            WorkflowState::WaitingApproval,
            WorkflowState::Drafting,
            WorkflowState::Editing,
            WorkflowState::Optimizing,
            WorkflowState::Final,
        ] {
            assert_eq!(WorkflowState::parse(state.as_str()), Some(state));
        }
        assert_eq!(WorkflowState::parse("Paused"), None);
    }
}
