// src/workflow/orchestrator.rs
//! Orchestrator: the single driver of workflow state.
//!
//! Every external action (advance, approve, reject, revise, chat) is one
//! logical unit of work against one workflow. Mutations for a given id are
//! serialized through a per-workflow async mutex, so a detached background
//! advance can never race a later gate call into a lost update. Gate
//! decisions resume autonomous progress by spawning a detached advance
//! task; the caller never waits for it.

use crate::errors::OrchestratorError;
use crate::models::workflow::{gate_target, ChatRole, GateAction, Workflow, WorkflowState};
use crate::provider::{generate_with_timeout, GenerationProvider};
use crate::store::WorkflowStore;
use crate::workflow::dispatcher::StageDispatcher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Deadline for a single generation call.
    pub generation_timeout_secs: u64,
    /// Whether gate decisions spawn a detached follow-up advance. Tests
    /// turn this off to keep assertions deterministic.
    pub auto_advance: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            generation_timeout_secs: 120,
            auto_advance: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let generation_timeout_secs = std::env::var("GENERATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);
        Self {
            generation_timeout_secs,
            auto_advance: true,
        }
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn WorkflowStore>,
    provider: Arc<dyn GenerationProvider>,
    dispatcher: StageDispatcher,
    config: OrchestratorConfig,
    /// One mutex per workflow id; all mutating operations take it first.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        provider: Arc<dyn GenerationProvider>,
        config: OrchestratorConfig,
    ) -> Self {
        let dispatcher = StageDispatcher::new(provider.clone(), config.generation_timeout());
        Self {
            inner: Arc::new(Inner {
                store,
                provider,
                dispatcher,
                config,
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a new workflow in Idle. Does not start processing; the first
    /// advance (or an explicit client call) kicks the pipeline off.
    pub async fn create(
        &self,
        topic: String,
        tone: Option<String>,
    ) -> Result<Uuid, OrchestratorError> {
        if topic.trim().is_empty() {
            return Err(OrchestratorError::Validation { field: "topic" });
        }
        let tone = tone.filter(|t| !t.trim().is_empty());
        let workflow = Workflow::new(topic, tone);
        let id = workflow.id;
        self.inner.store.save(&workflow).await?;
        tracing::info!(workflow_id = %id, topic = %workflow.topic, "Created workflow");
        Ok(id)
    }

    /// Advance the workflow by exactly one stage. Gate and terminal states
    /// return unchanged without error; everything else runs one dispatcher
    /// step and persists the result.
    pub async fn advance(&self, id: Uuid) -> Result<WorkflowState, OrchestratorError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut workflow = self.load(id).await?;
        if workflow.state.is_gate() || workflow.state.is_terminal() {
            tracing::debug!(workflow_id = %id, state = workflow.state.as_str(), "Advance is a no-op");
            return Ok(workflow.state);
        }

        let from = workflow.state;
        let state = self.inner.dispatcher.dispatch(&mut workflow).await?;
        self.inner.store.save(&workflow).await?;
        tracing::info!(
            workflow_id = %id,
            from = from.as_str(),
            to = state.as_str(),
            "Advanced workflow"
        );
        Ok(state)
    }

    /// Approve the outline. Returns false (without mutation) unless the
    /// workflow is waiting for approval.
    pub async fn approve(&self, id: Uuid, notes: Option<String>) -> Result<bool, OrchestratorError> {
        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut workflow = self.load(id).await?;
        let Some(target) = gate_target(workflow.state, GateAction::Approve) else {
            tracing::warn!(
                workflow_id = %id,
                state = workflow.state.as_str(),
                "Approve rejected: workflow is not awaiting approval"
            );
            return Ok(false);
        };

        if let Some(notes) = notes.filter(|n| !n.trim().is_empty()) {
            workflow.push_chat(ChatRole::User, format!("Outline approved: {}", notes));
        }
        workflow.transition_to(target)?;
        self.inner.store.save(&workflow).await?;
        tracing::info!(workflow_id = %id, "Outline approved, drafting scheduled");

        self.schedule_advance(id);
        Ok(true)
    }

    /// Reject the outline with required feedback; the outline is
    /// regenerated on the next advance with the feedback folded in.
    pub async fn reject(&self, id: Uuid, feedback: String) -> Result<bool, OrchestratorError> {
        if feedback.trim().is_empty() {
            return Err(OrchestratorError::Validation { field: "feedback" });
        }

        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut workflow = self.load(id).await?;
        let Some(target) = gate_target(workflow.state, GateAction::Reject) else {
            tracing::warn!(
                workflow_id = %id,
                state = workflow.state.as_str(),
                "Reject rejected: workflow is not awaiting approval"
            );
            return Ok(false);
        };

        workflow.push_chat(ChatRole::User, format!("Outline rejected: {}", feedback));
        workflow.set_feedback(feedback);
        workflow.transition_to(target)?;
        self.inner.store.save(&workflow).await?;
        tracing::info!(workflow_id = %id, "Outline rejected, regeneration scheduled");

        self.schedule_advance(id);
        Ok(true)
    }

    /// Request a revision. The instructions are always recorded as feedback
    /// and a chat message; the workflow only re-enters Drafting when it is
    /// in Editing, Optimizing, or Final.
    pub async fn revise(&self, id: Uuid, instructions: String) -> Result<bool, OrchestratorError> {
        if instructions.trim().is_empty() {
            return Err(OrchestratorError::Validation {
                field: "instructions",
            });
        }

        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut workflow = self.load(id).await?;
        workflow.push_chat(ChatRole::User, format!("Revision requested: {}", instructions));
        workflow.set_feedback(instructions);

        if let Some(target) = gate_target(workflow.state, GateAction::Revise) {
            let from = workflow.state;
            workflow.transition_to(target)?;
            tracing::info!(
                workflow_id = %id,
                from = from.as_str(),
                "Revision re-entered drafting"
            );
        } else {
            tracing::info!(
                workflow_id = %id,
                state = workflow.state.as_str(),
                "Revision recorded without transition"
            );
        }

        self.inner.store.save(&workflow).await?;
        self.schedule_advance(id);
        Ok(true)
    }

    /// Chat with the assistant in the context of this workflow. Appends the
    /// user message and the generated reply to the history; never touches
    /// state or content fields.
    pub async fn chat(&self, id: Uuid, message: String) -> Result<String, OrchestratorError> {
        if message.trim().is_empty() {
            return Err(OrchestratorError::Validation { field: "message" });
        }

        let lock = self.lock_for(id).await;
        let _guard = lock.lock().await;

        let mut workflow = self.load(id).await?;
        workflow.push_chat(ChatRole::User, message.clone());

        let prompt = chat_prompt(&workflow, &message);
        let reply = generate_with_timeout(
            self.inner.provider.as_ref(),
            &prompt,
            self.inner.config.generation_timeout(),
        )
        .await
        .map_err(OrchestratorError::ChatFailed)?;

        workflow.push_chat(ChatRole::Assistant, reply.clone());
        self.inner.store.save(&workflow).await?;
        Ok(reply)
    }

    pub async fn get(&self, id: Uuid) -> Result<Workflow, OrchestratorError> {
        self.load(id).await
    }

    pub async fn list(&self) -> Result<Vec<Workflow>, OrchestratorError> {
        Ok(self.inner.store.get_all().await?)
    }

    async fn load(&self, id: Uuid) -> Result<Workflow, OrchestratorError> {
        self.inner
            .store
            .get(id)
            .await?
            .ok_or(OrchestratorError::NotFound(id))
    }

    async fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        // A strong count of 1 means only the map holds the lock, so no
        // operation is using or waiting on it; drop those entries to keep
        // the map from growing with every workflow ever touched.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(id).or_default().clone()
    }

    #[cfg(test)]
    async fn tracked_lock_count(&self) -> usize {
        self.inner.locks.lock().await.len()
    }

    /// Spawn a detached advance so a human decision resumes pipeline
    /// progress without blocking the caller. Failures are logged with the
    /// workflow id; the pre-advance state stays retryable.
    fn schedule_advance(&self, id: Uuid) {
        if !self.inner.config.auto_advance {
            tracing::debug!(workflow_id = %id, "Auto-advance disabled, skipping follow-up");
            return;
        }
        let orchestrator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.advance(id).await {
                tracing::error!(workflow_id = %id, error = %e, "Background advance failed");
            }
        });
    }
}

fn chat_prompt(workflow: &Workflow, message: &str) -> String {
    let mut prompt = String::from(
        "You are the writing assistant for a blog content pipeline. Answer the user's \
         question about this workflow; be concise and concrete.\n\n",
    );
    prompt.push_str(&format!("Topic: {}\n", workflow.topic));
    if let Some(tone) = &workflow.tone {
        prompt.push_str(&format!("Tone: {}\n", tone));
    }
    prompt.push_str(&format!("Pipeline stage: {}\n", workflow.state.as_str()));
    if let Some(outline) = &workflow.outline {
        prompt.push_str(&format!("\nCurrent outline:\n{}\n", truncate(outline, 2000)));
    }
    if let Some(draft) = &workflow.draft_content {
        prompt.push_str(&format!("\nCurrent draft:\n{}\n", truncate(draft, 2000)));
    }

    // Last entries before the message just recorded.
    let history = &workflow.chat_history;
    let recent = history.iter().rev().skip(1).take(10).collect::<Vec<_>>();
    if !recent.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        for entry in recent.into_iter().rev() {
            let role = match entry.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            prompt.push_str(&format!("{}: {}\n", role, entry.message));
        }
    }

    prompt.push_str(&format!("\nUser: {}\nAssistant:", message));
    prompt
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
