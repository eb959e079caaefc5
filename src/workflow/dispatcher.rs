// src/workflow/dispatcher.rs
//! Stage dispatcher: maps a workflow's pre-advance state to the one
//! generation call that state needs, and writes the result onto the
//! entity. No entity field or state is touched until the provider call
//! has succeeded, so a failed stage leaves the workflow exactly as it
//! was and a retry of the advance is always safe.

use crate::errors::OrchestratorError;
use crate::models::workflow::{Workflow, WorkflowState};
use crate::provider::{generate_with_timeout, GenerationProvider};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub struct StageDispatcher {
    provider: Arc<dyn GenerationProvider>,
    timeout: Duration,
}

/// Structured output contract of the editing stage.
#[derive(Debug, Deserialize)]
pub struct EditedContent {
    pub content: String,
    #[serde(default)]
    pub changes: Vec<String>,
}

impl StageDispatcher {
    pub fn new(provider: Arc<dyn GenerationProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Run the single dispatch rule for the workflow's current state and
    /// return the state it transitioned to. Gate and terminal states are
    /// safe no-ops.
    pub async fn dispatch(&self, workflow: &mut Workflow) -> Result<WorkflowState, OrchestratorError> {
        match workflow.state {
            WorkflowState::Idle => {
                // Pure transition, no generation call.
                workflow.transition_to(WorkflowState::Researching)?;
            }
            WorkflowState::Researching => {
                let prompt = research_prompt(&workflow.topic, workflow.tone.as_deref());
                let research = self.call(WorkflowState::Researching, &prompt).await?;
                workflow.set_research(research);
                workflow.transition_to(WorkflowState::Outlining)?;
            }
            WorkflowState::Outlining => {
                let research = require_field(workflow.research_data.as_deref(), workflow.state, "research_data")?;
                let prompt = outline_prompt(
                    &workflow.topic,
                    research,
                    workflow.tone.as_deref(),
                    workflow.feedback.as_deref(),
                );
                let outline = self.call(WorkflowState::Outlining, &prompt).await?;
                workflow.set_outline(outline);
                workflow.transition_to(WorkflowState::WaitingApproval)?;
            }
            WorkflowState::WaitingApproval | WorkflowState::Final => {
                // Waiting on a human decision, or already done.
            }
            WorkflowState::Drafting => {
                let outline = require_field(workflow.outline.as_deref(), workflow.state, "outline")?;
                let prompt = draft_prompt(&workflow.topic, outline, workflow.tone.as_deref());
                let draft = self.call(WorkflowState::Drafting, &prompt).await?;
                workflow.set_draft(draft);
                workflow.transition_to(WorkflowState::Editing)?;
            }
            WorkflowState::Editing => {
                let draft = require_field(workflow.draft_content.as_deref(), workflow.state, "draft_content")?;
                let prompt = edit_prompt(draft, workflow.tone.as_deref());
                let response = self.call(WorkflowState::Editing, &prompt).await?;
                let edited = decode_edited_content(&response);
                tracing::info!(
                    workflow_id = %workflow.id,
                    changes = edited.changes.len(),
                    "Editing pass complete"
                );
                workflow.set_draft(edited.content);
                workflow.transition_to(WorkflowState::Optimizing)?;
            }
            WorkflowState::Optimizing => {
                let draft = require_field(workflow.draft_content.as_deref(), workflow.state, "draft_content")?;
                let prompt = seo_prompt(&workflow.topic, draft);
                let report = self.call(WorkflowState::Optimizing, &prompt).await?;
                workflow.set_seo_report(report);
                workflow.transition_to(WorkflowState::Final)?;
            }
        }
        Ok(workflow.state)
    }

    async fn call(&self, stage: WorkflowState, prompt: &str) -> Result<String, OrchestratorError> {
        generate_with_timeout(self.provider.as_ref(), prompt, self.timeout)
            .await
            .map_err(|source| OrchestratorError::Generation { stage, source })
    }
}

fn require_field<'a>(
    value: Option<&'a str>,
    stage: WorkflowState,
    field: &'static str,
) -> Result<&'a str, OrchestratorError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(OrchestratorError::MissingStageInput { stage, field }),
    }
}

/// Decode the editing stage's `{content, changes}` JSON. Model output is
/// frequently wrapped in code fences or not JSON at all; a malformed but
/// present response falls back to the raw text with an explanatory change
/// note rather than failing the stage.
pub fn decode_edited_content(response: &str) -> EditedContent {
    let cleaned = strip_code_fences(response);
    match serde_json::from_str::<EditedContent>(cleaned) {
        Ok(edited) if !edited.content.is_empty() => edited,
        _ => {
            tracing::warn!("Editing response was not valid JSON, keeping raw text");
            EditedContent {
                content: response.to_string(),
                changes: vec!["Automated edit (change list could not be parsed)".to_string()],
            }
        }
    }
}

/// Strip a leading/trailing markdown code fence from model output.
pub fn strip_code_fences(text: &str) -> &str {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    cleaned.trim()
}

fn research_prompt(topic: &str, tone: Option<&str>) -> String {
    let tone_line = tone
        .map(|t| format!("\nIntended tone of the final article: {}\n", t))
        .unwrap_or_default();
    format!(
        "You are a meticulous research assistant for a blog writing team.\n\
         \n\
         Topic: {topic}\n{tone_line}\
         Gather the background a writer needs to cover this topic well:\n\
         - Key facts, statistics, and definitions\n\
         - Common questions readers ask about it\n\
         - Notable perspectives or debates\n\
         - Practical takeaways worth highlighting\n\
         \n\
         Present the research as organized markdown notes."
    )
}

fn outline_prompt(topic: &str, research: &str, tone: Option<&str>, feedback: Option<&str>) -> String {
    let tone_line = tone
        .map(|t| format!("\nTone: {}\n", t))
        .unwrap_or_default();
    let feedback_block = feedback
        .map(|f| {
            format!(
                "\nA previous outline was rejected with this feedback, address it in the new outline:\n{}\n",
                f
            )
        })
        .unwrap_or_default();
    format!(
        "You are an expert content strategist and blog writer.\n\
         \n\
         Topic: {topic}\n{tone_line}\
         Research Data:\n{research}\n{feedback_block}\
         \n\
         Based on the topic and research data above, create a detailed blog post outline. The outline should:\n\
         - Have a compelling title\n\
         - Include an introduction section\n\
         - Have 3-5 main sections with descriptive headings\n\
         - Include a conclusion section\n\
         - Be structured and clear\n\
         \n\
         Provide the outline in markdown format."
    )
}

fn draft_prompt(topic: &str, outline: &str, tone: Option<&str>) -> String {
    let tone_line = tone
        .map(|t| format!("\nTone: {}\n", t))
        .unwrap_or_default();
    format!(
        "You are an expert blog writer.\n\
         \n\
         Topic: {topic}\n{tone_line}\
         Outline:\n{outline}\n\
         \n\
         Based on the topic and outline above, write a complete, engaging blog post. The blog post should:\n\
         - Follow the provided outline structure\n\
         - Be informative and well-researched\n\
         - Use a clear, professional writing style\n\
         - Be approximately 800-1200 words\n\
         - Include smooth transitions between sections\n\
         - Have a strong introduction and conclusion\n\
         \n\
         Write the complete blog post in markdown format."
    )
}

fn edit_prompt(draft: &str, tone: Option<&str>) -> String {
    let tone_line = format!("Target Tone: {}\n", tone.unwrap_or("professional"));
    format!(
        "You are an expert editor. Review the following blog post draft and improve it for grammar, clarity, flow, and tone consistency.\n\
         \n\
         {tone_line}\
         \n\
         Draft Content:\n{draft}\n\
         \n\
         Provide the output in the following JSON format:\n\
         {{\n\
             \"content\": \"The full edited content in markdown format\",\n\
             \"changes\": [\n\
                 \"List of specific major changes made (e.g., 'Fixed grammar in paragraph 2')\"\n\
             ]\n\
         }}\n\
         \n\
         Ensure the JSON is valid and the content is properly escaped. Do not include any markdown formatting around the JSON (like ```json)."
    )
}

fn seo_prompt(topic: &str, content: &str) -> String {
    format!(
        "You are an SEO specialist. Analyze the following blog post about \"{topic}\" and produce a concise report covering:\n\
         - Suggested title tag and meta description\n\
         - Primary and secondary keywords found in the text\n\
         - Readability observations\n\
         - 3-5 concrete improvement suggestions\n\
         \n\
         Content:\n{content}\n\
         \n\
         Write the report in markdown format."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Provider returning queued responses, recording every prompt.
    struct ScriptedProvider {
        responses: Mutex<Vec<Result<String, ()>>>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<Result<String, ()>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self::new(vec![Err(())])
        }

        async fn prompts(&self) -> Vec<String> {
            self.prompts.lock().await.clone()
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedProvider {
        async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().await.push(prompt.to_string());
            let mut responses = self.responses.lock().await;
            if responses.is_empty() {
                return Err(ProviderError::Empty);
            }
            responses.remove(0).map_err(|_| ProviderError::Api {
                status: 500,
                body: "scripted failure".to_string(),
            })
        }
    }

    fn dispatcher(provider: Arc<ScriptedProvider>) -> StageDispatcher {
        StageDispatcher::new(provider, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn idle_advances_without_a_generation_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut workflow = Workflow::new("topic".to_string(), None);
        let state = dispatcher(provider.clone())
            .dispatch(&mut workflow)
            .await
            .unwrap();
        assert_eq!(state, WorkflowState::Researching);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn researching_writes_research_and_moves_on() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("fasting research".to_string())]));
        let mut workflow = Workflow::new("Intermittent Fasting".to_string(), Some("professional".to_string()));
        workflow.transition_to(WorkflowState::Researching).unwrap();

        let state = dispatcher(provider.clone())
            .dispatch(&mut workflow)
            .await
            .unwrap();
        assert_eq!(state, WorkflowState::Outlining);
        assert_eq!(workflow.research_data.as_deref(), Some("fasting research"));
        let prompts = provider.prompts().await;
        assert!(prompts[0].contains("Intermittent Fasting"));
        assert!(prompts[0].contains("professional"));
    }

    #[tokio::test]
    async fn outlining_without_research_is_a_fatal_internal_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("unused".to_string())]));
        let mut workflow = Workflow::new("topic".to_string(), None);
        workflow.transition_to(WorkflowState::Researching).unwrap();
        workflow.state = WorkflowState::Outlining; // simulate corrupt load

        let err = dispatcher(provider.clone())
            .dispatch(&mut workflow)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::MissingStageInput {
                stage: WorkflowState::Outlining,
                field: "research_data",
            }
        ));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn outlining_includes_rejection_feedback() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok("better outline".to_string())]));
        let mut workflow = Workflow::new("topic".to_string(), None);
        workflow.transition_to(WorkflowState::Researching).unwrap();
        workflow.set_research("research notes".to_string());
        workflow.transition_to(WorkflowState::Outlining).unwrap();
        workflow.set_feedback("too shallow".to_string());

        dispatcher(provider.clone())
            .dispatch(&mut workflow)
            .await
            .unwrap();
        let prompts = provider.prompts().await;
        assert!(prompts[0].contains("too shallow"));
        assert_eq!(workflow.outline.as_deref(), Some("better outline"));
        assert_eq!(workflow.state, WorkflowState::WaitingApproval);
    }

    #[tokio::test]
    async fn editing_parses_structured_output() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            r#"```json
{"content": "polished draft", "changes": ["Fixed intro", "Tightened conclusion"]}
```"#
                .to_string(),
        )]));
        let mut workflow = workflow_in_editing();

        let state = dispatcher(provider)
            .dispatch(&mut workflow)
            .await
            .unwrap();
        assert_eq!(state, WorkflowState::Optimizing);
        assert_eq!(workflow.draft_content.as_deref(), Some("polished draft"));
    }

    #[tokio::test]
    async fn editing_falls_back_to_raw_text_on_malformed_json() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(
            "Here is your edited article, much improved.".to_string(),
        )]));
        let mut workflow = workflow_in_editing();

        let state = dispatcher(provider)
            .dispatch(&mut workflow)
            .await
            .unwrap();
        assert_eq!(state, WorkflowState::Optimizing);
        assert_eq!(
            workflow.draft_content.as_deref(),
            Some("Here is your edited article, much improved.")
        );
    }

    #[tokio::test]
    async fn provider_failure_leaves_the_workflow_untouched() {
        let provider = Arc::new(ScriptedProvider::failing());
        let mut workflow = workflow_in_editing();
        let before = workflow.clone();

        let err = dispatcher(provider)
            .dispatch(&mut workflow)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Generation { stage: WorkflowState::Editing, .. }));
        assert_eq!(workflow.state, before.state);
        assert_eq!(workflow.draft_content, before.draft_content);
        assert_eq!(workflow.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn final_is_an_idempotent_no_op() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut workflow = workflow_in_editing();
        workflow.state = WorkflowState::Final;
        let before = workflow.clone();

        let state = dispatcher(provider.clone())
            .dispatch(&mut workflow)
            .await
            .unwrap();
        assert_eq!(state, WorkflowState::Final);
        assert_eq!(workflow.updated_at, before.updated_at);
        assert_eq!(provider.call_count(), 0);
    }

    #[test]
    fn code_fence_stripping_handles_both_fence_styles() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    fn workflow_in_editing() -> Workflow {
        let mut workflow = Workflow::new("topic".to_string(), None);
        workflow.transition_to(WorkflowState::Researching).unwrap();
        workflow.set_research("research".to_string());
        workflow.transition_to(WorkflowState::Outlining).unwrap();
        workflow.set_outline("outline".to_string());
        workflow.transition_to(WorkflowState::WaitingApproval).unwrap();
        workflow.transition_to(WorkflowState::Drafting).unwrap();
        workflow.set_draft("rough draft".to_string());
        workflow.transition_to(WorkflowState::Editing).unwrap();
        workflow
    }
}
