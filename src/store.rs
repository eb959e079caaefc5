// src/store.rs
//! Workflow store: durable keyed storage for workflow entities.
//!
//! `PgWorkflowStore` is the production backend. `MemoryWorkflowStore`
//! backs tests and DATABASE_URL-less runs; both honor the same contract:
//! get by id, get all ordered by creation time descending, idempotent
//! upsert by id.

use crate::errors::StoreError;
use crate::models::workflow::{ChatEntry, Workflow, WorkflowState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Workflow>, StoreError>;
    async fn get_all(&self) -> Result<Vec<Workflow>, StoreError>;
    /// Upsert by id. Saving the same entity state twice is a no-op.
    async fn save(&self, workflow: &Workflow) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

pub struct PgWorkflowStore {
    pool: PgPool,
}

impl PgWorkflowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct WorkflowRow {
    id: Uuid,
    topic: String,
    tone: Option<String>,
    state: String,
    research_data: Option<String>,
    outline: Option<String>,
    draft_content: Option<String>,
    seo_report: Option<String>,
    feedback: Option<String>,
    chat_history: Json<Vec<ChatEntry>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowRow {
    fn into_workflow(self) -> Result<Workflow, StoreError> {
        let state = WorkflowState::parse(&self.state).ok_or_else(|| StoreError::Corrupt {
            id: self.id,
            message: format!("unknown state '{}'", self.state),
        })?;
        Ok(Workflow {
            id: self.id,
            topic: self.topic,
            tone: self.tone,
            state,
            research_data: self.research_data,
            outline: self.outline,
            draft_content: self.draft_content,
            seo_report: self.seo_report,
            feedback: self.feedback,
            chat_history: self.chat_history.0,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, topic, tone, state, research_data, outline, \
     draft_content, seo_report, feedback, chat_history, created_at, updated_at";

#[async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn get(&self, id: Uuid) -> Result<Option<Workflow>, StoreError> {
        let query = format!("SELECT {} FROM workflows WHERE id = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, WorkflowRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkflowRow::into_workflow).transpose()
    }

    async fn get_all(&self) -> Result<Vec<Workflow>, StoreError> {
        let query = format!(
            "SELECT {} FROM workflows ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, WorkflowRow>(&query)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(WorkflowRow::into_workflow).collect()
    }

    async fn save(&self, workflow: &Workflow) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflows
                (id, topic, tone, state, research_data, outline, draft_content,
                 seo_report, feedback, chat_history, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (id) DO UPDATE SET
                topic = EXCLUDED.topic,
                tone = EXCLUDED.tone,
                state = EXCLUDED.state,
                research_data = EXCLUDED.research_data,
                outline = EXCLUDED.outline,
                draft_content = EXCLUDED.draft_content,
                seo_report = EXCLUDED.seo_report,
                feedback = EXCLUDED.feedback,
                chat_history = EXCLUDED.chat_history,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(workflow.id)
        .bind(&workflow.topic)
        .bind(&workflow.tone)
        .bind(workflow.state.as_str())
        .bind(&workflow.research_data)
        .bind(&workflow.outline)
        .bind(&workflow.draft_content)
        .bind(&workflow.seo_report)
        .bind(&workflow.feedback)
        .bind(Json(&workflow.chat_history))
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryWorkflowStore {
    workflows: Arc<RwLock<HashMap<Uuid, Workflow>>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn get(&self, id: Uuid) -> Result<Option<Workflow>, StoreError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(&id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<Workflow>, StoreError> {
        let workflows = self.workflows.read().await;
        let mut all: Vec<Workflow> = workflows.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn save(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_upsert_is_idempotent() {
        let store = MemoryWorkflowStore::new();
        let mut workflow = Workflow::new("topic".to_string(), None);
        store.save(&workflow).await.unwrap();
        store.save(&workflow).await.unwrap();
        assert_eq!(store.get_all().await.unwrap().len(), 1);

        workflow.set_research("notes".to_string());
        store.save(&workflow).await.unwrap();
        let loaded = store.get(workflow.id).await.unwrap().unwrap();
        assert_eq!(loaded.research_data.as_deref(), Some("notes"));
    }

    #[tokio::test]
    async fn memory_store_lists_newest_first() {
        let store = MemoryWorkflowStore::new();
        let mut first = Workflow::new("first".to_string(), None);
        let mut second = Workflow::new("second".to_string(), None);
        first.created_at = Utc::now() - chrono::Duration::minutes(5);
        second.created_at = Utc::now();
        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all[0].topic, "second");
        assert_eq!(all[1].topic, "first");
    }

    #[tokio::test]
    async fn memory_store_get_missing_is_none() {
        let store = MemoryWorkflowStore::new();
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }
}
