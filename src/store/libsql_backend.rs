//! libSQL backend — async `Store` implementation.
//!
//! Supports local file and in-memory databases. Complex nested values
//! (analysis payloads, conversation state, suggested responses) are stored
//! as JSON text columns; timestamps are RFC 3339 text.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Database as LibSqlDatabase};
use tracing::info;
use uuid::Uuid;

use crate::analyzer::MessageAnalysis;
use crate::context::state::ConversationState;
use crate::error::StoreError;
use crate::prompt::{AiMetadata, PromptStatus, PromptType, SmartPrompt};
use crate::store::migrations;
use crate::store::records::{AnalysisRecord, BranchInfo, ContentRecord, Membership, UserProfile};
use crate::store::traits::Store;

const PROMPT_COLUMNS: &str = "id, branch_id, user_id, content, prompt_type, \
     suggested_responses, ai_provider, ai_model, ai_confidence, ai_template, \
     created_at, expires_at, status";

/// libSQL database backend.
///
/// A single connection is reused for all operations; `libsql::Connection`
/// is safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("create database directory: {e}")))?;
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("open libSQL database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("create connection: {e}")))?;
        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("create connection: {e}")))?;
        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    // ── Seed helpers for app-owned tables ──────────────────────────
    // The engine reads these; the surrounding application writes them.

    pub async fn insert_content(&self, record: &ContentRecord) -> Result<(), StoreError> {
        let media = serde_json::to_string(&record.media_urls)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO content_records \
                 (id, branch_id, author_id, content, media_urls, milestone_type, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id.clone(),
                    record.branch_id.clone(),
                    record.author_id.clone(),
                    record.content.clone(),
                    media,
                    record.milestone_type.clone(),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_content: {e}")))?;
        Ok(())
    }

    pub async fn insert_branch(&self, branch: &BranchInfo) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO branches (id, tree_id, name) VALUES (?1, ?2, ?3)",
                params![branch.id.clone(), branch.tree_id.clone(), branch.name.clone()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_branch: {e}")))?;
        Ok(())
    }

    pub async fn insert_user(&self, user: &UserProfile) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO users (id, display_name) VALUES (?1, ?2)",
                params![user.id.clone(), user.display_name.clone()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_user: {e}")))?;
        Ok(())
    }

    pub async fn insert_membership(&self, membership: &Membership) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO branch_members (branch_id, user_id, active) \
                 VALUES (?1, ?2, ?3)",
                params![
                    membership.branch_id.clone(),
                    membership.user_id.clone(),
                    membership.active as i64,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_membership: {e}")))?;
        Ok(())
    }
}

// ── Row mapping helpers ─────────────────────────────────────────────

/// Parse an RFC 3339 timestamp, falling back to the epoch floor.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn row_to_prompt(row: &libsql::Row) -> Result<SmartPrompt, StoreError> {
    let id_str: String = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
    let branch_id: String = row.get(1).map_err(|e| StoreError::Query(e.to_string()))?;
    let user_id: String = row.get(2).map_err(|e| StoreError::Query(e.to_string()))?;
    let content: String = row.get(3).map_err(|e| StoreError::Query(e.to_string()))?;
    let type_str: String = row.get(4).map_err(|e| StoreError::Query(e.to_string()))?;
    let suggested_str: String = row.get(5).map_err(|e| StoreError::Query(e.to_string()))?;
    let ai_provider: String = row.get(6).map_err(|e| StoreError::Query(e.to_string()))?;
    let ai_model: String = row.get(7).map_err(|e| StoreError::Query(e.to_string()))?;
    let ai_confidence: f64 = row.get(8).map_err(|e| StoreError::Query(e.to_string()))?;
    let ai_template: Option<String> = row.get(9).ok();
    let created_str: String = row.get(10).map_err(|e| StoreError::Query(e.to_string()))?;
    let expires_str: String = row.get(11).map_err(|e| StoreError::Query(e.to_string()))?;
    let status_str: String = row.get(12).map_err(|e| StoreError::Query(e.to_string()))?;

    Ok(SmartPrompt {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| StoreError::Serialization(format!("prompt id: {e}")))?,
        branch_id,
        user_id,
        content,
        prompt_type: PromptType::parse(&type_str).ok_or_else(|| {
            StoreError::Serialization(format!("unknown prompt type: {type_str}"))
        })?,
        suggested_responses: serde_json::from_str(&suggested_str)
            .map_err(|e| StoreError::Serialization(format!("suggested_responses: {e}")))?,
        ai_metadata: AiMetadata {
            provider: ai_provider,
            model: ai_model,
            confidence: ai_confidence as f32,
            template: ai_template,
        },
        created_at: parse_datetime(&created_str),
        expires_at: parse_datetime(&expires_str),
        status: PromptStatus::parse(&status_str).unwrap_or(PromptStatus::Pending),
    })
}

fn row_to_analysis(row: &libsql::Row) -> Result<AnalysisRecord, StoreError> {
    let id_str: String = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
    let user_id: String = row.get(1).map_err(|e| StoreError::Query(e.to_string()))?;
    let branch_id: String = row.get(2).map_err(|e| StoreError::Query(e.to_string()))?;
    let response_text: String = row.get(3).map_err(|e| StoreError::Query(e.to_string()))?;
    let analysis_str: String = row.get(4).map_err(|e| StoreError::Query(e.to_string()))?;
    let created_str: String = row.get(5).map_err(|e| StoreError::Query(e.to_string()))?;

    let analysis: MessageAnalysis = serde_json::from_str(&analysis_str)
        .map_err(|e| StoreError::Serialization(format!("analysis payload: {e}")))?;

    Ok(AnalysisRecord {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| StoreError::Serialization(format!("analysis id: {e}")))?,
        user_id,
        branch_id,
        response_text,
        analysis,
        created_at: parse_datetime(&created_str),
    })
}

fn row_to_content(row: &libsql::Row) -> Result<ContentRecord, StoreError> {
    let id: String = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
    let branch_id: String = row.get(1).map_err(|e| StoreError::Query(e.to_string()))?;
    let author_id: String = row.get(2).map_err(|e| StoreError::Query(e.to_string()))?;
    let content: String = row.get(3).map_err(|e| StoreError::Query(e.to_string()))?;
    let media_str: String = row.get(4).map_err(|e| StoreError::Query(e.to_string()))?;
    let milestone_type: Option<String> = row.get(5).ok();
    let created_str: String = row.get(6).map_err(|e| StoreError::Query(e.to_string()))?;

    Ok(ContentRecord {
        id,
        branch_id,
        author_id,
        content,
        media_urls: serde_json::from_str(&media_str)
            .map_err(|e| StoreError::Serialization(format!("media_urls: {e}")))?,
        milestone_type,
        created_at: parse_datetime(&created_str),
    })
}

#[async_trait]
impl Store for LibSqlBackend {
    async fn append_analysis(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let analysis = serde_json::to_string(&record.analysis)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO analysis_records \
                 (id, user_id, branch_id, response_text, analysis, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id.to_string(),
                    record.user_id.clone(),
                    record.branch_id.clone(),
                    record.response_text.clone(),
                    analysis,
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("append_analysis: {e}")))?;
        Ok(())
    }

    async fn recent_analyses(
        &self,
        user_id: &str,
        branch_id: &str,
        limit: usize,
    ) -> Result<Vec<AnalysisRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, branch_id, response_text, analysis, created_at \
                 FROM analysis_records WHERE user_id = ?1 AND branch_id = ?2 \
                 ORDER BY created_at DESC LIMIT ?3",
                params![user_id, branch_id, limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("recent_analyses: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_analysis(&row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping analysis row: {e}"),
            }
        }
        Ok(records)
    }

    async fn get_conversation_state(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<Option<ConversationState>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT state FROM conversation_states WHERE user_id = ?1 AND branch_id = ?2",
                params![user_id, branch_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_conversation_state: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let state_str: String =
                    row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
                let state = serde_json::from_str(&state_str)
                    .map_err(|e| StoreError::Serialization(format!("state payload: {e}")))?;
                Ok(Some(state))
            }
            _ => Ok(None),
        }
    }

    async fn upsert_conversation_state(
        &self,
        state: &ConversationState,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn
            .execute(
                "INSERT INTO conversation_states (user_id, branch_id, state, updated_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (user_id, branch_id) \
                 DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
                params![
                    state.user_id.clone(),
                    state.branch_id.clone(),
                    payload,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("upsert_conversation_state: {e}")))?;
        Ok(())
    }

    async fn insert_prompt(&self, prompt: &SmartPrompt) -> Result<(), StoreError> {
        let suggested = serde_json::to_string(&prompt.suggested_responses)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO smart_prompts ({PROMPT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    prompt.id.to_string(),
                    prompt.branch_id.clone(),
                    prompt.user_id.clone(),
                    prompt.content.clone(),
                    prompt.prompt_type.as_str(),
                    suggested,
                    prompt.ai_metadata.provider.clone(),
                    prompt.ai_metadata.model.clone(),
                    prompt.ai_metadata.confidence as f64,
                    prompt.ai_metadata.template.clone(),
                    prompt.created_at.to_rfc3339(),
                    prompt.expires_at.to_rfc3339(),
                    prompt.status.as_str(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_prompt: {e}")))?;
        Ok(())
    }

    async fn get_prompt(&self, id: Uuid) -> Result<Option<SmartPrompt>, StoreError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {PROMPT_COLUMNS} FROM smart_prompts WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_prompt: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_prompt(&row)?)),
            _ => Ok(None),
        }
    }

    async fn update_prompt_status(
        &self,
        id: Uuid,
        status: PromptStatus,
    ) -> Result<(), StoreError> {
        let affected = self
            .conn
            .execute(
                "UPDATE smart_prompts SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_prompt_status: {e}")))?;
        if affected == 0 {
            return Err(StoreError::NotFound {
                entity: "smart_prompt".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn pending_prompts(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<Vec<SmartPrompt>, StoreError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {PROMPT_COLUMNS} FROM smart_prompts \
                     WHERE user_id = ?1 AND branch_id = ?2 AND status = 'pending' \
                     ORDER BY created_at ASC"
                ),
                params![user_id, branch_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("pending_prompts: {e}")))?;

        let mut prompts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_prompt(&row) {
                Ok(prompt) => prompts.push(prompt),
                Err(e) => tracing::warn!("Skipping prompt row: {e}"),
            }
        }
        Ok(prompts)
    }

    async fn prompts_matching(
        &self,
        branch_id: &str,
        user_id: Option<&str>,
        prompt_type: PromptType,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<SmartPrompt>, StoreError> {
        let sql = format!(
            "SELECT {PROMPT_COLUMNS} FROM smart_prompts \
             WHERE branch_id = ?1 AND prompt_type = ?2 AND created_at > ?3 \
             AND (?4 IS NULL OR user_id = ?4)"
        );
        let mut rows = self
            .conn
            .query(
                &sql,
                params![
                    branch_id,
                    prompt_type.as_str(),
                    created_after.to_rfc3339(),
                    user_id.map(|u| u.to_string()),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("prompts_matching: {e}")))?;

        let mut prompts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_prompt(&row) {
                Ok(prompt) => prompts.push(prompt),
                Err(e) => tracing::warn!("Skipping prompt row: {e}"),
            }
        }
        Ok(prompts)
    }

    async fn delete_expired_prompts(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let affected = self
            .conn
            .execute(
                "DELETE FROM smart_prompts WHERE expires_at <= ?1",
                params![now.to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("delete_expired_prompts: {e}")))?;
        Ok(affected as usize)
    }

    async fn recent_content(
        &self,
        branch_id: &str,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, branch_id, author_id, content, media_urls, milestone_type, created_at \
                 FROM content_records WHERE branch_id = ?1 \
                 ORDER BY created_at DESC LIMIT ?2",
                params![branch_id, limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("recent_content: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_content(&row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping content row: {e}"),
            }
        }
        Ok(records)
    }

    async fn recent_content_by_author(
        &self,
        branch_id: &str,
        author_id: &str,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, branch_id, author_id, content, media_urls, milestone_type, created_at \
                 FROM content_records WHERE branch_id = ?1 AND author_id = ?2 \
                 ORDER BY created_at DESC LIMIT ?3",
                params![branch_id, author_id, limit as i64],
            )
            .await
            .map_err(|e| StoreError::Query(format!("recent_content_by_author: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_content(&row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping content row: {e}"),
            }
        }
        Ok(records)
    }

    async fn content_since(
        &self,
        branch_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, branch_id, author_id, content, media_urls, milestone_type, created_at \
                 FROM content_records WHERE branch_id = ?1 AND created_at >= ?2 \
                 ORDER BY created_at DESC",
                params![branch_id, since.to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("content_since: {e}")))?;

        let mut records = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_content(&row) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping content row: {e}"),
            }
        }
        Ok(records)
    }

    async fn active_memberships(&self) -> Result<Vec<Membership>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT branch_id, user_id, active FROM branch_members WHERE active = 1",
                (),
            )
            .await
            .map_err(|e| StoreError::Query(format!("active_memberships: {e}")))?;

        let mut memberships = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let branch_id: String = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
            let user_id: String = row.get(1).map_err(|e| StoreError::Query(e.to_string()))?;
            let active: i64 = row.get(2).map_err(|e| StoreError::Query(e.to_string()))?;
            memberships.push(Membership {
                branch_id,
                user_id,
                active: active != 0,
            });
        }
        Ok(memberships)
    }

    async fn get_branch(&self, branch_id: &str) -> Result<Option<BranchInfo>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, tree_id, name FROM branches WHERE id = ?1",
                params![branch_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_branch: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let id: String = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
                let tree_id: String = row.get(1).map_err(|e| StoreError::Query(e.to_string()))?;
                let name: String = row.get(2).map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(Some(BranchInfo { id, tree_id, name }))
            }
            _ => Ok(None),
        }
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, display_name FROM users WHERE id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let id: String = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
                let display_name: String =
                    row.get(1).map_err(|e| StoreError::Query(e.to_string()))?;
                Ok(Some(UserProfile { id, display_name }))
            }
            _ => Ok(None),
        }
    }
}
