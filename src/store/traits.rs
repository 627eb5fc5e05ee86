//! Unified `Store` trait — the engine's single async persistence interface.
//!
//! Collections: analysis records (append-only), conversation states (upsert,
//! one per user+branch), smart prompts (insert / update / delete-by-predicate),
//! content records and branch memberships (read-only). The store is the sole
//! source of truth; every in-memory cache above it is disposable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::context::state::ConversationState;
use crate::error::StoreError;
use crate::prompt::{PromptStatus, PromptType, SmartPrompt};
use crate::store::records::{AnalysisRecord, BranchInfo, ContentRecord, Membership, UserProfile};

/// Backend-agnostic durable store.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Analysis records (append-only) ─────────────────────────────

    /// Append one analysis record. Best-effort telemetry for callers.
    async fn append_analysis(&self, record: &AnalysisRecord) -> Result<(), StoreError>;

    /// Latest analysis records for a (user, branch), newest first.
    async fn recent_analyses(
        &self,
        user_id: &str,
        branch_id: &str,
        limit: usize,
    ) -> Result<Vec<AnalysisRecord>, StoreError>;

    // ── Conversation states ────────────────────────────────────────

    async fn get_conversation_state(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<Option<ConversationState>, StoreError>;

    /// Replace the whole state for its (user, branch) key.
    async fn upsert_conversation_state(&self, state: &ConversationState)
        -> Result<(), StoreError>;

    // ── Smart prompts ──────────────────────────────────────────────

    async fn insert_prompt(&self, prompt: &SmartPrompt) -> Result<(), StoreError>;

    async fn get_prompt(&self, id: Uuid) -> Result<Option<SmartPrompt>, StoreError>;

    async fn update_prompt_status(&self, id: Uuid, status: PromptStatus)
        -> Result<(), StoreError>;

    /// Prompts with stored status `pending` for a (user, branch). Callers
    /// apply expiry themselves via `SmartPrompt::effective_status`.
    async fn pending_prompts(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<Vec<SmartPrompt>, StoreError>;

    /// Prompts of one type in a branch created after `created_after`,
    /// optionally narrowed to one user.
    async fn prompts_matching(
        &self,
        branch_id: &str,
        user_id: Option<&str>,
        prompt_type: PromptType,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<SmartPrompt>, StoreError>;

    /// Delete prompts whose `expires_at` is at or before `now`.
    /// Returns the number deleted. Idempotent.
    async fn delete_expired_prompts(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    // ── Content records (read-only) ────────────────────────────────

    /// Latest leaves in a branch, newest first.
    async fn recent_content(
        &self,
        branch_id: &str,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StoreError>;

    /// Latest leaves by one author in a branch, newest first.
    async fn recent_content_by_author(
        &self,
        branch_id: &str,
        author_id: &str,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StoreError>;

    /// Leaves in a branch created at or after `since`, newest first.
    async fn content_since(
        &self,
        branch_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ContentRecord>, StoreError>;

    // ── Memberships and metadata (read-only) ───────────────────────

    async fn active_memberships(&self) -> Result<Vec<Membership>, StoreError>;

    async fn get_branch(&self, branch_id: &str) -> Result<Option<BranchInfo>, StoreError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;
}
