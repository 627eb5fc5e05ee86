//! In-memory `Store` backend.
//!
//! Reference implementation used by tests and demo wiring. Everything lives
//! behind one `RwLock`; writes are atomic per call, matching the
//! last-writer-wins semantics the engine assumes of any backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::context::state::ConversationState;
use crate::error::StoreError;
use crate::prompt::{PromptStatus, PromptType, SmartPrompt};
use crate::store::records::{AnalysisRecord, BranchInfo, ContentRecord, Membership, UserProfile};
use crate::store::traits::Store;

#[derive(Default)]
struct Inner {
    analyses: Vec<AnalysisRecord>,
    states: HashMap<(String, String), ConversationState>,
    prompts: HashMap<Uuid, SmartPrompt>,
    content: Vec<ContentRecord>,
    memberships: Vec<Membership>,
    branches: HashMap<String, BranchInfo>,
    users: HashMap<String, UserProfile>,
}

/// HashMap-backed store.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Seed helpers for data the engine itself never writes.

    pub async fn add_content(&self, record: ContentRecord) {
        self.inner.write().await.content.push(record);
    }

    pub async fn add_branch(&self, branch: BranchInfo) {
        self.inner.write().await.branches.insert(branch.id.clone(), branch);
    }

    pub async fn add_user(&self, user: UserProfile) {
        self.inner.write().await.users.insert(user.id.clone(), user);
    }

    pub async fn add_membership(&self, membership: Membership) {
        self.inner.write().await.memberships.push(membership);
    }

    /// All stored prompts, unordered. Test visibility helper.
    pub async fn all_prompts(&self) -> Vec<SmartPrompt> {
        self.inner.read().await.prompts.values().cloned().collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append_analysis(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        self.inner.write().await.analyses.push(record.clone());
        Ok(())
    }

    async fn recent_analyses(
        &self,
        user_id: &str,
        branch_id: &str,
        limit: usize,
    ) -> Result<Vec<AnalysisRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut records: Vec<AnalysisRecord> = inner
            .analyses
            .iter()
            .filter(|r| r.user_id == user_id && r.branch_id == branch_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn get_conversation_state(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<Option<ConversationState>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .states
            .get(&(user_id.to_string(), branch_id.to_string()))
            .cloned())
    }

    async fn upsert_conversation_state(
        &self,
        state: &ConversationState,
    ) -> Result<(), StoreError> {
        self.inner.write().await.states.insert(
            (state.user_id.clone(), state.branch_id.clone()),
            state.clone(),
        );
        Ok(())
    }

    async fn insert_prompt(&self, prompt: &SmartPrompt) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .prompts
            .insert(prompt.id, prompt.clone());
        Ok(())
    }

    async fn get_prompt(&self, id: Uuid) -> Result<Option<SmartPrompt>, StoreError> {
        Ok(self.inner.read().await.prompts.get(&id).cloned())
    }

    async fn update_prompt_status(
        &self,
        id: Uuid,
        status: PromptStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let prompt = inner.prompts.get_mut(&id).ok_or_else(|| StoreError::NotFound {
            entity: "smart_prompt".into(),
            id: id.to_string(),
        })?;
        prompt.status = status;
        Ok(())
    }

    async fn pending_prompts(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<Vec<SmartPrompt>, StoreError> {
        let inner = self.inner.read().await;
        let mut prompts: Vec<SmartPrompt> = inner
            .prompts
            .values()
            .filter(|p| {
                p.user_id == user_id
                    && p.branch_id == branch_id
                    && p.status == PromptStatus::Pending
            })
            .cloned()
            .collect();
        prompts.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(prompts)
    }

    async fn prompts_matching(
        &self,
        branch_id: &str,
        user_id: Option<&str>,
        prompt_type: PromptType,
        created_after: DateTime<Utc>,
    ) -> Result<Vec<SmartPrompt>, StoreError> {
        let inner = self.inner.read().await;
        let prompts = inner
            .prompts
            .values()
            .filter(|p| {
                p.branch_id == branch_id
                    && p.prompt_type == prompt_type
                    && p.created_at > created_after
                    && user_id.is_none_or(|u| p.user_id == u)
            })
            .cloned()
            .collect();
        Ok(prompts)
    }

    async fn delete_expired_prompts(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.prompts.len();
        inner.prompts.retain(|_, p| p.expires_at > now);
        Ok(before - inner.prompts.len())
    }

    async fn recent_content(
        &self,
        branch_id: &str,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut records: Vec<ContentRecord> = inner
            .content
            .iter()
            .filter(|c| c.branch_id == branch_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn recent_content_by_author(
        &self,
        branch_id: &str,
        author_id: &str,
        limit: usize,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut records: Vec<ContentRecord> = inner
            .content
            .iter()
            .filter(|c| c.branch_id == branch_id && c.author_id == author_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn content_since(
        &self,
        branch_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut records: Vec<ContentRecord> = inner
            .content
            .iter()
            .filter(|c| c.branch_id == branch_id && c.created_at >= since)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn active_memberships(&self) -> Result<Vec<Membership>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .memberships
            .iter()
            .filter(|m| m.active)
            .cloned()
            .collect())
    }

    async fn get_branch(&self, branch_id: &str) -> Result<Option<BranchInfo>, StoreError> {
        Ok(self.inner.read().await.branches.get(branch_id).cloned())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.inner.read().await.users.get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ResponseAnalyzer;
    use chrono::Duration;

    fn analysis_record(user: &str, branch: &str, text: &str, at: DateTime<Utc>) -> AnalysisRecord {
        AnalysisRecord {
            id: Uuid::new_v4(),
            user_id: user.into(),
            branch_id: branch.into(),
            response_text: text.into(),
            analysis: ResponseAnalyzer::new().analyze_message(text, &[]),
            created_at: at,
        }
    }

    fn test_prompt(user: &str, branch: &str, expires_in: Duration) -> SmartPrompt {
        let now = Utc::now();
        SmartPrompt {
            id: Uuid::new_v4(),
            branch_id: branch.into(),
            user_id: user.into(),
            content: "test".into(),
            prompt_type: PromptType::Checkin,
            suggested_responses: vec![],
            ai_metadata: crate::prompt::AiMetadata {
                provider: "demo".into(),
                model: "canned".into(),
                confidence: 0.5,
                template: None,
            },
            created_at: now,
            expires_at: now + expires_in,
            status: PromptStatus::Pending,
        }
    }

    #[tokio::test]
    async fn analyses_are_newest_first_and_limited() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for i in 0..5 {
            store
                .append_analysis(&analysis_record(
                    "u",
                    "b",
                    &format!("msg {i}"),
                    now - Duration::hours(i),
                ))
                .await
                .unwrap();
        }
        let records = store.recent_analyses("u", "b", 3).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].response_text, "msg 0");
        assert_eq!(records[2].response_text, "msg 2");
    }

    #[tokio::test]
    async fn conversation_state_upsert_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get_conversation_state("u", "b").await.unwrap().is_none());

        let state = ConversationState::new("u", "b", Utc::now());
        store.upsert_conversation_state(&state).await.unwrap();
        let loaded = store.get_conversation_state("u", "b").await.unwrap().unwrap();
        assert_eq!(loaded.user_id, "u");
    }

    #[tokio::test]
    async fn prompt_lifecycle_and_expiry_sweep() {
        let store = MemoryStore::new();
        let open = test_prompt("u", "b", Duration::hours(48));
        let lapsed = test_prompt("u", "b", Duration::hours(-1));
        store.insert_prompt(&open).await.unwrap();
        store.insert_prompt(&lapsed).await.unwrap();

        assert_eq!(store.pending_prompts("u", "b").await.unwrap().len(), 2);

        let deleted = store.delete_expired_prompts(Utc::now()).await.unwrap();
        assert_eq!(deleted, 1);
        // Sweep is idempotent.
        assert_eq!(store.delete_expired_prompts(Utc::now()).await.unwrap(), 0);

        store
            .update_prompt_status(open.id, PromptStatus::Responded)
            .await
            .unwrap();
        assert!(store.pending_prompts("u", "b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn prompts_matching_filters_type_user_and_time() {
        let store = MemoryStore::new();
        let mut celebration = test_prompt("u1", "b", Duration::hours(48));
        celebration.prompt_type = PromptType::Celebration;
        store.insert_prompt(&celebration).await.unwrap();

        let since = Utc::now() - Duration::hours(1);
        let hits = store
            .prompts_matching("b", Some("u1"), PromptType::Celebration, since)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = store
            .prompts_matching("b", Some("u2"), PromptType::Celebration, since)
            .await
            .unwrap();
        assert!(misses.is_empty());

        let too_late = store
            .prompts_matching("b", None, PromptType::Celebration, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert!(too_late.is_empty());
    }

    #[tokio::test]
    async fn memberships_filter_inactive() {
        let store = MemoryStore::new();
        store
            .add_membership(Membership {
                branch_id: "b".into(),
                user_id: "u1".into(),
                active: true,
            })
            .await;
        store
            .add_membership(Membership {
                branch_id: "b".into(),
                user_id: "u2".into(),
                active: false,
            })
            .await;
        let active = store.active_memberships().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].user_id, "u1");
    }
}
