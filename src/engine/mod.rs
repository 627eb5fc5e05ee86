//! Smart prompting engine — the root orchestrator.
//!
//! Drives the SmartPrompt lifecycle: three-tier proactive generation,
//! response processing, milestone celebrations, the scheduling sweep, and
//! the content-enhancement side pipeline.

pub mod engagement;
pub mod enhancement;

pub use enhancement::{
    LeafContentAnalysis, LeafEnhancementRequest, LeafEnhancementResult, LeafEnhancer,
    QualityTier,
};

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analyzer::{MessageAnalysis, ResponseAnalyzer};
use crate::config::EngineConfig;
use crate::context::state::Engagement;
use crate::context::{ContextManager, InteractionUpdate};
use crate::error::Result;
use crate::llm::{AiService, ProviderClient};
use crate::patterns::{templates, PersonalizedPromptingSystem};
use crate::prompt::{AiMetadata, PromptStatus, PromptType, SmartPrompt};
use crate::store::records::AnalysisRecord;
use crate::store::traits::Store;

/// What processing one user response produced.
#[derive(Debug, Clone)]
pub struct ResponseOutcome {
    pub analysis: MessageAnalysis,
    pub engagement: Engagement,
    pub follow_up: Option<SmartPrompt>,
}

/// Summary of one scheduling sweep.
#[derive(Debug, Clone, Default)]
pub struct ScheduleReport {
    pub considered: usize,
    pub skipped_pending: usize,
    pub skipped_recent: usize,
    pub generated: usize,
    pub failed: usize,
}

/// Root orchestrator over the store, analyzer, context, patterns, and
/// provider layers.
pub struct SmartPromptingEngine {
    store: Arc<dyn Store>,
    config: EngineConfig,
    analyzer: ResponseAnalyzer,
    context: ContextManager,
    patterns: PersonalizedPromptingSystem,
    ai: AiService,
    enhancer: LeafEnhancer,
    rng: Mutex<StdRng>,
}

impl SmartPromptingEngine {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Option<Arc<dyn ProviderClient>>,
        config: EngineConfig,
    ) -> Self {
        let context = ContextManager::new(store.clone(), config.clone());
        let patterns = PersonalizedPromptingSystem::new(store.clone(), config.clone());
        let ai = AiService::new(provider.clone(), config.prompt_history_cap);
        let enhancer = LeafEnhancer::new(provider);
        Self {
            store,
            config,
            analyzer: ResponseAnalyzer::new(),
            context,
            patterns,
            ai,
            enhancer,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic template/response selection, for tests.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self.context = self.context.with_rng_seed(seed);
        self.patterns = self.patterns.with_rng_seed(seed);
        self
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn patterns(&self) -> &PersonalizedPromptingSystem {
        &self.patterns
    }

    // ── Proactive generation ───────────────────────────────────────

    /// Generate and persist one proactive prompt for a (user, branch), or
    /// nothing when the gates say not now.
    ///
    /// Three-tier fallback: pattern-generated text when its confidence
    /// clears 0.6, else the static template bank driven through the
    /// provider, else a canned demo prompt. A prompt is always producible.
    pub async fn generate_proactive_prompt(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<Option<SmartPrompt>> {
        self.generate_proactive_prompt_at(user_id, branch_id, Utc::now())
            .await
    }

    pub async fn generate_proactive_prompt_at(
        &self,
        user_id: &str,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SmartPrompt>> {
        if !self
            .context
            .should_prompt_user_at(user_id, branch_id, now)
            .await?
        {
            debug!(user = user_id, branch = branch_id, "Prompt gated by conversation state");
            return Ok(None);
        }

        // One valid proactive prompt per user per branch, enforced here at
        // the scheduling gate rather than in storage.
        let pending = self.store.pending_prompts(user_id, branch_id).await?;
        if pending
            .iter()
            .any(|p| p.prompt_type.is_proactive() && p.is_open(now))
        {
            debug!(user = user_id, branch = branch_id, "Open prompt already exists");
            return Ok(None);
        }

        let personalized = self
            .patterns
            .generate_personalized_prompt_at(user_id, branch_id, now)
            .await?;

        let (content, prompt_type, suggested_responses, ai_metadata) =
            if personalized.confidence > 0.6 {
                debug!(
                    confidence = personalized.confidence,
                    "Using pattern-generated prompt"
                );
                (
                    personalized.content,
                    personalized.prompt_type,
                    personalized.suggested_responses,
                    AiMetadata {
                        provider: "patterns".into(),
                        model: "user-pattern-v1".into(),
                        confidence: personalized.confidence,
                        template: Some(personalized.template),
                    },
                )
            } else if self.ai.is_configured() {
                let bank = templates::templates_for(personalized.prompt_type);
                let seed = bank[self.pick(bank.len())];
                let ctx = self.context.get_ai_context_at(user_id, branch_id, now).await?;
                let hours = self
                    .context
                    .hours_since_last_interaction(user_id, branch_id, now)
                    .await?;
                let generated = self
                    .ai
                    .generate_prompt(branch_id, user_id, &ctx, hours, Some(seed))
                    .await?;
                (
                    generated.content,
                    generated.prompt_type,
                    canned_responses(generated.prompt_type),
                    AiMetadata {
                        provider: generated.provider,
                        model: generated.model,
                        confidence: generated.confidence,
                        template: None,
                    },
                )
            } else {
                let pick = self.pick(templates::DEMO_PROMPTS.len());
                (
                    templates::DEMO_PROMPTS[pick].to_string(),
                    PromptType::Checkin,
                    canned_responses(PromptType::Checkin),
                    AiMetadata {
                        provider: "demo".into(),
                        model: "canned".into(),
                        confidence: 0.4,
                        template: None,
                    },
                )
            };

        let prompt = SmartPrompt {
            id: Uuid::new_v4(),
            branch_id: branch_id.to_string(),
            user_id: user_id.to_string(),
            content,
            prompt_type,
            suggested_responses,
            ai_metadata,
            created_at: now,
            expires_at: now + self.config.response_timeout,
            status: PromptStatus::Pending,
        };

        self.store.insert_prompt(&prompt).await?;
        self.context
            .touch_interaction_at(user_id, branch_id, now)
            .await?;
        info!(
            user = user_id,
            branch = branch_id,
            prompt_type = prompt.prompt_type.as_str(),
            provider = %prompt.ai_metadata.provider,
            "Proactive prompt created"
        );
        Ok(Some(prompt))
    }

    // ── Response processing ────────────────────────────────────────

    /// Process a user's answer to a prompt. Missing or non-open prompts are
    /// a silent no-op: callers treat `None` as "nothing to do".
    pub async fn process_user_response(
        &self,
        prompt_id: Uuid,
        user_response: &str,
        user_id: &str,
        branch_id: &str,
    ) -> Result<Option<ResponseOutcome>> {
        self.process_user_response_at(prompt_id, user_response, user_id, branch_id, Utc::now())
            .await
    }

    pub async fn process_user_response_at(
        &self,
        prompt_id: Uuid,
        user_response: &str,
        user_id: &str,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ResponseOutcome>> {
        let Some(prompt) = self.store.get_prompt(prompt_id).await? else {
            debug!(%prompt_id, "Response for unknown prompt ignored");
            return Ok(None);
        };
        if !prompt.is_open(now) {
            debug!(%prompt_id, status = ?prompt.effective_status(now), "Response for closed prompt ignored");
            return Ok(None);
        }

        self.store
            .update_prompt_status(prompt.id, PromptStatus::Responded)
            .await?;

        let analysis = self.analyzer.analyze_message(user_response, &[]);
        let engagement = engagement::score_response(user_response, &analysis);

        // Telemetry write: log and move on if it fails.
        let record = AnalysisRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            branch_id: branch_id.to_string(),
            response_text: user_response.to_string(),
            analysis: analysis.clone(),
            created_at: now,
        };
        if let Err(e) = self.store.append_analysis(&record).await {
            warn!(error = %e, "Failed to store analysis record");
        }

        self.context
            .update_user_state_at(
                user_id,
                branch_id,
                InteractionUpdate {
                    prompt: prompt.content.clone(),
                    response: user_response.to_string(),
                    engagement,
                    topics: analysis.topics.clone(),
                },
                now,
            )
            .await?;

        let follow_up = if user_response.len() > self.config.follow_up_min_len
            && engagement != Engagement::Low
        {
            self.synthesize_follow_up(&prompt, user_response, user_id, branch_id, now)
                .await?
        } else {
            None
        };

        Ok(Some(ResponseOutcome {
            analysis,
            engagement,
            follow_up,
        }))
    }

    /// Build and persist a follow-up prompt. Provider failures degrade to
    /// "no follow-up" — the responding user never sees an error.
    async fn synthesize_follow_up(
        &self,
        prompt: &SmartPrompt,
        user_response: &str,
        user_id: &str,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SmartPrompt>> {
        let (content, ai_metadata) = if self.ai.is_configured() {
            let ctx = self.context.get_ai_context_at(user_id, branch_id, now).await?;
            match self
                .ai
                .process_user_response(branch_id, user_id, user_response, &ctx, prompt.prompt_type)
                .await
            {
                Ok(generated) => (
                    generated.content,
                    AiMetadata {
                        provider: generated.provider,
                        model: generated.model,
                        confidence: generated.confidence,
                        template: None,
                    },
                ),
                Err(e) => {
                    warn!(error = %e, "Follow-up generation failed, skipping");
                    return Ok(None);
                }
            }
        } else {
            let pick = self.pick(templates::CANNED_FOLLOWUPS.len());
            (
                templates::CANNED_FOLLOWUPS[pick].to_string(),
                AiMetadata {
                    provider: "demo".into(),
                    model: "canned".into(),
                    confidence: 0.4,
                    template: None,
                },
            )
        };

        let follow_up = SmartPrompt {
            id: Uuid::new_v4(),
            branch_id: branch_id.to_string(),
            user_id: user_id.to_string(),
            content,
            prompt_type: PromptType::Followup,
            suggested_responses: canned_responses(PromptType::Followup),
            ai_metadata,
            created_at: now,
            expires_at: now + self.config.response_timeout,
            status: PromptStatus::Pending,
        };
        self.store.insert_prompt(&follow_up).await?;
        Ok(Some(follow_up))
    }

    // ── Milestone celebrations ─────────────────────────────────────

    /// Scan the last 24h of branch content for milestones and create one
    /// celebration prompt per uncelebrated milestone. Idempotent: a second
    /// sweep over the same content creates nothing.
    pub async fn check_for_milestones(&self, branch_id: &str) -> Result<Vec<SmartPrompt>> {
        self.check_for_milestones_at(branch_id, Utc::now()).await
    }

    pub async fn check_for_milestones_at(
        &self,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SmartPrompt>> {
        let since = now - Duration::hours(24);
        let records = self.store.content_since(branch_id, since).await?;
        let mut created = Vec::new();

        for record in records {
            let Some(milestone) = record.milestone_type.clone() else {
                continue;
            };

            // Celebrated already? One prompt per milestone moment.
            match self
                .store
                .prompts_matching(
                    branch_id,
                    Some(&record.author_id),
                    PromptType::Celebration,
                    record.created_at,
                )
                .await
            {
                Ok(existing) if !existing.is_empty() => continue,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, content = %record.id, "Celebration lookup failed");
                    continue;
                }
            }

            let prompt = SmartPrompt {
                id: Uuid::new_v4(),
                branch_id: branch_id.to_string(),
                user_id: record.author_id.clone(),
                content: format!(
                    "🎉 A {} moment! Want to tell the whole story while it's fresh?",
                    milestone.replace('_', " ")
                ),
                prompt_type: PromptType::Celebration,
                suggested_responses: canned_responses(PromptType::Celebration),
                ai_metadata: AiMetadata {
                    provider: "patterns".into(),
                    model: "milestone-sweep".into(),
                    confidence: 0.9,
                    template: None,
                },
                created_at: now,
                expires_at: now + self.config.response_timeout,
                status: PromptStatus::Pending,
            };

            match self.store.insert_prompt(&prompt).await {
                Ok(()) => {
                    info!(branch = branch_id, author = %prompt.user_id, %milestone, "Celebration prompt created");
                    created.push(prompt);
                }
                Err(e) => warn!(error = %e, "Failed to persist celebration prompt"),
            }
        }

        Ok(created)
    }

    // ── Scheduling sweep ───────────────────────────────────────────

    /// Sweep all active branch memberships and prompt the quiet ones.
    ///
    /// Deliberately sequential — this path rations provider calls, unlike
    /// the concurrent leaf-enhancement batch. One member failing never
    /// aborts the sweep.
    pub async fn schedule_proactive_prompts(&self) -> Result<ScheduleReport> {
        self.schedule_proactive_prompts_at(Utc::now()).await
    }

    pub async fn schedule_proactive_prompts_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ScheduleReport> {
        let memberships = self.store.active_memberships().await?;
        let mut report = ScheduleReport {
            considered: memberships.len(),
            ..Default::default()
        };

        for member in memberships {
            let pending = match self
                .store
                .pending_prompts(&member.user_id, &member.branch_id)
                .await
            {
                Ok(pending) => pending,
                Err(e) => {
                    warn!(error = %e, user = %member.user_id, "Pending lookup failed");
                    report.failed += 1;
                    continue;
                }
            };
            if pending.iter().any(|p| p.is_open(now)) {
                report.skipped_pending += 1;
                continue;
            }

            let recent = match self
                .store
                .recent_content_by_author(&member.branch_id, &member.user_id, 1)
                .await
            {
                Ok(recent) => recent,
                Err(e) => {
                    warn!(error = %e, user = %member.user_id, "Content lookup failed");
                    report.failed += 1;
                    continue;
                }
            };
            if recent
                .first()
                .is_some_and(|c| now - c.created_at < Duration::days(self.config.quiet_days))
            {
                report.skipped_recent += 1;
                continue;
            }

            match self
                .generate_proactive_prompt_at(&member.user_id, &member.branch_id, now)
                .await
            {
                Ok(Some(_)) => report.generated += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, user = %member.user_id, branch = %member.branch_id, "Prompt generation failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            considered = report.considered,
            generated = report.generated,
            skipped_pending = report.skipped_pending,
            skipped_recent = report.skipped_recent,
            failed = report.failed,
            "Proactive scheduling sweep finished"
        );
        Ok(report)
    }

    // ── Lifecycle maintenance ──────────────────────────────────────

    /// Delete prompts past their expiry. Idempotent sweep, externally
    /// triggered.
    pub async fn cleanup_expired_prompts(&self) -> Result<usize> {
        self.cleanup_expired_prompts_at(Utc::now()).await
    }

    pub async fn cleanup_expired_prompts_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let deleted = self.store.delete_expired_prompts(now).await?;
        if deleted > 0 {
            info!(deleted, "Expired prompts removed");
        }
        Ok(deleted)
    }

    /// Dismiss an open prompt. Returns false when there was nothing to do.
    pub async fn dismiss_prompt(&self, prompt_id: Uuid) -> Result<bool> {
        self.dismiss_prompt_at(prompt_id, Utc::now()).await
    }

    pub async fn dismiss_prompt_at(&self, prompt_id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let Some(prompt) = self.store.get_prompt(prompt_id).await? else {
            return Ok(false);
        };
        if !prompt.is_open(now) {
            return Ok(false);
        }
        self.store
            .update_prompt_status(prompt_id, PromptStatus::Dismissed)
            .await?;
        Ok(true)
    }

    /// Open prompts for a user in a branch, expiry applied.
    pub async fn pending_prompts_for_user(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<Vec<SmartPrompt>> {
        self.pending_prompts_for_user_at(user_id, branch_id, Utc::now())
            .await
    }

    pub async fn pending_prompts_for_user_at(
        &self,
        user_id: &str,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SmartPrompt>> {
        let mut prompts = self.store.pending_prompts(user_id, branch_id).await?;
        prompts.retain(|p| p.is_open(now));
        Ok(prompts)
    }

    // ── Content enhancement ────────────────────────────────────────

    pub async fn enhance_leaf(&self, request: &LeafEnhancementRequest) -> LeafEnhancementResult {
        self.enhancer.enhance_leaf(request).await
    }

    /// Concurrent fan-out over a batch of leaves.
    pub async fn enhance_leaves_batch(
        &self,
        requests: &[LeafEnhancementRequest],
    ) -> Vec<LeafEnhancementResult> {
        self.enhancer.enhance_batch(requests).await
    }

    pub fn analyze_leaf_content(&self, content: &str) -> LeafContentAnalysis {
        self.enhancer.analyze_leaf_content(content)
    }

    fn pick(&self, len: usize) -> usize {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(0..len)
    }
}

fn canned_responses(prompt_type: PromptType) -> Vec<String> {
    templates::responses_for(prompt_type)
        .iter()
        .take(4)
        .map(|s| (*s).to_string())
        .collect()
}
