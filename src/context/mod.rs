//! Conversation context — per-(user, branch) state machine, preference
//! learning, and prompt-eligibility gating.

pub mod state;

use std::sync::Arc;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use tracing::debug;

use crate::cache::TtlCache;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::store::records::{BranchInfo, ContentRecord, UserProfile};
use crate::store::traits::Store;
use state::{
    ConversationPhase, ConversationState, Engagement, PromptStyle, ResponseRecord,
    UserPreferences,
};

/// Coarse time-of-day bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => Self::Morning,
            12..=17 => Self::Afternoon,
            18..=22 => Self::Evening,
            _ => Self::Night,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::Night => "night",
        }
    }
}

/// Calendar season, northern-hemisphere months.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Autumn,
            _ => Self::Winter,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Winter => "winter",
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Autumn => "autumn",
        }
    }
}

/// The "when" of a prompting decision.
#[derive(Debug, Clone, Copy)]
pub struct TimeContext {
    pub hour: u32,
    pub bucket: TimeOfDay,
    pub weekday: Weekday,
    pub season: Season,
}

impl TimeContext {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            hour: now.hour(),
            bucket: TimeOfDay::from_hour(now.hour()),
            weekday: now.weekday(),
            season: Season::from_month(now.month()),
        }
    }
}

/// Read-only context assembled for prompt generation.
#[derive(Debug, Clone)]
pub struct AiContext {
    pub branch: Option<BranchInfo>,
    pub user: Option<UserProfile>,
    /// Latest branch content, newest first.
    pub recent_content: Vec<ContentRecord>,
    pub preferences: Option<UserPreferences>,
    pub time: TimeContext,
}

impl AiContext {
    pub fn user_name(&self) -> &str {
        self.user.as_ref().map(|u| u.display_name.as_str()).unwrap_or("there")
    }
}

/// One processed prompt/response exchange fed back into the state.
#[derive(Debug, Clone)]
pub struct InteractionUpdate {
    pub prompt: String,
    pub response: String,
    pub engagement: Engagement,
    /// Topics observed in the response, accumulated into preferences.
    pub topics: Vec<String>,
}

/// Generic prompts used when no branch context exists.
const GENERIC_PROMPTS: [&str; 4] = [
    "What made you smile today?",
    "Share a photo from this week!",
    "What's something new your family tried recently?",
    "Any little moments worth remembering from today?",
];

/// Per-(user, branch) conversation state machine and gating.
pub struct ContextManager {
    store: Arc<dyn Store>,
    config: EngineConfig,
    /// Process-local shortcut over the store; safe to clear at any time.
    states: TtlCache<(String, String), ConversationState>,
    rng: Mutex<StdRng>,
}

impl ContextManager {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        let states = TtlCache::new(config.state_cache_ttl);
        Self {
            store,
            config,
            states,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic template/line selection, for tests.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Drop cached state for one conversation.
    pub async fn invalidate(&self, user_id: &str, branch_id: &str) {
        self.states
            .invalidate(&(user_id.to_string(), branch_id.to_string()))
            .await;
    }

    /// Cached-or-stored conversation state.
    pub async fn get_state(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<Option<ConversationState>> {
        let key = (user_id.to_string(), branch_id.to_string());
        if let Some(state) = self.states.get(&key).await {
            return Ok(Some(state));
        }
        let state = self.store.get_conversation_state(user_id, branch_id).await?;
        if let Some(ref s) = state {
            self.states.set(key, s.clone()).await;
        }
        Ok(state)
    }

    /// Fold one exchange into the state: ring buffer, style heuristics,
    /// topic accumulation, phase recomputation, then a whole-state upsert.
    pub async fn update_user_state(
        &self,
        user_id: &str,
        branch_id: &str,
        update: InteractionUpdate,
    ) -> Result<ConversationState> {
        self.update_user_state_at(user_id, branch_id, update, Utc::now())
            .await
    }

    pub async fn update_user_state_at(
        &self,
        user_id: &str,
        branch_id: &str,
        update: InteractionUpdate,
        now: DateTime<Utc>,
    ) -> Result<ConversationState> {
        let mut state = self
            .get_state(user_id, branch_id)
            .await?
            .unwrap_or_else(|| ConversationState::new(user_id, branch_id, now));

        state.push_response(
            ResponseRecord {
                prompt: update.prompt,
                response: update.response.clone(),
                engagement: update.engagement,
                recorded_at: now,
            },
            self.config.response_history_cap,
        );

        // A short, flat response means the current voice isn't landing.
        if update.engagement == Engagement::Low && update.response.len() < 20 {
            state.preferences.prompt_style = match state.preferences.prompt_style {
                PromptStyle::Casual => PromptStyle::Playful,
                PromptStyle::Playful => PromptStyle::Casual,
                PromptStyle::Formal => PromptStyle::Casual,
            };
            debug!(
                user = user_id,
                style = ?state.preferences.prompt_style,
                "Adjusted prompt style after low engagement"
            );
        }

        for topic in update.topics {
            state.push_topic(topic, self.config.preferred_topics_cap);
        }

        state.last_interaction = now;
        state.conversation_phase =
            ConversationPhase::derive(state.response_history.len(), state.last_interaction, now);

        self.store.upsert_conversation_state(&state).await?;
        self.states
            .set((user_id.to_string(), branch_id.to_string()), state.clone())
            .await;
        Ok(state)
    }

    /// Record that the engine reached out, without logging an exchange.
    /// Resets the reminder-frequency clock so the user isn't re-prompted
    /// inside their threshold window.
    pub async fn touch_interaction_at(
        &self,
        user_id: &str,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self
            .get_state(user_id, branch_id)
            .await?
            .unwrap_or_else(|| ConversationState::new(user_id, branch_id, now));
        state.last_interaction = now;
        state.conversation_phase =
            ConversationPhase::derive(state.response_history.len(), state.last_interaction, now);
        self.store.upsert_conversation_state(&state).await?;
        self.states
            .set((user_id.to_string(), branch_id.to_string()), state)
            .await;
        Ok(())
    }

    /// Whether this user should receive a proactive prompt right now.
    ///
    /// Unknown users always pass; known users must clear both the
    /// reminder-frequency threshold and their preferred time window.
    pub async fn should_prompt_user(&self, user_id: &str, branch_id: &str) -> Result<bool> {
        self.should_prompt_user_at(user_id, branch_id, Utc::now())
            .await
    }

    pub async fn should_prompt_user_at(
        &self,
        user_id: &str,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(state) = self.get_state(user_id, branch_id).await? else {
            return Ok(true);
        };

        let hours_since = now
            .signed_duration_since(state.last_interaction)
            .num_hours();
        if hours_since < state.preferences.reminder_frequency.threshold_hours() {
            return Ok(false);
        }

        Ok(state
            .preferences
            .best_time_for_prompts
            .contains_hour(now.hour()))
    }

    /// Read-only context for prompt generation.
    pub async fn get_ai_context(&self, user_id: &str, branch_id: &str) -> Result<AiContext> {
        self.get_ai_context_at(user_id, branch_id, Utc::now()).await
    }

    pub async fn get_ai_context_at(
        &self,
        user_id: &str,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AiContext> {
        let branch = self.store.get_branch(branch_id).await?;
        let user = self.store.get_user(user_id).await?;
        let recent_content = self.store.recent_content(branch_id, 10).await?;
        let preferences = self
            .get_state(user_id, branch_id)
            .await?
            .map(|s| s.preferences);

        Ok(AiContext {
            branch,
            user,
            recent_content,
            preferences,
            time: TimeContext::at(now),
        })
    }

    /// Non-learned fallback prompt lines, derived from branch context alone.
    pub async fn get_personalized_prompts(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<Vec<String>> {
        self.get_personalized_prompts_at(user_id, branch_id, Utc::now())
            .await
    }

    pub async fn get_personalized_prompts_at(
        &self,
        user_id: &str,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let ctx = self.get_ai_context_at(user_id, branch_id, now).await?;

        if ctx.branch.is_none() || ctx.recent_content.is_empty() {
            return Ok(GENERIC_PROMPTS.iter().map(|p| (*p).to_string()).collect());
        }

        let mut prompts = Vec::new();

        if let Some(milestone) = ctx
            .recent_content
            .iter()
            .find_map(|c| c.milestone_type.clone())
        {
            prompts.push(format!(
                "How has everyone been since the {} moment?",
                milestone.replace('_', " ")
            ));
        }

        let activities: Vec<&str> = ctx
            .recent_content
            .iter()
            .filter(|c| !c.content.is_empty())
            .map(|c| c.content.as_str())
            .collect();
        if !activities.is_empty() {
            let pick = {
                let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
                rng.gen_range(0..activities.len())
            };
            let snippet: String = activities[pick].chars().take(40).collect();
            prompts.push(format!("Any update on \"{snippet}\"?"));
        }

        if ctx.time.weekday == Weekday::Sun {
            prompts.push("Sunday recap: what was the highlight of the weekend?".to_string());
        }

        if prompts.is_empty() {
            prompts.push(GENERIC_PROMPTS[0].to_string());
        }
        Ok(prompts)
    }

    /// Hours since the user's last recorded interaction, if any.
    pub async fn hours_since_last_interaction(
        &self,
        user_id: &str,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        Ok(self.get_state(user_id, branch_id).await?.map(|s| {
            now.signed_duration_since(s.last_interaction).num_hours()
        }))
    }
}
