//! Per-(user, branch) conversation state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Where a conversation sits in its lifecycle. Recomputed on every update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    Initial,
    Active,
    Followup,
    Concluded,
}

impl ConversationPhase {
    /// Phase from interaction count and recency.
    pub fn derive(interactions: usize, last_interaction: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if interactions == 0 {
            Self::Initial
        } else if interactions < 3 {
            Self::Active
        } else if now.signed_duration_since(last_interaction) < Duration::hours(24) {
            Self::Followup
        } else {
            Self::Concluded
        }
    }
}

/// How prompts should read for this user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    Casual,
    Playful,
    Formal,
}

/// How often the user tolerates being nudged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderFrequency {
    High,
    Medium,
    Low,
}

impl ReminderFrequency {
    /// Minimum hours since the last interaction before another prompt.
    pub fn threshold_hours(&self) -> i64 {
        match self {
            Self::High => 8,
            Self::Medium => 24,
            Self::Low => 72,
        }
    }
}

/// Preferred time-of-day window for receiving prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    Morning,
    Afternoon,
    Evening,
    Anytime,
}

impl TimeWindow {
    pub fn contains_hour(&self, hour: u32) -> bool {
        match self {
            Self::Morning => (6..12).contains(&hour),
            Self::Afternoon => (12..18).contains(&hour),
            Self::Evening => (18..23).contains(&hour),
            Self::Anytime => true,
        }
    }
}

/// Coarse richness classification of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engagement {
    High,
    Medium,
    Low,
}

/// One prompt/response exchange kept in the ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub prompt: String,
    pub response: String,
    pub engagement: Engagement,
    pub recorded_at: DateTime<Utc>,
}

/// Learned per-user prompting preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferences {
    pub prompt_style: PromptStyle,
    pub reminder_frequency: ReminderFrequency,
    /// Capped FIFO: oldest topic evicted first.
    pub preferred_topics: Vec<String>,
    pub best_time_for_prompts: TimeWindow,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            prompt_style: PromptStyle::Casual,
            reminder_frequency: ReminderFrequency::Medium,
            preferred_topics: Vec::new(),
            best_time_for_prompts: TimeWindow::Anytime,
        }
    }
}

/// Durable conversation state, one per (user, branch). Upserted whole.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub user_id: String,
    pub branch_id: String,
    pub conversation_phase: ConversationPhase,
    pub last_interaction: DateTime<Utc>,
    pub preferences: UserPreferences,
    /// Ring buffer, FIFO eviction at capacity.
    pub response_history: Vec<ResponseRecord>,
}

impl ConversationState {
    pub fn new(user_id: impl Into<String>, branch_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            branch_id: branch_id.into(),
            conversation_phase: ConversationPhase::Initial,
            last_interaction: now,
            preferences: UserPreferences::default(),
            response_history: Vec::new(),
        }
    }

    /// Append to the ring buffer, evicting the oldest entries past `cap`.
    pub fn push_response(&mut self, record: ResponseRecord, cap: usize) {
        self.response_history.push(record);
        while self.response_history.len() > cap {
            self.response_history.remove(0);
        }
    }

    /// Append a preferred topic, evicting the oldest past `cap`. Duplicates
    /// are skipped rather than re-ordered.
    pub fn push_topic(&mut self, topic: String, cap: usize) {
        if self.preferences.preferred_topics.contains(&topic) {
            return;
        }
        self.preferences.preferred_topics.push(topic);
        while self.preferences.preferred_topics.len() > cap {
            self.preferences.preferred_topics.remove(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_derivation() {
        let now = Utc::now();
        assert_eq!(
            ConversationPhase::derive(0, now, now),
            ConversationPhase::Initial
        );
        assert_eq!(
            ConversationPhase::derive(2, now, now),
            ConversationPhase::Active
        );
        assert_eq!(
            ConversationPhase::derive(3, now - Duration::hours(2), now),
            ConversationPhase::Followup
        );
        assert_eq!(
            ConversationPhase::derive(5, now - Duration::hours(30), now),
            ConversationPhase::Concluded
        );
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let now = Utc::now();
        let mut state = ConversationState::new("u", "b", now);
        for i in 0..51 {
            state.push_response(
                ResponseRecord {
                    prompt: format!("p{i}"),
                    response: format!("r{i}"),
                    engagement: Engagement::Medium,
                    recorded_at: now,
                },
                50,
            );
        }
        assert_eq!(state.response_history.len(), 50);
        assert_eq!(state.response_history[0].prompt, "p1");
        assert_eq!(state.response_history[49].prompt, "p50");
    }

    #[test]
    fn topics_fifo_with_cap_and_dedupe() {
        let mut state = ConversationState::new("u", "b", Utc::now());
        for i in 0..12 {
            state.push_topic(format!("t{i}"), 10);
        }
        state.push_topic("t11".into(), 10); // duplicate, ignored
        assert_eq!(state.preferences.preferred_topics.len(), 10);
        assert_eq!(state.preferences.preferred_topics[0], "t2");
    }

    #[test]
    fn time_windows() {
        assert!(TimeWindow::Morning.contains_hour(8));
        assert!(!TimeWindow::Morning.contains_hour(13));
        assert!(TimeWindow::Afternoon.contains_hour(13));
        assert!(TimeWindow::Evening.contains_hour(20));
        assert!(!TimeWindow::Evening.contains_hour(2));
        for hour in 0..24 {
            assert!(TimeWindow::Anytime.contains_hour(hour));
        }
    }

    #[test]
    fn reminder_thresholds() {
        assert_eq!(ReminderFrequency::High.threshold_hours(), 8);
        assert_eq!(ReminderFrequency::Medium.threshold_hours(), 24);
        assert_eq!(ReminderFrequency::Low.threshold_hours(), 72);
    }
}
