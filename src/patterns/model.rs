//! Computed per-(user, branch) behavioral pattern.

use chrono::{DateTime, Utc, Weekday};

use crate::context::state::Engagement;
use crate::prompt::PromptType;

/// Direction of the user's sentiment over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentTrend {
    Improving,
    Stable,
    Declining,
}

/// What kinds of prompts land, and when.
#[derive(Debug, Clone)]
pub struct PatternPreferences {
    /// Top category kinds mapped to prompt types, most frequent first.
    pub preferred_prompt_types: Vec<PromptType>,
    /// Hours (0-23) the user most often responds in, most frequent first.
    pub best_response_hours: Vec<u32>,
    /// Topics that co-occur with rich responses.
    pub engagement_triggers: Vec<String>,
}

/// Longitudinal behavioral statistics.
#[derive(Debug, Clone)]
pub struct BehavioralStats {
    pub avg_response_length: f32,
    /// Mean days between responses; 2.0 when history is too thin.
    pub response_frequency_days: f32,
    pub sentiment_trend: SentimentTrend,
    pub engagement_level: Engagement,
}

/// What the user writes about.
#[derive(Debug, Clone)]
pub struct ContentStats {
    pub common_topics: Vec<String>,
    pub common_tags: Vec<String>,
    pub milestone_types: Vec<String>,
    pub people: Vec<String>,
    pub locations: Vec<String>,
}

/// When the user is around.
#[derive(Debug, Clone)]
pub struct TimingStats {
    pub active_hours: Vec<u32>,
    pub preferred_days: Vec<Weekday>,
}

/// The full recomputed pattern, cached with a 24h TTL.
#[derive(Debug, Clone)]
pub struct UserPattern {
    pub preferences: PatternPreferences,
    pub behavioral: BehavioralStats,
    pub content: ContentStats,
    pub timing: TimingStats,
    pub computed_at: DateTime<Utc>,
}

impl UserPattern {
    /// Fixed default for users with no history.
    pub fn default_at(now: DateTime<Utc>) -> Self {
        Self {
            preferences: PatternPreferences {
                preferred_prompt_types: vec![PromptType::Checkin, PromptType::Memory],
                best_response_hours: Vec::new(),
                engagement_triggers: Vec::new(),
            },
            behavioral: BehavioralStats {
                avg_response_length: 0.0,
                response_frequency_days: 2.0,
                sentiment_trend: SentimentTrend::Stable,
                engagement_level: Engagement::Medium,
            },
            content: ContentStats {
                common_topics: Vec::new(),
                common_tags: Vec::new(),
                milestone_types: Vec::new(),
                people: Vec::new(),
                locations: Vec::new(),
            },
            timing: TimingStats {
                active_hours: Vec::new(),
                preferred_days: Vec::new(),
            },
            computed_at: now,
        }
    }
}
