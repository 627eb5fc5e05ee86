//! Configuration types.

use chrono::Duration;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a prompt stays answerable before it expires.
    pub response_timeout: Duration,
    /// How long a computed user pattern stays fresh.
    pub pattern_cache_ttl: Duration,
    /// Conversation-state cache TTL.
    pub state_cache_ttl: Duration,
    /// Response-history ring buffer capacity per conversation state.
    pub response_history_cap: usize,
    /// Preferred-topics cap per conversation state (FIFO eviction).
    pub preferred_topics_cap: usize,
    /// How many analysis records feed a pattern recomputation.
    pub analysis_history_limit: usize,
    /// How many content records feed a pattern recomputation.
    pub content_history_limit: usize,
    /// Rolling prompt-history cap per (branch, user) in the AI service.
    pub prompt_history_cap: usize,
    /// Members who posted content within this window are skipped by the
    /// proactive scheduling sweep.
    pub quiet_days: i64,
    /// Responses longer than this (and not low-engagement) earn a follow-up.
    pub follow_up_min_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::hours(48),
            pattern_cache_ttl: Duration::hours(24),
            state_cache_ttl: Duration::hours(24),
            response_history_cap: 50,
            preferred_topics_cap: 10,
            analysis_history_limit: 100,
            content_history_limit: 50,
            prompt_history_cap: 20,
            quiet_days: 7,
            follow_up_min_len: 20,
        }
    }
}
