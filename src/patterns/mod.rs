//! Personalized prompting — longitudinal pattern aggregation and
//! template-based prompt generation with confidence scoring.

pub mod model;
pub mod templates;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::analyzer::{CategoryKind, Sentiment};
use crate::cache::TtlCache;
use crate::config::EngineConfig;
use crate::confidence::ConfidenceModel;
use crate::context::state::Engagement;
use crate::error::Result;
use crate::prompt::PromptType;
use crate::store::records::{AnalysisRecord, ContentRecord};
use crate::store::traits::Store;
use model::{
    BehavioralStats, ContentStats, PatternPreferences, SentimentTrend, TimingStats, UserPattern,
};

/// A generated prompt candidate with its grading and rationale.
#[derive(Debug, Clone)]
pub struct PersonalizedPrompt {
    pub content: String,
    pub prompt_type: PromptType,
    pub confidence: f32,
    /// Human-readable bullets naming which signals fired.
    pub reasoning: Vec<String>,
    pub suggested_responses: Vec<String>,
    /// Best hour (0-23) to deliver follow-ups.
    pub optimal_hour: u32,
    pub optimal_day: Weekday,
    /// Which template produced the text.
    pub template: String,
}

/// Pattern aggregation and template-driven generation.
pub struct PersonalizedPromptingSystem {
    store: Arc<dyn Store>,
    config: EngineConfig,
    /// Process-local, disposable. Recomputed from the store on miss.
    patterns: TtlCache<(String, String), UserPattern>,
    rng: Mutex<StdRng>,
}

impl PersonalizedPromptingSystem {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        let patterns = TtlCache::new(config.pattern_cache_ttl);
        Self {
            store,
            config,
            patterns,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic template selection, for tests.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    /// Drop the cached pattern for one (user, branch).
    pub async fn invalidate(&self, user_id: &str, branch_id: &str) {
        self.patterns
            .invalidate(&(user_id.to_string(), branch_id.to_string()))
            .await;
    }

    /// Cache-or-recompute the user pattern (24h TTL).
    pub async fn analyze_user_patterns(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<UserPattern> {
        self.analyze_user_patterns_at(user_id, branch_id, Utc::now())
            .await
    }

    pub async fn analyze_user_patterns_at(
        &self,
        user_id: &str,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserPattern> {
        let key = (user_id.to_string(), branch_id.to_string());
        if let Some(pattern) = self.patterns.get_at(&key, now).await {
            return Ok(pattern);
        }

        let analyses = self
            .store
            .recent_analyses(user_id, branch_id, self.config.analysis_history_limit)
            .await?;
        let content = self
            .store
            .recent_content_by_author(branch_id, user_id, self.config.content_history_limit)
            .await?;

        let pattern = if analyses.is_empty() {
            UserPattern::default_at(now)
        } else {
            compute_user_pattern(&analyses, &content, now)
        };

        debug!(
            user = user_id,
            branch = branch_id,
            analyses = analyses.len(),
            "Recomputed user pattern"
        );
        self.patterns.set_at(key, pattern.clone(), now).await;
        Ok(pattern)
    }

    /// Generate a prompt from the user's pattern.
    pub async fn generate_personalized_prompt(
        &self,
        user_id: &str,
        branch_id: &str,
    ) -> Result<PersonalizedPrompt> {
        self.generate_personalized_prompt_at(user_id, branch_id, Utc::now())
            .await
    }

    pub async fn generate_personalized_prompt_at(
        &self,
        user_id: &str,
        branch_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PersonalizedPrompt> {
        let pattern = self.analyze_user_patterns_at(user_id, branch_id, now).await?;
        let user = self.store.get_user(user_id).await?;
        let name = user
            .as_ref()
            .map(|u| u.display_name.as_str())
            .unwrap_or("there");

        let prompt_type = select_prompt_type(&pattern, now.hour());

        let bank = templates::templates_for(prompt_type);
        let (template_index, person_index) = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            (
                rng.gen_range(0..bank.len()),
                if pattern.content.people.is_empty() {
                    0
                } else {
                    rng.gen_range(0..pattern.content.people.len())
                },
            )
        };
        let template = bank[template_index];
        let person = pattern
            .content
            .people
            .get(person_index)
            .map(String::as_str)
            .unwrap_or("everyone");

        let content = template
            .replace("{name}", name)
            .replace("{time_of_day}", time_of_day_label(now.hour()))
            .replace("{topic}", templates::topic_phrase(&pattern.content.common_topics))
            .replace("{person}", person);

        let confidence = calculate_prompt_confidence(&pattern, prompt_type, now.hour());

        let mut reasoning = vec![format!(
            "selected {} from {} preferred type(s)",
            prompt_type.as_str(),
            pattern.preferences.preferred_prompt_types.len()
        )];
        for component in confidence.components() {
            reasoning.push(format!("{} ({:+.2})", component.label, component.delta));
        }

        let mut suggested = templates::responses_for(prompt_type)
            .iter()
            .map(|s| (*s).to_string())
            .collect::<Vec<_>>();
        if pattern.content.common_topics.iter().any(|t| t == "food") {
            suggested.push("We tried a new recipe this week!".to_string());
        }
        if pattern
            .content
            .common_topics
            .iter()
            .any(|t| t == "development")
        {
            suggested.push("There's a new skill to report!".to_string());
        }
        suggested.truncate(4);

        Ok(PersonalizedPrompt {
            content,
            prompt_type,
            confidence: confidence.score(),
            reasoning,
            suggested_responses: suggested,
            optimal_hour: pattern.timing.active_hours.first().copied().unwrap_or(19),
            optimal_day: pattern
                .timing
                .preferred_days
                .first()
                .copied()
                .unwrap_or(Weekday::Sun),
            template: template.to_string(),
        })
    }
}

/// Pick the prompt type for this hour: mornings favor check-ins, evenings
/// favor memories, a milestone-heavy history favors milestones, otherwise
/// the user's most frequent type wins.
fn select_prompt_type(pattern: &UserPattern, hour: u32) -> PromptType {
    let preferred = &pattern.preferences.preferred_prompt_types;
    let prefers = |t: PromptType| preferred.contains(&t);

    if (6..=10).contains(&hour) && prefers(PromptType::Checkin) {
        return PromptType::Checkin;
    }
    if (18..=22).contains(&hour) && prefers(PromptType::Memory) {
        return PromptType::Memory;
    }
    if pattern.content.milestone_types.len() > 2 && prefers(PromptType::Milestone) {
        return PromptType::Milestone;
    }
    preferred.first().copied().unwrap_or(PromptType::Checkin)
}

/// Confidence for a pattern-generated prompt, banded to [0.3, 0.95].
pub fn calculate_prompt_confidence(
    pattern: &UserPattern,
    prompt_type: PromptType,
    hour: u32,
) -> ConfidenceModel {
    let mut model = ConfidenceModel::new(0.5).with_bounds(0.3, 0.95);
    model.add_if(
        pattern
            .preferences
            .preferred_prompt_types
            .contains(&prompt_type),
        "preferred prompt type",
        0.2,
    );
    model.add_if(
        pattern.timing.active_hours.contains(&hour),
        "within most-active hours",
        0.15,
    );
    match pattern.behavioral.engagement_level {
        Engagement::High => model.add("high engagement", 0.1),
        Engagement::Low => model.add("low engagement", -0.1),
        Engagement::Medium => {}
    }
    model.add_if(
        pattern.content.common_topics.len() > 3,
        "broad topic history",
        0.05,
    );
    model
}

fn time_of_day_label(hour: u32) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=17 => "afternoon",
        18..=22 => "evening",
        _ => "night",
    }
}

/// Recompute the full pattern from history. Pure.
pub fn compute_user_pattern(
    analyses: &[AnalysisRecord],
    content: &[ContentRecord],
    now: DateTime<Utc>,
) -> UserPattern {
    let avg_response_length = analyses
        .iter()
        .map(|r| r.response_text.len() as f32)
        .sum::<f32>()
        / analyses.len().max(1) as f32;

    // `analyses` arrives newest first.
    let response_frequency_days = if analyses.len() < 2 {
        2.0
    } else {
        let gaps: Vec<f32> = analyses
            .windows(2)
            .map(|pair| {
                (pair[0].created_at - pair[1].created_at).num_hours() as f32 / 24.0
            })
            .collect();
        gaps.iter().sum::<f32>() / gaps.len() as f32
    };

    let sentiment_trend = sentiment_trend(analyses);

    let common_tags = top_n(
        analyses.iter().flat_map(|r| r.analysis.tags.iter().cloned()),
        10,
    );
    let common_topics = top_n(
        analyses
            .iter()
            .flat_map(|r| r.analysis.topics.iter().cloned()),
        8,
    );

    let best_response_hours: Vec<u32> =
        top_n(analyses.iter().map(|r| r.created_at.hour()), 3);
    let active_hours: Vec<u32> = top_n(
        analyses
            .iter()
            .map(|r| r.created_at.hour())
            .chain(content.iter().map(|c| c.created_at.hour())),
        3,
    );
    let preferred_days: Vec<Weekday> = top_n(
        analyses
            .iter()
            .map(|r| r.created_at.weekday())
            .chain(content.iter().map(|c| c.created_at.weekday())),
        4,
    );

    let milestone_types = unique_capped(
        analyses
            .iter()
            .filter_map(|r| r.analysis.milestone.clone())
            .chain(content.iter().filter_map(|c| c.milestone_type.clone())),
        usize::MAX,
    );
    let people = unique_capped(
        analyses
            .iter()
            .flat_map(|r| r.analysis.people.iter().cloned()),
        8,
    );
    let locations = unique_capped(
        analyses
            .iter()
            .flat_map(|r| r.analysis.locations.iter().cloned()),
        6,
    );

    let engagement_level = engagement_level(analyses, avg_response_length);

    let preferred_prompt_types = preferred_prompt_types(analyses);

    // Topics that show up alongside rich responses.
    let engagement_triggers = top_n(
        analyses
            .iter()
            .filter(|r| {
                r.analysis.categories.len() > 1 || r.analysis.sentiment == Sentiment::Positive
            })
            .flat_map(|r| r.analysis.topics.iter().cloned()),
        5,
    );

    UserPattern {
        preferences: PatternPreferences {
            preferred_prompt_types,
            best_response_hours,
            engagement_triggers,
        },
        behavioral: BehavioralStats {
            avg_response_length,
            response_frequency_days,
            sentiment_trend,
            engagement_level,
        },
        content: ContentStats {
            common_topics,
            common_tags,
            milestone_types,
            people,
            locations,
        },
        timing: TimingStats {
            active_hours,
            preferred_days,
        },
        computed_at: now,
    }
}

/// Compare net sentiment of the most-recent 10 analyses against the earliest
/// 10. A ±0.2 swing marks a trend.
fn sentiment_trend(analyses: &[AnalysisRecord]) -> SentimentTrend {
    fn net(records: &[AnalysisRecord]) -> f32 {
        if records.is_empty() {
            return 0.0;
        }
        let total: i32 = records
            .iter()
            .map(|r| match r.analysis.sentiment {
                Sentiment::Positive => 1,
                Sentiment::Negative => -1,
                Sentiment::Neutral => 0,
            })
            .sum();
        total as f32 / records.len() as f32
    }

    // Newest first: the head is recent, the tail is earliest.
    let recent = &analyses[..analyses.len().min(10)];
    let earliest_start = analyses.len().saturating_sub(10);
    let earliest = &analyses[earliest_start..];

    let delta = net(recent) - net(earliest);
    if delta > 0.2 {
        SentimentTrend::Improving
    } else if delta < -0.2 {
        SentimentTrend::Declining
    } else {
        SentimentTrend::Stable
    }
}

/// Composite engagement: response length, positivity, and category richness.
fn engagement_level(analyses: &[AnalysisRecord], avg_len: f32) -> Engagement {
    if analyses.is_empty() {
        return Engagement::Medium;
    }
    let positive = analyses
        .iter()
        .filter(|r| r.analysis.sentiment == Sentiment::Positive)
        .count() as f32
        / analyses.len() as f32;
    let multi = analyses
        .iter()
        .filter(|r| r.analysis.categories.len() > 1)
        .count() as f32
        / analyses.len() as f32;

    let score = avg_len / 100.0 + positive + multi;
    if score > 1.5 {
        Engagement::High
    } else if score < 0.8 {
        Engagement::Low
    } else {
        Engagement::Medium
    }
}

/// Top-3 most frequent category kinds, mapped into prompt types.
fn preferred_prompt_types(analyses: &[AnalysisRecord]) -> Vec<PromptType> {
    let mapped = analyses.iter().flat_map(|r| {
        r.analysis.categories.iter().map(|c| match c.kind {
            CategoryKind::Milestone => PromptType::Milestone,
            CategoryKind::Memory => PromptType::Memory,
            CategoryKind::Celebration => PromptType::Celebration,
            _ => PromptType::Checkin,
        })
    });
    let top = top_n(mapped, 3);
    if top.is_empty() {
        vec![PromptType::Checkin, PromptType::Memory]
    } else {
        top
    }
}

/// Most frequent values, ties broken by first appearance.
fn top_n<T: std::hash::Hash + Eq + Clone>(items: impl Iterator<Item = T>, n: usize) -> Vec<T> {
    let mut counts: HashMap<T, usize> = HashMap::new();
    let mut order: Vec<T> = Vec::new();
    for item in items {
        let count = counts.entry(item.clone()).or_insert(0);
        if *count == 0 {
            order.push(item);
        }
        *count += 1;
    }
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.truncate(n);
    order
}

/// Unique values in first-seen order, capped.
fn unique_capped<T: std::hash::Hash + Eq + Clone>(
    items: impl Iterator<Item = T>,
    cap: usize,
) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for item in items {
        if seen.insert(item.clone()) {
            out.push(item);
            if out.len() >= cap {
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::ResponseAnalyzer;
    use crate::store::memory::MemoryStore;
    use crate::store::records::UserProfile;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn record(text: &str, at: DateTime<Utc>) -> AnalysisRecord {
        AnalysisRecord {
            id: Uuid::new_v4(),
            user_id: "u".into(),
            branch_id: "b".into(),
            response_text: text.into(),
            analysis: ResponseAnalyzer::new().analyze_message(text, &[]),
            created_at: at,
        }
    }

    fn system(store: Arc<MemoryStore>) -> PersonalizedPromptingSystem {
        PersonalizedPromptingSystem::new(store, EngineConfig::default()).with_rng_seed(42)
    }

    #[tokio::test]
    async fn empty_history_returns_default_pattern() {
        let store = Arc::new(MemoryStore::new());
        let sys = system(store);
        let pattern = sys.analyze_user_patterns("u", "b").await.unwrap();
        assert_eq!(
            pattern.preferences.preferred_prompt_types,
            vec![PromptType::Checkin, PromptType::Memory]
        );
        assert_eq!(pattern.behavioral.engagement_level, Engagement::Medium);
        assert_eq!(pattern.behavioral.response_frequency_days, 2.0);
    }

    #[tokio::test]
    async fn pattern_is_cached_until_ttl() {
        let store = Arc::new(MemoryStore::new());
        let sys = system(store.clone());
        let now = Utc::now();

        let first = sys.analyze_user_patterns_at("u", "b", now).await.unwrap();
        assert!(first.content.common_topics.is_empty());

        // New history lands, but the cache still answers within the TTL.
        store
            .append_analysis(&record("dinner at the park was fun", now))
            .await
            .unwrap();
        let cached = sys.analyze_user_patterns_at("u", "b", now).await.unwrap();
        assert!(cached.content.common_topics.is_empty());

        // Past the TTL the pattern is recomputed.
        let later = now + Duration::hours(25);
        let fresh = sys.analyze_user_patterns_at("u", "b", later).await.unwrap();
        assert!(fresh.content.common_topics.contains(&"food".to_string()));
    }

    #[test]
    fn frequency_defaults_with_thin_history() {
        let now = Utc::now();
        let pattern = compute_user_pattern(&[record("hello there", now)], &[], now);
        assert_eq!(pattern.behavioral.response_frequency_days, 2.0);
    }

    #[test]
    fn frequency_averages_gaps() {
        let now = Utc::now();
        let records = vec![
            record("a", now),
            record("b", now - Duration::days(2)),
            record("c", now - Duration::days(6)),
        ];
        let pattern = compute_user_pattern(&records, &[], now);
        // Gaps of 2 and 4 days average to 3.
        assert!((pattern.behavioral.response_frequency_days - 3.0).abs() < 0.1);
    }

    #[test]
    fn sentiment_trend_improving_and_declining() {
        let now = Utc::now();
        // Newest first: positive recent, negative early.
        let mut improving = Vec::new();
        for i in 0..10 {
            improving.push(record("what a wonderful happy day", now - Duration::days(i)));
        }
        for i in 10..20 {
            improving.push(record("sad and tired again", now - Duration::days(i)));
        }
        let pattern = compute_user_pattern(&improving, &[], now);
        assert_eq!(pattern.behavioral.sentiment_trend, SentimentTrend::Improving);

        let mut declining = Vec::new();
        for i in 0..10 {
            declining.push(record("sad and tired again", now - Duration::days(i)));
        }
        for i in 10..20 {
            declining.push(record("what a wonderful happy day", now - Duration::days(i)));
        }
        let pattern = compute_user_pattern(&declining, &[], now);
        assert_eq!(pattern.behavioral.sentiment_trend, SentimentTrend::Declining);
    }

    #[test]
    fn stable_trend_for_flat_history() {
        let now = Utc::now();
        let records: Vec<AnalysisRecord> = (0..6)
            .map(|i| record("we went to the store", now - Duration::days(i)))
            .collect();
        let pattern = compute_user_pattern(&records, &[], now);
        assert_eq!(pattern.behavioral.sentiment_trend, SentimentTrend::Stable);
    }

    #[test]
    fn confidence_stays_in_band() {
        let now = Utc::now();
        let empty = UserPattern::default_at(now);
        for prompt_type in [PromptType::Checkin, PromptType::Memory, PromptType::Milestone] {
            for hour in 0..24 {
                let score = calculate_prompt_confidence(&empty, prompt_type, hour).score();
                assert!((0.3..=0.95).contains(&score), "score {score} out of band");
            }
        }

        // Pile every bonus on and it still caps at 0.95.
        let mut rich = UserPattern::default_at(now);
        rich.behavioral.engagement_level = Engagement::High;
        rich.timing.active_hours = vec![9];
        rich.content.common_topics = vec![
            "food".into(),
            "school".into(),
            "play".into(),
            "travel".into(),
        ];
        let score = calculate_prompt_confidence(&rich, PromptType::Checkin, 9).score();
        assert!(score <= 0.95);
    }

    #[test]
    fn morning_hours_favor_checkin_and_evenings_memory() {
        let now = Utc::now();
        let pattern = UserPattern::default_at(now); // prefers [checkin, memory]
        assert_eq!(select_prompt_type(&pattern, 8), PromptType::Checkin);
        assert_eq!(select_prompt_type(&pattern, 20), PromptType::Memory);
        // Midday falls through to the first preferred type.
        assert_eq!(select_prompt_type(&pattern, 14), PromptType::Checkin);
    }

    #[test]
    fn milestone_rich_history_favors_milestone_prompts() {
        let now = Utc::now();
        let mut pattern = UserPattern::default_at(now);
        pattern.preferences.preferred_prompt_types =
            vec![PromptType::Milestone, PromptType::Checkin];
        pattern.content.milestone_types =
            vec!["first_steps".into(), "birthday".into(), "first_tooth".into()];
        assert_eq!(select_prompt_type(&pattern, 14), PromptType::Milestone);
    }

    #[tokio::test]
    async fn generated_prompt_comes_from_the_bank() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_user(UserProfile {
                id: "u".into(),
                display_name: "Ana".into(),
            })
            .await;
        let sys = system(store);
        let morning = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        let prompt = sys
            .generate_personalized_prompt_at("u", "b", morning)
            .await
            .unwrap();

        assert_eq!(prompt.prompt_type, PromptType::Checkin);
        assert!(templates::CHECKIN_TEMPLATES
            .iter()
            .any(|t| *t == prompt.template));
        assert!(prompt.content.contains("Ana") || !prompt.template.contains("{name}"));
        assert!(!prompt.content.contains("{name}"));
        assert!(!prompt.content.contains("{person}"));
        assert!(!prompt.content.contains("{topic}"));
        assert!(!prompt.content.contains("{time_of_day}"));
        assert!((0.3..=0.95).contains(&prompt.confidence));
        assert!(!prompt.reasoning.is_empty());
        assert!(prompt.suggested_responses.len() <= 4);
        assert_eq!(prompt.optimal_hour, 19);
    }

    #[tokio::test]
    async fn suggested_responses_extend_for_food_topics() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        for i in 0..3 {
            store
                .append_analysis(&record(
                    "we loved cooking dinner together",
                    now - Duration::days(i),
                ))
                .await
                .unwrap();
        }
        let sys = system(store);
        let prompt = sys
            .generate_personalized_prompt_at("u", "b", now)
            .await
            .unwrap();
        assert!(prompt.suggested_responses.len() <= 4);
        // The food extension only survives when the base bank leaves room,
        // so assert on the pattern instead of the final list.
        let pattern = sys.analyze_user_patterns_at("u", "b", now).await.unwrap();
        assert!(pattern.content.common_topics.contains(&"food".to_string()));
    }

    #[test]
    fn people_and_locations_are_capped() {
        let now = Utc::now();
        let text = "Maya Liam Noah Emma Olivia Ava Mia Luna Zoe Ivy went to the park \
                    beach zoo museum playground library pool home";
        let records = vec![record(text, now)];
        let pattern = compute_user_pattern(&records, &[], now);
        assert!(pattern.content.people.len() <= 8);
        assert!(pattern.content.locations.len() <= 6);
    }

    #[test]
    fn engagement_levels_follow_composite_score() {
        let now = Utc::now();
        // Long, positive, multi-category responses → high.
        let rich_text = "What a wonderful happy day! We celebrated her birthday at the park \
                         with grandma, so proud of how much she is growing and learning, \
                         and we all loved the cake she helped bake for the party.";
        let rich: Vec<AnalysisRecord> =
            (0..5).map(|i| record(rich_text, now - Duration::days(i))).collect();
        assert_eq!(
            compute_user_pattern(&rich, &[], now)
                .behavioral
                .engagement_level,
            Engagement::High
        );

        // Terse, flat responses → low.
        let flat: Vec<AnalysisRecord> =
            (0..5).map(|i| record("ok", now - Duration::days(i))).collect();
        assert_eq!(
            compute_user_pattern(&flat, &[], now)
                .behavioral
                .engagement_level,
            Engagement::Low
        );
    }
}
