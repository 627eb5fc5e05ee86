//! The response analyzer — a pure classifier over free-form message text.
//!
//! Rules run in a fixed order and are independent of each other; the result
//! is sorted by confidence so callers can read the top entry as the primary
//! classification. No stored state, no I/O.

use regex::Regex;

use crate::analyzer::lexicon;
use crate::analyzer::types::{Category, CategoryKind, MessageAnalysis, Sentiment, Urgency};

/// Tag lists never exceed this many entries.
pub const MAX_TAGS: usize = 8;

/// Stateless message classifier.
pub struct ResponseAnalyzer {
    hashtag_re: Regex,
    age_re: Regex,
}

impl Default for ResponseAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseAnalyzer {
    pub fn new() -> Self {
        // Both patterns are static and known-good.
        let hashtag_re = Regex::new(r"#([A-Za-z0-9_]+)").unwrap();
        let age_re = Regex::new(r"\d+\s+(?:month|year|week)s?\s+old").unwrap();
        Self { hashtag_re, age_re }
    }

    /// Classify a message. Pure function of its inputs.
    pub fn analyze_message(&self, content: &str, media_urls: &[String]) -> MessageAnalysis {
        let lower = content.to_lowercase();

        let milestone = lexicon::find_milestone(&lower).map(String::from);
        let categories = self.categorize(content, &lower, media_urls, milestone.as_deref());
        let sentiment = self.sentiment(&lower, content);
        let urgency = self.urgency(&lower);
        let tags = self.tags(content, &lower);
        let topics = self.topics(&lower);
        let people = self.people(content, &lower);
        let locations = keyword_matches(&lower, lexicon::LOCATION_WORDS);
        let time_references = keyword_matches(&lower, lexicon::TIME_REFERENCE_WORDS);

        MessageAnalysis {
            categories,
            tags,
            sentiment,
            topics,
            urgency,
            milestone,
            people,
            locations,
            time_references,
        }
    }

    /// Tag suggestions for a leaf derived from an analysis: confident category
    /// kinds, non-neutral sentiment, topics, milestone, and an urgency marker.
    pub fn generate_suggested_tags(&self, analysis: &MessageAnalysis) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();

        for category in &analysis.categories {
            if category.confidence > 0.7 {
                tags.push(category.kind.as_str().to_string());
            }
        }
        if analysis.sentiment != Sentiment::Neutral {
            tags.push(analysis.sentiment.as_str().to_string());
        }
        tags.extend(analysis.topics.iter().cloned());
        if let Some(ref milestone) = analysis.milestone {
            tags.push(milestone.clone());
        }
        if analysis.urgency != Urgency::Low {
            tags.push(format!("urgency_{}", analysis.urgency.as_str()));
        }

        dedupe_capped(tags, MAX_TAGS)
    }

    fn categorize(
        &self,
        content: &str,
        lower: &str,
        media_urls: &[String],
        milestone: Option<&str>,
    ) -> Vec<Category> {
        let mut categories = Vec::new();

        if !media_urls.is_empty() {
            categories.push(Category {
                kind: CategoryKind::PhotoShare,
                confidence: 0.9,
                reason: format!("{} media attachment(s)", media_urls.len()),
            });
        }
        if let Some(name) = milestone {
            categories.push(Category {
                kind: CategoryKind::Milestone,
                confidence: 0.95,
                reason: format!("milestone language: {name}"),
            });
        }
        if lexicon::contains_any(lower, lexicon::CELEBRATION_WORDS) {
            categories.push(Category {
                kind: CategoryKind::Celebration,
                confidence: 0.8,
                reason: "celebratory language".into(),
            });
        }
        // Concern language outranks a bare question mark.
        if lexicon::contains_any(lower, lexicon::CONCERN_WORDS) {
            categories.push(Category {
                kind: CategoryKind::Concern,
                confidence: 0.85,
                reason: "concern language".into(),
            });
        } else if content.contains('?') {
            categories.push(Category {
                kind: CategoryKind::Question,
                confidence: 0.85,
                reason: "direct question".into(),
            });
        }
        if lexicon::contains_any(lower, lexicon::MEMORY_WORDS) {
            categories.push(Category {
                kind: CategoryKind::Memory,
                confidence: 0.75,
                reason: "temporal reference".into(),
            });
        }
        if lexicon::contains_any(lower, lexicon::ROUTINE_WORDS) {
            categories.push(Category {
                kind: CategoryKind::Routine,
                confidence: 0.7,
                reason: "routine language".into(),
            });
        }

        // Nothing besides an attachment matched: an ordinary daily update.
        if categories
            .iter()
            .all(|c| c.kind == CategoryKind::PhotoShare)
        {
            categories.push(Category {
                kind: CategoryKind::DailyUpdate,
                confidence: 0.6,
                reason: "no stronger signal".into(),
            });
        }

        categories.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        categories
    }

    fn sentiment(&self, lower: &str, content: &str) -> Sentiment {
        let mut positive = lexicon::count_hits(lower, lexicon::POSITIVE_WORDS)
            + lexicon::count_hits(content, lexicon::POSITIVE_EMOJI);
        if content.contains('!') {
            positive += 1;
        }
        let negative = lexicon::count_hits(lower, lexicon::NEGATIVE_WORDS)
            + lexicon::count_hits(content, lexicon::NEGATIVE_EMOJI);

        if positive > negative {
            Sentiment::Positive
        } else if negative > positive {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }

    fn urgency(&self, lower: &str) -> Urgency {
        if lexicon::contains_any(lower, lexicon::URGENT_WORDS) {
            Urgency::High
        } else if lexicon::contains_any(lower, lexicon::SOON_WORDS) {
            Urgency::Medium
        } else {
            Urgency::Low
        }
    }

    fn tags(&self, content: &str, lower: &str) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();

        for capture in self.hashtag_re.captures_iter(content) {
            tags.push(capture[1].to_lowercase());
        }
        for word in lexicon::TAG_VOCABULARY {
            if lower.contains(word) {
                tags.push((*word).to_string());
            }
        }
        for m in self.age_re.find_iter(lower) {
            tags.push(m.as_str().split_whitespace().collect::<Vec<_>>().join("_"));
        }

        dedupe_capped(tags, MAX_TAGS)
    }

    fn topics(&self, lower: &str) -> Vec<String> {
        lexicon::TOPICS
            .iter()
            .filter(|(_, keywords)| lexicon::contains_any(lower, keywords))
            .map(|(label, _)| (*label).to_string())
            .collect()
    }

    fn people(&self, content: &str, lower: &str) -> Vec<String> {
        let mut people = keyword_matches(lower, lexicon::PEOPLE_WORDS);

        // Capitalized words not at a sentence start are likely names.
        let mut sentence_start = true;
        for raw in content.split_whitespace() {
            let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
            if word.is_empty() {
                continue;
            }
            let capitalized = word.chars().next().is_some_and(char::is_uppercase);
            if capitalized
                && word.len() > 2
                && !sentence_start
                && !lexicon::SENTENCE_STARTERS.contains(&word)
            {
                people.push(word.to_string());
            }
            sentence_start = raw.ends_with(['.', '!', '?']);
        }

        let mut seen = std::collections::HashSet::new();
        people.retain(|p| seen.insert(p.to_lowercase()));
        people
    }
}

fn keyword_matches(lower: &str, words: &[&str]) -> Vec<String> {
    words
        .iter()
        .filter(|w| lower.contains(*w))
        .map(|w| (*w).to_string())
        .collect()
}

fn dedupe_capped(values: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out: Vec<String> = values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect();
    out.truncate(cap);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> ResponseAnalyzer {
        ResponseAnalyzer::new()
    }

    #[test]
    fn detects_first_steps_milestone() {
        let analysis = analyzer().analyze_message("she took her first steps today!", &[]);
        assert_eq!(analysis.milestone.as_deref(), Some("first_steps"));
        let top = analysis.primary_category().unwrap();
        assert_eq!(top.kind, CategoryKind::Milestone);
        assert_eq!(top.confidence, 0.95);
    }

    #[test]
    fn milestone_keyword_always_yields_milestone_category() {
        for text in [
            "her first word was dog",
            "big graduation ceremony this weekend",
            "he lost a tooth at school",
        ] {
            let analysis = analyzer().analyze_message(text, &[]);
            assert!(analysis.milestone.is_some(), "no milestone for {text:?}");
            assert!(analysis.has_category(CategoryKind::Milestone));
        }
    }

    #[test]
    fn media_always_yields_photo_share() {
        let media = vec!["https://cdn.grove.app/leaf.jpg".to_string()];
        let analysis = analyzer().analyze_message("", &media);
        let photo = analysis
            .categories
            .iter()
            .find(|c| c.kind == CategoryKind::PhotoShare)
            .expect("photo_share present");
        assert_eq!(photo.confidence, 0.9);
    }

    #[test]
    fn plain_text_falls_back_to_daily_update() {
        let analysis = analyzer().analyze_message("we went to the store", &[]);
        assert_eq!(analysis.categories.len(), 1);
        assert_eq!(analysis.categories[0].kind, CategoryKind::DailyUpdate);
        assert_eq!(analysis.categories[0].confidence, 0.6);
    }

    #[test]
    fn photo_with_plain_text_still_gets_daily_update() {
        let media = vec!["a.jpg".to_string()];
        let analysis = analyzer().analyze_message("at the store", &media);
        assert!(analysis.has_category(CategoryKind::PhotoShare));
        assert!(analysis.has_category(CategoryKind::DailyUpdate));
    }

    #[test]
    fn question_mark_yields_question_category() {
        let analysis = analyzer().analyze_message("does anyone have dinner ideas?", &[]);
        assert!(analysis.has_category(CategoryKind::Question));
    }

    #[test]
    fn concern_language_outranks_question_mark() {
        let analysis = analyzer().analyze_message("I'm worried about his fever, any advice?", &[]);
        assert!(analysis.has_category(CategoryKind::Concern));
        assert!(!analysis.has_category(CategoryKind::Question));
    }

    #[test]
    fn categories_are_sorted_by_confidence() {
        let analysis = analyzer().analyze_message(
            "remember when she took her first steps? so proud",
            &["pic.jpg".to_string()],
        );
        let confidences: Vec<f32> = analysis.categories.iter().map(|c| c.confidence).collect();
        let mut sorted = confidences.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        assert_eq!(confidences, sorted);
        assert_eq!(analysis.categories[0].kind, CategoryKind::Milestone);
    }

    #[test]
    fn sentiment_positive_negative_and_tie() {
        let a = analyzer();
        assert_eq!(
            a.analyze_message("what a wonderful happy day", &[]).sentiment,
            Sentiment::Positive
        );
        assert_eq!(
            a.analyze_message("she was sad and tired", &[]).sentiment,
            Sentiment::Negative
        );
        assert_eq!(
            a.analyze_message("we went to the store", &[]).sentiment,
            Sentiment::Neutral
        );
        // One positive and one negative hit tie back to neutral.
        assert_eq!(
            a.analyze_message("happy but tired", &[]).sentiment,
            Sentiment::Neutral
        );
    }

    #[test]
    fn exclamation_counts_toward_positive() {
        let analysis = analyzer().analyze_message("she did it!", &[]);
        assert_eq!(analysis.sentiment, Sentiment::Positive);
    }

    #[test]
    fn urgency_tiers_first_match_wins() {
        let a = analyzer();
        assert_eq!(
            a.analyze_message("emergency, call me", &[]).urgency,
            Urgency::High
        );
        assert_eq!(
            a.analyze_message("need to sort this out this week", &[]).urgency,
            Urgency::Medium
        );
        assert_eq!(a.analyze_message("lazy afternoon", &[]).urgency, Urgency::Low);
    }

    #[test]
    fn tags_union_hashtags_vocabulary_and_ages() {
        let analysis =
            analyzer().analyze_message("#FirstSwim so much fun, she is 18 months old", &[]);
        assert!(analysis.tags.contains(&"firstswim".to_string()));
        assert!(analysis.tags.contains(&"fun".to_string()));
        assert!(analysis.tags.contains(&"18_months_old".to_string()));
    }

    #[test]
    fn tags_are_deduplicated_and_capped() {
        let text = "#fun fun family baby kids love cute happy school vacation birthday";
        let analysis = analyzer().analyze_message(text, &[]);
        assert!(analysis.tags.len() <= MAX_TAGS);
        let unique: std::collections::HashSet<_> = analysis.tags.iter().collect();
        assert_eq!(unique.len(), analysis.tags.len());
    }

    #[test]
    fn suggested_tags_capped_and_marked() {
        let analysis = analyzer().analyze_message(
            "emergency! she took her first steps at the park, dinner party with Grandma #family",
            &["a.jpg".to_string()],
        );
        let tags = analyzer().generate_suggested_tags(&analysis);
        assert!(tags.len() <= MAX_TAGS);
        assert!(tags.contains(&"urgency_high".to_string()));
        assert!(tags.contains(&"first_steps".to_string()));
        let unique: std::collections::HashSet<_> = tags.iter().collect();
        assert_eq!(unique.len(), tags.len());
    }

    #[test]
    fn suggested_tags_skip_low_confidence_and_neutral() {
        let analysis = analyzer().analyze_message("we went to the store", &[]);
        let tags = analyzer().generate_suggested_tags(&analysis);
        // daily_update is 0.6 (below the 0.7 bar), sentiment neutral, urgency low.
        assert!(tags.is_empty());
    }

    #[test]
    fn people_from_keywords_and_names() {
        let analysis = analyzer().analyze_message("We visited grandma with little Maya today", &[]);
        assert!(analysis.people.contains(&"grandma".to_string()));
        assert!(analysis.people.contains(&"Maya".to_string()));
    }

    #[test]
    fn sentence_starts_are_not_names() {
        let analysis = analyzer().analyze_message("Today was good. Everything went fine", &[]);
        assert!(!analysis.people.contains(&"Today".to_string()));
        assert!(!analysis.people.contains(&"Everything".to_string()));
    }

    #[test]
    fn locations_and_time_references() {
        let analysis =
            analyzer().analyze_message("we were at the playground this morning", &[]);
        assert!(analysis.locations.contains(&"playground".to_string()));
        assert!(analysis
            .time_references
            .contains(&"this morning".to_string()));
    }

    #[test]
    fn celebration_memory_and_routine_rules() {
        let a = analyzer();
        assert!(a
            .analyze_message("congrats on the big win", &[])
            .has_category(CategoryKind::Celebration));
        assert!(a
            .analyze_message("remember when we lived by the sea", &[])
            .has_category(CategoryKind::Memory));
        assert!(a
            .analyze_message("bedtime went smoothly as usual", &[])
            .has_category(CategoryKind::Routine));
    }
}
