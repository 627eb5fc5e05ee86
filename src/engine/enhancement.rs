//! Leaf enhancement — best-effort caption/tag suggestions for new content.
//!
//! Provider-backed structured-JSON requests when a provider is configured,
//! with a deterministic rule-based fallback that always produces something.
//! Unlike proactive scheduling, the batch path fans out concurrently: these
//! calls sit on the content-creation hot path.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::analyzer::{lexicon, ResponseAnalyzer, Sentiment};
use crate::confidence::ConfidenceModel;
use crate::llm::{ChatMessage, ProviderClient};

/// A leaf awaiting enhancement, with whatever context the caller has.
#[derive(Debug, Clone)]
pub struct LeafEnhancementRequest {
    pub content: String,
    pub media_urls: Vec<String>,
    pub author_name: Option<String>,
    pub branch_name: Option<String>,
    pub tree_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Suggested enhancements for one leaf.
#[derive(Debug, Clone)]
pub struct LeafEnhancementResult {
    pub caption: String,
    pub tags: Vec<String>,
    pub milestone: Option<String>,
    /// Life-season bucket when an age is mentioned, else the calendar season.
    pub season: String,
    pub confidence: f32,
    /// "provider" or "rules".
    pub source: String,
}

/// Content-quality tier for a draft leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

/// Quality assessment with prioritized improvement suggestions.
#[derive(Debug, Clone)]
pub struct LeafContentAnalysis {
    pub quality: QualityTier,
    pub score: u32,
    /// At most 4, most useful first.
    pub suggestions: Vec<String>,
}

/// Shape the provider is asked to return.
#[derive(Deserialize)]
struct ProviderEnhancement {
    caption: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    milestone: Option<String>,
    #[serde(default)]
    season: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Best-effort content assist over an optional provider.
pub struct LeafEnhancer {
    provider: Option<Arc<dyn ProviderClient>>,
    analyzer: ResponseAnalyzer,
}

impl LeafEnhancer {
    pub fn new(provider: Option<Arc<dyn ProviderClient>>) -> Self {
        Self {
            provider,
            analyzer: ResponseAnalyzer::new(),
        }
    }

    /// Enhance one leaf. Provider failures degrade to the rule-based path.
    pub async fn enhance_leaf(&self, request: &LeafEnhancementRequest) -> LeafEnhancementResult {
        if let Some(provider) = &self.provider {
            match self.enhance_via_provider(provider.as_ref(), request).await {
                Ok(result) => return result,
                Err(reason) => {
                    warn!(%reason, "Provider enhancement failed, using rule-based fallback");
                }
            }
        }
        self.enhance_via_rules(request)
    }

    /// Enhance a batch concurrently.
    pub async fn enhance_batch(
        &self,
        requests: &[LeafEnhancementRequest],
    ) -> Vec<LeafEnhancementResult> {
        join_all(requests.iter().map(|r| self.enhance_leaf(r))).await
    }

    async fn enhance_via_provider(
        &self,
        provider: &dyn ProviderClient,
        request: &LeafEnhancementRequest,
    ) -> Result<LeafEnhancementResult, String> {
        let mut context = String::new();
        if let Some(author) = &request.author_name {
            context.push_str(&format!(" Author: {author}."));
        }
        if let Some(branch) = &request.branch_name {
            context.push_str(&format!(" Branch: {branch}."));
        }
        if let Some(tree) = &request.tree_name {
            context.push_str(&format!(" Tree: {tree}."));
        }

        let messages = [
            ChatMessage::system(
                "You caption family memories. Respond with a single JSON object, no prose: \
                 {\"caption\": string, \"tags\": [string], \"milestone\": string or null, \
                 \"season\": string or null, \"confidence\": number 0-1}",
            ),
            ChatMessage::user(format!(
                "Suggest a caption and tags for this family moment.{context} \
                 Media attachments: {}. Text: \"{}\"",
                request.media_urls.len(),
                request.content,
            )),
        ];

        let text = provider
            .complete(&messages)
            .await
            .map_err(|e| e.to_string())?;
        let parsed: ProviderEnhancement =
            serde_json::from_str(strip_code_fences(&text)).map_err(|e| e.to_string())?;

        Ok(LeafEnhancementResult {
            caption: parsed.caption,
            tags: parsed.tags,
            milestone: parsed.milestone,
            season: parsed
                .season
                .unwrap_or_else(|| infer_season(&request.content, request.created_at)),
            confidence: parsed.confidence.unwrap_or(0.75).clamp(0.0, 1.0),
            source: "provider".into(),
        })
    }

    /// Deterministic fallback: analyzer tags, milestone-phrase lookup,
    /// age-bucketed season inference.
    fn enhance_via_rules(&self, request: &LeafEnhancementRequest) -> LeafEnhancementResult {
        let analysis = self
            .analyzer
            .analyze_message(&request.content, &request.media_urls);
        let tags = self.analyzer.generate_suggested_tags(&analysis);

        let caption = match &analysis.milestone {
            Some(milestone) => format!("A big moment: {}! 🎉", milestone.replace('_', " ")),
            None => {
                let first_sentence: String = request
                    .content
                    .split(['.', '!', '?'])
                    .next()
                    .unwrap_or("")
                    .trim()
                    .chars()
                    .take(80)
                    .collect();
                if first_sentence.is_empty() {
                    "A little moment worth keeping".to_string()
                } else {
                    first_sentence
                }
            }
        };

        let mut model = ConfidenceModel::new(0.4);
        model.add_if(analysis.milestone.is_some(), "milestone matched", 0.3);
        model.add_if(!tags.is_empty(), "tags matched", 0.1);
        model.add_if(
            analysis.sentiment != Sentiment::Neutral,
            "clear sentiment",
            0.05,
        );

        LeafEnhancementResult {
            caption,
            tags,
            milestone: analysis.milestone,
            season: infer_season(&request.content, request.created_at),
            confidence: model.score(),
            source: "rules".into(),
        }
    }

    /// Grade a draft leaf and suggest what would make it richer.
    pub fn analyze_leaf_content(&self, content: &str) -> LeafContentAnalysis {
        let lower = content.to_lowercase();
        let words = content.split_whitespace().count();

        let has_emotion = lexicon::contains_any(&lower, lexicon::POSITIVE_WORDS)
            || lexicon::contains_any(&lower, lexicon::NEGATIVE_WORDS);
        let has_context = lexicon::contains_any(&lower, lexicon::TIME_REFERENCE_WORDS)
            || lexicon::contains_any(&lower, lexicon::LOCATION_WORDS);
        let has_people = lexicon::contains_any(&lower, lexicon::PEOPLE_WORDS);
        let has_action = lexicon::contains_any(&lower, ACTION_WORDS);

        let mut score = 0u32;
        if has_emotion {
            score += 1;
        }
        if has_context {
            score += 1;
        }
        if has_people {
            score += 1;
        }
        if has_action {
            score += 1;
        }
        if words >= 10 {
            score += 1;
        }
        if words >= 25 {
            score += 1;
        }

        let quality = if score >= 4 {
            QualityTier::High
        } else if score >= 2 {
            QualityTier::Medium
        } else {
            QualityTier::Low
        };

        let mut suggestions = Vec::new();
        if !has_emotion {
            suggestions.push("Add how the moment felt".to_string());
        }
        if !has_people {
            suggestions.push("Mention who was there".to_string());
        }
        if !has_context {
            suggestions.push("Say where or when it happened".to_string());
        }
        if words < 10 {
            suggestions.push("A couple more sentences would bring it to life".to_string());
        }
        if !has_action {
            suggestions.push("Describe what everyone was doing".to_string());
        }
        suggestions.truncate(4);

        LeafContentAnalysis {
            quality,
            score,
            suggestions,
        }
    }
}

static ACTION_WORDS: &[&str] = &[
    "played", "ran", "walked", "laughed", "danced", "sang", "built", "made",
    "cooked", "baked", "visited", "climbed", "jumped", "drew", "read",
];

/// Season for a leaf: an age mention buckets into a life season, otherwise
/// the calendar season of the timestamp.
fn infer_season(content: &str, created_at: DateTime<Utc>) -> String {
    use chrono::Datelike;

    let lower = content.to_lowercase();
    if let Some(age_months) = parse_age_months(&lower) {
        return match age_months {
            0..=11 => "baby days".to_string(),
            12..=35 => "toddler years".to_string(),
            36..=59 => "preschool years".to_string(),
            _ => "school years".to_string(),
        };
    }

    match created_at.month() {
        3..=5 => "spring",
        6..=8 => "summer",
        9..=11 => "autumn",
        _ => "winter",
    }
    .to_string()
}

/// Parse "N months/years/weeks old" into months.
fn parse_age_months(lower: &str) -> Option<u32> {
    static AGE_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = AGE_RE
        .get_or_init(|| regex::Regex::new(r"(\d+)\s+(month|year|week)s?\s+old").unwrap());
    let caps = re.captures(lower)?;
    let n: u32 = caps[1].parse().ok()?;
    Some(match &caps[2] {
        "year" => n * 12,
        "week" => n / 4,
        _ => n,
    })
}

/// Trim optional markdown code fences around provider JSON.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct JsonProvider {
        reply: String,
    }

    #[async_trait]
    impl ProviderClient for JsonProvider {
        fn name(&self) -> &'static str {
            "json"
        }
        fn model(&self) -> &str {
            "json-1"
        }
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ProviderError> {
            Ok(self.reply.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ProviderClient for FailingProvider {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn model(&self) -> &str {
            "failing-1"
        }
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ProviderError> {
            Err(ProviderError::RequestFailed {
                provider: "failing".into(),
                reason: "boom".into(),
            })
        }
    }

    fn request(content: &str) -> LeafEnhancementRequest {
        LeafEnhancementRequest {
            content: content.into(),
            media_urls: vec![],
            author_name: None,
            branch_name: None,
            tree_name: None,
            created_at: Utc.with_ymd_and_hms(2026, 7, 4, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn rules_fallback_detects_milestone_and_tags() {
        let enhancer = LeafEnhancer::new(None);
        let result = enhancer
            .enhance_leaf(&request("she took her first steps today! #family"))
            .await;
        assert_eq!(result.source, "rules");
        assert_eq!(result.milestone.as_deref(), Some("first_steps"));
        assert!(result.caption.contains("first steps"));
        assert!(result.tags.contains(&"family".to_string()));
        assert!(result.confidence > 0.5);
    }

    #[tokio::test]
    async fn rules_caption_falls_back_to_first_sentence() {
        let enhancer = LeafEnhancer::new(None);
        let result = enhancer
            .enhance_leaf(&request("Lazy picnic by the river. Everyone napped after."))
            .await;
        assert_eq!(result.caption, "Lazy picnic by the river");
    }

    #[tokio::test]
    async fn age_mentions_bucket_the_season() {
        let enhancer = LeafEnhancer::new(None);
        let result = enhancer
            .enhance_leaf(&request("she is 18 months old and unstoppable"))
            .await;
        assert_eq!(result.season, "toddler years");

        let result = enhancer
            .enhance_leaf(&request("7 years old already"))
            .await;
        assert_eq!(result.season, "school years");
    }

    #[tokio::test]
    async fn calendar_season_without_age() {
        let enhancer = LeafEnhancer::new(None);
        let result = enhancer.enhance_leaf(&request("beach day")).await;
        assert_eq!(result.season, "summer");
    }

    #[tokio::test]
    async fn provider_json_is_used_when_valid() {
        let provider = Arc::new(JsonProvider {
            reply: r#"{"caption":"First splash","tags":["pool","summer"],"milestone":null,"season":"summer","confidence":0.9}"#
                .into(),
        });
        let enhancer = LeafEnhancer::new(Some(provider));
        let result = enhancer.enhance_leaf(&request("pool day")).await;
        assert_eq!(result.source, "provider");
        assert_eq!(result.caption, "First splash");
        assert_eq!(result.confidence, 0.9);
    }

    #[tokio::test]
    async fn fenced_provider_json_still_parses() {
        let provider = Arc::new(JsonProvider {
            reply: "```json\n{\"caption\":\"Park\",\"tags\":[]}\n```".into(),
        });
        let enhancer = LeafEnhancer::new(Some(provider));
        let result = enhancer.enhance_leaf(&request("park day")).await;
        assert_eq!(result.source, "provider");
        assert_eq!(result.caption, "Park");
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_rules() {
        let enhancer = LeafEnhancer::new(Some(Arc::new(FailingProvider)));
        let result = enhancer.enhance_leaf(&request("garden afternoon")).await;
        assert_eq!(result.source, "rules");
    }

    #[tokio::test]
    async fn unparseable_provider_output_degrades_to_rules() {
        let provider = Arc::new(JsonProvider {
            reply: "Sure! Here are some ideas: ...".into(),
        });
        let enhancer = LeafEnhancer::new(Some(provider));
        let result = enhancer.enhance_leaf(&request("garden afternoon")).await;
        assert_eq!(result.source, "rules");
    }

    #[tokio::test]
    async fn batch_enhances_every_request() {
        let enhancer = LeafEnhancer::new(None);
        let requests: Vec<LeafEnhancementRequest> = (0..5)
            .map(|i| request(&format!("moment number {i}")))
            .collect();
        let results = enhancer.enhance_batch(&requests).await;
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn content_analysis_tiers() {
        let enhancer = LeafEnhancer::new(None);

        let low = enhancer.analyze_leaf_content("nice");
        assert_eq!(low.quality, QualityTier::Low);
        assert!(!low.suggestions.is_empty());
        assert!(low.suggestions.len() <= 4);

        let medium = enhancer.analyze_leaf_content("We laughed at the park this morning");
        assert_eq!(medium.quality, QualityTier::Medium);

        let high = enhancer.analyze_leaf_content(
            "Grandma visited today and we baked bread together all afternoon; the kids \
             laughed so hard they could barely knead, and everyone was happy and flour-dusted.",
        );
        assert_eq!(high.quality, QualityTier::High);
        assert!(high.suggestions.len() <= 4);
    }

    #[test]
    fn rich_content_gets_fewer_suggestions() {
        let enhancer = LeafEnhancer::new(None);
        let sparse = enhancer.analyze_leaf_content("nice");
        let rich = enhancer.analyze_leaf_content(
            "Grandma visited today and we baked bread together all afternoon at home; \
             everyone was happy.",
        );
        assert!(rich.suggestions.len() < sparse.suggestions.len());
    }
}
