//! AIService — builds role-conditioned prompts, runs them through the
//! provider, and extracts structured data from whatever comes back.
//!
//! The extraction step reuses the analyzer's lexicons in a lighter form: the
//! provider's output is our own generated text, so only topics, people,
//! milestone and rough sentiment are worth pulling out.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::analyzer::lexicon;
use crate::analyzer::Sentiment;
use crate::confidence::ConfidenceModel;
use crate::context::{AiContext, TimeOfDay};
use crate::error::ProviderError;
use crate::llm::{ChatMessage, ProviderClient, Role};
use crate::prompt::PromptType;

/// Structured data pulled from generated text.
#[derive(Debug, Clone, Default)]
pub struct ExtractedData {
    pub topics: Vec<String>,
    pub people: Vec<String>,
    pub milestone: Option<String>,
    pub sentiment: Option<Sentiment>,
}

/// One provider-generated prompt plus its grading.
#[derive(Debug, Clone)]
pub struct GeneratedPrompt {
    pub content: String,
    pub prompt_type: PromptType,
    pub confidence: f32,
    pub extracted: ExtractedData,
    pub provider: String,
    pub model: String,
}

/// Bounded rolling message history for one (branch, user) conversation.
#[derive(Debug, Default)]
struct PromptMemory {
    messages: Vec<ChatMessage>,
}

impl PromptMemory {
    fn push(&mut self, message: ChatMessage, cap: usize) {
        self.messages.push(message);
        while self.messages.len() > cap {
            self.messages.remove(0);
        }
    }

    fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Thin integration layer over the external text-generation provider.
pub struct AiService {
    provider: Option<Arc<dyn ProviderClient>>,
    history: RwLock<HashMap<(String, String), PromptMemory>>,
    history_cap: usize,
}

impl AiService {
    pub fn new(provider: Option<Arc<dyn ProviderClient>>, history_cap: usize) -> Self {
        Self {
            provider,
            history: RwLock::new(HashMap::new()),
            history_cap,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Pick the instruction block for a fresh prompt.
    ///
    /// Milestone language in the last exchange wins; a cold conversation
    /// (long gap, or an evening with no history at all) gets a check-in;
    /// everything else invites a memory.
    pub fn pick_prompt_type(
        last_message: Option<&str>,
        hours_since_last: Option<i64>,
        ctx: &AiContext,
    ) -> PromptType {
        if let Some(last) = last_message {
            if lexicon::find_milestone(&last.to_lowercase()).is_some() {
                return PromptType::Milestone;
            }
        }
        let no_history = last_message.is_none();
        if hours_since_last.is_some_and(|h| h > 24)
            || (ctx.time.bucket == TimeOfDay::Evening && no_history)
        {
            return PromptType::Checkin;
        }
        PromptType::Memory
    }

    /// Generate a fresh prompt for a (branch, user) conversation.
    ///
    /// Provider failures raise to the caller — no retry at this layer.
    pub async fn generate_prompt(
        &self,
        branch_id: &str,
        user_id: &str,
        ctx: &AiContext,
        hours_since_last: Option<i64>,
        seed_template: Option<&str>,
    ) -> Result<GeneratedPrompt, ProviderError> {
        let provider = self.provider.as_ref().ok_or(ProviderError::NotConfigured)?;

        let key = (branch_id.to_string(), user_id.to_string());
        let (prompt_type, mut messages) = {
            let history = self.history.read().await;
            let memory = history.get(&key);
            let prompt_type = Self::pick_prompt_type(
                memory.and_then(|m| m.last_user_message()),
                hours_since_last,
                ctx,
            );
            let mut messages = vec![ChatMessage::system(self.system_message(ctx, prompt_type))];
            if let Some(memory) = memory {
                messages.extend(memory.messages.iter().cloned());
            }
            (prompt_type, messages)
        };

        let request = self.generation_request(ctx, prompt_type, seed_template);
        messages.push(ChatMessage::user(request.clone()));

        let text = provider.complete(&messages).await?;
        debug!(branch = branch_id, user = user_id, ?prompt_type, "Provider prompt generated");

        {
            let mut history = self.history.write().await;
            let memory = history.entry(key).or_default();
            memory.push(ChatMessage::user(request), self.history_cap);
            memory.push(ChatMessage::assistant(text.clone()), self.history_cap);
        }

        Ok(GeneratedPrompt {
            extracted: extract_structured_data(&text),
            confidence: response_confidence(&text),
            provider: provider.name().to_string(),
            model: provider.model().to_string(),
            content: text,
            prompt_type,
        })
    }

    /// Turn a user's answer into a follow-up prompt.
    ///
    /// Same pipeline as `generate_prompt` with a follow-up system template;
    /// extraction runs over the user's text and ours combined.
    pub async fn process_user_response(
        &self,
        branch_id: &str,
        user_id: &str,
        user_message: &str,
        ctx: &AiContext,
        previous_prompt_type: PromptType,
    ) -> Result<GeneratedPrompt, ProviderError> {
        let provider = self.provider.as_ref().ok_or(ProviderError::NotConfigured)?;

        let key = (branch_id.to_string(), user_id.to_string());
        let mut messages = vec![ChatMessage::system(
            self.follow_up_system_message(ctx, previous_prompt_type),
        )];
        {
            let history = self.history.read().await;
            if let Some(memory) = history.get(&key) {
                messages.extend(memory.messages.iter().cloned());
            }
        }
        messages.push(ChatMessage::user(user_message.to_string()));

        let text = provider.complete(&messages).await?;

        {
            let mut history = self.history.write().await;
            let memory = history.entry(key).or_default();
            memory.push(ChatMessage::user(user_message.to_string()), self.history_cap);
            memory.push(ChatMessage::assistant(text.clone()), self.history_cap);
        }

        let combined = format!("{user_message}\n{text}");
        Ok(GeneratedPrompt {
            extracted: extract_structured_data(&combined),
            confidence: response_confidence(&text),
            provider: provider.name().to_string(),
            model: provider.model().to_string(),
            content: text,
            prompt_type: PromptType::Followup,
        })
    }

    fn system_message(&self, ctx: &AiContext, prompt_type: PromptType) -> String {
        let branch_name = ctx
            .branch
            .as_ref()
            .map(|b| b.name.as_str())
            .unwrap_or("their family branch");
        let style = ctx
            .preferences
            .as_ref()
            .map(|p| format!("{:?}", p.prompt_style).to_lowercase())
            .unwrap_or_else(|| "casual".to_string());

        let instruction = match prompt_type {
            PromptType::Milestone => {
                "A milestone just came up. Ask one warm question that invites them to \
                 capture the moment in detail."
            }
            PromptType::Checkin => {
                "It has been a while. Ask one light, easy check-in question about how \
                 things are going."
            }
            _ => {
                "Invite them to share a specific memory — a small moment, not a big event."
            }
        };

        format!(
            "You are the gentle voice of {branch_name}, a shared family memory space. \
             You nudge {name} to capture everyday moments. It is {time_of_day} in {season}. \
             Keep your tone {style}. Write a single short prompt (one or two sentences), \
             no preamble. {instruction}",
            name = ctx.user_name(),
            time_of_day = ctx.time.bucket.label(),
            season = ctx.time.season.label(),
        )
    }

    fn follow_up_system_message(&self, ctx: &AiContext, previous: PromptType) -> String {
        format!(
            "You are the gentle voice of a shared family memory space. {name} just \
             answered a {previous} prompt. Reply with a single short follow-up question \
             that digs one level deeper into what they shared. No preamble.",
            name = ctx.user_name(),
            previous = previous.as_str(),
        )
    }

    fn generation_request(
        &self,
        ctx: &AiContext,
        prompt_type: PromptType,
        seed_template: Option<&str>,
    ) -> String {
        let mut request = format!(
            "Write a {} prompt for {}.",
            prompt_type.as_str(),
            ctx.user_name()
        );
        if let Some(latest) = ctx.recent_content.first() {
            let snippet: String = latest.content.chars().take(120).collect();
            request.push_str(&format!(" Their branch recently shared: \"{snippet}\"."));
        }
        if let Some(template) = seed_template {
            request.push_str(&format!(" Use this as a starting point: \"{template}\"."));
        }
        request
    }
}

/// Lightweight structured extraction over generated text.
pub fn extract_structured_data(text: &str) -> ExtractedData {
    let lower = text.to_lowercase();

    let topics = lexicon::TOPICS
        .iter()
        .filter(|(_, keywords)| lexicon::contains_any(&lower, keywords))
        .map(|(label, _)| (*label).to_string())
        .collect();

    let people = lexicon::PEOPLE_WORDS
        .iter()
        .filter(|w| lower.contains(*w))
        .map(|w| (*w).to_string())
        .collect();

    let positive = lexicon::count_hits(&lower, lexicon::POSITIVE_WORDS);
    let negative = lexicon::count_hits(&lower, lexicon::NEGATIVE_WORDS);
    let sentiment = if positive == 0 && negative == 0 {
        None
    } else if positive > negative {
        Some(Sentiment::Positive)
    } else if negative > positive {
        Some(Sentiment::Negative)
    } else {
        Some(Sentiment::Neutral)
    };

    ExtractedData {
        topics,
        people,
        milestone: lexicon::find_milestone(&lower).map(String::from),
        sentiment,
    }
}

/// Grade generated text: length, an actual question, and personal address
/// all make a prompt more likely to land.
pub fn response_confidence(text: &str) -> f32 {
    let mut model = ConfidenceModel::new(0.5);
    model.add_if(text.len() > 40, "reasonable length", 0.1);
    model.add_if(text.len() > 80, "substantial length", 0.15);
    let questions = text.matches('?').count().min(2) as f32;
    model.add_if(questions > 0.0, "asks a question", 0.05 * questions);
    let lower = text.to_lowercase();
    model.add_if(
        lower.contains("you") || lower.contains("your"),
        "personally addressed",
        0.1,
    );
    model.score()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Season, TimeContext};
    use crate::store::records::{BranchInfo, UserProfile};
    use async_trait::async_trait;
    use chrono::Weekday;

    struct CannedProvider {
        reply: String,
    }

    #[async_trait]
    impl ProviderClient for CannedProvider {
        fn name(&self) -> &'static str {
            "canned"
        }
        fn model(&self) -> &str {
            "canned-1"
        }
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, ProviderError> {
            Ok(self.reply.clone())
        }
    }

    fn ctx_at(hour: u32) -> AiContext {
        AiContext {
            branch: Some(BranchInfo {
                id: "b".into(),
                tree_id: "t".into(),
                name: "The Riveras".into(),
            }),
            user: Some(UserProfile {
                id: "u".into(),
                display_name: "Ana".into(),
            }),
            recent_content: vec![],
            preferences: None,
            time: TimeContext {
                hour,
                bucket: TimeOfDay::from_hour(hour),
                weekday: Weekday::Tue,
                season: Season::Spring,
            },
        }
    }

    #[test]
    fn prompt_type_milestone_wins() {
        let ctx = ctx_at(10);
        let picked =
            AiService::pick_prompt_type(Some("she took her first steps!"), Some(2), &ctx);
        assert_eq!(picked, PromptType::Milestone);
    }

    #[test]
    fn prompt_type_checkin_on_long_gap() {
        let ctx = ctx_at(10);
        let picked = AiService::pick_prompt_type(Some("we had dinner"), Some(30), &ctx);
        assert_eq!(picked, PromptType::Checkin);
    }

    #[test]
    fn prompt_type_checkin_on_cold_evening() {
        let ctx = ctx_at(20);
        assert_eq!(
            AiService::pick_prompt_type(None, None, &ctx),
            PromptType::Checkin
        );
    }

    #[test]
    fn prompt_type_defaults_to_memory() {
        let ctx = ctx_at(10);
        assert_eq!(
            AiService::pick_prompt_type(Some("we had dinner"), Some(2), &ctx),
            PromptType::Memory
        );
    }

    #[test]
    fn extraction_pulls_topics_people_and_milestone() {
        let data = extract_structured_data(
            "Grandma loved watching her first steps at dinner, what a happy day",
        );
        assert!(data.topics.contains(&"food".to_string()));
        assert!(data.people.contains(&"grandma".to_string()));
        assert_eq!(data.milestone.as_deref(), Some("first_steps"));
        assert_eq!(data.sentiment, Some(Sentiment::Positive));
    }

    #[test]
    fn extraction_is_empty_on_flat_text() {
        let data = extract_structured_data("ok");
        assert!(data.topics.is_empty());
        assert!(data.people.is_empty());
        assert!(data.milestone.is_none());
        assert!(data.sentiment.is_none());
    }

    #[test]
    fn confidence_is_bounded_and_rewards_questions() {
        let short = response_confidence("Hi.");
        let rich = response_confidence(
            "What was the best part of your morning walk with the kids today? \
             Did your little one surprise you again?",
        );
        assert!(short >= 0.0 && short <= 1.0);
        assert!(rich <= 1.0);
        assert!(rich > short);
    }

    #[test]
    fn question_bonus_is_capped() {
        let two = response_confidence("a? b?");
        let five = response_confidence("a? b? c? d? e?");
        assert!((two - five).abs() < 1e-6);
    }

    #[tokio::test]
    async fn generate_prompt_requires_provider() {
        let service = AiService::new(None, 20);
        let err = service
            .generate_prompt("b", "u", &ctx_at(10), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured));
    }

    #[tokio::test]
    async fn generate_prompt_records_history_and_metadata() {
        let provider = Arc::new(CannedProvider {
            reply: "What made you smile with your kids today?".into(),
        });
        let service = AiService::new(Some(provider), 4);

        let first = service
            .generate_prompt("b", "u", &ctx_at(10), None, None)
            .await
            .unwrap();
        assert_eq!(first.provider, "canned");
        assert_eq!(first.model, "canned-1");
        assert!(first.confidence > 0.5);

        // History is bounded: many rounds never exceed the cap.
        for _ in 0..6 {
            service
                .generate_prompt("b", "u", &ctx_at(10), None, None)
                .await
                .unwrap();
        }
        let history = service.history.read().await;
        assert_eq!(history.get(&("b".into(), "u".into())).unwrap().messages.len(), 4);
    }

    #[tokio::test]
    async fn process_user_response_extracts_from_both_sides() {
        let provider = Arc::new(CannedProvider {
            reply: "How did grandma react?".into(),
        });
        let service = AiService::new(Some(provider), 20);

        let result = service
            .process_user_response(
                "b",
                "u",
                "she took her first steps at the park",
                &ctx_at(10),
                PromptType::Checkin,
            )
            .await
            .unwrap();
        assert_eq!(result.prompt_type, PromptType::Followup);
        // Milestone came from the user side, people from ours.
        assert_eq!(result.extracted.milestone.as_deref(), Some("first_steps"));
        assert!(result.extracted.people.contains(&"grandma".to_string()));
    }
}
