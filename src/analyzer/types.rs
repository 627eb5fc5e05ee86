//! Shared types for message analysis.

use serde::{Deserialize, Serialize};

/// What kind of message a category rule recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    PhotoShare,
    Milestone,
    Celebration,
    Concern,
    Question,
    Memory,
    Routine,
    DailyUpdate,
}

impl CategoryKind {
    /// Snake-case label, used for tags and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PhotoShare => "photo_share",
            Self::Milestone => "milestone",
            Self::Celebration => "celebration",
            Self::Concern => "concern",
            Self::Question => "question",
            Self::Memory => "memory",
            Self::Routine => "routine",
            Self::DailyUpdate => "daily_update",
        }
    }
}

/// One matched categorization rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub kind: CategoryKind,
    pub confidence: f32,
    /// Why the rule fired.
    pub reason: String,
}

/// Coarse sentiment classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

/// Message urgency, first-match-wins over keyword tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Structured analysis of a single message.
///
/// Categories are sorted by confidence descending; callers may treat the
/// first entry as the primary classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageAnalysis {
    pub categories: Vec<Category>,
    /// Deduplicated, capped at 8.
    pub tags: Vec<String>,
    pub sentiment: Sentiment,
    pub topics: Vec<String>,
    pub urgency: Urgency,
    pub milestone: Option<String>,
    pub people: Vec<String>,
    pub locations: Vec<String>,
    pub time_references: Vec<String>,
}

impl MessageAnalysis {
    /// Highest-confidence category, if any rule fired.
    pub fn primary_category(&self) -> Option<&Category> {
        self.categories.first()
    }

    pub fn has_category(&self, kind: CategoryKind) -> bool {
        self.categories.iter().any(|c| c.kind == kind)
    }
}
