//! SmartPrompt — the durable nudge object the engine manages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a prompt is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptType {
    Checkin,
    Milestone,
    Memory,
    Followup,
    Celebration,
    LeafCaption,
    LeafTags,
}

impl PromptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkin => "checkin",
            Self::Milestone => "milestone",
            Self::Memory => "memory",
            Self::Followup => "followup",
            Self::Celebration => "celebration",
            Self::LeafCaption => "leaf_caption",
            Self::LeafTags => "leaf_tags",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "checkin" => Some(Self::Checkin),
            "milestone" => Some(Self::Milestone),
            "memory" => Some(Self::Memory),
            "followup" => Some(Self::Followup),
            "celebration" => Some(Self::Celebration),
            "leaf_caption" => Some(Self::LeafCaption),
            "leaf_tags" => Some(Self::LeafTags),
            _ => None,
        }
    }

    /// Conversational prompts aimed at a member, as opposed to the content
    /// assist types. Only these count against the one-pending-per-branch gate.
    pub fn is_proactive(&self) -> bool {
        !matches!(self, Self::LeafCaption | Self::LeafTags)
    }
}

/// Stored lifecycle state.
///
/// `Expired` is never written by the response path; validity is derived at
/// read time from `expires_at` and the cleanup sweep deletes lapsed rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStatus {
    Pending,
    Responded,
    Dismissed,
    Expired,
}

impl PromptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
            Self::Dismissed => "dismissed",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "responded" => Some(Self::Responded),
            "dismissed" => Some(Self::Dismissed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// Where a prompt's text came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiMetadata {
    /// "patterns", "demo", or a provider name.
    pub provider: String,
    pub model: String,
    pub confidence: f32,
    /// Template name when a template bank produced the text.
    pub template: Option<String>,
}

/// A system-generated conversational nudge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartPrompt {
    pub id: Uuid,
    pub branch_id: String,
    pub user_id: String,
    pub content: String,
    pub prompt_type: PromptType,
    pub suggested_responses: Vec<String>,
    pub ai_metadata: AiMetadata,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: PromptStatus,
}

impl SmartPrompt {
    /// Status as a reader should see it: a stored `Pending` past its expiry
    /// reads as `Expired`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> PromptStatus {
        if self.status == PromptStatus::Pending && now >= self.expires_at {
            PromptStatus::Expired
        } else {
            self.status
        }
    }

    /// Still answerable at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == PromptStatus::Pending
    }
}
