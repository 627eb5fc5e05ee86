//! Durable record types shared across the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyzer::MessageAnalysis;

/// Append-only analysis of one user response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub user_id: String,
    pub branch_id: String,
    pub response_text: String,
    pub analysis: MessageAnalysis,
    pub created_at: DateTime<Utc>,
}

/// A leaf — user-generated content. Read-only from this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub branch_id: String,
    pub author_id: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub milestone_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Branch metadata. Read-only from this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchInfo {
    pub id: String,
    pub tree_id: String,
    pub name: String,
}

/// Member profile. Read-only from this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
}

/// Branch membership. Read-only from this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub branch_id: String,
    pub user_id: String,
    pub active: bool,
}
