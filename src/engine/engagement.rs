//! Composite engagement scoring for prompt responses.

use crate::analyzer::{MessageAnalysis, Sentiment};
use crate::context::state::Engagement;

/// Score a response against its analysis.
///
/// Base signals (length, emoji, punctuation) plus analysis-driven bonuses;
/// ≥4 is high, ≥2 medium, else low.
pub fn score_response(response: &str, analysis: &MessageAnalysis) -> Engagement {
    let mut score = 0u32;

    if response.len() > 50 {
        score += 1;
    }
    if response.len() > 150 {
        score += 1;
    }
    if has_emoji(response) {
        score += 1;
    }
    if response.contains('!') || response.contains('?') {
        score += 1;
    }

    if analysis.sentiment == Sentiment::Positive {
        score += 1;
    }
    if analysis.categories.len() > 1 {
        score += 1;
    }
    if analysis.milestone.is_some() {
        score += 2;
    }
    if analysis.topics.len() > 2 {
        score += 1;
    }
    if analysis.people.len() + analysis.locations.len() > 1 {
        score += 1;
    }

    if score >= 4 {
        Engagement::High
    } else if score >= 2 {
        Engagement::Medium
    } else {
        Engagement::Low
    }
}

fn has_emoji(text: &str) -> bool {
    text.chars().any(|c| {
        let cp = c as u32;
        (0x1F300..=0x1FAFF).contains(&cp) || (0x2600..=0x27BF).contains(&cp)
    })
}
