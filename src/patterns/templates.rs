//! Template banks for pattern-driven prompt generation.
//!
//! Placeholders: `{name}`, `{time_of_day}`, `{topic}`, `{person}`.
//! Selection is a random index; tests assert bank membership, not exact text.

use crate::prompt::PromptType;

pub static CHECKIN_TEMPLATES: &[&str] = &[
    "Good {time_of_day}, {name}! What's one small moment from today worth keeping?",
    "Hi {name} — how has everyone been{topic}?",
    "{name}, anything new with {person} you'd like to remember later?",
    "Quick {time_of_day} check-in, {name}: what made today feel like today?",
];

pub static MEMORY_TEMPLATES: &[&str] = &[
    "{name}, what's a memory{topic} you keep coming back to?",
    "Think back a bit, {name} — what's a moment with {person} you never wrote down?",
    "A {time_of_day} question, {name}: what did this week remind you of?",
];

pub static MILESTONE_TEMPLATES: &[&str] = &[
    "{name}, your branch has been full of big moments. What's the next one coming up?",
    "Another milestone in the books! {name}, how did {person} react?",
    "{name}, which recent first deserves a longer story?",
];

pub static CELEBRATION_TEMPLATES: &[&str] = &[
    "Time to celebrate, {name}! Who should hear about this first?",
    "{name}, what's the best photo from the celebration with {person}?",
];

pub static FOLLOWUP_TEMPLATES: &[&str] = &[
    "{name}, you mentioned something lovely recently — what happened next?",
    "Following up, {name}: any update{topic} since last time?",
];

/// Canned follow-ups used when no provider is configured.
pub static CANNED_FOLLOWUPS: &[&str] = &[
    "Love that — what happened right before?",
    "Who else was there for it?",
    "Is there a photo that goes with that moment?",
];

/// Demo-tier prompts: always producible, no provider, no history.
pub static DEMO_PROMPTS: &[&str] = &[
    "What's one moment from this week your future self would thank you for saving?",
    "Share the last photo on your phone that made you smile.",
    "What did the kids say this week that deserves to be written down?",
];

/// Topic label → phrase spliced into `{topic}` slots (leading space included).
pub static TOPIC_PHRASES: &[(&str, &str)] = &[
    ("food", " around the dinner table"),
    ("school", " with school"),
    ("sports", " at practice"),
    ("family", " with the family"),
    ("travel", " since the trip"),
    ("health", " health-wise"),
    ("development", " with all that growing up"),
    ("play", " at playtime"),
    ("holidays", " with the holidays coming"),
];

pub static CHECKIN_RESPONSES: &[&str] = &[
    "All good here!",
    "Busy week, but a fun one",
    "Let me share a photo",
];

pub static MEMORY_RESPONSES: &[&str] = &[
    "Oh, I have a story about that",
    "That takes me back",
    "I'd have to dig up the photo",
];

pub static MILESTONE_RESPONSES: &[&str] = &[
    "It was such a big day!",
    "We have it on video!",
    "Everyone was so proud",
];

pub static CELEBRATION_RESPONSES: &[&str] = &[
    "We're so excited!",
    "Party pictures incoming",
];

pub static FOLLOWUP_RESPONSES: &[&str] = &[
    "Since you ask...",
    "Funny you mention it",
];

/// Template bank for a prompt type. Content-assist types never reach the
/// template path and map to the check-in bank.
pub fn templates_for(prompt_type: PromptType) -> &'static [&'static str] {
    match prompt_type {
        PromptType::Checkin => CHECKIN_TEMPLATES,
        PromptType::Memory => MEMORY_TEMPLATES,
        PromptType::Milestone => MILESTONE_TEMPLATES,
        PromptType::Celebration => CELEBRATION_TEMPLATES,
        PromptType::Followup => FOLLOWUP_TEMPLATES,
        PromptType::LeafCaption | PromptType::LeafTags => CHECKIN_TEMPLATES,
    }
}

/// Canned response bank for a prompt type.
pub fn responses_for(prompt_type: PromptType) -> &'static [&'static str] {
    match prompt_type {
        PromptType::Checkin => CHECKIN_RESPONSES,
        PromptType::Memory => MEMORY_RESPONSES,
        PromptType::Milestone => MILESTONE_RESPONSES,
        PromptType::Celebration => CELEBRATION_RESPONSES,
        PromptType::Followup => FOLLOWUP_RESPONSES,
        PromptType::LeafCaption | PromptType::LeafTags => CHECKIN_RESPONSES,
    }
}

/// Phrase for the first matching topic, empty when none match.
pub fn topic_phrase(topics: &[String]) -> &'static str {
    for topic in topics {
        if let Some((_, phrase)) = TOPIC_PHRASES.iter().find(|(label, _)| label == topic) {
            return phrase;
        }
    }
    ""
}
