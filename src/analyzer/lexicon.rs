//! Keyword tables backing the analyzer.
//!
//! All matching is lowercase substring containment. The milestone table is
//! ordered and first-match-wins: a message naming two milestones records the
//! one declared first.

/// Milestone type → trigger phrases, in precedence order.
pub static MILESTONES: &[(&str, &[&str])] = &[
    ("first_steps", &["first steps", "first step", "started walking"]),
    ("first_words", &["first word", "started talking", "first sentence"]),
    ("crawling", &["started crawling", "first crawl"]),
    ("first_tooth", &["first tooth", "tooth came in", "teething"]),
    ("lost_tooth", &["lost a tooth", "lost her tooth", "lost his tooth"]),
    ("birthday", &["birthday", "turns one", "turned one"]),
    ("first_day_of_school", &[
        "first day of school",
        "first day of kindergarten",
        "started school",
        "started kindergarten",
    ]),
    ("graduation", &["graduation", "graduated", "diploma"]),
    ("potty_training", &["potty trained", "potty training", "out of diapers"]),
    ("new_sibling", &["was born", "newborn", "gave birth", "new baby"]),
    ("wedding", &["wedding", "got married", "got engaged"]),
    ("anniversary", &["anniversary"]),
    ("new_home", &["new house", "new home", "moved in"]),
    ("new_job", &["new job", "got promoted", "promotion"]),
];

/// First milestone whose phrase list matches, in declaration order.
pub fn find_milestone(lower: &str) -> Option<&'static str> {
    MILESTONES
        .iter()
        .find(|(_, phrases)| contains_any(lower, phrases))
        .map(|(name, _)| *name)
}

pub static CELEBRATION_WORDS: &[&str] = &[
    "congratulations",
    "congrats",
    "celebrate",
    "celebration",
    "party",
    "so proud",
    "proud of",
    "achievement",
    "yay",
    "hooray",
    "woohoo",
];

pub static CONCERN_WORDS: &[&str] = &[
    "worried",
    "worries",
    "concerned",
    "concern",
    "anxious",
    "nervous",
    "scared",
    "struggling",
    "not sure what to do",
    "fever",
    "sick",
    "hurt",
];

/// Temporal-reference phrases that mark a reminiscence.
pub static MEMORY_WORDS: &[&str] = &[
    "remember when",
    "remember that",
    "remembered",
    "back when",
    "used to",
    "years ago",
    "when she was little",
    "when he was little",
    "when they were little",
    "nostalgic",
    "throwback",
    "miss those days",
];

pub static ROUTINE_WORDS: &[&str] = &[
    "every day",
    "every morning",
    "every night",
    "as usual",
    "usually",
    "routine",
    "bedtime",
    "school run",
    "nap time",
    "morning walk",
];

pub static POSITIVE_WORDS: &[&str] = &[
    "happy", "love", "loved", "great", "wonderful", "amazing", "excited",
    "fun", "beautiful", "adorable", "proud", "perfect", "best", "awesome",
    "sweet", "joy", "delighted", "grateful",
];

pub static NEGATIVE_WORDS: &[&str] = &[
    "sad", "upset", "angry", "worried", "tired", "sick", "crying", "hard",
    "difficult", "frustrated", "awful", "terrible", "miserable", "stressed",
    "exhausted", "hurt",
];

pub static POSITIVE_EMOJI: &[&str] = &["😊", "😍", "❤️", "🎉", "👍", "🥰", "😄"];

pub static NEGATIVE_EMOJI: &[&str] = &["😢", "😭", "😞", "💔", "😠", "😩"];

pub static URGENT_WORDS: &[&str] = &[
    "emergency",
    "urgent",
    "right now",
    "immediately",
    "asap",
    "hospital",
    "call me",
];

pub static SOON_WORDS: &[&str] = &[
    "soon",
    "today",
    "tonight",
    "this week",
    "need to",
    "important",
    "don't forget",
    "reminder",
];

/// Topic label → trigger keywords.
pub static TOPICS: &[(&str, &[&str])] = &[
    ("food", &[
        "dinner", "lunch", "breakfast", "cooking", "recipe", "meal", "baking",
        "food",
    ]),
    ("school", &["school", "homework", "teacher", "class", "kindergarten"]),
    ("sports", &["soccer", "game", "practice", "team", "swimming", "bike"]),
    ("family", &["grandma", "grandpa", "cousin", "family", "aunt", "uncle"]),
    ("travel", &["trip", "vacation", "beach", "visit", "travel", "airport"]),
    ("health", &["doctor", "sick", "fever", "checkup", "dentist"]),
    ("development", &[
        "growing", "learning", "development", "milestone", "progress", "taller",
    ]),
    ("play", &["playing", "played", "toys", "lego", "playground"]),
    ("holidays", &[
        "christmas", "halloween", "thanksgiving", "easter", "holiday",
    ]),
];

/// Words that become tags directly when present.
pub static TAG_VOCABULARY: &[&str] = &[
    "family", "baby", "kids", "love", "fun", "cute", "happy", "school",
    "vacation", "birthday", "holiday", "food", "outdoors", "art", "music",
    "pets", "friends", "home",
];

pub static PEOPLE_WORDS: &[&str] = &[
    "mom", "dad", "mommy", "daddy", "grandma", "grandpa", "nana", "papa",
    "brother", "sister", "aunt", "uncle", "cousin",
];

pub static LOCATION_WORDS: &[&str] = &[
    "park", "school", "home", "beach", "zoo", "museum", "playground",
    "backyard", "library", "hospital", "pool", "church",
];

pub static TIME_REFERENCE_WORDS: &[&str] = &[
    "today",
    "yesterday",
    "tomorrow",
    "this morning",
    "tonight",
    "last night",
    "last week",
    "this weekend",
    "last year",
    "earlier",
];

/// Common sentence openers excluded from the capitalized-name heuristic.
pub static SENTENCE_STARTERS: &[&str] = &[
    "I", "The", "A", "An", "This", "That", "We", "She", "He", "They", "It",
    "My", "Our", "Today", "Yesterday",
];

/// True when any of `needles` occurs in `haystack`.
pub fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// How many of `needles` occur in `haystack` (each counted once).
pub fn count_hits(haystack: &str, needles: &[&str]) -> usize {
    needles.iter().filter(|n| haystack.contains(*n)).count()
}
