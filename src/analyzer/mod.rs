//! Free-text response analysis — lexicon and regex heuristics, no ML.

pub mod lexicon;
pub mod rules;
pub mod types;

pub use rules::ResponseAnalyzer;
pub use types::{Category, CategoryKind, MessageAnalysis, Sentiment, Urgency};
