//! Model tier routing
//!
//! Classifies an inbound message and picks a model tier. Biased toward the
//! more capable tier: only clearly trivial small-talk gets the cheap one.

use regex::RegexSet;
use std::sync::OnceLock;

/// Model capability tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// Cheap/fast model for greetings and acknowledgments
    Light,
    /// Default capable model
    Standard,
}

/// Messages at or above this length always get the standard tier
const LENGTH_THRESHOLD: usize = 120;

/// Action verbs and platform names that signal real work
const COMPLEXITY_KEYWORDS: &[&str] = &[
    "create", "research", "analyze", "write", "generate", "search", "find", "post", "tweet",
    "image", "video", "market", "schedule", "summarize", "explain",
];

fn greeting_patterns() -> &'static RegexSet {
    static PATTERNS: OnceLock<RegexSet> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        RegexSet::new([
            r"(?i)^(hi|hey|hello|yo|sup|howdy)[\s!.,]*$",
            r"(?i)^(thanks|thank you|thx|ty)[\s!.,]*$",
            r"(?i)^(ok|okay|cool|nice|great|got it|sounds good)[\s!.,]*$",
            r"(?i)^(good (morning|afternoon|evening|night))[\s!.,]*$",
            r"(?i)^(lol|haha|:\)|👍)[\s!.,]*$",
        ])
        .expect("greeting patterns are valid")
    })
}

/// Select a model tier for an inbound message.
///
/// Rules in order: long messages and messages containing complexity keywords
/// are standard; short greetings/acknowledgments are light; everything else
/// defaults to standard.
pub fn select_tier(message: &str) -> ModelTier {
    let trimmed = message.trim();

    if trimmed.len() >= LENGTH_THRESHOLD {
        return ModelTier::Standard;
    }

    let lower = trimmed.to_lowercase();
    if COMPLEXITY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return ModelTier::Standard;
    }

    if greeting_patterns().is_match(trimmed) {
        return ModelTier::Light;
    }

    ModelTier::Standard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings_get_light_tier() {
        assert_eq!(select_tier("hey"), ModelTier::Light);
        assert_eq!(select_tier("Thanks!"), ModelTier::Light);
        assert_eq!(select_tier("good morning"), ModelTier::Light);
        assert_eq!(select_tier("ok"), ModelTier::Light);
    }

    #[test]
    fn complexity_keywords_get_standard_tier() {
        assert_eq!(select_tier("research the market for me"), ModelTier::Standard);
        assert_eq!(select_tier("post a tweet"), ModelTier::Standard);
    }

    #[test]
    fn long_messages_get_standard_tier() {
        let long = "a".repeat(LENGTH_THRESHOLD);
        assert_eq!(select_tier(&long), ModelTier::Standard);
    }

    #[test]
    fn keyword_beats_greeting_shape() {
        // "find" inside an otherwise short message still routes standard
        assert_eq!(select_tier("find it"), ModelTier::Standard);
    }

    #[test]
    fn default_is_standard() {
        assert_eq!(select_tier("what do you think about this"), ModelTier::Standard);
    }
}
