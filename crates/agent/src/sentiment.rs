//! Small lexicon-based sentiment scoring.
//!
//! The score only shades the tone of templated replies. It never moves a
//! price or changes a decision.

pub trait SentimentScorer: Send + Sync {
    /// Scalar in [-1, 1]; positive means friendly, negative means annoyed.
    fn score(&self, text: &str) -> f32;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tone {
    Warm,
    Neutral,
    Firm,
}

pub fn tone_for(score: f32) -> Tone {
    if score >= 0.25 {
        Tone::Warm
    } else if score <= -0.25 {
        Tone::Firm
    } else {
        Tone::Neutral
    }
}

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "nice", "love", "like", "deal", "thanks", "thank", "please", "fine",
    "perfect", "happy", "best", "awesome",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "hate", "no", "never", "expensive", "costly", "cheat", "scam", "terrible", "worst",
    "angry", "ridiculous", "robbery", "forget",
];

#[derive(Clone, Debug, Default)]
pub struct LexiconScorer;

impl LexiconScorer {
    pub fn new() -> Self {
        Self
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f32 {
        let lowered = text.to_lowercase();
        let mut positive = 0i32;
        let mut negative = 0i32;

        for token in lowered.split(|ch: char| !ch.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            if POSITIVE_WORDS.contains(&token) {
                positive += 1;
            } else if NEGATIVE_WORDS.contains(&token) {
                negative += 1;
            }
        }

        let total = positive + negative;
        if total == 0 {
            return 0.0;
        }

        (positive - negative) as f32 / total as f32
    }
}
