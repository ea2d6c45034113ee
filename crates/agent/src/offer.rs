//! Lexical offer extraction.
//!
//! Known limitation, kept on purpose: the first run of digits wins, so
//! "call me at 9" reads as an offer of 9. Ambiguous inputs are not
//! special-cased; the deterministic rules downstream keep misreads harmless.

/// Pulls a candidate numeric offer out of free text.
#[derive(Clone, Debug, Default)]
pub struct OfferExtractor;

impl OfferExtractor {
    pub fn new() -> Self {
        Self
    }

    /// First run of ASCII decimal digits in the lower-cased text, or `None`
    /// when the message carries no number. No currency symbols, no decimals,
    /// no negatives. Absurdly long digit runs saturate instead of panicking.
    pub fn extract(&self, text: &str) -> Option<i64> {
        let lowered = text.to_lowercase();
        let mut digits = String::new();

        for ch in lowered.chars() {
            if ch.is_ascii_digit() {
                digits.push(ch);
            } else if !digits.is_empty() {
                break;
            }
        }

        if digits.is_empty() {
            return None;
        }

        Some(digits.parse::<i64>().unwrap_or(i64::MAX))
    }
}
