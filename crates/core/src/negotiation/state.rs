use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;

/// Per-product negotiation thresholds. Loaded from configuration at startup
/// and immutable for the lifetime of every session opened against them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terms {
    pub product_id: ProductId,
    pub product_name: String,
    /// Opening ask quoted before any serious offer arrives.
    pub start_price: i64,
    /// Absolute minimum acceptable price. No code path closes below it.
    pub floor_price: i64,
    pub round1_increment: i64,
    pub round1_counter_floor: i64,
    pub round2_accept_threshold: i64,
    pub round2_tolerance: i64,
    pub round2_counter_price: i64,
    pub round3_accept_threshold: i64,
    pub final_concession_floor: i64,
    pub final_concession_price: i64,
}

/// Mutable per-conversation negotiation state. Process-memory only; lost on
/// restart or explicit reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub ask_price: i64,
    /// Count of serious (numeric, at-or-above-floor) offers processed.
    pub round: u32,
    pub closed: bool,
    pub greeted: bool,
}

impl SessionState {
    pub fn opening(terms: &Terms) -> Self {
        Self { ask_price: terms.start_price, round: 0, closed: false, greeted: false }
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionState, Terms};
    use crate::domain::product::ProductId;

    fn terms_fixture() -> Terms {
        Terms {
            product_id: ProductId("clay-lamp".to_string()),
            product_name: "Clay Lamp".to_string(),
            start_price: 150,
            floor_price: 100,
            round1_increment: 10,
            round1_counter_floor: 130,
            round2_accept_threshold: 120,
            round2_tolerance: 10,
            round2_counter_price: 125,
            round3_accept_threshold: 115,
            final_concession_floor: 105,
            final_concession_price: 115,
        }
    }

    #[test]
    fn opening_state_quotes_the_start_price() {
        let state = SessionState::opening(&terms_fixture());
        assert_eq!(state.ask_price, 150);
        assert_eq!(state.round, 0);
        assert!(!state.closed);
        assert!(!state.greeted);
    }
}
