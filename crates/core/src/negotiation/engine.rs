//! Deterministic negotiation decision procedure.
//!
//! `decide` is a pure function from (terms, state, extracted offer) to a new
//! state plus a tagged decision. The caller renders the reply and commits the
//! state; the fallback responder is never consulted here, so the rule order
//! is testable without any network call.

use crate::errors::DomainError;
use crate::negotiation::state::{SessionState, Terms};

/// Tagged outcome of one negotiation turn, in place of inline branching so
/// the rule list stays independently testable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// One-time opening reply for a first message that carries no offer.
    Greeting,
    /// The deal is already done; nothing mutates after closure.
    AlreadyClosed,
    /// No deterministic rule applies; hand the turn to the fallback responder.
    Delegate,
    /// Offer below the floor. Hard guardrail, round does not advance.
    RejectedBelowFloor { offer: i64 },
    Countered { counter: i64 },
    Accepted { price: i64 },
    /// Serious offer refused; the session stays open for another attempt.
    Refused { offer: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub state: SessionState,
    pub decision: Decision,
}

/// Evaluate one turn in strict priority order:
/// closed > greeting > no offer > below floor > round 0 > round 1 > round 2+.
///
/// A first message that already carries a serious offer skips the greeting
/// and is negotiated immediately; the greeting only answers small talk.
pub fn decide(
    terms: &Terms,
    state: &SessionState,
    offer: Option<i64>,
) -> Result<Turn, DomainError> {
    if state.closed {
        return Ok(Turn { state: *state, decision: Decision::AlreadyClosed });
    }

    let mut next = *state;
    let first_turn = !next.greeted;
    next.greeted = true;

    let Some(offer) = offer else {
        let decision = if first_turn { Decision::Greeting } else { Decision::Delegate };
        return Ok(Turn { state: next, decision });
    };

    if offer < terms.floor_price {
        return commit(terms, state, Turn {
            state: next,
            decision: Decision::RejectedBelowFloor { offer },
        });
    }

    let decision = match next.round {
        0 => {
            let counter =
                offer.saturating_add(terms.round1_increment).max(terms.round1_counter_floor);
            next.ask_price = counter;
            Decision::Countered { counter }
        }
        1 => {
            if offer >= terms.round2_accept_threshold {
                next.closed = true;
                next.ask_price = offer;
                Decision::Accepted { price: offer }
            } else if offer >= terms.round2_accept_threshold - terms.round2_tolerance {
                next.ask_price = terms.round2_counter_price;
                Decision::Countered { counter: terms.round2_counter_price }
            } else {
                Decision::Refused { offer }
            }
        }
        _ => {
            if offer >= terms.round3_accept_threshold {
                next.closed = true;
                next.ask_price = offer;
                Decision::Accepted { price: offer }
            } else if offer >= terms.final_concession_floor {
                // Last concession: close at the fixed final price.
                next.closed = true;
                next.ask_price = terms.final_concession_price;
                Decision::Accepted { price: terms.final_concession_price }
            } else {
                Decision::Refused { offer }
            }
        }
    };

    next.round += 1;
    commit(terms, state, Turn { state: next, decision })
}

/// Defensive invariant gate. A violation rejects the whole turn so no bad
/// deal and no corrupted state is ever committed.
fn commit(terms: &Terms, prev: &SessionState, turn: Turn) -> Result<Turn, DomainError> {
    if let Decision::Accepted { price } = turn.decision {
        if price < terms.floor_price {
            return Err(DomainError::InvariantViolation(format!(
                "accepted price {price} is below floor {}",
                terms.floor_price
            )));
        }
    }
    if turn.state.ask_price < terms.floor_price {
        return Err(DomainError::InvariantViolation(format!(
            "ask price {} fell below floor {}",
            turn.state.ask_price, terms.floor_price
        )));
    }
    if turn.state.round < prev.round {
        return Err(DomainError::InvariantViolation(format!(
            "round regressed from {} to {}",
            prev.round, turn.state.round
        )));
    }
    if prev.closed && !turn.state.closed {
        return Err(DomainError::InvariantViolation("closed session reopened".to_string()));
    }
    Ok(turn)
}

#[cfg(test)]
mod tests {
    use super::{decide, Decision};
    use crate::domain::product::ProductId;
    use crate::negotiation::state::{SessionState, Terms};

    fn terms() -> Terms {
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

    fn opening() -> SessionState {
        SessionState::opening(&terms())
    }

    #[test]
    fn first_small_talk_turn_greets_once() {
        let turn = decide(&terms(), &opening(), None).expect("turn");
        assert_eq!(turn.decision, Decision::Greeting);
        assert!(turn.state.greeted);
        assert_eq!(turn.state.round, 0);

        let followup = decide(&terms(), &turn.state, None).expect("turn");
        assert_eq!(followup.decision, Decision::Delegate);
    }

    #[test]
    fn first_offer_is_negotiated_not_greeted() {
        let turn = decide(&terms(), &opening(), Some(120)).expect("turn");
        assert_eq!(turn.decision, Decision::Countered { counter: 130 });
        assert!(turn.state.greeted);
    }

    #[test]
    fn offer_without_digits_delegates_without_state_change() {
        let mut state = opening();
        state.greeted = true;
        let turn = decide(&terms(), &state, None).expect("turn");
        assert_eq!(turn.decision, Decision::Delegate);
        assert_eq!(turn.state, state);
    }

    #[test]
    fn opening_low_ball_is_hard_rejected() {
        // floor=100, start=150, "can I get it for 70"
        let turn = decide(&terms(), &opening(), Some(70)).expect("turn");
        assert_eq!(turn.decision, Decision::RejectedBelowFloor { offer: 70 });
        assert_eq!(turn.state.round, 0);
        assert!(!turn.state.closed);
        assert_eq!(turn.state.ask_price, 150);
    }

    #[test]
    fn standard_negotiation_counters_then_closes() {
        // First serious offer 120 -> counter max(120+10, 130) = 130.
        let first = decide(&terms(), &opening(), Some(120)).expect("turn");
        assert_eq!(first.decision, Decision::Countered { counter: 130 });
        assert_eq!(first.state.ask_price, 130);
        assert_eq!(first.state.round, 1);

        // Second offer 125 >= round2_accept_threshold (120) -> close at 125.
        let second = decide(&terms(), &first.state, Some(125)).expect("turn");
        assert_eq!(second.decision, Decision::Accepted { price: 125 });
        assert!(second.state.closed);
        assert_eq!(second.state.ask_price, 125);
    }

    #[test]
    fn round_two_tolerance_band_earns_intermediate_counter() {
        let first = decide(&terms(), &opening(), Some(100)).expect("turn");
        assert_eq!(first.decision, Decision::Countered { counter: 130 });

        // 115 is inside [110, 120): counter with the fixed intermediate ask.
        let second = decide(&terms(), &first.state, Some(115)).expect("turn");
        assert_eq!(second.decision, Decision::Countered { counter: 125 });
        assert_eq!(second.state.round, 2);
        assert!(!second.state.closed);
    }

    #[test]
    fn round_two_below_band_is_soft_refused_but_round_advances() {
        let first = decide(&terms(), &opening(), Some(100)).expect("turn");
        let second = decide(&terms(), &first.state, Some(105)).expect("turn");
        assert_eq!(second.decision, Decision::Refused { offer: 105 });
        assert_eq!(second.state.round, 2);
        assert!(!second.state.closed);
    }

    #[test]
    fn final_round_takes_last_concession() {
        let first = decide(&terms(), &opening(), Some(100)).expect("turn");
        let second = decide(&terms(), &first.state, Some(105)).expect("turn");

        // 110 is below round3_accept_threshold (115) but at or above the
        // concession floor (105): close at the fixed final price.
        let third = decide(&terms(), &second.state, Some(110)).expect("turn");
        assert_eq!(third.decision, Decision::Accepted { price: 115 });
        assert!(third.state.closed);
    }

    #[test]
    fn final_round_accepts_at_offer_when_high_enough() {
        let first = decide(&terms(), &opening(), Some(100)).expect("turn");
        let second = decide(&terms(), &first.state, Some(105)).expect("turn");
        let third = decide(&terms(), &second.state, Some(118)).expect("turn");
        assert_eq!(third.decision, Decision::Accepted { price: 118 });
    }

    #[test]
    fn closed_session_is_idempotent() {
        let first = decide(&terms(), &opening(), Some(120)).expect("turn");
        let closed = decide(&terms(), &first.state, Some(125)).expect("turn");
        assert!(closed.state.closed);

        for offer in [None, Some(1), Some(500)] {
            let after = decide(&terms(), &closed.state, offer).expect("turn");
            assert_eq!(after.decision, Decision::AlreadyClosed);
            assert_eq!(after.state, closed.state);
        }
    }

    #[test]
    fn floor_invariant_holds_across_offer_sequences() {
        let terms = terms();
        let sequences: Vec<Vec<i64>> = vec![
            vec![70, 100, 101, 102, 103],
            vec![100, 110, 104, 200],
            vec![120, 125],
            vec![150, 99, 100, 100, 100, 300],
            vec![1, 2, 3, 4, 5],
        ];

        for offers in sequences {
            let mut state = SessionState::opening(&terms);
            for offer in offers {
                let turn = decide(&terms, &state, Some(offer)).expect("turn");
                if let Decision::Accepted { price } = turn.decision {
                    assert!(price >= terms.floor_price, "closed below floor at {price}");
                }
                assert!(turn.state.ask_price >= terms.floor_price);
                assert!(turn.state.round >= state.round);
                state = turn.state;
            }
        }
    }

    #[test]
    fn bounded_termination_after_three_serious_offers() {
        let terms = terms();
        let mut state = SessionState::opening(&terms);
        // Serious offers that never reach any acceptance threshold band.
        for _ in 0..3 {
            state = decide(&terms, &state, Some(100)).expect("turn").state;
        }
        assert!(state.round >= 2);

        // Stable terminal refusal: further low serious offers never counter
        // again and never close.
        for _ in 0..5 {
            let turn = decide(&terms, &state, Some(100)).expect("turn");
            assert_eq!(turn.decision, Decision::Refused { offer: 100 });
            assert!(!turn.state.closed);
            assert_eq!(turn.state.ask_price, state.ask_price);
            state = turn.state;
        }
    }

    #[test]
    fn concession_below_floor_is_rejected_not_committed() {
        // Defensive depth: config validation forbids these terms, but the
        // commit gate must still refuse the deal if they ever slip through.
        let mut terms = terms();
        terms.final_concession_price = 90;

        let first = decide(&terms, &opening(), Some(100)).expect("turn");
        let second = decide(&terms, &first.state, Some(105)).expect("turn");

        // 110 lands in the concession band, which would close at 90 < floor.
        let error = decide(&terms, &second.state, Some(110)).expect_err("turn must be rejected");
        assert!(matches!(error, crate::errors::DomainError::InvariantViolation(_)));
    }

    #[test]
    fn huge_offer_does_not_overflow_the_counter() {
        let turn = decide(&terms(), &opening(), Some(i64::MAX - 1)).expect("turn");
        assert!(matches!(turn.decision, Decision::Countered { counter } if counter == i64::MAX));
    }
}
