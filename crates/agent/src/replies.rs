//! Templated shopkeeper replies for deterministic decisions.
//!
//! The sentiment tone only changes phrasing. Prices in a reply always come
//! from the engine's decision, never from this module.

use haggle_core::negotiation::{Decision, Terms};

use crate::sentiment::Tone;

pub fn render(terms: &Terms, decision: &Decision, tone: Tone) -> String {
    let name = &terms.product_name;

    match decision {
        Decision::Greeting => format!(
            "Welcome, welcome! You have a fine eye — the {name} is the best on this street. \
             For you, {} rupees. Tell me your price!",
            terms.start_price
        ),
        Decision::AlreadyClosed => {
            format!("Deal is done, my friend — the {name} is yours! Next customer, please.")
        }
        Decision::RejectedBelowFloor { offer } => match tone {
            Tone::Warm => format!(
                "Arre, {offer} rupees? You joke with an old shopkeeper! For the {name} that \
                 does not even cover my cost. Come, make me a real offer."
            ),
            Tone::Neutral => format!(
                "{offer} rupees I cannot do, not for the {name}. That is below my cost. \
                 Try again with a serious number."
            ),
            Tone::Firm => format!(
                "No. {offer} is an insult for the {name}. Bring a serious offer or good day."
            ),
        },
        Decision::Countered { counter } => match tone {
            Tone::Warm => format!(
                "For a friendly face like yours — {counter} rupees for the {name}, and I am \
                 already losing money. Do we have a deal?"
            ),
            _ => format!(
                "Hmm, you drive a hard bargain. {counter} rupees — that is my price for the \
                 {name}. Take it?"
            ),
        },
        Decision::Accepted { price } => format!(
            "Done! {price} rupees and the {name} is yours. You haggle like a local — \
             come again soon!"
        ),
        Decision::Refused { .. } => match tone {
            Tone::Firm => {
                format!("That will not happen. My price for the {name} stands.")
            }
            _ => format!(
                "I cannot go there, my friend, the {name} is worth more than that. \
                 My price stands — come up a little and we will talk."
            ),
        },
        // The fallback responder supplies the text for delegated turns.
        Decision::Delegate => degraded(),
    }
}

/// Fixed reply when the fallback provider fails or times out. The session
/// state is untouched, so the customer can simply retry.
pub fn degraded() -> String {
    "My voice is hoarse and the shop is noisy — say that once more in a moment, \
     and we will continue our deal."
        .to_string()
}

/// Safe reply when a turn is rejected by an internal invariant check.
pub fn turn_rejected() -> String {
    "Wait, wait — let us not rush. Tell me your price once more.".to_string()
}

#[cfg(test)]
mod tests {
    use haggle_core::domain::product::ProductId;
    use haggle_core::negotiation::{Decision, Terms};

    use super::render;
    use crate::sentiment::Tone;

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

    #[test]
    fn greeting_quotes_the_start_price() {
        let reply = render(&terms(), &Decision::Greeting, Tone::Neutral);
        assert!(reply.contains("150 rupees"));
        assert!(reply.contains("Clay Lamp"));
    }

    #[test]
    fn counter_reply_quotes_the_engine_counter() {
        let reply = render(&terms(), &Decision::Countered { counter: 130 }, Tone::Neutral);
        assert!(reply.contains("130 rupees"));
    }

    #[test]
    fn accept_reply_quotes_the_closing_price() {
        let reply = render(&terms(), &Decision::Accepted { price: 125 }, Tone::Warm);
        assert!(reply.contains("125 rupees"));
    }

    #[test]
    fn tone_changes_phrasing_but_not_the_decision() {
        let warm = render(&terms(), &Decision::RejectedBelowFloor { offer: 70 }, Tone::Warm);
        let firm = render(&terms(), &Decision::RejectedBelowFloor { offer: 70 }, Tone::Firm);
        assert_ne!(warm, firm);
        assert!(warm.contains("70"));
        assert!(firm.contains("70"));
    }
}
