//! Per-conversation negotiation session.
//!
//! Wraps the offer extractor and the deterministic engine, owns the bounded
//! turn history, and delegates uncovered turns to the fallback responder.
//! A provider failure never escapes a turn: the customer gets a fixed
//! degraded reply and the negotiation state is left exactly as it was.

use std::sync::Arc;
use std::time::Duration;

use haggle_core::negotiation::{decide, Decision, SessionState, Terms};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::offer::OfferExtractor;
use crate::replies;
use crate::responder::{
    CustomerProfile, FallbackContext, HistoryTurn, ProviderError, Responder, Speaker,
};
use crate::sentiment::{tone_for, LexiconScorer, SentimentScorer};

pub struct NegotiationSession {
    terms: Terms,
    state: SessionState,
    history: Vec<HistoryTurn>,
    history_window: usize,
    profile: CustomerProfile,
    extractor: OfferExtractor,
    scorer: LexiconScorer,
    responder: Arc<dyn Responder>,
    provider_timeout: Duration,
}

impl NegotiationSession {
    pub fn new(
        terms: Terms,
        history_window: usize,
        responder: Arc<dyn Responder>,
        provider_timeout: Duration,
    ) -> Self {
        let state = SessionState::opening(&terms);
        Self {
            terms,
            state,
            history: Vec::new(),
            history_window,
            profile: CustomerProfile::default(),
            extractor: OfferExtractor::new(),
            scorer: LexiconScorer::new(),
            responder,
            provider_timeout,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn terms(&self) -> &Terms {
        &self.terms
    }

    pub fn history(&self) -> &[HistoryTurn] {
        &self.history
    }

    /// Profile travels with every request; the latest one wins.
    pub fn set_profile(&mut self, profile: CustomerProfile) {
        if profile.gender.is_some() || profile.age_group.is_some() {
            self.profile = profile;
        }
    }

    /// Process one customer turn end-to-end and return the reply text.
    /// The caller must hold the session lock; state commits are atomic with
    /// respect to other turns on the same session.
    pub async fn handle_message(&mut self, raw: &str) -> String {
        let offer = self.extractor.extract(raw);
        let tone = tone_for(self.scorer.score(raw));

        let turn = match decide(&self.terms, &self.state, offer) {
            Ok(turn) => turn,
            Err(error) => {
                warn!(
                    event_name = "agent.session.turn_rejected",
                    product_id = %self.terms.product_id.0,
                    error = %error,
                    "turn rejected by invariant check; state not committed"
                );
                let reply = replies::turn_rejected();
                self.record(raw, &reply);
                return reply;
            }
        };

        let reply = match &turn.decision {
            Decision::Delegate => match self.delegate(raw).await {
                Ok(text) => text,
                Err(error) => {
                    warn!(
                        event_name = "agent.session.provider_degraded",
                        product_id = %self.terms.product_id.0,
                        error = %error,
                        "fallback provider failed; serving degraded reply"
                    );
                    replies::degraded()
                }
            },
            decision => replies::render(&self.terms, decision, tone),
        };

        if let Decision::Accepted { price } = turn.decision {
            info!(
                event_name = "agent.session.deal_closed",
                product_id = %self.terms.product_id.0,
                price,
                round = turn.state.round,
                "deal closed"
            );
        }

        self.state = turn.state;
        // A closed session mutates nothing further, history included; the
        // fallback can never be reached after closure, so the context is
        // not needed either.
        if turn.decision != Decision::AlreadyClosed {
            self.record(raw, &reply);
        }
        reply
    }

    async fn delegate(&self, raw: &str) -> Result<String, ProviderError> {
        let ctx = FallbackContext {
            product_name: self.terms.product_name.clone(),
            ask_price: self.state.ask_price,
            profile: self.profile.clone(),
        };

        match timeout(self.provider_timeout, self.responder.respond(&ctx, &self.history, raw)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.provider_timeout.as_secs())),
        }
    }

    fn record(&mut self, customer: &str, shopkeeper: &str) {
        self.history.push(HistoryTurn { speaker: Speaker::Customer, text: customer.to_string() });
        self.history
            .push(HistoryTurn { speaker: Speaker::Shopkeeper, text: shopkeeper.to_string() });

        if self.history.len() > self.history_window {
            let excess = self.history.len() - self.history_window;
            self.history.drain(..excess);
        }
    }
}
