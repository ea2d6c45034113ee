//! Conversational negotiation runtime.
//!
//! This crate is the shopkeeper's "front of house": it turns raw customer
//! text into negotiation turns and replies.
//!
//! # Architecture
//!
//! Each turn runs a constrained pipeline:
//! 1. **Offer extraction** (`offer`) - first digit run in the message
//! 2. **Deterministic decision** (`haggle_core::negotiation`) - accept,
//!    counter, or reject; the engine alone moves prices
//! 3. **Reply rendering** (`replies`, toned by `sentiment`) - or, for turns
//!    no rule covers, delegation to the fallback provider (`responder`)
//!
//! # Safety Principle
//!
//! The LLM is strictly a phrasing aid. It NEVER decides prices or closes
//! deals; those are deterministic decisions made by the negotiation engine,
//! and a provider failure degrades to a fixed reply with state untouched.

pub mod offer;
pub mod registry;
pub mod replies;
pub mod responder;
pub mod sentiment;
pub mod session;

pub use offer::OfferExtractor;
pub use registry::{SessionKey, SessionRegistry};
pub use responder::{
    CustomerProfile, FallbackContext, HistoryTurn, OpenAiResponder, ProviderError, Responder,
    Speaker,
};
pub use sentiment::{tone_for, LexiconScorer, SentimentScorer, Tone};
pub use session::NegotiationSession;
