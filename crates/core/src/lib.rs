//! Deterministic heart of the haggle shopkeeper.
//!
//! The negotiation engine is a pure decision procedure: it alone decides
//! whether an offer is accepted, countered, or rejected, and the floor price
//! is enforced here and nowhere else. The fallback text provider is strictly
//! a phrasing aid for turns the rules do not cover; it never sets prices.

pub mod config;
pub mod domain;
pub mod errors;
pub mod negotiation;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
pub use domain::product::ProductId;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use negotiation::{decide, Decision, SessionState, Terms, Turn};
