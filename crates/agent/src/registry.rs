//! Keyed session registry.
//!
//! One `NegotiationSession` per (conversation, product) pair, each behind
//! its own async mutex so turns on the same session are strictly
//! sequential while unrelated sessions proceed independently. Everything
//! lives in process memory; a restart forgets every negotiation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use haggle_core::errors::DomainError;
use haggle_core::negotiation::{SessionState, Terms};
use tokio::sync::Mutex;
use tracing::info;

use crate::responder::{CustomerProfile, Responder};
use crate::session::NegotiationSession;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub conversation_id: String,
    pub product_id: String,
}

pub struct SessionRegistry {
    catalog: Vec<Terms>,
    sessions: Mutex<HashMap<SessionKey, Arc<Mutex<NegotiationSession>>>>,
    history_window: usize,
    responder: Arc<dyn Responder>,
    provider_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(
        catalog: Vec<Terms>,
        history_window: usize,
        responder: Arc<dyn Responder>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            sessions: Mutex::new(HashMap::new()),
            history_window,
            responder,
            provider_timeout,
        }
    }

    pub fn product_ids(&self) -> Vec<String> {
        self.catalog.iter().map(|terms| terms.product_id.0.clone()).collect()
    }

    pub fn terms_for(&self, product_id: &str) -> Option<&Terms> {
        self.catalog.iter().find(|terms| terms.product_id.0 == product_id)
    }

    /// Run one turn against the keyed session, creating it on first contact.
    /// The per-session lock is held across the whole turn, fallback call
    /// included, so concurrent messages for one session cannot interleave.
    pub async fn handle_message(
        &self,
        conversation_id: &str,
        product_id: &str,
        profile: CustomerProfile,
        message: &str,
    ) -> Result<String, DomainError> {
        let session = self.session(conversation_id, product_id).await?;
        let mut guard = session.lock().await;
        guard.set_profile(profile);
        Ok(guard.handle_message(message).await)
    }

    /// Current state snapshot, if the session exists.
    pub async fn state_of(&self, conversation_id: &str, product_id: &str) -> Option<SessionState> {
        let key = SessionKey {
            conversation_id: conversation_id.to_string(),
            product_id: product_id.to_string(),
        };
        let session = { self.sessions.lock().await.get(&key).cloned() }?;
        let guard = session.lock().await;
        Some(*guard.state())
    }

    /// Drop a session outright; the next message starts a fresh negotiation.
    pub async fn reset(&self, conversation_id: &str, product_id: &str) -> bool {
        let key = SessionKey {
            conversation_id: conversation_id.to_string(),
            product_id: product_id.to_string(),
        };
        let removed = self.sessions.lock().await.remove(&key).is_some();
        if removed {
            info!(
                event_name = "agent.registry.session_reset",
                conversation_id,
                product_id,
                "session reset"
            );
        }
        removed
    }

    async fn session(
        &self,
        conversation_id: &str,
        product_id: &str,
    ) -> Result<Arc<Mutex<NegotiationSession>>, DomainError> {
        let terms = self
            .terms_for(product_id)
            .ok_or_else(|| DomainError::UnknownProduct(product_id.to_string()))?
            .clone();

        let key = SessionKey {
            conversation_id: conversation_id.to_string(),
            product_id: product_id.to_string(),
        };

        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(key)
            .or_insert_with(|| {
                info!(
                    event_name = "agent.registry.session_created",
                    conversation_id,
                    product_id,
                    "session created"
                );
                Arc::new(Mutex::new(NegotiationSession::new(
                    terms,
                    self.history_window,
                    self.responder.clone(),
                    self.provider_timeout,
                )))
            })
            .clone();

        Ok(session)
    }
}
