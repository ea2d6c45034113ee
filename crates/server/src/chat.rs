//! Chat transport routes.
//!
//! Endpoints:
//! - `POST /negotiate` — one negotiation turn, `{ message, ... }` in,
//!   `{ response }` out
//! - `GET  /`          — static status payload
//! - `GET  /widget`    — embedded chat widget (HTML)
//! - `GET  /health`    — readiness payload (see `health`)
//!
//! Failures stay conversational: every error body still carries a
//! `response` string the widget can print, plus a correlation id.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use haggle_agent::{CustomerProfile, SessionRegistry};
use haggle_core::errors::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::{info, warn};
use uuid::Uuid;

use crate::health;

const DEFAULT_CONVERSATION: &str = "default";

#[derive(Clone)]
pub struct ChatState {
    pub registry: Arc<SessionRegistry>,
    pub default_product: String,
    pub llm_provider: String,
    templates: Arc<Tera>,
}

#[derive(Debug, Deserialize)]
pub struct NegotiateRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub product_id: Option<String>,
    pub gender: Option<String>,
    pub age_group: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NegotiateResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub response: String,
    pub correlation_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub status: &'static str,
    pub default_product: String,
    pub catalog: Vec<String>,
    pub checked_at: String,
}

/// Load widget templates from disk, with the embedded copy as fallback so
/// the binary works from any working directory.
fn init_templates() -> Arc<Tera> {
    let mut tera = match Tera::new("templates/**/*.html") {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "failed to load templates from filesystem, using embedded copies");
            Tera::default()
        }
    };

    tera.add_raw_template("widget.html", include_str!("../../../templates/widget.html")).ok();

    Arc::new(tera)
}

pub fn router(
    registry: Arc<SessionRegistry>,
    default_product: String,
    llm_provider: String,
) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/negotiate", post(negotiate))
        .route("/widget", get(widget_page))
        .route("/health", get(health::health))
        .with_state(ChatState {
            registry,
            default_product,
            llm_provider,
            templates: init_templates(),
        })
}

pub async fn negotiate(
    State(state): State<ChatState>,
    Json(request): Json<NegotiateRequest>,
) -> Result<Json<NegotiateResponse>, (StatusCode, Json<ErrorBody>)> {
    let correlation_id = Uuid::new_v4().to_string();

    if request.message.trim().is_empty() {
        let interface = InterfaceError::BadRequest {
            message: "message must not be empty".to_string(),
            correlation_id: correlation_id.clone(),
        };
        return Err(reject(interface));
    }

    let conversation_id =
        request.session_id.as_deref().unwrap_or(DEFAULT_CONVERSATION).to_string();
    let product_id =
        request.product_id.clone().unwrap_or_else(|| state.default_product.clone());
    let profile = CustomerProfile { gender: request.gender, age_group: request.age_group };

    let reply = state
        .registry
        .handle_message(&conversation_id, &product_id, profile, &request.message)
        .await
        .map_err(|error| {
            warn!(
                event_name = "server.chat.turn_failed",
                correlation_id = %correlation_id,
                conversation_id = %conversation_id,
                product_id = %product_id,
                error = %error,
                "negotiation turn failed"
            );
            reject(ApplicationError::from(error).into_interface(correlation_id.clone()))
        })?;

    info!(
        event_name = "server.chat.turn_handled",
        correlation_id = %correlation_id,
        conversation_id = %conversation_id,
        product_id = %product_id,
        "negotiation turn handled"
    );

    Ok(Json(NegotiateResponse { response: reply }))
}

pub async fn status(State(state): State<ChatState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: "haggle-server",
        status: "ready",
        default_product: state.default_product.clone(),
        catalog: state.registry.product_ids(),
        checked_at: Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
struct WidgetProduct {
    id: String,
    name: String,
    start_price: i64,
}

pub async fn widget_page(
    State(state): State<ChatState>,
) -> Result<Html<String>, (StatusCode, Html<String>)> {
    let products = state
        .registry
        .product_ids()
        .into_iter()
        .filter_map(|id| state.registry.terms_for(&id).cloned())
        .map(|terms| WidgetProduct {
            id: terms.product_id.0,
            name: terms.product_name,
            start_price: terms.start_price,
        })
        .collect::<Vec<_>>();

    let mut context = Context::new();
    context.insert("products", &products);
    context.insert("default_product", &state.default_product);

    let html = state.templates.render("widget.html", &context).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!("<h1>Template Error</h1><pre>{e:?}</pre>")),
        )
    })?;

    Ok(Html(html))
}

fn reject(interface: InterfaceError) -> (StatusCode, Json<ErrorBody>) {
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let correlation_id = match &interface {
        InterfaceError::BadRequest { correlation_id, .. }
        | InterfaceError::NotFound { correlation_id, .. }
        | InterfaceError::ServiceUnavailable { correlation_id, .. }
        | InterfaceError::Internal { correlation_id, .. } => correlation_id.clone(),
    };

    (
        status,
        Json(ErrorBody { response: interface.user_message().to_string(), correlation_id }),
    )
}
