//! Stateless HTTP facade.
//!
//! Serves clients that cannot hold a socket open. Requests are
//! independent and any server instance sharing the store can answer them.
//!
//! # Routes
//!
//! | Method | Path | Response |
//! |--------|------|----------|
//! | `POST` | `/register` | [`RegisterResponse`] or 400 |
//! | `GET` | `/session?sessionId=` | [`SessionResponse`], 400 or 404 |
//! | `GET` | `/config` | [`ConfigResponse`] or 503 |
//! | `GET` | `/health` | `{"status":"ok"}` |
//! | `OPTIONS` | any | empty 204 |
//! | any | anything else | [`ConnectionAck`] with `X-Wallet-Connect: true` |
//!
//! Every route is also served under `/wallet-connect` and
//! `/.netlify/functions/wallet-connect`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::error::Error;
use crate::protocol::{
    ConfigResponse, ConnectionAck, ErrorBody, RegisterRequest, RegisterResponse, ResponseStatus,
    SessionResponse,
};
use crate::session::SessionStore;

use super::connection::truncate;

// ============================================================================
// Constants
// ============================================================================

/// Path prefixes stripped before routing.
pub const ROUTE_PREFIXES: [&str; 2] = ["/wallet-connect", "/.netlify/functions/wallet-connect"];

/// Header marking the fallback acknowledgment.
pub const WALLET_CONNECT_HEADER: &str = "x-wallet-connect";

/// Preflight cache lifetime (30 days).
const CORS_MAX_AGE: Duration = Duration::from_secs(2_592_000);

/// Characters of a URI included in log lines.
const LOGGED_URI_PREFIX: usize = 20;

// ============================================================================
// FacadeState
// ============================================================================

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct FacadeState {
    /// Bridge configuration.
    pub config: Arc<BridgeConfig>,
    /// Session store shared with the relay.
    pub store: Arc<SessionStore>,
}

impl FacadeState {
    /// Creates the state.
    #[must_use]
    pub fn new(config: Arc<BridgeConfig>, store: Arc<SessionStore>) -> Self {
        Self { config, store }
    }
}

// ============================================================================
// Router
// ============================================================================

/// Builds the facade router with CORS and request tracing applied.
pub fn router(state: FacadeState) -> Router {
    let mut app = routes();
    for prefix in ROUTE_PREFIXES {
        app = app.nest(prefix, routes());
    }

    app.fallback(connection_ack)
        .layer(middleware::from_fn(answer_options))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn routes() -> Router<FacadeState> {
    Router::new()
        .route("/register", post(register))
        .route("/session", get(session))
        .route("/config", get(config))
        .route("/health", get(health))
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .max_age(CORS_MAX_AGE)
}

/// Answers every `OPTIONS` request with an empty success.
async fn answer_options(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    next.run(request).await
}

// ============================================================================
// Handlers
// ============================================================================

// POST /register
async fn register(State(state): State<FacadeState>, body: Bytes) -> Response {
    let request: RegisterRequest = if body.is_empty() {
        RegisterRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Malformed register body");
                return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
            }
        }
    };

    let uri = request.uri.unwrap_or_default();
    if let Err(e) = state.config.validate_uri(&uri) {
        return into_error_response(&e);
    }

    let session = state.store.create(uri.as_str());

    debug!(
        session_id = %session.id(),
        uri = %truncate(&uri, LOGGED_URI_PREFIX),
        "URI registered over HTTP"
    );

    Json(RegisterResponse {
        status: ResponseStatus::Success,
        session_id: session.id().to_string(),
        redirect_url: state.config.redirect_url(&uri),
        uri,
    })
    .into_response()
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

// GET /session?sessionId=
async fn session(State(state): State<FacadeState>, Query(query): Query<SessionQuery>) -> Response {
    let Some(session_id) = query.session_id.filter(|id| !id.is_empty()) else {
        return into_error_response(&Error::MissingSessionId);
    };

    match state.store.get(&session_id) {
        Ok(session) => Json(SessionResponse {
            status: ResponseStatus::Success,
            uri: session.uri().to_string(),
            project_id: state.config.project_id.clone(),
            domain: state.config.domain.clone(),
        })
        .into_response(),
        Err(e) => into_error_response(&e),
    }
}

// GET /config
async fn config(State(state): State<FacadeState>) -> Response {
    let Some(project_id) = state.config.project_id.clone() else {
        return into_error_response(&Error::config("Pairing project id is not configured"));
    };

    Json(ConfigResponse {
        project_id,
        relay_url: state.config.relay_url.clone(),
        metadata: state.config.metadata.clone(),
    })
    .into_response()
}

// GET /health
async fn health() -> Response {
    Json(serde_json::json!({ "status": ResponseStatus::Ok })).into_response()
}

// Anything unroutable
async fn connection_ack() -> Response {
    let mut response = Json(ConnectionAck::default()).into_response();
    response.headers_mut().insert(
        HeaderName::from_static(WALLET_CONNECT_HEADER),
        HeaderValue::from_static("true"),
    );
    response
}

// ============================================================================
// Error Mapping
// ============================================================================

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

fn into_error_response(err: &Error) -> Response {
    let status = match err {
        e if e.is_input_error() => StatusCode::BAD_REQUEST,
        Error::SessionNotFound { .. } => StatusCode::NOT_FOUND,
        Error::Config { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = match err {
        Error::SessionNotFound { .. } => "Session not found".to_string(),
        e => e.peer_message(),
    };

    if status.is_server_error() {
        warn!(error = %err, %status, "Facade request failed");
    } else {
        debug!(error = %err, %status, "Facade request rejected");
    }

    error_response(status, message)
}

// ============================================================================
// Tests
// ============================================================================
