//! HTTP API for the dustsweep daemon.
//!
//! Provides endpoints for:
//! - Health check
//! - Intent intake (validates and parks an execution context)
//! - Sweep stream (server-sent events for one intent)

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::Stream;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use dustsweep_domain::{Address, DustToken, ExecutionContext, IntentId};
use dustsweep_exec::{
    BatchOrchestrator, ExecError, ExecutionContextStore, MemoryContextStore, PriceOracle,
    StaticTokenRegistry, TokenRegistry,
};

use crate::config::SweepConfig;
use crate::error::DaemonError;
use crate::stream::{StreamMessage, StreamingProtocolAdapter};

/// Orchestrator as wired by the daemon.
pub type SweepOrchestrator = BatchOrchestrator<dyn PriceOracle, StaticTokenRegistry>;

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState {
    pub orchestrator: Arc<SweepOrchestrator>,
    pub contexts: Arc<MemoryContextStore>,
    pub registry: Arc<StaticTokenRegistry>,
    pub adapter: StreamingProtocolAdapter,
    pub sweep: SweepConfig,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Intake payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    pub user_address: String,
    pub chain_id: u64,
    pub params: IntentParams,
}

/// Sweep parameters of an intake payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentParams {
    pub dust_tokens: Vec<DustTokenRequest>,
    pub to_token_address: String,
    pub to_token_decimals: u8,
    #[serde(default)]
    pub referral_address: Option<String>,
    #[serde(default)]
    pub slippage: Option<Decimal>,
}

/// One dust token as submitted by the client.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DustTokenRequest {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
    pub raw_amount_hex: String,
    pub price: Decimal,
}

/// Response after accepting an intent.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    pub intent_id: IntentId,
    pub token_count: usize,
    pub expires_at: DateTime<Utc>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/intents", post(create_intent_handler))
        .route("/intents/:id/stream", get(stream_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Validate an intake payload and park its execution context.
async fn create_intent_handler(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<IntentRequest>,
) -> Result<(StatusCode, Json<IntentResponse>), (StatusCode, Json<ErrorResponse>)> {
    let context = build_context(&state, req).map_err(to_error_response)?;

    let response = IntentResponse {
        intent_id: context.intent_id,
        token_count: context.token_count(),
        expires_at: context.expires_at,
    };

    state
        .contexts
        .put(context)
        .await
        .map_err(|e| to_error_response(e.into()))?;

    info!(
        intent_id = %response.intent_id,
        token_count = response.token_count,
        "Intent accepted"
    );

    Ok((StatusCode::CREATED, Json(response)))
}

/// Stream a sweep as server-sent events.
///
/// The context is read once: concurrent opens of the same intent race on
/// one atomic take, and only the winner runs the sweep.
async fn stream_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, Json<ErrorResponse>)> {
    let context = state
        .contexts
        .take(id)
        .await
        .map_err(|e| to_error_response(e.into()))?
        .ok_or_else(|| to_error_response(DaemonError::IntentNotFound(id)))?;

    let token_count = context.token_count();
    info!(intent_id = %id, token_count, "Sweep stream opened");

    let events = Arc::clone(&state.orchestrator).execute(context);
    let mut rx = state.adapter.open(id, token_count, events);

    let stream = async_stream::stream! {
        while let Some(message) = rx.recv().await {
            yield Ok::<_, Infallible>(to_sse_event(&message));
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// =============================================================================
// Helpers
// =============================================================================

fn build_context(state: &ApiState, req: IntentRequest) -> Result<ExecutionContext, DaemonError> {
    let user_address = parse_address("userAddress", &req.user_address)?;
    let to_token_address = parse_address("toTokenAddress", &req.params.to_token_address)?;
    let referral_address = req
        .params
        .referral_address
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| parse_address("referralAddress", s))
        .transpose()?;

    if state.registry.get_wrapped_native_address(req.chain_id).is_none() {
        return Err(ExecError::UnsupportedChain(req.chain_id).into());
    }

    if let Some(slippage) = req.params.slippage {
        if slippage <= Decimal::ZERO || slippage >= Decimal::ONE {
            return Err(DaemonError::InvalidRequest(format!(
                "slippage must be between 0 and 1, got {}",
                slippage
            )));
        }
    }

    if req.params.dust_tokens.is_empty() {
        return Err(DaemonError::InvalidRequest("dustTokens must not be empty".to_string()));
    }

    let mut tokens = Vec::with_capacity(req.params.dust_tokens.len());
    for input in req.params.dust_tokens {
        let token = DustToken {
            address: parse_address("dustTokens.address", &input.address)?,
            symbol: input.symbol,
            decimals: input.decimals,
            raw_amount_hex: input.raw_amount_hex,
            price: input.price,
        };
        token.validate()?;
        tokens.push(token);
    }

    let ttl = chrono::Duration::from_std(state.sweep.context_ttl)
        .map_err(|e| DaemonError::Config(format!("Invalid context TTL: {}", e)))?;

    Ok(ExecutionContext::new(
        user_address,
        req.chain_id,
        tokens,
        to_token_address,
        req.params.to_token_decimals,
        referral_address,
        req.params.slippage,
        state.sweep.batch_size,
        ttl,
    )?)
}

fn parse_address(field: &str, raw: &str) -> Result<Address, DaemonError> {
    Address::parse(raw).map_err(|e| DaemonError::InvalidRequest(format!("{}: {}", field, e)))
}

fn to_sse_event(message: &StreamMessage) -> Event {
    match serde_json::to_string(message) {
        Ok(data) => Event::default().event(message.kind()).data(data),
        Err(e) => {
            warn!(error = %e, kind = message.kind(), "Failed to encode stream message");
            Event::default()
                .event("error")
                .data(r#"{"type":"error","error":"Failed to encode stream message"}"#)
        }
    }
}

fn to_error_response(error: DaemonError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        DaemonError::IntentNotFound(_) => StatusCode::NOT_FOUND,
        DaemonError::Config(_) | DaemonError::Shutdown => StatusCode::INTERNAL_SERVER_ERROR,
        DaemonError::Exec(ExecError::ContextStore(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

// =============================================================================
// Tests
// =============================================================================
