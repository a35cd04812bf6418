// HTTP request handlers for the market handler API

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::app_state::SharedState;
use crate::error::{ErrorBody, LedgerError};
use crate::market::{
    BuyQuote, EventRecord, HolderSlot, MarketSnapshot, Position, RewardReceipt, Side, TradeReceipt,
};
use crate::models::*;
use crate::registry::{MarketParams, MarketRegistry, ParticipantTelemetry};

// ===== ERROR MAPPING =====

/// A ledger failure rendered as `{ "success": false, "code", "error" }`
#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            LedgerError::MarketNotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            LedgerError::MarketClosed { .. }
            | LedgerError::MarketStillOpen { .. }
            | LedgerError::AlreadyResolved { .. }
            | LedgerError::AlreadyCollected { .. }
            | LedgerError::RewardsNotAvailable => StatusCode::CONFLICT,
            LedgerError::TransferFailed(_) | LedgerError::RefundFailed { .. } => {
                StatusCode::BAD_GATEWAY
            }
            LedgerError::Overflow => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(code = self.0.code(), error = %self.0, "request failed");
        }
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

// ===== MARKET LIFECYCLE =====

/// POST /markets
pub async fn create_market(
    State(state): State<SharedState>,
    Json(request): Json<CreateMarketRequest>,
) -> ApiResult<CreateMarketResponse> {
    let params = MarketParams {
        fee_rate: request.fee_rate.unwrap_or(state.config.default_fee_rate),
        deadline: request.deadline,
        base_price: request.base_price,
        sell_accounting: request.sell_accounting.unwrap_or_default(),
    };
    let market_id = state.registry.create_market(params)?;
    ok(CreateMarketResponse {
        ledger_account: MarketRegistry::ledger_account(&market_id),
        market_id,
    })
}

/// GET /markets
pub async fn list_markets(State(state): State<SharedState>) -> ApiResult<Vec<MarketSnapshot>> {
    ok(state.registry.snapshots())
}

/// GET /markets/:id
pub async fn get_market(
    State(state): State<SharedState>,
    Path(market_id): Path<String>,
) -> ApiResult<MarketSnapshot> {
    let snapshot = state.registry.with_market(&market_id, |m| Ok(m.snapshot()))?;
    ok(snapshot)
}

/// POST /markets/:id/resolve
pub async fn resolve_market(
    State(state): State<SharedState>,
    Path(market_id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<ResolveResponse> {
    let winning_side = match request.winning_side {
        Some(side) => {
            let caller = request.caller.as_deref().unwrap_or("anonymous");
            state.registry.resolve_as(&market_id, caller, side)?;
            Some(side)
        }
        None => state
            .registry
            .resolve_from_oracle(&market_id, state.oracle.as_ref())?,
    };

    if winning_side.is_none() {
        info!(market_id = %market_id, "resolution deferred, oracle has not voted");
    }
    ok(ResolveResponse {
        market_id,
        resolved: winning_side.is_some(),
        winning_side,
    })
}

/// POST /markets/:id/outcome
pub async fn declare_outcome(
    State(state): State<SharedState>,
    Path(market_id): Path<String>,
    Json(request): Json<DeclareOutcomeRequest>,
) -> ApiResult<ResolveResponse> {
    // an oracle vote for an unknown market is rejected up front
    state.registry.market(&market_id)?;
    state.oracle.declare(&market_id, request.side);
    info!(market_id = %market_id, side = %request.side, "oracle outcome declared");
    ok(ResolveResponse {
        market_id,
        resolved: false,
        winning_side: Some(request.side),
    })
}

// ===== TRADING =====

/// POST /markets/:id/buy
pub async fn buy(
    State(state): State<SharedState>,
    Path(market_id): Path<String>,
    Json(request): Json<TradeRequest>,
) -> ApiResult<TradeReceipt> {
    let receipt = state.registry.with_market(&market_id, |m| {
        m.buy(&request.participant, request.side, request.amount)
    })?;
    ok(receipt)
}

/// POST /markets/:id/sell
pub async fn sell(
    State(state): State<SharedState>,
    Path(market_id): Path<String>,
    Json(request): Json<TradeRequest>,
) -> ApiResult<TradeReceipt> {
    let receipt = state.registry.with_market(&market_id, |m| {
        m.sell(&request.participant, request.side, request.amount)
    })?;
    ok(receipt)
}

/// POST /markets/:id/swap
pub async fn swap(
    State(state): State<SharedState>,
    Path(market_id): Path<String>,
    Json(request): Json<SwapRequest>,
) -> ApiResult<TradeReceipt> {
    let receipt = state.registry.with_market(&market_id, |m| {
        m.swap(&request.participant, request.from_side, request.amount)
    })?;
    ok(receipt)
}

/// GET /markets/:id/quote/:amount
pub async fn quote_buy(
    State(state): State<SharedState>,
    Path((market_id, amount)): Path<(String, u128)>,
) -> ApiResult<BuyQuote> {
    let quote = state.registry.with_market(&market_id, |m| m.quote_buy(amount))?;
    ok(quote)
}

// ===== REWARDS =====

/// POST /markets/:id/rewards
pub async fn collect_reward(
    State(state): State<SharedState>,
    Path(market_id): Path<String>,
    Json(request): Json<RewardRequest>,
) -> ApiResult<RewardReceipt> {
    let receipt = state
        .registry
        .with_market(&market_id, |m| m.collect_reward(&request.participant))?;
    ok(receipt)
}

/// POST /markets/:id/refunds
pub async fn retry_refund(
    State(state): State<SharedState>,
    Path(market_id): Path<String>,
    Json(request): Json<RewardRequest>,
) -> ApiResult<RefundResponse> {
    let refunded = state
        .registry
        .with_market(&market_id, |m| m.retry_refund(&request.participant))?;
    ok(RefundResponse {
        market_id,
        participant: request.participant,
        refunded,
    })
}

/// GET /markets/:id/rewards/:participant
pub async fn preview_reward(
    State(state): State<SharedState>,
    Path((market_id, participant)): Path<(String, String)>,
) -> ApiResult<RewardReceipt> {
    let preview = state
        .registry
        .with_market(&market_id, |m| m.preview_reward(&participant))?;
    ok(preview)
}

// ===== VIEWS =====

/// GET /markets/:id/holders/:side
pub async fn get_holders(
    State(state): State<SharedState>,
    Path((market_id, side)): Path<(String, Side)>,
) -> ApiResult<Vec<HolderSlot>> {
    let slots = state
        .registry
        .with_market(&market_id, |m| Ok(m.holders().index(side)))?;
    ok(slots)
}

/// GET /markets/:id/positions/:participant
pub async fn get_position(
    State(state): State<SharedState>,
    Path((market_id, participant)): Path<(String, String)>,
) -> ApiResult<Position> {
    let position = state
        .registry
        .with_market(&market_id, |m| Ok(m.position(&participant)))?;
    ok(position)
}

/// GET /markets/:id/events?since=N
pub async fn get_events(
    State(state): State<SharedState>,
    Path(market_id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Vec<EventRecord>> {
    let events = state
        .registry
        .with_market(&market_id, |m| Ok(m.journal().since(query.since).to_vec()))?;
    ok(events)
}

/// GET /telemetry/:participant
pub async fn get_telemetry(
    State(state): State<SharedState>,
    Path(participant): Path<String>,
) -> ApiResult<ParticipantTelemetry> {
    ok(state
        .registry
        .telemetry()
        .participant(&participant)
        .unwrap_or_default())
}

// ===== HEALTH CHECK =====

/// GET /health
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        markets: state.registry.market_count(),
        currency: state.config.currency_symbol.clone(),
        decimals: state.config.currency_decimals,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (LedgerError::MarketNotFound("x".into()), StatusCode::NOT_FOUND),
            (LedgerError::Unauthorized { caller: "m".into() }, StatusCode::FORBIDDEN),
            (LedgerError::MarketClosed { market_id: "x".into() }, StatusCode::CONFLICT),
            (LedgerError::AlreadyCollected { participant: "a".into() }, StatusCode::CONFLICT),
            (LedgerError::TransferFailed("nope".into()), StatusCode::BAD_GATEWAY),
            (LedgerError::RefundFailed { participant: "a".into(), amount: 5 }, StatusCode::BAD_GATEWAY),
            (LedgerError::Overflow, StatusCode::INTERNAL_SERVER_ERROR),
            (LedgerError::InvalidAmount, StatusCode::BAD_REQUEST),
            (LedgerError::NotAWinner { participant: "b".into() }, StatusCode::BAD_REQUEST),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }
}
