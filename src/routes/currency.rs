// Reference currency routes: minting, allowances and balances

use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::info;

use crate::app_state::SharedState;
use crate::currency::{CurrencyAccount, TokenBalance};
use crate::error::LedgerError;
use crate::handlers::{ApiError, ApiResult};
use crate::models::{ApiResponse, ApproveRequest, ApproveResponse, MintRequest};
use crate::registry::MarketRegistry;

// ===== ROUTE HANDLERS =====

/// POST /currency/mint
/// Credits new supply to an account
pub async fn mint(
    State(state): State<SharedState>,
    Json(request): Json<MintRequest>,
) -> ApiResult<TokenBalance> {
    if request.amount == 0 {
        return Err(ApiError(LedgerError::InvalidAmount));
    }
    state
        .token
        .mint(&request.account, request.amount)
        .map_err(LedgerError::from)?;

    info!(account = %request.account, amount = %request.amount, "currency minted");
    Ok(Json(ApiResponse::ok(state.token.balance_view(&request.account))))
}

/// POST /currency/approve
/// Sets how much a market may pull from the owner on buys
pub async fn approve(
    State(state): State<SharedState>,
    Json(request): Json<ApproveRequest>,
) -> ApiResult<ApproveResponse> {
    state.registry.market(&request.market_id)?;
    let spender = MarketRegistry::ledger_account(&request.market_id);
    state.token.approve(&request.owner, &spender, request.amount);

    Ok(Json(ApiResponse::ok(ApproveResponse {
        allowance: state.token.allowance(&request.owner, &spender),
        owner: request.owner,
        spender,
    })))
}

/// GET /currency/balance/:account
pub async fn get_balance(
    State(state): State<SharedState>,
    Path(account): Path<String>,
) -> ApiResult<TokenBalance> {
    Ok(Json(ApiResponse::ok(state.token.balance_view(&account))))
}
