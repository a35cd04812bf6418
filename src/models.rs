// Request and response bodies for the market handler API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::market::{SellAccounting, Side};

// ===== RESPONSE ENVELOPE =====

/// Every successful response is `{ "success": true, "data": ... }`
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

// ===== MARKET REQUESTS =====

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMarketRequest {
    /// Parts per ten thousand; the server default applies when omitted
    pub fee_rate: Option<u32>,
    pub deadline: DateTime<Utc>,
    /// Currency per whole unit, in the currency's smallest denomination
    pub base_price: u128,
    #[serde(default)]
    pub sell_accounting: Option<SellAccounting>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateMarketResponse {
    pub market_id: String,
    /// Account participants must approve before buying
    pub ledger_account: String,
}

/// Buy or sell `amount` units of `side`
#[derive(Debug, Clone, Deserialize)]
pub struct TradeRequest {
    pub participant: String,
    pub side: Side,
    pub amount: u128,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapRequest {
    pub participant: String,
    pub from_side: Side,
    pub amount: u128,
}

/// Without `winning_side` the registry asks its oracle. An explicit side is
/// only accepted from the market owner named in `caller`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub winning_side: Option<Side>,
    #[serde(default)]
    pub caller: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResponse {
    pub market_id: String,
    pub resolved: bool,
    pub winning_side: Option<Side>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewardRequest {
    pub participant: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundResponse {
    pub market_id: String,
    pub participant: String,
    pub refunded: u128,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeclareOutcomeRequest {
    pub side: Side,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EventsQuery {
    /// First sequence number to return
    #[serde(default)]
    pub since: u64,
}

// ===== CURRENCY REQUESTS =====

#[derive(Debug, Clone, Deserialize)]
pub struct MintRequest {
    pub account: String,
    pub amount: u128,
}

/// Let a market's ledger account pull up to `amount` from `owner`
#[derive(Debug, Clone, Deserialize)]
pub struct ApproveRequest {
    pub owner: String,
    pub market_id: String,
    pub amount: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApproveResponse {
    pub owner: String,
    pub spender: String,
    pub allowance: u128,
}

// ===== HEALTH =====

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub markets: usize,
    pub currency: String,
    pub decimals: u32,
    pub timestamp: DateTime<Utc>,
}
