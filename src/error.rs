// ============================================================================
// Ledger Errors - Market Handler
// ============================================================================
//
// Every failed precondition aborts the whole operation before any ledger
// state is touched. Nothing here is retried internally; the caller decides
// whether to resubmit.
//
// ============================================================================

use serde::Serialize;
use thiserror::Error;

use crate::market::Side;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Failures of a single market handler or registry operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("amount must be a positive integer")]
    InvalidAmount,

    #[error("market {market_id} is closed for trading")]
    MarketClosed { market_id: String },

    #[error("market {market_id} is still open until its deadline")]
    MarketStillOpen { market_id: String },

    #[error("allowance {allowance} is below the {required} owed")]
    InsufficientAllowance { required: u128, allowance: u128 },

    #[error("currency transfer failed: {0}")]
    TransferFailed(String),

    #[error("refund of {amount} to {participant} failed and is pending")]
    RefundFailed { participant: String, amount: u128 },

    #[error("insufficient {side} units: have {available}, need {required}")]
    InsufficientBalance {
        side: Side,
        available: u128,
        required: u128,
    },

    #[error("reserve cannot cover {required}: {available} available")]
    InsufficientLiquidity { required: u128, available: u128 },

    #[error("market {market_id} is already resolved")]
    AlreadyResolved { market_id: String },

    #[error("{caller} is not allowed to resolve this market")]
    Unauthorized { caller: String },

    #[error("rewards are not available before resolution")]
    RewardsNotAvailable,

    #[error("{participant} already collected their reward")]
    AlreadyCollected { participant: String },

    #[error("{participant} holds no winning units")]
    NotAWinner { participant: String },

    #[error("arithmetic overflow")]
    Overflow,

    #[error("market {0} not found")]
    MarketNotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LedgerError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount => "invalid_amount",
            LedgerError::MarketClosed { .. } => "market_closed",
            LedgerError::MarketStillOpen { .. } => "market_still_open",
            LedgerError::InsufficientAllowance { .. } => "insufficient_allowance",
            LedgerError::TransferFailed(_) => "transfer_failed",
            LedgerError::RefundFailed { .. } => "refund_failed",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::InsufficientLiquidity { .. } => "insufficient_liquidity",
            LedgerError::AlreadyResolved { .. } => "already_resolved",
            LedgerError::Unauthorized { .. } => "unauthorized",
            LedgerError::RewardsNotAvailable => "rewards_not_available",
            LedgerError::AlreadyCollected { .. } => "already_collected",
            LedgerError::NotAWinner { .. } => "not_a_winner",
            LedgerError::Overflow => "overflow",
            LedgerError::MarketNotFound(_) => "market_not_found",
            LedgerError::InvalidConfig(_) => "invalid_config",
        }
    }
}

/// Error body returned by the HTTP layer
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub code: &'static str,
    pub error: String,
}

impl From<&LedgerError> for ErrorBody {
    fn from(err: &LedgerError) -> Self {
        Self {
            success: false,
            code: err.code(),
            error: err.to_string(),
        }
    }
}
