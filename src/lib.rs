/// Binary Prediction Market Handler
/// Per-market ledger and settlement engine, exported for the HTTP service and tests

pub mod app_state;
pub mod clock;
pub mod config;
pub mod currency;
pub mod error;
pub mod handlers;
pub mod market;
pub mod models;
pub mod registry;
pub mod routes;

pub use app_state::{AppState, SharedState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ServerConfig;
pub use currency::{CurrencyAccount, CurrencyError, TokenBalance, TokenLedger};
pub use error::{ErrorBody, LedgerError, Result};
pub use market::{
    BuyQuote, EventJournal, EventRecord, FeeCalculator, HolderRegistry, HolderSlot, MarketConfig,
    MarketEvent, MarketHandler, MarketSnapshot, Position, ReserveState, RewardReceipt,
    SellAccounting, SettlementRecord, Side, TradeDelta, TradeKind, TradeReceipt,
};
pub use registry::{
    FixedOracle, MarketParams, MarketRegistry, OutcomeOracle, ParticipantTelemetry, TradeReporter,
    TradeTelemetry,
};
pub use routes::build_router;
