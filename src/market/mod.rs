// ============================================================================
// Market Handler - Binary Outcome Ledger
// ============================================================================
//
// One `MarketHandler` per market. It holds the currency reserve for the
// market, prices and executes buy / sell / swap, enforces the closing
// deadline, records the winning side and pays each winner's share.
//
// Lifecycle:
//
//   Open (now <= deadline)  -> buy / sell / swap
//   Closed (now > deadline) -> resolve (owner only, exactly once)
//   Resolved                -> collect_reward (once per winner)
//
// Submodules:
//   - fees:       fee(amount) = floor(amount * rate / precision)
//   - reserve:    currency totals and side backings
//   - holders:    per-side unit balances and holder index
//   - trading:    buy / sell / swap
//   - settlement: resolution and reward distribution
//   - events:     hash-chained event journal
//
// ============================================================================

pub mod events;
pub mod fees;
pub mod holders;
pub mod reserve;
pub mod settlement;
pub mod trading;

pub use events::{EventJournal, EventRecord, MarketEvent};
pub use fees::FeeCalculator;
pub use holders::{HolderRegistry, HolderSlot};
pub use reserve::ReserveState;
pub use settlement::{RewardReceipt, SettlementRecord};
pub use trading::{BuyQuote, TradeDelta, TradeKind, TradeReceipt};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::currency::{CurrencyAccount, CurrencyError};
use crate::error::{LedgerError, Result};
use crate::registry::TradeReporter;

/// Largest fee rate, in parts per ten thousand
pub const MAX_FEE_RATE: u32 = 10_000;

/// Largest supported currency precision (decimal scale limit)
pub const MAX_DECIMALS: u32 = 28;

// ============================================================================
// SIDE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Yes => "yes",
            Side::No => "no",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// How a sale is booked against the side backing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SellAccounting {
    /// Debit the sold side's backing by the released currency, keeping
    /// `total_currency == yes_backing + no_backing`
    #[default]
    Conserving,
    /// Leave the side backing untouched; only `total_currency` shrinks
    Literal,
}

/// Immutable per-market configuration, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub market_id: String,
    /// Parts per ten thousand
    pub fee_rate: u32,
    /// Trading is open while `now <= deadline`
    pub deadline: DateTime<Utc>,
    /// Currency owed per `10^decimals` units
    pub base_price: u128,
    /// Reference currency decimal places
    pub decimals: u32,
    /// Currency account holding this market's reserve
    pub ledger_account: String,
    pub fee_sink: String,
    /// The only principal allowed to resolve the market
    pub owner: String,
    #[serde(default)]
    pub sell_accounting: SellAccounting,
}

impl MarketConfig {
    /// `10^decimals`
    pub fn precision(&self) -> Result<u128> {
        10u128
            .checked_pow(self.decimals)
            .ok_or_else(|| LedgerError::InvalidConfig(format!("decimals {} too large", self.decimals)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.market_id.is_empty() {
            return Err(LedgerError::InvalidConfig("market id is empty".to_string()));
        }
        if self.decimals > MAX_DECIMALS {
            return Err(LedgerError::InvalidConfig(format!(
                "decimals {} exceeds {}",
                self.decimals, MAX_DECIMALS
            )));
        }
        let precision = self.precision()?;
        if self.fee_rate > MAX_FEE_RATE || u128::from(self.fee_rate) > precision {
            return Err(LedgerError::InvalidConfig(format!(
                "fee rate {} out of range",
                self.fee_rate
            )));
        }
        if self.base_price == 0 {
            return Err(LedgerError::InvalidConfig("base price must be positive".to_string()));
        }
        if self.ledger_account == self.fee_sink {
            return Err(LedgerError::InvalidConfig(
                "fee sink must differ from the ledger account".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// MARKET HANDLER
// ============================================================================

pub struct MarketHandler {
    config: MarketConfig,
    precision: u128,
    fees: FeeCalculator,
    reserve: ReserveState,
    holders: HolderRegistry,
    settlement: SettlementRecord,
    journal: EventJournal,
    /// Buy payments whose refund failed, still held by the ledger account
    pending_refunds: BTreeMap<String, u128>,
    currency: Arc<dyn CurrencyAccount>,
    reporter: Arc<dyn TradeReporter>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MarketHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketHandler")
            .field("config", &self.config)
            .field("reserve", &self.reserve)
            .field("settlement", &self.settlement)
            .field("events", &self.journal.len())
            .field("pending_refunds", &self.pending_refunds)
            .finish()
    }
}

/// Point-in-time view of a market for API responses
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    pub market_id: String,
    pub deadline: DateTime<Utc>,
    pub is_open: bool,
    pub fee_rate: u32,
    pub fee_rate_percent: Decimal,
    pub effective_fee_rate: Decimal,
    pub base_price: u128,
    pub decimals: u32,
    pub sell_accounting: SellAccounting,
    pub reserve: ReserveState,
    pub conserved: bool,
    pub resolved: bool,
    pub winning_side: Option<Side>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub yes_holders: usize,
    pub no_holders: usize,
    pub event_count: usize,
    pub head_digest: String,
    pub stranded_refunds: u128,
}

/// A participant's holdings in one market
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub market_id: String,
    pub participant: String,
    pub yes_units: u128,
    pub no_units: u128,
    pub reward_collected: bool,
}

impl MarketHandler {
    pub fn new(
        config: MarketConfig,
        currency: Arc<dyn CurrencyAccount>,
        reporter: Arc<dyn TradeReporter>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        if currency.decimals() != config.decimals {
            return Err(LedgerError::InvalidConfig(format!(
                "currency has {} decimals, market expects {}",
                currency.decimals(),
                config.decimals
            )));
        }

        let precision = config.precision()?;
        let fees = FeeCalculator::new(config.fee_rate, config.decimals, precision);

        let mut handler = Self {
            config,
            precision,
            fees,
            reserve: ReserveState::default(),
            holders: HolderRegistry::new(),
            settlement: SettlementRecord::default(),
            journal: EventJournal::new(),
            pending_refunds: BTreeMap::new(),
            currency,
            reporter,
            clock,
        };

        handler.record(MarketEvent::MarketOpened {
            market_id: handler.config.market_id.clone(),
            deadline: handler.config.deadline,
            fee_rate: handler.config.fee_rate,
            base_price: handler.config.base_price,
        });
        info!(
            market_id = %handler.config.market_id,
            deadline = %handler.config.deadline,
            fee_rate = handler.config.fee_rate,
            base_price = %handler.config.base_price,
            "market opened"
        );

        Ok(handler)
    }

    // ===== GETTERS =====

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn market_id(&self) -> &str {
        &self.config.market_id
    }

    pub fn fees(&self) -> &FeeCalculator {
        &self.fees
    }

    pub fn reserve(&self) -> &ReserveState {
        &self.reserve
    }

    pub fn holders(&self) -> &HolderRegistry {
        &self.holders
    }

    pub fn settlement(&self) -> &SettlementRecord {
        &self.settlement
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    pub fn balance(&self, side: Side, participant: &str) -> u128 {
        self.holders.balance(side, participant)
    }

    pub fn pending_refund(&self, participant: &str) -> u128 {
        self.pending_refunds.get(participant).copied().unwrap_or(0)
    }

    /// Total of buy payments owed back after a failed refund
    pub fn stranded_refunds(&self) -> u128 {
        self.pending_refunds
            .values()
            .fold(0u128, |acc, v| acc.saturating_add(*v))
    }

    /// Send a participant's pending refund again. Returns the amount sent.
    pub fn retry_refund(&mut self, participant: &str) -> Result<u128> {
        let amount = self.pending_refund(participant);
        if amount == 0 {
            return Ok(0);
        }
        self.push_out(participant, amount)?;
        self.pending_refunds.remove(participant);
        info!(market_id = %self.config.market_id, participant, amount = %amount, "pending refund sent");
        Ok(amount)
    }

    /// Trading is allowed while `now <= deadline` and the market is unresolved
    pub fn is_open(&self) -> bool {
        !self.settlement.is_resolved() && self.clock.now() <= self.config.deadline
    }

    pub fn position(&self, participant: &str) -> Position {
        Position {
            market_id: self.config.market_id.clone(),
            participant: participant.to_string(),
            yes_units: self.holders.balance(Side::Yes, participant),
            no_units: self.holders.balance(Side::No, participant),
            reward_collected: self.settlement.has_collected(participant),
        }
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            market_id: self.config.market_id.clone(),
            deadline: self.config.deadline,
            is_open: self.is_open(),
            fee_rate: self.config.fee_rate,
            fee_rate_percent: self.fees.nominal_percent(),
            effective_fee_rate: self.fees.effective_rate(),
            base_price: self.config.base_price,
            decimals: self.config.decimals,
            sell_accounting: self.config.sell_accounting,
            reserve: self.reserve,
            conserved: self.reserve.is_conserved(),
            resolved: self.settlement.is_resolved(),
            winning_side: self.settlement.winning_side(),
            resolved_at: self.settlement.resolved_at(),
            yes_holders: self.holders.holder_count(Side::Yes),
            no_holders: self.holders.holder_count(Side::No),
            event_count: self.journal.len(),
            head_digest: self.journal.head_digest().to_string(),
            stranded_refunds: self.stranded_refunds(),
        }
    }

    // ===== INTERNAL HELPERS =====

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(LedgerError::MarketClosed {
                market_id: self.config.market_id.clone(),
            })
        }
    }

    /// Currency equivalent of `units` at the base price, truncated
    fn price(&self, units: u128) -> Result<u128> {
        units
            .checked_mul(self.config.base_price)
            .map(|v| v / self.precision)
            .ok_or(LedgerError::Overflow)
    }

    /// Pull `owed` from the participant, then forward `fee` to the fee sink.
    /// If forwarding fails the pulled funds are returned before erroring. A
    /// refund that also fails is booked as owed to the participant.
    fn pull_in(&mut self, participant: &str, owed: u128, fee: u128) -> Result<()> {
        let ledger = self.config.ledger_account.as_str();

        self.currency
            .transfer_from(ledger, participant, ledger, owed)
            .map_err(|e| {
                warn!(market_id = %self.config.market_id, participant, error = %e, "buy payment failed");
                LedgerError::from(e)
            })?;

        let Err(e) = self.forward_fee(fee) else {
            return Ok(());
        };
        warn!(market_id = %self.config.market_id, participant, error = %e, "fee forward failed, refunding");

        if let Err(refund) = self.currency.transfer(ledger, participant, owed) {
            error!(
                market_id = %self.config.market_id,
                participant,
                owed = %owed,
                error = %refund,
                "refund after failed fee forward did not complete"
            );
            let pending = self.pending_refunds.entry(participant.to_string()).or_insert(0);
            *pending = pending.checked_add(owed).ok_or(LedgerError::Overflow)?;
            return Err(LedgerError::RefundFailed {
                participant: participant.to_string(),
                amount: owed,
            });
        }
        Err(e.into())
    }

    /// Send `fee` from the ledger account to the fee sink
    fn forward_fee(&self, fee: u128) -> std::result::Result<(), CurrencyError> {
        if fee == 0 {
            return Ok(());
        }
        self.currency
            .transfer(&self.config.ledger_account, &self.config.fee_sink, fee)
    }

    /// Ledger balance not already owed back to buyers
    fn available_liquidity(&self) -> u128 {
        self.currency
            .balance_of(&self.config.ledger_account)
            .saturating_sub(self.stranded_refunds())
    }

    fn ensure_liquidity(&self, required: u128) -> Result<()> {
        let available = self.available_liquidity();
        if available < required {
            return Err(LedgerError::InsufficientLiquidity { required, available });
        }
        Ok(())
    }

    /// Push `amount` out of the ledger account
    fn push_out(&self, to: &str, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.currency
            .transfer(&self.config.ledger_account, to, amount)
            .map_err(|e| {
                error!(
                    market_id = %self.config.market_id,
                    to,
                    amount = %amount,
                    error = %e,
                    "outgoing transfer failed"
                );
                LedgerError::from(e)
            })
    }

    fn record(&mut self, event: MarketEvent) {
        let now = self.clock.now();
        self.journal.append(event, now);
    }

    /// Forward unit deltas to the registry. Failure here never undoes a trade.
    fn report(&self, participant: &str, delta: TradeDelta) {
        if let Err(e) = self
            .reporter
            .report_trade(&self.config.market_id, participant, delta)
        {
            warn!(
                market_id = %self.config.market_id,
                participant,
                error = %e,
                "trade telemetry not recorded"
            );
        }
    }
}

// ============================================================================
// TEST HARNESS
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::clock::ManualClock;
    use crate::currency::TokenLedger;
    use crate::registry::TradeTelemetry;
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    pub const OWNER: &str = "registry";
    pub const FEE_SINK: &str = "fee_sink";
    pub const LEDGER: &str = "market:test";

    pub struct Harness {
        pub handler: MarketHandler,
        pub token: Arc<TokenLedger>,
        pub clock: Arc<ManualClock>,
        pub telemetry: Arc<TradeTelemetry>,
    }

    impl Harness {
        /// Fund `who` and approve the market to pull the same amount
        pub fn fund(&self, who: &str, amount: u128) {
            self.token.mint(who, amount).unwrap();
            let current = self.token.allowance(who, LEDGER);
            self.token.approve(who, LEDGER, current + amount);
        }

        pub fn close(&self) {
            self.clock.set(self.handler.config().deadline + Duration::seconds(1));
        }
    }

    pub fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    pub fn config(fee_rate: u32, base_price: u128, decimals: u32) -> MarketConfig {
        MarketConfig {
            market_id: "test".to_string(),
            fee_rate,
            deadline: start() + Duration::days(7),
            base_price,
            decimals,
            ledger_account: LEDGER.to_string(),
            fee_sink: FEE_SINK.to_string(),
            owner: OWNER.to_string(),
            sell_accounting: SellAccounting::Conserving,
        }
    }

    pub fn harness_with(config: MarketConfig) -> Harness {
        let token = Arc::new(TokenLedger::new("USDC", config.decimals));
        let clock = Arc::new(ManualClock::new(start()));
        let telemetry = Arc::new(TradeTelemetry::new());
        let handler = MarketHandler::new(config, token.clone(), telemetry.clone(), clock.clone()).unwrap();
        Harness {
            handler,
            token,
            clock,
            telemetry,
        }
    }

    /// Zero fee, one unit costs one currency unit
    pub fn flat_harness() -> Harness {
        harness_with(config(0, 1_000_000, 6))
    }

    /// Currency that refuses outgoing transfers to blocked recipients
    pub struct GatedCurrency {
        inner: Arc<TokenLedger>,
        blocked: parking_lot::Mutex<HashSet<String>>,
    }

    impl GatedCurrency {
        pub fn block(&self, account: &str) {
            self.blocked.lock().insert(account.to_string());
        }

        pub fn unblock(&self, account: &str) {
            self.blocked.lock().remove(account);
        }
    }

    impl CurrencyAccount for GatedCurrency {
        fn decimals(&self) -> u32 {
            self.inner.decimals()
        }
        fn balance_of(&self, account: &str) -> u128 {
            self.inner.balance_of(account)
        }
        fn allowance(&self, owner: &str, spender: &str) -> u128 {
            self.inner.allowance(owner, spender)
        }
        fn transfer(&self, from: &str, to: &str, amount: u128) -> std::result::Result<(), CurrencyError> {
            if self.blocked.lock().contains(to) {
                return Err(CurrencyError::Rejected(format!("{} is blocked", to)));
            }
            self.inner.transfer(from, to, amount)
        }
        fn transfer_from(&self, spender: &str, from: &str, to: &str, amount: u128) -> std::result::Result<(), CurrencyError> {
            self.inner.transfer_from(spender, from, to, amount)
        }
    }

    /// Harness whose handler moves currency through a `GatedCurrency`
    pub fn gated_harness(config: MarketConfig) -> (Harness, Arc<GatedCurrency>) {
        let token = Arc::new(TokenLedger::new("USDC", config.decimals));
        let gate = Arc::new(GatedCurrency {
            inner: token.clone(),
            blocked: parking_lot::Mutex::new(HashSet::new()),
        });
        let clock = Arc::new(ManualClock::new(start()));
        let telemetry = Arc::new(TradeTelemetry::new());
        let handler = MarketHandler::new(config, gate.clone(), telemetry.clone(), clock.clone()).unwrap();
        let harness = Harness {
            handler,
            token,
            clock,
            telemetry,
        };
        (harness, gate)
    }
}
