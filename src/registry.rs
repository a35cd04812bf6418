// ============================================================================
// Market Registry
// ============================================================================
//
// Owns every market handler in an arena keyed by market id. Handlers never
// hold a reference back to the registry; they only see the capabilities the
// registry hands them at creation:
//
//   - TradeReporter:  per-trade unit deltas for cross-market telemetry
//   - CurrencyAccount: the shared reference currency
//   - Clock:           the deadline time source
//
// Each handler sits behind its own mutex. Every operation on a market holds
// that lock for its whole duration, so calls on one market are applied one
// at a time in arrival order while different markets proceed independently.
//
// ============================================================================

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::currency::CurrencyAccount;
use crate::error::{LedgerError, Result};
use crate::market::{MarketConfig, MarketHandler, MarketSnapshot, SellAccounting, Side, TradeDelta};

// ============================================================================
// CAPABILITIES
// ============================================================================

/// Registry-facing capability: receives the unit deltas of every trade
pub trait TradeReporter: Send + Sync {
    fn report_trade(&self, market_id: &str, participant: &str, delta: TradeDelta) -> Result<()>;
}

/// Oracle-facing capability: the resolved vote for a market, if any
pub trait OutcomeOracle: Send + Sync {
    fn outcome(&self, market_id: &str) -> Option<Side>;
}

// ============================================================================
// TELEMETRY
// ============================================================================

/// Cross-market activity of one participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParticipantTelemetry {
    pub net_yes: i128,
    pub net_no: i128,
    pub trades: u64,
    pub markets: BTreeSet<String>,
}

/// Aggregates trade deltas across all markets
#[derive(Debug, Default)]
pub struct TradeTelemetry {
    participants: Mutex<HashMap<String, ParticipantTelemetry>>,
}

impl TradeTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participant(&self, participant: &str) -> Option<ParticipantTelemetry> {
        self.participants.lock().get(participant).cloned()
    }
}

impl TradeReporter for TradeTelemetry {
    fn report_trade(&self, market_id: &str, participant: &str, delta: TradeDelta) -> Result<()> {
        let mut participants = self.participants.lock();
        let entry = participants.entry(participant.to_string()).or_default();
        entry.net_yes = entry.net_yes.checked_add(delta.yes).ok_or(LedgerError::Overflow)?;
        entry.net_no = entry.net_no.checked_add(delta.no).ok_or(LedgerError::Overflow)?;
        entry.trades += 1;
        entry.markets.insert(market_id.to_string());
        Ok(())
    }
}

// ============================================================================
// ORACLE
// ============================================================================

/// Oracle whose votes are declared directly
#[derive(Debug, Default)]
pub struct FixedOracle {
    outcomes: Mutex<HashMap<String, Side>>,
}

impl FixedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&self, market_id: &str, side: Side) {
        self.outcomes.lock().insert(market_id.to_string(), side);
    }
}

impl OutcomeOracle for FixedOracle {
    fn outcome(&self, market_id: &str) -> Option<Side> {
        self.outcomes.lock().get(market_id).copied()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Parameters for a new market; everything else comes from the registry
#[derive(Debug, Clone, Deserialize)]
pub struct MarketParams {
    pub fee_rate: u32,
    pub deadline: DateTime<Utc>,
    pub base_price: u128,
    #[serde(default)]
    pub sell_accounting: SellAccounting,
}

pub type SharedMarket = Arc<Mutex<MarketHandler>>;

pub struct MarketRegistry {
    principal: String,
    fee_sink: String,
    currency: Arc<dyn CurrencyAccount>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<TradeTelemetry>,
    markets: RwLock<HashMap<String, SharedMarket>>,
}

impl MarketRegistry {
    pub fn new(
        principal: &str,
        fee_sink: &str,
        currency: Arc<dyn CurrencyAccount>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            principal: principal.to_string(),
            fee_sink: fee_sink.to_string(),
            currency,
            clock,
            telemetry: Arc::new(TradeTelemetry::new()),
            markets: RwLock::new(HashMap::new()),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn telemetry(&self) -> &TradeTelemetry {
        &self.telemetry
    }

    pub fn market_count(&self) -> usize {
        self.markets.read().len()
    }

    /// Currency account that holds a market's reserve
    pub fn ledger_account(market_id: &str) -> String {
        format!("market:{}", market_id)
    }

    /// Create a market owned by this registry. Returns its id.
    pub fn create_market(&self, params: MarketParams) -> Result<String> {
        let market_id = Uuid::new_v4().simple().to_string();
        let config = MarketConfig {
            market_id: market_id.clone(),
            fee_rate: params.fee_rate,
            deadline: params.deadline,
            base_price: params.base_price,
            decimals: self.currency.decimals(),
            ledger_account: Self::ledger_account(&market_id),
            fee_sink: self.fee_sink.clone(),
            owner: self.principal.clone(),
            sell_accounting: params.sell_accounting,
        };

        let handler = MarketHandler::new(
            config,
            self.currency.clone(),
            self.telemetry.clone(),
            self.clock.clone(),
        )?;

        self.markets
            .write()
            .insert(market_id.clone(), Arc::new(Mutex::new(handler)));
        info!(market_id = %market_id, markets = self.market_count(), "market registered");
        Ok(market_id)
    }

    pub fn market(&self, market_id: &str) -> Result<SharedMarket> {
        self.markets
            .read()
            .get(market_id)
            .cloned()
            .ok_or_else(|| LedgerError::MarketNotFound(market_id.to_string()))
    }

    /// Snapshots of every market, ordered by id
    pub fn snapshots(&self) -> Vec<MarketSnapshot> {
        let markets: Vec<SharedMarket> = self.markets.read().values().cloned().collect();
        let mut snapshots: Vec<MarketSnapshot> =
            markets.iter().map(|m| m.lock().snapshot()).collect();
        snapshots.sort_by(|a, b| a.market_id.cmp(&b.market_id));
        snapshots
    }

    /// Run `op` while holding the market's lock
    pub fn with_market<R>(
        &self,
        market_id: &str,
        op: impl FnOnce(&mut MarketHandler) -> Result<R>,
    ) -> Result<R> {
        let market = self.market(market_id)?;
        let mut handler = market.lock();
        op(&mut handler)
    }

    /// Resolve a market on the registry's own authority
    pub fn resolve_market(&self, market_id: &str, winning_side: Side) -> Result<()> {
        self.with_market(market_id, |m| m.resolve(&self.principal, winning_side))
    }

    /// Resolve on behalf of `caller`, who must own the market
    pub fn resolve_as(&self, market_id: &str, caller: &str, winning_side: Side) -> Result<()> {
        self.with_market(market_id, |m| m.resolve(caller, winning_side))
    }

    /// Resolve from the oracle's vote. `Ok(None)` when the oracle has not voted.
    pub fn resolve_from_oracle(
        &self,
        market_id: &str,
        oracle: &dyn OutcomeOracle,
    ) -> Result<Option<Side>> {
        // existence is checked first so an unknown id never reads as "no vote yet"
        let market = self.market(market_id)?;
        let Some(side) = oracle.outcome(market_id) else {
            return Ok(None);
        };
        market.lock().resolve(&self.principal, side)?;
        Ok(Some(side))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::currency::TokenLedger;
    use chrono::{Duration, TimeZone};

    fn registry() -> (MarketRegistry, Arc<TokenLedger>, Arc<ManualClock>) {
        let token = Arc::new(TokenLedger::new("USDC", 6));
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()));
        let registry = MarketRegistry::new("registry", "fee_sink", token.clone(), clock.clone());
        (registry, token, clock)
    }

    fn params(clock: &ManualClock) -> MarketParams {
        MarketParams {
            fee_rate: 0,
            deadline: clock.now() + Duration::hours(1),
            base_price: 1_000_000,
            sell_accounting: SellAccounting::Conserving,
        }
    }

    #[test]
    fn test_create_and_lookup_market() {
        let (registry, _, clock) = registry();
        let id = registry.create_market(params(&clock)).unwrap();

        assert_eq!(registry.market_count(), 1);
        let snapshot = registry.with_market(&id, |m| Ok(m.snapshot())).unwrap();
        assert_eq!(snapshot.market_id, id);
        assert_eq!(snapshot.decimals, 6);
        assert!(matches!(registry.market("nope"), Err(LedgerError::MarketNotFound(_))));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let (registry, _, clock) = registry();
        let mut bad = params(&clock);
        bad.base_price = 0;
        assert!(matches!(registry.create_market(bad), Err(LedgerError::InvalidConfig(_))));
        assert_eq!(registry.market_count(), 0);
    }

    #[test]
    fn test_telemetry_spans_markets() {
        let (registry, token, clock) = registry();
        let first = registry.create_market(params(&clock)).unwrap();
        let second = registry.create_market(params(&clock)).unwrap();

        token.mint("alice", 100).unwrap();
        token.approve("alice", &MarketRegistry::ledger_account(&first), 60);
        token.approve("alice", &MarketRegistry::ledger_account(&second), 40);

        registry.with_market(&first, |m| m.buy("alice", Side::Yes, 60)).unwrap();
        registry.with_market(&second, |m| m.buy("alice", Side::No, 40)).unwrap();

        let stats = registry.telemetry().participant("alice").unwrap();
        assert_eq!(stats.net_yes, 60);
        assert_eq!(stats.net_no, 40);
        assert_eq!(stats.markets.len(), 2);
    }

    #[test]
    fn test_resolve_from_oracle() {
        let (registry, _, clock) = registry();
        let id = registry.create_market(params(&clock)).unwrap();
        let oracle = FixedOracle::new();

        clock.advance(Duration::hours(2));
        assert_eq!(registry.resolve_from_oracle(&id, &oracle).unwrap(), None);

        oracle.declare(&id, Side::No);
        assert_eq!(registry.resolve_from_oracle(&id, &oracle).unwrap(), Some(Side::No));
        assert!(matches!(
            registry.resolve_from_oracle(&id, &oracle),
            Err(LedgerError::AlreadyResolved { .. })
        ));
        assert!(matches!(
            registry.resolve_from_oracle("missing", &oracle),
            Err(LedgerError::MarketNotFound(_))
        ));
    }

    #[test]
    fn test_registry_resolution_respects_deadline() {
        let (registry, _, clock) = registry();
        let id = registry.create_market(params(&clock)).unwrap();
        assert!(matches!(
            registry.resolve_market(&id, Side::Yes),
            Err(LedgerError::MarketStillOpen { .. })
        ));
    }

    #[test]
    fn test_concurrent_buys_serialize_per_market() {
        let (registry, token, clock) = registry();
        let registry = Arc::new(registry);
        let id = registry.create_market(params(&clock)).unwrap();
        let ledger = MarketRegistry::ledger_account(&id);

        let buyers: Vec<String> = (0..8).map(|i| format!("buyer{}", i)).collect();
        for who in &buyers {
            token.mint(who, 1_000).unwrap();
            token.approve(who, &ledger, 1_000);
        }

        let handles: Vec<_> = buyers
            .iter()
            .cloned()
            .map(|who| {
                let registry = registry.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        registry.with_market(&id, |m| m.buy(&who, Side::Yes, 100)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.with_market(&id, |m| Ok(m.snapshot())).unwrap();
        assert_eq!(snapshot.reserve.total_currency, 8_000);
        assert_eq!(snapshot.yes_holders, 8);
        assert_eq!(snapshot.event_count, 81);
        assert!(snapshot.conserved);
    }
}
