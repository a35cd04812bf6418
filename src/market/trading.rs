// ============================================================================
// Trading Engine
// ============================================================================
//
// Buy, sell and swap against the reserve and the holder registry. All three
// require the market to be open and a positive quantity.
//
//   Buy(side, n):   owed = n * price / precision pulled in
//                   fee(owed) forwarded to the fee sink, the rest backs `side`
//                   units credited = n - fee(n)
//
//   Sell(side, n):  total = n * price / precision
//                   total - fee(total) to seller, then fee(total) to the sink
//                   a fee the sink refuses stays in the pool
//
//   Swap(from, n):  equiv = n * price / precision
//                   equiv - fee(equiv) backing moves from -> to
//                   units credited on the other side = n - fee(n)
//
// The currency leg and the unit leg are charged independently. Every check
// and every checked computation runs before the first currency transfer, and
// ledger state is only written after the transfers succeed.
//
// ============================================================================

use serde::Serialize;
use tracing::{info, warn};

use super::{MarketEvent, MarketHandler, Side};
use crate::error::{LedgerError, Result};

// ============================================================================
// TYPES
// ============================================================================

/// Signed unit change per side, reported to the registry after every trade
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TradeDelta {
    pub yes: i128,
    pub no: i128,
}

impl TradeDelta {
    fn single(side: Side, units: i128) -> Self {
        match side {
            Side::Yes => Self { yes: units, no: 0 },
            Side::No => Self { yes: 0, no: units },
        }
    }

    pub fn credit(side: Side, units: u128) -> Result<Self> {
        Ok(Self::single(side, signed(units)?))
    }

    pub fn debit(side: Side, units: u128) -> Result<Self> {
        Ok(Self::single(side, -signed(units)?))
    }

    /// `units_out` leave `from`, `units_in` arrive on the opposite side
    pub fn swap(from: Side, units_out: u128, units_in: u128) -> Result<Self> {
        let out = Self::debit(from, units_out)?;
        let incoming = Self::credit(from.opposite(), units_in)?;
        Ok(Self {
            yes: out.yes + incoming.yes,
            no: out.no + incoming.no,
        })
    }
}

fn signed(units: u128) -> Result<i128> {
    i128::try_from(units).map_err(|_| LedgerError::Overflow)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeKind {
    Buy,
    Sell,
    Swap,
}

/// Outcome of a committed trade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeReceipt {
    pub market_id: String,
    pub participant: String,
    pub kind: TradeKind,
    /// Side the units were bought on, sold from, or swapped from
    pub side: Side,
    pub amount: u128,
    /// Currency pulled in (buy), paid out (sell) or moved between backings (swap)
    pub currency: u128,
    /// Fee on the currency leg
    pub currency_fee: u128,
    /// Fee on the unit leg
    pub unit_fee: u128,
    pub delta: TradeDelta,
    pub yes_balance: u128,
    pub no_balance: u128,
}

/// Price breakdown of a buy, without executing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BuyQuote {
    pub amount: u128,
    /// Currency pulled from the buyer
    pub owed: u128,
    /// Part of `owed` forwarded to the fee sink
    pub currency_fee: u128,
    /// Part of `owed` added to the side backing
    pub net_currency: u128,
    pub unit_fee: u128,
    /// Units credited to the buyer
    pub units: u128,
}

fn ensure_positive(amount: u128) -> Result<()> {
    if amount == 0 {
        Err(LedgerError::InvalidAmount)
    } else {
        Ok(())
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

impl MarketHandler {
    pub fn quote_buy(&self, amount: u128) -> Result<BuyQuote> {
        ensure_positive(amount)?;
        let owed = self.price(amount)?;
        let currency_fee = self.fees.fee(owed);
        let unit_fee = self.fees.fee(amount);
        Ok(BuyQuote {
            amount,
            owed,
            currency_fee,
            net_currency: owed - currency_fee,
            unit_fee,
            units: amount - unit_fee,
        })
    }

    pub fn buy(&mut self, participant: &str, side: Side, amount: u128) -> Result<TradeReceipt> {
        self.ensure_open()?;
        let quote = self.quote_buy(amount)?;

        let next_reserve = self
            .reserve
            .after_buy(side, quote.net_currency, quote.currency_fee)?;
        let next_balance = self
            .holders
            .balance(side, participant)
            .checked_add(quote.units)
            .ok_or(LedgerError::Overflow)?;
        let delta = TradeDelta::credit(side, quote.units)?;

        let allowance = self
            .currency
            .allowance(participant, &self.config.ledger_account);
        if allowance < quote.owed {
            return Err(LedgerError::InsufficientAllowance {
                required: quote.owed,
                allowance,
            });
        }

        self.pull_in(participant, quote.owed, quote.currency_fee)?;

        self.reserve = next_reserve;
        self.holders.set_balance(side, participant, next_balance);
        self.record(MarketEvent::Bought {
            participant: participant.to_string(),
            side,
            amount,
            currency_in: quote.owed,
            fee: quote.currency_fee,
            yes_delta: delta.yes,
            no_delta: delta.no,
        });
        self.report(participant, delta);

        info!(
            market_id = %self.config.market_id,
            participant,
            side = %side,
            amount = %amount,
            owed = %quote.owed,
            units = %quote.units,
            "buy"
        );

        Ok(self.receipt(participant, TradeKind::Buy, side, amount, quote.owed, quote.currency_fee, quote.unit_fee, delta))
    }

    pub fn sell(&mut self, participant: &str, side: Side, amount: u128) -> Result<TradeReceipt> {
        self.ensure_open()?;
        ensure_positive(amount)?;

        let balance = self.holders.balance(side, participant);
        if balance < amount {
            return Err(LedgerError::InsufficientBalance {
                side,
                available: balance,
                required: amount,
            });
        }

        let total = self.price(amount)?;
        let fee = self.fees.fee(total);
        let payout = total - fee;
        let accounting = self.config.sell_accounting;
        let next_reserve = self.reserve.after_sell(side, total, fee, accounting)?;
        let retained_reserve = self.reserve.after_sell(side, payout, 0, accounting)?;
        let delta = TradeDelta::debit(side, amount)?;

        self.ensure_liquidity(total)?;
        self.push_out(participant, payout)?;

        let (next_reserve, fee) = match self.forward_fee(fee) {
            Ok(()) => (next_reserve, fee),
            Err(e) => {
                warn!(
                    market_id = %self.config.market_id,
                    participant,
                    fee = %fee,
                    error = %e,
                    "sale fee retained in pool"
                );
                (retained_reserve, 0)
            }
        };

        self.reserve = next_reserve;
        self.holders.set_balance(side, participant, balance - amount);
        self.record(MarketEvent::Sold {
            participant: participant.to_string(),
            side,
            amount,
            payout,
            fee,
            yes_delta: delta.yes,
            no_delta: delta.no,
        });
        self.report(participant, delta);

        info!(
            market_id = %self.config.market_id,
            participant,
            side = %side,
            amount = %amount,
            payout = %payout,
            "sell"
        );

        Ok(self.receipt(participant, TradeKind::Sell, side, amount, payout, fee, 0, delta))
    }

    pub fn swap(&mut self, participant: &str, from: Side, amount: u128) -> Result<TradeReceipt> {
        self.ensure_open()?;
        ensure_positive(amount)?;

        let to = from.opposite();
        let from_balance = self.holders.balance(from, participant);
        if from_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                side: from,
                available: from_balance,
                required: amount,
            });
        }

        let equiv = self.price(amount)?;
        let currency_fee = self.fees.fee(equiv);
        let moved = equiv - currency_fee;
        let next_reserve = self.reserve.after_swap(from, moved)?;

        let unit_fee = self.fees.fee(amount);
        let units_in = amount - unit_fee;
        let to_balance = self
            .holders
            .balance(to, participant)
            .checked_add(units_in)
            .ok_or(LedgerError::Overflow)?;
        let delta = TradeDelta::swap(from, amount, units_in)?;

        self.reserve = next_reserve;
        self.holders.set_balance(from, participant, from_balance - amount);
        self.holders.set_balance(to, participant, to_balance);
        self.record(MarketEvent::Swapped {
            participant: participant.to_string(),
            from_side: from,
            to_side: to,
            amount,
            currency_moved: moved,
            fee: currency_fee,
            yes_delta: delta.yes,
            no_delta: delta.no,
        });
        self.report(participant, delta);

        info!(
            market_id = %self.config.market_id,
            participant,
            from = %from,
            amount = %amount,
            moved = %moved,
            units_in = %units_in,
            "swap"
        );

        Ok(self.receipt(participant, TradeKind::Swap, from, amount, moved, currency_fee, unit_fee, delta))
    }

    #[allow(clippy::too_many_arguments)]
    fn receipt(
        &self,
        participant: &str,
        kind: TradeKind,
        side: Side,
        amount: u128,
        currency: u128,
        currency_fee: u128,
        unit_fee: u128,
        delta: TradeDelta,
    ) -> TradeReceipt {
        TradeReceipt {
            market_id: self.config.market_id.clone(),
            participant: participant.to_string(),
            kind,
            side,
            amount,
            currency,
            currency_fee,
            unit_fee,
            delta,
            yes_balance: self.holders.balance(Side::Yes, participant),
            no_balance: self.holders.balance(Side::No, participant),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
