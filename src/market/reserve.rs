// ============================================================================
// Reserve Ledger
// ============================================================================
//
// Authoritative currency totals for one market:
//
//   total_currency == yes_backing + no_backing
//
// Every transition is computed on a copy (`after_*`) and only assigned back
// once the currency legs of the operation have succeeded, so a failed
// operation never leaves a half-updated reserve behind.
//
// ============================================================================

use serde::{Deserialize, Serialize};

use super::{SellAccounting, Side};
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveState {
    /// Currency held for the pool, fees excluded
    pub total_currency: u128,
    /// Running count of fees forwarded to the fee sink
    pub total_fee: u128,
    pub yes_backing: u128,
    pub no_backing: u128,
    /// Rewards paid out after resolution
    pub total_paid_out: u128,
}

impl ReserveState {
    pub fn backing(&self, side: Side) -> u128 {
        match side {
            Side::Yes => self.yes_backing,
            Side::No => self.no_backing,
        }
    }

    fn backing_mut(&mut self, side: Side) -> &mut u128 {
        match side {
            Side::Yes => &mut self.yes_backing,
            Side::No => &mut self.no_backing,
        }
    }

    pub fn is_conserved(&self) -> bool {
        self.yes_backing.checked_add(self.no_backing) == Some(self.total_currency)
    }

    /// Reserve after a buy that keeps `net_currency` and forwards `fee`
    pub fn after_buy(&self, side: Side, net_currency: u128, fee: u128) -> Result<Self> {
        let mut next = *self;
        next.total_currency = add(next.total_currency, net_currency)?;
        next.total_fee = add(next.total_fee, fee)?;
        let backing = next.backing_mut(side);
        *backing = add(*backing, net_currency)?;
        Ok(next)
    }

    /// Reserve after a sale releasing `total` (payout plus fee)
    pub fn after_sell(
        &self,
        side: Side,
        total: u128,
        fee: u128,
        accounting: SellAccounting,
    ) -> Result<Self> {
        let mut next = *self;
        next.total_currency = sub(next.total_currency, total)?;
        next.total_fee = add(next.total_fee, fee)?;
        if accounting == SellAccounting::Conserving {
            let backing = next.backing_mut(side);
            *backing = sub(*backing, total)?;
        }
        Ok(next)
    }

    /// Reserve after moving `moved` backing from `from` to its opposite side
    pub fn after_swap(&self, from: Side, moved: u128) -> Result<Self> {
        let mut next = *self;
        let source = next.backing_mut(from);
        *source = sub(*source, moved)?;
        let target = next.backing_mut(from.opposite());
        *target = add(*target, moved)?;
        Ok(next)
    }

    pub fn after_payout(&self, share: u128) -> Result<Self> {
        let mut next = *self;
        next.total_paid_out = add(next.total_paid_out, share)?;
        Ok(next)
    }
}

fn add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(LedgerError::Overflow)
}

fn sub(available: u128, required: u128) -> Result<u128> {
    available
        .checked_sub(required)
        .ok_or(LedgerError::InsufficientLiquidity { required, available })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_credits_side_backing() {
        let reserve = ReserveState::default()
            .after_buy(Side::Yes, 9_950, 50)
            .unwrap();
        assert_eq!(reserve.total_currency, 9_950);
        assert_eq!(reserve.yes_backing, 9_950);
        assert_eq!(reserve.no_backing, 0);
        assert_eq!(reserve.total_fee, 50);
        assert!(reserve.is_conserved());
    }

    #[test]
    fn test_conserving_sell_debits_backing() {
        let reserve = ReserveState::default()
            .after_buy(Side::No, 1_000, 0)
            .unwrap()
            .after_sell(Side::No, 400, 2, SellAccounting::Conserving)
            .unwrap();
        assert_eq!(reserve.total_currency, 600);
        assert_eq!(reserve.no_backing, 600);
        assert!(reserve.is_conserved());
    }

    #[test]
    fn test_literal_sell_leaves_backing() {
        let reserve = ReserveState::default()
            .after_buy(Side::No, 1_000, 0)
            .unwrap()
            .after_sell(Side::No, 400, 2, SellAccounting::Literal)
            .unwrap();
        assert_eq!(reserve.total_currency, 600);
        assert_eq!(reserve.no_backing, 1_000);
        assert!(!reserve.is_conserved());
    }

    #[test]
    fn test_sell_beyond_reserve_fails() {
        let reserve = ReserveState::default().after_buy(Side::Yes, 100, 0).unwrap();
        let err = reserve
            .after_sell(Side::Yes, 101, 0, SellAccounting::Conserving)
            .unwrap_err();
        assert_eq!(err, LedgerError::InsufficientLiquidity { required: 101, available: 100 });
    }

    #[test]
    fn test_swap_moves_backing() {
        let reserve = ReserveState::default()
            .after_buy(Side::Yes, 1_000, 0)
            .unwrap()
            .after_swap(Side::Yes, 300)
            .unwrap();
        assert_eq!(reserve.yes_backing, 700);
        assert_eq!(reserve.no_backing, 300);
        assert_eq!(reserve.total_currency, 1_000);
        assert!(reserve.is_conserved());
    }
}
