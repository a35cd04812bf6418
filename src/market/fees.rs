// ============================================================================
// Fee Calculator
// ============================================================================
//
//   fee(amount) = floor(amount * fee_rate / precision)
//
// Truncation always favours whoever receives the principal, never the fee
// sink. The same function is applied independently to the currency leg and
// to the unit leg of a trade.
//
// ============================================================================

use rust_decimal::Decimal;
use serde::Serialize;

/// Pure fee function over integer quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeCalculator {
    fee_rate: u128,
    precision: u128,
    decimals: u32,
}

impl FeeCalculator {
    /// `fee_rate` must not exceed `10^decimals`; `MarketConfig::validate`
    /// guarantees this for every handler.
    pub fn new(fee_rate: u32, decimals: u32, precision: u128) -> Self {
        Self {
            fee_rate: u128::from(fee_rate),
            precision,
            decimals,
        }
    }

    /// Fee levied on `amount`, truncated toward zero
    pub fn fee(&self, amount: u128) -> u128 {
        // floor(a*r/p) split as (a/p)*r + floor((a%p)*r/p) so the product never overflows
        let whole = (amount / self.precision).saturating_mul(self.fee_rate);
        let rest = (amount % self.precision) * self.fee_rate / self.precision;
        whole.saturating_add(rest)
    }

    /// `amount` with its fee removed
    pub fn net(&self, amount: u128) -> u128 {
        amount - self.fee(amount).min(amount)
    }

    pub fn fee_rate(&self) -> u128 {
        self.fee_rate
    }

    /// Fraction of each amount actually taken, e.g. 0.00005 for rate 50 at 6 decimals
    pub fn effective_rate(&self) -> Decimal {
        Decimal::from_i128_with_scale(self.fee_rate as i128, self.decimals)
    }

    /// The configured rate read as parts per ten thousand, in percent
    pub fn nominal_percent(&self) -> Decimal {
        Decimal::from_i128_with_scale(self.fee_rate as i128, 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn calculator() -> FeeCalculator {
        FeeCalculator::new(50, 6, 1_000_000)
    }

    #[test]
    fn test_fee_truncates() {
        let fees = calculator();
        assert_eq!(fees.fee(1_000_000), 50);
        assert_eq!(fees.fee(10_000), 0);
        assert_eq!(fees.fee(19_999), 0);
        assert_eq!(fees.fee(20_000), 1);
        assert_eq!(fees.fee(0), 0);
    }

    #[test]
    fn test_net_amount() {
        let fees = calculator();
        assert_eq!(fees.net(1_000_000), 999_950);
        assert_eq!(fees.net(1), 1);
    }

    #[test]
    fn test_zero_rate_takes_nothing() {
        let fees = FeeCalculator::new(0, 6, 1_000_000);
        assert_eq!(fees.fee(u128::MAX), 0);
        assert_eq!(fees.net(12_345), 12_345);
    }

    #[test]
    fn test_huge_amount_does_not_overflow() {
        let fees = calculator();
        let amount = u128::MAX;
        assert_eq!(fees.fee(amount), (amount / 1_000_000) * 50 + (amount % 1_000_000) * 50 / 1_000_000);
    }

    #[test]
    fn test_rate_display() {
        let fees = calculator();
        assert_eq!(fees.effective_rate(), dec!(0.000050));
        assert_eq!(fees.nominal_percent(), dec!(0.50));
    }

    proptest! {
        #[test]
        fn fee_never_exceeds_exact_quotient(amount in 0u128..1_000_000_000_000u128, rate in 0u32..=10_000u32) {
            let fees = FeeCalculator::new(rate, 6, 1_000_000);
            let fee = fees.fee(amount);
            prop_assert!(fee * 1_000_000 <= amount * u128::from(rate));
            prop_assert!(fee <= amount);
        }

        #[test]
        fn fee_is_non_decreasing(amount in 0u128..1_000_000_000_000u128, step in 0u128..1_000_000u128) {
            let fees = calculator();
            prop_assert!(fees.fee(amount) <= fees.fee(amount + step));
        }
    }
}
