// ============================================================================
// Reference Currency - Market Handler
// ============================================================================
//
// The market handler never owns token balances itself. It talks to the
// reference currency through the `CurrencyAccount` capability:
//
//   allowance(owner, spender)          - how much the ledger may pull
//   transfer_from(spender, from, to)   - pull a buyer's payment in
//   transfer(from, to)                 - push fees, sale proceeds, rewards out
//   decimals()                         - precision of the smallest unit
//
// `TokenLedger` is the in-process implementation used by the HTTP service
// and the tests. All amounts are integers in the smallest currency unit.
//
// ============================================================================

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::error::LedgerError;

// ============================================================================
// CAPABILITY
// ============================================================================

/// Currency-facing capability consumed by every market handler
pub trait CurrencyAccount: Send + Sync {
    /// Decimal places of the smallest unit
    fn decimals(&self) -> u32;

    fn balance_of(&self, account: &str) -> u128;

    fn allowance(&self, owner: &str, spender: &str) -> u128;

    /// Move `amount` out of `from`, which must be the caller's own account
    fn transfer(&self, from: &str, to: &str, amount: u128) -> Result<(), CurrencyError>;

    /// Move `amount` from `from` to `to` using the allowance granted to `spender`
    fn transfer_from(
        &self,
        spender: &str,
        from: &str,
        to: &str,
        amount: u128,
    ) -> Result<(), CurrencyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurrencyError {
    #[error("{account} holds {balance}, needs {required}")]
    InsufficientFunds {
        account: String,
        balance: u128,
        required: u128,
    },

    #[error("{spender} may pull {allowance} from {owner}, needs {required}")]
    InsufficientAllowance {
        owner: String,
        spender: String,
        allowance: u128,
        required: u128,
    },

    #[error("balance overflow on {0}")]
    Overflow(String),

    #[error("transfer rejected: {0}")]
    Rejected(String),
}

impl From<CurrencyError> for LedgerError {
    fn from(err: CurrencyError) -> Self {
        LedgerError::TransferFailed(err.to_string())
    }
}

// ============================================================================
// TOKEN LEDGER
// ============================================================================

#[derive(Debug, Default)]
struct TokenBook {
    balances: HashMap<String, u128>,
    /// (owner, spender) -> remaining allowance
    allowances: HashMap<(String, String), u128>,
}

impl TokenBook {
    fn balance(&self, account: &str) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn move_funds(&mut self, from: &str, to: &str, amount: u128) -> Result<(), CurrencyError> {
        let from_balance = self.balance(from);
        if from_balance < amount {
            return Err(CurrencyError::InsufficientFunds {
                account: from.to_string(),
                balance: from_balance,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }

        let to_balance = self
            .balance(to)
            .checked_add(amount)
            .ok_or_else(|| CurrencyError::Overflow(to.to_string()))?;

        self.balances.insert(from.to_string(), from_balance - amount);
        self.balances.insert(to.to_string(), to_balance);
        Ok(())
    }
}

/// In-memory reference currency with ERC-20 style allowances
#[derive(Debug)]
pub struct TokenLedger {
    symbol: String,
    decimals: u32,
    book: Mutex<TokenBook>,
}

/// Balance view for API responses
#[derive(Debug, Clone, Serialize)]
pub struct TokenBalance {
    pub account: String,
    pub symbol: String,
    pub balance: u128,
    pub decimals: u32,
}

impl TokenLedger {
    pub fn new(symbol: &str, decimals: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            book: Mutex::new(TokenBook::default()),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Credit new supply to an account. Returns the new balance.
    pub fn mint(&self, account: &str, amount: u128) -> Result<u128, CurrencyError> {
        let mut book = self.book.lock();
        let balance = book
            .balance(account)
            .checked_add(amount)
            .ok_or_else(|| CurrencyError::Overflow(account.to_string()))?;
        book.balances.insert(account.to_string(), balance);
        debug!(account, amount = %amount, balance = %balance, "minted reference currency");
        Ok(balance)
    }

    /// Set (not add to) the allowance `owner` grants `spender`
    pub fn approve(&self, owner: &str, spender: &str, amount: u128) {
        let mut book = self.book.lock();
        book.allowances
            .insert((owner.to_string(), spender.to_string()), amount);
        debug!(owner, spender, amount = %amount, "allowance set");
    }

    pub fn balance_view(&self, account: &str) -> TokenBalance {
        TokenBalance {
            account: account.to_string(),
            symbol: self.symbol.clone(),
            balance: self.balance_of(account),
            decimals: self.decimals,
        }
    }
}

impl CurrencyAccount for TokenLedger {
    fn decimals(&self) -> u32 {
        self.decimals
    }

    fn balance_of(&self, account: &str) -> u128 {
        self.book.lock().balance(account)
    }

    fn allowance(&self, owner: &str, spender: &str) -> u128 {
        self.book
            .lock()
            .allowances
            .get(&(owner.to_string(), spender.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&self, from: &str, to: &str, amount: u128) -> Result<(), CurrencyError> {
        self.book.lock().move_funds(from, to, amount)
    }

    fn transfer_from(
        &self,
        spender: &str,
        from: &str,
        to: &str,
        amount: u128,
    ) -> Result<(), CurrencyError> {
        let mut book = self.book.lock();
        let key = (from.to_string(), spender.to_string());
        let allowance = book.allowances.get(&key).copied().unwrap_or(0);
        if allowance < amount {
            return Err(CurrencyError::InsufficientAllowance {
                owner: from.to_string(),
                spender: spender.to_string(),
                allowance,
                required: amount,
            });
        }

        book.move_funds(from, to, amount)?;
        book.allowances.insert(key, allowance - amount);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_and_transfer() {
        let token = TokenLedger::new("USDC", 6);
        token.mint("alice", 1_000).unwrap();

        token.transfer("alice", "bob", 400).unwrap();
        assert_eq!(token.balance_of("alice"), 600);
        assert_eq!(token.balance_of("bob"), 400);
    }

    #[test]
    fn test_transfer_insufficient_funds() {
        let token = TokenLedger::new("USDC", 6);
        token.mint("alice", 100).unwrap();

        let err = token.transfer("alice", "bob", 101).unwrap_err();
        assert!(matches!(err, CurrencyError::InsufficientFunds { balance: 100, .. }));
        assert_eq!(token.balance_of("alice"), 100);
        assert_eq!(token.balance_of("bob"), 0);
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let token = TokenLedger::new("USDC", 6);
        token.mint("alice", 1_000).unwrap();
        token.approve("alice", "market", 300);

        token.transfer_from("market", "alice", "market", 200).unwrap();
        assert_eq!(token.allowance("alice", "market"), 100);
        assert_eq!(token.balance_of("market"), 200);

        let err = token.transfer_from("market", "alice", "market", 200).unwrap_err();
        assert!(matches!(err, CurrencyError::InsufficientAllowance { allowance: 100, .. }));
    }

    #[test]
    fn test_currency_error_maps_to_transfer_failed() {
        let err: LedgerError = CurrencyError::Rejected("frozen".to_string()).into();
        assert_eq!(err, LedgerError::TransferFailed("transfer rejected: frozen".to_string()));
    }
}
