// Service configuration, read from the environment (and `.env` via dotenv)

use std::net::SocketAddr;

use crate::error::{LedgerError, Result};
use crate::market::{MAX_DECIMALS, MAX_FEE_RATE};

pub const DEFAULT_BIND: &str = "0.0.0.0:1234";
pub const DEFAULT_DECIMALS: u32 = 6;
pub const DEFAULT_FEE_RATE: u32 = 50;
pub const DEFAULT_FEE_SINK: &str = "fee_sink";
pub const DEFAULT_PRINCIPAL: &str = "registry";
pub const DEFAULT_SYMBOL: &str = "USDC";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// MARKET_HANDLER_BIND
    pub bind_addr: SocketAddr,
    /// CURRENCY_SYMBOL
    pub currency_symbol: String,
    /// CURRENCY_DECIMALS
    pub currency_decimals: u32,
    /// FEE_SINK_ACCOUNT
    pub fee_sink: String,
    /// DEFAULT_FEE_RATE, used when a create request omits one
    pub default_fee_rate: u32,
    /// REGISTRY_PRINCIPAL
    pub registry_principal: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 1234)),
            currency_symbol: DEFAULT_SYMBOL.to_string(),
            currency_decimals: DEFAULT_DECIMALS,
            fee_sink: DEFAULT_FEE_SINK.to_string(),
            default_fee_rate: DEFAULT_FEE_RATE,
            registry_principal: DEFAULT_PRINCIPAL.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bind = lookup("MARKET_HANDLER_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind
            .parse::<SocketAddr>()
            .map_err(|e| LedgerError::InvalidConfig(format!("MARKET_HANDLER_BIND={}: {}", bind, e)))?;

        let config = Self {
            bind_addr,
            currency_symbol: lookup("CURRENCY_SYMBOL").unwrap_or_else(|| DEFAULT_SYMBOL.to_string()),
            currency_decimals: parse_or(&lookup, "CURRENCY_DECIMALS", DEFAULT_DECIMALS)?,
            fee_sink: lookup("FEE_SINK_ACCOUNT").unwrap_or_else(|| DEFAULT_FEE_SINK.to_string()),
            default_fee_rate: parse_or(&lookup, "DEFAULT_FEE_RATE", DEFAULT_FEE_RATE)?,
            registry_principal: lookup("REGISTRY_PRINCIPAL")
                .unwrap_or_else(|| DEFAULT_PRINCIPAL.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.currency_decimals > MAX_DECIMALS {
            return Err(LedgerError::InvalidConfig(format!(
                "CURRENCY_DECIMALS {} exceeds {}",
                self.currency_decimals, MAX_DECIMALS
            )));
        }
        if self.default_fee_rate > MAX_FEE_RATE {
            return Err(LedgerError::InvalidConfig(format!(
                "DEFAULT_FEE_RATE {} exceeds {}",
                self.default_fee_rate, MAX_FEE_RATE
            )));
        }
        if self.fee_sink.is_empty() || self.registry_principal.is_empty() {
            return Err(LedgerError::InvalidConfig(
                "fee sink and registry principal must be set".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u32) -> Result<u32> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u32>()
            .map_err(|e| LedgerError::InvalidConfig(format!("{}={}: {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("MARKET_HANDLER_BIND", "127.0.0.1:9000"),
            ("CURRENCY_DECIMALS", "18"),
            ("DEFAULT_FEE_RATE", "25"),
            ("FEE_SINK_ACCOUNT", "treasury"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.currency_decimals, 18);
        assert_eq!(config.default_fee_rate, 25);
        assert_eq!(config.fee_sink, "treasury");
    }

    #[test]
    fn test_invalid_values() {
        assert!(ServerConfig::from_lookup(lookup(&[("CURRENCY_DECIMALS", "abc")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("CURRENCY_DECIMALS", "40")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("DEFAULT_FEE_RATE", "20000")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("MARKET_HANDLER_BIND", "nowhere")])).is_err());
    }
}
