// Application state shared by every HTTP handler

use std::sync::Arc;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::currency::TokenLedger;
use crate::registry::{FixedOracle, MarketRegistry};

pub type SharedState = Arc<AppState>;

/// Markets carry their own locks inside the registry, so the state itself
/// needs no outer mutex.
pub struct AppState {
    pub registry: MarketRegistry,
    pub token: Arc<TokenLedger>,
    pub oracle: Arc<FixedOracle>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build with an explicit time source
    pub fn with_clock(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        let token = Arc::new(TokenLedger::new(
            &config.currency_symbol,
            config.currency_decimals,
        ));
        let registry = MarketRegistry::new(
            &config.registry_principal,
            &config.fee_sink,
            token.clone(),
            clock,
        );

        info!(
            currency = %config.currency_symbol,
            decimals = config.currency_decimals,
            fee_sink = %config.fee_sink,
            principal = %config.registry_principal,
            "application state initialized"
        );

        Self {
            registry,
            token,
            oracle: Arc::new(FixedOracle::new()),
            config,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(self)
    }
}
