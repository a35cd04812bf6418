// ============================================================================
// Settlement & Reward Distribution
// ============================================================================
//
// Open -> Resolved, exactly once, after the deadline, by the owner only.
//
// Payout per winner:
//
//   share = winning_units * total_currency / winning_supply   (truncated)
//
// `winning_supply` is the winning side's unit supply captured at resolution,
// so units are divided by units whatever the base price. The whole pool,
// losing side's backing included, is split across winning holders. Pool
// totals are frozen at resolution; truncation dust is left unclaimed and no
// claimant receives a corrective remainder.
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use super::{MarketEvent, MarketHandler, Side};
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SettlementRecord {
    winning_side: Option<Side>,
    resolved_at: Option<DateTime<Utc>>,
    /// Winning-side units outstanding when the market resolved
    winning_supply: u128,
    #[serde(skip)]
    reward_collected: HashSet<String>,
}

impl SettlementRecord {
    pub fn is_resolved(&self) -> bool {
        self.winning_side.is_some()
    }

    pub fn winning_side(&self) -> Option<Side> {
        self.winning_side
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn winning_supply(&self) -> u128 {
        self.winning_supply
    }

    pub fn has_collected(&self, participant: &str) -> bool {
        self.reward_collected.contains(participant)
    }

    pub fn collected_count(&self) -> usize {
        self.reward_collected.len()
    }
}

/// Result of a successful reward collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardReceipt {
    pub market_id: String,
    pub participant: String,
    pub side: Side,
    pub units: u128,
    pub share: u128,
}

impl MarketHandler {
    /// Record the winning side. Only the owning registry may call this, once,
    /// after the deadline has passed.
    pub fn resolve(&mut self, caller: &str, winning_side: Side) -> Result<()> {
        if caller != self.config.owner {
            return Err(LedgerError::Unauthorized {
                caller: caller.to_string(),
            });
        }
        if self.settlement.is_resolved() {
            return Err(LedgerError::AlreadyResolved {
                market_id: self.config.market_id.clone(),
            });
        }
        let now = self.clock.now();
        if now <= self.config.deadline {
            return Err(LedgerError::MarketStillOpen {
                market_id: self.config.market_id.clone(),
            });
        }

        let winning_supply = self.holders.total_units(winning_side);
        self.settlement.winning_side = Some(winning_side);
        self.settlement.resolved_at = Some(now);
        self.settlement.winning_supply = winning_supply;
        self.record(MarketEvent::Resolved {
            winning_side,
            total_currency: self.reserve.total_currency,
            winning_backing: self.reserve.backing(winning_side),
            winning_supply,
        });

        info!(
            market_id = %self.config.market_id,
            winning_side = %winning_side,
            total_currency = %self.reserve.total_currency,
            winning_supply = %winning_supply,
            winners = self.holders.holder_count(winning_side),
            "market resolved"
        );
        Ok(())
    }

    /// Share `participant` would receive, checked like `collect_reward`
    pub fn preview_reward(&self, participant: &str) -> Result<RewardReceipt> {
        let side = self
            .settlement
            .winning_side
            .ok_or(LedgerError::RewardsNotAvailable)?;
        if self.settlement.has_collected(participant) {
            return Err(LedgerError::AlreadyCollected {
                participant: participant.to_string(),
            });
        }
        let units = self.holders.balance(side, participant);
        if units == 0 {
            return Err(LedgerError::NotAWinner {
                participant: participant.to_string(),
            });
        }

        Ok(RewardReceipt {
            market_id: self.config.market_id.clone(),
            participant: participant.to_string(),
            side,
            units,
            share: self.reward_share(units)?,
        })
    }

    pub fn collect_reward(&mut self, participant: &str) -> Result<RewardReceipt> {
        let receipt = self.preview_reward(participant)?;
        let next_reserve = self.reserve.after_payout(receipt.share)?;

        self.ensure_liquidity(receipt.share)?;
        self.push_out(participant, receipt.share)?;

        self.reserve = next_reserve;
        self.holders.set_balance(receipt.side, participant, 0);
        self.settlement
            .reward_collected
            .insert(participant.to_string());
        self.record(MarketEvent::RewardCollected {
            participant: participant.to_string(),
            side: receipt.side,
            units: receipt.units,
            share: receipt.share,
        });

        info!(
            market_id = %self.config.market_id,
            participant,
            units = %receipt.units,
            share = %receipt.share,
            "reward collected"
        );
        Ok(receipt)
    }

    fn reward_share(&self, units: u128) -> Result<u128> {
        let supply = self.settlement.winning_supply;
        if supply == 0 {
            return Ok(0);
        }
        units
            .checked_mul(self.reserve.total_currency)
            .map(|v| v / supply)
            .ok_or(LedgerError::Overflow)
    }
}
