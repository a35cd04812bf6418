// ============================================================================
// Market Events
// ============================================================================
//
// Append-only journal of everything that changed a market's state. Each
// record carries enough fields to rebuild the delta it describes, and a
// SHA-256 digest chained over the previous record:
//
//   digest[n] = sha256(digest[n-1] || json(event[n]))
//
// so an indexer replaying the journal can detect gaps or edits.
//
// ============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::Side;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    MarketOpened {
        market_id: String,
        deadline: DateTime<Utc>,
        fee_rate: u32,
        base_price: u128,
    },
    Bought {
        participant: String,
        side: Side,
        amount: u128,
        currency_in: u128,
        fee: u128,
        yes_delta: i128,
        no_delta: i128,
    },
    Sold {
        participant: String,
        side: Side,
        amount: u128,
        payout: u128,
        fee: u128,
        yes_delta: i128,
        no_delta: i128,
    },
    Swapped {
        participant: String,
        from_side: Side,
        to_side: Side,
        amount: u128,
        currency_moved: u128,
        fee: u128,
        yes_delta: i128,
        no_delta: i128,
    },
    Resolved {
        winning_side: Side,
        total_currency: u128,
        winning_backing: u128,
        winning_supply: u128,
    },
    RewardCollected {
        participant: String,
        side: Side,
        units: u128,
        share: u128,
    },
}

impl MarketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            MarketEvent::MarketOpened { .. } => "market_opened",
            MarketEvent::Bought { .. } => "bought",
            MarketEvent::Sold { .. } => "sold",
            MarketEvent::Swapped { .. } => "swapped",
            MarketEvent::Resolved { .. } => "resolved",
            MarketEvent::RewardCollected { .. } => "reward_collected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub event: MarketEvent,
    pub digest: String,
}

#[derive(Debug, Clone, Default)]
pub struct EventJournal {
    records: Vec<EventRecord>,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, event: MarketEvent, timestamp: DateTime<Utc>) -> &EventRecord {
        let digest = chain_digest(self.head_digest(), &event);
        let sequence = self.records.len() as u64;
        self.records.push(EventRecord {
            sequence,
            timestamp,
            event,
            digest,
        });
        &self.records[self.records.len() - 1]
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with `sequence >= from`
    pub fn since(&self, from: u64) -> &[EventRecord] {
        let start = usize::try_from(from).unwrap_or(usize::MAX).min(self.records.len());
        &self.records[start..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn head_digest(&self) -> &str {
        self.records.last().map(|r| r.digest.as_str()).unwrap_or("")
    }

    /// Recompute every digest and sequence number
    pub fn verify_chain(&self) -> bool {
        let mut prev = String::new();
        for (i, record) in self.records.iter().enumerate() {
            if record.sequence != i as u64 || chain_digest(&prev, &record.event) != record.digest {
                return false;
            }
            prev = record.digest.clone();
        }
        true
    }
}

fn chain_digest(prev: &str, event: &MarketEvent) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev.as_bytes());
    // Serializing a plain enum of integers and strings cannot fail
    if let Ok(body) = serde_json::to_vec(event) {
        hasher.update(&body);
    }
    hex::encode(hasher.finalize())
}
