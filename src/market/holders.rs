// ============================================================================
// Holder Registry
// ============================================================================
//
// Per-side unit balances plus an append-only index of distinct holders.
//
//   - first non-zero balance  -> participant appended to the side's index
//   - balance back to zero    -> slot tombstoned, never compacted
//   - re-entry                -> appended again at a fresh slot
//
// External indexers rely on slot numbers staying stable, which is why slots
// are never reused.
//
// ============================================================================

use serde::Serialize;
use std::collections::HashMap;

use super::Side;

#[derive(Debug, Default, Clone)]
struct SideBook {
    balances: HashMap<String, u128>,
    index: Vec<Option<String>>,
    slots: HashMap<String, usize>,
}

impl SideBook {
    fn set(&mut self, participant: &str, balance: u128) {
        if balance == 0 {
            self.balances.remove(participant);
            if let Some(slot) = self.slots.remove(participant) {
                self.index[slot] = None;
            }
            return;
        }

        if !self.slots.contains_key(participant) {
            self.slots.insert(participant.to_string(), self.index.len());
            self.index.push(Some(participant.to_string()));
        }
        self.balances.insert(participant.to_string(), balance);
    }
}

/// One entry of a side's holder index
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolderSlot {
    pub slot: usize,
    pub participant: Option<String>,
    pub balance: u128,
}

#[derive(Debug, Default, Clone)]
pub struct HolderRegistry {
    yes: SideBook,
    no: SideBook,
}

impl HolderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self, side: Side) -> &SideBook {
        match side {
            Side::Yes => &self.yes,
            Side::No => &self.no,
        }
    }

    pub fn balance(&self, side: Side, participant: &str) -> u128 {
        self.book(side).balances.get(participant).copied().unwrap_or(0)
    }

    /// Overwrite a balance, maintaining the holder index
    pub fn set_balance(&mut self, side: Side, participant: &str, balance: u128) {
        match side {
            Side::Yes => self.yes.set(participant, balance),
            Side::No => self.no.set(participant, balance),
        }
    }

    /// Participants currently holding a non-zero balance, in index order
    pub fn holders(&self, side: Side) -> Vec<&str> {
        self.book(side).index.iter().flatten().map(String::as_str).collect()
    }

    pub fn holder_count(&self, side: Side) -> usize {
        self.book(side).slots.len()
    }

    /// Raw index including tombstoned slots
    pub fn index(&self, side: Side) -> Vec<HolderSlot> {
        self.book(side)
            .index
            .iter()
            .enumerate()
            .map(|(slot, participant)| HolderSlot {
                slot,
                balance: participant
                    .as_deref()
                    .map(|p| self.balance(side, p))
                    .unwrap_or(0),
                participant: participant.clone(),
            })
            .collect()
    }

    /// Sum of all balances on one side
    pub fn total_units(&self, side: Side) -> u128 {
        self.book(side)
            .balances
            .values()
            .fold(0u128, |acc, b| acc.saturating_add(*b))
    }
}
