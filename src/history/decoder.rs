//! Event Decoding
//!
//! Folds token contract events into a running supply/reserve state. The
//! state is seeded from the newest known snapshot so each block that changes
//! it can be emitted as a complete `ReserveSnapshot`.
//!
//! Each event only carries one group of fields. A cold start therefore has
//! to learn every group from the log before the scan start (see
//! `backfill`); a group never set down to the floor block is zero.

use serde::Serialize;
use tracing::debug;

use crate::ledger::{EventKind, RawLog};
use crate::types::snapshot::{ReserveSnapshot, SnapshotFields};
use crate::types::units::{from_base_units, RESERVE_DECIMALS, TOKEN_DECIMALS};

/// Loan and governance activity seen during a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityCounters {
    pub loans_issued: u64,
    pub loans_repaid: u64,
    pub proposals_created: u64,
}

impl ActivityCounters {
    pub fn total(&self) -> u64 {
        self.loans_issued + self.loans_repaid + self.proposals_created
    }
}

/// Fields set together by one event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    /// `total_supply`, `reserve_held`
    Supply,
    /// `actual_reserve`, `deployed_in_loans`
    Reserve,
    Burned,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 3] = [FieldGroup::Supply, FieldGroup::Reserve, FieldGroup::Burned];

    pub fn of(kind: EventKind) -> Option<Self> {
        match kind {
            EventKind::SupplyUpdated => Some(FieldGroup::Supply),
            EventKind::ReserveUpdated => Some(FieldGroup::Reserve),
            EventKind::TokensBurned => Some(FieldGroup::Burned),
            _ => None,
        }
    }
}

/// Running reserve state
#[derive(Debug, Clone)]
pub struct EventDecoder {
    fields: SnapshotFields,
    floor_price: f64,
}

impl EventDecoder {
    /// Start from `seed`, or from zero on a cold start
    pub fn new(seed: Option<&ReserveSnapshot>, floor_price: f64) -> Self {
        Self {
            fields: seed.map(ReserveSnapshot::fields).unwrap_or_default(),
            floor_price,
        }
    }

    /// Apply one log; returns whether supply or reserve state changed
    pub fn apply(&mut self, log: &RawLog, counters: &mut ActivityCounters) -> bool {
        let Some(kind) = EventKind::from_signature(&log.signature) else {
            return false;
        };
        if log.args.len() < kind.arity() {
            debug!(
                target: "reserve::scanner",
                block = log.block_number,
                signature = %log.signature,
                "Skipping malformed event"
            );
            return false;
        }

        if let Some(group) = FieldGroup::of(kind) {
            self.set_group(group, &log.args);
            self.fields.redemption_price = None;
        } else {
            match kind {
                EventKind::RedemptionPriceUpdated => {
                    self.fields.redemption_price =
                        Some(from_base_units(log.args[0], RESERVE_DECIMALS));
                }
                EventKind::LoanIssued => counters.loans_issued += 1,
                EventKind::LoanRepaid => counters.loans_repaid += 1,
                EventKind::ProposalCreated => counters.proposals_created += 1,
                _ => {}
            }
        }

        kind.is_state_bearing()
    }

    /// Seed `pending` groups from logs that precede the scan start
    ///
    /// Takes the newest well-formed event of each pending group and removes
    /// the group from `pending`. `logs` may come in any order; callers feed
    /// windows newest first so older windows only fill what is still missing.
    pub fn backfill(&mut self, logs: &[RawLog], pending: &mut Vec<FieldGroup>) {
        let mut newest_first: Vec<&RawLog> = logs.iter().collect();
        newest_first.sort_by_key(|log| std::cmp::Reverse((log.block_number, log.log_index)));

        for log in newest_first {
            if pending.is_empty() {
                break;
            }
            let Some(kind) = EventKind::from_signature(&log.signature) else {
                continue;
            };
            let Some(group) = FieldGroup::of(kind) else {
                continue;
            };
            if log.args.len() < kind.arity() || !pending.contains(&group) {
                continue;
            }
            self.set_group(group, &log.args);
            pending.retain(|g| *g != group);
            debug!(
                target: "reserve::scanner",
                block = log.block_number,
                ?group,
                "Seeded field group from earlier block"
            );
        }
    }

    fn set_group(&mut self, group: FieldGroup, args: &[u128]) {
        let token = |raw: u128| from_base_units(raw, TOKEN_DECIMALS);
        let reserve = |raw: u128| from_base_units(raw, RESERVE_DECIMALS);

        match group {
            FieldGroup::Supply => {
                self.fields.total_supply = token(args[0]);
                self.fields.reserve_held = token(args[1]);
            }
            FieldGroup::Reserve => {
                self.fields.actual_reserve = reserve(args[0]);
                self.fields.deployed_in_loans = reserve(args[1]);
            }
            FieldGroup::Burned => self.fields.burned = token(args[0]),
        }
    }

    /// Snapshot of the current state
    pub fn snapshot_at(&self, timestamp: u64) -> ReserveSnapshot {
        ReserveSnapshot::new(timestamp, self.fields, self.floor_price)
    }
}
