//! Reserve Snapshot Types
//!
//! Point-in-time observations of supply and reserve state, and the
//! cursor-tagged history they are merged into.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::accounting;

/// A point-in-time observation of reserve state
///
/// Construct with [`ReserveSnapshot::new`] so that `circulating_supply`
/// always satisfies `max(0, total_supply - reserve_held - burned)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveSnapshot {
    /// Block timestamp in seconds; dedup key
    pub timestamp: u64,
    pub total_supply: f64,
    pub reserve_held: f64,
    pub burned: f64,
    pub circulating_supply: f64,
    pub actual_reserve: f64,
    pub deployed_in_loans: f64,
    pub effective_reserve: f64,
    pub redemption_price: f64,
}

/// Source values for a snapshot; derived fields are computed on construction
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnapshotFields {
    pub total_supply: f64,
    pub reserve_held: f64,
    pub burned: f64,
    pub actual_reserve: f64,
    pub deployed_in_loans: f64,
    /// Reported effective reserve; `actual - deployed` when absent
    pub effective_reserve: Option<f64>,
    /// Reported redemption price; derived from reserve and supply when absent
    pub redemption_price: Option<f64>,
}

impl ReserveSnapshot {
    /// Build a snapshot, deriving circulating supply, effective reserve and a
    /// floor-clamped redemption price
    pub fn new(timestamp: u64, fields: SnapshotFields, floor_price: f64) -> Self {
        let total_supply = non_negative(fields.total_supply);
        let reserve_held = non_negative(fields.reserve_held);
        let burned = non_negative(fields.burned);
        let actual_reserve = non_negative(fields.actual_reserve);
        let deployed_in_loans = non_negative(fields.deployed_in_loans);

        let circulating_supply = accounting::circulating_supply(total_supply, reserve_held, burned);
        let effective_reserve = fields
            .effective_reserve
            .map(non_negative)
            .unwrap_or_else(|| (actual_reserve - deployed_in_loans).max(0.0));
        let raw_price = fields
            .redemption_price
            .or_else(|| accounting::redemption_price(actual_reserve, circulating_supply));

        Self {
            timestamp,
            total_supply,
            reserve_held,
            burned,
            circulating_supply,
            actual_reserve,
            deployed_in_loans,
            effective_reserve,
            redemption_price: accounting::display_price(raw_price, floor_price),
        }
    }

    /// Source values of this snapshot, used to carry state forward
    pub fn fields(&self) -> SnapshotFields {
        SnapshotFields {
            total_supply: self.total_supply,
            reserve_held: self.reserve_held,
            burned: self.burned,
            actual_reserve: self.actual_reserve,
            deployed_in_loans: self.deployed_in_loans,
            effective_reserve: None,
            redemption_price: None,
        }
    }

    /// Coverage of the effective reserve by the actual reserve
    pub fn coverage_ratio(&self) -> Option<f64> {
        accounting::coverage_ratio(self.actual_reserve, self.effective_reserve)
    }

    /// Whether the stored circulating supply matches its inputs
    pub fn is_consistent(&self) -> bool {
        let expected =
            accounting::circulating_supply(self.total_supply, self.reserve_held, self.burned);
        let fields = [
            self.total_supply,
            self.reserve_held,
            self.burned,
            self.actual_reserve,
            self.deployed_in_loans,
            self.effective_reserve,
            self.redemption_price,
        ];
        fields.iter().all(|v| v.is_finite() && *v >= 0.0)
            && (self.circulating_supply - expected).abs() <= 1e-9 * expected.max(1.0)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// Last ledger block through which history has been reconciled
///
/// Persisted as a decimal string so it survives JSON without precision loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScanCursor(pub u64);

impl ScanCursor {
    pub fn block(&self) -> u64 {
        self.0
    }

    /// Move forward to `block`; never moves backwards
    pub fn advanced_to(self, block: u64) -> Self {
        ScanCursor(self.0.max(block))
    }
}

impl Serialize for ScanCursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for ScanCursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.trim()
            .parse()
            .map(ScanCursor)
            .map_err(|_| serde::de::Error::custom(format!("invalid cursor: {}", raw)))
    }
}

/// Timestamp-ordered snapshots paired with the cursor they were scanned to
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReserveHistory {
    snapshots: Vec<ReserveSnapshot>,
    cursor: Option<ScanCursor>,
}

impl ReserveHistory {
    /// Empty history with no cursor (cold start)
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted parts, restoring timestamp order
    pub fn from_parts(snapshots: Vec<ReserveSnapshot>, cursor: Option<ScanCursor>) -> Self {
        let mut history = Self {
            snapshots: Vec::new(),
            cursor,
        };
        history.merge(snapshots);
        history
    }

    pub fn snapshots(&self) -> &[ReserveSnapshot] {
        &self.snapshots
    }

    pub fn cursor(&self) -> Option<ScanCursor> {
        self.cursor
    }

    pub fn latest(&self) -> Option<&ReserveSnapshot> {
        self.snapshots.last()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Union with `incoming` keyed by timestamp; incoming wins on collision
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = ReserveSnapshot>) {
        let mut by_timestamp: BTreeMap<u64, ReserveSnapshot> = self
            .snapshots
            .drain(..)
            .map(|s| (s.timestamp, s))
            .collect();

        for snapshot in incoming {
            by_timestamp.insert(snapshot.timestamp, snapshot);
        }

        self.snapshots = by_timestamp.into_values().collect();
    }

    /// Record progress through `block`; the cursor never regresses
    pub fn advance_cursor(&mut self, block: u64) {
        self.cursor = Some(match self.cursor {
            Some(cursor) => cursor.advanced_to(block),
            None => ScanCursor(block),
        });
    }

    pub fn into_parts(self) -> (Vec<ReserveSnapshot>, Option<ScanCursor>) {
        (self.snapshots, self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(timestamp: u64, total: f64) -> ReserveSnapshot {
        ReserveSnapshot::new(
            timestamp,
            SnapshotFields {
                total_supply: total,
                reserve_held: 200.0,
                burned: 50.0,
                actual_reserve: 825.0,
                ..Default::default()
            },
            1.0,
        )
    }

    #[test]
    fn test_snapshot_derives_fields() {
        let s = snapshot(10, 1000.0);
        assert_eq!(s.circulating_supply, 750.0);
        assert_eq!(s.effective_reserve, 825.0);
        assert!((s.redemption_price - 1.1).abs() < 1e-12);
        assert!(s.is_consistent());
    }

    #[test]
    fn test_snapshot_clamps_negative_circulating() {
        let s = ReserveSnapshot::new(
            1,
            SnapshotFields {
                total_supply: 100.0,
                reserve_held: 90.0,
                burned: 40.0,
                actual_reserve: 10.0,
                ..Default::default()
            },
            1.11,
        );
        assert_eq!(s.circulating_supply, 0.0);
        assert_eq!(s.redemption_price, 1.11);
    }

    #[test]
    fn test_merge_dedups_and_sorts() {
        let mut history = ReserveHistory::new();
        history.merge(vec![snapshot(30, 1000.0), snapshot(10, 1000.0)]);
        history.merge(vec![snapshot(20, 1000.0), snapshot(30, 2000.0)]);

        let timestamps: Vec<u64> = history.snapshots().iter().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![10, 20, 30]);
        assert_eq!(history.latest().map(|s| s.total_supply), Some(2000.0));
    }

    #[test]
    fn test_cursor_never_regresses() {
        let mut history = ReserveHistory::new();
        assert_eq!(history.cursor(), None);
        history.advance_cursor(500);
        history.advance_cursor(100);
        assert_eq!(history.cursor(), Some(ScanCursor(500)));
    }

    #[test]
    fn test_cursor_serializes_as_string() {
        let json = serde_json::to_string(&ScanCursor(u64::MAX)).unwrap();
        assert_eq!(json, format!("\"{}\"", u64::MAX));
        let back: ScanCursor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ScanCursor(u64::MAX));
        assert!(serde_json::from_str::<ScanCursor>("\"12x\"").is_err());
    }
}
