//! Remote History Normalization
//!
//! The remote history feed has shipped several row shapes over time: camelCase
//! and snake_case keys, legacy names, tuple-encoded rows keyed by position,
//! and raw base-unit integers instead of natural units. Everything is mapped
//! onto one `ReserveSnapshot` shape here.

use serde_json::{Map, Value};

use crate::types::snapshot::{ReserveSnapshot, SnapshotFields};
use crate::types::units::{RESERVE_DECIMALS, TOKEN_DECIMALS};

/// Raw values above this are treated as base units and rescaled
pub const RESCALE_THRESHOLD: f64 = 1e12;

/// Timestamps above this are milliseconds
const MILLIS_THRESHOLD: f64 = 1e12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Timestamp,
    TotalSupply,
    ReserveHeld,
    Burned,
    ActualReserve,
    DeployedInLoans,
    EffectiveReserve,
    RedemptionPrice,
}

impl Field {
    /// Accepted keys, most preferred first
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::Timestamp => &["timestamp", "time", "ts", "blockTimestamp"],
            Field::TotalSupply => &["totalSupply", "total_supply", "supply"],
            Field::ReserveHeld => {
                &["reserveHeld", "reserve_held", "contractHeld", "heldByContract"]
            }
            Field::Burned => &["burned", "totalBurned", "total_burned", "burnt"],
            Field::ActualReserve => &["actualReserve", "actual_reserve", "reserve", "usdcReserve"],
            Field::DeployedInLoans => {
                &["deployedInLoans", "deployed_in_loans", "loans", "outstandingLoans"]
            }
            Field::EffectiveReserve => &["effectiveReserve", "effective_reserve"],
            Field::RedemptionPrice => &["redemptionPrice", "redemption_price", "price"],
        }
    }

    /// Position in tuple-encoded rows
    fn index(self) -> usize {
        match self {
            Field::Timestamp => 0,
            Field::TotalSupply => 1,
            Field::ReserveHeld => 2,
            Field::Burned => 3,
            // 4 is circulating supply, always recomputed
            Field::ActualReserve => 5,
            Field::DeployedInLoans => 6,
            Field::EffectiveReserve => 7,
            Field::RedemptionPrice => 8,
        }
    }

    /// Decimals used when a raw value needs rescaling
    fn decimals(self) -> Option<u32> {
        match self {
            Field::Timestamp => None,
            Field::TotalSupply | Field::ReserveHeld | Field::Burned => Some(TOKEN_DECIMALS),
            _ => Some(RESERVE_DECIMALS),
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

fn lookup(row: &Map<String, Value>, field: Field) -> Option<f64> {
    field
        .aliases()
        .iter()
        .find_map(|key| row.get(*key).and_then(numeric))
        .or_else(|| row.get(&field.index().to_string()).and_then(numeric))
}

fn rescale(field: Field, raw: f64) -> f64 {
    match field.decimals() {
        Some(decimals) if raw > RESCALE_THRESHOLD => raw / 10f64.powi(decimals as i32),
        _ => raw,
    }
}

fn normalize_timestamp(raw: f64) -> Option<u64> {
    if raw <= 0.0 {
        return None;
    }
    let seconds = if raw > MILLIS_THRESHOLD { raw / 1000.0 } else { raw };
    Some(seconds.floor() as u64)
}

/// Normalize one remote row; `None` when it has no usable timestamp
///
/// Arrays are treated as tuple-encoded rows.
pub fn normalize_row(row: &Value, floor_price: f64) -> Option<ReserveSnapshot> {
    let owned;
    let map = match row {
        Value::Object(map) => map,
        Value::Array(items) => {
            owned = items
                .iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v.clone()))
                .collect::<Map<String, Value>>();
            &owned
        }
        _ => return None,
    };

    let timestamp = normalize_timestamp(lookup(map, Field::Timestamp)?)?;
    let get = |field: Field| lookup(map, field).map(|raw| rescale(field, raw));

    let fields = SnapshotFields {
        total_supply: get(Field::TotalSupply).unwrap_or(0.0),
        reserve_held: get(Field::ReserveHeld).unwrap_or(0.0),
        burned: get(Field::Burned).unwrap_or(0.0),
        actual_reserve: get(Field::ActualReserve).unwrap_or(0.0),
        deployed_in_loans: get(Field::DeployedInLoans).unwrap_or(0.0),
        effective_reserve: get(Field::EffectiveReserve),
        redemption_price: get(Field::RedemptionPrice),
    };

    Some(ReserveSnapshot::new(timestamp, fields, floor_price))
}

/// Normalize a batch of rows, dropping unusable ones
pub fn normalize_rows(rows: &[Value], floor_price: f64) -> Vec<ReserveSnapshot> {
    rows.iter()
        .filter_map(|row| normalize_row(row, floor_price))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_row() {
        let row = json!({
            "timestamp": 1_700_000_000u64,
            "totalSupply": 1000.0,
            "reserveHeld": 200.0,
            "burned": 50.0,
            "actualReserve": 900.0,
            "deployedInLoans": 100.0
        });

        let snapshot = normalize_row(&row, 1.0).unwrap();
        assert_eq!(snapshot.timestamp, 1_700_000_000);
        assert_eq!(snapshot.circulating_supply, 750.0);
        assert_eq!(snapshot.effective_reserve, 800.0);
        assert_eq!(snapshot.redemption_price, 1.2);
    }

    #[test]
    fn test_legacy_aliases_and_strings() {
        let row = json!({
            "ts": "1700000000",
            "total_supply": "1000",
            "heldByContract": 200,
            "burnt": 50,
            "usdcReserve": "825",
            "price": 0.5,
            "unexpected": "ignored"
        });

        let snapshot = normalize_row(&row, 1.0).unwrap();
        assert_eq!(snapshot.total_supply, 1000.0);
        assert_eq!(snapshot.reserve_held, 200.0);
        assert_eq!(snapshot.actual_reserve, 825.0);
        // reported price below floor is clamped
        assert_eq!(snapshot.redemption_price, 1.0);
    }

    #[test]
    fn test_base_unit_rescaling_and_millis() {
        let row = json!({
            "blockTimestamp": 1_700_000_000_123u64,
            "totalSupply": "1000000000000000000000",
            "actualReserve": 1_500_000_000_000u64,
            "burned": 5.0
        });

        let snapshot = normalize_row(&row, 1.0).unwrap();
        assert_eq!(snapshot.timestamp, 1_700_000_000);
        assert_eq!(snapshot.total_supply, 1000.0);
        assert_eq!(snapshot.actual_reserve, 1_500_000.0);
        assert_eq!(snapshot.burned, 5.0);
    }

    #[test]
    fn test_numeric_index_rows() {
        let object = json!({
            "0": 1_700_000_000u64,
            "1": 1000.0,
            "2": 200.0,
            "3": 50.0,
            "4": 12345.0,
            "5": 900.0
        });
        let array = json!([1_700_000_000u64, 1000.0, 200.0, 50.0, 12345.0, 900.0]);

        let a = normalize_row(&object, 1.0).unwrap();
        let b = normalize_row(&array, 1.0).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.circulating_supply, 750.0);
        assert_eq!(a.actual_reserve, 900.0);
    }

    #[test]
    fn test_named_alias_wins_over_index() {
        let row = json!({ "timestamp": 10, "0": 99, "totalSupply": 5, "1": 7 });
        let snapshot = normalize_row(&row, 1.0).unwrap();
        assert_eq!(snapshot.timestamp, 10);
        assert_eq!(snapshot.total_supply, 5.0);
    }

    #[test]
    fn test_rows_without_timestamp_are_dropped() {
        let rows = vec![
            json!({ "totalSupply": 1 }),
            json!({ "timestamp": "soon" }),
            json!("not a row"),
            json!({ "time": 42 }),
        ];

        let snapshots = normalize_rows(&rows, 1.0);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].timestamp, 42);
    }

    #[test]
    fn test_deterministic() {
        let row = json!({ "time": 7, "supply": "3e21", "reserve": 4 });
        assert_eq!(normalize_row(&row, 1.0), normalize_row(&row, 1.0));
    }
}
