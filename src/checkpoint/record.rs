// src/checkpoint/record.rs
use crate::pricing::ProviderId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One committed checkpoint. Append-only: a record is never rewritten once
/// its id has been claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub id: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub active_provider: Option<ProviderId>,
    pub units_completed: u64,
    pub cumulative_units: u64,
    pub period_cost: Decimal,
    pub cumulative_cost: Decimal,
    /// Work cursor at the end of the period; a restarted loop continues here.
    pub next_unit_id: u64,
}

impl CheckpointRecord {
    /// The synthetic id-0 record every ledger starts from.
    pub fn baseline(next_unit_id: u64) -> Self {
        Self {
            id: 0,
            start_time: DateTime::<Utc>::UNIX_EPOCH,
            end_time: DateTime::<Utc>::UNIX_EPOCH,
            active_provider: None,
            units_completed: 0,
            cumulative_units: 0,
            period_cost: Decimal::ZERO,
            cumulative_cost: Decimal::ZERO,
            next_unit_id,
        }
    }

    pub fn is_baseline(&self) -> bool {
        self.id == 0
    }

    /// Builds record `id` on top of `previous`, carrying the running totals.
    pub fn follow(previous: &CheckpointRecord, id: u64, delta: &PeriodDelta) -> Self {
        Self {
            id,
            start_time: delta.start_time,
            end_time: delta.end_time,
            active_provider: delta.active_provider.clone(),
            units_completed: delta.units_completed,
            cumulative_units: previous.cumulative_units + delta.units_completed,
            period_cost: delta.period_cost,
            cumulative_cost: previous.cumulative_cost + delta.period_cost,
            next_unit_id: delta.next_unit_id,
        }
    }
}

/// What happened since the last checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodDelta {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub active_provider: Option<ProviderId>,
    pub units_completed: u64,
    pub period_cost: Decimal,
    pub next_unit_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn delta(units: u64, cost: Decimal) -> PeriodDelta {
        PeriodDelta {
            start_time: Utc.timestamp_opt(0, 0).unwrap(),
            end_time: Utc.timestamp_opt(300, 0).unwrap(),
            active_provider: Some("aws".into()),
            units_completed: units,
            period_cost: cost,
            next_unit_id: 40 + units,
        }
    }

    #[test]
    fn test_first_record_on_baseline_has_equal_period_and_cumulative() {
        let first = CheckpointRecord::follow(&CheckpointRecord::baseline(40), 1, &delta(3, dec("0.0312")));
        assert_eq!(first.id, 1);
        assert_eq!(first.cumulative_units, first.units_completed);
        assert_eq!(first.cumulative_cost, first.period_cost);
        assert_eq!(first.next_unit_id, 43);
    }

    #[test]
    fn test_follow_accumulates() {
        let first = CheckpointRecord::follow(&CheckpointRecord::baseline(0), 1, &delta(3, dec("0.5")));
        let second = CheckpointRecord::follow(&first, 2, &delta(2, dec("0.25")));
        assert_eq!(second.cumulative_units, 5);
        assert_eq!(second.cumulative_cost, dec("0.75"));
    }

    #[test]
    fn test_json_shape_is_stable() {
        let record = CheckpointRecord::follow(&CheckpointRecord::baseline(0), 1, &delta(1, dec("0.1")));
        let json = serde_json::to_string(&record).unwrap();
        let back: CheckpointRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
